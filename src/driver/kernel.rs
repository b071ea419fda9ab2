//! Compiled kernels.

use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::backend::{Bundle, DecodeError, EncodeError, Target};
use crate::emu::EmuError;
use crate::heap::{Heap, HeapError};
use crate::ir::{CompileContext, Label, Program};

use super::queue::{HardwareQueue, Job};
use super::KernelDriver;

/// Kernel configuration and launch errors.
///
/// Configuration errors are collected on the kernel rather than returned,
/// so a batch of kernels can report all of them at once.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("{target} cannot launch on {requested} QPUs (supported: {supported})")]
    QpuCount {
        target: Target,
        requested: usize,
        supported: &'static str,
    },

    #[error("kernel needs {needed} bytes of heap, {available} available")]
    HeapCapacity { needed: usize, available: usize },

    #[error("label {0} was not issued by this compilation context")]
    ForeignLabel(Label),

    #[error("kernel has {0} configuration error(s) and cannot be invoked")]
    NotRunnable(usize),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Memory(#[from] HeapError),

    #[error(transparent)]
    Emulation(#[from] EmuError),
}

/// Encoded code plus everything needed to launch it.
#[derive(Debug)]
pub struct Kernel<D: KernelDriver> {
    driver: D,
    code: Vec<u64>,
    bundles: Vec<Bundle>,
    uniforms: Vec<u32>,
    num_qpus: usize,
    errors: Vec<KernelError>,
}

impl<D: KernelDriver> Kernel<D> {
    /// Encode `program`, built with `ctx`, for `num_qpus` cores.
    ///
    /// Encoding failures and labels `ctx` did not hand out are returned;
    /// configuration problems are recorded in [`Kernel::errors`].
    pub fn compile(
        driver: D,
        ctx: &CompileContext,
        program: &Program,
        num_qpus: usize,
    ) -> Result<Self, KernelError> {
        if let Some(label) = ctx.foreign_label(program) {
            return Err(KernelError::ForeignLabel(label));
        }
        let code = driver.encode(program)?;
        let bundles = driver.bundles(program, &code)?;
        let mut errors = Vec::new();
        if !D::supports_qpus(num_qpus) {
            errors.push(KernelError::QpuCount {
                target: D::TARGET,
                requested: num_qpus,
                supported: D::qpu_counts(),
            });
        }
        log::debug!(
            "{}: compiled {} instructions ({} labels) into {} words for {} QPUs",
            D::TARGET,
            program.len(),
            ctx.label_count(),
            code.len(),
            num_qpus
        );
        Ok(Self {
            driver,
            code,
            bundles,
            uniforms: Vec::new(),
            num_qpus,
            errors,
        })
    }

    pub fn set_uniforms(&mut self, uniforms: &[u32]) -> &mut Self {
        self.uniforms = uniforms.to_vec();
        self
    }

    /// Heap bytes one invocation allocates.
    pub fn footprint(&self) -> usize {
        self.code.len() * 8 + self.driver.launch_bytes(self.uniforms.len(), self.num_qpus)
    }

    /// Record an error if an invocation would not fit in `heap`.
    pub fn check_heap(&mut self, heap: &Heap) -> &mut Self {
        let needed = self.footprint();
        if needed > heap.available() {
            self.errors.push(KernelError::HeapCapacity {
                needed,
                available: heap.available(),
            });
        }
        self
    }

    pub fn errors(&self) -> &[KernelError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn target(&self) -> Target {
        D::TARGET
    }

    pub fn code(&self) -> &[u64] {
        &self.code
    }

    pub fn num_qpus(&self) -> usize {
        self.num_qpus
    }

    /// Launch on `queue` and wait up to `timeout`.
    ///
    /// Code, uniforms and launch tables are written into `heap` for the
    /// duration of the call. Returns `Ok(false)` on timeout.
    pub fn invoke<Q: HardwareQueue>(
        &self,
        queue: &mut Q,
        heap: &mut Heap,
        timeout: Duration,
    ) -> Result<bool, KernelError> {
        if self.has_errors() {
            return Err(KernelError::NotRunnable(self.errors.len()));
        }
        let needed = self.footprint();
        if needed > heap.available() {
            return Err(KernelError::HeapCapacity {
                needed,
                available: heap.available(),
            });
        }

        let mut scope = heap.scope();
        let code_buf = scope.alloc_words(self.code.len() * 2)?;
        let mut bytes = vec![0u8; self.code.len() * 8];
        LittleEndian::write_u64_into(&self.code, &mut bytes);
        LittleEndian::read_u32_into(&bytes, scope.slice_mut(&code_buf)?);
        let code_addr = scope.address(&code_buf)?;

        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let submission =
            self.driver
                .launch(&mut scope, code_addr, &self.uniforms, self.num_qpus, timeout_ms)?;
        let job = Job {
            target: D::TARGET,
            submission,
            bundles: &self.bundles,
            uniforms: &self.uniforms,
            num_qpus: self.num_qpus,
        };
        Ok(queue.submit(&job, &mut scope, timeout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::driver::{EmulatedQueue, Submission, V3dDriver, Vc4Driver};
    use crate::ir::{AddOp, BranchCond, Instr, Reg, Special};

    /// out[lane] = in[lane] * 2 + 1 over a 16-word buffer, via TMU and DMA.
    fn double_plus_one() -> Program {
        use crate::emu::vpm::{DmaStoreSetup, VpmSetup};
        let unif = Reg::special(Special::Uniform);
        let store = DmaStoreSetup {
            units: 1,
            depth: 16,
            horizontal: true,
            row: 0,
            col: 0,
        };
        vec![
            Instr::mov(Reg::acc(0), unif),
            Instr::mov(Reg::acc(0), unif),
            Instr::mov(Reg::a(0), unif),
            Instr::mov(Reg::b(0), unif),
            Instr::alu(AddOp::Shl, Reg::acc(1), Reg::special(Special::ElemNum), 2),
            Instr::alu(AddOp::Add, Reg::special(Special::Tmu0S), Reg::a(0), Reg::acc(1)),
            Instr::recv(Reg::acc(2)),
            Instr::alu(AddOp::Add, Reg::acc(2), Reg::acc(2), Reg::acc(2)),
            Instr::alu(AddOp::Add, Reg::acc(2), Reg::acc(2), 1),
            Instr::li(Reg::special(Special::WrSetup), VpmSetup::horizontal(0).encode_write() as i32),
            Instr::mov(Reg::special(Special::VpmWrite), Reg::acc(2)),
            Instr::li(Reg::special(Special::WrSetup), store.encode() as i32),
            Instr::mov(Reg::special(Special::DmaStAddr), Reg::b(0)),
            Instr::mov(Reg::acc(0), Reg::special(Special::DmaStWait)),
            Instr::end(),
        ]
        .into()
    }

    #[test]
    fn test_vc4_kernel_runs_on_emulated_queue() {
        let driver = Vc4Driver::from_config(&Config::default());
        let mut kernel = Kernel::compile(driver, &CompileContext::new(), &double_plus_one(), 1).unwrap();

        let mut heap = Heap::new(4096).unwrap();
        let input = heap.alloc_words(16).unwrap();
        let output = heap.alloc_words(16).unwrap();
        for (i, w) in heap.slice_mut(&input).unwrap().iter_mut().enumerate() {
            *w = i as u32 * 10;
        }
        let uniforms = [heap.address(&input).unwrap(), heap.address(&output).unwrap()];
        kernel.set_uniforms(&uniforms).check_heap(&heap);
        assert!(!kernel.has_errors(), "{:?}", kernel.errors());

        let used = heap.used();
        let mut queue = EmulatedQueue::new();
        assert!(kernel
            .invoke(&mut queue, &mut heap, Duration::from_secs(5))
            .unwrap());

        let out = heap.slice(&output).unwrap();
        assert!(out.iter().enumerate().all(|(i, &w)| w == i as u32 * 20 + 1));
        // launch buffers are released with the invocation
        assert_eq!(heap.used(), used);
        assert!(matches!(queue.submitted[0], Submission::Mailbox(_)));
    }

    #[test]
    fn test_configuration_errors_collect() {
        let program: Program = vec![Instr::end()].into();
        let mut kernel = Kernel::compile(V3dDriver::new(), &CompileContext::new(), &program, 4).unwrap();
        kernel.set_uniforms(&[0; 64]);
        kernel.check_heap(&Heap::new(64).unwrap());

        assert!(kernel.has_errors());
        assert_eq!(kernel.errors().len(), 2);
        assert!(matches!(
            kernel.errors()[0],
            KernelError::QpuCount { requested: 4, .. }
        ));
        assert!(matches!(kernel.errors()[1], KernelError::HeapCapacity { .. }));

        let mut heap = Heap::new(1 << 16).unwrap();
        let mut queue = EmulatedQueue::new();
        assert_eq!(
            kernel.invoke(&mut queue, &mut heap, Duration::from_secs(1)),
            Err(KernelError::NotRunnable(2))
        );
        assert!(queue.submitted.is_empty());
    }

    #[test]
    fn test_encoding_errors_are_fatal() {
        // VPM reads only exist on the VC4 DMA path
        let program: Program = vec![
            Instr::mov(Reg::a(1), Reg::special(Special::VpmRead)),
            Instr::end(),
        ]
        .into();
        let err = Kernel::compile(V3dDriver::new(), &CompileContext::new(), &program, 1).unwrap_err();
        assert!(matches!(err, KernelError::Encode(EncodeError::DmaUnsupported(_))));
    }

    #[test]
    fn test_v3d_kernel_emulates_program() {
        let program: Program = vec![
            Instr::mov(Reg::acc(0), Reg::special(Special::Uniform)),
            Instr::mov(Reg::acc(0), Reg::special(Special::Uniform)),
            Instr::mov(Reg::a(3), Reg::special(Special::Uniform)),
            Instr::end(),
        ]
        .into();
        let mut kernel = Kernel::compile(V3dDriver::new(), &CompileContext::new(), &program, 8).unwrap();
        kernel.set_uniforms(&[42]);
        let mut heap = Heap::new(1024).unwrap();
        let mut queue = EmulatedQueue::new();
        assert!(kernel
            .invoke(&mut queue, &mut heap, Duration::from_secs(5))
            .unwrap());
        let Submission::Csd(csd) = queue.submitted[0] else {
            panic!("expected a CSD launch");
        };
        assert_eq!(csd.batches(), 8);
        assert_eq!(queue.last_steps, 8 * 6);
    }

    #[test]
    fn test_labels_must_come_from_context() {
        let mut ctx = CompileContext::new();
        let mut program = Program::new();
        program.append(Instr::li(Reg::acc(1), 3));
        program.loop_while(&mut ctx, BranchCond::Any(crate::ir::Flag::ZC), |p, _| {
            p.append(
                Instr::alu(AddOp::Sub, Reg::acc(1), Reg::acc(1), 1)
                    .with_set_flags(crate::ir::SetFlags::Zero),
            );
        });
        program.append(Instr::end());

        let driver = Vc4Driver::from_config(&Config::default());
        assert!(Kernel::compile(driver.clone(), &ctx, &program, 1).is_ok());

        // a reset context no longer vouches for the old labels
        ctx.reset();
        let err = Kernel::compile(driver, &ctx, &program, 1).unwrap_err();
        assert_eq!(err, KernelError::ForeignLabel(Label(0)));
    }
}
