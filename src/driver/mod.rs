//! Kernel drivers and launch submission.
//!
//! ```text
//!  Program ──KernelDriver::encode──▶ code words ─┐
//!                                                ├─▶ Kernel ──invoke──▶ HardwareQueue
//!  uniforms ─────────────────────────────────────┘      │
//!                                     KernelDriver::launch writes code, uniforms
//!                                     and the launch payload into the heap
//! ```
//!
//! The target is chosen once, by the driver type a [`Kernel`] is built
//! with; everything below that point is static dispatch.

pub mod kernel;
pub mod queue;
pub mod submit;

use crate::backend::{self, v3d::V3dEncoder, vc4, Bundle, Encoder, EncodeError, Target};
use crate::config::Config;
use crate::heap::{Heap, HeapError};
use crate::ir::Program;

pub use kernel::{Kernel, KernelError};
pub use queue::{EmulatedQueue, HardwareQueue, Job};
pub use submit::{CsdDispatch, MailboxLaunch, Submission, SubmitCsd};

/// Per-target half of a kernel launch.
pub trait KernelDriver {
    const TARGET: Target;

    /// Whether the target can launch on `num_qpus` cores.
    fn supports_qpus(num_qpus: usize) -> bool;

    /// Accepted core counts, for error messages.
    fn qpu_counts() -> &'static str;

    fn encode(&self, program: &Program) -> Result<Vec<u64>, EncodeError>;

    /// Code the emulated queue executes for `program`, encoded as `code`.
    fn bundles(&self, program: &Program, code: &[u64]) -> Result<Vec<Bundle>, KernelError>;

    /// Heap bytes a launch needs beyond the code itself.
    fn launch_bytes(&self, uniforms: usize, num_qpus: usize) -> usize;

    /// Write the uniform streams and any launch tables into `heap` and
    /// build the payload starting the code at `code`.
    fn launch(
        &self,
        heap: &mut Heap,
        code: u32,
        uniforms: &[u32],
        num_qpus: usize,
        timeout_ms: u32,
    ) -> Result<Submission, HeapError>;
}

/// VideoCore IV: mailbox launch, one uniform stream per core.
#[derive(Debug, Clone)]
pub struct Vc4Driver {
    encoder: vc4::Vc4Encoder,
}

impl Vc4Driver {
    pub fn new() -> Self {
        Self::from_config(Config::get())
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            encoder: vc4::Vc4Encoder::new().with_pairing(config.vc4_pairing()),
        }
    }
}

impl Default for Vc4Driver {
    fn default() -> Self {
        Self::new()
    }
}

/// Most cores a VC4 launch can use.
pub const VC4_MAX_QPUS: usize = 12;

impl KernelDriver for Vc4Driver {
    const TARGET: Target = Target::Vc4;

    fn supports_qpus(num_qpus: usize) -> bool {
        (1..=VC4_MAX_QPUS).contains(&num_qpus)
    }

    fn qpu_counts() -> &'static str {
        "1 to 12"
    }

    fn encode(&self, program: &Program) -> Result<Vec<u64>, EncodeError> {
        self.encoder.encode(program)
    }

    fn bundles(&self, _program: &Program, code: &[u64]) -> Result<Vec<Bundle>, KernelError> {
        // Emulate exactly what the hardware would fetch.
        Ok(vc4::decode_program(code)?)
    }

    fn launch_bytes(&self, uniforms: usize, num_qpus: usize) -> usize {
        // id and count prefix per stream, plus one address pair per core
        num_qpus * (uniforms + 2) * 4 + num_qpus * 8
    }

    fn launch(
        &self,
        heap: &mut Heap,
        code: u32,
        uniforms: &[u32],
        num_qpus: usize,
        timeout_ms: u32,
    ) -> Result<Submission, HeapError> {
        let table = heap.alloc_words(2 * num_qpus)?;
        for id in 0..num_qpus {
            let stream = heap.alloc_words(uniforms.len() + 2)?;
            let words = heap.slice_mut(&stream)?;
            words[0] = id as u32;
            words[1] = num_qpus as u32;
            words[2..].copy_from_slice(uniforms);
            let addr = heap.address(&stream)?;
            let pair = &mut heap.slice_mut(&table)?[2 * id..2 * id + 2];
            pair[0] = addr;
            pair[1] = code;
        }
        Ok(Submission::Mailbox(MailboxLaunch {
            num_qpus: num_qpus as u32,
            control: heap.address(&table)?,
            noflush: false,
            timeout_ms,
        }))
    }
}

/// V3D: `submit_csd` launch, one uniform stream shared by all cores.
#[derive(Debug, Clone, Default)]
pub struct V3dDriver {
    encoder: V3dEncoder,
}

impl V3dDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KernelDriver for V3dDriver {
    const TARGET: Target = Target::V3d;

    fn supports_qpus(num_qpus: usize) -> bool {
        matches!(num_qpus, 1 | 8)
    }

    fn qpu_counts() -> &'static str {
        "1 or 8"
    }

    fn encode(&self, program: &Program) -> Result<Vec<u64>, EncodeError> {
        self.encoder.encode(program)
    }

    fn bundles(&self, program: &Program, _code: &[u64]) -> Result<Vec<Bundle>, KernelError> {
        // V3D words are not decoded; the emulator checks the program logic.
        Ok(backend::linearize(program)?)
    }

    fn launch_bytes(&self, uniforms: usize, _num_qpus: usize) -> usize {
        uniforms * 4
    }

    fn launch(
        &self,
        heap: &mut Heap,
        code: u32,
        uniforms: &[u32],
        num_qpus: usize,
        _timeout_ms: u32,
    ) -> Result<Submission, HeapError> {
        let stream = heap.alloc_words(uniforms.len())?;
        heap.slice_mut(&stream)?.copy_from_slice(uniforms);
        let dispatch = CsdDispatch::for_qpus(num_qpus as u32);
        Ok(Submission::Csd(SubmitCsd::new(
            &dispatch,
            code,
            heap.address(&stream)?,
        )))
    }
}
