//! Single-QPU interpreter.
//!
//! A step executes one bundle (the instructions issued by one machine
//! word). All operands are read before any result is written, so the add
//! and mul halves of a paired word see the same register state.

use crate::backend::{Bundle, BRANCH_BASE, WORD_BYTES};
use crate::heap::Heap;
use crate::ir::{
    AluInstr, AluOp, AssignCond, BranchInstr, BranchTarget, Instr, InstrKind, MulOp, Operand, Reg,
    SetFlags, Special,
};

use super::alu::{self, LaneFlags};
use super::error::EmuError;
use super::state::{QpuState, BRANCH_DELAY, END_DELAY, R4};
use super::vpm::Vpm;
use super::word::{Vector, NUM_LANES};

/// Hardware semaphores shared by all cores.
pub const NUM_SEMAPHORES: usize = 16;

/// Largest semaphore count.
pub const SEMAPHORE_MAX: u8 = 15;

/// State shared by every core of a launch.
#[derive(Debug, Clone, Default)]
pub struct Shared {
    pub vpm: Vpm,
    pub semaphores: [u8; NUM_SEMAPHORES],
}

/// Core execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QpuStatus {
    /// Not yet stepped.
    #[default]
    Idle,
    Running,
    /// Waiting for semaphore `id` to become non-zero.
    Blocked { id: u8 },
    /// Program end reached.
    Halted,
}

/// A result waiting to be committed at the end of the step.
struct Write {
    dest: Reg,
    value: Vector,
    mask: [bool; NUM_LANES],
}

/// Effects of evaluating one bundle.
#[derive(Default)]
struct Effects {
    writes: Vec<Write>,
    flags: Option<LaneFlags>,
    branch: Option<usize>,
    end: bool,
}

/// Operand fetch for one bundle: a uniform or VPM read happens once per
/// bundle however many instructions name it.
#[derive(Default)]
struct Fetch {
    uniform: Option<Vector>,
    vpm: Option<Vector>,
}

/// One core executor.
#[derive(Debug, Clone)]
pub struct Qpu {
    pub state: QpuState,
    pub status: QpuStatus,
    /// Bundles executed.
    pub steps: u64,
    /// Steps spent waiting on semaphores.
    pub stalls: u64,
}

impl Qpu {
    pub fn new(id: usize, num_qpus: usize, uniforms: &[u32]) -> Self {
        Self {
            state: QpuState::new(id, num_qpus, uniforms),
            status: QpuStatus::Idle,
            steps: 0,
            stalls: 0,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.status == QpuStatus::Halted
    }

    /// Execute one bundle of `code`.
    pub fn step(
        &mut self,
        code: &[Bundle],
        shared: &mut Shared,
        heap: &mut Heap,
    ) -> Result<QpuStatus, EmuError> {
        if self.status == QpuStatus::Halted {
            return Ok(self.status);
        }
        let pc = self.state.pc;
        let bundle = code.get(pc).ok_or(EmuError::PcOutOfRange {
            pc: pc as i64,
            len: code.len(),
        })?;

        if let Some(id) = self.must_wait(bundle, shared) {
            if self.status != (QpuStatus::Blocked { id }) {
                log::trace!("qpu {} waits on semaphore {}", self.state.id, id);
            }
            self.status = QpuStatus::Blocked { id };
            self.stalls += 1;
            return Ok(self.status);
        }
        self.status = QpuStatus::Running;

        let effects = self
            .execute(bundle, shared, heap)
            .map_err(|e| e.at(self.state.id, pc))?;

        self.steps += 1;
        if let Some((value, mask)) = self.state.sfu.tick() {
            let r4 = &mut self.state.acc[R4];
            *r4 = r4.merge(value, &mask);
        }
        self.advance(pc, effects, code.len())?;
        Ok(self.status)
    }

    fn execute(
        &mut self,
        bundle: &[Instr],
        shared: &mut Shared,
        heap: &mut Heap,
    ) -> Result<Effects, EmuError> {
        let effects = self.evaluate(bundle, shared)?;
        self.commit(effects, shared, heap)
    }

    /// Semaphore a bundle would block on.
    fn must_wait(&self, bundle: &Bundle, shared: &Shared) -> Option<u8> {
        bundle.iter().find_map(|i| match i.kind {
            InstrKind::SemaDec(id)
                if shared.semaphores.get(id as usize).copied() == Some(0) =>
            {
                Some(id)
            }
            _ => None,
        })
    }

    fn advance(&mut self, pc: usize, effects: Effects, len: usize) -> Result<(), EmuError> {
        let s = &mut self.state;
        let mut next = pc + 1;
        match s.pending_branch {
            Some((target, 1)) => {
                next = target;
                s.pending_branch = None;
            }
            Some((target, n)) => s.pending_branch = Some((target, n - 1)),
            None => {}
        }
        if let Some(target) = effects.branch {
            s.pending_branch = Some((target, BRANCH_DELAY));
        }

        if effects.end {
            s.end_countdown = Some(END_DELAY);
        } else if let Some(n) = s.end_countdown {
            if n <= 1 {
                self.status = QpuStatus::Halted;
                log::debug!(
                    "qpu {} halted after {} steps",
                    self.state.id,
                    self.steps
                );
                return Ok(());
            }
            s.end_countdown = Some(n - 1);
        }
        if next >= len {
            return Err(EmuError::PcOutOfRange {
                pc: next as i64,
                len,
            }
            .at(s.id, pc));
        }
        s.pc = next;
        Ok(())
    }

    fn read_special(
        &mut self,
        s: Special,
        fetch: &mut Fetch,
        shared: &Shared,
    ) -> Result<Vector, EmuError> {
        match s {
            Special::Uniform => {
                if let Some(v) = fetch.uniform {
                    return Ok(v);
                }
                let v = Vector::splat(self.state.next_uniform()?);
                fetch.uniform = Some(v);
                Ok(v)
            }
            Special::ElemNum => Ok(Vector::lane_ids()),
            Special::QpuNum => Ok(Vector::splat(self.state.id as u32)),
            Special::VpmRead => {
                if let Some(v) = fetch.vpm {
                    return Ok(v);
                }
                let v = self.state.vpm.read(&shared.vpm)?;
                fetch.vpm = Some(v);
                Ok(v)
            }
            // Transfers finish synchronously.
            Special::DmaLdWait | Special::DmaStWait => Ok(Vector::default()),
            _ => Err(EmuError::UnmappedRead(Reg::Special(s))),
        }
    }

    fn read(&mut self, reg: Reg, fetch: &mut Fetch, shared: &Shared) -> Result<Vector, EmuError> {
        match reg {
            Reg::Special(s) => self.read_special(s, fetch, shared),
            other => self.state.read(other),
        }
    }

    fn operand(
        &mut self,
        op: Operand,
        fetch: &mut Fetch,
        shared: &Shared,
    ) -> Result<Vector, EmuError> {
        match op {
            Operand::Reg(r) => self.read(r, fetch, shared),
            Operand::Imm(imm) => Ok(Vector::splat(imm.bits())),
        }
    }

    fn eval_alu(
        &mut self,
        alu: &AluInstr,
        fetch: &mut Fetch,
        shared: &Shared,
        fx: &mut Effects,
    ) -> Result<(), EmuError> {
        let a = self.read(alu.src_a, fetch, shared)?;
        let b = match alu.src_b {
            Some(op) => self.operand(op, fetch, shared)?,
            None => Vector::default(),
        };
        let value = match alu.op {
            AluOp::Add(op) => alu::add(op, &a, &b),
            AluOp::Mul(MulOp::Rotate) => alu::rotate(&a, b[0].int()),
            AluOp::Mul(op) => alu::mul(op, &a, &b),
        };
        self.result(alu.dest, value, alu.cond, alu.set_flags, alu.op.result_is_float(), fx);
        Ok(())
    }

    fn result(
        &self,
        dest: Reg,
        value: Vector,
        cond: AssignCond,
        set_flags: SetFlags,
        float: bool,
        fx: &mut Effects,
    ) {
        let mask = self.state.flags.mask(cond);
        if set_flags.is_set() {
            fx.flags = Some(LaneFlags::from_result(&value, float));
        }
        if mask.iter().any(|&m| m) {
            fx.writes.push(Write { dest, value, mask });
        }
    }

    fn eval_branch(&self, pc: usize, br: &BranchInstr, fx: &mut Effects) -> Result<(), EmuError> {
        if let Some(link) = br.link {
            let ret = (pc as u32 + BRANCH_BASE as u32) * WORD_BYTES;
            fx.writes.push(Write {
                dest: link,
                value: Vector::splat(ret),
                mask: [true; NUM_LANES],
            });
        }
        if !self.state.flags.branch_taken(br.cond) {
            return Ok(());
        }
        let target = match br.target {
            BranchTarget::Relative(n) => pc as i64 + BRANCH_BASE + n as i64,
            BranchTarget::Absolute(bytes) => (bytes / WORD_BYTES) as i64,
            BranchTarget::Label(l) => return Err(EmuError::UnresolvedLabel(l)),
        };
        if target < 0 {
            return Err(EmuError::PcOutOfRange {
                pc: target,
                len: 0,
            });
        }
        fx.branch = Some(target as usize);
        Ok(())
    }

    fn evaluate(&mut self, bundle: &[Instr], shared: &mut Shared) -> Result<Effects, EmuError> {
        let pc = self.state.pc;
        let mut fx = Effects::default();
        let mut fetch = Fetch::default();
        for instr in bundle {
            match &instr.kind {
                InstrKind::Alu(alu) => self.eval_alu(alu, &mut fetch, shared, &mut fx)?,
                InstrKind::LoadImm(li) => {
                    let value = Vector::splat(li.value.bits());
                    self.result(li.dest, value, li.cond, li.set_flags, false, &mut fx);
                }
                InstrKind::Branch(br) => self.eval_branch(pc, br, &mut fx)?,
                InstrKind::Recv { dest } => {
                    let value = self.state.tmu.receive()?;
                    self.state.acc[R4] = value;
                    if *dest != Reg::acc(4) {
                        fx.writes.push(Write {
                            dest: *dest,
                            value,
                            mask: [true; NUM_LANES],
                        });
                    }
                }
                InstrKind::SemaInc(id) => {
                    let count = shared
                        .semaphores
                        .get_mut(*id as usize)
                        .ok_or(EmuError::BadSemaphore(*id))?;
                    if *count == SEMAPHORE_MAX {
                        log::warn!("semaphore {} incremented past {}", id, SEMAPHORE_MAX);
                    } else {
                        *count += 1;
                    }
                }
                InstrKind::SemaDec(id) => {
                    let count = shared
                        .semaphores
                        .get_mut(*id as usize)
                        .ok_or(EmuError::BadSemaphore(*id))?;
                    *count = count.saturating_sub(1);
                }
                InstrKind::End => fx.end = true,
                InstrKind::Nop | InstrKind::Label(_) => {}
            }
        }
        Ok(fx)
    }

    fn commit(
        &mut self,
        fx: Effects,
        shared: &mut Shared,
        heap: &mut Heap,
    ) -> Result<Effects, EmuError> {
        for w in &fx.writes {
            match w.dest {
                Reg::None => {}
                Reg::Special(s) => self.write_special(s, &w.value, &w.mask, shared, heap)?,
                reg => self.state.write(reg, &w.value, &w.mask)?,
            }
        }
        if let Some(flags) = fx.flags {
            self.state.flags = flags;
        }
        Ok(fx)
    }

    fn write_special(
        &mut self,
        s: Special,
        value: &Vector,
        mask: &[bool; NUM_LANES],
        shared: &mut Shared,
        heap: &mut Heap,
    ) -> Result<(), EmuError> {
        // Setup and address registers take the first enabled lane.
        let scalar = (0..NUM_LANES).find(|&l| mask[l]).map(|l| value[l].0);
        let st = &mut self.state;
        match s {
            Special::VpmWrite => st.vpm.write(&mut shared.vpm, value, mask)?,
            Special::RdSetup => {
                if let Some(w) = scalar {
                    st.vpm.write_read_setup(w);
                }
            }
            Special::WrSetup => {
                if let Some(w) = scalar {
                    st.vpm.write_write_setup(w);
                }
            }
            Special::DmaLdAddr => {
                if let Some(addr) = scalar {
                    st.vpm.dma_load(addr, &mut shared.vpm, heap)?;
                }
            }
            Special::DmaStAddr => {
                if let Some(addr) = scalar {
                    st.vpm.dma_store(addr, &shared.vpm, heap)?;
                }
            }
            Special::Tmu0S => st.tmu.request(value, mask, heap)?,
            Special::HostInt => log::trace!("qpu {} host interrupt", st.id),
            s if s.is_sfu() => st.sfu.start(s, value, *mask),
            _ => return Err(EmuError::InvalidWrite(Reg::Special(s))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AddOp, BranchCond, Flag};
    use smallvec::smallvec;

    fn code(instrs: Vec<Instr>) -> Vec<Bundle> {
        instrs.into_iter().map(|i| smallvec![i]).collect()
    }

    fn run(qpu: &mut Qpu, code: &[Bundle], heap: &mut Heap) -> Result<(), EmuError> {
        let mut shared = Shared::default();
        for _ in 0..1000 {
            if qpu.step(code, &mut shared, heap)? == QpuStatus::Halted {
                return Ok(());
            }
        }
        panic!("program did not halt");
    }

    fn end() -> Vec<Instr> {
        vec![Instr::end(), Instr::nop(), Instr::nop()]
    }

    #[test]
    fn test_add_and_halt() {
        let mut prog = vec![
            Instr::li(Reg::a(0), 40),
            Instr::alu(AddOp::Add, Reg::a(1), Reg::a(0), 2),
        ];
        prog.extend(end());
        let code = code(prog);
        let mut heap = Heap::new(0).unwrap();
        let mut qpu = Qpu::new(0, 1, &[]);
        run(&mut qpu, &code, &mut heap).unwrap();
        assert_eq!(qpu.state.regs_a[1], Vector::splat(42));
        assert_eq!(qpu.steps, 5);
    }

    #[test]
    fn test_predicated_write_per_flag() {
        // lane % 4 - 1 gives -1, 0, 1, 2
        for (flag, expect) in [
            (Flag::ZS, [0, 1, 0, 0]),
            (Flag::ZC, [1, 0, 1, 1]),
            (Flag::NS, [1, 0, 0, 0]),
            (Flag::NC, [0, 1, 1, 1]),
        ] {
            let mut prog = vec![
                Instr::mov(Reg::acc(0), Reg::special(Special::ElemNum)),
                Instr::alu(AddOp::And, Reg::acc(1), Reg::acc(0), 3),
                Instr::li(Reg::a(0), 0),
                Instr::alu(AddOp::Sub, Reg::None, Reg::acc(1), 1).with_set_flags(SetFlags::Zero),
                Instr::li(Reg::a(0), 1).with_cond(AssignCond::Flag(flag)),
            ];
            prog.extend(end());
            let code = code(prog);
            let mut heap = Heap::new(0).unwrap();
            let mut qpu = Qpu::new(0, 1, &[]);
            run(&mut qpu, &code, &mut heap).unwrap();
            let got = qpu.state.regs_a[0].to_ints();
            for lane in 0..NUM_LANES {
                assert_eq!(got[lane], expect[lane % 4], "{:?} lane {}", flag, lane);
            }
        }
    }

    #[test]
    fn test_branch_delay_slots() {
        let mut prog = vec![
            Instr::li(Reg::a(0), 0),
            Instr::branch(BranchCond::Always, BranchTarget::Relative(2)),
            Instr::alu(AddOp::Add, Reg::a(0), Reg::a(0), 1),
            Instr::alu(AddOp::Add, Reg::a(0), Reg::a(0), 1),
            Instr::alu(AddOp::Add, Reg::a(0), Reg::a(0), 1),
            Instr::li(Reg::a(0), 100),
            Instr::li(Reg::a(0), 200),
        ];
        prog.extend(end());
        let code = code(prog);
        let mut heap = Heap::new(0).unwrap();
        let mut qpu = Qpu::new(0, 1, &[]);
        run(&mut qpu, &code, &mut heap).unwrap();
        // three delay slots ran, both loads were skipped
        assert_eq!(qpu.state.regs_a[0], Vector::splat(3));
    }

    #[test]
    fn test_branch_link_and_flags() {
        let mut prog = vec![
            Instr::li(Reg::acc(0), 5).with_set_flags(SetFlags::Zero),
            Instr::branch(BranchCond::All(Flag::ZS), BranchTarget::Relative(10)),
            Instr::branch(BranchCond::Any(Flag::ZC), BranchTarget::Relative(0))
                .with_link(Reg::b(0)),
            Instr::nop(),
            Instr::nop(),
            Instr::nop(),
        ];
        prog.extend(end());
        let code = code(prog);
        let mut heap = Heap::new(0).unwrap();
        let mut qpu = Qpu::new(0, 1, &[]);
        run(&mut qpu, &code, &mut heap).unwrap();
        assert_eq!(qpu.state.regs_b[0], Vector::splat(6 * WORD_BYTES));
    }

    #[test]
    fn test_uniform_read_once_per_bundle() {
        let add = Instr::alu(AddOp::Add, Reg::a(0), Reg::special(Special::Uniform), 0);
        let mul = Instr::alu(MulOp::Mul24, Reg::b(0), Reg::special(Special::Uniform), 3);
        let mut code: Vec<Bundle> = vec![smallvec![add, mul]];
        code.extend(end().into_iter().map(|i| smallvec![i]));
        let mut heap = Heap::new(0).unwrap();
        let mut qpu = Qpu::new(2, 4, &[]);
        run(&mut qpu, &code, &mut heap).unwrap();
        assert_eq!(qpu.state.regs_a[0], Vector::splat(2));
        assert_eq!(qpu.state.regs_b[0], Vector::splat(6));
        assert_eq!(qpu.state.uniforms_read(), 1);
    }

    #[test]
    fn test_sfu_stale_until_latency() {
        let mut prog = vec![
            Instr::li(Reg::acc(0), 4.0f32),
            Instr::mov(Reg::special(Special::SfuRecip), Reg::acc(0)),
            Instr::mov(Reg::a(0), Reg::acc(4)),
            Instr::mov(Reg::a(1), Reg::acc(4)),
            Instr::mov(Reg::a(2), Reg::acc(4)),
        ];
        prog.extend(end());
        let code = code(prog);
        let mut heap = Heap::new(0).unwrap();
        let mut qpu = Qpu::new(0, 1, &[]);
        run(&mut qpu, &code, &mut heap).unwrap();
        assert_eq!(qpu.state.regs_a[0], Vector::default());
        assert_eq!(qpu.state.regs_a[1], Vector::default());
        assert_eq!(qpu.state.regs_a[2], Vector::splat(0.25f32));
    }

    #[test]
    fn test_errors_carry_location() {
        let code = code(vec![Instr::nop(), Instr::recv(Reg::a(0))]);
        let mut heap = Heap::new(0).unwrap();
        let mut qpu = Qpu::new(1, 2, &[]);
        let err = run(&mut qpu, &code, &mut heap).unwrap_err();
        assert_eq!(
            err,
            EmuError::At {
                qpu: 1,
                pc: 1,
                source: Box::new(EmuError::TmuEmpty)
            }
        );
        assert_eq!(err.root(), &EmuError::TmuEmpty);
    }

    #[test]
    fn test_running_off_the_end() {
        let code = code(vec![Instr::nop()]);
        let mut heap = Heap::new(0).unwrap();
        let mut qpu = Qpu::new(0, 1, &[]);
        let err = run(&mut qpu, &code, &mut heap).unwrap_err();
        assert!(matches!(err.root(), EmuError::PcOutOfRange { pc: 1, len: 1 }));
    }
}
