//! Multi-core emulation engine.
//!
//! The engine runs every core of a launch over the same code, one bundle
//! per core per round, in core order:
//!
//! ```text
//! round:  qpu0.step ─▶ qpu1.step ─▶ ... ─▶ qpuN.step
//!            │            │                    │
//!            └──── shared VPM, semaphores, heap ┘
//! ```
//!
//! Cores interact only through the shared VPM, the semaphores and main
//! memory, so round-robin order is an admissible interleaving.
//!
//! # Usage
//!
//! ```ignore
//! let mut engine = Engine::from_program(&program, 4, &uniforms)?;
//! engine.run(&mut heap)?;     // until every core halts
//! ```

use crate::backend::{self, vc4, Bundle, DecodeError, EncodeError};
use crate::heap::Heap;
use crate::ir::Program;

use super::core::{Qpu, QpuStatus, Shared};
use super::error::EmuError;
use super::vpm::Vpm;

/// Default per-core step budget.
pub const DEFAULT_MAX_STEPS: u64 = 1 << 24;

/// Breakpoint on a core's PC.
#[derive(Debug, Clone)]
pub struct Breakpoint {
    /// Core index; `None` matches every core.
    pub qpu: Option<usize>,
    /// Bundle index.
    pub pc: usize,
    pub enabled: bool,
}

impl Breakpoint {
    pub fn new(qpu: Option<usize>, pc: usize) -> Self {
        Self {
            qpu,
            pc,
            enabled: true,
        }
    }
}

/// Engine execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Not started.
    Idle,
    Running,
    /// Stopped before executing the bundle at `pc` on core `qpu`.
    Breakpoint { qpu: usize, pc: usize },
    /// Every core has halted.
    AllHalted,
}

/// Round-robin scheduler over a set of cores.
pub struct Engine {
    code: Vec<Bundle>,
    pub qpus: Vec<Qpu>,
    pub shared: Shared,
    pub breakpoints: Vec<Breakpoint>,
    pub status: EngineStatus,
    /// Rounds executed.
    pub total_rounds: u64,
    /// Per-core step budget.
    pub max_steps: u64,
}

impl Engine {
    /// Engine for `num_qpus` cores running `code`. Each core's uniform
    /// stream starts with its id and `num_qpus`, followed by `uniforms`.
    pub fn new(code: Vec<Bundle>, num_qpus: usize, uniforms: &[u32]) -> Self {
        let qpus = (0..num_qpus)
            .map(|id| Qpu::new(id, num_qpus, uniforms))
            .collect();
        Self {
            code,
            qpus,
            shared: Shared::default(),
            breakpoints: Vec::new(),
            status: EngineStatus::Idle,
            total_rounds: 0,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Engine over an IR program with labels resolved.
    pub fn from_program(
        program: &Program,
        num_qpus: usize,
        uniforms: &[u32],
    ) -> Result<Self, EncodeError> {
        Ok(Self::new(backend::linearize(program)?, num_qpus, uniforms))
    }

    /// Engine over encoded VideoCore IV words.
    pub fn from_vc4(words: &[u64], num_qpus: usize, uniforms: &[u32]) -> Result<Self, DecodeError> {
        Ok(Self::new(vc4::decode_program(words)?, num_qpus, uniforms))
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Reset every core and the shared state; code and uniforms are kept.
    pub fn reset(&mut self) {
        let n = self.qpus.len();
        for qpu in &mut self.qpus {
            let uniforms = qpu.state.uniforms_tail();
            *qpu = Qpu::new(qpu.state.id, n, &uniforms);
        }
        self.shared = Shared::default();
        self.status = EngineStatus::Idle;
        self.total_rounds = 0;
    }

    pub fn add_breakpoint(&mut self, qpu: Option<usize>, pc: usize) {
        self.breakpoints.push(Breakpoint::new(qpu, pc));
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    fn check_breakpoints(&self) -> Option<(usize, usize)> {
        self.qpus
            .iter()
            .filter(|q| !q.is_halted())
            .find(|q| {
                self.breakpoints.iter().any(|bp| {
                    bp.enabled
                        && bp.pc == q.state.pc
                        && bp.qpu.map_or(true, |id| id == q.state.id)
                })
            })
            .map(|q| (q.state.id, q.state.pc))
    }

    /// Execute one round.
    ///
    /// Returns true while any core is still running.
    pub fn step(&mut self, heap: &mut Heap) -> Result<bool, EmuError> {
        // A stopped engine resumes past the breakpoint it stopped on.
        let resuming = matches!(self.status, EngineStatus::Breakpoint { .. });
        if !resuming {
            if let Some((qpu, pc)) = self.check_breakpoints() {
                self.status = EngineStatus::Breakpoint { qpu, pc };
                return Ok(false);
            }
        }

        let mut running = 0usize;
        let mut blocked = 0usize;
        for qpu in &mut self.qpus {
            if qpu.is_halted() {
                continue;
            }
            if qpu.steps + qpu.stalls >= self.max_steps {
                return Err(EmuError::StepLimit {
                    qpu: qpu.state.id,
                    steps: self.max_steps,
                });
            }
            match qpu.step(&self.code, &mut self.shared, heap)? {
                QpuStatus::Halted => {}
                QpuStatus::Blocked { .. } => {
                    running += 1;
                    blocked += 1;
                }
                _ => running += 1,
            }
        }
        self.total_rounds += 1;

        if running > 0 && blocked == running {
            return Err(EmuError::Deadlock { waiting: blocked });
        }
        self.status = if running > 0 {
            EngineStatus::Running
        } else {
            EngineStatus::AllHalted
        };
        Ok(running > 0)
    }

    /// Run until every core halts or a breakpoint is hit.
    ///
    /// Returns the number of rounds executed.
    pub fn run(&mut self, heap: &mut Heap) -> Result<u64, EmuError> {
        let start = self.total_rounds;
        while self.step(heap)? {}
        log::debug!(
            "{} cores ran {} rounds, {} bundles",
            self.qpus.len(),
            self.total_rounds - start,
            self.total_steps()
        );
        Ok(self.total_rounds - start)
    }

    pub fn qpu(&self, id: usize) -> Option<&Qpu> {
        self.qpus.get(id)
    }

    pub fn vpm(&self) -> &Vpm {
        &self.shared.vpm
    }

    pub fn semaphore(&self, id: u8) -> Option<u8> {
        self.shared.semaphores.get(id as usize).copied()
    }

    /// Bundles executed across all cores.
    pub fn total_steps(&self) -> u64 {
        self.qpus.iter().map(|q| q.steps).sum()
    }

    pub fn code(&self) -> &[Bundle] {
        &self.code
    }
}
