//! Hardware queues.
//!
//! A [`HardwareQueue`] accepts one launch at a time and blocks until the
//! cores finish or the timeout elapses. [`EmulatedQueue`] runs the launch
//! on the emulator against the same heap the launch was written to.

use std::time::{Duration, Instant};

use crate::backend::{Bundle, Target};
use crate::config::Config;
use crate::emu::{EmuError, Engine, EngineStatus};
use crate::heap::Heap;

use super::submit::Submission;

/// Everything a queue needs to run one kernel launch.
#[derive(Debug, Clone, Copy)]
pub struct Job<'a> {
    pub target: Target,
    pub submission: Submission,
    /// Code the emulator executes.
    pub bundles: &'a [Bundle],
    /// Launch uniforms, without the per-core id and count prefix.
    pub uniforms: &'a [u32],
    pub num_qpus: usize,
}

/// A queue kernels are submitted to.
pub trait HardwareQueue {
    /// Run `job` to completion.
    ///
    /// Returns `Ok(false)` if the timeout elapsed first. Timed-out jobs are
    /// not retried.
    fn submit(&mut self, job: &Job<'_>, heap: &mut Heap, timeout: Duration)
        -> Result<bool, EmuError>;
}

/// Rounds executed between deadline checks.
const ROUNDS_PER_CHECK: u64 = 1024;

/// Queue backed by the emulator.
#[derive(Debug, Clone, Default)]
pub struct EmulatedQueue {
    /// Per-core step budget; `None` keeps the engine default.
    pub max_steps: Option<u64>,
    /// Every launch submitted so far, in order.
    pub submitted: Vec<Submission>,
    /// Bundles executed by the last launch, summed over cores.
    pub last_steps: u64,
}

impl EmulatedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue using the configured step budget.
    pub fn from_config(config: &Config) -> Self {
        Self::new().with_max_steps(config.max_steps())
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

impl HardwareQueue for EmulatedQueue {
    fn submit(
        &mut self,
        job: &Job<'_>,
        heap: &mut Heap,
        timeout: Duration,
    ) -> Result<bool, EmuError> {
        log::debug!(
            "{}: emulating {} bundles on {} QPUs",
            job.target,
            job.bundles.len(),
            job.num_qpus
        );
        self.submitted.push(job.submission);

        let mut engine = Engine::new(job.bundles.to_vec(), job.num_qpus, job.uniforms);
        if let Some(max) = self.max_steps {
            engine = engine.with_max_steps(max);
        }
        let deadline = Instant::now() + timeout;
        while engine.step(heap)? {
            if engine.total_rounds % ROUNDS_PER_CHECK == 0 && Instant::now() >= deadline {
                log::warn!(
                    "{}: launch timed out after {:?} ({} rounds)",
                    job.target,
                    timeout,
                    engine.total_rounds
                );
                self.last_steps = engine.total_steps();
                return Ok(false);
            }
        }
        self.last_steps = engine.total_steps();
        Ok(engine.status == EngineStatus::AllHalted)
    }
}
