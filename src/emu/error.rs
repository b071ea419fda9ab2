//! Emulator errors.
//!
//! Every error is a consistency failure in the kernel being emulated; none
//! are recoverable. Errors raised while executing an instruction are
//! wrapped in [`EmuError::At`] with the core and PC.

use thiserror::Error;

use crate::heap::HeapError;
use crate::ir::{Label, Reg};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmuError {
    #[error("pc {pc} outside program of {len} words")]
    PcOutOfRange { pc: i64, len: usize },

    #[error("read of unmapped register {0}")]
    UnmappedRead(Reg),

    #[error("write to {0} is not allowed")]
    InvalidWrite(Reg),

    #[error("register {0} out of range")]
    RegIndex(Reg),

    #[error("uniform stream exhausted after {read} reads")]
    UniformsExhausted { read: usize },

    #[error("receive with no outstanding TMU load")]
    TmuEmpty,

    #[error("VPM access at row {row}, column {col} out of range")]
    VpmOutOfRange { row: usize, col: usize },

    #[error("VPM {0} used before setup")]
    VpmNotSetUp(&'static str),

    #[error("branch to unresolved label {0}")]
    UnresolvedLabel(Label),

    #[error("semaphore {0} out of range")]
    BadSemaphore(u8),

    #[error("memory access failed: {0}")]
    Memory(#[from] HeapError),

    #[error("qpu {qpu} exceeded the step budget of {steps}")]
    StepLimit { qpu: usize, steps: u64 },

    #[error("all {waiting} running cores are waiting on semaphores")]
    Deadlock { waiting: usize },

    #[error("qpu {qpu} at pc {pc}: {source}")]
    At {
        qpu: usize,
        pc: usize,
        source: Box<EmuError>,
    },
}

impl EmuError {
    /// Attach the core and PC an error was raised at.
    pub fn at(self, qpu: usize, pc: usize) -> Self {
        match self {
            EmuError::At { .. } => self,
            other => EmuError::At {
                qpu,
                pc,
                source: Box::new(other),
            },
        }
    }

    /// The error without location context.
    pub fn root(&self) -> &EmuError {
        match self {
            EmuError::At { source, .. } => source.root(),
            other => other,
        }
    }
}
