//! 16-lane QPU emulator.
//!
//! Executes resolved bundles (from [`crate::backend::linearize`] or from
//! decoded VideoCore IV words) against a [`Heap`](crate::heap::Heap) that
//! stands in for GPU memory. It models:
//! - Register files A/B, accumulators r0-r5 and per-lane Z/N flags
//! - Three branch delay slots and the two words after `END`
//! - The SFU latency (results reach r4 three steps after the write)
//! - TMU gathers, VPM ports and DMA transfers
//! - Semaphores shared between cores
//!
//! # Architecture
//!
//! Each [`Qpu`] keeps its own PC and uniform stream. The [`Engine`] steps
//! them round-robin; cores share the VPM, the semaphores and memory.
//!
//! # Example
//!
//! ```ignore
//! use vcqpu::emu::Engine;
//! use vcqpu::heap::Heap;
//!
//! let mut heap = Heap::new(1 << 20)?;
//! let mut engine = Engine::from_program(&program, 8, &[buf_addr])?;
//! engine.run(&mut heap)?;
//! ```

pub mod alu;
pub mod core;
pub mod engine;
pub mod error;
pub mod sfu;
pub mod state;
pub mod tmu;
pub mod vpm;
pub mod word;

pub use core::{Qpu, QpuStatus, Shared};
pub use engine::{Breakpoint, Engine, EngineStatus};
pub use error::EmuError;
pub use state::QpuState;
pub use word::{Vector, Word, NUM_LANES};
