//! vcqpu library
//!
//! Compute kernels for the Raspberry Pi QPUs: an instruction IR, encoders
//! for VideoCore IV and V3D, a 16-lane emulator, and the launch plumbing
//! that ties them to a GPU heap.

pub mod backend;
pub mod config;
pub mod driver;
pub mod emu;
pub mod heap;
pub mod ir;
