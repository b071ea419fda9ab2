//! V3D 4.1 backend (Raspberry Pi 4).
//!
//! A single 64-register file replaces the two VC4 files, read through two
//! address ports:
//!
//! ```text
//!   raddr_a ──┐
//!   raddr_b ──┼─▶ rf[0..63] ──┐
//!   small imm ┘                ├─▶ mux ─▶ add ALU ─▶ waddr_a (+magic)
//!   r0..r5 ───────────────────┘       ─▶ mul ALU ─▶ waddr_m (+magic)
//! ```
//!
//! IR file A slot `n` maps to `rf<n>`, file B slot `n` to `rf<32+n>`. There
//! is no VPM/DMA engine; memory goes through the TMU.

pub mod encode;
pub mod flags;
pub mod instr;
pub mod pack;
pub mod sig;
pub mod small_imm;

pub use encode::V3dEncoder;
pub use instr::V3dInstr;
pub use pack::{disassemble, pack, unpack};
