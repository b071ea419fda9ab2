//! VideoCore IV backend.
//!
//! Each word drives the add ALU and the mul ALU in parallel. Operands come
//! from accumulators r0-r5 or from the two register files, each of which
//! has a single read port per instruction:
//!
//! ```text
//!   raddr_a ──▶ file A ──┐
//!   raddr_b ──▶ file B ──┼─▶ mux ─▶ add ALU ─▶ waddr_add ─┐ ws
//!   r0..r5 ──────────────┘       ─▶ mul ALU ─▶ waddr_mul ─┘ swaps files
//! ```

pub mod addr;
pub mod decode;
pub mod encode;
pub mod fields;
pub mod pair;
pub mod small_imm;

pub use decode::{decode_program, decode_word, disassemble};
pub use encode::Vc4Encoder;
