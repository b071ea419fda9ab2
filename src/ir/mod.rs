//! Architecture-neutral intermediate representation.
//!
//! ```text
//! CompileContext ──fresh labels──▶ Program (Vec<Instr>)
//!                                     │
//!                        ┌────────────┴────────────┐
//!                        ▼                         ▼
//!                  backend::vc4               backend::v3d
//! ```
//!
//! Instructions refer to storage through [`Reg`] and [`Operand`], which are
//! shared by both backends and by the emulator.

pub mod context;
pub mod instr;
pub mod program;
pub mod register;

pub use context::CompileContext;
pub use instr::{
    AddOp, AluInstr, AluOp, AssignCond, BranchCond, BranchInstr, BranchTarget, Flag, Instr,
    InstrKind, Label, LoadImmInstr, MulOp, SetFlags,
};
pub use program::Program;
pub use register::{Imm, Operand, Reg, RegFile, Special};
