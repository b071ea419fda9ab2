//! Encoding and decoding errors.

use thiserror::Error;

use crate::ir::{Imm, Label, Reg};

/// Errors raised while encoding a program. All are fatal: no partial word
/// is produced.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodeError {
    /// Immediate outside the small-immediate domain of the target.
    #[error("immediate {0} is not encodable as a small immediate")]
    UnencodableImm(Imm),

    /// Two different immediates in one word.
    #[error("conflicting small immediates {first} and {second} in one instruction")]
    ImmConflict {
        /// Immediate already placed.
        first: Imm,
        /// Immediate that did not fit.
        second: Imm,
    },

    /// Two register operands read different slots of the same file.
    #[error("operands {a} and {b} both read register file {file}")]
    RegFileConflict {
        /// First operand.
        a: Reg,
        /// Second operand.
        b: Reg,
        /// Shared file name.
        file: char,
    },

    /// V3D needs a third register-file read address.
    #[error("read of {0} needs a third register-file read port")]
    ReadPortConflict(Reg),

    /// Destination is a read-only register.
    #[error("cannot write read-only register {0}")]
    ReadOnlyDest(Reg),

    /// Source is a write-only register.
    #[error("cannot read write-only register {0}")]
    NotReadable(Reg),

    /// Register index beyond the architectural bound.
    #[error("register {0} is out of range")]
    RegOutOfRange(Reg),

    /// Register reachable only through the VC4 DMA path.
    #[error("{0} uses DMA, unsupported on V3D")]
    DmaUnsupported(Reg),

    /// Rotation constraints violated.
    #[error("invalid rotate: {0}")]
    InvalidRotate(String),

    /// Operation, register or combination the target cannot express.
    #[error("unsupported on {target}: {what}")]
    Unsupported {
        /// Target name.
        target: &'static str,
        /// What was rejected.
        what: String,
    },

    /// Binary op without a right operand.
    #[error("{0} requires two operands")]
    MissingOperand(&'static str),

    /// Branch to a label that is never defined.
    #[error("branch to undefined label {0}")]
    UnknownLabel(Label),

    /// Label defined twice.
    #[error("label {0} defined more than once")]
    DuplicateLabel(Label),

    /// Semaphore id outside 0-15.
    #[error("semaphore {0} out of range (0-15)")]
    BadSemaphore(u8),
}

impl EncodeError {
    /// Shorthand for [`EncodeError::Unsupported`].
    pub fn unsupported(target: &'static str, what: impl Into<String>) -> Self {
        EncodeError::Unsupported {
            target,
            what: what.into(),
        }
    }
}

/// Errors raised while decoding machine words.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Byte stream is not a whole number of words.
    #[error("code stream of {len} bytes is not a multiple of 8")]
    Truncated {
        /// Byte length.
        len: usize,
    },

    /// Signal value with no meaning for the decoder.
    #[error("unknown signal {sig} in word 0x{word:016X}")]
    BadSignal {
        /// Signal field.
        sig: u8,
        /// Full word.
        word: u64,
    },

    /// Reserved or unknown opcode.
    #[error("unknown {unit} opcode {op} in word 0x{word:016X}")]
    UnknownOpcode {
        /// "add" or "mul".
        unit: &'static str,
        /// Opcode field.
        op: u32,
        /// Full word.
        word: u64,
    },

    /// Read or write address with no register behind it.
    #[error("unmapped {kind} address {addr} in word 0x{word:016X}")]
    BadAddress {
        /// "read" or "write".
        kind: &'static str,
        /// Address field.
        addr: u8,
        /// Full word.
        word: u64,
    },

    /// Reserved condition or flag encoding.
    #[error("invalid condition field {value} in word 0x{word:016X}")]
    BadCondition {
        /// Field value.
        value: u32,
        /// Full word.
        word: u64,
    },

    /// I/O failure while reading code.
    #[error("read failed: {0}")]
    Io(String),
}
