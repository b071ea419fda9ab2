//! Register and operand descriptors.
//!
//! A [`Reg`] names a storage location independent of the target:
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `File { A, n }` / `File { B, n }` | General register file slot (32 per file) |
//! | `Acc(n)` | Accumulator r0-r5 |
//! | `Special(..)` | Memory-mapped I/O register (uniforms, VPM, DMA, TMU, SFU) |
//! | `None` | Discard the result (flag-only comparisons) |
//!
//! The V3D has a single physical register file; file A slot `n` maps to
//! `rf<n>` and file B slot `n` to `rf<32 + n>`.

use std::fmt;

/// Number of slots in each VC4 register file.
pub const NUM_FILE_REGS: u8 = 32;

/// Number of accumulators (r0-r5).
pub const NUM_ACCS: u8 = 6;

/// Accumulator receiving SFU and TMU results.
pub const ACC_SFU: u8 = 4;

/// Accumulator holding the rotate amount for vector rotation.
pub const ACC_ROTATE: u8 = 5;

/// Register file selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegFile {
    /// Physical register file A.
    A,
    /// Physical register file B.
    B,
}

/// Special-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Special {
    /// Next value from the uniform stream (read-only).
    Uniform,
    /// Lane index 0-15 (read-only).
    ElemNum,
    /// Index of the executing QPU (read-only).
    QpuNum,
    /// Next vector of a queued VPM read.
    VpmRead,
    /// Vector write into the VPM (TMU data on V3D).
    VpmWrite,
    /// VPM read / DMA load setup.
    RdSetup,
    /// VPM write / DMA store setup.
    WrSetup,
    /// Wait for an in-flight DMA load (read).
    DmaLdWait,
    /// Wait for an in-flight DMA store (read).
    DmaStWait,
    /// Start a DMA load from the given address.
    DmaLdAddr,
    /// Start a DMA store to the given address (TMU address on V3D).
    DmaStAddr,
    /// Raise a host interrupt.
    HostInt,
    /// TMU0 gather address.
    Tmu0S,
    /// SFU reciprocal.
    SfuRecip,
    /// SFU reciprocal square root.
    SfuRecipSqrt,
    /// SFU base-2 exponent.
    SfuExp,
    /// SFU base-2 logarithm.
    SfuLog,
}

impl Special {
    /// Registers that can never be the destination of a write.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            Special::Uniform
                | Special::ElemNum
                | Special::QpuNum
                | Special::VpmRead
                | Special::DmaLdWait
                | Special::DmaStWait
        )
    }

    /// Registers that can be used as an operand.
    pub fn is_readable(self) -> bool {
        self.is_read_only()
    }

    /// Registers that only exist on the VC4 VPM/DMA path.
    pub fn is_dma_only(self) -> bool {
        matches!(
            self,
            Special::VpmRead
                | Special::RdSetup
                | Special::WrSetup
                | Special::DmaLdWait
                | Special::DmaStWait
                | Special::DmaLdAddr
        )
    }

    /// Special function unit inputs.
    pub fn is_sfu(self) -> bool {
        matches!(
            self,
            Special::SfuRecip | Special::SfuRecipSqrt | Special::SfuExp | Special::SfuLog
        )
    }

    /// Short assembler name.
    pub fn name(self) -> &'static str {
        match self {
            Special::Uniform => "unif",
            Special::ElemNum => "elem_num",
            Special::QpuNum => "qpu_num",
            Special::VpmRead => "vpm_read",
            Special::VpmWrite => "vpm_write",
            Special::RdSetup => "rd_setup",
            Special::WrSetup => "wr_setup",
            Special::DmaLdWait => "dma_ld_wait",
            Special::DmaStWait => "dma_st_wait",
            Special::DmaLdAddr => "dma_ld_addr",
            Special::DmaStAddr => "dma_st_addr",
            Special::HostInt => "host_int",
            Special::Tmu0S => "tmu0_s",
            Special::SfuRecip => "sfu_recip",
            Special::SfuRecipSqrt => "sfu_recipsqrt",
            Special::SfuExp => "sfu_exp",
            Special::SfuLog => "sfu_log",
        }
    }
}

/// A target-neutral storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    /// General register file slot.
    File {
        /// Physical file.
        file: RegFile,
        /// Slot index (0-31).
        id: u8,
    },
    /// Accumulator r0-r5.
    Acc(u8),
    /// Special-purpose register.
    Special(Special),
    /// No register; writes are discarded.
    None,
}

impl Reg {
    /// Slot `id` of register file A.
    pub const fn a(id: u8) -> Self {
        Reg::File { file: RegFile::A, id }
    }

    /// Slot `id` of register file B.
    pub const fn b(id: u8) -> Self {
        Reg::File { file: RegFile::B, id }
    }

    /// Accumulator `n`.
    pub const fn acc(n: u8) -> Self {
        Reg::Acc(n)
    }

    /// Special register.
    pub const fn special(s: Special) -> Self {
        Reg::Special(s)
    }

    /// Check that the index is within the architectural bound.
    pub fn in_range(self) -> bool {
        match self {
            Reg::File { id, .. } => id < NUM_FILE_REGS,
            Reg::Acc(n) => n < NUM_ACCS,
            Reg::Special(_) | Reg::None => true,
        }
    }

    /// The special register, if this is one.
    pub fn as_special(self) -> Option<Special> {
        match self {
            Reg::Special(s) => Some(s),
            _ => None,
        }
    }

    /// True for register-file slots.
    pub fn is_file(self) -> bool {
        matches!(self, Reg::File { .. })
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::File { file: RegFile::A, id } => write!(f, "ra{}", id),
            Reg::File { file: RegFile::B, id } => write!(f, "rb{}", id),
            Reg::Acc(n) => write!(f, "r{}", n),
            Reg::Special(s) => f.write_str(s.name()),
            Reg::None => f.write_str("-"),
        }
    }
}

/// An immediate value.
///
/// As an ALU operand it must fall in the small-immediate domain of the
/// target; as a load-immediate payload any 32-bit value is allowed.
#[derive(Debug, Clone, Copy)]
pub enum Imm {
    /// Integer immediate.
    Int(i32),
    /// Single precision float immediate.
    Float(f32),
}

impl Imm {
    /// Raw 32-bit pattern.
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            Imm::Int(v) => v as u32,
            Imm::Float(v) => v.to_bits(),
        }
    }
}

/// Immediates compare by bit pattern, so `Float(0.0) == Int(0)`.
impl PartialEq for Imm {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Imm {}

impl fmt::Display for Imm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imm::Int(v) => write!(f, "{}", v),
            Imm::Float(v) => write!(f, "{:?}", v),
        }
    }
}

/// Right-hand ALU operand: a register or a small immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Register operand.
    Reg(Reg),
    /// Small immediate operand.
    Imm(Imm),
}

impl Operand {
    /// The register, if this is a register operand.
    pub fn as_reg(self) -> Option<Reg> {
        match self {
            Operand::Reg(r) => Some(r),
            Operand::Imm(_) => None,
        }
    }
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}

impl From<Imm> for Operand {
    fn from(i: Imm) -> Self {
        Operand::Imm(i)
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Imm(Imm::Int(v))
    }
}

impl From<f32> for Operand {
    fn from(v: f32) -> Self {
        Operand::Imm(Imm::Float(v))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Imm(i) => write!(f, "{}", i),
        }
    }
}
