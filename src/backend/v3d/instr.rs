//! Structured V3D 4.1 instructions.
//!
//! These mirror the machine word field by field; [`super::pack`] converts
//! between them and 64-bit words.

use std::fmt;

use super::flags::Flags;
use super::sig::Signals;

/// ALU input multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mux {
    #[default]
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    /// Register file via `raddr_a`.
    A = 6,
    /// Register file via `raddr_b`, or the small immediate.
    B = 7,
}

impl Mux {
    /// Mux for field value `v` (low 3 bits).
    pub fn from_bits(v: u32) -> Mux {
        match v & 7 {
            0 => Mux::R0,
            1 => Mux::R1,
            2 => Mux::R2,
            3 => Mux::R3,
            4 => Mux::R4,
            5 => Mux::R5,
            6 => Mux::A,
            _ => Mux::B,
        }
    }

    /// Accumulator mux for `r<n>`.
    pub fn acc(n: u8) -> Mux {
        Mux::from_bits(n as u32)
    }
}

/// Float input unpacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Unpack {
    Abs = 0,
    #[default]
    None = 1,
    L = 2,
    H = 3,
}

impl Unpack {
    pub fn from_bits(v: u32) -> Unpack {
        match v & 3 {
            0 => Unpack::Abs,
            1 => Unpack::None,
            2 => Unpack::L,
            _ => Unpack::H,
        }
    }
}

/// Float output packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutPack {
    #[default]
    None = 0,
    L = 1,
    H = 2,
}

impl OutPack {
    pub fn from_bits(v: u32) -> Option<OutPack> {
        match v {
            0 => Some(OutPack::None),
            1 => Some(OutPack::L),
            2 => Some(OutPack::H),
            _ => None,
        }
    }
}

/// Add unit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddOpcode {
    Fadd,
    Faddnf,
    Add,
    Sub,
    Fsub,
    Min,
    Max,
    Umin,
    Umax,
    Shl,
    Shr,
    Asr,
    Ror,
    Fmin,
    Fmax,
    And,
    Or,
    Xor,
    Not,
    Neg,
    Nop,
    Tidx,
    Eidx,
    Tmuwt,
    Ftoiz,
    Itof,
    Clz,
}

impl AddOpcode {
    /// Operations with the float pack/unpack fields folded into the opcode.
    pub fn is_float_binary(self) -> bool {
        matches!(
            self,
            AddOpcode::Fadd | AddOpcode::Faddnf | AddOpcode::Fsub | AddOpcode::Fmin | AddOpcode::Fmax
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            AddOpcode::Fadd => "fadd",
            AddOpcode::Faddnf => "faddnf",
            AddOpcode::Add => "add",
            AddOpcode::Sub => "sub",
            AddOpcode::Fsub => "fsub",
            AddOpcode::Min => "min",
            AddOpcode::Max => "max",
            AddOpcode::Umin => "umin",
            AddOpcode::Umax => "umax",
            AddOpcode::Shl => "shl",
            AddOpcode::Shr => "shr",
            AddOpcode::Asr => "asr",
            AddOpcode::Ror => "ror",
            AddOpcode::Fmin => "fmin",
            AddOpcode::Fmax => "fmax",
            AddOpcode::And => "and",
            AddOpcode::Or => "or",
            AddOpcode::Xor => "xor",
            AddOpcode::Not => "not",
            AddOpcode::Neg => "neg",
            AddOpcode::Nop => "nop",
            AddOpcode::Tidx => "tidx",
            AddOpcode::Eidx => "eidx",
            AddOpcode::Tmuwt => "tmuwt",
            AddOpcode::Ftoiz => "ftoiz",
            AddOpcode::Itof => "itof",
            AddOpcode::Clz => "clz",
        }
    }
}

/// Mul unit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MulOpcode {
    Add,
    Sub,
    Umul24,
    Smul24,
    Nop,
    Mov,
    Fmul,
}

impl MulOpcode {
    pub fn name(self) -> &'static str {
        match self {
            MulOpcode::Add => "add",
            MulOpcode::Sub => "sub",
            MulOpcode::Umul24 => "umul24",
            MulOpcode::Smul24 => "smul24",
            MulOpcode::Nop => "nop",
            MulOpcode::Mov => "mov",
            MulOpcode::Fmul => "fmul",
        }
    }
}

/// Write address of the NOP magic register.
pub const WADDR_NOP: u8 = 6;

/// One ALU slot (add or mul).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AluSlot<Op> {
    pub op: Op,
    pub a: Mux,
    pub b: Mux,
    pub waddr: u8,
    pub magic_write: bool,
    pub output_pack: OutPack,
    pub a_unpack: Unpack,
    pub b_unpack: Unpack,
}

impl<Op> AluSlot<Op> {
    /// Slot computing `op` with no destination yet.
    pub fn new(op: Op) -> Self {
        Self {
            op,
            a: Mux::R0,
            b: Mux::R0,
            waddr: WADDR_NOP,
            magic_write: true,
            output_pack: OutPack::None,
            a_unpack: Unpack::None,
            b_unpack: Unpack::None,
        }
    }
}

pub type AddSlot = AluSlot<AddOpcode>;
pub type MulSlot = AluSlot<MulOpcode>;

/// ALU instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AluWord {
    pub sig: Signals,
    pub sig_addr: u8,
    pub sig_magic: bool,
    pub raddr_a: u8,
    pub raddr_b: u8,
    pub flags: Flags,
    pub add: AddSlot,
    pub mul: MulSlot,
}

impl AluWord {
    /// The canonical no-op.
    pub fn nop() -> Self {
        Self {
            sig: Signals::NONE,
            sig_addr: 0,
            sig_magic: false,
            raddr_a: 0,
            raddr_b: 0,
            flags: Flags::default(),
            add: AddSlot::new(AddOpcode::Nop),
            mul: MulSlot::new(MulOpcode::Nop),
        }
    }

    /// No-op carrying `sig`.
    pub fn with_sig(sig: Signals) -> Self {
        let mut w = Self::nop();
        w.sig = sig;
        w
    }
}

/// Branch condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCond {
    Always = 0,
    A0 = 2,
    NA0 = 3,
    AllA = 4,
    AnyNA = 5,
    AnyA = 6,
    AllNA = 7,
}

impl BranchCond {
    pub fn from_bits(v: u32) -> Option<BranchCond> {
        Some(match v {
            0 => BranchCond::Always,
            2 => BranchCond::A0,
            3 => BranchCond::NA0,
            4 => BranchCond::AllA,
            5 => BranchCond::AnyNA,
            6 => BranchCond::AnyA,
            7 => BranchCond::AllNA,
            _ => return None,
        })
    }
}

/// Branch destination mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BranchDest {
    #[default]
    Abs = 0,
    Rel = 1,
    LinkReg = 2,
    RegFile = 3,
}

impl BranchDest {
    pub fn from_bits(v: u32) -> BranchDest {
        match v & 3 {
            0 => BranchDest::Abs,
            1 => BranchDest::Rel,
            2 => BranchDest::LinkReg,
            _ => BranchDest::RegFile,
        }
    }
}

/// Branch instruction.
#[derive(Debug, Clone, Copy, Eq)]
pub struct BranchWord {
    pub cond: BranchCond,
    pub msfign: u8,
    /// Destination of the instruction stream.
    pub bdi: BranchDest,
    /// Destination of the uniform stream, used only when `ub` is set.
    pub bdu: BranchDest,
    pub ub: bool,
    pub raddr_a: u8,
    /// Byte offset or address; the low three bits are not encoded.
    pub offset: u32,
}

/// `bdu` is ignored when `ub` is clear.
impl PartialEq for BranchWord {
    fn eq(&self, other: &Self) -> bool {
        self.cond == other.cond
            && self.msfign == other.msfign
            && self.bdi == other.bdi
            && self.ub == other.ub
            && (!self.ub || self.bdu == other.bdu)
            && self.raddr_a == other.raddr_a
            && self.offset == other.offset
    }
}

/// A V3D instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V3dInstr {
    Alu(AluWord),
    Branch(BranchWord),
}

impl V3dInstr {
    /// The canonical no-op.
    pub fn nop() -> Self {
        V3dInstr::Alu(AluWord::nop())
    }
}

fn write_dest(f: &mut fmt::Formatter<'_>, waddr: u8, magic: bool) -> fmt::Result {
    if magic {
        match waddr {
            0..=5 => write!(f, "r{}", waddr),
            6 => f.write_str("-"),
            11 => f.write_str("tmud"),
            12 => f.write_str("tmua"),
            19 => f.write_str("recip"),
            20 => f.write_str("rsqrt"),
            21 => f.write_str("exp"),
            22 => f.write_str("log"),
            n => write!(f, "magic{}", n),
        }
    } else {
        write!(f, "rf{}", waddr)
    }
}

fn write_mux(f: &mut fmt::Formatter<'_>, w: &AluWord, mux: Mux) -> fmt::Result {
    match mux {
        Mux::A => write!(f, "rf{}", w.raddr_a),
        Mux::B if w.sig.contains(Signals::SMALL_IMM) => match super::small_imm::decode(w.raddr_b) {
            Some(imm) => write!(f, "{}", imm),
            None => write!(f, "smimm{}", w.raddr_b),
        },
        Mux::B => write!(f, "rf{}", w.raddr_b),
        acc => write!(f, "r{}", acc as u8),
    }
}

impl fmt::Display for AluWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} ", self.add.op.name(), self.flags.add_suffix())?;
        if self.add.op != AddOpcode::Nop {
            write_dest(f, self.add.waddr, self.add.magic_write)?;
            f.write_str(", ")?;
            write_mux(f, self, self.add.a)?;
            f.write_str(", ")?;
            write_mux(f, self, self.add.b)?;
        }
        write!(f, "; {}{} ", self.mul.op.name(), self.flags.mul_suffix())?;
        if self.mul.op != MulOpcode::Nop {
            write_dest(f, self.mul.waddr, self.mul.magic_write)?;
            f.write_str(", ")?;
            write_mux(f, self, self.mul.a)?;
            if self.mul.op != MulOpcode::Mov {
                f.write_str(", ")?;
                write_mux(f, self, self.mul.b)?;
            }
        }
        if !self.sig.is_empty() {
            write!(f, "; {}", self.sig)?;
            if self.sig.writes_address() {
                f.write_str(" ")?;
                write_dest(f, self.sig_addr, self.sig_magic)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for BranchWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b.{:?}", self.cond)?;
        match self.bdi {
            BranchDest::Abs => write!(f, " 0x{:x}", self.offset),
            BranchDest::Rel => write!(f, " pc+{}", self.offset as i32),
            BranchDest::LinkReg => f.write_str(" lri"),
            BranchDest::RegFile => write!(f, " rf{}", self.raddr_a),
        }
    }
}

impl fmt::Display for V3dInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            V3dInstr::Alu(a) => fmt::Display::fmt(a, f),
            V3dInstr::Branch(b) => fmt::Display::fmt(b, f),
        }
    }
}
