//! Architecture-neutral machine instructions.
//!
//! An [`Instr`] is one logical machine operation. The payload is a closed
//! sum type ([`InstrKind`]) so every dispatch site must handle every tag.
//! Annotations (`header`, `comment`) are display-only and never reach the
//! encoded word.

use std::fmt;

use super::register::{Imm, Operand, Reg};

/// Operations executed by the add ALU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddOp {
    /// Float add.
    FAdd,
    /// Float subtract.
    FSub,
    /// Float minimum.
    FMin,
    /// Float maximum.
    FMax,
    /// Minimum of absolute values.
    FMinAbs,
    /// Maximum of absolute values.
    FMaxAbs,
    /// Float to signed integer (truncating).
    FtoI,
    /// Signed integer to float.
    ItoF,
    /// Integer add.
    Add,
    /// Integer subtract.
    Sub,
    /// Logical shift right.
    Shr,
    /// Arithmetic shift right.
    Asr,
    /// Rotate right.
    Ror,
    /// Shift left.
    Shl,
    /// Signed minimum.
    Min,
    /// Signed maximum.
    Max,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Bitwise not.
    Not,
    /// Count leading zeros.
    Clz,
    /// Per-byte saturating add.
    V8Adds,
    /// Per-byte saturating subtract.
    V8Subs,
}

impl AddOp {
    /// Operations that only use the left operand.
    pub fn is_unary(self) -> bool {
        matches!(self, AddOp::FtoI | AddOp::ItoF | AddOp::Not | AddOp::Clz)
    }

    /// Operations whose result is a float (used for flag computation).
    pub fn result_is_float(self) -> bool {
        matches!(
            self,
            AddOp::FAdd
                | AddOp::FSub
                | AddOp::FMin
                | AddOp::FMax
                | AddOp::FMinAbs
                | AddOp::FMaxAbs
                | AddOp::ItoF
        )
    }

    /// Assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            AddOp::FAdd => "fadd",
            AddOp::FSub => "fsub",
            AddOp::FMin => "fmin",
            AddOp::FMax => "fmax",
            AddOp::FMinAbs => "fminabs",
            AddOp::FMaxAbs => "fmaxabs",
            AddOp::FtoI => "ftoi",
            AddOp::ItoF => "itof",
            AddOp::Add => "add",
            AddOp::Sub => "sub",
            AddOp::Shr => "shr",
            AddOp::Asr => "asr",
            AddOp::Ror => "ror",
            AddOp::Shl => "shl",
            AddOp::Min => "min",
            AddOp::Max => "max",
            AddOp::And => "and",
            AddOp::Or => "or",
            AddOp::Xor => "xor",
            AddOp::Not => "not",
            AddOp::Clz => "clz",
            AddOp::V8Adds => "v8adds",
            AddOp::V8Subs => "v8subs",
        }
    }
}

/// Operations executed by the mul ALU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MulOp {
    /// Float multiply.
    FMul,
    /// 24-bit unsigned integer multiply.
    Mul24,
    /// Per-byte multiply (normalised).
    V8Muld,
    /// Per-byte minimum.
    V8Min,
    /// Per-byte maximum.
    V8Max,
    /// Per-byte saturating add.
    V8Adds,
    /// Per-byte saturating subtract.
    V8Subs,
    /// Full-vector rotation of r0 by an immediate or by r5.
    Rotate,
}

impl MulOp {
    /// Operations whose result is a float.
    pub fn result_is_float(self) -> bool {
        matches!(self, MulOp::FMul)
    }

    /// Assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            MulOp::FMul => "fmul",
            MulOp::Mul24 => "mul24",
            MulOp::V8Muld => "v8muld",
            MulOp::V8Min => "v8min",
            MulOp::V8Max => "v8max",
            MulOp::V8Adds => "m_v8adds",
            MulOp::V8Subs => "m_v8subs",
            MulOp::Rotate => "rot",
        }
    }
}

/// Either ALU operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    /// Add ALU operation.
    Add(AddOp),
    /// Mul ALU operation.
    Mul(MulOp),
}

impl AluOp {
    /// True if the op only uses the left operand.
    pub fn is_unary(self) -> bool {
        match self {
            AluOp::Add(op) => op.is_unary(),
            AluOp::Mul(_) => false,
        }
    }

    /// True if the result is a float.
    pub fn result_is_float(self) -> bool {
        match self {
            AluOp::Add(op) => op.result_is_float(),
            AluOp::Mul(op) => op.result_is_float(),
        }
    }

    /// Assembler mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add(op) => op.mnemonic(),
            AluOp::Mul(op) => op.mnemonic(),
        }
    }
}

impl From<AddOp> for AluOp {
    fn from(op: AddOp) -> Self {
        AluOp::Add(op)
    }
}

impl From<MulOp> for AluOp {
    fn from(op: MulOp) -> Self {
        AluOp::Mul(op)
    }
}

/// Per-lane flag test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Zero flag set.
    ZS,
    /// Zero flag clear.
    ZC,
    /// Negative flag set.
    NS,
    /// Negative flag clear.
    NC,
}

impl Flag {
    /// Evaluate against one lane's flags.
    #[inline]
    pub fn test(self, zero: bool, negative: bool) -> bool {
        match self {
            Flag::ZS => zero,
            Flag::ZC => !zero,
            Flag::NS => negative,
            Flag::NC => !negative,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Flag::ZS => "zs",
            Flag::ZC => "zc",
            Flag::NS => "ns",
            Flag::NC => "nc",
        }
    }
}

/// Per-lane write predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AssignCond {
    /// No lane is written.
    Never,
    /// Every lane is written.
    #[default]
    Always,
    /// Lanes whose stored flags pass the test are written.
    Flag(Flag),
}

/// Flag-set request attached to an instruction.
///
/// VC4 always recomputes both N and Z. V3D pushes one flag, so the request
/// names the flag a later condition will test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SetFlags {
    /// Leave the flags untouched.
    #[default]
    None,
    /// Recompute flags; later tests use Z.
    Zero,
    /// Recompute flags; later tests use N.
    Negative,
}

impl SetFlags {
    /// True if flags are updated.
    pub fn is_set(self) -> bool {
        !matches!(self, SetFlags::None)
    }
}

/// Branch condition, reduced over the 16 lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCond {
    /// Unconditional.
    Always,
    /// Every lane passes the test.
    All(Flag),
    /// At least one lane passes the test.
    Any(Flag),
}

/// A symbolic branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Where a branch goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchTarget {
    /// A label in the same program, resolved at encode time.
    Label(Label),
    /// Offset in instructions from the first instruction after the three
    /// delay slots.
    Relative(i32),
    /// Absolute byte address in the code buffer.
    Absolute(u32),
}

/// ALU payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AluInstr {
    /// Operation.
    pub op: AluOp,
    /// Destination.
    pub dest: Reg,
    /// Left operand (always a register).
    pub src_a: Reg,
    /// Right operand; absent for unary ops.
    pub src_b: Option<Operand>,
    /// Per-lane write predicate.
    pub cond: AssignCond,
    /// Flag-set request.
    pub set_flags: SetFlags,
}

impl AluInstr {
    /// Iterate over the register operands.
    pub fn sources(&self) -> impl Iterator<Item = Reg> + '_ {
        std::iter::once(self.src_a).chain(self.src_b.and_then(Operand::as_reg))
    }

    /// If this is a plain move (`or x, r, r` or `v8min x, r, r`), the source.
    pub fn as_move(&self) -> Option<Reg> {
        match (self.op, self.src_b) {
            (AluOp::Add(AddOp::Or), Some(Operand::Reg(b)))
            | (AluOp::Mul(MulOp::V8Min), Some(Operand::Reg(b)))
                if b == self.src_a =>
            {
                Some(self.src_a)
            }
            _ => None,
        }
    }
}

/// Load-immediate payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadImmInstr {
    /// Destination.
    pub dest: Reg,
    /// Full 32-bit value.
    pub value: Imm,
    /// Per-lane write predicate.
    pub cond: AssignCond,
    /// Flag-set request.
    pub set_flags: SetFlags,
}

/// Branch payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchInstr {
    /// Condition.
    pub cond: BranchCond,
    /// Target.
    pub target: BranchTarget,
    /// Register receiving the return address, if any.
    pub link: Option<Reg>,
}

/// Instruction payload, one variant per tag.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    /// ALU operation.
    Alu(AluInstr),
    /// Conditional or unconditional branch.
    Branch(BranchInstr),
    /// Load a 32-bit immediate.
    LoadImm(LoadImmInstr),
    /// Branch target marker; produces no machine word.
    Label(Label),
    /// Receive the oldest pending TMU load into `dest`.
    Recv {
        /// Destination.
        dest: Reg,
    },
    /// Increment a hardware semaphore.
    SemaInc(u8),
    /// Decrement a hardware semaphore, stalling while it is zero.
    SemaDec(u8),
    /// No operation.
    Nop,
    /// End of program.
    End,
}

/// One logical machine instruction plus display-only annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    /// Payload.
    pub kind: InstrKind,
    /// Header line printed above the instruction.
    pub header: Option<String>,
    /// Trailing comment.
    pub comment: Option<String>,
}

impl Instr {
    /// Wrap a payload with no annotations.
    pub fn new(kind: InstrKind) -> Self {
        Self {
            kind,
            header: None,
            comment: None,
        }
    }

    /// Binary ALU operation.
    pub fn alu(op: impl Into<AluOp>, dest: Reg, a: Reg, b: impl Into<Operand>) -> Self {
        Self::new(InstrKind::Alu(AluInstr {
            op: op.into(),
            dest,
            src_a: a,
            src_b: Some(b.into()),
            cond: AssignCond::Always,
            set_flags: SetFlags::None,
        }))
    }

    /// Unary ALU operation.
    pub fn unary(op: AddOp, dest: Reg, a: Reg) -> Self {
        Self::new(InstrKind::Alu(AluInstr {
            op: AluOp::Add(op),
            dest,
            src_a: a,
            src_b: None,
            cond: AssignCond::Always,
            set_flags: SetFlags::None,
        }))
    }

    /// Register move (`or dest, src, src`).
    pub fn mov(dest: Reg, src: Reg) -> Self {
        Self::alu(AddOp::Or, dest, src, src)
    }

    /// Rotate r0 by `amount` (an immediate or r5) into `dest`.
    pub fn rotate(dest: Reg, src: Reg, amount: impl Into<Operand>) -> Self {
        Self::alu(MulOp::Rotate, dest, src, amount)
    }

    /// Load a 32-bit immediate.
    pub fn li(dest: Reg, value: impl Into<Imm>) -> Self {
        Self::new(InstrKind::LoadImm(LoadImmInstr {
            dest,
            value: value.into(),
            cond: AssignCond::Always,
            set_flags: SetFlags::None,
        }))
    }

    /// Branch.
    pub fn branch(cond: BranchCond, target: BranchTarget) -> Self {
        Self::new(InstrKind::Branch(BranchInstr {
            cond,
            target,
            link: None,
        }))
    }

    /// Branch to a label.
    pub fn branch_to(cond: BranchCond, label: Label) -> Self {
        Self::branch(cond, BranchTarget::Label(label))
    }

    /// Label marker.
    pub fn label(label: Label) -> Self {
        Self::new(InstrKind::Label(label))
    }

    /// TMU receive.
    pub fn recv(dest: Reg) -> Self {
        Self::new(InstrKind::Recv { dest })
    }

    /// No-op.
    pub fn nop() -> Self {
        Self::new(InstrKind::Nop)
    }

    /// Program end.
    pub fn end() -> Self {
        Self::new(InstrKind::End)
    }

    /// Attach a write predicate (ALU and load-immediate only).
    pub fn with_cond(mut self, cond: AssignCond) -> Self {
        match &mut self.kind {
            InstrKind::Alu(alu) => alu.cond = cond,
            InstrKind::LoadImm(li) => li.cond = cond,
            _ => {}
        }
        self
    }

    /// Attach a flag-set request (ALU and load-immediate only).
    pub fn with_set_flags(mut self, set_flags: SetFlags) -> Self {
        match &mut self.kind {
            InstrKind::Alu(alu) => alu.set_flags = set_flags,
            InstrKind::LoadImm(li) => li.set_flags = set_flags,
            _ => {}
        }
        self
    }

    /// Attach a link register (branches only).
    pub fn with_link(mut self, link: Reg) -> Self {
        if let InstrKind::Branch(br) = &mut self.kind {
            br.link = Some(link);
        }
        self
    }

    /// Attach a header line.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    /// Attach a trailing comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// True for label markers.
    pub fn is_label(&self) -> bool {
        matches!(self.kind, InstrKind::Label(_))
    }

    /// Compare payloads, ignoring annotations and encodings that the
    /// hardware treats as identical (rotate amounts modulo 16, unary
    /// operands, immediates by bit pattern).
    pub fn equivalent(&self, other: &Instr) -> bool {
        match (&self.kind, &other.kind) {
            (InstrKind::Alu(a), InstrKind::Alu(b)) => {
                if a.op != b.op
                    || a.dest != b.dest
                    || a.src_a != b.src_a
                    || a.cond != b.cond
                    || a.set_flags.is_set() != b.set_flags.is_set()
                {
                    return false;
                }
                if a.op.is_unary() {
                    return true;
                }
                match (a.op, a.src_b, b.src_b) {
                    (
                        AluOp::Mul(MulOp::Rotate),
                        Some(Operand::Imm(Imm::Int(x))),
                        Some(Operand::Imm(Imm::Int(y))),
                    ) => x.rem_euclid(16) == y.rem_euclid(16),
                    (_, x, y) => x == y,
                }
            }
            (InstrKind::LoadImm(a), InstrKind::LoadImm(b)) => {
                a.dest == b.dest
                    && a.value == b.value
                    && a.cond == b.cond
                    && a.set_flags.is_set() == b.set_flags.is_set()
            }
            (a, b) => a == b,
        }
    }
}

impl From<InstrKind> for Instr {
    fn from(kind: InstrKind) -> Self {
        Self::new(kind)
    }
}

impl From<i32> for Imm {
    fn from(v: i32) -> Self {
        Imm::Int(v)
    }
}

impl From<f32> for Imm {
    fn from(v: f32) -> Self {
        Imm::Float(v)
    }
}

fn write_cond(f: &mut fmt::Formatter<'_>, cond: AssignCond, set_flags: SetFlags) -> fmt::Result {
    match cond {
        AssignCond::Always => {}
        AssignCond::Never => f.write_str(".never")?,
        AssignCond::Flag(flag) => write!(f, ".if{}", flag.suffix())?,
    }
    if set_flags.is_set() {
        f.write_str(".sf")?;
    }
    Ok(())
}

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrKind::Alu(alu) => {
                f.write_str(alu.op.mnemonic())?;
                write_cond(f, alu.cond, alu.set_flags)?;
                write!(f, " {}, {}", alu.dest, alu.src_a)?;
                if let Some(b) = alu.src_b {
                    write!(f, ", {}", b)?;
                }
                Ok(())
            }
            InstrKind::LoadImm(li) => {
                f.write_str("li")?;
                write_cond(f, li.cond, li.set_flags)?;
                write!(f, " {}, {} (0x{:08X})", li.dest, li.value, li.value.bits())
            }
            InstrKind::Branch(br) => {
                f.write_str("b")?;
                match br.cond {
                    BranchCond::Always => {}
                    BranchCond::All(flag) => write!(f, ".all{}", flag.suffix())?,
                    BranchCond::Any(flag) => write!(f, ".any{}", flag.suffix())?,
                }
                match br.target {
                    BranchTarget::Label(l) => write!(f, " {}", l)?,
                    BranchTarget::Relative(off) => write!(f, " pc+4{:+}", off)?,
                    BranchTarget::Absolute(addr) => write!(f, " 0x{:X}", addr)?,
                }
                if let Some(link) = br.link {
                    write!(f, ", link {}", link)?;
                }
                Ok(())
            }
            InstrKind::Label(l) => write!(f, "{}:", l),
            InstrKind::Recv { dest } => write!(f, "recv {}", dest),
            InstrKind::SemaInc(id) => write!(f, "sema_inc {}", id),
            InstrKind::SemaDec(id) => write!(f, "sema_dec {}", id),
            InstrKind::Nop => f.write_str("nop"),
            InstrKind::End => f.write_str("end"),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(header) = &self.header {
            writeln!(f, "# {}", header)?;
        }
        write!(f, "{}", self.kind)?;
        if let Some(comment) = &self.comment {
            write!(f, "  # {}", comment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::register::Special;

    #[test]
    fn test_builder_sets_cond_and_flags() {
        let instr = Instr::alu(AddOp::Sub, Reg::None, Reg::a(0), Reg::b(1))
            .with_set_flags(SetFlags::Negative)
            .with_cond(AssignCond::Flag(Flag::ZC));

        match instr.kind {
            InstrKind::Alu(alu) => {
                assert_eq!(alu.cond, AssignCond::Flag(Flag::ZC));
                assert_eq!(alu.set_flags, SetFlags::Negative);
            }
            other => panic!("expected ALU, got {:?}", other),
        }
    }

    #[test]
    fn test_as_move() {
        let mv = Instr::mov(Reg::a(1), Reg::special(Special::Uniform));
        let InstrKind::Alu(alu) = &mv.kind else { panic!() };
        assert_eq!(alu.as_move(), Some(Reg::special(Special::Uniform)));

        let add = Instr::alu(AddOp::Add, Reg::a(1), Reg::a(2), Reg::b(2));
        let InstrKind::Alu(alu) = &add.kind else { panic!() };
        assert_eq!(alu.as_move(), None);
    }

    #[test]
    fn test_equivalent_ignores_annotations() {
        let a = Instr::nop().with_comment("padding");
        let b = Instr::nop();
        assert!(a.equivalent(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_equivalent_rotate_modulo() {
        let a = Instr::rotate(Reg::acc(1), Reg::acc(0), -3);
        let b = Instr::rotate(Reg::acc(1), Reg::acc(0), 13);
        assert!(a.equivalent(&b));
    }

    #[test]
    fn test_equivalent_unary_ignores_b() {
        let a = Instr::unary(AddOp::Not, Reg::a(1), Reg::a(2));
        let b = Instr::alu(AddOp::Not, Reg::a(1), Reg::a(2), Reg::a(2));
        assert!(a.equivalent(&b));
    }

    #[test]
    fn test_display() {
        let instr = Instr::alu(AddOp::Add, Reg::a(1), Reg::acc(0), 3)
            .with_cond(AssignCond::Flag(Flag::NS))
            .with_comment("bump");
        assert_eq!(instr.to_string(), "add.ifns ra1, r0, 3  # bump");
        assert_eq!(Instr::li(Reg::b(2), 16).to_string(), "li rb2, 16 (0x00000010)");
    }
}
