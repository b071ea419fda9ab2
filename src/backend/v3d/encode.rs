//! IR to V3D lowering.
//!
//! Most instructions lower to one word. The exceptions:
//!
//! | Instruction | Words |
//! |-------------|-------|
//! | label | none |
//! | load immediate outside the small-immediate table | 1 per 4-bit chunk, plus shifts and an optional `not` |
//! | end | `thrsw`, `thrsw`, `nop`, `nop` |
//! | `never` condition | `nop` |

use std::collections::HashMap;

use smallvec::{smallvec, SmallVec};

use crate::backend::{
    branch_offset, defined_label, label_positions, EncodeError, Encoder, Target, WORD_BYTES,
};
use crate::ir::{
    AddOp, AluInstr, AluOp, AssignCond, BranchCond, BranchInstr, BranchTarget, Flag, Imm, Instr,
    InstrKind, Label, LoadImmInstr, MulOp, Operand, Program, Reg, RegFile, SetFlags, Special,
};

use super::flags::{Cond, PushFlag};
use super::instr::{
    AddOpcode, AddSlot, AluWord, BranchCond as V3dCond, BranchDest, BranchWord, MulOpcode,
    MulSlot, Mux, Unpack, V3dInstr,
};
use super::pack;
use super::sig::Signals;
use super::small_imm;

const TARGET: &str = "v3d";

/// Magic write addresses.
mod waddr {
    pub const NOP: u8 = 6;
    pub const TMUD: u8 = 11;
    pub const TMUA: u8 = 12;
    pub const RECIP: u8 = 19;
    pub const RSQRT: u8 = 20;
    pub const EXP: u8 = 21;
    pub const LOG: u8 = 22;
}

type Words = SmallVec<[V3dInstr; 4]>;

/// Physical write address of `reg` and whether it is a magic register.
pub fn dest_addr(reg: Reg) -> Result<(u8, bool), EncodeError> {
    if !reg.in_range() {
        return Err(EncodeError::RegOutOfRange(reg));
    }
    Ok(match reg {
        Reg::File { file: RegFile::A, id } => (id, false),
        Reg::File { file: RegFile::B, id } => (32 + id, false),
        Reg::Acc(4) => return Err(EncodeError::ReadOnlyDest(reg)),
        Reg::Acc(n) => (n, true),
        Reg::None => (waddr::NOP, true),
        Reg::Special(s) => match s {
            s if s.is_read_only() => return Err(EncodeError::ReadOnlyDest(reg)),
            s if s.is_dma_only() => return Err(EncodeError::DmaUnsupported(reg)),
            Special::VpmWrite => (waddr::TMUD, true),
            Special::DmaStAddr | Special::Tmu0S => (waddr::TMUA, true),
            Special::SfuRecip => (waddr::RECIP, true),
            Special::SfuRecipSqrt => (waddr::RSQRT, true),
            Special::SfuExp => (waddr::EXP, true),
            Special::SfuLog => (waddr::LOG, true),
            _ => return Err(EncodeError::unsupported(TARGET, format!("write to {}", reg))),
        },
    })
}

/// Read-address arbitration for one word.
#[derive(Debug, Default)]
struct Ports {
    a: Option<u8>,
    b: Option<u8>,
    small_imm: bool,
}

impl Ports {
    fn read_rf(&mut self, addr: u8, reg: Reg) -> Result<Mux, EncodeError> {
        if self.a == Some(addr) {
            return Ok(Mux::A);
        }
        if !self.small_imm && self.b == Some(addr) {
            return Ok(Mux::B);
        }
        if self.a.is_none() {
            self.a = Some(addr);
            return Ok(Mux::A);
        }
        if self.b.is_none() {
            self.b = Some(addr);
            return Ok(Mux::B);
        }
        Err(EncodeError::ReadPortConflict(reg))
    }

    fn read(&mut self, reg: Reg) -> Result<Mux, EncodeError> {
        if !reg.in_range() {
            return Err(EncodeError::RegOutOfRange(reg));
        }
        match reg {
            Reg::Acc(n) => Ok(Mux::acc(n)),
            Reg::File { file: RegFile::A, id } => self.read_rf(id, reg),
            Reg::File { file: RegFile::B, id } => self.read_rf(32 + id, reg),
            Reg::Special(s) if s.is_dma_only() => Err(EncodeError::DmaUnsupported(reg)),
            Reg::Special(s) if s.is_readable() => Err(EncodeError::unsupported(
                TARGET,
                format!("{} can only be moved into a register", reg),
            )),
            _ => Err(EncodeError::NotReadable(reg)),
        }
    }

    fn imm(&mut self, imm: Imm) -> Result<Mux, EncodeError> {
        let idx = small_imm::encode(imm).ok_or(EncodeError::UnencodableImm(imm))?;
        match self.b {
            Some(used) if self.small_imm && used == idx => Ok(Mux::B),
            Some(used) if self.small_imm => Err(EncodeError::ImmConflict {
                first: small_imm::decode(used).unwrap_or(Imm::Int(0)),
                second: imm,
            }),
            Some(_) => Err(EncodeError::unsupported(
                TARGET,
                format!("small immediate {} needs raddr_b, already in use", imm),
            )),
            None => {
                self.b = Some(idx);
                self.small_imm = true;
                Ok(Mux::B)
            }
        }
    }

    fn operand(&mut self, op: Operand) -> Result<Mux, EncodeError> {
        match op {
            Operand::Reg(r) => self.read(r),
            Operand::Imm(i) => self.imm(i),
        }
    }

    fn apply(&self, w: &mut AluWord) {
        w.raddr_a = self.a.unwrap_or(0);
        w.raddr_b = self.b.unwrap_or(0);
        if self.small_imm {
            w.sig |= Signals::SMALL_IMM;
        }
    }
}

fn cond(c: AssignCond) -> Option<Cond> {
    match c {
        AssignCond::Flag(Flag::ZS | Flag::NS) => Some(Cond::IfA),
        AssignCond::Flag(Flag::ZC | Flag::NC) => Some(Cond::IfNA),
        AssignCond::Always | AssignCond::Never => None,
    }
}

fn push(sf: SetFlags) -> PushFlag {
    match sf {
        SetFlags::None => PushFlag::None,
        SetFlags::Zero => PushFlag::PushZ,
        SetFlags::Negative => PushFlag::PushN,
    }
}

fn add_opcode(op: AddOp) -> Result<(AddOpcode, Unpack), EncodeError> {
    Ok(match op {
        AddOp::FAdd => (AddOpcode::Fadd, Unpack::None),
        AddOp::FSub => (AddOpcode::Fsub, Unpack::None),
        AddOp::FMin => (AddOpcode::Fmin, Unpack::None),
        AddOp::FMax => (AddOpcode::Fmax, Unpack::None),
        AddOp::FMinAbs => (AddOpcode::Fmin, Unpack::Abs),
        AddOp::FMaxAbs => (AddOpcode::Fmax, Unpack::Abs),
        AddOp::FtoI => (AddOpcode::Ftoiz, Unpack::None),
        AddOp::ItoF => (AddOpcode::Itof, Unpack::None),
        AddOp::Add => (AddOpcode::Add, Unpack::None),
        AddOp::Sub => (AddOpcode::Sub, Unpack::None),
        AddOp::Shr => (AddOpcode::Shr, Unpack::None),
        AddOp::Asr => (AddOpcode::Asr, Unpack::None),
        AddOp::Ror => (AddOpcode::Ror, Unpack::None),
        AddOp::Shl => (AddOpcode::Shl, Unpack::None),
        AddOp::Min => (AddOpcode::Min, Unpack::None),
        AddOp::Max => (AddOpcode::Max, Unpack::None),
        AddOp::And => (AddOpcode::And, Unpack::None),
        AddOp::Or => (AddOpcode::Or, Unpack::None),
        AddOp::Xor => (AddOpcode::Xor, Unpack::None),
        AddOp::Not => (AddOpcode::Not, Unpack::None),
        AddOp::Clz => (AddOpcode::Clz, Unpack::None),
        AddOp::V8Adds | AddOp::V8Subs => {
            return Err(EncodeError::unsupported(TARGET, op.mnemonic()))
        }
    })
}

fn add_word(
    op: AddOpcode,
    unpack: Unpack,
    dest: Reg,
    a: Reg,
    b: Option<Operand>,
    c: AssignCond,
    sf: SetFlags,
) -> Result<AluWord, EncodeError> {
    let mut ports = Ports::default();
    let mut w = AluWord::nop();
    let mut slot = AddSlot::new(op);
    slot.a = ports.read(a)?;
    if let Some(b) = b {
        slot.b = ports.operand(b)?;
    }
    slot.a_unpack = unpack;
    slot.b_unpack = unpack;
    canonical_order(&mut slot);
    (slot.waddr, slot.magic_write) = dest_addr(dest)?;
    w.add = slot;
    w.flags.ac = cond(c);
    w.flags.apf = push(sf);
    ports.apply(&mut w);
    Ok(w)
}

/// `fadd` and `fmin` share opcodes with `faddnf` and `fmax`; the operand
/// order selects between them. Swap commutative operands into the order
/// the packed word will decode to.
fn canonical_order(slot: &mut AddSlot) {
    let key = |u: Unpack, m: Mux| u as u8 * 8 + m as u8;
    let ordered = key(slot.a_unpack, slot.a) > key(slot.b_unpack, slot.b);
    let want = match slot.op {
        AddOpcode::Fadd | AddOpcode::Fmin => false,
        AddOpcode::Faddnf | AddOpcode::Fmax => true,
        _ => return,
    };
    if ordered != want {
        std::mem::swap(&mut slot.a, &mut slot.b);
        std::mem::swap(&mut slot.a_unpack, &mut slot.b_unpack);
    }
}

fn index_word(op: AddOpcode, alu: &AluInstr) -> Result<AluWord, EncodeError> {
    let mut w = AluWord::nop();
    w.add = AddSlot::new(op);
    (w.add.waddr, w.add.magic_write) = dest_addr(alu.dest)?;
    w.flags.ac = cond(alu.cond);
    w.flags.apf = push(alu.set_flags);
    Ok(w)
}

fn lower_move_from(alu: &AluInstr, src: Special) -> Result<Option<AluWord>, EncodeError> {
    Ok(Some(match src {
        Special::Uniform => {
            if alu.cond != AssignCond::Always || alu.set_flags.is_set() {
                return Err(EncodeError::unsupported(
                    TARGET,
                    "conditional or flag-setting uniform load",
                ));
            }
            let mut w = AluWord::with_sig(Signals::LDUNIFRF);
            (w.sig_addr, w.sig_magic) = dest_addr(alu.dest)?;
            w
        }
        Special::ElemNum => index_word(AddOpcode::Eidx, alu)?,
        Special::QpuNum => index_word(AddOpcode::Tidx, alu)?,
        _ => return Ok(None),
    }))
}

fn lower_rotate(alu: &AluInstr) -> Result<AluWord, EncodeError> {
    if alu.src_a != Reg::acc(0) {
        return Err(EncodeError::InvalidRotate(format!(
            "source must be r0, got {}",
            alu.src_a
        )));
    }
    if alu.dest != Reg::acc(1) {
        return Err(EncodeError::InvalidRotate(format!(
            "destination must be r1, got {}",
            alu.dest
        )));
    }
    let amount = match alu.src_b {
        Some(Operand::Imm(Imm::Int(n))) if (-15..=15).contains(&n) && n != 0 => {
            n.rem_euclid(16) as u8
        }
        Some(Operand::Reg(Reg::Acc(5))) => {
            return Err(EncodeError::unsupported(TARGET, "rotate by r5"))
        }
        Some(other) => {
            return Err(EncodeError::InvalidRotate(format!(
                "amount must be a non-zero integer in [-15, 15], got {}",
                other
            )))
        }
        None => return Err(EncodeError::MissingOperand("rot")),
    };
    let mut w = AluWord::with_sig(Signals::ROTATE);
    w.mul = MulSlot::new(MulOpcode::Mov);
    w.mul.a = Mux::R0;
    w.mul.waddr = 1;
    w.mul.magic_write = true;
    w.raddr_b = amount;
    w.flags.mc = cond(alu.cond);
    w.flags.mpf = push(alu.set_flags);
    Ok(w)
}

fn lower_alu(alu: &AluInstr) -> Result<AluWord, EncodeError> {
    if let Some(Reg::Special(src)) = alu.as_move() {
        if let Some(w) = lower_move_from(alu, src)? {
            return Ok(w);
        }
    }
    match alu.op {
        AluOp::Add(op) => {
            let (opcode, unpack) = add_opcode(op)?;
            let b = if op.is_unary() {
                None
            } else {
                Some(alu.src_b.ok_or(EncodeError::MissingOperand(op.mnemonic()))?)
            };
            add_word(opcode, unpack, alu.dest, alu.src_a, b, alu.cond, alu.set_flags)
        }
        AluOp::Mul(MulOp::Rotate) => lower_rotate(alu),
        AluOp::Mul(op) => {
            let opcode = match op {
                MulOp::FMul => MulOpcode::Fmul,
                MulOp::Mul24 => MulOpcode::Umul24,
                MulOp::V8Min if alu.as_move().is_some() => MulOpcode::Mov,
                _ => return Err(EncodeError::unsupported(TARGET, op.mnemonic())),
            };
            let mut ports = Ports::default();
            let mut w = AluWord::nop();
            let mut slot = MulSlot::new(opcode);
            slot.a = ports.read(alu.src_a)?;
            if opcode != MulOpcode::Mov {
                let b = alu.src_b.ok_or(EncodeError::MissingOperand(op.mnemonic()))?;
                slot.b = ports.operand(b)?;
            }
            (slot.waddr, slot.magic_write) = dest_addr(alu.dest)?;
            w.mul = slot;
            w.flags.mc = cond(alu.cond);
            w.flags.mpf = push(alu.set_flags);
            ports.apply(&mut w);
            Ok(w)
        }
    }
}

/// `or dest, imm, imm` for a small immediate.
fn imm_word(li: &LoadImmInstr, value: Imm) -> Result<AluWord, EncodeError> {
    let mut ports = Ports::default();
    let mut w = AluWord::nop();
    let mut slot = AddSlot::new(AddOpcode::Or);
    slot.a = ports.imm(value)?;
    slot.b = ports.imm(value)?;
    (slot.waddr, slot.magic_write) = dest_addr(li.dest)?;
    w.add = slot;
    w.flags.ac = cond(li.cond);
    w.flags.apf = push(li.set_flags);
    ports.apply(&mut w);
    Ok(w)
}

fn update_word(op: AddOpcode, dest: Reg, b: Option<Imm>) -> Result<V3dInstr, EncodeError> {
    Ok(V3dInstr::Alu(add_word(
        op,
        Unpack::None,
        dest,
        dest,
        b.map(Operand::Imm),
        AssignCond::Always,
        SetFlags::None,
    )?))
}

/// Build a value outside the small-immediate table from 4-bit chunks,
/// most significant first. Negative values are built inverted and
/// finished with `not`.
fn lower_large_imm(li: &LoadImmInstr) -> Result<Words, EncodeError> {
    if li.cond != AssignCond::Always {
        return Err(EncodeError::unsupported(
            TARGET,
            "conditional large immediate",
        ));
    }
    if !matches!(li.dest, Reg::File { .. } | Reg::Acc(_)) {
        return Err(EncodeError::unsupported(
            TARGET,
            format!("large immediate into {}", li.dest),
        ));
    }
    let value = li.value.bits();
    let negative = (value as i32) < 0;
    let bits = if negative { !value } else { value };
    let nibble = |i: u32| ((bits >> (4 * i)) & 0xF) as i32;
    let top = (0..8).rev().find(|&i| nibble(i) != 0).unwrap_or(0);

    let first = LoadImmInstr {
        set_flags: SetFlags::None,
        ..li.clone()
    };
    let mut out: Words = smallvec![V3dInstr::Alu(imm_word(&first, Imm::Int(nibble(top)))?)];
    for i in (0..top).rev() {
        out.push(update_word(AddOpcode::Shl, li.dest, Some(Imm::Int(4)))?);
        if nibble(i) != 0 {
            out.push(update_word(AddOpcode::Or, li.dest, Some(Imm::Int(nibble(i))))?);
        }
    }
    if negative {
        out.push(update_word(AddOpcode::Not, li.dest, None)?);
    }
    if let Some(V3dInstr::Alu(last)) = out.last_mut() {
        last.flags.apf = push(li.set_flags);
    }
    Ok(out)
}

fn lower_load_imm(li: &LoadImmInstr) -> Result<Words, EncodeError> {
    if li.cond == AssignCond::Never {
        return Ok(smallvec![V3dInstr::nop()]);
    }
    if small_imm::encode(li.value).is_none() {
        return lower_large_imm(li);
    }
    Ok(smallvec![V3dInstr::Alu(imm_word(li, li.value)?)])
}

fn branch_cond(c: BranchCond) -> V3dCond {
    match c {
        BranchCond::Always => V3dCond::Always,
        BranchCond::All(Flag::ZS | Flag::NS) => V3dCond::AllA,
        BranchCond::All(Flag::ZC | Flag::NC) => V3dCond::AllNA,
        BranchCond::Any(Flag::ZS | Flag::NS) => V3dCond::AnyA,
        BranchCond::Any(Flag::ZC | Flag::NC) => V3dCond::AnyNA,
    }
}

fn lower_branch(br: &BranchInstr, target: BranchTarget) -> Result<BranchWord, EncodeError> {
    if br.link.is_some() {
        return Err(EncodeError::unsupported(TARGET, "branch with link"));
    }
    let (bdi, offset) = match target {
        BranchTarget::Relative(n) => (BranchDest::Rel, n.wrapping_mul(WORD_BYTES as i32) as u32),
        BranchTarget::Absolute(bytes) => (BranchDest::Abs, bytes),
        BranchTarget::Label(l) => return Err(EncodeError::UnknownLabel(l)),
    };
    Ok(BranchWord {
        cond: branch_cond(br.cond),
        msfign: 0,
        bdi,
        bdu: BranchDest::Abs,
        ub: false,
        raddr_a: 0,
        offset,
    })
}

/// Lower one non-branch instruction.
fn lower_instr(instr: &Instr) -> Result<Words, EncodeError> {
    Ok(match &instr.kind {
        InstrKind::Alu(alu) if alu.cond == AssignCond::Never => smallvec![V3dInstr::nop()],
        InstrKind::Alu(alu) => smallvec![V3dInstr::Alu(lower_alu(alu)?)],
        InstrKind::LoadImm(li) => lower_load_imm(li)?,
        InstrKind::Recv { dest } => {
            let mut w = AluWord::with_sig(Signals::LDTMU);
            (w.sig_addr, w.sig_magic) = dest_addr(*dest)?;
            smallvec![V3dInstr::Alu(w)]
        }
        InstrKind::SemaInc(_) | InstrKind::SemaDec(_) => {
            return Err(EncodeError::unsupported(TARGET, "semaphores"))
        }
        InstrKind::Nop => smallvec![V3dInstr::nop()],
        InstrKind::End => smallvec![
            V3dInstr::Alu(AluWord::with_sig(Signals::THRSW)),
            V3dInstr::Alu(AluWord::with_sig(Signals::THRSW)),
            V3dInstr::nop(),
            V3dInstr::nop(),
        ],
        InstrKind::Label(_) => Words::new(),
        InstrKind::Branch(br) => smallvec![V3dInstr::Branch(lower_branch(
            br,
            BranchTarget::Relative(0)
        )?)],
    })
}

/// Encoder for V3D 4.1.
#[derive(Debug, Clone, Default)]
pub struct V3dEncoder;

impl V3dEncoder {
    pub fn new() -> Self {
        V3dEncoder
    }

    /// Lower a program to structured instructions, resolving labels.
    pub fn lower(&self, program: &Program) -> Result<Vec<V3dInstr>, EncodeError> {
        let expanded = program
            .iter()
            .map(lower_instr)
            .collect::<Result<Vec<_>, _>>()?;
        let labels: HashMap<Label, usize> = label_positions(
            program
                .iter()
                .zip(&expanded)
                .map(|(i, w)| (defined_label(i), w.len())),
        )?;

        let mut out = Vec::with_capacity(expanded.iter().map(|w| w.len()).sum());
        for (instr, words) in program.iter().zip(expanded) {
            if let InstrKind::Branch(br) = &instr.kind {
                let target = branch_offset(br.target, out.len(), &labels)?;
                out.push(V3dInstr::Branch(lower_branch(br, target)?));
            } else {
                out.extend(words);
            }
        }
        Ok(out)
    }
}

impl Encoder for V3dEncoder {
    fn target(&self) -> Target {
        Target::V3d
    }

    fn encode(&self, program: &Program) -> Result<Vec<u64>, EncodeError> {
        let lowered = self.lower(program)?;
        let words = lowered
            .iter()
            .map(pack::pack)
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!(
            "v3d: encoded {} instructions into {} words",
            program.len(),
            words.len()
        );
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::v3d::pack::unpack;

    fn lower_one(instr: Instr) -> Result<Vec<V3dInstr>, EncodeError> {
        V3dEncoder::new().lower(&vec![instr].into())
    }

    fn alu(words: &[V3dInstr], i: usize) -> AluWord {
        match words[i] {
            V3dInstr::Alu(w) => w,
            other => panic!("expected ALU word, got {:?}", other),
        }
    }

    /// Evaluate a large-immediate sequence on one lane.
    fn run_chunks(words: &[V3dInstr]) -> u32 {
        let mut acc = 0u32;
        for w in words {
            let w = match w {
                V3dInstr::Alu(w) => w,
                _ => panic!("unexpected branch"),
            };
            let imm = small_imm::decode(w.raddr_b).map(|i| i.bits()).unwrap_or(0);
            acc = match w.add.op {
                AddOpcode::Or if w.add.a == Mux::B => imm,
                AddOpcode::Or => acc | imm,
                AddOpcode::Shl => acc << imm,
                AddOpcode::Not => !acc,
                other => panic!("unexpected {:?}", other),
            };
        }
        acc
    }

    #[test]
    fn test_register_mapping() {
        let words = lower_one(Instr::alu(AddOp::Add, Reg::b(3), Reg::a(5), Reg::b(7))).unwrap();
        let w = alu(&words, 0);
        assert_eq!(w.add.op, AddOpcode::Add);
        assert_eq!((w.raddr_a, w.raddr_b), (5, 39));
        assert_eq!((w.add.a, w.add.b), (Mux::A, Mux::B));
        assert_eq!((w.add.waddr, w.add.magic_write), (35, false));
    }

    #[test]
    fn test_identical_address_reuses_port() {
        let words = lower_one(Instr::alu(AddOp::Add, Reg::a(0), Reg::a(9), Reg::a(9))).unwrap();
        let w = alu(&words, 0);
        assert_eq!((w.add.a, w.add.b), (Mux::A, Mux::A));
        assert_eq!(w.raddr_a, 9);
    }

    #[test]
    fn test_same_file_is_not_a_conflict() {
        // one physical file: two A-file reads take both ports
        let words = lower_one(Instr::alu(AddOp::Add, Reg::a(0), Reg::a(1), Reg::a(2))).unwrap();
        let w = alu(&words, 0);
        assert_eq!((w.raddr_a, w.raddr_b), (1, 2));
    }

    #[test]
    fn test_third_address_conflicts() {
        let mut ports = Ports::default();
        ports.read(Reg::a(1)).unwrap();
        ports.read(Reg::b(1)).unwrap();
        assert_eq!(ports.read(Reg::a(1)).unwrap(), Mux::A);
        assert!(matches!(
            ports.read(Reg::a(2)),
            Err(EncodeError::ReadPortConflict(_))
        ));
    }

    #[test]
    fn test_special_destinations() {
        let w = alu(
            &lower_one(Instr::mov(Reg::special(Special::VpmWrite), Reg::a(0))).unwrap(),
            0,
        );
        assert_eq!((w.add.waddr, w.add.magic_write), (waddr::TMUD, true));

        let w = alu(
            &lower_one(Instr::mov(Reg::special(Special::DmaStAddr), Reg::a(0))).unwrap(),
            0,
        );
        assert_eq!(w.add.waddr, waddr::TMUA);

        let w = alu(
            &lower_one(Instr::mov(Reg::special(Special::SfuExp), Reg::a(0))).unwrap(),
            0,
        );
        assert_eq!(w.add.waddr, waddr::EXP);
    }

    #[test]
    fn test_dma_registers_rejected() {
        for s in [Special::DmaLdAddr, Special::RdSetup, Special::WrSetup] {
            assert!(matches!(
                lower_one(Instr::mov(Reg::special(s), Reg::a(0))),
                Err(EncodeError::DmaUnsupported(_))
            ));
        }
        assert!(matches!(
            lower_one(Instr::alu(AddOp::Add, Reg::a(0), Reg::special(Special::DmaLdWait), 1)),
            Err(EncodeError::DmaUnsupported(_))
        ));
    }

    #[test]
    fn test_special_moves() {
        let w = alu(
            &lower_one(Instr::mov(Reg::a(4), Reg::special(Special::Uniform))).unwrap(),
            0,
        );
        assert_eq!(w.sig, Signals::LDUNIFRF);
        assert_eq!((w.sig_addr, w.sig_magic), (4, false));

        let w = alu(
            &lower_one(Instr::mov(Reg::acc(2), Reg::special(Special::ElemNum))).unwrap(),
            0,
        );
        assert_eq!(w.add.op, AddOpcode::Eidx);

        let w = alu(
            &lower_one(Instr::mov(Reg::acc(2), Reg::special(Special::QpuNum))).unwrap(),
            0,
        );
        assert_eq!(w.add.op, AddOpcode::Tidx);
    }

    #[test]
    fn test_small_immediate_float() {
        let w = alu(
            &lower_one(Instr::alu(AddOp::FAdd, Reg::a(0), Reg::a(1), 2.0f32)).unwrap(),
            0,
        );
        assert!(w.sig.contains(Signals::SMALL_IMM));
        assert_eq!(w.raddr_b, 41);
    }

    #[test]
    fn test_rotate() {
        let w = alu(&lower_one(Instr::rotate(Reg::acc(1), Reg::acc(0), -2)).unwrap(), 0);
        assert_eq!(w.sig, Signals::ROTATE);
        assert_eq!(w.mul.op, MulOpcode::Mov);
        assert_eq!(w.raddr_b, 14);

        assert!(matches!(
            lower_one(Instr::rotate(Reg::acc(2), Reg::acc(0), 1)),
            Err(EncodeError::InvalidRotate(_))
        ));
        assert!(matches!(
            lower_one(Instr::rotate(Reg::acc(1), Reg::acc(0), Reg::acc(5))),
            Err(EncodeError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_large_immediates() {
        for value in [16i32, 0x1234_5678, -17, i32::MIN, 0x7FFF_FFFF, 0x100] {
            let words = lower_one(Instr::li(Reg::acc(0), value)).unwrap();
            assert!(words.len() > 1);
            assert_eq!(run_chunks(&words), value as u32, "value {:#x}", value);
        }
        let words = lower_one(Instr::li(Reg::acc(0), 7)).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(run_chunks(&words), 7);
    }

    #[test]
    fn test_conditional_large_immediate_rejected() {
        let instr = Instr::li(Reg::a(0), 1000).with_cond(AssignCond::Flag(Flag::ZS));
        assert!(matches!(
            lower_one(instr),
            Err(EncodeError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_conditions_and_flags() {
        let instr = Instr::alu(AddOp::Sub, Reg::None, Reg::a(0), Reg::a(1))
            .with_set_flags(SetFlags::Negative);
        let w = alu(&lower_one(instr).unwrap(), 0);
        assert_eq!(w.flags.apf, PushFlag::PushN);

        let instr = Instr::mov(Reg::a(0), Reg::a(1)).with_cond(AssignCond::Flag(Flag::ZC));
        let w = alu(&lower_one(instr).unwrap(), 0);
        assert_eq!(w.flags.ac, Some(Cond::IfNA));

        let instr = Instr::mov(Reg::a(0), Reg::a(1)).with_cond(AssignCond::Never);
        assert_eq!(lower_one(instr).unwrap(), vec![V3dInstr::nop()]);
    }

    #[test]
    fn test_end_sequence() {
        let words = lower_one(Instr::end()).unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(alu(&words, 0).sig, Signals::THRSW);
        assert_eq!(alu(&words, 1).sig, Signals::THRSW);
        assert_eq!(words[2], V3dInstr::nop());
    }

    #[test]
    fn test_unsupported_instructions() {
        assert!(lower_one(Instr::new(InstrKind::SemaInc(0))).is_err());
        let br = Instr::branch(BranchCond::Always, BranchTarget::Relative(0)).with_link(Reg::a(0));
        assert!(lower_one(br).is_err());
    }

    #[test]
    fn test_branch_over_expanded_immediate() {
        let done = Label(1);
        let prog: Program = vec![
            Instr::branch_to(BranchCond::Any(Flag::ZC), done),
            Instr::li(Reg::a(0), 0x1234),
            Instr::label(done),
            Instr::end(),
        ]
        .into();
        let words = V3dEncoder::new().lower(&prog).unwrap();
        // li 0x1234 expands to or, shl, or, shl, or, shl, or
        let li_len = words.len() - 1 - 4;
        match words[0] {
            V3dInstr::Branch(b) => {
                assert_eq!(b.cond, V3dCond::AnyNA);
                assert_eq!(b.bdi, BranchDest::Rel);
                assert_eq!(b.offset as i32, (1 + li_len as i32 - 4) * 8);
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_encoded_words_unpack() {
        let prog: Program = vec![
            Instr::mov(Reg::a(1), Reg::special(Special::Uniform)),
            Instr::alu(AddOp::FMinAbs, Reg::a(2), Reg::a(1), Reg::acc(3)),
            Instr::alu(MulOp::FMul, Reg::acc(0), Reg::a(1), 0.5f32),
            Instr::end(),
        ]
        .into();
        let enc = V3dEncoder::new();
        let lowered = enc.lower(&prog).unwrap();
        let words = enc.encode(&prog).unwrap();
        assert_eq!(words.len(), lowered.len());
        for (w, l) in words.iter().zip(&lowered) {
            assert_eq!(unpack(*w).unwrap(), *l);
        }
    }
}
