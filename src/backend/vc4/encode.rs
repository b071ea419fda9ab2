//! IR to VC4 word encoder.

use smallvec::{smallvec, SmallVec};

use crate::backend::{
    branch_offset, defined_label, label_positions, Bundle, EncodeError, Encoder, Target,
    WORD_BYTES,
};
use crate::ir::{
    AddOp, AluInstr, AluOp, AssignCond, BranchCond, BranchInstr, BranchTarget, Flag, Imm, Instr,
    InstrKind, Label, LoadImmInstr, MulOp, Operand, Program, Reg, RegFile,
};
use std::collections::HashMap;

use super::addr;
use super::fields::{
    AluWord, BranchWord, LoadImmWord, MUX_A, MUX_B, NOP_WORD, SIG_END, SIG_LDTMU0,
    SIG_SMALL_IMM, WADDR_NOP,
};
use super::pair;
use super::small_imm;

const TARGET: &str = "vc4";

/// Add ALU opcode.
pub fn add_opcode(op: AddOp) -> u8 {
    match op {
        AddOp::FAdd => 1,
        AddOp::FSub => 2,
        AddOp::FMin => 3,
        AddOp::FMax => 4,
        AddOp::FMinAbs => 5,
        AddOp::FMaxAbs => 6,
        AddOp::FtoI => 7,
        AddOp::ItoF => 8,
        AddOp::Add => 12,
        AddOp::Sub => 13,
        AddOp::Shr => 14,
        AddOp::Asr => 15,
        AddOp::Ror => 16,
        AddOp::Shl => 17,
        AddOp::Min => 18,
        AddOp::Max => 19,
        AddOp::And => 20,
        AddOp::Or => 21,
        AddOp::Xor => 22,
        AddOp::Not => 23,
        AddOp::Clz => 24,
        AddOp::V8Adds => 30,
        AddOp::V8Subs => 31,
    }
}

/// Mul ALU opcode. Rotation is encoded as `v8min` plus a rotate index.
pub fn mul_opcode(op: MulOp) -> u8 {
    match op {
        MulOp::FMul => 1,
        MulOp::Mul24 => 2,
        MulOp::V8Muld => 3,
        MulOp::V8Min | MulOp::Rotate => 4,
        MulOp::V8Max => 5,
        MulOp::V8Adds => 6,
        MulOp::V8Subs => 7,
    }
}

/// Condition field value.
pub fn cond_code(cond: AssignCond) -> u8 {
    match cond {
        AssignCond::Never => 0,
        AssignCond::Always => 1,
        AssignCond::Flag(Flag::ZS) => 2,
        AssignCond::Flag(Flag::ZC) => 3,
        AssignCond::Flag(Flag::NS) => 4,
        AssignCond::Flag(Flag::NC) => 5,
    }
}

/// Branch condition field value.
pub fn branch_cond_code(cond: BranchCond) -> u8 {
    match cond {
        BranchCond::All(Flag::ZS) => 0,
        BranchCond::All(Flag::ZC) => 1,
        BranchCond::Any(Flag::ZS) => 2,
        BranchCond::Any(Flag::ZC) => 3,
        BranchCond::All(Flag::NS) => 4,
        BranchCond::All(Flag::NC) => 5,
        BranchCond::Any(Flag::NS) => 6,
        BranchCond::Any(Flag::NC) => 7,
        BranchCond::Always => 15,
    }
}

/// What `raddr_b` currently carries.
#[derive(Debug, Clone, Copy)]
enum PortB {
    Reg(u8, Reg),
    Imm(u8, Imm),
    Rotate(u8),
}

/// Accumulates one ALU word, arbitrating read ports and write files.
#[derive(Debug)]
struct AluBuilder {
    word: AluWord,
    port_a: Option<(u8, Reg)>,
    port_b: Option<PortB>,
    add_file: Option<RegFile>,
    mul_file: Option<RegFile>,
}

impl AluBuilder {
    fn new() -> Self {
        Self {
            word: AluWord::nop(),
            port_a: None,
            port_b: None,
            add_file: None,
            mul_file: None,
        }
    }

    fn claim_a(&mut self, addr: u8, reg: Reg) -> Result<u8, EncodeError> {
        match self.port_a {
            Some((used, prev)) if used != addr => Err(EncodeError::RegFileConflict {
                a: prev,
                b: reg,
                file: 'A',
            }),
            _ => {
                self.port_a = Some((addr, reg));
                self.word.raddr_a = addr;
                Ok(MUX_A)
            }
        }
    }

    fn claim_b(&mut self, addr: u8, reg: Reg) -> Result<u8, EncodeError> {
        match self.port_b {
            Some(PortB::Reg(used, _)) if used == addr => Ok(MUX_B),
            Some(PortB::Reg(_, prev)) => Err(EncodeError::RegFileConflict {
                a: prev,
                b: reg,
                file: 'B',
            }),
            Some(PortB::Imm(_, imm)) => Err(EncodeError::unsupported(
                TARGET,
                format!("{} and small immediate {} both need raddr_b", reg, imm),
            )),
            Some(PortB::Rotate(_)) => Err(EncodeError::unsupported(
                TARGET,
                format!("{} cannot be read in a rotate instruction", reg),
            )),
            None => {
                self.port_b = Some(PortB::Reg(addr, reg));
                self.word.raddr_b = addr;
                Ok(MUX_B)
            }
        }
    }

    fn port_a_free_for(&self, addr: u8) -> bool {
        self.port_a.map_or(true, |(used, _)| used == addr)
    }

    /// Input mux reading `reg`.
    fn read(&mut self, reg: Reg) -> Result<u8, EncodeError> {
        if !reg.in_range() {
            return Err(EncodeError::RegOutOfRange(reg));
        }
        match reg {
            Reg::Acc(n) => Ok(n),
            Reg::File { file: RegFile::A, id } => self.claim_a(id, reg),
            Reg::File { file: RegFile::B, id } => self.claim_b(id, reg),
            Reg::Special(s) => match addr::special_read_addr(s) {
                Some((a, Some(RegFile::A))) => self.claim_a(a, reg),
                Some((a, Some(RegFile::B))) => self.claim_b(a, reg),
                Some((a, None)) if self.port_a_free_for(a) => self.claim_a(a, reg),
                Some((a, None)) => self.claim_b(a, reg),
                None => Err(EncodeError::NotReadable(reg)),
            },
            Reg::None => Err(EncodeError::NotReadable(reg)),
        }
    }

    /// Input mux reading a small immediate.
    fn read_imm(&mut self, imm: Imm) -> Result<u8, EncodeError> {
        let idx = small_imm::encode(imm).ok_or(EncodeError::UnencodableImm(imm))?;
        match self.port_b {
            Some(PortB::Imm(used, _)) if used == idx => Ok(MUX_B),
            Some(PortB::Imm(_, first)) => Err(EncodeError::ImmConflict { first, second: imm }),
            Some(PortB::Reg(_, reg)) => Err(EncodeError::unsupported(
                TARGET,
                format!("{} and small immediate {} both need raddr_b", reg, imm),
            )),
            Some(PortB::Rotate(_)) => Err(EncodeError::unsupported(
                TARGET,
                format!("small immediate {} in a rotate instruction", imm),
            )),
            None => {
                self.port_b = Some(PortB::Imm(idx, imm));
                self.word.raddr_b = idx;
                self.word.sig = SIG_SMALL_IMM;
                Ok(MUX_B)
            }
        }
    }

    fn read_operand(&mut self, op: Operand) -> Result<u8, EncodeError> {
        match op {
            Operand::Reg(r) => self.read(r),
            Operand::Imm(i) => self.read_imm(i),
        }
    }

    fn set_rotate(&mut self, idx: u8) -> Result<(), EncodeError> {
        if self.port_b.is_some() {
            return Err(EncodeError::InvalidRotate(
                "raddr_b already in use".to_string(),
            ));
        }
        self.port_b = Some(PortB::Rotate(idx));
        self.word.raddr_b = idx;
        self.word.sig = SIG_SMALL_IMM;
        Ok(())
    }

    /// Operand muxes for an ALU op: `(a, b)`.
    fn sources(&mut self, alu: &AluInstr) -> Result<(u8, u8), EncodeError> {
        let a = self.read(alu.src_a)?;
        let b = match alu.src_b {
            Some(op) if !alu.op.is_unary() => self.read_operand(op)?,
            Some(_) => a,
            None if alu.op.is_unary() => a,
            None => return Err(EncodeError::MissingOperand(alu.op.mnemonic())),
        };
        Ok((a, b))
    }

    fn add(&mut self, alu: &AluInstr, op: AddOp) -> Result<(), EncodeError> {
        let (a, b) = self.sources(alu)?;
        let (waddr, file) = addr::write_addr(alu.dest)?;
        self.word.op_add = add_opcode(op);
        self.word.add_a = a;
        self.word.add_b = b;
        self.word.waddr_add = waddr;
        self.word.cond_add = cond_code(alu.cond);
        self.word.sf |= alu.set_flags.is_set();
        self.add_file = file;
        Ok(())
    }

    fn mul(&mut self, alu: &AluInstr, op: MulOp) -> Result<(), EncodeError> {
        let (a, b) = if op == MulOp::Rotate {
            if alu.src_a != Reg::acc(0) {
                return Err(EncodeError::InvalidRotate(format!(
                    "source must be r0, got {}",
                    alu.src_a
                )));
            }
            // A zero rotation is the plain `v8min r0, r0` move.
            let idx = match alu.src_b {
                Some(Operand::Reg(Reg::Acc(5))) => Some(small_imm::ROTATE_BY_R5),
                Some(Operand::Imm(Imm::Int(n))) if (-15..=15).contains(&n) => {
                    small_imm::encode_rotate(n)
                }
                Some(other) => {
                    return Err(EncodeError::InvalidRotate(format!(
                        "amount must be r5 or an integer in [-15, 15], got {}",
                        other
                    )))
                }
                None => return Err(EncodeError::MissingOperand("rot")),
            };
            if let Some(idx) = idx {
                self.set_rotate(idx)?;
            }
            (0, 0)
        } else {
            self.sources(alu)?
        };
        let (waddr, file) = addr::write_addr(alu.dest)?;
        self.word.op_mul = mul_opcode(op);
        self.word.mul_a = a;
        self.word.mul_b = b;
        self.word.waddr_mul = waddr;
        self.word.cond_mul = cond_code(alu.cond);
        self.word.sf |= alu.set_flags.is_set();
        self.mul_file = file;
        Ok(())
    }

    /// Resolve the write-swap bit and produce the word.
    fn finish(mut self) -> Result<AluWord, EncodeError> {
        // ws = 0: add -> A, mul -> B. ws = 1: add -> B, mul -> A.
        let ws = self.add_file == Some(RegFile::B) || self.mul_file == Some(RegFile::A);
        let add_ok = self.add_file.map_or(true, |f| (f == RegFile::B) == ws);
        let mul_ok = self.mul_file.map_or(true, |f| (f == RegFile::A) == ws);
        if !(add_ok && mul_ok) {
            return Err(EncodeError::unsupported(
                TARGET,
                "add and mul results need the same register file",
            ));
        }
        self.word.ws = ws;
        Ok(self.word)
    }
}

/// Encode one or two ALU instructions (at most one per unit) into a word.
pub fn encode_alu(instrs: &[&AluInstr]) -> Result<AluWord, EncodeError> {
    let mut b = AluBuilder::new();
    let mut has_add = false;
    let mut has_mul = false;
    for alu in instrs {
        match alu.op {
            AluOp::Add(op) if !has_add => {
                has_add = true;
                b.add(alu, op)?;
            }
            AluOp::Mul(op) if !has_mul => {
                if has_add && alu.set_flags.is_set() {
                    return Err(EncodeError::unsupported(
                        TARGET,
                        "mul unit cannot set flags alongside an add op",
                    ));
                }
                has_mul = true;
                b.mul(alu, op)?;
            }
            _ => {
                return Err(EncodeError::unsupported(
                    TARGET,
                    "two operations for the same ALU in one word",
                ))
            }
        }
    }
    b.finish()
}

fn encode_load_imm(li: &LoadImmInstr) -> Result<u64, EncodeError> {
    let (waddr, file) = addr::write_addr(li.dest)?;
    let mut w = LoadImmWord::empty(li.value.bits());
    w.waddr_add = waddr;
    w.ws = file == Some(RegFile::B);
    w.cond_add = cond_code(li.cond);
    w.sf = li.set_flags.is_set();
    Ok(w.to_bits())
}

fn encode_branch(
    br: &BranchInstr,
    at: usize,
    labels: &HashMap<Label, usize>,
) -> Result<u64, EncodeError> {
    let (rel, imm) = match branch_offset(br.target, at, labels)? {
        BranchTarget::Relative(n) => (true, n.wrapping_mul(WORD_BYTES as i32) as u32),
        BranchTarget::Absolute(bytes) => (false, bytes),
        BranchTarget::Label(l) => return Err(EncodeError::UnknownLabel(l)),
    };
    let (waddr_add, ws) = match br.link {
        Some(link) => {
            let (addr, file) = addr::write_addr(link)?;
            (addr, file == Some(RegFile::B))
        }
        None => (WADDR_NOP, false),
    };
    Ok(BranchWord {
        cond: branch_cond_code(br.cond),
        rel,
        reg: false,
        raddr_a: 0,
        ws,
        waddr_add,
        waddr_mul: WADDR_NOP,
        imm,
    }
    .to_bits())
}

fn encode_recv(dest: Reg) -> Result<u64, EncodeError> {
    let (waddr, file) = addr::write_addr(dest)?;
    let mut w = AluWord::nop();
    w.sig = SIG_LDTMU0;
    w.op_add = add_opcode(AddOp::Or);
    w.add_a = 4;
    w.add_b = 4;
    w.waddr_add = waddr;
    w.ws = file == Some(RegFile::B);
    w.cond_add = cond_code(AssignCond::Always);
    Ok(w.to_bits())
}

fn semaphore(id: u8, dec: bool) -> Result<u64, EncodeError> {
    if id > 15 {
        return Err(EncodeError::BadSemaphore(id));
    }
    Ok(LoadImmWord::semaphore(id, dec).to_bits())
}

/// Number of words a bundle occupies.
pub fn bundle_size(bundle: &[Instr]) -> usize {
    match bundle.first().map(|i| &i.kind) {
        Some(InstrKind::Label(_)) | None => 0,
        Some(InstrKind::End) => 3,
        Some(_) => 1,
    }
}

/// Encode one bundle placed at word index `at`.
pub fn encode_bundle(
    bundle: &[Instr],
    at: usize,
    labels: &HashMap<Label, usize>,
) -> Result<SmallVec<[u64; 3]>, EncodeError> {
    let Some(first) = bundle.first() else {
        return Ok(SmallVec::new());
    };
    if bundle.len() > 1 {
        let alus = bundle
            .iter()
            .map(|i| match &i.kind {
                InstrKind::Alu(alu) => Ok(alu),
                _ => Err(EncodeError::unsupported(TARGET, "only ALU ops can share a word")),
            })
            .collect::<Result<SmallVec<[&AluInstr; 2]>, _>>()?;
        return Ok(smallvec![encode_alu(&alus)?.to_bits()]);
    }
    let word = match &first.kind {
        InstrKind::Alu(alu) => encode_alu(&[alu])?.to_bits(),
        InstrKind::LoadImm(li) => encode_load_imm(li)?,
        InstrKind::Branch(br) => encode_branch(br, at, labels)?,
        InstrKind::Recv { dest } => encode_recv(*dest)?,
        InstrKind::SemaInc(id) => semaphore(*id, false)?,
        InstrKind::SemaDec(id) => semaphore(*id, true)?,
        InstrKind::Nop => NOP_WORD,
        InstrKind::Label(_) => return Ok(SmallVec::new()),
        InstrKind::End => {
            let mut end = AluWord::nop();
            end.sig = SIG_END;
            return Ok(smallvec![end.to_bits(), NOP_WORD, NOP_WORD]);
        }
    };
    Ok(smallvec![word])
}

/// Encoder for the VideoCore IV.
#[derive(Debug, Clone, Default)]
pub struct Vc4Encoder {
    pair_alu: bool,
}

impl Vc4Encoder {
    /// Encoder emitting one word per instruction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable merging adjacent add/mul operations.
    pub fn with_pairing(mut self, enabled: bool) -> Self {
        self.pair_alu = enabled;
        self
    }

    /// Group instructions into words.
    pub fn bundles(&self, program: &Program) -> Vec<Bundle> {
        if self.pair_alu {
            pair::pair(program.as_slice())
        } else {
            program.iter().map(|i| smallvec![i.clone()]).collect()
        }
    }
}

impl Encoder for Vc4Encoder {
    fn target(&self) -> Target {
        Target::Vc4
    }

    fn encode(&self, program: &Program) -> Result<Vec<u64>, EncodeError> {
        let bundles = self.bundles(program);
        let labels = label_positions(
            bundles
                .iter()
                .map(|b| (b.first().and_then(defined_label), bundle_size(b))),
        )?;

        let mut words = Vec::with_capacity(bundles.len() + 2);
        for (i, bundle) in bundles.iter().enumerate() {
            let encoded = encode_bundle(bundle, words.len(), &labels).map_err(|e| {
                log::debug!("vc4: bundle {} ({}) failed: {}", i, bundle[0], e);
                e
            })?;
            words.extend(encoded);
        }
        log::debug!(
            "vc4: encoded {} instructions into {} words",
            program.len(),
            words.len()
        );
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::vc4::fields::{self, SIG_BRANCH, SIG_LOAD_IMM};
    use crate::ir::{SetFlags, Special};

    fn one(instr: Instr) -> Result<u64, EncodeError> {
        let prog: Program = vec![instr].into();
        Vc4Encoder::new().encode(&prog).map(|w| w[0])
    }

    #[test]
    fn test_nop_and_end() {
        let prog: Program = vec![Instr::nop(), Instr::end()].into();
        let words = Vc4Encoder::new().encode(&prog).unwrap();
        assert_eq!(words.len(), 4);
        assert_eq!(words[0], NOP_WORD);
        assert_eq!(fields::signal(words[1]), SIG_END);
        assert_eq!(words[2], NOP_WORD);
        assert_eq!(words[3], NOP_WORD);
    }

    #[test]
    fn test_add_fields() {
        let w = one(Instr::alu(AddOp::Add, Reg::a(1), Reg::a(2), Reg::b(3))).unwrap();
        let f = AluWord::from_bits(w);
        assert_eq!(f.op_add, 12);
        assert_eq!(f.raddr_a, 2);
        assert_eq!(f.raddr_b, 3);
        assert_eq!((f.add_a, f.add_b), (MUX_A, MUX_B));
        assert_eq!(f.waddr_add, 1);
        assert!(!f.ws);
        assert_eq!(f.cond_add, 1);
        assert_eq!(f.op_mul, 0);
        assert_eq!(f.waddr_mul, WADDR_NOP);
    }

    #[test]
    fn test_write_swap() {
        let w = one(Instr::alu(AddOp::Add, Reg::b(4), Reg::acc(0), Reg::acc(1))).unwrap();
        assert!(AluWord::from_bits(w).ws);

        let w = one(Instr::alu(MulOp::FMul, Reg::a(4), Reg::acc(0), Reg::acc(1))).unwrap();
        let f = AluWord::from_bits(w);
        assert!(f.ws);
        assert_eq!(f.op_mul, 1);
        assert_eq!(f.waddr_mul, 4);
    }

    #[test]
    fn test_same_file_conflict() {
        let err = one(Instr::alu(AddOp::Add, Reg::a(0), Reg::a(1), Reg::a(2))).unwrap_err();
        assert!(matches!(err, EncodeError::RegFileConflict { file: 'A', .. }));

        let err = one(Instr::alu(AddOp::Add, Reg::a(0), Reg::b(1), Reg::b(2))).unwrap_err();
        assert!(matches!(err, EncodeError::RegFileConflict { file: 'B', .. }));
    }

    #[test]
    fn test_same_register_reuses_port() {
        let w = one(Instr::mov(Reg::b(0), Reg::a(7))).unwrap();
        let f = AluWord::from_bits(w);
        assert_eq!(f.raddr_a, 7);
        assert_eq!((f.add_a, f.add_b), (MUX_A, MUX_A));
    }

    #[test]
    fn test_small_immediate() {
        let w = one(Instr::alu(AddOp::Shl, Reg::a(0), Reg::acc(1), -3)).unwrap();
        let f = AluWord::from_bits(w);
        assert_eq!(f.sig, SIG_SMALL_IMM);
        assert_eq!(f.raddr_b, 29);
        assert_eq!(f.add_b, MUX_B);

        let err = one(Instr::alu(AddOp::Add, Reg::a(0), Reg::acc(1), 100)).unwrap_err();
        assert!(matches!(err, EncodeError::UnencodableImm(Imm::Int(100))));
    }

    #[test]
    fn test_read_only_destination() {
        let err = one(Instr::mov(Reg::special(Special::Uniform), Reg::acc(0))).unwrap_err();
        assert!(matches!(err, EncodeError::ReadOnlyDest(_)));
    }

    #[test]
    fn test_special_registers() {
        let w = one(Instr::mov(Reg::special(Special::VpmWrite), Reg::acc(0))).unwrap();
        assert_eq!(AluWord::from_bits(w).waddr_add, 48);

        let w = one(Instr::mov(Reg::special(Special::DmaStAddr), Reg::a(0))).unwrap();
        let f = AluWord::from_bits(w);
        assert_eq!(f.waddr_add, 50);
        assert!(f.ws);

        let w = one(Instr::mov(Reg::a(0), Reg::special(Special::QpuNum))).unwrap();
        let f = AluWord::from_bits(w);
        assert_eq!(f.raddr_b, 38);
        assert_eq!(f.add_a, MUX_B);
    }

    #[test]
    fn test_rotate() {
        let w = one(Instr::rotate(Reg::acc(1), Reg::acc(0), 3)).unwrap();
        let f = AluWord::from_bits(w);
        assert_eq!(f.sig, SIG_SMALL_IMM);
        assert_eq!(f.raddr_b, 51);
        assert_eq!(f.op_mul, 4);
        assert_eq!((f.mul_a, f.mul_b), (0, 0));

        let w = one(Instr::rotate(Reg::acc(1), Reg::acc(0), Reg::acc(5))).unwrap();
        assert_eq!(AluWord::from_bits(w).raddr_b, 48);

        assert!(matches!(
            one(Instr::rotate(Reg::acc(1), Reg::acc(2), 3)),
            Err(EncodeError::InvalidRotate(_))
        ));
        assert!(matches!(
            one(Instr::rotate(Reg::acc(1), Reg::acc(0), 16)),
            Err(EncodeError::InvalidRotate(_))
        ));

        let zero = one(Instr::rotate(Reg::acc(1), Reg::acc(0), 0)).unwrap();
        let f = AluWord::from_bits(zero);
        assert_ne!(f.sig, SIG_SMALL_IMM);
        assert_eq!(
            zero,
            one(Instr::alu(MulOp::V8Min, Reg::acc(1), Reg::acc(0), Reg::acc(0))).unwrap()
        );
    }

    #[test]
    fn test_conditions_and_flags() {
        let w = one(
            Instr::alu(AddOp::Sub, Reg::None, Reg::a(0), Reg::b(0))
                .with_cond(AssignCond::Flag(Flag::NC))
                .with_set_flags(SetFlags::Zero),
        )
        .unwrap();
        let f = AluWord::from_bits(w);
        assert_eq!(f.cond_add, 5);
        assert!(f.sf);
        assert_eq!(f.waddr_add, WADDR_NOP);
    }

    #[test]
    fn test_load_immediate() {
        let w = one(Instr::li(Reg::b(5), 0x1234_5678)).unwrap();
        assert_eq!(fields::signal(w), SIG_LOAD_IMM);
        let f = LoadImmWord::from_bits(w);
        assert_eq!(f.imm, 0x1234_5678);
        assert_eq!(f.waddr_add, 5);
        assert!(f.ws);
    }

    #[test]
    fn test_branch_offsets() {
        let l = Label(0);
        let prog: Program = vec![
            Instr::label(l),
            Instr::nop(),
            Instr::branch_to(BranchCond::Any(Flag::ZC), l),
        ]
        .into();
        let words = Vc4Encoder::new().encode(&prog).unwrap();
        let f = BranchWord::from_bits(words[1]);
        assert_eq!(fields::signal(words[1]), SIG_BRANCH);
        assert_eq!(f.cond, 3);
        assert!(f.rel);
        // target 0, branch at 1: (0 - 1 - 4) * 8
        assert_eq!(f.imm as i32, -40);
    }

    #[test]
    fn test_semaphores() {
        let w = one(Instr::new(InstrKind::SemaDec(3))).unwrap();
        assert_eq!(w & 0x1F, 0x13);
        assert!(matches!(
            one(Instr::new(InstrKind::SemaInc(16))),
            Err(EncodeError::BadSemaphore(16))
        ));
    }
}
