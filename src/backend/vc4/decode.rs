//! VC4 word decoder and disassembler.
//!
//! Decoding recovers instructions equivalent to the encoded ones (see
//! [`Instr::equivalent`]); the emulator runs the decoded bundles.

use std::fmt::Write as _;

use smallvec::smallvec;

use crate::backend::{Bundle, DecodeError, WORD_BYTES};
use crate::ir::{
    AddOp, AluInstr, AluOp, AssignCond, BranchCond, BranchInstr, BranchTarget, Flag, Imm, Instr,
    InstrKind, LoadImmInstr, MulOp, Operand, Reg, RegFile, SetFlags,
};

use super::addr;
use super::fields::{
    self, AluWord, BranchWord, LoadImmWord, LI_MODE_SEMAPHORE, MUX_A, MUX_B, SIG_BRANCH, SIG_END,
    SIG_LDTMU0, SIG_LOAD_IMM, SIG_NONE, SIG_SMALL_IMM, WADDR_NOP,
};
use super::small_imm::{self, SmallImm};

fn add_op(code: u8) -> Option<AddOp> {
    Some(match code {
        1 => AddOp::FAdd,
        2 => AddOp::FSub,
        3 => AddOp::FMin,
        4 => AddOp::FMax,
        5 => AddOp::FMinAbs,
        6 => AddOp::FMaxAbs,
        7 => AddOp::FtoI,
        8 => AddOp::ItoF,
        12 => AddOp::Add,
        13 => AddOp::Sub,
        14 => AddOp::Shr,
        15 => AddOp::Asr,
        16 => AddOp::Ror,
        17 => AddOp::Shl,
        18 => AddOp::Min,
        19 => AddOp::Max,
        20 => AddOp::And,
        21 => AddOp::Or,
        22 => AddOp::Xor,
        23 => AddOp::Not,
        24 => AddOp::Clz,
        30 => AddOp::V8Adds,
        31 => AddOp::V8Subs,
        _ => return None,
    })
}

fn mul_op(code: u8) -> Option<MulOp> {
    Some(match code {
        1 => MulOp::FMul,
        2 => MulOp::Mul24,
        3 => MulOp::V8Muld,
        4 => MulOp::V8Min,
        5 => MulOp::V8Max,
        6 => MulOp::V8Adds,
        7 => MulOp::V8Subs,
        _ => return None,
    })
}

fn cond(code: u8, word: u64) -> Result<AssignCond, DecodeError> {
    Ok(match code {
        0 => AssignCond::Never,
        1 => AssignCond::Always,
        2 => AssignCond::Flag(Flag::ZS),
        3 => AssignCond::Flag(Flag::ZC),
        4 => AssignCond::Flag(Flag::NS),
        5 => AssignCond::Flag(Flag::NC),
        _ => {
            return Err(DecodeError::BadCondition {
                value: code as u32,
                word,
            })
        }
    })
}

fn branch_cond(code: u8, word: u64) -> Result<BranchCond, DecodeError> {
    Ok(match code {
        0 => BranchCond::All(Flag::ZS),
        1 => BranchCond::All(Flag::ZC),
        2 => BranchCond::Any(Flag::ZS),
        3 => BranchCond::Any(Flag::ZC),
        4 => BranchCond::All(Flag::NS),
        5 => BranchCond::All(Flag::NC),
        6 => BranchCond::Any(Flag::NS),
        7 => BranchCond::Any(Flag::NC),
        15 => BranchCond::Always,
        _ => {
            return Err(DecodeError::BadCondition {
                value: code as u32,
                word,
            })
        }
    })
}

fn write_reg(file: RegFile, addr: u8, word: u64) -> Result<Reg, DecodeError> {
    addr::reg_for_write(file, addr).ok_or(DecodeError::BadAddress {
        kind: "write",
        addr,
        word,
    })
}

fn set_flags(sf: bool) -> SetFlags {
    if sf {
        SetFlags::Zero
    } else {
        SetFlags::None
    }
}

struct AluDecoder {
    w: AluWord,
    word: u64,
}

impl AluDecoder {
    fn operand(&self, mux: u8) -> Result<Operand, DecodeError> {
        let read = |file, addr| {
            addr::reg_for_read(file, addr)
                .map(Operand::Reg)
                .ok_or(DecodeError::BadAddress {
                    kind: "read",
                    addr,
                    word: self.word,
                })
        };
        match mux {
            0..=5 => Ok(Operand::Reg(Reg::Acc(mux))),
            MUX_A => read(RegFile::A, self.w.raddr_a),
            MUX_B if self.w.sig == SIG_SMALL_IMM => match small_imm::decode(self.w.raddr_b) {
                SmallImm::Value(imm) => Ok(Operand::Imm(imm)),
                _ => Err(DecodeError::BadSignal {
                    sig: self.w.sig,
                    word: self.word,
                }),
            },
            _ => read(RegFile::B, self.w.raddr_b),
        }
    }

    fn src_a(&self, mux: u8) -> Result<Reg, DecodeError> {
        match self.operand(mux)? {
            Operand::Reg(r) => Ok(r),
            Operand::Imm(_) => Err(DecodeError::BadAddress {
                kind: "read",
                addr: self.w.raddr_b,
                word: self.word,
            }),
        }
    }

    fn add(&self) -> Result<Option<AluInstr>, DecodeError> {
        if self.w.op_add == 0 {
            return Ok(None);
        }
        let op = add_op(self.w.op_add).ok_or(DecodeError::UnknownOpcode {
            unit: "add",
            op: self.w.op_add as u32,
            word: self.word,
        })?;
        let file = if self.w.ws { RegFile::B } else { RegFile::A };
        Ok(Some(AluInstr {
            op: AluOp::Add(op),
            dest: write_reg(file, self.w.waddr_add, self.word)?,
            src_a: self.src_a(self.w.add_a)?,
            src_b: if op.is_unary() {
                None
            } else {
                Some(self.operand(self.w.add_b)?)
            },
            cond: cond(self.w.cond_add, self.word)?,
            set_flags: SetFlags::None,
        }))
    }

    fn mul(&self) -> Result<Option<AluInstr>, DecodeError> {
        if self.w.op_mul == 0 {
            return Ok(None);
        }
        let op = mul_op(self.w.op_mul).ok_or(DecodeError::UnknownOpcode {
            unit: "mul",
            op: self.w.op_mul as u32,
            word: self.word,
        })?;
        let file = if self.w.ws { RegFile::A } else { RegFile::B };
        let dest = write_reg(file, self.w.waddr_mul, self.word)?;
        let cond = cond(self.w.cond_mul, self.word)?;

        if self.w.sig == SIG_SMALL_IMM && self.w.raddr_b >= small_imm::ROTATE_BY_R5 {
            if op != MulOp::V8Min || self.w.mul_a != 0 || self.w.mul_b != 0 {
                return Err(DecodeError::BadSignal {
                    sig: self.w.sig,
                    word: self.word,
                });
            }
            let amount = match small_imm::decode(self.w.raddr_b) {
                SmallImm::RotateR5 => Operand::Reg(Reg::Acc(5)),
                SmallImm::Rotate(n) => Operand::Imm(Imm::Int(n as i32)),
                SmallImm::Value(imm) => Operand::Imm(imm),
            };
            return Ok(Some(AluInstr {
                op: AluOp::Mul(MulOp::Rotate),
                dest,
                src_a: Reg::Acc(0),
                src_b: Some(amount),
                cond,
                set_flags: SetFlags::None,
            }));
        }

        Ok(Some(AluInstr {
            op: AluOp::Mul(op),
            dest,
            src_a: self.src_a(self.w.mul_a)?,
            src_b: Some(self.operand(self.w.mul_b)?),
            cond,
            set_flags: SetFlags::None,
        }))
    }
}

fn decode_alu(word: u64) -> Result<Bundle, DecodeError> {
    let d = AluDecoder {
        w: AluWord::from_bits(word),
        word,
    };
    let mut add = d.add()?;
    let mut mul = d.mul()?;
    // Flags come from the add result unless the add unit is idle.
    match (&mut add, &mut mul) {
        (Some(a), _) => a.set_flags = set_flags(d.w.sf),
        (None, Some(m)) => m.set_flags = set_flags(d.w.sf),
        (None, None) => {}
    }
    let mut bundle: Bundle = add
        .into_iter()
        .chain(mul)
        .map(|alu| Instr::new(InstrKind::Alu(alu)))
        .collect();
    if bundle.is_empty() {
        bundle.push(Instr::nop());
    }
    Ok(bundle)
}

fn decode_recv(word: u64) -> Result<Bundle, DecodeError> {
    let w = AluWord::from_bits(word);
    if w.op_add != 21 || w.add_a != 4 || w.add_b != 4 || w.op_mul != 0 {
        return Err(DecodeError::BadSignal {
            sig: w.sig,
            word,
        });
    }
    let file = if w.ws { RegFile::B } else { RegFile::A };
    let dest = write_reg(file, w.waddr_add, word)?;
    Ok(smallvec![Instr::recv(dest)])
}

fn decode_load_imm(word: u64) -> Result<Bundle, DecodeError> {
    let w = LoadImmWord::from_bits(word);
    let instr = match w.mode {
        0 => {
            let file = if w.ws { RegFile::B } else { RegFile::A };
            Instr::new(InstrKind::LoadImm(LoadImmInstr {
                dest: write_reg(file, w.waddr_add, word)?,
                value: Imm::Int(w.imm as i32),
                cond: cond(w.cond_add, word)?,
                set_flags: set_flags(w.sf),
            }))
        }
        LI_MODE_SEMAPHORE => {
            let id = (w.imm & 0xF) as u8;
            if w.imm & 0x10 != 0 {
                Instr::new(InstrKind::SemaDec(id))
            } else {
                Instr::new(InstrKind::SemaInc(id))
            }
        }
        _ => {
            return Err(DecodeError::BadSignal {
                sig: SIG_LOAD_IMM,
                word,
            })
        }
    };
    Ok(smallvec![instr])
}

fn decode_branch(word: u64) -> Result<Bundle, DecodeError> {
    let w = BranchWord::from_bits(word);
    if w.reg {
        return Err(DecodeError::BadSignal {
            sig: SIG_BRANCH,
            word,
        });
    }
    let target = if w.rel {
        BranchTarget::Relative((w.imm as i32) / WORD_BYTES as i32)
    } else {
        BranchTarget::Absolute(w.imm)
    };
    let link = if w.waddr_add == WADDR_NOP {
        None
    } else {
        let file = if w.ws { RegFile::B } else { RegFile::A };
        Some(write_reg(file, w.waddr_add, word)?)
    };
    Ok(smallvec![Instr::new(InstrKind::Branch(BranchInstr {
        cond: branch_cond(w.cond, word)?,
        target,
        link,
    }))])
}

/// Decode one word into the instructions it issues.
pub fn decode_word(word: u64) -> Result<Bundle, DecodeError> {
    match fields::signal(word) {
        SIG_NONE | SIG_SMALL_IMM => decode_alu(word),
        SIG_END => Ok(smallvec![Instr::end()]),
        SIG_LDTMU0 => decode_recv(word),
        SIG_LOAD_IMM => decode_load_imm(word),
        SIG_BRANCH => decode_branch(word),
        sig => Err(DecodeError::BadSignal { sig, word }),
    }
}

/// Decode a whole code buffer, one bundle per word.
pub fn decode_program(words: &[u64]) -> Result<Vec<Bundle>, DecodeError> {
    words.iter().map(|&w| decode_word(w)).collect()
}

/// Render a code buffer as assembly, one line per word.
pub fn disassemble(words: &[u64]) -> Result<String, DecodeError> {
    let mut out = String::new();
    for (i, &word) in words.iter().enumerate() {
        let bundle = decode_word(word)?;
        let text: Vec<String> = bundle.iter().map(|instr| instr.to_string()).collect();
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{:04x}: {:016x}  {}",
            i as u32 * WORD_BYTES,
            word,
            text.join(" ; ")
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::vc4::encode::Vc4Encoder;
    use crate::backend::vc4::fields::NOP_WORD;
    use crate::backend::{EncodeError, Encoder};
    use crate::ir::{Label, Program, Special};
    use proptest::prelude::*;

    fn round_trip(instr: Instr) {
        let prog: Program = vec![instr.clone()].into();
        let words = Vc4Encoder::new().encode(&prog).unwrap();
        let decoded = decode_word(words[0]).unwrap();
        assert_eq!(decoded.len(), 1, "{}", instr);
        assert!(
            decoded[0].equivalent(&instr),
            "{} decoded as {}",
            instr,
            decoded[0]
        );
    }

    #[test]
    fn test_round_trip_kinds() {
        round_trip(Instr::alu(AddOp::Add, Reg::a(1), Reg::a(2), Reg::b(3)));
        round_trip(Instr::alu(AddOp::FSub, Reg::b(1), Reg::acc(2), 1.0f32));
        round_trip(Instr::unary(AddOp::ItoF, Reg::acc(3), Reg::b(9)));
        round_trip(Instr::alu(MulOp::Mul24, Reg::a(1), Reg::acc(0), Reg::acc(1)));
        round_trip(Instr::rotate(Reg::acc(1), Reg::acc(0), -3));
        round_trip(Instr::rotate(Reg::acc(1), Reg::acc(0), Reg::acc(5)));
        round_trip(Instr::mov(Reg::a(0), Reg::special(Special::ElemNum)));
        round_trip(Instr::mov(Reg::special(Special::SfuRecip), Reg::a(4)));
        round_trip(Instr::li(Reg::a(3), -123456));
        round_trip(Instr::li(Reg::b(3), 1.5f32).with_cond(AssignCond::Flag(Flag::ZS)));
        round_trip(Instr::recv(Reg::b(7)));
        round_trip(Instr::new(InstrKind::SemaInc(4)));
        round_trip(Instr::new(InstrKind::SemaDec(15)));
        round_trip(Instr::nop());
        round_trip(Instr::end());
        round_trip(
            Instr::branch(BranchCond::All(Flag::NC), BranchTarget::Relative(-7))
                .with_link(Reg::b(2)),
        );
        round_trip(Instr::branch(
            BranchCond::Always,
            BranchTarget::Absolute(0x200),
        ));
    }

    #[test]
    fn test_nop_decodes_as_nop() {
        let b = decode_word(NOP_WORD).unwrap();
        assert_eq!(b[0].kind, InstrKind::Nop);
    }

    #[test]
    fn test_paired_word_decodes_both() {
        let add = Instr::alu(AddOp::Add, Reg::a(0), Reg::a(1), Reg::acc(0));
        let mul = Instr::alu(MulOp::FMul, Reg::b(2), Reg::acc(1), Reg::acc(2));
        let prog: Program = vec![add.clone(), mul.clone()].into();
        let words = Vc4Encoder::new().with_pairing(true).encode(&prog).unwrap();
        assert_eq!(words.len(), 1);
        let b = decode_word(words[0]).unwrap();
        assert!(b[0].equivalent(&add));
        assert!(b[1].equivalent(&mul));
    }

    #[test]
    fn test_label_branch_decodes_relative() {
        let prog: Program = vec![
            Instr::label(Label(0)),
            Instr::branch_to(BranchCond::Always, Label(0)),
        ]
        .into();
        let words = Vc4Encoder::new().encode(&prog).unwrap();
        match &decode_word(words[0]).unwrap()[0].kind {
            InstrKind::Branch(br) => assert_eq!(br.target, BranchTarget::Relative(-4)),
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_signal() {
        let word = 0x2000_09E7_009E_7000u64;
        assert!(matches!(
            decode_word(word),
            Err(DecodeError::BadSignal { sig: 2, .. })
        ));
    }

    #[test]
    fn test_disassemble() {
        let prog: Program = vec![Instr::li(Reg::a(0), 7), Instr::end()].into();
        let words = Vc4Encoder::new().encode(&prog).unwrap();
        let text = disassemble(&words).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("li ra0, 7 (0x00000007)"));
        assert!(lines[1].ends_with("end"));
        assert!(lines[1].starts_with("0008:"));
    }

    fn arb_reg() -> impl Strategy<Value = Reg> {
        prop_oneof![
            (0u8..32).prop_map(Reg::a),
            (0u8..32).prop_map(Reg::b),
            prop::sample::select(vec![0u8, 1, 2, 3, 5]).prop_map(Reg::acc),
        ]
    }

    fn arb_add_op() -> impl Strategy<Value = AddOp> {
        prop::sample::select(vec![
            AddOp::FAdd,
            AddOp::FMax,
            AddOp::Add,
            AddOp::Sub,
            AddOp::Shr,
            AddOp::Asr,
            AddOp::And,
            AddOp::Xor,
            AddOp::Not,
            AddOp::Clz,
            AddOp::FtoI,
        ])
    }

    fn arb_cond() -> impl Strategy<Value = AssignCond> {
        prop::sample::select(vec![
            AssignCond::Never,
            AssignCond::Always,
            AssignCond::Flag(Flag::ZS),
            AssignCond::Flag(Flag::ZC),
            AssignCond::Flag(Flag::NS),
            AssignCond::Flag(Flag::NC),
        ])
    }

    proptest! {
        #[test]
        fn test_alu_round_trip(
            op in arb_add_op(),
            dest in arb_reg(),
            a in arb_reg(),
            b in arb_reg(),
            cond in arb_cond(),
            sf in any::<bool>(),
        ) {
            let flags = if sf { SetFlags::Zero } else { SetFlags::None };
            let instr = Instr::alu(op, dest, a, b).with_cond(cond).with_set_flags(flags);
            let prog: Program = vec![instr.clone()].into();
            match Vc4Encoder::new().encode(&prog) {
                Ok(words) => {
                    let decoded = decode_word(words[0]).unwrap();
                    prop_assert!(decoded[0].equivalent(&instr));
                }
                Err(EncodeError::RegFileConflict { a: x, b: y, .. }) => {
                    // only two distinct slots of one file may conflict
                    prop_assert!(x.is_file() && y.is_file() && x != y);
                }
                Err(e) => prop_assert!(false, "unexpected error {}", e),
            }
        }
    }
}
