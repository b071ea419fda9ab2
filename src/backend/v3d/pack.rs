//! V3D 4.1 word packing.
//!
//! ALU word:
//!
//! | Bits  | Field |
//! |-------|-------|
//! | 63:58 | op_mul |
//! | 57:53 | sig |
//! | 52:46 | cond (flags, or `sig_addr` + magic bit) |
//! | 45    | mm (mul magic write) |
//! | 44    | ma (add magic write) |
//! | 43:38 | waddr_m |
//! | 37:32 | waddr_a |
//! | 31:24 | op_add |
//! | 23:21 | mul_b |
//! | 20:18 | mul_a |
//! | 17:15 | add_b |
//! | 14:12 | add_a |
//! | 11:6  | raddr_a |
//! | 5:0   | raddr_b |
//!
//! A word with `op_mul == 0` and `sig & 0x18 == 0x10` is a branch:
//!
//! | Bits  | Field |
//! |-------|-------|
//! | 55:35 | offset bits 23:3 |
//! | 34:32 | cond |
//! | 31:24 | offset bits 31:24 |
//! | 22:21 | msfign |
//! | 17:15 | bdu |
//! | 14    | ub |
//! | 13:12 | bdi |
//! | 11:6  | raddr_a |

use crate::backend::{DecodeError, EncodeError};

use super::flags::Flags;
use super::instr::{
    AddOpcode, AddSlot, AluWord, BranchCond, BranchDest, BranchWord, MulOpcode, MulSlot, Mux,
    OutPack, Unpack, V3dInstr,
};
use super::sig::Signals;

const TARGET: &str = "v3d";

const ANY: u8 = 0xFF;

/// Opcode range and the mux values that select an operation within it.
struct OpDesc<Op> {
    first: u8,
    last: u8,
    b_mask: u8,
    a_mask: u8,
    op: Op,
}

const fn d<Op>(first: u8, last: u8, b_mask: u8, a_mask: u8, op: Op) -> OpDesc<Op> {
    OpDesc {
        first,
        last,
        b_mask,
        a_mask,
        op,
    }
}

#[rustfmt::skip]
const ADD_OPS: &[OpDesc<AddOpcode>] = &[
    d(0, 47, ANY, ANY, AddOpcode::Fadd),
    d(0, 47, ANY, ANY, AddOpcode::Faddnf),
    d(56, 56, ANY, ANY, AddOpcode::Add),
    d(60, 60, ANY, ANY, AddOpcode::Sub),
    d(64, 111, ANY, ANY, AddOpcode::Fsub),
    d(120, 120, ANY, ANY, AddOpcode::Min),
    d(121, 121, ANY, ANY, AddOpcode::Max),
    d(122, 122, ANY, ANY, AddOpcode::Umin),
    d(123, 123, ANY, ANY, AddOpcode::Umax),
    d(124, 124, ANY, ANY, AddOpcode::Shl),
    d(125, 125, ANY, ANY, AddOpcode::Shr),
    d(126, 126, ANY, ANY, AddOpcode::Asr),
    d(127, 127, ANY, ANY, AddOpcode::Ror),
    d(128, 175, ANY, ANY, AddOpcode::Fmin),
    d(128, 175, ANY, ANY, AddOpcode::Fmax),
    d(181, 181, ANY, ANY, AddOpcode::And),
    d(182, 182, ANY, ANY, AddOpcode::Or),
    d(183, 183, ANY, ANY, AddOpcode::Xor),
    d(186, 186, 1 << 0, ANY, AddOpcode::Not),
    d(186, 186, 1 << 1, ANY, AddOpcode::Neg),
    d(187, 187, 1 << 0, 1 << 0, AddOpcode::Nop),
    d(187, 187, 1 << 0, 1 << 1, AddOpcode::Tidx),
    d(187, 187, 1 << 0, 1 << 2, AddOpcode::Eidx),
    d(187, 187, 1 << 2, 1 << 5, AddOpcode::Tmuwt),
    d(245, 245, 1 << 7, ANY, AddOpcode::Ftoiz),
    d(252, 252, 1 << 0, ANY, AddOpcode::Itof),
    d(252, 252, 1 << 3, ANY, AddOpcode::Clz),
];

#[rustfmt::skip]
const MUL_OPS: &[OpDesc<MulOpcode>] = &[
    d(1, 1, ANY, ANY, MulOpcode::Add),
    d(2, 2, ANY, ANY, MulOpcode::Sub),
    d(3, 3, ANY, ANY, MulOpcode::Umul24),
    d(9, 9, ANY, ANY, MulOpcode::Smul24),
    d(15, 15, 1 << 4, 1 << 0, MulOpcode::Nop),
    d(15, 15, 1 << 7, ANY, MulOpcode::Mov),
    d(16, 63, ANY, ANY, MulOpcode::Fmul),
];

fn lookup<Op>(table: &[OpDesc<Op>], opcode: u8, a: Mux, b: Mux) -> Option<&OpDesc<Op>> {
    table.iter().find(|e| {
        (e.first..=e.last).contains(&opcode)
            && e.b_mask & (1 << b as u8) != 0
            && e.a_mask & (1 << a as u8) != 0
    })
}

/// Mux fields that only select the opcode are stored as `R0`.
fn operand_mux(mask: u8, mux: Mux) -> Mux {
    if mask == ANY {
        mux
    } else {
        Mux::R0
    }
}

fn desc<Op: PartialEq + Copy>(table: &[OpDesc<Op>], op: Op) -> &OpDesc<Op> {
    // Every opcode enum variant has a table entry.
    table
        .iter()
        .find(|e| e.op == op)
        .unwrap_or(&table[0])
}

/// Lowest mux value allowed by a mask (`ANY` allows the operand's own).
fn fixed_mux(mask: u8, current: Mux) -> Mux {
    if mask == ANY {
        current
    } else {
        Mux::from_bits(mask.trailing_zeros())
    }
}

#[inline]
fn get(word: u64, shift: u32, width: u32) -> u32 {
    ((word >> shift) & ((1u64 << width) - 1)) as u32
}

#[inline]
fn put(value: u32, shift: u32, width: u32) -> u64 {
    ((value as u64) & ((1u64 << width) - 1)) << shift
}

/// Float unpack/pack bits folded into an opcode: `pack << 4 | a << 2 | b`.
fn float_bits(pack: OutPack, a: Unpack, b: Unpack) -> u8 {
    (pack as u8) << 4 | (a as u8) << 2 | b as u8
}

fn pack_add(add: &AddSlot) -> Result<(u8, Mux, Mux), EncodeError> {
    let e = desc(ADD_OPS, add.op);
    let (mut a, mut b) = (add.a, add.b);
    let (mut au, mut bu) = (add.a_unpack, add.b_unpack);
    let opcode = if add.op.is_float_binary() {
        if matches!(add.op, AddOpcode::Fadd | AddOpcode::Faddnf | AddOpcode::Fmin | AddOpcode::Fmax)
        {
            // Commutative pairs share opcodes; operand order picks the op.
            // Identical operands cannot be ordered, so `faddnf x, x` and
            // `fmax x, x` pack as `fadd` and `fmin`, which compute the same
            // value and unpack as such.
            let ordering = au as u8 * 8 + a as u8 > bu as u8 * 8 + b as u8;
            let want_ordered = matches!(add.op, AddOpcode::Faddnf | AddOpcode::Fmax);
            if ordering != want_ordered {
                std::mem::swap(&mut a, &mut b);
                std::mem::swap(&mut au, &mut bu);
            }
        }
        e.first + float_bits(add.output_pack, au, bu)
    } else {
        a = fixed_mux(e.a_mask, a);
        b = fixed_mux(e.b_mask, b);
        e.first
    };
    Ok((opcode, a, b))
}

fn pack_mul(mul: &MulSlot) -> Result<(u8, Mux, Mux), EncodeError> {
    let e = desc(MUL_OPS, mul.op);
    if mul.op == MulOpcode::Fmul {
        let bits = float_bits(mul.output_pack, mul.a_unpack, mul.b_unpack);
        return Ok((e.first + bits, mul.a, mul.b));
    }
    Ok((e.first, fixed_mux(e.a_mask, mul.a), fixed_mux(e.b_mask, mul.b)))
}

fn pack_alu(w: &AluWord) -> Result<u64, EncodeError> {
    let sig = w.sig.pack().ok_or_else(|| {
        EncodeError::unsupported(TARGET, format!("signal combination {}", w.sig))
    })?;
    let cond = if w.sig.writes_address() {
        if !w.flags.is_empty() {
            return Err(EncodeError::unsupported(
                TARGET,
                format!("{} with a condition or flag update", w.sig),
            ));
        }
        w.sig_addr as u32 | (w.sig_magic as u32) << 6
    } else {
        w.flags
            .pack()
            .ok_or_else(|| EncodeError::unsupported(TARGET, format!("flags {}", w.flags)))?
    };
    let (op_add, add_a, add_b) = pack_add(&w.add)?;
    let (op_mul, mul_a, mul_b) = pack_mul(&w.mul)?;

    Ok(put(op_mul as u32, 58, 6)
        | put(sig as u32, 53, 5)
        | put(cond, 46, 7)
        | put(w.mul.magic_write as u32, 45, 1)
        | put(w.add.magic_write as u32, 44, 1)
        | put(w.mul.waddr as u32, 38, 6)
        | put(w.add.waddr as u32, 32, 6)
        | put(op_add as u32, 24, 8)
        | put(mul_b as u32, 21, 3)
        | put(mul_a as u32, 18, 3)
        | put(add_b as u32, 15, 3)
        | put(add_a as u32, 12, 3)
        | put(w.raddr_a as u32, 6, 6)
        | put(w.raddr_b as u32, 0, 6))
}

fn pack_branch(b: &BranchWord) -> u64 {
    put(0b10000, 53, 5)
        | put(b.offset >> 3, 35, 21)
        | put(b.cond as u32, 32, 3)
        | put(b.offset >> 24, 24, 8)
        | put(b.msfign as u32, 21, 2)
        | put(b.bdu as u32, 15, 3)
        | put(b.ub as u32, 14, 1)
        | put(b.bdi as u32, 12, 2)
        | put(b.raddr_a as u32, 6, 6)
}

/// Pack a structured instruction into a machine word.
pub fn pack(instr: &V3dInstr) -> Result<u64, EncodeError> {
    match instr {
        V3dInstr::Alu(w) => pack_alu(w),
        V3dInstr::Branch(b) => Ok(pack_branch(b)),
    }
}

fn unpack_branch(word: u64) -> Result<BranchWord, DecodeError> {
    let cond = get(word, 32, 3);
    Ok(BranchWord {
        cond: BranchCond::from_bits(cond).ok_or(DecodeError::BadCondition { value: cond, word })?,
        msfign: get(word, 21, 2) as u8,
        bdi: BranchDest::from_bits(get(word, 12, 2)),
        bdu: BranchDest::from_bits(get(word, 15, 3)),
        ub: get(word, 14, 1) != 0,
        raddr_a: get(word, 6, 6) as u8,
        offset: get(word, 35, 21) << 3 | get(word, 24, 8) << 24,
    })
}

fn float_unpacks(bits: u8, word: u64) -> Result<(OutPack, Unpack, Unpack), DecodeError> {
    let pack = OutPack::from_bits((bits >> 4) as u32).ok_or(DecodeError::BadCondition {
        value: bits as u32,
        word,
    })?;
    Ok((
        pack,
        Unpack::from_bits((bits >> 2) as u32),
        Unpack::from_bits(bits as u32),
    ))
}

fn unpack_add(word: u64) -> Result<AddSlot, DecodeError> {
    let opcode = get(word, 24, 8) as u8;
    let a = Mux::from_bits(get(word, 12, 3));
    let b = Mux::from_bits(get(word, 15, 3));
    let e = lookup(ADD_OPS, opcode, a, b).ok_or(DecodeError::UnknownOpcode {
        unit: "add",
        op: opcode as u32,
        word,
    })?;
    let op = e.op;
    let mut slot = AddSlot::new(op);
    slot.a = operand_mux(e.a_mask, a);
    slot.b = operand_mux(e.b_mask, b);
    slot.waddr = get(word, 32, 6) as u8;
    slot.magic_write = get(word, 44, 1) != 0;
    if op.is_float_binary() {
        let base = desc(ADD_OPS, op).first;
        let (pack, au, bu) = float_unpacks(opcode - base, word)?;
        slot.output_pack = pack;
        slot.a_unpack = au;
        slot.b_unpack = bu;
        if au as u8 * 8 + a as u8 > bu as u8 * 8 + b as u8 {
            slot.op = match op {
                AddOpcode::Fadd => AddOpcode::Faddnf,
                AddOpcode::Fmin => AddOpcode::Fmax,
                other => other,
            };
        }
    }
    Ok(slot)
}

fn unpack_mul(word: u64) -> Result<MulSlot, DecodeError> {
    let opcode = get(word, 58, 6) as u8;
    let a = Mux::from_bits(get(word, 18, 3));
    let b = Mux::from_bits(get(word, 21, 3));
    let e = lookup(MUL_OPS, opcode, a, b).ok_or(DecodeError::UnknownOpcode {
        unit: "mul",
        op: opcode as u32,
        word,
    })?;
    let op = e.op;
    let mut slot = MulSlot::new(op);
    slot.a = operand_mux(e.a_mask, a);
    slot.b = operand_mux(e.b_mask, b);
    slot.waddr = get(word, 38, 6) as u8;
    slot.magic_write = get(word, 45, 1) != 0;
    if op == MulOpcode::Fmul {
        let (pack, au, bu) = float_unpacks(opcode - 16, word)?;
        slot.output_pack = pack;
        slot.a_unpack = au;
        slot.b_unpack = bu;
    }
    Ok(slot)
}

fn unpack_alu(word: u64) -> Result<AluWord, DecodeError> {
    let sig_bits = get(word, 53, 5) as u8;
    let sig = Signals::unpack(sig_bits).ok_or(DecodeError::BadSignal { sig: sig_bits, word })?;
    let cond = get(word, 46, 7);
    let (flags, sig_addr, sig_magic) = if sig.writes_address() {
        (Flags::default(), (cond & 0x3F) as u8, cond & 0x40 != 0)
    } else {
        let flags = Flags::unpack(cond).ok_or(DecodeError::BadCondition { value: cond, word })?;
        (flags, 0, false)
    };
    Ok(AluWord {
        sig,
        sig_addr,
        sig_magic,
        raddr_a: get(word, 6, 6) as u8,
        raddr_b: get(word, 0, 6) as u8,
        flags,
        add: unpack_add(word)?,
        mul: unpack_mul(word)?,
    })
}

/// Unpack a machine word.
pub fn unpack(word: u64) -> Result<V3dInstr, DecodeError> {
    let op_mul = get(word, 58, 6);
    let sig = get(word, 53, 5);
    if op_mul == 0 && sig & 0x18 == 0x10 {
        Ok(V3dInstr::Branch(unpack_branch(word)?))
    } else {
        Ok(V3dInstr::Alu(unpack_alu(word)?))
    }
}

/// Unpack a code buffer and render it as assembly, one line per word.
pub fn disassemble(words: &[u64]) -> Result<String, DecodeError> {
    let mut out = String::new();
    for (i, &w) in words.iter().enumerate() {
        let instr = unpack(w)?;
        out.push_str(&format!("{:04x}: {:016x}  {}\n", i * 8, w, instr));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::v3d::flags::{Cond, PushFlag};

    /// Canonical V3D no-op (`nop ; nop`).
    const NOP: u64 = 0x3C00_3186_BB80_0000;

    #[test]
    fn test_nop_word() {
        assert_eq!(pack(&V3dInstr::nop()).unwrap(), NOP);
        assert_eq!(unpack(NOP).unwrap(), V3dInstr::nop());
    }

    #[test]
    fn test_alu_round_trip() {
        let mut w = AluWord::nop();
        w.add = AddSlot::new(AddOpcode::Add);
        w.add.a = Mux::A;
        w.add.b = Mux::B;
        w.add.waddr = 40;
        w.add.magic_write = false;
        w.raddr_a = 3;
        w.raddr_b = 35;
        w.flags.apf = PushFlag::PushN;
        w.mul = MulSlot::new(MulOpcode::Fmul);
        w.mul.a = Mux::R1;
        w.mul.b = Mux::R2;
        w.mul.waddr = 0;
        w.flags.mc = Some(Cond::IfNA);

        let bits = pack(&V3dInstr::Alu(w)).unwrap();
        assert_eq!(unpack(bits).unwrap(), V3dInstr::Alu(w));
    }

    #[test]
    fn test_float_operand_order_selects_op() {
        for op in [AddOpcode::Fadd, AddOpcode::Faddnf, AddOpcode::Fmin, AddOpcode::Fmax] {
            let mut w = AluWord::nop();
            w.add = AddSlot::new(op);
            w.add.a = Mux::R1;
            w.add.b = Mux::R3;
            w.add.waddr = 2;
            let V3dInstr::Alu(back) = unpack(pack(&V3dInstr::Alu(w)).unwrap()).unwrap() else {
                panic!("expected ALU word");
            };
            assert_eq!(back.add.op, op);
            // operands may be swapped, the pair is preserved
            let mut got = [back.add.a as u8, back.add.b as u8];
            got.sort();
            assert_eq!(got, [1, 3]);
        }
    }

    #[test]
    fn test_identical_operands_pack_as_unordered_op() {
        for (op, packed_as) in [
            (AddOpcode::Faddnf, AddOpcode::Fadd),
            (AddOpcode::Fmax, AddOpcode::Fmin),
        ] {
            let mut w = AluWord::nop();
            w.add = AddSlot::new(op);
            w.add.a = Mux::R2;
            w.add.b = Mux::R2;
            w.add.waddr = 2;
            let V3dInstr::Alu(back) = unpack(pack(&V3dInstr::Alu(w)).unwrap()).unwrap() else {
                panic!("expected ALU word");
            };
            assert_eq!(back.add.op, packed_as);
            assert_eq!((back.add.a, back.add.b), (Mux::R2, Mux::R2));
        }
    }

    #[test]
    fn test_fixed_mux_ops() {
        let mut w = AluWord::nop();
        w.add = AddSlot::new(AddOpcode::Eidx);
        w.add.waddr = 7;
        w.add.magic_write = false;
        w.mul = MulSlot::new(MulOpcode::Mov);
        w.mul.a = Mux::R0;
        w.mul.b = Mux::B;
        w.mul.waddr = 1;

        let bits = pack(&V3dInstr::Alu(w)).unwrap();
        assert_eq!(get(bits, 24, 8), 187);
        assert_eq!(get(bits, 12, 3), 2);
        assert_eq!(get(bits, 15, 3), 0);
        assert_eq!(get(bits, 58, 6), 15);
        assert_eq!(get(bits, 21, 3), 7);

        let V3dInstr::Alu(back) = unpack(bits).unwrap() else {
            panic!("expected ALU word");
        };
        assert_eq!(back.add.op, AddOpcode::Eidx);
        assert_eq!(back.mul.op, MulOpcode::Mov);
    }

    #[test]
    fn test_signal_address() {
        let mut w = AluWord::with_sig(Signals::LDUNIFRF);
        w.sig_addr = 9;
        w.sig_magic = false;
        let bits = pack(&V3dInstr::Alu(w)).unwrap();
        assert_eq!(get(bits, 46, 7), 9);
        assert_eq!(unpack(bits).unwrap(), V3dInstr::Alu(w));

        w.flags.ac = Some(Cond::IfA);
        assert!(pack(&V3dInstr::Alu(w)).is_err());
    }

    #[test]
    fn test_branch_round_trip() {
        let b = BranchWord {
            cond: BranchCond::AnyNA,
            msfign: 0,
            bdi: BranchDest::Rel,
            bdu: BranchDest::Abs,
            ub: false,
            raddr_a: 0,
            offset: (-72i32) as u32,
        };
        let bits = pack(&V3dInstr::Branch(b)).unwrap();
        assert_eq!(get(bits, 58, 6), 0);
        assert_eq!(get(bits, 53, 5) & 0x18, 0x10);
        assert_eq!(unpack(bits).unwrap(), V3dInstr::Branch(b));
    }

    #[test]
    fn test_branch_bdu_is_dont_care() {
        let b = BranchWord {
            cond: BranchCond::Always,
            msfign: 0,
            bdi: BranchDest::Abs,
            bdu: BranchDest::RegFile,
            ub: false,
            raddr_a: 0,
            offset: 0x100,
        };
        let mut other = b;
        other.bdu = BranchDest::Rel;
        let x = pack(&V3dInstr::Branch(b)).unwrap();
        let y = pack(&V3dInstr::Branch(other)).unwrap();
        assert_ne!(x, y);
        assert_eq!(unpack(x).unwrap(), unpack(y).unwrap());
    }

    #[test]
    fn test_bad_signal() {
        let word = NOP | (27u64 << 53);
        assert!(matches!(unpack(word), Err(DecodeError::BadSignal { sig: 27, .. })));
    }
}
