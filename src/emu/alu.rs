//! Lane-wise ALU semantics.

use crate::ir::{AddOp, AssignCond, BranchCond, MulOp};

use super::word::{Vector, Word, NUM_LANES};

/// Per-lane condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneFlags {
    pub zero: [bool; NUM_LANES],
    pub negative: [bool; NUM_LANES],
}

impl LaneFlags {
    /// Flags of `result` under the op's interpretation. Every lane is
    /// updated, whatever the write condition.
    pub fn from_result(result: &Vector, float: bool) -> Self {
        let mut f = LaneFlags::default();
        for (i, w) in result.iter().enumerate() {
            f.zero[i] = w.is_zero(float);
            f.negative[i] = w.is_negative(float);
        }
        f
    }

    /// Lanes on which `cond` allows a write.
    pub fn mask(&self, cond: AssignCond) -> [bool; NUM_LANES] {
        std::array::from_fn(|i| match cond {
            AssignCond::Never => false,
            AssignCond::Always => true,
            AssignCond::Flag(flag) => flag.test(self.zero[i], self.negative[i]),
        })
    }

    /// Evaluate a branch condition across all lanes.
    pub fn branch_taken(&self, cond: BranchCond) -> bool {
        let lane = |flag: crate::ir::Flag, i: usize| flag.test(self.zero[i], self.negative[i]);
        match cond {
            BranchCond::Always => true,
            BranchCond::All(flag) => (0..NUM_LANES).all(|i| lane(flag, i)),
            BranchCond::Any(flag) => (0..NUM_LANES).any(|i| lane(flag, i)),
        }
    }
}

fn bytes(w: Word) -> [u8; 4] {
    w.0.to_le_bytes()
}

fn per_byte(a: Word, b: Word, f: impl Fn(u8, u8) -> u8) -> Word {
    let (a, b) = (bytes(a), bytes(b));
    Word(u32::from_le_bytes(std::array::from_fn(|i| f(a[i], b[i]))))
}

/// One add-ALU lane. `b` is ignored by unary ops.
pub fn add_lane(op: AddOp, a: Word, b: Word) -> Word {
    let shift = b.0 & 31;
    match op {
        AddOp::FAdd => Word::from_float(a.float() + b.float()),
        AddOp::FSub => Word::from_float(a.float() - b.float()),
        AddOp::FMin => Word::from_float(a.float().min(b.float())),
        AddOp::FMax => Word::from_float(a.float().max(b.float())),
        AddOp::FMinAbs => Word::from_float(a.float().abs().min(b.float().abs())),
        AddOp::FMaxAbs => Word::from_float(a.float().abs().max(b.float().abs())),
        AddOp::FtoI => Word::from_int(a.float() as i32),
        AddOp::ItoF => Word::from_float(a.int() as f32),
        AddOp::Add => Word(a.0.wrapping_add(b.0)),
        AddOp::Sub => Word(a.0.wrapping_sub(b.0)),
        AddOp::Shr => Word(a.0 >> shift),
        AddOp::Asr => Word::from_int(a.int() >> shift),
        AddOp::Ror => Word(a.0.rotate_right(shift)),
        AddOp::Shl => Word(a.0 << shift),
        AddOp::Min => Word::from_int(a.int().min(b.int())),
        AddOp::Max => Word::from_int(a.int().max(b.int())),
        AddOp::And => Word(a.0 & b.0),
        AddOp::Or => Word(a.0 | b.0),
        AddOp::Xor => Word(a.0 ^ b.0),
        AddOp::Not => Word(!a.0),
        AddOp::Clz => Word(a.0.leading_zeros()),
        AddOp::V8Adds => per_byte(a, b, u8::saturating_add),
        AddOp::V8Subs => per_byte(a, b, u8::saturating_sub),
    }
}

/// One mul-ALU lane. Rotation is a whole-vector op, see [`rotate`].
pub fn mul_lane(op: MulOp, a: Word, b: Word) -> Word {
    match op {
        MulOp::FMul => Word::from_float(a.float() * b.float()),
        MulOp::Mul24 => Word((a.0 & 0xFF_FFFF).wrapping_mul(b.0 & 0xFF_FFFF)),
        MulOp::V8Muld => per_byte(a, b, |x, y| ((x as u16 * y as u16 + 127) / 255) as u8),
        MulOp::V8Min => per_byte(a, b, u8::min),
        MulOp::V8Max => per_byte(a, b, u8::max),
        MulOp::V8Adds => per_byte(a, b, u8::saturating_add),
        MulOp::V8Subs => per_byte(a, b, u8::saturating_sub),
        MulOp::Rotate => a,
    }
}

/// Vector add-ALU op.
pub fn add(op: AddOp, a: &Vector, b: &Vector) -> Vector {
    a.zip(*b, |x, y| add_lane(op, x, y))
}

/// Vector mul-ALU op (not rotation).
pub fn mul(op: MulOp, a: &Vector, b: &Vector) -> Vector {
    a.zip(*b, |x, y| mul_lane(op, x, y))
}

/// Full-vector rotation; the amount is taken mod 16.
pub fn rotate(src: &Vector, amount: i32) -> Vector {
    src.rotate(amount.rem_euclid(NUM_LANES as i32) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Flag;

    #[test]
    fn test_integer_ops() {
        assert_eq!(add_lane(AddOp::Sub, Word(3), Word(5)).int(), -2);
        assert_eq!(add_lane(AddOp::Asr, Word::from_int(-8), Word(1)).int(), -4);
        assert_eq!(add_lane(AddOp::Shr, Word::from_int(-8), Word(28)).0, 0xF);
        assert_eq!(add_lane(AddOp::Shl, Word(1), Word(33)).0, 2);
        assert_eq!(add_lane(AddOp::Ror, Word(1), Word(1)).0, 0x8000_0000);
        assert_eq!(add_lane(AddOp::Min, Word::from_int(-1), Word(1)).int(), -1);
        assert_eq!(add_lane(AddOp::Clz, Word(1), Word(0)).0, 31);
        assert_eq!(add_lane(AddOp::Not, Word(0), Word(7)).0, u32::MAX);
    }

    #[test]
    fn test_float_ops() {
        let f = |op, a: f32, b: f32| add_lane(op, Word::from_float(a), Word::from_float(b)).float();
        assert_eq!(f(AddOp::FAdd, 1.5, 2.0), 3.5);
        assert_eq!(f(AddOp::FMinAbs, -3.0, 2.0), 2.0);
        assert_eq!(f(AddOp::FMaxAbs, -3.0, 2.0), 3.0);
        assert_eq!(add_lane(AddOp::FtoI, Word::from_float(-2.7), Word(0)).int(), -2);
        assert_eq!(add_lane(AddOp::ItoF, Word::from_int(-3), Word(0)).float(), -3.0);
        assert_eq!(
            mul_lane(MulOp::FMul, Word::from_float(1.5), Word::from_float(4.0)).float(),
            6.0
        );
    }

    #[test]
    fn test_mul24_and_bytes() {
        assert_eq!(mul_lane(MulOp::Mul24, Word(0x0100_0003), Word(5)).0, 15);
        assert_eq!(
            mul_lane(MulOp::V8Adds, Word(0x10_F0), Word(0x10_20)).0,
            0x20_FF
        );
        assert_eq!(mul_lane(MulOp::V8Muld, Word(0xFF), Word(0x80)).0, 0x80);
    }

    #[test]
    fn test_mask_per_flag() {
        let v = Vector::from([0i32, 1, -1, 0, 5, -5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let flags = LaneFlags::from_result(&v, false);
        let zs = flags.mask(AssignCond::Flag(Flag::ZS));
        let nc = flags.mask(AssignCond::Flag(Flag::NC));
        assert_eq!(&zs[..6], &[true, false, false, true, false, false]);
        assert_eq!(&nc[..6], &[true, true, false, true, true, false]);
        assert!(flags.mask(AssignCond::Never).iter().all(|m| !m));
        assert!(flags.branch_taken(BranchCond::Any(Flag::NS)));
        assert!(!flags.branch_taken(BranchCond::All(Flag::ZC)));
    }
}
