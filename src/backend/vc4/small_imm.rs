//! VC4 small-immediate table.
//!
//! | Index | Value |
//! |-------|-------|
//! | 0-15  | integers 0..15 |
//! | 16-31 | integers -16..-1 |
//! | 32-39 | floats 1.0, 2.0, .. 128.0 |
//! | 40-47 | floats 1/256, 1/128, .. 1/2 |
//! | 48    | mul output rotated by r5 |
//! | 49-63 | mul output rotated by 1..15 |
//!
//! Float 0.0 shares index 0 with integer 0. Negative floats have no slot.

use crate::ir::Imm;

/// Index selecting rotation by r5.
pub const ROTATE_BY_R5: u8 = 48;

/// Decoded `raddr_b` when the small-immediate signal is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallImm {
    /// An ALU operand value.
    Value(Imm),
    /// Rotate the mul result by a constant amount (1-15).
    Rotate(u8),
    /// Rotate the mul result by r5.
    RotateR5,
}

/// Table index for `imm`, or `None` outside the domain.
pub fn encode(imm: Imm) -> Option<u8> {
    let bits = imm.bits();
    (0u8..48).find(|&i| value_bits(i) == bits)
}

/// Table index for a constant rotation; `amount` is taken modulo 16 and
/// must not be a multiple of 16.
pub fn encode_rotate(amount: i32) -> Option<u8> {
    match amount.rem_euclid(16) {
        0 => None,
        n => Some(ROTATE_BY_R5 + n as u8),
    }
}

/// Meaning of table index `index` (0-63).
pub fn decode(index: u8) -> SmallImm {
    match index {
        0..=15 => SmallImm::Value(Imm::Int(index as i32)),
        16..=31 => SmallImm::Value(Imm::Int(index as i32 - 32)),
        32..=47 => SmallImm::Value(Imm::Float(f32::from_bits(value_bits(index)))),
        ROTATE_BY_R5 => SmallImm::RotateR5,
        _ => SmallImm::Rotate(index - ROTATE_BY_R5),
    }
}

fn value_bits(index: u8) -> u32 {
    match index {
        0..=15 => index as u32,
        16..=31 => (index as i32 - 32) as u32,
        // 2^0 .. 2^7
        32..=39 => (127 + (index as u32 - 32)) << 23,
        // 2^-8 .. 2^-1
        40..=47 => (127 - 8 + (index as u32 - 40)) << 23,
        _ => u32::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_table_values() {
        assert_eq!(encode(Imm::Int(0)), Some(0));
        assert_eq!(encode(Imm::Int(15)), Some(15));
        assert_eq!(encode(Imm::Int(-16)), Some(16));
        assert_eq!(encode(Imm::Int(-1)), Some(31));
        assert_eq!(encode(Imm::Float(1.0)), Some(32));
        assert_eq!(encode(Imm::Float(128.0)), Some(39));
        assert_eq!(encode(Imm::Float(1.0 / 256.0)), Some(40));
        assert_eq!(encode(Imm::Float(0.5)), Some(47));
        assert_eq!(encode(Imm::Float(0.0)), Some(0));
    }

    #[test]
    fn test_out_of_domain() {
        assert_eq!(encode(Imm::Int(16)), None);
        assert_eq!(encode(Imm::Int(-17)), None);
        assert_eq!(encode(Imm::Float(3.0)), None);
        assert_eq!(encode(Imm::Float(256.0)), None);
        assert_eq!(encode(Imm::Float(-1.0)), None);
    }

    #[test]
    fn test_rotate_indices() {
        assert_eq!(encode_rotate(1), Some(49));
        assert_eq!(encode_rotate(15), Some(63));
        assert_eq!(encode_rotate(-1), Some(63));
        assert_eq!(encode_rotate(0), None);
        assert_eq!(encode_rotate(16), None);
        assert_eq!(decode(48), SmallImm::RotateR5);
        assert_eq!(decode(52), SmallImm::Rotate(4));
    }

    proptest! {
        #[test]
        fn test_int_domain(v in -64i32..64) {
            let idx = encode(Imm::Int(v));
            prop_assert_eq!(idx.is_some(), (-16..=15).contains(&v));
            if let Some(i) = idx {
                prop_assert_eq!(decode(i), SmallImm::Value(Imm::Int(v)));
            }
        }

        #[test]
        fn test_float_domain(k in -12i32..12) {
            let f = 2f32.powi(k);
            let idx = encode(Imm::Float(f));
            prop_assert_eq!(idx.is_some(), (-8..=7).contains(&k));
            if let Some(i) = idx {
                prop_assert_eq!(decode(i), SmallImm::Value(Imm::Float(f)));
            }
        }
    }
}
