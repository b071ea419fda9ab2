//! V3D small-immediate table.
//!
//! Same value domain as the VC4 table, with the float halves swapped:
//! indices 32-39 hold 2^-8..2^-1 and 40-47 hold 2^0..2^7.

use crate::ir::Imm;

/// Bit pattern at table index `index` (0-47).
pub fn value_bits(index: u8) -> Option<u32> {
    Some(match index {
        0..=15 => index as u32,
        16..=31 => (index as i32 - 32) as u32,
        32..=39 => (127 - 8 + (index as u32 - 32)) << 23,
        40..=47 => (127 + (index as u32 - 40)) << 23,
        _ => return None,
    })
}

/// Table index for `imm`, or `None` outside the domain.
pub fn encode(imm: Imm) -> Option<u8> {
    let bits = imm.bits();
    (0u8..48).find(|&i| value_bits(i) == Some(bits))
}

/// Immediate at table index `index`.
pub fn decode(index: u8) -> Option<Imm> {
    let bits = value_bits(index)?;
    Some(if index < 32 {
        Imm::Int(bits as i32)
    } else {
        Imm::Float(f32::from_bits(bits))
    })
}
