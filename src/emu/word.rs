//! Lane values.
//!
//! A [`Word`] is 32 raw bits; the operation reading it decides whether the
//! bits are an integer or an IEEE-754 float. A [`Vector`] holds one word per
//! lane.

use std::fmt;
use std::ops::{Index, IndexMut};

/// Number of SIMD lanes.
pub const NUM_LANES: usize = 16;

/// One 32-bit lane value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Word(pub u32);

impl Word {
    #[inline]
    pub fn from_int(v: i32) -> Self {
        Word(v as u32)
    }

    #[inline]
    pub fn from_float(v: f32) -> Self {
        Word(v.to_bits())
    }

    #[inline]
    pub fn int(self) -> i32 {
        self.0 as i32
    }

    #[inline]
    pub fn uint(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn float(self) -> f32 {
        f32::from_bits(self.0)
    }

    /// Zero test under the given interpretation (`-0.0` is zero).
    #[inline]
    pub fn is_zero(self, float: bool) -> bool {
        if float {
            self.float() == 0.0
        } else {
            self.0 == 0
        }
    }

    /// Negative test under the given interpretation.
    #[inline]
    pub fn is_negative(self, float: bool) -> bool {
        if float {
            self.float() < 0.0
        } else {
            self.int() < 0
        }
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u32> for Word {
    fn from(v: u32) -> Self {
        Word(v)
    }
}

impl From<i32> for Word {
    fn from(v: i32) -> Self {
        Word::from_int(v)
    }
}

impl From<f32> for Word {
    fn from(v: f32) -> Self {
        Word::from_float(v)
    }
}

/// One word per lane.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vector(pub [Word; NUM_LANES]);

impl Vector {
    /// Same value in every lane.
    pub fn splat(w: impl Into<Word>) -> Self {
        Vector([w.into(); NUM_LANES])
    }

    /// Lane `i` holds `f(i)`.
    pub fn from_fn(f: impl FnMut(usize) -> Word) -> Self {
        Vector(std::array::from_fn(f))
    }

    /// Lane index in every lane.
    pub fn lane_ids() -> Self {
        Self::from_fn(|i| Word(i as u32))
    }

    pub fn map(self, mut f: impl FnMut(Word) -> Word) -> Self {
        Self::from_fn(|i| f(self.0[i]))
    }

    pub fn zip(self, other: Vector, mut f: impl FnMut(Word, Word) -> Word) -> Self {
        Self::from_fn(|i| f(self.0[i], other.0[i]))
    }

    /// Take lanes from `other` where `mask` is set.
    pub fn merge(self, other: Vector, mask: &[bool; NUM_LANES]) -> Self {
        Self::from_fn(|i| if mask[i] { other.0[i] } else { self.0[i] })
    }

    /// Element `i` moves to lane `i + n` (mod 16).
    pub fn rotate(self, n: u32) -> Self {
        let n = n as usize % NUM_LANES;
        Self::from_fn(|i| self.0[(i + NUM_LANES - n) % NUM_LANES])
    }

    pub fn iter(&self) -> impl Iterator<Item = Word> + '_ {
        self.0.iter().copied()
    }

    /// Raw lane bits.
    pub fn to_u32s(&self) -> [u32; NUM_LANES] {
        self.0.map(|w| w.0)
    }

    /// Lanes as signed integers.
    pub fn to_ints(&self) -> [i32; NUM_LANES] {
        self.0.map(Word::int)
    }

    /// Lanes as floats.
    pub fn to_floats(&self) -> [f32; NUM_LANES] {
        self.0.map(Word::float)
    }
}

impl From<[u32; NUM_LANES]> for Vector {
    fn from(v: [u32; NUM_LANES]) -> Self {
        Vector(v.map(Word))
    }
}

impl From<[i32; NUM_LANES]> for Vector {
    fn from(v: [i32; NUM_LANES]) -> Self {
        Vector(v.map(Word::from_int))
    }
}

impl From<[f32; NUM_LANES]> for Vector {
    fn from(v: [f32; NUM_LANES]) -> Self {
        Vector(v.map(Word::from_float))
    }
}

impl Index<usize> for Vector {
    type Output = Word;

    fn index(&self, i: usize) -> &Word {
        &self.0[i]
    }
}

impl IndexMut<usize> for Vector {
    fn index_mut(&mut self, i: usize) -> &mut Word {
        &mut self.0[i]
    }
}

impl fmt::Debug for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|w| *w == self.0[0]) {
            return write!(f, "[{:?}; 16]", self.0[0]);
        }
        f.debug_list().entries(self.0.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_views() {
        let w = Word::from_float(-2.5);
        assert_eq!(w.float(), -2.5);
        assert!(w.is_negative(true));
        assert!(!w.is_negative(false) || w.int() < 0);
        assert!(Word::from_float(-0.0).is_zero(true));
        assert!(!Word::from_float(-0.0).is_zero(false));
        assert_eq!(Word::from_int(-1).uint(), u32::MAX);
    }

    #[test]
    fn test_rotate_moves_elements_up() {
        let v = Vector::lane_ids().rotate(3);
        assert_eq!(v[3], Word(0));
        assert_eq!(v[0], Word(13));
        assert_eq!(Vector::lane_ids().rotate(16), Vector::lane_ids());
    }

    #[test]
    fn test_merge() {
        let mut mask = [false; NUM_LANES];
        mask[2] = true;
        let v = Vector::splat(1u32).merge(Vector::splat(9u32), &mask);
        assert_eq!(v[2], Word(9));
        assert_eq!(v[3], Word(1));
    }
}
