//! V3D 4.1 signal bits.
//!
//! The 5-bit `sig` field indexes a fixed table of signal combinations;
//! combinations missing from the table cannot be encoded.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A set of signals issued with one instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Signals(u16);

impl Signals {
    pub const NONE: Signals = Signals(0);
    pub const THRSW: Signals = Signals(1 << 0);
    pub const LDUNIF: Signals = Signals(1 << 1);
    pub const LDTMU: Signals = Signals(1 << 2);
    pub const LDVARY: Signals = Signals(1 << 3);
    pub const LDUNIFRF: Signals = Signals(1 << 4);
    pub const SMALL_IMM: Signals = Signals(1 << 5);
    pub const LDTLB: Signals = Signals(1 << 6);
    pub const LDTLBU: Signals = Signals(1 << 7);
    pub const WRTMUC: Signals = Signals(1 << 8);
    pub const UCB: Signals = Signals(1 << 9);
    pub const ROTATE: Signals = Signals(1 << 10);
    pub const LDUNIFA: Signals = Signals(1 << 11);
    pub const LDUNIFARF: Signals = Signals(1 << 12);
    pub const LDVPM: Signals = Signals(1 << 13);

    const NAMES: [(Signals, &'static str); 14] = [
        (Signals::THRSW, "thrsw"),
        (Signals::LDUNIF, "ldunif"),
        (Signals::LDTMU, "ldtmu"),
        (Signals::LDVARY, "ldvary"),
        (Signals::LDUNIFRF, "ldunifrf"),
        (Signals::SMALL_IMM, "small_imm"),
        (Signals::LDTLB, "ldtlb"),
        (Signals::LDTLBU, "ldtlbu"),
        (Signals::WRTMUC, "wrtmuc"),
        (Signals::UCB, "ucb"),
        (Signals::ROTATE, "rotate"),
        (Signals::LDUNIFA, "ldunifa"),
        (Signals::LDUNIFARF, "ldunifarf"),
        (Signals::LDVPM, "ldvpm"),
    ];

    /// True if every signal in `other` is set.
    #[inline]
    pub const fn contains(self, other: Signals) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no signal is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Signals that write their result to `sig_addr`.
    pub fn writes_address(self) -> bool {
        self.0
            & (Signals::LDTMU.0
                | Signals::LDVARY.0
                | Signals::LDTLB.0
                | Signals::LDTLBU.0
                | Signals::LDUNIFRF.0
                | Signals::LDUNIFARF.0)
            != 0
    }

    /// Table index for this combination.
    pub fn pack(self) -> Option<u8> {
        SIG_MAP
            .iter()
            .position(|s| *s == Some(self))
            .map(|i| i as u8)
    }

    /// Combination stored at table index `index`.
    pub fn unpack(index: u8) -> Option<Signals> {
        SIG_MAP.get(index as usize).copied().flatten()
    }
}

impl BitOr for Signals {
    type Output = Signals;

    fn bitor(self, rhs: Signals) -> Signals {
        Signals(self.0 | rhs.0)
    }
}

impl BitOrAssign for Signals {
    fn bitor_assign(&mut self, rhs: Signals) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signals({})", self)
    }
}

impl fmt::Display for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (sig, name) in Signals::NAMES {
            if self.contains(sig) {
                if !first {
                    f.write_str(".")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

const fn s(bits: u16) -> Option<Signals> {
    Some(Signals(bits))
}

const T: u16 = Signals::THRSW.0;
const U: u16 = Signals::LDUNIF.0;
const L: u16 = Signals::LDTMU.0;
const V: u16 = Signals::LDVARY.0;
const W: u16 = Signals::WRTMUC.0;
const SI: u16 = Signals::SMALL_IMM.0;

/// V3D 4.1 signal map.
const SIG_MAP: [Option<Signals>; 32] = [
    s(0),
    s(T),
    s(U),
    s(T | U),
    s(L),
    s(T | L),
    s(L | U),
    s(T | L | U),
    s(V),
    s(T | V),
    s(V | U),
    s(T | V | U),
    s(Signals::LDUNIFRF.0),
    s(T | Signals::LDUNIFRF.0),
    s(SI | V),
    s(SI),
    s(Signals::LDTLB.0),
    s(Signals::LDTLBU.0),
    s(W),
    s(T | W),
    s(V | W),
    s(T | V | W),
    s(Signals::UCB.0),
    s(Signals::ROTATE.0),
    s(Signals::LDUNIFA.0),
    s(Signals::LDUNIFARF.0),
    None,
    None,
    None,
    None,
    None,
    s(SI | L),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_known() {
        assert_eq!(Signals::NONE.pack(), Some(0));
        assert_eq!((Signals::THRSW | Signals::LDUNIF).pack(), Some(3));
        assert_eq!(Signals::LDUNIFRF.pack(), Some(12));
        assert_eq!(Signals::SMALL_IMM.pack(), Some(15));
        assert_eq!(Signals::ROTATE.pack(), Some(23));
        assert_eq!((Signals::SMALL_IMM | Signals::LDTMU).pack(), Some(31));
    }

    #[test]
    fn test_unencodable_combination() {
        assert_eq!((Signals::ROTATE | Signals::THRSW).pack(), None);
        assert_eq!(Signals::unpack(27), None);
    }

    #[test]
    fn test_table_inverts() {
        for i in 0u8..32 {
            if let Some(sig) = Signals::unpack(i) {
                assert_eq!(sig.pack(), Some(i));
            }
        }
    }

    #[test]
    fn test_writes_address() {
        assert!(Signals::LDTMU.writes_address());
        assert!(Signals::LDUNIFRF.writes_address());
        assert!(!Signals::LDUNIF.writes_address());
        assert!(!(Signals::THRSW | Signals::SMALL_IMM).writes_address());
    }

    #[test]
    fn test_display() {
        assert_eq!((Signals::THRSW | Signals::LDTMU).to_string(), "thrsw.ldtmu");
        assert_eq!(Signals::NONE.to_string(), "-");
    }
}
