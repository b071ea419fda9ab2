//! V3D condition/flags field.
//!
//! The 7-bit field encodes at most two of: add condition (AC), mul
//! condition (MC), add/mul flag push (APF/MPF), add/mul flag update
//! (AUF/MUF). Allowed combinations:
//!
//! | Present | Base | Payload |
//! |---------|------|---------|
//! | APF | 0 | apf |
//! | AUF | 0 | auf + 4 |
//! | MPF | 16 | mpf |
//! | MUF | 16 | muf + 4 |
//! | AC | 32 | ac << 2 |
//! | AC + MPF | 32 | ac << 2, mpf |
//! | MC | 48 | mc << 2 |
//! | MC + APF | 48 | mc << 2, apf |
//! | MC + AC | 64 | mc << 4, ac |
//! | MC + AUF | 64 | mc << 4, auf + 4 |

use std::fmt;

/// Per-lane execution condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    IfA = 0,
    IfB = 1,
    IfNA = 2,
    IfNB = 3,
}

impl Cond {
    fn from_bits(v: u32) -> Cond {
        match v & 3 {
            0 => Cond::IfA,
            1 => Cond::IfB,
            2 => Cond::IfNA,
            _ => Cond::IfNB,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Cond::IfA => "ifa",
            Cond::IfB => "ifb",
            Cond::IfNA => "ifna",
            Cond::IfNB => "ifnb",
        }
    }
}

/// Flag push: which property of the result becomes the new A flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PushFlag {
    #[default]
    None = 0,
    PushZ = 1,
    PushN = 2,
    PushC = 3,
}

impl PushFlag {
    fn from_bits(v: u32) -> PushFlag {
        match v & 3 {
            0 => PushFlag::None,
            1 => PushFlag::PushZ,
            2 => PushFlag::PushN,
            _ => PushFlag::PushC,
        }
    }

    fn name(self) -> &'static str {
        match self {
            PushFlag::None => "",
            PushFlag::PushZ => "pushz",
            PushFlag::PushN => "pushn",
            PushFlag::PushC => "pushc",
        }
    }
}

/// Flag update: combine the result with the existing A flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateFlag {
    AndZ = 0,
    AndNZ,
    NorNZ,
    NorZ,
    AndN,
    AndNN,
    NorNN,
    NorN,
    AndC,
    AndNC,
    NorNC,
    NorC,
}

impl UpdateFlag {
    const ALL: [UpdateFlag; 12] = [
        UpdateFlag::AndZ,
        UpdateFlag::AndNZ,
        UpdateFlag::NorNZ,
        UpdateFlag::NorZ,
        UpdateFlag::AndN,
        UpdateFlag::AndNN,
        UpdateFlag::NorNN,
        UpdateFlag::NorN,
        UpdateFlag::AndC,
        UpdateFlag::AndNC,
        UpdateFlag::NorNC,
        UpdateFlag::NorC,
    ];

    fn from_bits(v: u32) -> Option<UpdateFlag> {
        v.checked_sub(4)
            .and_then(|i| UpdateFlag::ALL.get(i as usize).copied())
    }

    #[inline]
    fn bits(self) -> u32 {
        self as u32 + 4
    }
}

/// Decoded flags field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags {
    pub ac: Option<Cond>,
    pub mc: Option<Cond>,
    pub apf: PushFlag,
    pub mpf: PushFlag,
    pub auf: Option<UpdateFlag>,
    pub muf: Option<UpdateFlag>,
}

impl Flags {
    /// True when no condition or flag write is requested.
    pub fn is_empty(&self) -> bool {
        *self == Flags::default()
    }

    /// Pack into the 7-bit field, or `None` for a combination the field
    /// cannot express.
    pub fn pack(&self) -> Option<u32> {
        let apf = self.apf != PushFlag::None;
        let mpf = self.mpf != PushFlag::None;
        let present = (
            self.ac.is_some(),
            self.mc.is_some(),
            apf,
            mpf,
            self.auf.is_some(),
            self.muf.is_some(),
        );
        let ac = self.ac.map_or(0, |c| c as u32);
        let mc = self.mc.map_or(0, |c| c as u32);
        let auf = self.auf.map_or(0, UpdateFlag::bits);
        let muf = self.muf.map_or(0, UpdateFlag::bits);
        Some(match present {
            (false, false, false, false, false, false) => 0,
            (false, false, true, false, false, false) => self.apf as u32,
            (false, false, false, false, true, false) => auf,
            (false, false, false, true, false, false) => 16 | self.mpf as u32,
            (false, false, false, false, false, true) => 16 | muf,
            (true, false, false, false, false, false) => 32 | ac << 2,
            (true, false, false, true, false, false) => 32 | self.mpf as u32 | ac << 2,
            (false, true, false, false, false, false) => 48 | mc << 2,
            (false, true, true, false, false, false) => 48 | self.apf as u32 | mc << 2,
            (true, true, false, false, false, false) => 64 | ac | mc << 4,
            (false, true, false, false, true, false) => 64 | auf | mc << 4,
            _ => return None,
        })
    }

    /// Decode the 7-bit field; `None` for the reserved value 16.
    pub fn unpack(v: u32) -> Option<Flags> {
        let mut f = Flags::default();
        match v {
            0 => {}
            1..=3 => f.apf = PushFlag::from_bits(v),
            4..=15 => f.auf = UpdateFlag::from_bits(v),
            16 => return None,
            17..=19 => f.mpf = PushFlag::from_bits(v),
            20..=31 => f.muf = UpdateFlag::from_bits(v & 0xF),
            32..=47 => {
                f.ac = Some(Cond::from_bits(v >> 2));
                f.mpf = PushFlag::from_bits(v);
            }
            48..=63 => {
                f.mc = Some(Cond::from_bits(v >> 2));
                f.apf = PushFlag::from_bits(v);
            }
            _ => {
                f.mc = Some(Cond::from_bits(v >> 4));
                if (v >> 2) & 3 == 0 {
                    f.ac = Some(Cond::from_bits(v));
                } else {
                    f.auf = UpdateFlag::from_bits(v & 0xF);
                }
            }
        }
        Some(f)
    }

    /// Assembler suffix for the add unit.
    pub fn add_suffix(&self) -> String {
        suffix(self.ac, self.apf, self.auf)
    }

    /// Assembler suffix for the mul unit.
    pub fn mul_suffix(&self) -> String {
        suffix(self.mc, self.mpf, self.muf)
    }
}

fn suffix(cond: Option<Cond>, pf: PushFlag, uf: Option<UpdateFlag>) -> String {
    let mut s = String::new();
    if let Some(c) = cond {
        s.push('.');
        s.push_str(c.name());
    }
    if pf != PushFlag::None {
        s.push('.');
        s.push_str(pf.name());
    }
    if let Some(u) = uf {
        s.push('.');
        s.push_str(&format!("{:?}", u).to_lowercase());
    }
    s
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "add{} mul{}", self.add_suffix(), self.mul_suffix())
    }
}
