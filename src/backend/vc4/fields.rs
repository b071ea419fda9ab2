//! VideoCore IV word layouts.
//!
//! Every instruction is one 64-bit word. The signal field (bits 63:60)
//! selects the layout of the rest:
//!
//! ```text
//! ALU (sig 1, 3, 10, 13)
//!  63   60 59 57 56 55 52 51 49 48 46 45 44 43   38 37   32
//! ┌──────┬─────┬──┬─────┬─────┬─────┬──┬──┬───────┬───────┐
//! │ sig  │unpck│pm│pack │cond │cond │sf│ws│waddr  │waddr  │
//! │      │     │  │     │ add │ mul │  │  │ add   │ mul   │
//! └──────┴─────┴──┴─────┴─────┴─────┴──┴──┴───────┴───────┘
//!  31 29 28  24 23   18 17   12 11 9 8  6 5  3 2  0
//! ┌─────┬──────┬───────┬───────┬────┬────┬────┬────┐
//! │op_mul│op_add│raddr_a│raddr_b│add_a│add_b│mul_a│mul_b│
//! └─────┴──────┴───────┴───────┴────┴────┴────┴────┘
//!
//! Load immediate (sig 14): low 32 bits hold the value; bits 59:57 = 4
//! turns it into a semaphore op (bit 4 = decrement, bits 3:0 = id).
//!
//! Branch (sig 15)
//!  63   60 59 56 55   52 51  50  49   45 44 43   38 37   32 31        0
//! ┌──────┬─────┬───────┬───┬───┬───────┬──┬───────┬───────┬───────────┐
//! │ sig  │  -  │cond_br│rel│reg│raddr_a│ws│waddr  │waddr  │ offset    │
//! └──────┴─────┴───────┴───┴───┴───────┴──┴───────┴───────┴───────────┘
//! ```

/// Signal: plain ALU instruction.
pub const SIG_NONE: u8 = 1;
/// Signal: program end.
pub const SIG_END: u8 = 3;
/// Signal: load TMU0 result into r4.
pub const SIG_LDTMU0: u8 = 10;
/// Signal: `raddr_b` holds a small immediate.
pub const SIG_SMALL_IMM: u8 = 13;
/// Signal: load immediate.
pub const SIG_LOAD_IMM: u8 = 14;
/// Signal: branch.
pub const SIG_BRANCH: u8 = 15;

/// Canonical no-op word.
pub const NOP_WORD: u64 = 0x1000_09E7_009E_7000;

/// Mux selecting register file A.
pub const MUX_A: u8 = 6;
/// Mux selecting register file B (or the small immediate).
pub const MUX_B: u8 = 7;

/// Write address discarding the result.
pub const WADDR_NOP: u8 = 39;
/// Read address reading nothing.
pub const RADDR_NOP: u8 = 39;

/// Load-immediate sub-mode for semaphore operations.
pub const LI_MODE_SEMAPHORE: u8 = 0b100;

#[inline]
fn get(word: u64, shift: u32, width: u32) -> u64 {
    (word >> shift) & ((1u64 << width) - 1)
}

#[inline]
fn put(value: u64, shift: u32, width: u32) -> u64 {
    (value & ((1u64 << width) - 1)) << shift
}

/// Signal field of any word.
#[inline]
pub fn signal(word: u64) -> u8 {
    get(word, 60, 4) as u8
}

/// Fields of an ALU word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluWord {
    pub sig: u8,
    pub unpack: u8,
    pub pm: bool,
    pub pack: u8,
    pub cond_add: u8,
    pub cond_mul: u8,
    pub sf: bool,
    pub ws: bool,
    pub waddr_add: u8,
    pub waddr_mul: u8,
    pub op_mul: u8,
    pub op_add: u8,
    pub raddr_a: u8,
    pub raddr_b: u8,
    pub add_a: u8,
    pub add_b: u8,
    pub mul_a: u8,
    pub mul_b: u8,
}

impl AluWord {
    /// The canonical no-op.
    pub const fn nop() -> Self {
        Self {
            sig: SIG_NONE,
            unpack: 0,
            pm: false,
            pack: 0,
            cond_add: 0,
            cond_mul: 0,
            sf: false,
            ws: false,
            waddr_add: WADDR_NOP,
            waddr_mul: WADDR_NOP,
            op_mul: 0,
            op_add: 0,
            raddr_a: RADDR_NOP,
            raddr_b: RADDR_NOP,
            add_a: 0,
            add_b: 0,
            mul_a: 0,
            mul_b: 0,
        }
    }

    /// Pack into a word.
    pub fn to_bits(&self) -> u64 {
        put(self.sig as u64, 60, 4)
            | put(self.unpack as u64, 57, 3)
            | put(self.pm as u64, 56, 1)
            | put(self.pack as u64, 52, 4)
            | put(self.cond_add as u64, 49, 3)
            | put(self.cond_mul as u64, 46, 3)
            | put(self.sf as u64, 45, 1)
            | put(self.ws as u64, 44, 1)
            | put(self.waddr_add as u64, 38, 6)
            | put(self.waddr_mul as u64, 32, 6)
            | put(self.op_mul as u64, 29, 3)
            | put(self.op_add as u64, 24, 5)
            | put(self.raddr_a as u64, 18, 6)
            | put(self.raddr_b as u64, 12, 6)
            | put(self.add_a as u64, 9, 3)
            | put(self.add_b as u64, 6, 3)
            | put(self.mul_a as u64, 3, 3)
            | put(self.mul_b as u64, 0, 3)
    }

    /// Split a word into fields.
    pub fn from_bits(word: u64) -> Self {
        Self {
            sig: get(word, 60, 4) as u8,
            unpack: get(word, 57, 3) as u8,
            pm: get(word, 56, 1) != 0,
            pack: get(word, 52, 4) as u8,
            cond_add: get(word, 49, 3) as u8,
            cond_mul: get(word, 46, 3) as u8,
            sf: get(word, 45, 1) != 0,
            ws: get(word, 44, 1) != 0,
            waddr_add: get(word, 38, 6) as u8,
            waddr_mul: get(word, 32, 6) as u8,
            op_mul: get(word, 29, 3) as u8,
            op_add: get(word, 24, 5) as u8,
            raddr_a: get(word, 18, 6) as u8,
            raddr_b: get(word, 12, 6) as u8,
            add_a: get(word, 9, 3) as u8,
            add_b: get(word, 6, 3) as u8,
            mul_a: get(word, 3, 3) as u8,
            mul_b: get(word, 0, 3) as u8,
        }
    }
}

impl Default for AluWord {
    fn default() -> Self {
        Self::nop()
    }
}

/// Fields of a load-immediate word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadImmWord {
    pub mode: u8,
    pub pm: bool,
    pub pack: u8,
    pub cond_add: u8,
    pub cond_mul: u8,
    pub sf: bool,
    pub ws: bool,
    pub waddr_add: u8,
    pub waddr_mul: u8,
    pub imm: u32,
}

impl LoadImmWord {
    /// A load immediate writing nothing.
    pub const fn empty(imm: u32) -> Self {
        Self {
            mode: 0,
            pm: false,
            pack: 0,
            cond_add: 0,
            cond_mul: 0,
            sf: false,
            ws: false,
            waddr_add: WADDR_NOP,
            waddr_mul: WADDR_NOP,
            imm,
        }
    }

    /// Semaphore increment (`dec = false`) or decrement.
    pub const fn semaphore(id: u8, dec: bool) -> Self {
        let mut w = Self::empty(((dec as u32) << 4) | (id as u32 & 0xF));
        w.mode = LI_MODE_SEMAPHORE;
        w
    }

    /// Pack into a word.
    pub fn to_bits(&self) -> u64 {
        put(SIG_LOAD_IMM as u64, 60, 4)
            | put(self.mode as u64, 57, 3)
            | put(self.pm as u64, 56, 1)
            | put(self.pack as u64, 52, 4)
            | put(self.cond_add as u64, 49, 3)
            | put(self.cond_mul as u64, 46, 3)
            | put(self.sf as u64, 45, 1)
            | put(self.ws as u64, 44, 1)
            | put(self.waddr_add as u64, 38, 6)
            | put(self.waddr_mul as u64, 32, 6)
            | self.imm as u64
    }

    /// Split a word into fields.
    pub fn from_bits(word: u64) -> Self {
        Self {
            mode: get(word, 57, 3) as u8,
            pm: get(word, 56, 1) != 0,
            pack: get(word, 52, 4) as u8,
            cond_add: get(word, 49, 3) as u8,
            cond_mul: get(word, 46, 3) as u8,
            sf: get(word, 45, 1) != 0,
            ws: get(word, 44, 1) != 0,
            waddr_add: get(word, 38, 6) as u8,
            waddr_mul: get(word, 32, 6) as u8,
            imm: word as u32,
        }
    }
}

/// Fields of a branch word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchWord {
    pub cond: u8,
    pub rel: bool,
    pub reg: bool,
    pub raddr_a: u8,
    pub ws: bool,
    pub waddr_add: u8,
    pub waddr_mul: u8,
    pub imm: u32,
}

impl BranchWord {
    /// Pack into a word.
    pub fn to_bits(&self) -> u64 {
        put(SIG_BRANCH as u64, 60, 4)
            | put(self.cond as u64, 52, 4)
            | put(self.rel as u64, 51, 1)
            | put(self.reg as u64, 50, 1)
            | put(self.raddr_a as u64, 45, 5)
            | put(self.ws as u64, 44, 1)
            | put(self.waddr_add as u64, 38, 6)
            | put(self.waddr_mul as u64, 32, 6)
            | self.imm as u64
    }

    /// Split a word into fields.
    pub fn from_bits(word: u64) -> Self {
        Self {
            cond: get(word, 52, 4) as u8,
            rel: get(word, 51, 1) != 0,
            reg: get(word, 50, 1) != 0,
            raddr_a: get(word, 45, 5) as u8,
            ws: get(word, 44, 1) != 0,
            waddr_add: get(word, 38, 6) as u8,
            waddr_mul: get(word, 32, 6) as u8,
            imm: word as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nop_word() {
        assert_eq!(AluWord::nop().to_bits(), NOP_WORD);
        assert_eq!(AluWord::from_bits(NOP_WORD), AluWord::nop());
        assert_eq!(signal(NOP_WORD), SIG_NONE);
    }

    #[test]
    fn test_load_imm_layout() {
        let mut w = LoadImmWord::empty(0xDEAD_BEEF);
        w.waddr_add = 5;
        w.cond_add = 1;
        let bits = w.to_bits();
        assert_eq!(signal(bits), SIG_LOAD_IMM);
        assert_eq!(bits as u32, 0xDEAD_BEEF);
        assert_eq!(LoadImmWord::from_bits(bits), w);
    }

    #[test]
    fn test_semaphore_layout() {
        let bits = LoadImmWord::semaphore(7, true).to_bits();
        assert_eq!((bits >> 57) & 0x7, LI_MODE_SEMAPHORE as u64);
        assert_eq!(bits & 0x1F, 0x17);
    }

    #[test]
    fn test_branch_layout() {
        let w = BranchWord {
            cond: 15,
            rel: true,
            reg: false,
            raddr_a: 0,
            ws: false,
            waddr_add: WADDR_NOP,
            waddr_mul: WADDR_NOP,
            imm: (-40i32) as u32,
        };
        let bits = w.to_bits();
        assert_eq!(signal(bits), SIG_BRANCH);
        assert_eq!((bits >> 52) & 0xF, 15);
        assert_eq!(BranchWord::from_bits(bits), w);
    }
}
