//! Special function unit.
//!
//! Writing an SFU register starts a computation whose result lands in r4
//! [`SFU_LATENCY`] steps later, counting the writing step. Reading r4 before
//! then returns its previous contents.

use crate::ir::Special;

use super::word::{Vector, Word, NUM_LANES};

/// Steps from the SFU write until r4 holds the result.
pub const SFU_LATENCY: u8 = 3;

/// Lane-wise result of an SFU function. Exp and log are base 2.
pub fn eval(func: Special, input: &Vector) -> Vector {
    input.map(|w| {
        let x = w.float();
        Word::from_float(match func {
            Special::SfuRecip => 1.0 / x,
            Special::SfuRecipSqrt => 1.0 / x.sqrt(),
            Special::SfuExp => x.exp2(),
            Special::SfuLog => x.log2(),
            _ => x,
        })
    })
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    value: Vector,
    mask: [bool; NUM_LANES],
    remaining: u8,
}

/// One core's SFU.
#[derive(Debug, Clone, Default)]
pub struct Sfu {
    pending: Option<Pending>,
}

impl Sfu {
    /// Start `func` on the lanes selected by `mask`.
    pub fn start(&mut self, func: Special, input: &Vector, mask: [bool; NUM_LANES]) {
        if self.pending.is_some() {
            log::warn!("SFU write while a result is pending; the earlier result is lost");
        }
        self.pending = Some(Pending {
            value: eval(func, input),
            mask,
            remaining: SFU_LATENCY,
        });
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Advance one step; returns the result and its lane mask once it is
    /// ready to be written to r4.
    pub fn tick(&mut self) -> Option<(Vector, [bool; NUM_LANES])> {
        let p = self.pending.as_mut()?;
        p.remaining -= 1;
        if p.remaining > 0 {
            return None;
        }
        self.pending.take().map(|p| (p.value, p.mask))
    }
}
