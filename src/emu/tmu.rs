//! Texture and memory lookup unit, used as a per-lane gather.

use std::collections::VecDeque;

use crate::heap::Heap;

use super::error::EmuError;
use super::word::{Vector, Word, NUM_LANES};

/// Outstanding requests the hardware FIFO holds.
pub const TMU_FIFO_DEPTH: usize = 8;

/// One core's TMU request queue.
#[derive(Debug, Clone, Default)]
pub struct Tmu {
    queue: VecDeque<Vector>,
}

impl Tmu {
    /// Queue a gather: each selected lane loads the word at its address.
    /// Unselected lanes receive zero.
    pub fn request(
        &mut self,
        addrs: &Vector,
        mask: &[bool; NUM_LANES],
        heap: &Heap,
    ) -> Result<(), EmuError> {
        if self.queue.len() >= TMU_FIFO_DEPTH {
            log::warn!(
                "TMU request with {} loads outstanding; hardware would stall",
                self.queue.len()
            );
        }
        let mut v = Vector::default();
        for lane in (0..NUM_LANES).filter(|&l| mask[l]) {
            v[lane] = Word(heap.load(addrs[lane].0)?);
        }
        self.queue.push_back(v);
        Ok(())
    }

    /// Oldest completed load.
    pub fn receive(&mut self) -> Result<Vector, EmuError> {
        self.queue.pop_front().ok_or(EmuError::TmuEmpty)
    }

    pub fn outstanding(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_in_order() {
        let mut heap = Heap::new(256).unwrap();
        let buf = heap.alloc_words(32).unwrap();
        for (i, w) in heap.slice_mut(&buf).unwrap().iter_mut().enumerate() {
            *w = i as u32 * 10;
        }
        let base = heap.address(&buf).unwrap();
        let mut tmu = Tmu::default();

        let reversed = Vector::from_fn(|i| Word(base + 4 * (15 - i as u32)));
        tmu.request(&reversed, &[true; NUM_LANES], &heap).unwrap();
        tmu.request(&Vector::splat(base + 4 * 20), &[true; NUM_LANES], &heap)
            .unwrap();
        assert_eq!(tmu.outstanding(), 2);

        let first = tmu.receive().unwrap();
        assert_eq!(first[0].0, 150);
        assert_eq!(first[15].0, 0);
        assert_eq!(tmu.receive().unwrap(), Vector::splat(200u32));
        assert_eq!(tmu.receive(), Err(EmuError::TmuEmpty));
    }
}
