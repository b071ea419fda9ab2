//! Arena heap for kernel buffers.
//!
//! A [`Heap`] is one contiguous block of GPU-visible memory with a bus
//! base address. Buffers are carved out by bump allocation and named by
//! [`BufferHandle`]s, which stay valid until the allocation is released or
//! the enclosing [`HeapScope`] ends.
//!
//! ```text
//!   base                                        base + capacity
//!   ├── buf0 ──┼──── buf1 ────┼─ buf2 ─┼────── free ──────┤
//!                                      ▲
//!                                     top
//! ```
//!
//! The emulator reads and writes the same storage through bus addresses
//! ([`Heap::load`] / [`Heap::store`]), so DMA and TMU traffic land in the
//! buffers the host sees.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Bus address of the first heap byte unless overridden.
pub const DEFAULT_BASE: u32 = 0x1000_0000;

const WORD: usize = 4;

static NEXT_ARENA: AtomicU32 = AtomicU32::new(1);

/// Heap errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// Allocation larger than the remaining space.
    #[error("heap exhausted: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    /// Handle was allocated from another heap.
    #[error("handle belongs to arena {handle}, not arena {heap}")]
    ForeignHandle { handle: u32, heap: u32 },

    /// Handle does not name a live allocation.
    #[error("no live allocation at offset 0x{offset:x}")]
    UnknownHandle { offset: u32 },

    /// Bus address outside the heap.
    #[error("address 0x{addr:08x} outside the heap")]
    OutOfRange { addr: u32 },

    /// Bus address not word aligned.
    #[error("address 0x{addr:08x} is not word aligned")]
    Unaligned { addr: u32 },

    /// Heap would extend past the 32-bit bus address space.
    #[error("heap of {capacity} bytes at 0x{base:08x} does not fit in the bus address space")]
    AddressSpace { base: u32, capacity: usize },
}

/// A buffer inside a specific heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    /// Arena that owns the buffer.
    pub arena: u32,
    /// Byte offset from the heap base.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

impl BufferHandle {
    /// Number of 32-bit words.
    pub fn len(&self) -> usize {
        self.size as usize / WORD
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Allocation {
    offset: usize,
    words: usize,
    live: bool,
}

/// Arena allocator over a word-addressed block.
#[derive(Debug)]
pub struct Heap {
    id: u32,
    base: u32,
    words: Vec<u32>,
    top: usize,
    allocations: Vec<Allocation>,
}

impl Heap {
    /// Heap of `capacity` bytes (rounded down to whole words) at
    /// [`DEFAULT_BASE`].
    pub fn new(capacity: usize) -> Result<Self, HeapError> {
        Self::with_base(capacity, DEFAULT_BASE)
    }

    /// Heap of `capacity` bytes whose first byte has bus address `base`.
    ///
    /// Every byte of the heap must have a 32-bit bus address.
    pub fn with_base(capacity: usize, base: u32) -> Result<Self, HeapError> {
        let end = u64::try_from(capacity)
            .ok()
            .and_then(|c| c.checked_add(u64::from(base)));
        if !matches!(end, Some(end) if end <= 1 << 32) {
            return Err(HeapError::AddressSpace { base, capacity });
        }
        let id = NEXT_ARENA.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "heap arena {}: {} bytes at 0x{:08x}",
            id,
            capacity,
            base
        );
        Ok(Self {
            id,
            base,
            words: vec![0; capacity / WORD],
            top: 0,
            allocations: Vec::new(),
        })
    }

    /// Arena identifier carried by every handle from this heap.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Bus address of the first byte.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD
    }

    /// Bytes currently allocated (including released holes below `top`).
    pub fn used(&self) -> usize {
        self.top * WORD
    }

    pub fn available(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Allocate `size` zeroed bytes, rounded up to whole words.
    pub fn alloc_array(&mut self, size: usize) -> Result<BufferHandle, HeapError> {
        self.alloc_words(size.div_ceil(WORD))
    }

    /// Allocate `len` zeroed words.
    pub fn alloc_words(&mut self, len: usize) -> Result<BufferHandle, HeapError> {
        let available = self.words.len() - self.top;
        if len > available {
            return Err(HeapError::OutOfMemory {
                requested: len * WORD,
                available: available * WORD,
            });
        }
        let offset = self.top;
        self.words[offset..offset + len].fill(0);
        self.top += len;
        self.allocations.push(Allocation {
            offset,
            words: len,
            live: true,
        });
        let handle = BufferHandle {
            arena: self.id,
            offset: (offset * WORD) as u32,
            size: (len * WORD) as u32,
        };
        log::trace!(
            "heap {}: alloc {} words at 0x{:08x}",
            self.id,
            len,
            self.base + handle.offset
        );
        Ok(handle)
    }

    /// Release a buffer. Space is reclaimed once every later allocation has
    /// been released as well.
    pub fn dealloc_array(&mut self, handle: BufferHandle) -> Result<(), HeapError> {
        let idx = self.find(&handle)?;
        self.allocations[idx].live = false;
        while let Some(last) = self.allocations.last() {
            if last.live {
                break;
            }
            self.top = last.offset;
            self.allocations.pop();
        }
        Ok(())
    }

    fn find(&self, handle: &BufferHandle) -> Result<usize, HeapError> {
        if handle.arena != self.id {
            return Err(HeapError::ForeignHandle {
                handle: handle.arena,
                heap: self.id,
            });
        }
        let offset = handle.offset as usize / WORD;
        self.allocations
            .iter()
            .position(|a| a.live && a.offset == offset && a.words == handle.len())
            .ok_or(HeapError::UnknownHandle {
                offset: handle.offset,
            })
    }

    /// Bus address of a buffer.
    pub fn address(&self, handle: &BufferHandle) -> Result<u32, HeapError> {
        self.find(handle)?;
        Ok(self.base + handle.offset)
    }

    /// Host view of a buffer.
    pub fn slice(&self, handle: &BufferHandle) -> Result<&[u32], HeapError> {
        let idx = self.find(handle)?;
        let a = self.allocations[idx];
        Ok(&self.words[a.offset..a.offset + a.words])
    }

    /// Mutable host view of a buffer.
    pub fn slice_mut(&mut self, handle: &BufferHandle) -> Result<&mut [u32], HeapError> {
        let idx = self.find(handle)?;
        let a = self.allocations[idx];
        Ok(&mut self.words[a.offset..a.offset + a.words])
    }

    fn index(&self, addr: u32) -> Result<usize, HeapError> {
        if addr % WORD as u32 != 0 {
            return Err(HeapError::Unaligned { addr });
        }
        let idx = addr
            .checked_sub(self.base)
            .map(|off| off as usize / WORD)
            .filter(|&i| i < self.words.len())
            .ok_or(HeapError::OutOfRange { addr })?;
        Ok(idx)
    }

    /// Read the word at bus address `addr`.
    pub fn load(&self, addr: u32) -> Result<u32, HeapError> {
        Ok(self.words[self.index(addr)?])
    }

    /// Write the word at bus address `addr`.
    pub fn store(&mut self, addr: u32, value: u32) -> Result<(), HeapError> {
        let idx = self.index(addr)?;
        self.words[idx] = value;
        Ok(())
    }

    /// Release every allocation.
    pub fn reset(&mut self) {
        self.top = 0;
        self.allocations.clear();
    }

    /// Open a scope; allocations made through it are released when it is
    /// dropped.
    pub fn scope(&mut self) -> HeapScope<'_> {
        HeapScope {
            top: self.top,
            allocations: self.allocations.len(),
            heap: self,
        }
    }
}

/// Guard releasing, on drop, every allocation made since it was opened.
#[derive(Debug)]
pub struct HeapScope<'a> {
    heap: &'a mut Heap,
    top: usize,
    allocations: usize,
}

impl Deref for HeapScope<'_> {
    type Target = Heap;

    fn deref(&self) -> &Heap {
        self.heap
    }
}

impl DerefMut for HeapScope<'_> {
    fn deref_mut(&mut self) -> &mut Heap {
        self.heap
    }
}

impl Drop for HeapScope<'_> {
    fn drop(&mut self) {
        log::trace!(
            "heap {}: scope released {} bytes",
            self.heap.id,
            self.heap.top.saturating_sub(self.top) * WORD
        );
        self.heap.allocations.truncate(self.allocations);
        self.heap.top = self.top;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_allocation() {
        let mut heap = Heap::new(64).unwrap();
        let a = heap.alloc_words(4).unwrap();
        let b = heap.alloc_words(8).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 16);
        assert_eq!(heap.address(&b).unwrap(), DEFAULT_BASE + 16);
        assert_eq!(heap.used(), 48);
        assert!(matches!(
            heap.alloc_words(5),
            Err(HeapError::OutOfMemory {
                requested: 20,
                available: 16
            })
        ));
    }

    #[test]
    fn test_host_and_bus_views_agree() {
        let mut heap = Heap::with_base(256, 0x8000).unwrap();
        let buf = heap.alloc_words(4).unwrap();
        heap.slice_mut(&buf).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        let addr = heap.address(&buf).unwrap();
        assert_eq!(heap.load(addr + 8).unwrap(), 3);
        heap.store(addr + 12, 40).unwrap();
        assert_eq!(heap.slice(&buf).unwrap(), &[1, 2, 3, 40]);
        assert_eq!(
            heap.load(addr + 2),
            Err(HeapError::Unaligned { addr: addr + 2 })
        );
        assert_eq!(heap.load(0x7FFC), Err(HeapError::OutOfRange { addr: 0x7FFC }));
        assert_eq!(
            heap.load(0x8000 + 256),
            Err(HeapError::OutOfRange { addr: 0x8100 })
        );
    }

    #[test]
    fn test_dealloc_reclaims_from_top() {
        let mut heap = Heap::new(64).unwrap();
        let a = heap.alloc_words(2).unwrap();
        let b = heap.alloc_words(2).unwrap();
        heap.dealloc_array(a).unwrap();
        assert_eq!(heap.used(), 16);
        heap.dealloc_array(b).unwrap();
        assert_eq!(heap.used(), 0);
        assert!(matches!(
            heap.dealloc_array(b),
            Err(HeapError::UnknownHandle { .. })
        ));
    }

    #[test]
    fn test_foreign_handle() {
        let mut one = Heap::new(16).unwrap();
        let two = Heap::new(16).unwrap();
        let h = one.alloc_words(1).unwrap();
        assert!(matches!(
            two.slice(&h),
            Err(HeapError::ForeignHandle { .. })
        ));
    }

    #[test]
    fn test_scope_releases_on_drop() {
        let mut heap = Heap::new(64).unwrap();
        let keep = heap.alloc_words(2).unwrap();
        let inner = {
            let mut scope = heap.scope();
            let h = scope.alloc_words(4).unwrap();
            assert_eq!(scope.used(), 24);
            h
        };
        assert_eq!(heap.used(), 8);
        assert!(heap.slice(&keep).is_ok());
        assert!(heap.slice(&inner).is_err());
        let again = heap.alloc_words(4).unwrap();
        assert_eq!(again.offset, inner.offset);
    }

    #[test]
    fn test_alloc_array_counts_bytes() {
        let mut heap = Heap::new(64).unwrap();
        let a = heap.alloc_array(16).unwrap();
        assert_eq!((a.size, a.len()), (16, 4));
        // partial words round up
        let b = heap.alloc_array(5).unwrap();
        assert_eq!((b.offset, b.size), (16, 8));
        assert_eq!(heap.used(), 24);
        assert_eq!(
            heap.alloc_array(41),
            Err(HeapError::OutOfMemory {
                requested: 44,
                available: 40
            })
        );
    }

    #[test]
    fn test_heap_must_fit_bus_addresses() {
        assert!(Heap::with_base(0x1000, 0xFFFF_F000).is_ok());
        assert_eq!(
            Heap::with_base(0x1004, 0xFFFF_F000).err(),
            Some(HeapError::AddressSpace {
                base: 0xFFFF_F000,
                capacity: 0x1004
            })
        );

        let mut top = Heap::with_base(16, 0xFFFF_FFF0).unwrap();
        let buf = top.alloc_words(4).unwrap();
        assert_eq!(top.address(&buf).unwrap(), 0xFFFF_FFF0);
        top.store(0xFFFF_FFFC, 9).unwrap();
        assert_eq!(top.slice(&buf).unwrap()[3], 9);
    }
}
