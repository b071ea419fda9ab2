//! Vertex pipe memory and its DMA engine.
//!
//! The VPM is 64 rows of 16 words. Cores access it a vector at a time
//! through the read/write ports, and the DMA engine copies blocks between
//! it and main memory. Transfers complete synchronously: a DMA wait read
//! returns immediately.
//!
//! Setup words (32-bit, written to `rd_setup` / `wr_setup`):
//!
//! | Register | Bits 31:28 | Meaning |
//! |----------|-----------|---------|
//! | `rd_setup` | `00xx` | VPM read: num 23:20, stride 17:12, horiz 11, size 9:8, addr 7:0 |
//! | `rd_setup` | `1000` | DMA load: mpitch 27:24, rowlen 23:20, nrows 19:16, vpitch 15:12, vert 11, y 10:4, x 3:0 |
//! | `rd_setup` | `1001` | DMA load stride: pitch in bytes 12:0 |
//! | `wr_setup` | `00xx` | VPM write: stride 17:12, horiz 11, size 9:8, addr 7:0 |
//! | `wr_setup` | `10xx` | DMA store: units 29:23, depth 22:16, horiz 14, y 13:7, x 6:3 |
//! | `wr_setup` | `11xx` | DMA store stride: gap in bytes 12:0 |
//!
//! A horizontal VPM address is a row. A vertical address holds the column
//! in bits 3:0 and the 16-row block in bits 5:4.

use crate::heap::Heap;

use super::error::EmuError;
use super::word::{Vector, Word, NUM_LANES};

/// Rows in the VPM.
pub const VPM_ROWS: usize = 64;

/// Total VPM size in words.
pub const VPM_WORDS: usize = VPM_ROWS * NUM_LANES;

/// 32-bit element size code.
const SIZE_32: u32 = 2;

/// Shared VPM storage.
#[derive(Debug, Clone)]
pub struct Vpm {
    words: Vec<u32>,
}

impl Default for Vpm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vpm {
    pub fn new() -> Self {
        Self {
            words: vec![0; VPM_WORDS],
        }
    }

    fn index(row: usize, col: usize) -> Result<usize, EmuError> {
        if row >= VPM_ROWS || col >= NUM_LANES {
            return Err(EmuError::VpmOutOfRange { row, col });
        }
        Ok(row * NUM_LANES + col)
    }

    /// Word at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Result<u32, EmuError> {
        Ok(self.words[Self::index(row, col)?])
    }

    pub fn set(&mut self, row: usize, col: usize, value: u32) -> Result<(), EmuError> {
        let i = Self::index(row, col)?;
        self.words[i] = value;
        Ok(())
    }

    /// Word at linear position `i` (row-major).
    fn linear(&self, i: usize) -> Result<u32, EmuError> {
        self.get(i / NUM_LANES, i % NUM_LANES)
    }

    fn set_linear(&mut self, i: usize, value: u32) -> Result<(), EmuError> {
        self.set(i / NUM_LANES, i % NUM_LANES, value)
    }

    /// Lane `i` of the vector at `addr` lives at the returned position.
    fn lane_pos(addr: u32, horizontal: bool, lane: usize) -> (usize, usize) {
        if horizontal {
            (addr as usize, lane)
        } else {
            (((addr as usize >> 4) & 0x3) * NUM_LANES + lane, addr as usize & 0xF)
        }
    }

    /// Read a vector.
    pub fn read_vector(&self, addr: u32, horizontal: bool) -> Result<Vector, EmuError> {
        let mut v = Vector::default();
        for lane in 0..NUM_LANES {
            let (row, col) = Self::lane_pos(addr, horizontal, lane);
            v[lane] = Word(self.get(row, col)?);
        }
        Ok(v)
    }

    /// Write the lanes of `v` selected by `mask`.
    pub fn write_vector(
        &mut self,
        addr: u32,
        horizontal: bool,
        v: &Vector,
        mask: &[bool; NUM_LANES],
    ) -> Result<(), EmuError> {
        for lane in (0..NUM_LANES).filter(|&l| mask[l]) {
            let (row, col) = Self::lane_pos(addr, horizontal, lane);
            self.set(row, col, v[lane].0)?;
        }
        Ok(())
    }
}

/// VPM read or write port setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VpmSetup {
    /// Vectors to read (1-16); ignored for writes.
    pub num: u8,
    /// Address increment after each vector (0-63).
    pub stride: u8,
    pub horizontal: bool,
    pub addr: u8,
}

impl VpmSetup {
    /// Horizontal access starting at row `addr` with stride 1.
    pub fn horizontal(addr: u8) -> Self {
        Self {
            num: 1,
            stride: 1,
            horizontal: true,
            addr,
        }
    }

    pub fn encode_read(&self) -> u32 {
        (self.num as u32 % 16) << 20 | self.encode_write()
    }

    pub fn encode_write(&self) -> u32 {
        (self.stride as u32 & 0x3F) << 12
            | (self.horizontal as u32) << 11
            | SIZE_32 << 8
            | self.addr as u32
    }

    pub fn decode(word: u32) -> Self {
        let num = ((word >> 20) & 0xF) as u8;
        Self {
            num: if num == 0 { 16 } else { num },
            stride: ((word >> 12) & 0x3F) as u8,
            horizontal: word & (1 << 11) != 0,
            addr: word as u8,
        }
    }
}

/// DMA load (memory to VPM) setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaLoadSetup {
    /// Words per row (1-16).
    pub row_len: u8,
    /// Rows (1-16).
    pub num_rows: u8,
    /// VPM increment between rows (1-16).
    pub vpitch: u8,
    /// Rows land in VPM columns instead of rows.
    pub vertical: bool,
    pub row: u8,
    pub col: u8,
    /// Memory pitch is `8 << mpitch` bytes; 0 selects the stride register.
    pub mpitch: u8,
}

impl DmaLoadSetup {
    pub fn encode(&self) -> u32 {
        1 << 31
            | (self.mpitch as u32 & 0xF) << 24
            | (self.row_len as u32 % 16) << 20
            | (self.num_rows as u32 % 16) << 16
            | (self.vpitch as u32 % 16) << 12
            | (self.vertical as u32) << 11
            | (self.row as u32 & 0x7F) << 4
            | self.col as u32 & 0xF
    }

    pub fn decode(word: u32) -> Self {
        let field = |shift: u32| match ((word >> shift) & 0xF) as u8 {
            0 => 16,
            n => n,
        };
        Self {
            row_len: field(20),
            num_rows: field(16),
            vpitch: field(12),
            vertical: word & (1 << 11) != 0,
            row: ((word >> 4) & 0x7F) as u8,
            col: (word & 0xF) as u8,
            mpitch: ((word >> 24) & 0xF) as u8,
        }
    }
}

/// DMA store (VPM to memory) setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaStoreSetup {
    /// Rows written (1-128).
    pub units: u8,
    /// Words per row (1-128).
    pub depth: u8,
    pub horizontal: bool,
    pub row: u8,
    pub col: u8,
}

impl DmaStoreSetup {
    pub fn encode(&self) -> u32 {
        2 << 30
            | (self.units as u32 % 128) << 23
            | (self.depth as u32 % 128) << 16
            | (self.horizontal as u32) << 14
            | (self.row as u32 & 0x7F) << 7
            | (self.col as u32 & 0xF) << 3
    }

    pub fn decode(word: u32) -> Self {
        let field = |shift: u32| match ((word >> shift) & 0x7F) as u8 {
            0 => 128,
            n => n,
        };
        Self {
            units: field(23),
            depth: field(16),
            horizontal: word & (1 << 14) != 0,
            row: ((word >> 7) & 0x7F) as u8,
            col: ((word >> 3) & 0xF) as u8,
        }
    }
}

/// Stride word for `rd_setup`: full memory pitch between loaded rows.
pub fn load_stride(pitch_bytes: u32) -> u32 {
    9 << 28 | pitch_bytes & 0x1FFF
}

/// Stride word for `wr_setup`: gap in bytes between stored rows.
pub fn store_stride(gap_bytes: u32) -> u32 {
    3 << 30 | gap_bytes & 0x1FFF
}

/// A decoded `rd_setup` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSetup {
    Vpm(VpmSetup),
    DmaLoad(DmaLoadSetup),
    LoadStride(u32),
}

impl ReadSetup {
    pub fn decode(word: u32) -> Self {
        match word >> 28 {
            9 => ReadSetup::LoadStride(word & 0x1FFF),
            w if w & 0x8 != 0 => ReadSetup::DmaLoad(DmaLoadSetup::decode(word)),
            _ => ReadSetup::Vpm(VpmSetup::decode(word)),
        }
    }
}

/// A decoded `wr_setup` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSetup {
    Vpm(VpmSetup),
    DmaStore(DmaStoreSetup),
    StoreStride(u32),
}

impl WriteSetup {
    pub fn decode(word: u32) -> Self {
        match word >> 30 {
            2 => WriteSetup::DmaStore(DmaStoreSetup::decode(word)),
            3 => WriteSetup::StoreStride(word & 0x1FFF),
            _ => WriteSetup::Vpm(VpmSetup::decode(word)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    addr: u32,
    stride: u32,
    horizontal: bool,
    remaining: u32,
}

impl Cursor {
    fn from_setup(s: &VpmSetup) -> Self {
        Self {
            addr: s.addr as u32,
            stride: s.stride as u32,
            horizontal: s.horizontal,
            remaining: s.num as u32,
        }
    }
}

/// One core's VPM ports and DMA setup registers.
#[derive(Debug, Clone, Default)]
pub struct VpmPort {
    read: Option<Cursor>,
    write: Option<Cursor>,
    load: Option<DmaLoadSetup>,
    store: Option<DmaStoreSetup>,
    load_pitch: u32,
    store_gap: u32,
}

impl VpmPort {
    /// Handle a write to `rd_setup`.
    pub fn write_read_setup(&mut self, word: u32) {
        match ReadSetup::decode(word) {
            ReadSetup::Vpm(s) => self.read = Some(Cursor::from_setup(&s)),
            ReadSetup::DmaLoad(s) => self.load = Some(s),
            ReadSetup::LoadStride(p) => self.load_pitch = p,
        }
    }

    /// Handle a write to `wr_setup`.
    pub fn write_write_setup(&mut self, word: u32) {
        match WriteSetup::decode(word) {
            WriteSetup::Vpm(s) => self.write = Some(Cursor::from_setup(&s)),
            WriteSetup::DmaStore(s) => self.store = Some(s),
            WriteSetup::StoreStride(g) => self.store_gap = g,
        }
    }

    /// Next vector from the read port.
    pub fn read(&mut self, vpm: &Vpm) -> Result<Vector, EmuError> {
        let c = self
            .read
            .as_mut()
            .filter(|c| c.remaining > 0)
            .ok_or(EmuError::VpmNotSetUp("read"))?;
        let v = vpm.read_vector(c.addr, c.horizontal)?;
        c.addr += c.stride;
        c.remaining -= 1;
        Ok(v)
    }

    /// Push a vector through the write port.
    pub fn write(
        &mut self,
        vpm: &mut Vpm,
        v: &Vector,
        mask: &[bool; NUM_LANES],
    ) -> Result<(), EmuError> {
        let c = self.write.as_mut().ok_or(EmuError::VpmNotSetUp("write"))?;
        vpm.write_vector(c.addr, c.horizontal, v, mask)?;
        c.addr += c.stride;
        Ok(())
    }

    /// Copy from memory at `base` into the VPM.
    pub fn dma_load(&self, base: u32, vpm: &mut Vpm, heap: &Heap) -> Result<(), EmuError> {
        let s = self.load.ok_or(EmuError::VpmNotSetUp("DMA load"))?;
        let pitch = if s.mpitch == 0 {
            self.load_pitch
        } else {
            8 << s.mpitch
        };
        log::trace!(
            "dma load 0x{:08x}: {}x{} pitch {} -> vpm ({}, {})",
            base,
            s.num_rows,
            s.row_len,
            pitch,
            s.row,
            s.col
        );
        for r in 0..s.num_rows as usize {
            let row_addr = base.wrapping_add(r as u32 * pitch);
            let step = r * s.vpitch as usize;
            for j in 0..s.row_len as usize {
                let value = heap.load(row_addr.wrapping_add(4 * j as u32))?;
                if s.vertical {
                    vpm.set(s.row as usize + j, s.col as usize + step, value)?;
                } else {
                    let at = (s.row as usize + step) * NUM_LANES + s.col as usize + j;
                    vpm.set_linear(at, value)?;
                }
            }
        }
        Ok(())
    }

    /// Copy from the VPM to memory at `base`.
    pub fn dma_store(&self, base: u32, vpm: &Vpm, heap: &mut Heap) -> Result<(), EmuError> {
        let s = self.store.ok_or(EmuError::VpmNotSetUp("DMA store"))?;
        let pitch = 4 * s.depth as u32 + self.store_gap;
        log::trace!(
            "dma store vpm ({}, {}) {}x{} -> 0x{:08x} pitch {}",
            s.row,
            s.col,
            s.units,
            s.depth,
            base,
            pitch
        );
        for u in 0..s.units as usize {
            let row_addr = base.wrapping_add(u as u32 * pitch);
            for j in 0..s.depth as usize {
                let value = if s.horizontal {
                    vpm.linear((s.row as usize + u) * NUM_LANES + s.col as usize + j)?
                } else {
                    vpm.get(s.row as usize + j, s.col as usize + u)?
                };
                heap.store(row_addr.wrapping_add(4 * j as u32), value)?;
            }
        }
        Ok(())
    }
}
