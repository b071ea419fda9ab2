//! Architectural state of one QPU.

use std::fmt;

use crate::ir::{Reg, RegFile};

use super::alu::LaneFlags;
use super::error::EmuError;
use super::sfu::Sfu;
use super::tmu::Tmu;
use super::vpm::VpmPort;
use super::word::{Vector, NUM_LANES};

/// Slots per register file.
pub const NUM_FILE_REGS: usize = 32;

/// Accumulators r0-r5.
pub const NUM_ACCS: usize = 6;

/// Accumulator receiving SFU and TMU results.
pub const R4: usize = 4;

/// Delay slots after a taken branch.
pub const BRANCH_DELAY: u8 = 3;

/// Words still executed after `END`.
pub const END_DELAY: u8 = 2;

/// Registers, flags and unit state of one core.
#[derive(Clone)]
pub struct QpuState {
    /// Core index (0-based).
    pub id: usize,
    pub regs_a: [Vector; NUM_FILE_REGS],
    pub regs_b: [Vector; NUM_FILE_REGS],
    pub acc: [Vector; NUM_ACCS],
    pub flags: LaneFlags,
    /// Index of the next bundle.
    pub pc: usize,
    uniforms: Vec<u32>,
    uniform_cursor: usize,
    pub vpm: VpmPort,
    pub sfu: Sfu,
    pub tmu: Tmu,
    /// Branch target and delay slots left before it takes effect.
    pub pending_branch: Option<(usize, u8)>,
    /// Delay words left after `END`.
    pub end_countdown: Option<u8>,
}

impl QpuState {
    /// State for core `id` of `num_qpus`. The uniform stream starts with the
    /// core id and the core count, followed by `uniforms`.
    pub fn new(id: usize, num_qpus: usize, uniforms: &[u32]) -> Self {
        let mut stream = Vec::with_capacity(uniforms.len() + 2);
        stream.push(id as u32);
        stream.push(num_qpus as u32);
        stream.extend_from_slice(uniforms);
        Self {
            id,
            regs_a: [Vector::default(); NUM_FILE_REGS],
            regs_b: [Vector::default(); NUM_FILE_REGS],
            acc: [Vector::default(); NUM_ACCS],
            flags: LaneFlags::default(),
            pc: 0,
            uniforms: stream,
            uniform_cursor: 0,
            vpm: VpmPort::default(),
            sfu: Sfu::default(),
            tmu: Tmu::default(),
            pending_branch: None,
            end_countdown: None,
        }
    }

    /// Next word of the uniform stream.
    pub fn next_uniform(&mut self) -> Result<u32, EmuError> {
        let v = *self
            .uniforms
            .get(self.uniform_cursor)
            .ok_or(EmuError::UniformsExhausted {
                read: self.uniform_cursor,
            })?;
        self.uniform_cursor += 1;
        Ok(v)
    }

    /// The launch uniforms, without the id and count prefix.
    pub fn uniforms_tail(&self) -> Vec<u32> {
        self.uniforms.get(2..).unwrap_or_default().to_vec()
    }

    /// Uniforms consumed so far.
    pub fn uniforms_read(&self) -> usize {
        self.uniform_cursor
    }

    /// Read a register-file slot or accumulator.
    pub fn read(&self, reg: Reg) -> Result<Vector, EmuError> {
        match reg {
            Reg::File { file, id } if (id as usize) < NUM_FILE_REGS => Ok(match file {
                RegFile::A => self.regs_a[id as usize],
                RegFile::B => self.regs_b[id as usize],
            }),
            Reg::Acc(n) if (n as usize) < NUM_ACCS => Ok(self.acc[n as usize]),
            Reg::File { .. } | Reg::Acc(_) => Err(EmuError::RegIndex(reg)),
            _ => Err(EmuError::UnmappedRead(reg)),
        }
    }

    /// Write the lanes of `value` selected by `mask` to a register-file slot
    /// or accumulator.
    pub fn write(
        &mut self,
        reg: Reg,
        value: &Vector,
        mask: &[bool; NUM_LANES],
    ) -> Result<(), EmuError> {
        let slot = match reg {
            Reg::File { file, id } if (id as usize) < NUM_FILE_REGS => match file {
                RegFile::A => &mut self.regs_a[id as usize],
                RegFile::B => &mut self.regs_b[id as usize],
            },
            Reg::Acc(n) if (n as usize) < NUM_ACCS && n as usize != R4 => {
                &mut self.acc[n as usize]
            }
            Reg::Acc(4) => return Err(EmuError::InvalidWrite(reg)),
            Reg::File { .. } | Reg::Acc(_) => return Err(EmuError::RegIndex(reg)),
            _ => return Err(EmuError::InvalidWrite(reg)),
        };
        *slot = slot.merge(*value, mask);
        Ok(())
    }
}

impl fmt::Debug for QpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live = |regs: &[Vector; NUM_FILE_REGS]| -> Vec<(usize, Vector)> {
            regs.iter()
                .copied()
                .enumerate()
                .filter(|(_, v)| *v != Vector::default())
                .collect()
        };
        f.debug_struct("QpuState")
            .field("id", &self.id)
            .field("pc", &self.pc)
            .field("acc", &self.acc)
            .field("regs_a", &live(&self.regs_a))
            .field("regs_b", &live(&self.regs_b))
            .field("uniforms_read", &self.uniform_cursor)
            .finish()
    }
}
