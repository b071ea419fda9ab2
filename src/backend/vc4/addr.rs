//! VC4 register address tables.
//!
//! Write addresses (6 bits, file chosen by the write-swap bit):
//!
//! | Addr | File A | File B |
//! |------|--------|--------|
//! | 0-31 | ra0-ra31 | rb0-rb31 |
//! | 32-35 | r0-r3 | r0-r3 |
//! | 37 | r5 | r5 |
//! | 38 | host_int | host_int |
//! | 39 | nop | nop |
//! | 48 | vpm_write | vpm_write |
//! | 49 | rd_setup | wr_setup |
//! | 50 | dma_ld_addr | dma_st_addr |
//! | 52-55 | sfu recip/rsqrt/exp/log | same |
//! | 56 | tmu0_s | tmu0_s |
//!
//! Read addresses (6 bits per file):
//!
//! | Addr | File A | File B |
//! |------|--------|--------|
//! | 0-31 | ra0-ra31 | rb0-rb31 |
//! | 32 | uniform | uniform |
//! | 38 | elem_num | qpu_num |
//! | 39 | nop | nop |
//! | 48 | vpm_read | vpm_read |
//! | 50 | dma_ld_wait | dma_st_wait |

use crate::ir::{Reg, RegFile, Special};

use crate::backend::EncodeError;

/// Accumulator write addresses, indexed by accumulator number.
const ACC_WADDR: [Option<u8>; 6] = [Some(32), Some(33), Some(34), Some(35), None, Some(37)];

/// Write address of `reg` and the file it must be written through, if
/// the address differs between files.
pub fn write_addr(reg: Reg) -> Result<(u8, Option<RegFile>), EncodeError> {
    if !reg.in_range() {
        return Err(EncodeError::RegOutOfRange(reg));
    }
    let addr = match reg {
        Reg::File { file, id } => return Ok((id, Some(file))),
        Reg::Acc(n) => {
            return ACC_WADDR[n as usize]
                .map(|a| (a, None))
                .ok_or(EncodeError::ReadOnlyDest(reg))
        }
        Reg::None => 39,
        Reg::Special(s) => match s {
            Special::HostInt => 38,
            Special::VpmWrite => 48,
            Special::RdSetup => return Ok((49, Some(RegFile::A))),
            Special::WrSetup => return Ok((49, Some(RegFile::B))),
            Special::DmaLdAddr => return Ok((50, Some(RegFile::A))),
            Special::DmaStAddr => return Ok((50, Some(RegFile::B))),
            Special::SfuRecip => 52,
            Special::SfuRecipSqrt => 53,
            Special::SfuExp => 54,
            Special::SfuLog => 55,
            Special::Tmu0S => 56,
            _ => return Err(EncodeError::ReadOnlyDest(reg)),
        },
    };
    Ok((addr, None))
}

/// Register written by address `addr` through `file`.
pub fn reg_for_write(file: RegFile, addr: u8) -> Option<Reg> {
    Some(match (addr, file) {
        (0..=31, _) => Reg::File { file, id: addr },
        (32..=35, _) => Reg::Acc(addr - 32),
        (37, _) => Reg::Acc(5),
        (38, _) => Reg::Special(Special::HostInt),
        (39, _) => Reg::None,
        (48, _) => Reg::Special(Special::VpmWrite),
        (49, RegFile::A) => Reg::Special(Special::RdSetup),
        (49, RegFile::B) => Reg::Special(Special::WrSetup),
        (50, RegFile::A) => Reg::Special(Special::DmaLdAddr),
        (50, RegFile::B) => Reg::Special(Special::DmaStAddr),
        (52, _) => Reg::Special(Special::SfuRecip),
        (53, _) => Reg::Special(Special::SfuRecipSqrt),
        (54, _) => Reg::Special(Special::SfuExp),
        (55, _) => Reg::Special(Special::SfuLog),
        (56, _) => Reg::Special(Special::Tmu0S),
        _ => return None,
    })
}

/// Read address of a readable special, and the file it must be read from
/// (`None` if both files map it).
pub fn special_read_addr(s: Special) -> Option<(u8, Option<RegFile>)> {
    Some(match s {
        Special::Uniform => (32, None),
        Special::ElemNum => (38, Some(RegFile::A)),
        Special::QpuNum => (38, Some(RegFile::B)),
        Special::VpmRead => (48, None),
        Special::DmaLdWait => (50, Some(RegFile::A)),
        Special::DmaStWait => (50, Some(RegFile::B)),
        _ => return None,
    })
}

/// Register read by address `addr` from `file`.
pub fn reg_for_read(file: RegFile, addr: u8) -> Option<Reg> {
    Some(match (addr, file) {
        (0..=31, _) => Reg::File { file, id: addr },
        (32, _) => Reg::Special(Special::Uniform),
        (38, RegFile::A) => Reg::Special(Special::ElemNum),
        (38, RegFile::B) => Reg::Special(Special::QpuNum),
        (48, _) => Reg::Special(Special::VpmRead),
        (50, RegFile::A) => Reg::Special(Special::DmaLdWait),
        (50, RegFile::B) => Reg::Special(Special::DmaStWait),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_addresses() {
        assert_eq!(write_addr(Reg::a(7)).unwrap(), (7, Some(RegFile::A)));
        assert_eq!(write_addr(Reg::acc(5)).unwrap(), (37, None));
        assert_eq!(
            write_addr(Reg::special(Special::VpmWrite)).unwrap(),
            (48, None)
        );
        assert_eq!(
            write_addr(Reg::special(Special::DmaStAddr)).unwrap(),
            (50, Some(RegFile::B))
        );
    }

    #[test]
    fn test_read_only_destinations() {
        for s in [Special::Uniform, Special::ElemNum, Special::QpuNum] {
            assert!(matches!(
                write_addr(Reg::special(s)),
                Err(EncodeError::ReadOnlyDest(_))
            ));
        }
        assert!(matches!(
            write_addr(Reg::acc(4)),
            Err(EncodeError::ReadOnlyDest(_))
        ));
    }

    #[test]
    fn test_write_table_inverts() {
        let regs = [
            Reg::b(31),
            Reg::acc(2),
            Reg::None,
            Reg::special(Special::SfuLog),
            Reg::special(Special::RdSetup),
            Reg::special(Special::WrSetup),
            Reg::special(Special::Tmu0S),
        ];
        for reg in regs {
            let (addr, file) = write_addr(reg).unwrap();
            let file = file.unwrap_or(RegFile::A);
            assert_eq!(reg_for_write(file, addr), Some(reg));
        }
    }

    #[test]
    fn test_read_table() {
        assert_eq!(
            reg_for_read(RegFile::B, 38),
            Some(Reg::special(Special::QpuNum))
        );
        assert_eq!(reg_for_read(RegFile::A, 40), None);
    }
}
