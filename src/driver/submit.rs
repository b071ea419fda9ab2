//! Launch payloads handed to the kernel driver.
//!
//! | Target | Payload | Carries |
//! |--------|---------|---------|
//! | VC4 | [`MailboxLaunch`] | firmware property message, tag `0x30011`, pointing at a table of per-QPU (uniforms, code) bus address pairs |
//! | V3D | [`SubmitCsd`] | `DRM_IOCTL_V3D_SUBMIT_CSD` argument: 7 config words, 4 coefficient words, BO handles, sync objects |

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Firmware property tag that starts QPU execution.
pub const TAG_EXECUTE_QPU: u32 = 0x0003_0011;

/// Words in an execute-QPU property message.
pub const MAILBOX_WORDS: usize = 10;

/// VC4 execute-QPU request.
///
/// `control` is the bus address of `num_qpus` (uniforms, code) address
/// pairs, one per core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxLaunch {
    pub num_qpus: u32,
    pub control: u32,
    /// Skip the L2 cache flush before launch.
    pub noflush: bool,
    pub timeout_ms: u32,
}

impl MailboxLaunch {
    /// The property message as sent over the mailbox.
    pub fn message(&self) -> [u32; MAILBOX_WORDS] {
        [
            (MAILBOX_WORDS * 4) as u32,
            0, // request
            TAG_EXECUTE_QPU,
            16, // value buffer bytes
            16, // request bytes
            self.num_qpus,
            self.control,
            self.noflush as u32,
            self.timeout_ms,
            0, // end tag
        ]
    }

    /// Parse a message built by [`MailboxLaunch::message`].
    pub fn from_message(msg: &[u32; MAILBOX_WORDS]) -> Option<Self> {
        if msg[2] != TAG_EXECUTE_QPU {
            return None;
        }
        Some(Self {
            num_qpus: msg[5],
            control: msg[6],
            noflush: msg[7] != 0,
            timeout_ms: msg[8],
        })
    }
}

/// Compute dispatch geometry for a V3D launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsdDispatch {
    /// Workgroup counts in X, Y and Z.
    pub workgroups: [u32; 3],
    /// Invocations per workgroup.
    pub workgroup_size: u32,
    /// Workgroups per supergroup.
    pub wgs_per_sg: u32,
    /// Batches of 16 lanes (one per core).
    pub batches: u32,
}

impl CsdDispatch {
    /// One 16-lane batch per core.
    pub fn for_qpus(num_qpus: u32) -> Self {
        Self {
            workgroups: [16, 1, 1],
            workgroup_size: 16,
            wgs_per_sg: 16,
            batches: num_qpus,
        }
    }

    fn settings(&self) -> u32 {
        let lanes = self.wgs_per_sg * self.workgroup_size;
        (lanes.div_ceil(16).saturating_sub(1) << 12)
            | (self.wgs_per_sg & 0xF) << 8
            | self.workgroup_size & 0xFF
    }
}

/// `struct drm_v3d_submit_csd`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SubmitCsd {
    pub cfg: [u32; 7],
    pub coef: [u32; 4],
    _pad0: u32,
    /// User pointer to an array of `u32` BO handles.
    pub bo_handles: u64,
    pub bo_handle_count: u32,
    pub in_sync: u32,
    pub out_sync: u32,
    pub perfmon_id: u32,
    pub extensions: u64,
    pub flags: u32,
    _pad1: u32,
}

impl SubmitCsd {
    /// Payload launching the shader at `code` with its uniform stream at
    /// `uniforms`.
    pub fn new(dispatch: &CsdDispatch, code: u32, uniforms: u32) -> Self {
        let [x, y, z] = dispatch.workgroups;
        Self {
            cfg: [
                x << 16,
                y << 16,
                z << 16,
                dispatch.settings(),
                dispatch.batches.saturating_sub(1),
                code,
                uniforms,
            ],
            ..Self::default()
        }
    }

    pub fn code_address(&self) -> u32 {
        self.cfg[5]
    }

    pub fn uniforms_address(&self) -> u32 {
        self.cfg[6]
    }

    /// Cores the dispatch runs on.
    pub fn batches(&self) -> u32 {
        self.cfg[4] + 1
    }

    /// Attach buffer objects, given the user address of their handle array.
    pub fn with_bo_handles(mut self, ptr: u64, count: u32) -> Self {
        self.bo_handles = ptr;
        self.bo_handle_count = count;
        self
    }
}

/// A ready-to-submit launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Mailbox(MailboxLaunch),
    Csd(SubmitCsd),
}

impl Submission {
    pub fn num_qpus(&self) -> u32 {
        match self {
            Submission::Mailbox(m) => m.num_qpus,
            Submission::Csd(c) => c.batches(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_csd_layout() {
        assert_eq!(std::mem::size_of::<SubmitCsd>(), 88);

        let csd = SubmitCsd::new(&CsdDispatch::for_qpus(8), 0xC000_0000, 0xC001_0000)
            .with_bo_handles(0x7F00_1000, 2);
        let bytes = csd.as_bytes();
        assert_eq!(&bytes[0..4], &(16u32 << 16).to_le_bytes());
        // batches - 1
        assert_eq!(&bytes[16..20], &7u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &0xC000_0000u32.to_le_bytes());
        assert_eq!(&bytes[48..56], &0x7F00_1000u64.to_le_bytes());
        assert_eq!(&bytes[56..60], &2u32.to_le_bytes());

        let back = SubmitCsd::read_from_bytes(bytes).unwrap();
        assert_eq!(back, csd);
        assert_eq!(back.batches(), 8);
        assert_eq!(back.uniforms_address(), 0xC001_0000);
    }

    #[test]
    fn test_csd_settings_word() {
        let csd = SubmitCsd::new(&CsdDispatch::for_qpus(1), 0, 0);
        // 256 lanes = 16 batches of 16, 16 workgroups per supergroup
        // (field wraps to 0), 16 invocations each
        assert_eq!(csd.cfg[3], (15 << 12) | 16);
        assert_eq!(csd.cfg[4], 0);
    }

    #[test]
    fn test_mailbox_message() {
        let launch = MailboxLaunch {
            num_qpus: 12,
            control: 0x1000_0040,
            noflush: false,
            timeout_ms: 10_000,
        };
        let msg = launch.message();
        assert_eq!(msg[0], 40);
        assert_eq!(msg[2], TAG_EXECUTE_QPU);
        assert_eq!(msg[9], 0);
        assert_eq!(MailboxLaunch::from_message(&msg), Some(launch));

        let mut other = msg;
        other[2] = 0x0003_000C;
        assert_eq!(MailboxLaunch::from_message(&other), None);
    }
}
