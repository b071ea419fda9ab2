//! Code generation backends.
//!
//! Both targets consume the same [`Program`] and produce 64-bit machine
//! words:
//!
//! | Target | Module | Word count per instruction |
//! |--------|--------|----------------------------|
//! | VideoCore IV | [`vc4`] | 1 (2 ALU ops may share a word), `END` = 3 |
//! | V3D 4.1 | [`v3d`] | 1, large immediates expand, `END` = 4 |
//!
//! [`linearize`] resolves labels without encoding, producing the bundle
//! stream the emulator executes directly.

pub mod error;
pub mod v3d;
pub mod vc4;

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::ir::{BranchTarget, Instr, InstrKind, Label, Program};

pub use error::{DecodeError, EncodeError};

/// Instructions issued together in one machine word.
///
/// Holds one instruction, or an add-ALU and a mul-ALU instruction that were
/// paired into the same VC4 word.
pub type Bundle = SmallVec<[Instr; 2]>;

/// Hardware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// VideoCore IV (Pi 1-3).
    #[default]
    Vc4,
    /// V3D 4.1 (Pi 4).
    V3d,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Vc4 => f.write_str("vc4"),
            Target::V3d => f.write_str("v3d"),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vc4" => Ok(Target::Vc4),
            "v3d" => Ok(Target::V3d),
            other => Err(format!("unknown target '{}' (expected vc4 or v3d)", other)),
        }
    }
}

/// A backend turning programs into machine words.
pub trait Encoder {
    /// Generation this encoder targets.
    fn target(&self) -> Target;

    /// Encode a whole program, resolving labels.
    ///
    /// Stops at the first error; no partial output is returned.
    fn encode(&self, program: &Program) -> Result<Vec<u64>, EncodeError>;
}

/// Byte offset between consecutive machine words.
pub const WORD_BYTES: u32 = 8;

/// Branch offsets count from the branch plus this many words (the branch
/// and its three delay slots).
pub const BRANCH_BASE: i64 = 4;

/// Map each label to the word index of the first word after it.
///
/// Each entry is the label an item defines (if any) and the number of
/// words the item expands to; label markers have size zero.
pub(crate) fn label_positions(
    entries: impl IntoIterator<Item = (Option<Label>, usize)>,
) -> Result<HashMap<Label, usize>, EncodeError> {
    let mut map = HashMap::new();
    let mut pos = 0usize;
    for (label, size) in entries {
        if let Some(label) = label {
            if map.insert(label, pos).is_some() {
                return Err(EncodeError::DuplicateLabel(label));
            }
        }
        pos += size;
    }
    Ok(map)
}

/// The label a program entry defines, if it is a label marker.
#[inline]
pub(crate) fn defined_label(instr: &Instr) -> Option<Label> {
    match instr.kind {
        InstrKind::Label(label) => Some(label),
        _ => None,
    }
}

/// Branch offset in words from the word at `at` to `target`.
pub(crate) fn branch_offset(
    target: BranchTarget,
    at: usize,
    labels: &HashMap<Label, usize>,
) -> Result<BranchTarget, EncodeError> {
    match target {
        BranchTarget::Label(label) => {
            let dest = *labels.get(&label).ok_or(EncodeError::UnknownLabel(label))?;
            Ok(BranchTarget::Relative(
                (dest as i64 - at as i64 - BRANCH_BASE) as i32,
            ))
        }
        other => Ok(other),
    }
}

/// Resolve labels and drop label markers, one bundle per instruction.
///
/// Branch targets become [`BranchTarget::Relative`] offsets counted in
/// bundles. `END` is followed by its two delay-slot no-ops, as the VC4
/// encoder emits them.
pub fn linearize(program: &Program) -> Result<Vec<Bundle>, EncodeError> {
    let instrs = program.as_slice();
    let labels = label_positions(instrs.iter().map(|i| (defined_label(i), linear_size(i))))?;

    let mut out = Vec::with_capacity(instrs.len() + 2);
    for instr in instrs {
        match &instr.kind {
            InstrKind::Label(_) => {}
            InstrKind::Branch(br) => {
                let mut resolved = instr.clone();
                let target = branch_offset(br.target, out.len(), &labels)?;
                if let InstrKind::Branch(b) = &mut resolved.kind {
                    b.target = target;
                }
                out.push(smallvec![resolved]);
            }
            InstrKind::End => {
                out.push(smallvec![instr.clone()]);
                out.push(smallvec![Instr::nop()]);
                out.push(smallvec![Instr::nop()]);
            }
            _ => out.push(smallvec![instr.clone()]),
        }
    }
    log::debug!(
        "linearized {} instructions into {} bundles",
        instrs.len(),
        out.len()
    );
    Ok(out)
}

fn linear_size(instr: &Instr) -> usize {
    match instr.kind {
        InstrKind::Label(_) => 0,
        InstrKind::End => 3,
        _ => 1,
    }
}

/// Write code words little-endian.
pub fn write_words<W: Write>(mut out: W, words: &[u64]) -> io::Result<()> {
    for &w in words {
        out.write_u64::<LittleEndian>(w)?;
    }
    Ok(())
}

/// Read little-endian code words; the byte count must be a multiple of 8.
pub fn read_words<R: Read>(mut input: R) -> Result<Vec<u64>, DecodeError> {
    let mut bytes = Vec::new();
    input
        .read_to_end(&mut bytes)
        .map_err(|e| DecodeError::Io(e.to_string()))?;
    if bytes.len() % WORD_BYTES as usize != 0 {
        return Err(DecodeError::Truncated { len: bytes.len() });
    }
    let mut cursor = io::Cursor::new(bytes);
    let mut words = Vec::new();
    while let Ok(w) = cursor.read_u64::<LittleEndian>() {
        words.push(w);
    }
    Ok(words)
}

/// Encode for `target` with the default encoder settings.
pub fn encode(target: Target, program: &Program) -> Result<Vec<u64>, EncodeError> {
    match target {
        Target::Vc4 => vc4::Vc4Encoder::new().encode(program),
        Target::V3d => v3d::V3dEncoder::new().encode(program),
    }
}
