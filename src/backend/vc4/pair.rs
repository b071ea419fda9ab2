//! Add/mul pairing.
//!
//! Merges an add-ALU instruction and an adjacent mul-ALU instruction into
//! one word when executing them together cannot change the result:
//!
//! - neither touches a special register or sets flags,
//! - the second does not read the first's destination,
//! - the destinations differ,
//! - neither sits in the delay slots of a branch,
//! - the combined read ports and write files encode.

use smallvec::smallvec;

use crate::backend::Bundle;
use crate::ir::{AluInstr, AluOp, Instr, InstrKind, MulOp, Reg};

use super::encode::encode_alu;

/// Branch delay slots on both generations.
const DELAY_SLOTS: usize = 3;

fn plain(alu: &AluInstr) -> bool {
    !alu.set_flags.is_set()
        && alu.op != AluOp::Mul(MulOp::Rotate)
        && alu.dest.as_special().is_none()
        && alu.sources().all(|r| r.as_special().is_none())
}

fn can_pair(first: &AluInstr, second: &AluInstr) -> bool {
    let units_differ = matches!(
        (first.op, second.op),
        (AluOp::Add(_), AluOp::Mul(_)) | (AluOp::Mul(_), AluOp::Add(_))
    );
    units_differ
        && plain(first)
        && plain(second)
        && (first.dest == Reg::None || first.dest != second.dest)
        && !second.sources().any(|r| r == first.dest)
        && encode_alu(&[first, second]).is_ok()
}

/// Group instructions into words, merging independent add/mul pairs.
pub fn pair(instrs: &[Instr]) -> Vec<Bundle> {
    let mut out: Vec<Bundle> = Vec::with_capacity(instrs.len());
    let mut since_branch = usize::MAX;
    let mut merged = 0usize;
    let mut i = 0;
    while i < instrs.len() {
        let cur = &instrs[i];
        if let (InstrKind::Alu(a), Some(next)) = (&cur.kind, instrs.get(i + 1)) {
            if let InstrKind::Alu(b) = &next.kind {
                // Pairing in a delay slot would pull a later instruction
                // ahead of the branch.
                if since_branch >= DELAY_SLOTS && can_pair(a, b) {
                    out.push(smallvec![cur.clone(), next.clone()]);
                    merged += 1;
                    since_branch = since_branch.saturating_add(1);
                    i += 2;
                    continue;
                }
            }
        }
        match cur.kind {
            InstrKind::Branch(_) => since_branch = 0,
            InstrKind::Label(_) => {}
            _ => since_branch = since_branch.saturating_add(1),
        }
        out.push(smallvec![cur.clone()]);
        i += 1;
    }
    log::debug!("vc4: paired {} add/mul instruction pairs", merged);
    out
}
