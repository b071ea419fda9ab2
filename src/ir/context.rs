//! Fresh-name counters for code generation.

use super::instr::{BranchTarget, InstrKind, Label};
use super::program::Program;
use super::register::Reg;

/// Register-file slots handed out by [`CompileContext::fresh_reg`].
const FILE_SLOTS: u32 = 32;

/// Per-compilation counters handing out fresh labels and variable ids.
///
/// The counters are the only state shared between kernel builds; call
/// [`CompileContext::reset`] before starting an unrelated kernel so label
/// numbers start from zero again.
#[derive(Debug, Default)]
pub struct CompileContext {
    next_label: u32,
    next_var: u32,
}

impl CompileContext {
    /// Create a context with both counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out an unused label.
    pub fn fresh_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Hand out an unused variable id.
    pub fn fresh_var(&mut self) -> u32 {
        let var = self.next_var;
        self.next_var += 1;
        var
    }

    /// Hand out an unused register-file slot, alternating between files A
    /// and B so consecutive variables can be read in one instruction.
    ///
    /// Returns `None` once both files are exhausted.
    pub fn fresh_reg(&mut self) -> Option<Reg> {
        if self.next_var >= 2 * FILE_SLOTS {
            return None;
        }
        let var = self.fresh_var();
        let id = (var / 2) as u8;
        Some(if var % 2 == 0 { Reg::a(id) } else { Reg::b(id) })
    }

    /// Whether `label` was handed out by this context since the last reset.
    pub fn issued(&self, label: Label) -> bool {
        label.0 < self.next_label
    }

    /// First label `program` defines or branches to that this context did
    /// not hand out.
    pub fn foreign_label(&self, program: &Program) -> Option<Label> {
        program
            .iter()
            .filter_map(|i| match &i.kind {
                InstrKind::Label(l) => Some(*l),
                InstrKind::Branch(br) => match br.target {
                    BranchTarget::Label(l) => Some(l),
                    _ => None,
                },
                _ => None,
            })
            .find(|l| !self.issued(*l))
    }

    /// Number of labels handed out since the last reset.
    #[inline]
    pub fn label_count(&self) -> u32 {
        self.next_label
    }

    /// Number of variables handed out since the last reset.
    #[inline]
    pub fn var_count(&self) -> u32 {
        self.next_var
    }

    /// Reset both counters.
    pub fn reset(&mut self) {
        log::trace!(
            "compile context reset after {} labels, {} vars",
            self.next_label,
            self.next_var
        );
        self.next_label = 0;
        self.next_var = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_labels_are_distinct() {
        let mut ctx = CompileContext::new();
        let a = ctx.fresh_label();
        let b = ctx.fresh_label();
        assert_ne!(a, b);
        assert_eq!(ctx.label_count(), 2);
    }

    #[test]
    fn test_reset() {
        let mut ctx = CompileContext::new();
        ctx.fresh_label();
        ctx.fresh_var();
        ctx.fresh_var();
        ctx.reset();
        assert_eq!(ctx.fresh_label(), Label(0));
        assert_eq!(ctx.fresh_var(), 0);
    }

    #[test]
    fn test_fresh_regs_alternate_files() {
        let mut ctx = CompileContext::new();
        assert_eq!(ctx.fresh_reg(), Some(Reg::a(0)));
        assert_eq!(ctx.fresh_reg(), Some(Reg::b(0)));
        assert_eq!(ctx.fresh_reg(), Some(Reg::a(1)));
        let rest: Vec<_> = std::iter::from_fn(|| ctx.fresh_reg()).collect();
        assert_eq!(rest.len(), 61);
        assert_eq!(rest.last(), Some(&Reg::b(31)));
        assert_eq!(ctx.var_count(), 64);
    }

    #[test]
    fn test_foreign_labels() {
        use crate::ir::{BranchCond, Instr};

        let mut ctx = CompileContext::new();
        let top = ctx.fresh_label();
        let own: Program = vec![
            Instr::label(top),
            Instr::branch_to(BranchCond::Always, top),
        ]
        .into();
        assert_eq!(ctx.foreign_label(&own), None);

        let stray: Program = vec![Instr::branch_to(BranchCond::Always, Label(5))].into();
        assert_eq!(ctx.foreign_label(&stray), Some(Label(5)));

        ctx.reset();
        assert_eq!(ctx.foreign_label(&own), Some(top));
    }
}
