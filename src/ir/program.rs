//! Ordered instruction sequences.

use std::fmt;
use std::ops::Index;

use super::context::CompileContext;
use super::instr::{BranchCond, Instr, InstrKind, Label};

/// Instructions executed after a branch before it takes effect.
const DELAY_SLOTS: usize = 3;

/// An ordered stream of instructions.
///
/// Appending performs no validation beyond the tag/payload pairing the
/// type system already enforces. Encoders consume a program by reference
/// and never mutate it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    instrs: Vec<Instr>,
}

impl Program {
    /// Create an empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one instruction.
    pub fn append(&mut self, instr: impl Into<Instr>) -> &mut Self {
        self.instrs.push(instr.into());
        self
    }

    /// Append every instruction of `other`, in order.
    pub fn concat(&mut self, other: &Program) -> &mut Self {
        self.instrs.extend(other.instrs.iter().cloned());
        self
    }

    /// Append a branch to `label` and no-ops for its delay slots.
    pub fn jump(&mut self, cond: BranchCond, label: Label) -> &mut Self {
        self.append(Instr::branch_to(cond, label));
        for _ in 0..DELAY_SLOTS {
            self.append(Instr::nop());
        }
        self
    }

    /// Append `body` and branch back to its start while `repeat` holds.
    ///
    /// The body always runs at least once; its last flag update decides
    /// whether it runs again.
    pub fn loop_while(
        &mut self,
        ctx: &mut CompileContext,
        repeat: BranchCond,
        body: impl FnOnce(&mut Program, &mut CompileContext),
    ) -> &mut Self {
        let top = ctx.fresh_label();
        self.append(Instr::label(top));
        body(self, ctx);
        self.jump(repeat, top)
    }

    /// Append `body`, jumped over when `skip` holds.
    pub fn skip_if(
        &mut self,
        ctx: &mut CompileContext,
        skip: BranchCond,
        body: impl FnOnce(&mut Program, &mut CompileContext),
    ) -> &mut Self {
        let end = ctx.fresh_label();
        self.jump(skip, end);
        body(self, ctx);
        self.append(Instr::label(end))
    }

    /// Number of instructions, labels included.
    #[inline]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// True if no instruction has been appended.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Iterate over the instructions.
    pub fn iter(&self) -> std::slice::Iter<'_, Instr> {
        self.instrs.iter()
    }

    /// The instructions as a slice.
    pub fn as_slice(&self) -> &[Instr] {
        &self.instrs
    }

    /// Labels defined in this program, in order of appearance.
    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.instrs.iter().filter_map(|i| match i.kind {
            InstrKind::Label(l) => Some(l),
            _ => None,
        })
    }
}

impl From<Vec<Instr>> for Program {
    fn from(instrs: Vec<Instr>) -> Self {
        Self { instrs }
    }
}

impl FromIterator<Instr> for Program {
    fn from_iter<T: IntoIterator<Item = Instr>>(iter: T) -> Self {
        Self {
            instrs: iter.into_iter().collect(),
        }
    }
}

impl Extend<Instr> for Program {
    fn extend<T: IntoIterator<Item = Instr>>(&mut self, iter: T) {
        self.instrs.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instr;
    type IntoIter = std::slice::Iter<'a, Instr>;

    fn into_iter(self) -> Self::IntoIter {
        self.instrs.iter()
    }
}

impl Index<usize> for Program {
    type Output = Instr;

    fn index(&self, index: usize) -> &Instr {
        &self.instrs[index]
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in &self.instrs {
            if instr.is_label() {
                writeln!(f, "{}", instr)?;
            } else {
                writeln!(f, "    {}", instr)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::register::Reg;

    #[test]
    fn test_append_and_concat() {
        let mut head = Program::new();
        head.append(Instr::li(Reg::a(0), 1)).append(Instr::nop());

        let mut tail = Program::new();
        tail.append(Instr::end());

        head.concat(&tail);
        assert_eq!(head.len(), 3);
        assert_eq!(head[2].kind, InstrKind::End);
        assert_eq!(tail.len(), 1);
    }

    #[test]
    fn test_labels() {
        let prog: Program = vec![
            Instr::label(Label(3)),
            Instr::nop(),
            Instr::label(Label(1)),
        ]
        .into();
        let labels: Vec<_> = prog.labels().collect();
        assert_eq!(labels, vec![Label(3), Label(1)]);
    }

    #[test]
    fn test_builders_take_labels_from_context() {
        let mut ctx = CompileContext::new();
        let mut prog = Program::new();
        prog.loop_while(&mut ctx, BranchCond::Always, |p, ctx| {
            p.append(Instr::li(Reg::a(0), 1));
            p.skip_if(ctx, BranchCond::Always, |p, _| {
                p.append(Instr::li(Reg::a(0), 2));
            });
        });

        assert_eq!(ctx.label_count(), 2);
        assert_eq!(ctx.foreign_label(&prog), None);
        // label, li, branch + 3, li, label, branch + 3
        assert_eq!(prog.len(), 12);
        assert_eq!(prog[0].kind, InstrKind::Label(Label(0)));
        assert_eq!(prog[7].kind, InstrKind::Label(Label(1)));
        assert!(prog.iter().skip(3).take(3).all(|i| i.kind == InstrKind::Nop));
    }
}
