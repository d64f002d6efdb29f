//! Per-function instruction builder
//!
//! Accumulates instructions for one function, tracks operand-stack
//! depth, manages labels and branch fixups, and finalises into an
//! [`SVMFunction`]. `build()` runs the dead-code peephole, resolves
//! every fixup into a relative branch offset (relative to the
//! instruction following the branch) and certifies `max_stack` with
//! the control-flow analysis from the validator.

use crate::bytecode::{validator, Instr, Opcode, SVMFunction};
use crate::diagnostic::{internal, CompileError};
use crate::span::Span;
use std::collections::HashSet;

/// Handle to a branch target inside one builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelId(usize);

#[derive(Debug, Clone, Copy, Default)]
struct LabelState {
    /// Instruction index the label is marked at
    position: Option<usize>,
    /// Operand-stack depth expected at the label, recorded by the
    /// first branch that targets it. Used to re-seed linear depth
    /// tracking after an unconditional predecessor.
    expected_depth: Option<i32>,
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    /// Index of the branch instruction awaiting its offset
    at: usize,
    label: LabelId,
}

/// Builder for one function's instruction stream.
#[derive(Debug)]
pub struct FunctionBuilder {
    num_args: usize,
    env_size: usize,
    code: Vec<Instr>,
    current_stack: i32,
    labels: Vec<LabelState>,
    fixups: Vec<Fixup>,
}

impl FunctionBuilder {
    pub fn new(num_args: usize) -> Self {
        Self {
            num_args,
            env_size: num_args,
            code: Vec::new(),
            current_stack: 0,
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Set the frame slot count. Must be at least `num_args`.
    pub fn set_env_size(&mut self, env_size: usize) {
        self.env_size = env_size;
    }

    /// Number of instructions emitted so far.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Append one instruction, updating the linear depth tracking.
    pub fn emit(&mut self, instr: Instr) {
        self.current_stack += instr.stack_effect();
        self.code.push(instr);
    }

    /// Allocate a label without marking it.
    pub fn new_label(&mut self) -> LabelId {
        self.labels.push(LabelState::default());
        LabelId(self.labels.len() - 1)
    }

    /// Allocate a label and mark it at the current position.
    pub fn mark_label(&mut self) -> LabelId {
        let label = self.new_label();
        self.mark(label);
        label
    }

    /// Mark a label at the current position. When the preceding
    /// instruction never falls through (an unconditional branch, a
    /// `RET*`), the linear depth is re-seeded from the depth recorded
    /// by the branches that target this label.
    pub fn mark(&mut self, label: LabelId) {
        self.labels[label.0].position = Some(self.code.len());
        let fallthrough = match self.code.last() {
            Some(instr) => instr.opcode() != Opcode::Br && !instr.opcode().is_return(),
            None => true,
        };
        if !fallthrough {
            if let Some(depth) = self.labels[label.0].expected_depth {
                self.current_stack = depth;
            }
        } else if self.labels[label.0].expected_depth.is_none() {
            self.labels[label.0].expected_depth = Some(self.current_stack);
        }
    }

    /// Emit a branch with a placeholder offset, to be patched at
    /// `build()`. Returns the target label, freshly allocated when not
    /// supplied. Works for forward and backward targets alike.
    pub fn emit_jump(&mut self, opcode: Opcode, label: Option<LabelId>) -> LabelId {
        debug_assert!(opcode.is_branch(), "emit_jump takes BR/BRT/BRF");
        let label = label.unwrap_or_else(|| self.new_label());
        let instr = match opcode {
            Opcode::Br => Instr::Br(0),
            Opcode::Brt => Instr::Brt(0),
            _ => Instr::Brf(0),
        };
        self.current_stack += instr.stack_effect();
        self.fixups.push(Fixup {
            at: self.code.len(),
            label,
        });
        self.code.push(instr);
        if self.labels[label.0].expected_depth.is_none() {
            self.labels[label.0].expected_depth = Some(self.current_stack);
        }
        label
    }

    /// Finalise: peephole, fixup resolution, stack certification.
    ///
    /// An unmarked label referenced by a branch is a programmer error
    /// and surfaces here, as does any stack-discipline violation.
    pub fn build(self, span: Span) -> Result<SVMFunction, CompileError> {
        let FunctionBuilder {
            num_args,
            env_size,
            mut code,
            labels,
            fixups,
            ..
        } = self;

        match code.last() {
            Some(last) if last.opcode().is_return() => {}
            _ => return Err(internal("function does not end with a RET*", span)),
        }

        // Resolve fixups to absolute instruction indices.
        let mut resolved: Vec<(usize, usize)> = Vec::with_capacity(fixups.len());
        for fixup in &fixups {
            let target = labels[fixup.label.0]
                .position
                .ok_or_else(|| internal("branch to unmarked label", span))?;
            resolved.push((fixup.at, target));
        }

        // Dead-code peephole: erase LGCU/POPG and LGCN/POPG pairs.
        // A pair survives when either half is a branch target — erasing
        // it would change what the jump lands on.
        let targets: HashSet<usize> = resolved.iter().map(|&(_, t)| t).collect();
        let mut keep = vec![true; code.len()];
        let mut i = 0;
        while i + 1 < code.len() {
            let erasable = matches!(code[i], Instr::Lgcu | Instr::Lgcn)
                && code[i + 1] == Instr::Popg
                && !targets.contains(&i)
                && !targets.contains(&(i + 1));
            if erasable {
                keep[i] = false;
                keep[i + 1] = false;
                i += 2;
            } else {
                i += 1;
            }
        }

        // Old index -> new index, then compact.
        let mut new_index = vec![0usize; code.len() + 1];
        let mut next = 0;
        for (old, kept) in keep.iter().enumerate() {
            new_index[old] = next;
            if *kept {
                next += 1;
            }
        }
        new_index[code.len()] = next;
        let mut kept_iter = keep.iter();
        code.retain(|_| *kept_iter.next().expect("keep mask covers code"));

        // Patch branches: offsets are relative to the instruction
        // following the branch.
        for (at, target) in resolved {
            debug_assert!(keep[at], "branches are never erased");
            let at_new = new_index[at];
            let target_new = new_index[target];
            if target_new >= code.len() {
                return Err(internal("branch target past the end of the function", span));
            }
            let offset = target_new as i64 - (at_new as i64 + 1);
            let offset = i32::try_from(offset)
                .map_err(|_| internal("branch offset outside i32", span))?;
            code[at_new] = code[at_new].with_branch_offset(offset);
        }

        // Certify stack discipline and derive max_stack.
        let analysis = validator::analyze_stack(&code)
            .map_err(|e| internal(format!("stack discipline violated: {e}"), span))?;

        if env_size < num_args {
            return Err(internal("env_size smaller than num_args", span));
        }

        Ok(SVMFunction {
            max_stack: analysis.max_depth,
            env_size,
            num_args,
            code,
        })
    }

    /// Current linear depth, for the compiler's internal assertions.
    pub fn current_stack(&self) -> i32 {
        self.current_stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn build(b: FunctionBuilder) -> SVMFunction {
        b.build(Span::dummy()).expect("builds cleanly")
    }

    #[test]
    fn straight_line_max_stack() {
        let mut b = FunctionBuilder::new(0);
        b.emit(Instr::Lgci(1));
        b.emit(Instr::Lgci(2));
        b.emit(Instr::Addg);
        b.emit(Instr::Retg);
        let f = build(b);
        assert_eq!(f.max_stack, 2);
        assert_eq!(f.code.len(), 4);
    }

    #[test]
    fn forward_branch_resolves_relative_to_next() {
        let mut b = FunctionBuilder::new(0);
        b.emit(Instr::Lgcb1);
        let end = b.emit_jump(Opcode::Brf, None);
        b.emit(Instr::Lgci(1));
        b.emit(Instr::Popg);
        b.mark(end);
        b.emit(Instr::Lgci(2));
        b.emit(Instr::Retg);
        let f = build(b);
        // BRF at index 1 skips two instructions: offset is measured
        // from the instruction following the branch.
        assert_eq!(f.code[1], Instr::Brf(2));
    }

    #[test]
    fn backward_branch_gets_negative_offset() {
        let mut b = FunctionBuilder::new(0);
        let loop_top = b.mark_label();
        b.emit(Instr::Lgcb0);
        b.emit_jump(Opcode::Brt, Some(loop_top));
        b.emit(Instr::Retu);
        let f = build(b);
        // BRT at index 1; next instruction is 2; target 0 => offset -2
        assert_eq!(f.code[1], Instr::Brt(-2));
    }

    #[test]
    fn unmarked_label_is_a_build_error() {
        let mut b = FunctionBuilder::new(0);
        b.emit(Instr::Lgcb1);
        b.emit_jump(Opcode::Brf, None); // never marked
        b.emit(Instr::Retu);
        let err = b.build(Span::dummy()).unwrap_err();
        assert_eq!(err.code(), "SV0999");
    }

    #[test]
    fn missing_terminator_is_a_build_error() {
        let mut b = FunctionBuilder::new(0);
        b.emit(Instr::Lgci(1));
        assert!(b.build(Span::dummy()).is_err());
    }

    #[test]
    fn peephole_erases_undefined_pop_pairs() {
        let mut b = FunctionBuilder::new(0);
        b.emit(Instr::Lgcu);
        b.emit(Instr::Popg);
        b.emit(Instr::Lgcn);
        b.emit(Instr::Popg);
        b.emit(Instr::Lgci(7));
        b.emit(Instr::Retg);
        let f = build(b);
        assert_eq!(f.code, vec![Instr::Lgci(7), Instr::Retg]);
        assert_eq!(f.max_stack, 1);
    }

    #[test]
    fn peephole_skips_branch_targets() {
        // The POPG at index 1 is a branch target: erasing the
        // LGCU/POPG pair would change where the loop re-enters, so it
        // must survive.
        let mut b = FunctionBuilder::new(0);
        b.emit(Instr::Lgcu);
        let target = b.mark_label();
        b.emit(Instr::Popg);
        b.emit(Instr::Lgcu);
        b.emit(Instr::Lgcb0);
        b.emit_jump(Opcode::Brt, Some(target));
        b.emit(Instr::Popg);
        b.emit(Instr::Retu);
        let f = build(b);
        assert_eq!(f.code.len(), 7);
        assert_eq!(f.code[0], Instr::Lgcu);
        assert_eq!(f.code[1], Instr::Popg);
    }

    #[test]
    fn peephole_rewrites_branch_offsets_across_removals() {
        // BRF jumps over an erased pair; after erasure the offset shrinks.
        let mut b = FunctionBuilder::new(0);
        b.emit(Instr::Lgcb1);
        let end = b.emit_jump(Opcode::Brf, None);
        b.emit(Instr::Lgcu);
        b.emit(Instr::Popg);
        b.mark(end);
        b.emit(Instr::Lgci(3));
        b.emit(Instr::Retg);
        let f = build(b);
        assert_eq!(
            f.code,
            vec![Instr::Lgcb1, Instr::Brf(0), Instr::Lgci(3), Instr::Retg]
        );
    }

    #[test]
    fn conditional_shape_balances() {
        // cond ? 1 : 2 returned; both arms meet at depth 1
        let mut b = FunctionBuilder::new(0);
        b.emit(Instr::Lgcb1);
        let else_l = b.emit_jump(Opcode::Brf, None);
        b.emit(Instr::Lgci(1));
        let end_l = b.emit_jump(Opcode::Br, None);
        b.mark(else_l);
        b.emit(Instr::Lgci(2));
        b.mark(end_l);
        b.emit(Instr::Retg);
        let f = build(b);
        assert_eq!(f.max_stack, 1);
    }

    #[test]
    fn call_effect_scales_with_arity() {
        let mut b = FunctionBuilder::new(2);
        b.emit(Instr::Ldlg(0)); // callee
        b.emit(Instr::Ldlg(1)); // arg
        b.emit(Instr::Lgci(1)); // arg
        b.emit(Instr::Call(2));
        b.emit(Instr::Retg);
        let f = build(b);
        assert_eq!(f.max_stack, 3);
    }
}
