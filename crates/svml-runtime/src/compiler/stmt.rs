//! Statement lowering
//!
//! Every statement leaves exactly one value on the operand stack.
//! `compile_block` strings statements together with the block rule
//! (N−1 pops) and reports whether control definitely left the block
//! through a `return`, so callers skip dead jumps and pops.

use super::{Compiler, FnBody, FnCtx};
use crate::ast::Stmt;
use crate::bytecode::{Instr, Opcode};
use crate::diagnostic::{unsupported, CompileError};

impl Compiler {
    /// Lower a block. `tail` marks the enclosing value as the
    /// function's return value, making calls in the last statement
    /// tail calls. Returns `true` when every path through the block
    /// returned.
    pub(super) fn compile_block(
        &mut self,
        ctx: &mut FnCtx,
        stmts: &[Stmt],
        tail: bool,
    ) -> Result<bool, CompileError> {
        if stmts.is_empty() {
            ctx.builder.emit(Instr::Lgcu);
            return Ok(false);
        }
        let last = stmts.len() - 1;
        for (i, stmt) in stmts.iter().enumerate() {
            let stmt_tail = tail && i == last;
            let terminated = self.compile_stmt(ctx, stmt, stmt_tail)?;
            if terminated {
                // Anything after an unconditional return is dead.
                return Ok(true);
            }
            if i != last {
                ctx.builder.emit(Instr::Popg);
            }
        }
        Ok(false)
    }

    /// Lower one statement; returns `true` when it returned on every
    /// path (and therefore left no block value behind).
    fn compile_stmt(
        &mut self,
        ctx: &mut FnCtx,
        stmt: &Stmt,
        tail: bool,
    ) -> Result<bool, CompileError> {
        match stmt {
            Stmt::Expr { value } => {
                self.compile_expr(ctx, value, tail)?;
                Ok(false)
            }
            Stmt::Assign { target, value } => {
                self.compile_expr(ctx, value, false)?;
                self.emit_store(ctx, target)?;
                ctx.builder.emit(Instr::Lgcu);
                Ok(false)
            }
            Stmt::FunctionDef(def) => {
                let child = self.compile_child(
                    &def.name.lexeme,
                    def.scope,
                    &def.params,
                    FnBody::Block(&def.body),
                    def.span,
                )?;
                ctx.builder.emit(Instr::Newc(child as u32));
                self.emit_store(ctx, &def.name)?;
                ctx.builder.emit(Instr::Lgcu);
                Ok(false)
            }
            Stmt::Return { value, .. } => {
                match value {
                    Some(expr) => {
                        self.compile_expr(ctx, expr, true)?;
                        // Dead after a tail call, live otherwise.
                        ctx.builder.emit(Instr::Retg);
                    }
                    None => ctx.builder.emit(Instr::Retu),
                }
                Ok(true)
            }
            Stmt::While { test, body, .. } => {
                let loop_top = ctx.builder.mark_label();
                self.compile_expr(ctx, test, false)?;
                let end = ctx.builder.emit_jump(Opcode::Brf, None);
                let body_terminated = self.compile_block(ctx, body, false)?;
                if !body_terminated {
                    ctx.builder.emit(Instr::Popg);
                    ctx.builder.emit_jump(Opcode::Br, Some(loop_top));
                }
                ctx.builder.mark(end);
                ctx.builder.emit(Instr::Lgcu);
                Ok(false)
            }
            Stmt::If {
                test, body, orelse, ..
            } => {
                self.compile_expr(ctx, test, false)?;
                let else_label = ctx.builder.emit_jump(Opcode::Brf, None);
                let then_terminated = self.compile_block(ctx, body, tail)?;
                let end_label = if then_terminated {
                    None
                } else {
                    Some(ctx.builder.emit_jump(Opcode::Br, None))
                };
                ctx.builder.mark(else_label);
                let else_terminated = if orelse.is_empty() {
                    ctx.builder.emit(Instr::Lgcu);
                    false
                } else {
                    self.compile_block(ctx, orelse, tail)?
                };
                if let Some(end) = end_label {
                    ctx.builder.mark(end);
                }
                Ok(then_terminated && else_terminated)
            }
            Stmt::Pass { .. } | Stmt::Global { .. } | Stmt::Nonlocal { .. } => {
                ctx.builder.emit(Instr::Lgcu);
                Ok(false)
            }
            Stmt::Break { span } => Err(unsupported("break", *span)),
            Stmt::Continue { span } => Err(unsupported("continue", *span)),
            Stmt::For { span, .. } => Err(unsupported("for", *span)),
            Stmt::Assert { span, .. } => Err(unsupported("assert", *span)),
            Stmt::Import { span, .. } => Err(unsupported("import", *span)),
            Stmt::AnnAssign { span, .. } => Err(unsupported("annotated assignment", *span)),
        }
    }
}
