//! Expression lowering
//!
//! Expressions evaluate strictly left to right and leave exactly one
//! value. `tail` marks return position: calls there use the
//! frame-reusing `CALLT`/`CALLTP` forms, and conditional shapes
//! propagate the flag into their arms.

use super::{Compiler, FnBody, FnCtx};
use crate::ast::{BinaryOp, Expr, LogicOp, UnaryOp};
use crate::bytecode::{Instr, Opcode};
use crate::diagnostic::{CompileError, CompileErrorKind};
use crate::resolver::NameKind;

impl Compiler {
    pub(super) fn compile_expr(
        &mut self,
        ctx: &mut FnCtx,
        expr: &Expr,
        tail: bool,
    ) -> Result<(), CompileError> {
        match expr {
            Expr::Int { value, span: _ } => {
                match i32::try_from(*value) {
                    Ok(narrow) => ctx.builder.emit(Instr::Lgci(narrow)),
                    Err(_) => ctx.builder.emit(Instr::Lgcf64(*value as f64)),
                }
                Ok(())
            }
            Expr::Float { value, .. } => {
                ctx.builder.emit(Instr::Lgcf64(*value));
                Ok(())
            }
            Expr::Complex { span, .. } => Err(CompileError::new(
                CompileErrorKind::UnsupportedLiteral { literal: "complex" },
                *span,
            )),
            Expr::Bool { value, .. } => {
                ctx.builder.emit(if *value { Instr::Lgcb1 } else { Instr::Lgcb0 });
                Ok(())
            }
            Expr::Str { value, .. } => {
                let index = self.intern(value);
                ctx.builder.emit(Instr::Lgcs(index));
                Ok(())
            }
            Expr::None { .. } => {
                ctx.builder.emit(Instr::Lgcn);
                Ok(())
            }
            Expr::Name { token } => self.emit_load(ctx, token),
            Expr::Unary { op, operand, .. } => {
                self.compile_expr(ctx, operand, false)?;
                ctx.builder.emit(match op {
                    UnaryOp::Not => Instr::Notg,
                    UnaryOp::Neg => Instr::Negg,
                });
                Ok(())
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                self.compile_expr(ctx, left, false)?;
                self.compile_expr(ctx, right, false)?;
                ctx.builder.emit(binary_instr(*op));
                Ok(())
            }
            Expr::Logic {
                op, left, right, ..
            } => {
                // `a and b` lowers as `b if a else False`;
                // `a or b` lowers as `True if a else b`.
                self.compile_expr(ctx, left, false)?;
                let else_label = ctx.builder.emit_jump(Opcode::Brf, None);
                match op {
                    LogicOp::And => self.compile_expr(ctx, right, tail)?,
                    LogicOp::Or => ctx.builder.emit(Instr::Lgcb1),
                }
                let end_label = ctx.builder.emit_jump(Opcode::Br, None);
                ctx.builder.mark(else_label);
                match op {
                    LogicOp::And => ctx.builder.emit(Instr::Lgcb0),
                    LogicOp::Or => self.compile_expr(ctx, right, tail)?,
                }
                ctx.builder.mark(end_label);
                Ok(())
            }
            Expr::Ternary {
                test, then, orelse, ..
            } => {
                self.compile_expr(ctx, test, false)?;
                let else_label = ctx.builder.emit_jump(Opcode::Brf, None);
                self.compile_expr(ctx, then, tail)?;
                let end_label = ctx.builder.emit_jump(Opcode::Br, None);
                ctx.builder.mark(else_label);
                self.compile_expr(ctx, orelse, tail)?;
                ctx.builder.mark(end_label);
                Ok(())
            }
            Expr::Call {
                func, args, span, ..
            } => {
                let argc = u8::try_from(args.len()).map_err(|_| {
                    CompileError::new(
                        CompileErrorKind::TooManyArguments { count: args.len() },
                        *span,
                    )
                })?;

                // A callee that names a primitive dispatches through
                // CALLP; no load is emitted for it.
                if let Expr::Name { token } = func.as_ref() {
                    ctx.calls.insert(token.lexeme.clone());
                    let coord = self.coord_of(token)?;
                    if coord.kind == NameKind::Primitive {
                        for arg in args {
                            self.compile_expr(ctx, arg, false)?;
                        }
                        let prim = coord.index as u8;
                        ctx.builder.emit(if tail {
                            Instr::Calltp(prim, argc)
                        } else {
                            Instr::Callp(prim, argc)
                        });
                        return Ok(());
                    }
                }

                self.compile_expr(ctx, func, false)?;
                for arg in args {
                    self.compile_expr(ctx, arg, false)?;
                }
                ctx.builder.emit(if tail {
                    Instr::Callt(argc)
                } else {
                    Instr::Call(argc)
                });
                Ok(())
            }
            Expr::Lambda(lambda) => {
                let child = self.compile_child(
                    "<lambda>",
                    lambda.scope,
                    &lambda.params,
                    FnBody::Expr(&lambda.body),
                    lambda.span,
                )?;
                ctx.builder.emit(Instr::Newc(child as u32));
                Ok(())
            }
        }
    }
}

fn binary_instr(op: BinaryOp) -> Instr {
    match op {
        BinaryOp::Add => Instr::Addg,
        BinaryOp::Sub => Instr::Subg,
        BinaryOp::Mul => Instr::Mulg,
        BinaryOp::Div => Instr::Divg,
        BinaryOp::Mod => Instr::Modg,
        BinaryOp::Lt => Instr::Ltg,
        BinaryOp::Gt => Instr::Gtg,
        BinaryOp::Le => Instr::Leg,
        BinaryOp::Ge => Instr::Geg,
        BinaryOp::Eq => Instr::Eqg,
        BinaryOp::Ne => Instr::Neqg,
    }
}
