//! AST to SVML compiler
//!
//! Lowers a resolved program into a flat function table. The entry
//! function is synthesised from the program body; every `def` and
//! `lambda` becomes an additional function, indexed in definition
//! order (pre-order). Statement and expression lowering live in
//! `stmt.rs` and `expr.rs`; the per-function instruction machinery is
//! in `builder.rs`.
//!
//! Block rule: every statement leaves exactly one value on the
//! operand stack; a block's value is its last statement's, earlier
//! values are popped. A function returns its body's block value.

mod builder;
mod expr;
mod stmt;

pub use builder::{FunctionBuilder, LabelId};

use crate::ast::{Expr, Program, ScopeId, Stmt};
use crate::bytecode::{Instr, SVMFunction, SVMProgram};
use crate::config::CompileOptions;
use crate::diagnostic::{internal, CompileError, CompileErrorKind};
use crate::instrument::{FunctionInfo, Instrumentation};
use crate::resolver::{self, Coord, NameKind, Resolution};
use crate::span::Span;
use crate::token::Token;
use std::collections::{BTreeSet, HashMap};

/// Result of a successful compilation.
#[derive(Debug)]
pub struct CompileOutput {
    pub program: SVMProgram,
    pub instrumentation: Instrumentation,
}

/// Compile a program with default options.
pub fn compile(program: &Program) -> Result<CompileOutput, CompileError> {
    compile_program(program, &CompileOptions::default())
}

/// Compile a program into a fully relocated [`SVMProgram`] plus its
/// instrumentation records.
pub fn compile_program(
    program: &Program,
    options: &CompileOptions,
) -> Result<CompileOutput, CompileError> {
    let resolution = resolver::resolve(program)?;
    let mut compiler = Compiler {
        resolution,
        strings: Vec::new(),
        string_index: HashMap::new(),
        functions: Vec::new(),
        infos: Vec::new(),
    };

    let entry = compiler.alloc_function();
    compiler.compile_function(
        entry,
        "<main>",
        program.scope,
        &[],
        FnBody::Block(&program.body),
        Span::dummy(),
    )?;

    let functions = compiler
        .functions
        .into_iter()
        .map(|f| f.ok_or_else(|| internal("unfinished function slot", Span::dummy())))
        .collect::<Result<Vec<_>, _>>()?;
    let mut instrumentation = Instrumentation {
        functions: compiler
            .infos
            .into_iter()
            .map(|i| i.expect("every function records info"))
            .collect(),
    };
    instrumentation.analyze(options);

    Ok(CompileOutput {
        program: SVMProgram {
            entry,
            functions,
            strings: compiler.strings,
        },
        instrumentation,
    })
}

/// The body shape of a function being compiled.
pub(super) enum FnBody<'p> {
    /// Statement list (`def` bodies and the program itself)
    Block(&'p [Stmt]),
    /// Single expression (`lambda` bodies)
    Expr(&'p Expr),
}

/// Per-function lowering state: the instruction builder plus the
/// instrumentation facts gathered along the way.
pub(super) struct FnCtx {
    pub(super) builder: FunctionBuilder,
    pub(super) calls: BTreeSet<String>,
    pub(super) has_outer_store: bool,
}

pub(super) struct Compiler {
    pub(super) resolution: Resolution,
    strings: Vec<String>,
    string_index: HashMap<String, u32>,
    functions: Vec<Option<SVMFunction>>,
    infos: Vec<Option<FunctionInfo>>,
}

impl Compiler {
    /// Reserve the next function index (definition order).
    fn alloc_function(&mut self) -> usize {
        self.functions.push(None);
        self.infos.push(None);
        self.functions.len() - 1
    }

    /// Compile one function into its reserved slot.
    pub(super) fn compile_child(
        &mut self,
        name: &str,
        scope: ScopeId,
        params: &[Token],
        body: FnBody<'_>,
        span: Span,
    ) -> Result<usize, CompileError> {
        let index = self.alloc_function();
        self.compile_function(index, name, scope, params, body, span)?;
        Ok(index)
    }

    fn compile_function(
        &mut self,
        index: usize,
        name: &str,
        scope: ScopeId,
        params: &[Token],
        body: FnBody<'_>,
        span: Span,
    ) -> Result<(), CompileError> {
        let env_size = self.resolution.slot_count(scope);
        let mut ctx = FnCtx {
            builder: FunctionBuilder::new(params.len()),
            calls: BTreeSet::new(),
            has_outer_store: false,
        };
        ctx.builder.set_env_size(env_size);

        match body {
            FnBody::Block(stmts) => {
                let terminated = self.compile_block(&mut ctx, stmts, true)?;
                if !terminated {
                    // Fall off the end: return the block value.
                    debug_assert_eq!(ctx.builder.current_stack(), 1, "block rule violated");
                    ctx.builder.emit(Instr::Retg);
                }
            }
            FnBody::Expr(expr) => {
                self.compile_expr(&mut ctx, expr, true)?;
                debug_assert_eq!(ctx.builder.current_stack(), 1, "expression left no value");
                ctx.builder.emit(Instr::Retg);
            }
        }

        let function = ctx.builder.build(span)?;
        self.functions[index] = Some(function);
        let mut info = FunctionInfo::new(
            name,
            index,
            params.iter().map(|p| p.lexeme.clone()).collect(),
        );
        info.calls = ctx.calls;
        info.has_outer_store = ctx.has_outer_store;
        self.infos[index] = Some(info);
        Ok(())
    }

    /// Intern a string literal into the deduplicated pool.
    pub(super) fn intern(&mut self, text: &str) -> u32 {
        if let Some(&index) = self.string_index.get(text) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(text.to_string());
        self.string_index.insert(text.to_string(), index);
        index
    }

    /// The coordinate a token resolved to. Absence is a compiler bug:
    /// resolution covers every name the lowering can visit.
    pub(super) fn coord_of(&self, token: &Token) -> Result<Coord, CompileError> {
        self.resolution
            .coord(token)
            .ok_or_else(|| internal(format!("unresolved token '{}'", token.lexeme), token.span))
    }

    /// Emit the load for a resolved user name.
    pub(super) fn emit_load(
        &mut self,
        ctx: &mut FnCtx,
        token: &Token,
    ) -> Result<(), CompileError> {
        let coord = self.coord_of(token)?;
        match coord.kind {
            NameKind::Primitive => Err(CompileError::new(
                CompileErrorKind::PrimitiveReference {
                    name: token.lexeme.clone(),
                },
                token.span,
            )),
            NameKind::User => {
                let slot = slot_u8(coord.index, token.span)?;
                if coord.env_level == 0 {
                    ctx.builder.emit(Instr::Ldlg(slot));
                } else {
                    let level = level_u8(coord.env_level, token.span)?;
                    ctx.builder.emit(Instr::Ldpg(slot, level));
                }
                Ok(())
            }
        }
    }

    /// Emit the store for a resolved user name (pops the stored value).
    pub(super) fn emit_store(
        &mut self,
        ctx: &mut FnCtx,
        token: &Token,
    ) -> Result<(), CompileError> {
        let coord = self.coord_of(token)?;
        match coord.kind {
            NameKind::Primitive => Err(CompileError::new(
                CompileErrorKind::PrimitiveReference {
                    name: token.lexeme.clone(),
                },
                token.span,
            )),
            NameKind::User => {
                let slot = slot_u8(coord.index, token.span)?;
                if coord.env_level == 0 {
                    ctx.builder.emit(Instr::Stlg(slot));
                } else {
                    let level = level_u8(coord.env_level, token.span)?;
                    ctx.builder.emit(Instr::Stpg(slot, level));
                    ctx.has_outer_store = true;
                }
                Ok(())
            }
        }
    }
}

fn slot_u8(slot: u16, span: Span) -> Result<u8, CompileError> {
    u8::try_from(slot).map_err(|_| {
        CompileError::new(
            CompileErrorKind::TooManyLocals {
                count: usize::from(slot) + 1,
            },
            span,
        )
    })
}

fn level_u8(level: u16, span: Span) -> Result<u8, CompileError> {
    u8::try_from(level).map_err(|_| {
        CompileError::new(
            CompileErrorKind::NestingTooDeep {
                depth: usize::from(level),
            },
            span,
        )
    })
}
