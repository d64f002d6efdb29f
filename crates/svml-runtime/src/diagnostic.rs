//! Compile-time diagnostics
//!
//! Everything the resolver and compiler can refuse flows through the
//! single [`CompileError`] type: a kind with a stable `SVxxxx` code
//! plus the offending token's source span. Rendering is either the
//! human `error[SVxxxx]: … --> offset` form or compact JSON for
//! tooling.

use crate::span::Span;
use serde::Serialize;
use thiserror::Error;

/// What went wrong, with the payload diagnostics need.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompileErrorKind {
    /// A name reference with no declaring scope and no primitive entry.
    #[error("undefined name '{name}'")]
    UndefinedName { name: String },
    /// One scope declares the same name with incompatible kinds
    /// (e.g. a parameter also marked `global`).
    #[error("conflicting declarations of '{name}' in one scope")]
    ConflictingDeclaration { name: String },
    /// A statement form outside the supported subset.
    #[error("unsupported construct: {construct}")]
    UnsupportedConstruct { construct: &'static str },
    /// An operator the code generator has no lowering for.
    #[error("unsupported operator '{op}'")]
    UnsupportedOperator { op: String },
    /// A literal outside the value model (complex numbers).
    #[error("unsupported literal: {literal}")]
    UnsupportedLiteral { literal: &'static str },
    /// Primitives are callable only; they have no closure value.
    #[error("primitive '{name}' may only be called")]
    PrimitiveReference { name: String },
    /// More locals than a `u8` slot operand can address.
    #[error("too many locals in one scope ({count})")]
    TooManyLocals { count: usize },
    /// Deeper lexical nesting than a `u8` level operand can express.
    #[error("lexical nesting too deep ({depth})")]
    NestingTooDeep { depth: usize },
    /// More call arguments than a `u8` operand can express.
    #[error("too many call arguments ({count})")]
    TooManyArguments { count: usize },
    /// A code-generator invariant failed; always a bug, never user error.
    #[error("internal compiler error: {detail}")]
    Internal { detail: String },
}

impl CompileErrorKind {
    /// Stable diagnostic code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            CompileErrorKind::UndefinedName { .. } => "SV0001",
            CompileErrorKind::ConflictingDeclaration { .. } => "SV0002",
            CompileErrorKind::UnsupportedConstruct { .. } => "SV0003",
            CompileErrorKind::UnsupportedOperator { .. } => "SV0004",
            CompileErrorKind::UnsupportedLiteral { .. } => "SV0005",
            CompileErrorKind::PrimitiveReference { .. } => "SV0006",
            CompileErrorKind::TooManyLocals { .. } => "SV0007",
            CompileErrorKind::NestingTooDeep { .. } => "SV0008",
            CompileErrorKind::TooManyArguments { .. } => "SV0009",
            CompileErrorKind::Internal { .. } => "SV0999",
        }
    }
}

/// A fatal compile-time error with its source position.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{kind}")]
pub struct CompileError {
    #[serde(flatten)]
    pub kind: CompileErrorKind,
    pub span: Span,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Stable diagnostic code (`SVxxxx`).
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Human-readable one-line rendering:
    /// `error[SV0001]: undefined name 'x'\n  --> 12..13`
    pub fn to_human_string(&self) -> String {
        format!(
            "error[{}]: {}\n  --> {}\n",
            self.code(),
            self.kind,
            self.span
        )
    }

    /// Compact JSON rendering for tooling.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Convenience constructors used throughout resolver and compiler.
pub(crate) fn undefined_name(name: &str, span: Span) -> CompileError {
    CompileError::new(
        CompileErrorKind::UndefinedName {
            name: name.to_string(),
        },
        span,
    )
}

pub(crate) fn unsupported(construct: &'static str, span: Span) -> CompileError {
    CompileError::new(CompileErrorKind::UnsupportedConstruct { construct }, span)
}

pub(crate) fn internal(detail: impl Into<String>, span: Span) -> CompileError {
    CompileError::new(
        CompileErrorKind::Internal {
            detail: detail.into(),
        },
        span,
    )
}
