//! Abstract syntax of the source subset
//!
//! The tokenizer and parser live outside this repository; ASTs arrive
//! either from Rust embedders or serde-deserialised from JSON (the
//! front-end exchange format used by `svmc`/`svmi`).
//!
//! The subset covers literals, name reference and assignment, nested
//! function definitions, lambdas, calls, arithmetic, comparison,
//! boolean short-circuit, conditional expressions, `while`, `if`/`else`,
//! `return` and `pass`. Constructs outside the subset (`for`, `break`,
//! `continue`, `assert`, `import`, annotated assignment, complex
//! literals) are representable so the compiler can refuse them with a
//! source position instead of the front end silently dropping them.

use crate::span::Span;
use crate::token::Token;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_SCOPE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of a function scope (program root, `def`, or `lambda`).
///
/// Keys the environment-map. Like [`crate::token::TokenId`], identity
/// is per-process and re-minted on deserialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ScopeId(u32);

impl ScopeId {
    /// Mint a fresh, process-unique scope id.
    pub fn fresh() -> Self {
        ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A whole program: the entry function's body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Scope identity of the synthesised entry function.
    #[serde(skip, default = "ScopeId::fresh")]
    pub scope: ScopeId,
    /// Top-level statements
    pub body: Vec<Stmt>,
}

impl Program {
    /// Wrap a statement list as a program.
    pub fn new(body: Vec<Stmt>) -> Self {
        Self {
            scope: ScopeId::fresh(),
            body,
        }
    }
}

/// A named function definition (`def`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    #[serde(skip, default = "ScopeId::fresh")]
    pub scope: ScopeId,
    /// The function's name (declared in the enclosing scope)
    pub name: Token,
    /// Parameter name tokens, in order
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// An anonymous function (`lambda`): a single expression body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lambda {
    #[serde(skip, default = "ScopeId::fresh")]
    pub scope: ScopeId,
    pub params: Vec<Token>,
    pub body: Box<Expr>,
    pub span: Span,
}

/// Statements of the subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    /// Expression statement
    Expr { value: Expr },
    /// `target = value`
    Assign { target: Token, value: Expr },
    /// `def name(params): body`
    FunctionDef(FunctionDef),
    /// `return` / `return value`
    Return { value: Option<Expr>, span: Span },
    /// `while test: body`
    While {
        test: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `if test: body` with optional `else: orelse`
    If {
        test: Expr,
        body: Vec<Stmt>,
        #[serde(default)]
        orelse: Vec<Stmt>,
        span: Span,
    },
    /// `pass`
    Pass { span: Span },
    /// `global names…` — the names are looked up outward, never here
    Global { names: Vec<Token>, span: Span },
    /// `nonlocal names…` — same resolver treatment as `global`
    Nonlocal { names: Vec<Token>, span: Span },

    // Outside the subset; refused by the compiler with the span below.
    Break { span: Span },
    Continue { span: Span },
    For {
        target: Token,
        iter: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Assert { test: Expr, span: Span },
    Import { module: Token, span: Span },
    AnnAssign { target: Token, span: Span },
}

impl Stmt {
    /// Source position of the statement.
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr { value } => value.span(),
            Stmt::Assign { target, value } => target.span.merge(value.span()),
            Stmt::FunctionDef(def) => def.span,
            Stmt::Return { span, .. }
            | Stmt::While { span, .. }
            | Stmt::If { span, .. }
            | Stmt::Pass { span }
            | Stmt::Global { span, .. }
            | Stmt::Nonlocal { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::For { span, .. }
            | Stmt::Assert { span, .. }
            | Stmt::Import { span, .. }
            | Stmt::AnnAssign { span, .. } => *span,
        }
    }
}

/// Binary operators (arithmetic and comparison share lowering shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    /// Operator text, for diagnostics.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }
}

/// Short-circuit boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOp {
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Expressions of the subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Int { value: i64, span: Span },
    Float { value: f64, span: Span },
    /// Complex literal — representable, refused by the compiler.
    Complex { real: f64, imag: f64, span: Span },
    Bool { value: bool, span: Span },
    Str { value: String, span: Span },
    None { span: Span },
    /// Name reference; the token carries the occurrence identity.
    Name { token: Token },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    /// `left and right` / `left or right`
    Logic {
        op: LogicOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    /// `then if test else orelse`
    Ternary {
        test: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
        span: Span,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Lambda(Lambda),
}

impl Expr {
    /// Source position of the expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Int { span, .. }
            | Expr::Float { span, .. }
            | Expr::Complex { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Str { span, .. }
            | Expr::None { span }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logic { span, .. }
            | Expr::Ternary { span, .. }
            | Expr::Call { span, .. } => *span,
            Expr::Name { token } => token.span,
            Expr::Lambda(lambda) => lambda.span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_keeps_shape() {
        let prog = Program::new(vec![Stmt::Expr {
            value: Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Int {
                    value: 1,
                    span: Span::new(0, 1),
                }),
                right: Box::new(Expr::Int {
                    value: 2,
                    span: Span::new(4, 5),
                }),
                span: Span::new(0, 5),
            },
        }]);
        let json = serde_json::to_string(&prog).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back.body.len(), 1);
        match &back.body[0] {
            Stmt::Expr {
                value: Expr::Binary { op, .. },
            } => assert_eq!(*op, BinaryOp::Add),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn scope_ids_are_distinct_per_function() {
        let a = Program::new(vec![]);
        let b = Program::new(vec![]);
        assert_ne!(a.scope, b.scope);
    }

    #[test]
    fn orelse_defaults_to_empty() {
        let json = r#"{"body":[{"kind":"if",
            "test":{"kind":"bool","value":true,"span":{"start":0,"end":4}},
            "body":[{"kind":"pass","span":{"start":6,"end":10}}],
            "span":{"start":0,"end":10}}]}"#;
        let prog: Program = serde_json::from_str(json).unwrap();
        match &prog.body[0] {
            Stmt::If { orelse, .. } => assert!(orelse.is_empty()),
            other => panic!("unexpected statement: {other:?}"),
        }
    }
}
