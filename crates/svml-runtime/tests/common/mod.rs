//! Shared test helpers: a small AST-building vocabulary plus
//! compile-and-run shortcuts, so scenario tests read close to the
//! source programs they encode.
#![allow(dead_code)]

use svml_runtime::ast::{
    BinaryOp, Expr, FunctionDef, Lambda, LogicOp, Program, ScopeId, Stmt, UnaryOp,
};
use svml_runtime::config::{CompileOptions, RunLimits};
use svml_runtime::{compile_program, vm, CompileOutput, Execution, Span, Token, Value};

pub fn tok(name: &str) -> Token {
    Token::new(name, Span::dummy())
}

// ── Expressions ──────────────────────────────────────────────────────

pub fn int(value: i64) -> Expr {
    Expr::Int {
        value,
        span: Span::dummy(),
    }
}

pub fn float(value: f64) -> Expr {
    Expr::Float {
        value,
        span: Span::dummy(),
    }
}

pub fn boolean(value: bool) -> Expr {
    Expr::Bool {
        value,
        span: Span::dummy(),
    }
}

pub fn string(value: &str) -> Expr {
    Expr::Str {
        value: value.to_string(),
        span: Span::dummy(),
    }
}

pub fn none() -> Expr {
    Expr::None { span: Span::dummy() }
}

pub fn name(n: &str) -> Expr {
    Expr::Name { token: tok(n) }
}

pub fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::dummy(),
    }
}

pub fn logic(op: LogicOp, left: Expr, right: Expr) -> Expr {
    Expr::Logic {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span: Span::dummy(),
    }
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    Expr::Unary {
        op,
        operand: Box::new(operand),
        span: Span::dummy(),
    }
}

pub fn ternary(test: Expr, then: Expr, orelse: Expr) -> Expr {
    Expr::Ternary {
        test: Box::new(test),
        then: Box::new(then),
        orelse: Box::new(orelse),
        span: Span::dummy(),
    }
}

/// Call a named function or primitive.
pub fn call(func: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        func: Box::new(name(func)),
        args,
        span: Span::dummy(),
    }
}

pub fn call_expr(func: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
        func: Box::new(func),
        args,
        span: Span::dummy(),
    }
}

pub fn lambda(params: &[&str], body: Expr) -> Expr {
    Expr::Lambda(Lambda {
        scope: ScopeId::fresh(),
        params: params.iter().map(|p| tok(p)).collect(),
        body: Box::new(body),
        span: Span::dummy(),
    })
}

// ── Statements ───────────────────────────────────────────────────────

pub fn expr_stmt(value: Expr) -> Stmt {
    Stmt::Expr { value }
}

pub fn assign(target: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        target: tok(target),
        value,
    }
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return {
        value: Some(value),
        span: Span::dummy(),
    }
}

pub fn ret_none() -> Stmt {
    Stmt::Return {
        value: None,
        span: Span::dummy(),
    }
}

pub fn def(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
    Stmt::FunctionDef(FunctionDef {
        scope: ScopeId::fresh(),
        name: tok(name),
        params: params.iter().map(|p| tok(p)).collect(),
        body,
        span: Span::dummy(),
    })
}

pub fn while_(test: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While {
        test,
        body,
        span: Span::dummy(),
    }
}

pub fn if_else(test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt>) -> Stmt {
    Stmt::If {
        test,
        body,
        orelse,
        span: Span::dummy(),
    }
}

pub fn if_only(test: Expr, body: Vec<Stmt>) -> Stmt {
    if_else(test, body, vec![])
}

pub fn pass_() -> Stmt {
    Stmt::Pass { span: Span::dummy() }
}

pub fn nonlocal(names: &[&str]) -> Stmt {
    Stmt::Nonlocal {
        names: names.iter().map(|n| tok(n)).collect(),
        span: Span::dummy(),
    }
}

pub fn global(names: &[&str]) -> Stmt {
    Stmt::Global {
        names: names.iter().map(|n| tok(n)).collect(),
        span: Span::dummy(),
    }
}

pub fn program(body: Vec<Stmt>) -> Program {
    Program::new(body)
}

// ── Pipelines ────────────────────────────────────────────────────────

pub fn compile_ok(prog: &Program) -> CompileOutput {
    compile_program(prog, &CompileOptions::default()).expect("program compiles")
}

pub fn run_program(prog: &Program) -> Execution {
    let out = compile_ok(prog);
    vm::run(
        &out.program,
        &RunLimits::default(),
        Some(&out.instrumentation),
    )
    .expect("program runs")
}

pub fn run_stmts(body: Vec<Stmt>) -> Execution {
    run_program(&program(body))
}

pub fn eval(body: Vec<Stmt>) -> Value {
    run_stmts(body).value
}
