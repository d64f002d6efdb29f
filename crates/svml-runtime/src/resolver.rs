//! Name resolution
//!
//! Walks the AST once per function scope in two passes: *declare*
//! collects parameters and assignment targets into slot-numbered
//! bindings, *resolve* attaches an environment-slot coordinate to
//! every name occurrence. Coordinates live in side tables keyed by
//! token identity; the AST itself is never mutated.
//!
//! A name whose innermost owner turns out to be the global root
//! resolves against the primitive table or fails as undefined.

use crate::ast::{Expr, FunctionDef, Lambda, Program, ScopeId, Stmt};
use crate::diagnostic::{undefined_name, CompileError, CompileErrorKind};
use crate::stdlib;
use crate::token::{Token, TokenId};
use std::collections::HashMap;

/// How a name is bound inside its owning scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    /// Function parameter; slots `0..num_args`
    Param,
    /// Assignment target or nested `def` name
    Local,
    /// Marked `global`/`nonlocal`: known here, owned outward
    Escaped,
}

/// One name bound in a scope.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub kind: DeclKind,
    /// Slot in the owning frame; `None` for escaped names
    pub slot: Option<u16>,
}

/// A node in the lexical-scope tree.
#[derive(Debug, Clone)]
pub struct Scope {
    /// The function node that owns this scope
    pub owner: ScopeId,
    /// Arena index of the enclosing scope; `None` for the entry scope
    pub parent: Option<usize>,
    /// Bindings in declaration order
    pub bindings: Vec<Binding>,
    /// Number of frame slots (params + locals, excluding escaped names)
    pub slot_count: u16,
    /// Number of parameters
    pub num_params: u16,
}

impl Scope {
    fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.name == name)
    }
}

/// Whether a resolved name is a user binding or a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Primitive,
    User,
}

/// A resolved coordinate: for primitives, `index` is the primitive
/// table index and `env_level` is unused; for user names, `index` is
/// the slot in the owning frame and `env_level` the number of parent
/// hops from the referencing scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    pub kind: NameKind,
    pub index: u16,
    pub env_level: u16,
}

/// The resolver's complete output.
#[derive(Debug)]
pub struct Resolution {
    scopes: Vec<Scope>,
    env_map: HashMap<ScopeId, usize>,
    coords: HashMap<TokenId, Coord>,
}

impl Resolution {
    /// Coordinate attached to a name occurrence, if it resolved.
    pub fn coord(&self, token: &Token) -> Option<Coord> {
        self.coords.get(&token.id).copied()
    }

    /// Arena index of a function's scope.
    pub fn scope_index(&self, scope: ScopeId) -> Option<usize> {
        self.env_map.get(&scope).copied()
    }

    /// The scope node for a function.
    pub fn scope(&self, scope: ScopeId) -> Option<&Scope> {
        self.scope_index(scope).map(|idx| &self.scopes[idx])
    }

    /// Frame slot count for a function (its `env_size`).
    pub fn slot_count(&self, scope: ScopeId) -> usize {
        self.scope(scope).map_or(0, |s| usize::from(s.slot_count))
    }

    /// All scopes, for diagnostics and tests.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }
}

/// Resolve every name in `program`. Pure and idempotent: calling it
/// twice yields identical coordinates.
pub fn resolve(program: &Program) -> Result<Resolution, CompileError> {
    let mut resolver = Resolver {
        scopes: Vec::new(),
        env_map: HashMap::new(),
        coords: HashMap::new(),
    };
    let entry = resolver.declare_scope(program.scope, &[], &program.body, None)?;
    resolver.resolve_block(&program.body, entry)?;
    Ok(Resolution {
        scopes: resolver.scopes,
        env_map: resolver.env_map,
        coords: resolver.coords,
    })
}

struct Resolver {
    scopes: Vec<Scope>,
    env_map: HashMap<ScopeId, usize>,
    coords: HashMap<TokenId, Coord>,
}

impl Resolver {
    // ── Declare pass ─────────────────────────────────────────────────

    /// Create the scope for one function and collect its declarations.
    /// Nested `def`/`lambda` bodies are not descended into; their
    /// names are declarations *here*.
    fn declare_scope(
        &mut self,
        owner: ScopeId,
        params: &[Token],
        body: &[Stmt],
        parent: Option<usize>,
    ) -> Result<usize, CompileError> {
        let index = self.scopes.len();
        self.scopes.push(Scope {
            owner,
            parent,
            bindings: Vec::new(),
            slot_count: 0,
            num_params: 0,
        });
        self.env_map.insert(owner, index);

        for param in params {
            self.declare(index, param, DeclKind::Param)?;
        }
        self.scopes[index].num_params = self.scopes[index].slot_count;
        self.declare_block(index, body)?;
        Ok(index)
    }

    fn declare_block(&mut self, scope: usize, body: &[Stmt]) -> Result<(), CompileError> {
        for stmt in body {
            self.declare_stmt(scope, stmt)?;
        }
        Ok(())
    }

    fn declare_stmt(&mut self, scope: usize, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Assign { target, .. } => self.declare(scope, target, DeclKind::Local),
            Stmt::FunctionDef(def) => self.declare(scope, &def.name, DeclKind::Local),
            Stmt::While { body, .. } => self.declare_block(scope, body),
            Stmt::If { body, orelse, .. } => {
                self.declare_block(scope, body)?;
                self.declare_block(scope, orelse)
            }
            Stmt::Global { names, .. } | Stmt::Nonlocal { names, .. } => {
                for name in names {
                    self.declare(scope, name, DeclKind::Escaped)?;
                }
                Ok(())
            }
            // Rejected constructs still declare their targets so the
            // compiler reports the construct, not a phantom undefined
            // name inside it.
            Stmt::For { target, body, .. } => {
                self.declare(scope, target, DeclKind::Local)?;
                self.declare_block(scope, body)
            }
            Stmt::Import { module, .. } => self.declare(scope, module, DeclKind::Local),
            Stmt::AnnAssign { target, .. } => self.declare(scope, target, DeclKind::Local),
            Stmt::Expr { .. }
            | Stmt::Return { .. }
            | Stmt::Pass { .. }
            | Stmt::Break { .. }
            | Stmt::Continue { .. }
            | Stmt::Assert { .. } => Ok(()),
        }
    }

    /// Declare one name. The first textual occurrence wins the slot;
    /// later same-kind declarations reuse it. A `global`/`nonlocal`
    /// mark that collides with a slotted binding (or vice versa) is a
    /// conflicting declaration.
    fn declare(
        &mut self,
        scope: usize,
        token: &Token,
        kind: DeclKind,
    ) -> Result<(), CompileError> {
        if let Some(existing) = self.scopes[scope].binding(&token.lexeme) {
            let conflict = match (existing.kind, kind) {
                (DeclKind::Escaped, DeclKind::Escaped) => false,
                // Assignment to an escaped name stores outward.
                (DeclKind::Escaped, DeclKind::Local) => false,
                (DeclKind::Escaped, DeclKind::Param) => true,
                (_, DeclKind::Escaped) => true,
                _ => false,
            };
            if conflict {
                return Err(CompileError::new(
                    CompileErrorKind::ConflictingDeclaration {
                        name: token.lexeme.clone(),
                    },
                    token.span,
                ));
            }
            return Ok(());
        }

        let slot = match kind {
            DeclKind::Escaped => None,
            DeclKind::Param | DeclKind::Local => {
                let slot = self.scopes[scope].slot_count;
                self.scopes[scope].slot_count += 1;
                Some(slot)
            }
        };
        self.scopes[scope].bindings.push(Binding {
            name: token.lexeme.clone(),
            kind,
            slot,
        });
        Ok(())
    }

    // ── Resolve pass ─────────────────────────────────────────────────

    fn resolve_block(&mut self, body: &[Stmt], scope: usize) -> Result<(), CompileError> {
        for stmt in body {
            self.resolve_stmt(stmt, scope)?;
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &Stmt, scope: usize) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr { value } => self.resolve_expr(value, scope),
            Stmt::Assign { target, value } => {
                self.resolve_expr(value, scope)?;
                self.resolve_name(target, scope)
            }
            Stmt::FunctionDef(def) => self.resolve_function(def, scope),
            Stmt::Return { value, .. } => match value {
                Some(expr) => self.resolve_expr(expr, scope),
                None => Ok(()),
            },
            Stmt::While { test, body, .. } => {
                self.resolve_expr(test, scope)?;
                self.resolve_block(body, scope)
            }
            Stmt::If {
                test, body, orelse, ..
            } => {
                self.resolve_expr(test, scope)?;
                self.resolve_block(body, scope)?;
                self.resolve_block(orelse, scope)
            }
            Stmt::For {
                target, iter, body, ..
            } => {
                self.resolve_expr(iter, scope)?;
                self.resolve_name(target, scope)?;
                self.resolve_block(body, scope)
            }
            Stmt::Assert { test, .. } => self.resolve_expr(test, scope),
            Stmt::AnnAssign { target, .. } => self.resolve_name(target, scope),
            Stmt::Pass { .. }
            | Stmt::Global { .. }
            | Stmt::Nonlocal { .. }
            | Stmt::Break { .. }
            | Stmt::Continue { .. }
            | Stmt::Import { .. } => Ok(()),
        }
    }

    fn resolve_function(&mut self, def: &FunctionDef, scope: usize) -> Result<(), CompileError> {
        // The def's name lives in the enclosing scope (or outward when
        // escaped); resolve it like any other store target.
        self.resolve_name(&def.name, scope)?;
        let child = self.declare_scope(def.scope, &def.params, &def.body, Some(scope))?;
        for param in &def.params {
            self.resolve_name(param, child)?;
        }
        self.resolve_block(&def.body, child)
    }

    fn resolve_lambda(&mut self, lambda: &Lambda, scope: usize) -> Result<(), CompileError> {
        let child = self.declare_scope(lambda.scope, &lambda.params, &[], Some(scope))?;
        for param in &lambda.params {
            self.resolve_name(param, child)?;
        }
        self.resolve_expr(&lambda.body, child)
    }

    fn resolve_expr(&mut self, expr: &Expr, scope: usize) -> Result<(), CompileError> {
        match expr {
            Expr::Int { .. }
            | Expr::Float { .. }
            | Expr::Complex { .. }
            | Expr::Bool { .. }
            | Expr::Str { .. }
            | Expr::None { .. } => Ok(()),
            Expr::Name { token } => self.resolve_name(token, scope),
            Expr::Unary { operand, .. } => self.resolve_expr(operand, scope),
            Expr::Binary { left, right, .. } | Expr::Logic { left, right, .. } => {
                self.resolve_expr(left, scope)?;
                self.resolve_expr(right, scope)
            }
            Expr::Ternary {
                test, then, orelse, ..
            } => {
                self.resolve_expr(test, scope)?;
                self.resolve_expr(then, scope)?;
                self.resolve_expr(orelse, scope)
            }
            Expr::Call { func, args, .. } => {
                self.resolve_expr(func, scope)?;
                for arg in args {
                    self.resolve_expr(arg, scope)?;
                }
                Ok(())
            }
            Expr::Lambda(lambda) => self.resolve_lambda(lambda, scope),
        }
    }

    /// Search innermost-outward for the scope owning `token`, and
    /// attach the coordinate. Escaped bindings are transparent.
    fn resolve_name(&mut self, token: &Token, scope: usize) -> Result<(), CompileError> {
        let mut level: u16 = 0;
        let mut current = Some(scope);
        while let Some(idx) = current {
            if let Some(binding) = self.scopes[idx].binding(&token.lexeme) {
                if let Some(slot) = binding.slot {
                    self.coords.insert(
                        token.id,
                        Coord {
                            kind: NameKind::User,
                            index: slot,
                            env_level: level,
                        },
                    );
                    return Ok(());
                }
                // Escaped: owned further out.
            }
            current = self.scopes[idx].parent;
            level += 1;
        }

        if let Some(prim) = stdlib::lookup_name(&token.lexeme) {
            self.coords.insert(
                token.id,
                Coord {
                    kind: NameKind::Primitive,
                    index: u16::from(prim.index),
                    env_level: 0,
                },
            );
            return Ok(());
        }
        Err(undefined_name(&token.lexeme, token.span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn tok(name: &str) -> Token {
        Token::new(name, Span::dummy())
    }

    fn name(token: Token) -> Expr {
        Expr::Name { token }
    }

    fn int(value: i64) -> Expr {
        Expr::Int {
            value,
            span: Span::dummy(),
        }
    }

    #[test]
    fn same_name_same_slot() {
        let first = tok("x");
        let second = tok("x");
        let use_x = tok("x");
        let program = Program::new(vec![
            Stmt::Assign {
                target: first.clone(),
                value: int(1),
            },
            Stmt::Assign {
                target: second.clone(),
                value: int(2),
            },
            Stmt::Expr {
                value: name(use_x.clone()),
            },
        ]);
        let res = resolve(&program).unwrap();
        let a = res.coord(&first).unwrap();
        let b = res.coord(&second).unwrap();
        let c = res.coord(&use_x).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.env_level, 0);
        assert_eq!(res.slot_count(program.scope), 1);
    }

    #[test]
    fn undefined_name_is_an_error() {
        let program = Program::new(vec![Stmt::Expr {
            value: name(tok("nowhere")),
        }]);
        let err = resolve(&program).unwrap_err();
        assert_eq!(err.code(), "SV0001");
    }

    #[test]
    fn parameter_shadows_outer_binding() {
        // x = 1; def f(x): return x  — the inner x is slot 0, level 0
        let outer = tok("x");
        let param = tok("x");
        let inner_use = tok("x");
        let def = FunctionDef {
            scope: ScopeId::fresh(),
            name: tok("f"),
            params: vec![param.clone()],
            body: vec![Stmt::Return {
                value: Some(name(inner_use.clone())),
                span: Span::dummy(),
            }],
            span: Span::dummy(),
        };
        let program = Program::new(vec![
            Stmt::Assign {
                target: outer,
                value: int(1),
            },
            Stmt::FunctionDef(def),
        ]);
        let res = resolve(&program).unwrap();
        let coord = res.coord(&inner_use).unwrap();
        assert_eq!(coord.kind, NameKind::User);
        assert_eq!(coord.index, 0);
        assert_eq!(coord.env_level, 0);
    }

    #[test]
    fn free_variable_counts_parent_hops() {
        // x = 1; def f(): return x  — x owned one level out
        let outer = tok("x");
        let inner_use = tok("x");
        let def = FunctionDef {
            scope: ScopeId::fresh(),
            name: tok("f"),
            params: vec![],
            body: vec![Stmt::Return {
                value: Some(name(inner_use.clone())),
                span: Span::dummy(),
            }],
            span: Span::dummy(),
        };
        let program = Program::new(vec![
            Stmt::Assign {
                target: outer.clone(),
                value: int(1),
            },
            Stmt::FunctionDef(def),
        ]);
        let res = resolve(&program).unwrap();
        let coord = res.coord(&inner_use).unwrap();
        assert_eq!(coord.env_level, 1);
        assert_eq!(coord.index, res.coord(&outer).unwrap().index);
    }

    #[test]
    fn global_statement_escapes_the_local_slot() {
        // x = 1; def f(): global x; x = 2
        let outer = tok("x");
        let escaped = tok("x");
        let store = tok("x");
        let def = FunctionDef {
            scope: ScopeId::fresh(),
            name: tok("f"),
            params: vec![],
            body: vec![
                Stmt::Global {
                    names: vec![escaped],
                    span: Span::dummy(),
                },
                Stmt::Assign {
                    target: store.clone(),
                    value: int(2),
                },
            ],
            span: Span::dummy(),
        };
        let program = Program::new(vec![
            Stmt::Assign {
                target: outer.clone(),
                value: int(1),
            },
            Stmt::FunctionDef(def),
        ]);
        let res = resolve(&program).unwrap();
        let coord = res.coord(&store).unwrap();
        assert_eq!(coord.env_level, 1);
        assert_eq!(coord.index, res.coord(&outer).unwrap().index);
        // The escaped name takes no slot in f's frame.
        assert_eq!(res.slot_count(program.scope), 2); // x and f
    }

    #[test]
    fn param_marked_global_conflicts() {
        let def = FunctionDef {
            scope: ScopeId::fresh(),
            name: tok("f"),
            params: vec![tok("x")],
            body: vec![Stmt::Global {
                names: vec![tok("x")],
                span: Span::dummy(),
            }],
            span: Span::dummy(),
        };
        let program = Program::new(vec![Stmt::FunctionDef(def)]);
        let err = resolve(&program).unwrap_err();
        assert_eq!(err.code(), "SV0002");
    }

    #[test]
    fn unshadowed_primitive_resolves_to_the_table() {
        let use_print = tok("print");
        let program = Program::new(vec![Stmt::Expr {
            value: Expr::Call {
                func: Box::new(name(use_print.clone())),
                args: vec![int(1)],
                span: Span::dummy(),
            },
        }]);
        let res = resolve(&program).unwrap();
        let coord = res.coord(&use_print).unwrap();
        assert_eq!(coord.kind, NameKind::Primitive);
        assert_eq!(coord.index, 5);
    }

    #[test]
    fn display_is_an_alias_for_print() {
        let use_display = tok("display");
        let program = Program::new(vec![Stmt::Expr {
            value: Expr::Call {
                func: Box::new(name(use_display.clone())),
                args: vec![int(1)],
                span: Span::dummy(),
            },
        }]);
        let res = resolve(&program).unwrap();
        assert_eq!(res.coord(&use_display).unwrap().index, 5);
    }

    #[test]
    fn resolution_is_idempotent() {
        let use_x = tok("x");
        let program = Program::new(vec![
            Stmt::Assign {
                target: tok("x"),
                value: int(1),
            },
            Stmt::Expr {
                value: name(use_x.clone()),
            },
        ]);
        let first = resolve(&program).unwrap().coord(&use_x).unwrap();
        let second = resolve(&program).unwrap().coord(&use_x).unwrap();
        assert_eq!(first, second);
    }
}
