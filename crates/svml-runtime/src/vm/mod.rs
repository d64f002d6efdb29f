//! Bytecode interpreter
//!
//! Fetch-execute loop over per-frame operand stacks and the
//! environment arena. The current frame is the only mutable one;
//! inter-frame effects happen at `CALL*`/`RET*` only. Tail calls
//! (`CALLT`/`CALLTP`) reuse the current frame, keeping call depth
//! O(1) for properly-tail-recursive programs. Memoized closures are
//! consulted before any frame is created and settled on return.
//!
//! Execution is single-threaded and synchronous; the only exits are
//! returning from the entry frame, a configured limit, or a fatal
//! runtime error.

pub mod env;
mod frame;
pub mod memo;

pub use frame::CallFrame;

use crate::bytecode::{Instr, SVMProgram};
use crate::config::RunLimits;
use crate::instrument::Instrumentation;
use crate::stdlib;
use crate::value::{Closure, RuntimeError, Value};
use env::EnvArena;
use memo::MemoKey;
use std::cell::RefCell;
use std::rc::Rc;

/// Result of a completed run: the entry function's return value plus
/// everything `print` wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub value: Value,
    pub stdout: String,
}

/// Run a program to completion.
pub fn run(
    program: &SVMProgram,
    limits: &RunLimits,
    instrumentation: Option<&Instrumentation>,
) -> Result<Execution, RuntimeError> {
    Machine::new(program, limits.clone(), instrumentation)?.run()
}

/// One interpretation in progress. Owns the frame stack, environment
/// arena and stdout buffer; shares the read-only program.
pub struct Machine<'a> {
    program: &'a SVMProgram,
    limits: RunLimits,
    instrumentation: Option<&'a Instrumentation>,
    frames: Vec<CallFrame>,
    envs: EnvArena,
    /// String pool pre-wrapped for cheap `LGCS` pushes
    strings: Vec<Rc<String>>,
    stdout: String,
    executed: u64,
}

impl<'a> Machine<'a> {
    pub fn new(
        program: &'a SVMProgram,
        limits: RunLimits,
        instrumentation: Option<&'a Instrumentation>,
    ) -> Result<Self, RuntimeError> {
        let entry_fn = program
            .functions
            .get(program.entry)
            .ok_or(RuntimeError::InvalidFunctionIndex {
                index: program.entry,
            })?;

        let mut envs = EnvArena::new();
        // The global root: empty, parent of the entry activation.
        let global = envs.alloc(0, None);
        let entry_env = envs.alloc(entry_fn.env_size, Some(global));
        let entry_closure = Rc::new(Closure {
            function: program.entry,
            env: global,
            memo: None,
        });

        Ok(Self {
            program,
            limits,
            instrumentation,
            frames: vec![CallFrame::new(entry_closure, entry_env)],
            envs,
            strings: program.strings.iter().map(|s| Rc::new(s.clone())).collect(),
            stdout: String::new(),
            executed: 0,
        })
    }

    /// Drive the fetch-execute loop until the entry frame returns.
    pub fn run(mut self) -> Result<Execution, RuntimeError> {
        loop {
            let program = self.program;
            let frame = self.frames.last().expect("entry frame present");
            let func = &program.functions[frame.closure.function];
            let Some(&instr) = func.code.get(frame.pc) else {
                return Err(RuntimeError::PcOutOfRange);
            };

            self.executed += 1;
            if self.executed > self.limits.max_instructions {
                return Err(RuntimeError::InstructionLimitExceeded {
                    cap: self.limits.max_instructions,
                });
            }
            self.frames.last_mut().expect("entry frame present").pc += 1;

            if let Some(value) = self.step(instr)? {
                return Ok(Execution {
                    value,
                    stdout: self.stdout,
                });
            }
        }
    }

    /// Execute one instruction; `Some` is the program's final value.
    fn step(&mut self, instr: Instr) -> Result<Option<Value>, RuntimeError> {
        match instr {
            Instr::Lgci(v) => self.push(Value::Int(v))?,
            Instr::Lgcf64(v) => self.push(Value::Float(v))?,
            Instr::Lgcb0 => self.push(Value::Bool(false))?,
            Instr::Lgcb1 => self.push(Value::Bool(true))?,
            Instr::Lgcu => self.push(Value::Undefined)?,
            Instr::Lgcn => self.push(Value::Null)?,
            Instr::Lgcs(index) => {
                let text = self.strings.get(index as usize).cloned().ok_or(
                    RuntimeError::InvalidStringIndex {
                        index: index as usize,
                    },
                )?;
                self.push(Value::String(text))?;
            }

            Instr::Ldlg(slot) | Instr::Ldlf(slot) => {
                let env = self.frame().env;
                let value = self.envs.get(env, usize::from(slot))?;
                self.push(value)?;
            }
            Instr::Stlg(slot) | Instr::Stlf(slot) => {
                let value = self.pop()?;
                let env = self.frame().env;
                self.envs.set(env, usize::from(slot), value)?;
            }
            Instr::Ldpg(slot, level) => {
                let owner = self.envs.ancestor(self.frame().env, usize::from(level))?;
                let value = self.envs.get(owner, usize::from(slot))?;
                self.push(value)?;
            }
            Instr::Stpg(slot, level) => {
                let value = self.pop()?;
                let owner = self.envs.ancestor(self.frame().env, usize::from(level))?;
                self.envs.set(owner, usize::from(slot), value)?;
            }

            Instr::Addg => self.binary(add)?,
            Instr::Subg => self.binary(sub)?,
            Instr::Mulg => self.binary(mul)?,
            Instr::Divg => self.binary(div)?,
            Instr::Modg => self.binary(modulo)?,
            Instr::Ltg => self.comparison("<", |x, y| x < y, |s, t| s < t)?,
            Instr::Gtg => self.comparison(">", |x, y| x > y, |s, t| s > t)?,
            Instr::Leg => self.comparison("<=", |x, y| x <= y, |s, t| s <= t)?,
            Instr::Geg => self.comparison(">=", |x, y| x >= y, |s, t| s >= t)?,
            Instr::Eqg => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(values_equal(&a, &b)))?;
            }
            Instr::Neqg => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(!values_equal(&a, &b)))?;
            }
            Instr::Notg => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()))?;
            }
            Instr::Negg => {
                let value = self.pop()?;
                let negated = match value {
                    Value::Int(n) => n
                        .checked_neg()
                        .map(Value::Int)
                        .unwrap_or_else(|| Value::Float(-f64::from(n))),
                    Value::Float(f) => Value::Float(-f),
                    other => {
                        return Err(RuntimeError::UnsupportedUnaryType {
                            op: "-",
                            operand: other.type_name(),
                        })
                    }
                };
                self.push(negated)?;
            }

            Instr::Popg => {
                self.pop()?;
            }
            Instr::Dup => {
                let top = self
                    .frame()
                    .stack
                    .last()
                    .cloned()
                    .ok_or(RuntimeError::OperandStackUnderflow)?;
                self.push(top)?;
            }

            Instr::Br(offset) => self.branch(offset)?,
            Instr::Brt(offset) => {
                let cond = self.pop()?;
                if cond.is_truthy() {
                    self.branch(offset)?;
                }
            }
            Instr::Brf(offset) => {
                let cond = self.pop()?;
                if !cond.is_truthy() {
                    self.branch(offset)?;
                }
            }

            Instr::Newc(index) => {
                let function = index as usize;
                if function >= self.program.functions.len() {
                    return Err(RuntimeError::InvalidFunctionIndex { index: function });
                }
                let memoized = self
                    .instrumentation
                    .is_some_and(|info| info.needs_memoization(function));
                let closure = Closure {
                    function,
                    env: self.frame().env,
                    memo: memoized.then(|| RefCell::new(memo::MemoCache::new())),
                };
                self.push(Value::Closure(Rc::new(closure)))?;
            }

            Instr::Call(n) => return self.call_closure(usize::from(n), false),
            Instr::Callt(n) => return self.call_closure(usize::from(n), true),
            Instr::Callp(prim, n) => {
                let args = self.pop_args(usize::from(n))?;
                let result = stdlib::call(prim, &args, &mut self.stdout)?;
                self.push(result)?;
            }
            Instr::Calltp(prim, n) => {
                let args = self.pop_args(usize::from(n))?;
                let result = stdlib::call(prim, &args, &mut self.stdout)?;
                return self.ret(result);
            }

            Instr::Retg => {
                let value = self.pop()?;
                return self.ret(value);
            }
            Instr::Retu => return self.ret(Value::Undefined),
            Instr::Retn => return self.ret(Value::Null),

            Instr::Newa => {
                let size = self.pop()?;
                let Value::Int(n) = size else {
                    return Err(RuntimeError::ArraySize {
                        actual: size.to_display_string(),
                    });
                };
                let n = usize::try_from(n).map_err(|_| RuntimeError::ArraySize {
                    actual: n.to_string(),
                })?;
                self.push(Value::array(vec![Value::Undefined; n]))?;
            }
            Instr::Ldag => {
                let index = self.pop()?;
                let array = self.pop()?;
                let value = {
                    let (items, i) = index_array(&array, &index)?;
                    let items = items.borrow();
                    items
                        .get(i)
                        .cloned()
                        .ok_or(RuntimeError::ArrayIndexOutOfBounds {
                            index: i as i64,
                            len: items.len(),
                        })?
                };
                self.push(value)?;
            }
            Instr::Stag => {
                let value = self.pop()?;
                let index = self.pop()?;
                let array = self.pop()?;
                let (items, i) = index_array(&array, &index)?;
                let mut items = items.borrow_mut();
                let len = items.len();
                match items.get_mut(i) {
                    Some(cell) => *cell = value,
                    None => {
                        return Err(RuntimeError::ArrayIndexOutOfBounds {
                            index: i as i64,
                            len,
                        })
                    }
                }
            }
        }
        Ok(None)
    }

    // ── Calls and returns ────────────────────────────────────────────

    /// `CALL`/`CALLT`: pop arguments and callee, consult the memo
    /// cache, then either push a frame or (tail) reuse the current
    /// one. `Some` is the program's final value, reachable when a
    /// memoized tail call returns straight out of the entry frame.
    fn call_closure(&mut self, n: usize, tail: bool) -> Result<Option<Value>, RuntimeError> {
        let args = self.pop_args(n)?;
        let callee = self.pop()?;
        let Value::Closure(closure) = callee else {
            return Err(RuntimeError::CallOnNonClosure {
                actual: callee.type_name(),
            });
        };
        let func = self.program.functions.get(closure.function).ok_or(
            RuntimeError::InvalidFunctionIndex {
                index: closure.function,
            },
        )?;
        if args.len() != func.num_args {
            return Err(RuntimeError::WrongArity {
                expected: func.num_args,
                got: args.len(),
            });
        }

        let mut pending = None;
        if let Some(cache) = &closure.memo {
            let key = MemoKey::of(&args);
            let hit = cache.borrow().get(&key).cloned();
            if let Some(value) = hit {
                if tail {
                    return self.ret(value);
                }
                self.push(value)?;
                return Ok(None);
            }
            pending = Some(key);
        }

        let callee_env = self.envs.alloc(func.env_size, Some(closure.env));
        for (slot, arg) in args.into_iter().enumerate() {
            self.envs.set(callee_env, slot, arg)?;
        }

        if tail {
            // Frame reuse: the pending memo keys of the elided
            // activation stay on the frame and settle together.
            let frame = self.frames.last_mut().expect("entry frame present");
            frame.closure = Rc::clone(&closure);
            frame.pc = 0;
            frame.env = callee_env;
            frame.stack.clear();
            if let Some(key) = pending {
                frame.pending.push((closure, key));
            }
        } else {
            if self.frames.len() >= self.limits.max_call_depth {
                return Err(RuntimeError::CallDepthExceeded {
                    cap: self.limits.max_call_depth,
                });
            }
            let mut frame = CallFrame::new(Rc::clone(&closure), callee_env);
            if let Some(key) = pending {
                frame.pending.push((closure, key));
            }
            self.frames.push(frame);
        }
        Ok(None)
    }

    /// Leave the current frame with `value`: settle its pending memo
    /// keys, then push the value onto the caller's operand stack —
    /// or finish the program when this was the entry frame.
    fn ret(&mut self, value: Value) -> Result<Option<Value>, RuntimeError> {
        let frame = self.frames.pop().expect("entry frame present");
        for (closure, key) in frame.pending {
            if let Some(cache) = &closure.memo {
                cache.borrow_mut().insert(key, value.clone());
            }
        }
        if self.frames.is_empty() {
            return Ok(Some(value));
        }
        self.push(value)?;
        Ok(None)
    }

    // ── Stack and flow helpers ───────────────────────────────────────

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("entry frame present")
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        let cap = self.limits.max_operand_stack;
        let frame = self.frames.last_mut().expect("entry frame present");
        if frame.stack.len() >= cap {
            return Err(RuntimeError::StackOverflow { cap });
        }
        frame.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.frames
            .last_mut()
            .expect("entry frame present")
            .stack
            .pop()
            .ok_or(RuntimeError::OperandStackUnderflow)
    }

    /// Pop `n` call arguments; argument `n-1` was on top.
    fn pop_args(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let frame = self.frames.last_mut().expect("entry frame present");
        if frame.stack.len() < n {
            return Err(RuntimeError::OperandStackUnderflow);
        }
        let split = frame.stack.len() - n;
        Ok(frame.stack.split_off(split))
    }

    /// Apply a relative branch: the pc already points at the
    /// instruction following the branch, so offset 0 falls through.
    fn branch(&mut self, offset: i32) -> Result<(), RuntimeError> {
        let frame = self.frames.last_mut().expect("entry frame present");
        let target = frame.pc as i64 + i64::from(offset);
        frame.pc = usize::try_from(target).map_err(|_| RuntimeError::PcOutOfRange)?;
        Ok(())
    }

    fn binary(
        &mut self,
        op: fn(Value, Value) -> Result<Value, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = op(a, b)?;
        self.push(result)
    }

    fn comparison(
        &mut self,
        symbol: &'static str,
        num: fn(f64, f64) -> bool,
        text: fn(&str, &str) -> bool,
    ) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::String(x), Value::String(y)) => text(x, y),
            _ => match (numeric(&a), numeric(&b)) {
                (Some(x), Some(y)) => num(x, y),
                _ => {
                    return Err(RuntimeError::UnsupportedOperandType {
                        op: symbol,
                        left: a.type_name(),
                        right: b.type_name(),
                    })
                }
            },
        };
        self.push(Value::Bool(result))
    }
}

// ============================================================================
// Value operations
// ============================================================================

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(f64::from(*n)),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// `EQG` equality: numeric across int/float, content for strings,
/// identity for closures and arrays, `false` across mismatched tags.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
            f64::from(*x) == *y
        }
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
        (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

fn type_error(op: &'static str, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::UnsupportedOperandType {
        op,
        left: a.type_name(),
        right: b.type_name(),
    }
}

fn add(a: Value, b: Value) -> Result<Value, RuntimeError> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Ok(x
            .checked_add(*y)
            .map(Value::Int)
            .unwrap_or_else(|| Value::Float(f64::from(*x) + f64::from(*y)))),
        (Value::String(x), Value::String(y)) => Ok(Value::string(format!("{x}{y}"))),
        _ => match (numeric(&a), numeric(&b)) {
            (Some(x), Some(y)) => Ok(Value::Float(x + y)),
            _ => Err(type_error("+", &a, &b)),
        },
    }
}

fn sub(a: Value, b: Value) -> Result<Value, RuntimeError> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Ok(x
            .checked_sub(*y)
            .map(Value::Int)
            .unwrap_or_else(|| Value::Float(f64::from(*x) - f64::from(*y)))),
        _ => match (numeric(&a), numeric(&b)) {
            (Some(x), Some(y)) => Ok(Value::Float(x - y)),
            _ => Err(type_error("-", &a, &b)),
        },
    }
}

fn mul(a: Value, b: Value) -> Result<Value, RuntimeError> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Ok(x
            .checked_mul(*y)
            .map(Value::Int)
            .unwrap_or_else(|| Value::Float(f64::from(*x) * f64::from(*y)))),
        _ => match (numeric(&a), numeric(&b)) {
            (Some(x), Some(y)) => Ok(Value::Float(x * y)),
            _ => Err(type_error("*", &a, &b)),
        },
    }
}

/// True division: int operands produce a float, like the source
/// language's `/`.
fn div(a: Value, b: Value) -> Result<Value, RuntimeError> {
    match (numeric(&a), numeric(&b)) {
        (Some(x), Some(y)) => {
            if y == 0.0 {
                Err(RuntimeError::DivisionByZero)
            } else {
                Ok(Value::Float(x / y))
            }
        }
        _ => Err(type_error("/", &a, &b)),
    }
}

/// Source-language modulo: the result takes the divisor's sign.
fn modulo(a: Value, b: Value) -> Result<Value, RuntimeError> {
    match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => {
            if *y == 0 {
                return Err(RuntimeError::ModuloByZero);
            }
            let r = (i64::from(*x) % i64::from(*y) + i64::from(*y)) % i64::from(*y);
            Ok(Value::Int(r as i32))
        }
        _ => match (numeric(&a), numeric(&b)) {
            (Some(x), Some(y)) => {
                if y == 0.0 {
                    return Err(RuntimeError::ModuloByZero);
                }
                Ok(Value::Float(x - y * (x / y).floor()))
            }
            _ => Err(type_error("%", &a, &b)),
        },
    }
}

fn index_array<'v>(
    array: &'v Value,
    index: &Value,
) -> Result<(&'v Rc<RefCell<Vec<Value>>>, usize), RuntimeError> {
    let Value::Array(items) = array else {
        return Err(RuntimeError::NotAnArray {
            actual: array.type_name(),
        });
    };
    let Value::Int(i) = index else {
        return Err(RuntimeError::ArrayIndexType {
            actual: index.type_name(),
        });
    };
    let i = usize::try_from(*i).map_err(|_| RuntimeError::ArrayIndexOutOfBounds {
        index: i64::from(*i),
        len: items.borrow().len(),
    })?;
    Ok((items, i))
}
