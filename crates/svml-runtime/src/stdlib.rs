//! Primitive table
//!
//! The fixed index → name binding consulted by the resolver (names),
//! the compiler (`CALLP` indices) and the VM (dispatch). Primitives
//! never create frames; `print` writes into the interpreter-owned
//! stdout buffer.

use crate::value::{RuntimeError, Value};

/// Arity contract of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, got: usize) -> bool {
        match self {
            Arity::Exactly(n) => got == n,
            Arity::AtLeast(n) => got >= n,
        }
    }

    fn describe(self) -> String {
        match self {
            Arity::Exactly(n) => n.to_string(),
            Arity::AtLeast(n) => format!("at least {n}"),
        }
    }
}

/// One primitive-table entry.
#[derive(Debug, Clone, Copy)]
pub struct Primitive {
    pub index: u8,
    pub name: &'static str,
    pub arity: Arity,
}

/// The fixed binding table. `display` is an accepted alias of `print`
/// at the same index.
pub const PRIMITIVES: &[Primitive] = &[
    Primitive {
        index: 5,
        name: "print",
        arity: Arity::AtLeast(0),
    },
    Primitive {
        index: 10,
        name: "abs",
        arity: Arity::Exactly(1),
    },
    Primitive {
        index: 20,
        name: "min",
        arity: Arity::AtLeast(1),
    },
    Primitive {
        index: 21,
        name: "max",
        arity: Arity::AtLeast(1),
    },
    Primitive {
        index: 22,
        name: "pow",
        arity: Arity::Exactly(2),
    },
    Primitive {
        index: 23,
        name: "sqrt",
        arity: Arity::Exactly(1),
    },
    Primitive {
        index: 24,
        name: "floor",
        arity: Arity::Exactly(1),
    },
    Primitive {
        index: 25,
        name: "ceil",
        arity: Arity::Exactly(1),
    },
    Primitive {
        index: 26,
        name: "round",
        arity: Arity::Exactly(1),
    },
];

/// Look up a primitive by surface name.
pub fn lookup_name(name: &str) -> Option<&'static Primitive> {
    let name = if name == "display" { "print" } else { name };
    PRIMITIVES.iter().find(|p| p.name == name)
}

/// Look up a primitive by table index.
pub fn lookup_index(index: u8) -> Option<&'static Primitive> {
    PRIMITIVES.iter().find(|p| p.index == index)
}

/// Invoke the primitive at `index` with `args`, appending any output
/// to `stdout`. Unknown indices and arity mismatches are runtime
/// errors, per the binding contract.
pub fn call(index: u8, args: &[Value], stdout: &mut String) -> Result<Value, RuntimeError> {
    let prim = lookup_index(index).ok_or(RuntimeError::UnknownPrimitive { index })?;
    if !prim.arity.accepts(args.len()) {
        return Err(RuntimeError::PrimitiveArity {
            name: prim.name,
            expected: prim.arity.describe(),
            got: args.len(),
        });
    }
    match prim.name {
        "print" => {
            let line: Vec<String> = args.iter().map(Value::to_display_string).collect();
            stdout.push_str(&line.join(" "));
            stdout.push('\n');
            Ok(Value::Undefined)
        }
        "abs" => match &args[0] {
            Value::Int(n) => Ok(n
                .checked_abs()
                .map(Value::Int)
                .unwrap_or_else(|| Value::Float(-(f64::from(*n))))),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(non_numeric("abs", other)),
        },
        "min" => fold_extremum(prim.name, args, |best, next| next < best),
        "max" => fold_extremum(prim.name, args, |best, next| next > best),
        "pow" => pow(&args[0], &args[1]),
        "sqrt" => Ok(Value::Float(as_f64("sqrt", &args[0])?.sqrt())),
        "floor" => rounded(prim.name, &args[0], f64::floor),
        "ceil" => rounded(prim.name, &args[0], f64::ceil),
        "round" => rounded(prim.name, &args[0], f64::round_ties_even),
        _ => Err(RuntimeError::UnknownPrimitive { index }),
    }
}

fn non_numeric(name: &'static str, value: &Value) -> RuntimeError {
    RuntimeError::PrimitiveOperandType {
        name,
        actual: value.type_name(),
    }
}

fn as_f64(name: &'static str, value: &Value) -> Result<f64, RuntimeError> {
    match value {
        Value::Int(n) => Ok(f64::from(*n)),
        Value::Float(f) => Ok(*f),
        other => Err(non_numeric(name, other)),
    }
}

/// Select the extreme argument, returning the original value (so
/// `min(3, 2.5)` yields the float, `min(3, 4)` the int).
fn fold_extremum(
    name: &'static str,
    args: &[Value],
    replace: fn(f64, f64) -> bool,
) -> Result<Value, RuntimeError> {
    let mut best = args[0].clone();
    let mut best_key = as_f64(name, &best)?;
    for arg in &args[1..] {
        let key = as_f64(name, arg)?;
        if replace(best_key, key) {
            best = arg.clone();
            best_key = key;
        }
    }
    Ok(best)
}

fn pow(base: &Value, exponent: &Value) -> Result<Value, RuntimeError> {
    match (base, exponent) {
        (Value::Int(b), Value::Int(e)) if *e >= 0 => {
            match u32::try_from(*e).ok().and_then(|e| b.checked_pow(e)) {
                Some(n) => Ok(Value::Int(n)),
                None => Ok(Value::Float(f64::from(*b).powf(f64::from(*e)))),
            }
        }
        _ => {
            let b = as_f64("pow", base)?;
            let e = as_f64("pow", exponent)?;
            Ok(Value::Float(b.powf(e)))
        }
    }
}

/// `floor`/`ceil`/`round`: identity on ints; floats come back as an
/// int when the result fits, else as a float.
fn rounded(
    name: &'static str,
    value: &Value,
    op: fn(f64) -> f64,
) -> Result<Value, RuntimeError> {
    match value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => {
            let r = op(*f);
            if r.is_finite() && r >= f64::from(i32::MIN) && r <= f64::from(i32::MAX) {
                Ok(Value::Int(r as i32))
            } else {
                Ok(Value::Float(r))
            }
        }
        other => Err(non_numeric(name, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn run(index: u8, args: &[Value]) -> Result<Value, RuntimeError> {
        let mut out = String::new();
        call(index, args, &mut out)
    }

    #[test]
    fn print_is_variadic_and_returns_undefined() {
        let mut out = String::new();
        let result = call(5, &[Value::Int(1), Value::string("two")], &mut out).unwrap();
        assert_eq!(result, Value::Undefined);
        assert_eq!(out, "1 two\n");
    }

    #[test]
    fn abs_of_negative_int() {
        assert_eq!(run(10, &[Value::Int(-5)]).unwrap(), Value::Int(5));
        assert_eq!(
            run(10, &[Value::Int(i32::MIN)]).unwrap(),
            Value::Float(-(f64::from(i32::MIN)))
        );
    }

    #[test]
    fn min_max_accept_many_arguments() {
        let args = [Value::Int(3), Value::Int(7), Value::Int(2), Value::Int(9)];
        assert_eq!(run(21, &args).unwrap(), Value::Int(9));
        assert_eq!(run(20, &args).unwrap(), Value::Int(2));
    }

    #[test]
    fn min_preserves_the_original_variant() {
        let args = [Value::Int(3), Value::Float(2.5)];
        assert_eq!(run(20, &args).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn pow_stays_integral_when_it_fits() {
        assert_eq!(
            run(22, &[Value::Int(2), Value::Int(10)]).unwrap(),
            Value::Int(1024)
        );
        match run(22, &[Value::Int(2), Value::Int(40)]).unwrap() {
            Value::Float(f) => assert_eq!(f, 2f64.powi(40)),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[rstest]
    #[case::floor(24, 2.7, 2)]
    #[case::floor_negative(24, -2.2, -3)]
    #[case::ceil(25, 2.1, 3)]
    #[case::round_down(26, 2.4, 2)]
    #[case::round_half_to_even(26, 0.5, 0)]
    #[case::round_half_to_even_up(26, 1.5, 2)]
    #[case::round_half_stays_even(26, 2.5, 2)]
    fn rounding_primitives(#[case] index: u8, #[case] input: f64, #[case] expected: i32) {
        assert_eq!(
            run(index, &[Value::Float(input)]).unwrap(),
            Value::Int(expected)
        );
    }

    #[test]
    fn rounding_is_identity_on_ints() {
        assert_eq!(run(24, &[Value::Int(4)]).unwrap(), Value::Int(4));
        assert_eq!(run(26, &[Value::Int(-4)]).unwrap(), Value::Int(-4));
    }

    #[test]
    fn unknown_index_is_rejected() {
        assert_eq!(
            run(99, &[]).unwrap_err(),
            RuntimeError::UnknownPrimitive { index: 99 }
        );
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let err = run(10, &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::PrimitiveArity { .. }));
    }

    #[test]
    fn sqrt_always_returns_float() {
        assert_eq!(run(23, &[Value::Int(9)]).unwrap(), Value::Float(3.0));
    }
}
