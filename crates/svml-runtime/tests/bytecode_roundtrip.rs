//! Container round-trip: `disassemble(assemble(P))` preserves every
//! compiled program, including ones only a hand or a generator would
//! write.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use svml_runtime::ast::BinaryOp;
use svml_runtime::bytecode::{assemble, disassemble, validator, Instr, SVMFunction, SVMProgram};
use svml_runtime::config::RunLimits;
use svml_runtime::{vm, Value};

fn scenario_a() -> svml_runtime::Program {
    program(vec![
        def(
            "add",
            &["x", "y"],
            vec![ret(bin(BinaryOp::Add, name("x"), name("y")))],
        ),
        expr_stmt(call("add", vec![int(5), int(3)])),
    ])
}

#[test]
fn compiled_program_round_trips() {
    let out = compile_ok(&scenario_a());
    let bytes = assemble(&out.program).unwrap();
    let back = disassemble(&bytes).unwrap();
    assert_eq!(back, out.program);
}

#[test]
fn round_tripped_program_still_runs() {
    let out = compile_ok(&scenario_a());
    let bytes = assemble(&out.program).unwrap();
    let back = disassemble(&bytes).unwrap();
    let result = vm::run(&back, &RunLimits::default(), None).unwrap();
    assert_eq!(result.value, Value::Int(8));
}

#[test]
fn round_trip_covers_strings_and_branches() {
    // if True: "yes" else: "no" — string pool plus forward branches.
    let out = compile_ok(&program(vec![if_else(
        boolean(true),
        vec![expr_stmt(string("yes"))],
        vec![expr_stmt(string("no"))],
    )]));
    let bytes = assemble(&out.program).unwrap();
    let back = disassemble(&bytes).unwrap();
    assert_eq!(back, out.program);
    let result = vm::run(&back, &RunLimits::default(), None).unwrap();
    assert_eq!(result.value, Value::string("yes"));
}

#[test]
fn round_trip_covers_lambdas_and_parent_loads() {
    let out = compile_ok(&program(vec![
        def(
            "make_adder",
            &["n"],
            vec![ret(lambda(&["x"], bin(BinaryOp::Add, name("x"), name("n"))))],
        ),
        assign("add2", call("make_adder", vec![int(2)])),
        expr_stmt(call("add2", vec![int(40)])),
    ]));
    let bytes = assemble(&out.program).unwrap();
    let back = disassemble(&bytes).unwrap();
    assert_eq!(back, out.program);
    let result = vm::run(&back, &RunLimits::default(), None).unwrap();
    assert_eq!(result.value, Value::Int(42));
}

#[test]
fn round_trip_covers_the_alias_and_array_opcodes() {
    // Hand-built: the compiler never emits LDLF/STLF or the array
    // family, but the container must carry them.
    let program = SVMProgram {
        entry: 0,
        functions: vec![SVMFunction {
            max_stack: 3,
            env_size: 1,
            num_args: 0,
            code: vec![
                Instr::Lgci(2),
                Instr::Newa,
                Instr::Stlf(0),
                Instr::Ldlf(0),
                Instr::Lgci(0),
                Instr::Lgci(7),
                Instr::Stag,
                Instr::Ldlg(0),
                Instr::Lgci(0),
                Instr::Ldag,
                Instr::Retg,
            ],
        }],
        strings: vec![],
    };
    validator::validate_program(&program).unwrap();
    let bytes = assemble(&program).unwrap();
    let back = disassemble(&bytes).unwrap();
    assert_eq!(back, program);
    let result = vm::run(&back, &RunLimits::default(), None).unwrap();
    assert_eq!(result.value, Value::Int(7));
}

// ── Generated programs ───────────────────────────────────────────────

fn arith_op() -> impl Strategy<Value = Instr> {
    prop_oneof![
        Just(Instr::Addg),
        Just(Instr::Subg),
        Just(Instr::Mulg),
    ]
}

/// A straight-line function: push a seed, then fold an arbitrary
/// sequence of (literal, operator) pairs, and return.
fn straight_line_function() -> impl Strategy<Value = SVMFunction> {
    (
        any::<i32>(),
        prop::collection::vec((any::<i32>(), arith_op()), 0..24),
    )
        .prop_map(|(seed, steps)| {
            let mut code = vec![Instr::Lgci(seed)];
            for (literal, op) in steps {
                code.push(Instr::Lgci(literal));
                code.push(op);
            }
            code.push(Instr::Retg);
            SVMFunction {
                max_stack: 2,
                env_size: 0,
                num_args: 0,
                code,
            }
        })
}

proptest! {
    #[test]
    fn straight_line_round_trip(func in straight_line_function()) {
        let program = SVMProgram {
            entry: 0,
            functions: vec![func],
            strings: vec![],
        };
        let bytes = assemble(&program).unwrap();
        let back = disassemble(&bytes).unwrap();
        prop_assert_eq!(back, program);
    }

    #[test]
    fn conditional_round_trip(cond in any::<bool>(), a in any::<i32>(), b in any::<i32>()) {
        let program = SVMProgram {
            entry: 0,
            functions: vec![SVMFunction {
                max_stack: 1,
                env_size: 0,
                num_args: 0,
                code: vec![
                    if cond { Instr::Lgcb1 } else { Instr::Lgcb0 },
                    Instr::Brf(2),
                    Instr::Lgci(a),
                    Instr::Br(1),
                    Instr::Lgci(b),
                    Instr::Retg,
                ],
            }],
            strings: vec![],
        };
        let bytes = assemble(&program).unwrap();
        let back = disassemble(&bytes).unwrap();
        prop_assert_eq!(&back, &program);

        let result = vm::run(&back, &RunLimits::default(), None).unwrap();
        prop_assert_eq!(result.value, Value::Int(if cond { a } else { b }));
    }

    #[test]
    fn string_pool_round_trip(texts in prop::collection::vec("[a-z]{0,8}", 1..6)) {
        // Deduplicate: the pool contract is unique entries.
        let mut strings: Vec<String> = Vec::new();
        for t in texts {
            if !strings.contains(&t) {
                strings.push(t);
            }
        }
        let code: Vec<Instr> = (0..strings.len() as u32)
            .flat_map(|i| [Instr::Lgcs(i), Instr::Popg])
            .chain([Instr::Retu])
            .collect();
        let program = SVMProgram {
            entry: 0,
            functions: vec![SVMFunction {
                max_stack: 1,
                env_size: 0,
                num_args: 0,
                code,
            }],
            strings,
        };
        let bytes = assemble(&program).unwrap();
        let back = disassemble(&bytes).unwrap();
        prop_assert_eq!(back, program);
    }
}
