//! Textual disassembly
//!
//! Human-readable dump of an in-memory program, used by
//! `svmc compile -f text` and by tests.
//!
//! # Format
//! ```text
//! === strings ===
//! 0: "hello"
//!
//! === fn 0 (entry, args 0, env 2, stack 3) ===
//!   0000  LGCI 5
//!   0001  BRF +2 (-> 0004)
//! ```

use super::{Instr, SVMProgram};
use std::fmt::Write;

/// Render a whole program.
pub fn disassemble_to_string(program: &SVMProgram) -> String {
    let mut out = String::new();

    if !program.strings.is_empty() {
        writeln!(out, "=== strings ===").expect("string write");
        for (index, text) in program.strings.iter().enumerate() {
            writeln!(out, "{index}: {text:?}").expect("string write");
        }
        writeln!(out).expect("string write");
    }

    for (index, func) in program.functions.iter().enumerate() {
        let entry = if index == program.entry { "entry, " } else { "" };
        writeln!(
            out,
            "=== fn {index} ({entry}args {}, env {}, stack {}) ===",
            func.num_args, func.env_size, func.max_stack
        )
        .expect("string write");
        for (at, instr) in func.code.iter().enumerate() {
            writeln!(out, "  {:04}  {}", at, render(*instr, at)).expect("string write");
        }
        writeln!(out).expect("string write");
    }

    out
}

fn render(instr: Instr, at: usize) -> String {
    let mnemonic = instr.opcode().mnemonic();
    match instr {
        Instr::Lgci(v) => format!("{mnemonic} {v}"),
        Instr::Lgcf64(v) => format!("{mnemonic} {v}"),
        Instr::Lgcs(s) => format!("{mnemonic} str:{s}"),
        Instr::Newc(f) => format!("{mnemonic} fn:{f}"),
        Instr::Ldlg(s) | Instr::Stlg(s) | Instr::Ldlf(s) | Instr::Stlf(s) => {
            format!("{mnemonic} {s}")
        }
        Instr::Ldpg(s, l) | Instr::Stpg(s, l) => format!("{mnemonic} {s} ^{l}"),
        Instr::Call(n) | Instr::Callt(n) => format!("{mnemonic} {n}"),
        Instr::Callp(p, n) | Instr::Calltp(p, n) => format!("{mnemonic} prim:{p} {n}"),
        Instr::Br(off) | Instr::Brt(off) | Instr::Brf(off) => {
            let target = at as i64 + 1 + i64::from(off);
            format!("{mnemonic} {off:+} (-> {target:04})")
        }
        _ => mnemonic.to_string(),
    }
}
