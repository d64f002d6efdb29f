//! SVML bytecode model
//!
//! In-memory instruction, function and program types, the binary
//! container (assemble/disassemble), a textual disassembly dump and an
//! advisory validator. Operand references are *indices* in memory
//! (string pool, function table) and *byte offsets* on the wire; the
//! serializer converts between the two.

mod disasm;
mod opcode;
mod serialize;
pub mod validator;

pub use disasm::disassemble_to_string;
pub use opcode::{Opcode, OperandShape};
pub use serialize::{assemble, disassemble, AssembleError, DisassembleError};
pub use validator::{validate_function, validate_program, ValidationError};

use serde::{Deserialize, Serialize};

/// Container magic, little-endian on the wire.
pub const MAGIC: u32 = 0x5005_ACAD;
/// Container format version.
pub const MAJOR_VERSION: u16 = 0;
pub const MINOR_VERSION: u16 = 0;

/// One instruction with typed operands.
///
/// Branch offsets are in *instructions*, relative to the instruction
/// following the branch (offset 0 falls through). `Lgcs` holds a
/// string-pool index and `Newc` a function-table index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instr {
    Lgci(i32),
    Lgcf64(f64),
    Lgcb0,
    Lgcb1,
    Lgcu,
    Lgcn,
    Lgcs(u32),
    Ldlg(u8),
    Stlg(u8),
    Ldlf(u8),
    Stlf(u8),
    Ldpg(u8, u8),
    Stpg(u8, u8),
    Addg,
    Subg,
    Mulg,
    Divg,
    Modg,
    Ltg,
    Gtg,
    Leg,
    Geg,
    Eqg,
    Neqg,
    Notg,
    Negg,
    Popg,
    Dup,
    Br(i32),
    Brt(i32),
    Brf(i32),
    Newc(u32),
    Call(u8),
    Callt(u8),
    Callp(u8, u8),
    Calltp(u8, u8),
    Retg,
    Retu,
    Retn,
    Newa,
    Ldag,
    Stag,
}

impl Instr {
    /// The instruction's opcode.
    pub fn opcode(self) -> Opcode {
        match self {
            Instr::Lgci(_) => Opcode::Lgci,
            Instr::Lgcf64(_) => Opcode::Lgcf64,
            Instr::Lgcb0 => Opcode::Lgcb0,
            Instr::Lgcb1 => Opcode::Lgcb1,
            Instr::Lgcu => Opcode::Lgcu,
            Instr::Lgcn => Opcode::Lgcn,
            Instr::Lgcs(_) => Opcode::Lgcs,
            Instr::Ldlg(_) => Opcode::Ldlg,
            Instr::Stlg(_) => Opcode::Stlg,
            Instr::Ldlf(_) => Opcode::Ldlf,
            Instr::Stlf(_) => Opcode::Stlf,
            Instr::Ldpg(_, _) => Opcode::Ldpg,
            Instr::Stpg(_, _) => Opcode::Stpg,
            Instr::Addg => Opcode::Addg,
            Instr::Subg => Opcode::Subg,
            Instr::Mulg => Opcode::Mulg,
            Instr::Divg => Opcode::Divg,
            Instr::Modg => Opcode::Modg,
            Instr::Ltg => Opcode::Ltg,
            Instr::Gtg => Opcode::Gtg,
            Instr::Leg => Opcode::Leg,
            Instr::Geg => Opcode::Geg,
            Instr::Eqg => Opcode::Eqg,
            Instr::Neqg => Opcode::Neqg,
            Instr::Notg => Opcode::Notg,
            Instr::Negg => Opcode::Negg,
            Instr::Popg => Opcode::Popg,
            Instr::Dup => Opcode::Dup,
            Instr::Br(_) => Opcode::Br,
            Instr::Brt(_) => Opcode::Brt,
            Instr::Brf(_) => Opcode::Brf,
            Instr::Newc(_) => Opcode::Newc,
            Instr::Call(_) => Opcode::Call,
            Instr::Callt(_) => Opcode::Callt,
            Instr::Callp(_, _) => Opcode::Callp,
            Instr::Calltp(_, _) => Opcode::Calltp,
            Instr::Retg => Opcode::Retg,
            Instr::Retu => Opcode::Retu,
            Instr::Retn => Opcode::Retn,
            Instr::Newa => Opcode::Newa,
            Instr::Ldag => Opcode::Ldag,
            Instr::Stag => Opcode::Stag,
        }
    }

    /// Encoded size in bytes.
    pub fn wire_size(self) -> usize {
        self.opcode().wire_size()
    }

    /// `(pops, pushes)`: the call family computes its effect from the
    /// argument-count operand; everything else uses the opcode table.
    ///
    /// `CALLT`/`CALLTP` report the same contract as their non-tail
    /// forms; the pushed result lands on the *caller's* stack at
    /// runtime, but the emitting function accounts for it identically
    /// (the dead `RETG` that follows a tail call consumes it).
    pub fn stack_io(self) -> (u32, u32) {
        match self {
            Instr::Call(n) | Instr::Callt(n) => (u32::from(n) + 1, 1),
            Instr::Callp(_, n) | Instr::Calltp(_, n) => (u32::from(n), 1),
            other => other
                .opcode()
                .fixed_stack_io()
                .expect("non-call opcodes have fixed stack io"),
        }
    }

    /// Net stack effect.
    pub fn stack_effect(self) -> i32 {
        let (pops, pushes) = self.stack_io();
        pushes as i32 - pops as i32
    }

    /// Branch offset, for the branch family.
    pub fn branch_offset(self) -> Option<i32> {
        match self {
            Instr::Br(off) | Instr::Brt(off) | Instr::Brf(off) => Some(off),
            _ => None,
        }
    }

    /// Copy of the instruction with a replaced branch offset.
    pub fn with_branch_offset(self, off: i32) -> Instr {
        match self {
            Instr::Br(_) => Instr::Br(off),
            Instr::Brt(_) => Instr::Brt(off),
            Instr::Brf(_) => Instr::Brf(off),
            other => other,
        }
    }
}

/// One compiled function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SVMFunction {
    /// Peak operand-stack depth of any legal execution — a contract,
    /// not advisory.
    pub max_stack: usize,
    /// Environment-frame slot count; parameters occupy `0..num_args`.
    pub env_size: usize,
    pub num_args: usize,
    /// Non-empty; ends with a `RET*` on every reachable control path.
    pub code: Vec<Instr>,
}

/// A complete program: a flat function table, the entry index and the
/// deduplicated string pool shared by all functions. The pool is
/// read-only after compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SVMProgram {
    pub entry: usize,
    pub functions: Vec<SVMFunction>,
    pub strings: Vec<String>,
}

impl SVMProgram {
    /// Look up a string-pool entry.
    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }
}
