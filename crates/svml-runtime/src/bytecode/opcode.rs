//! Opcode table
//!
//! Single source of truth for the instruction set: canonical byte
//! codes, operand shapes, per-opcode stack effect and on-wire size.
//! The function builder derives `max_stack` from the stack effects and
//! the assembler/disassembler derive encodings from the shapes.
//!
//! `0x00` is permanently unassigned so inter-function zero padding can
//! never alias an instruction. `JMP` holds a code but is reserved:
//! both container directions reject it.

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

/// One-byte instruction codes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum Opcode {
    /// Push int32 constant
    Lgci = 0x01,
    /// Push float64 constant
    Lgcf64 = 0x02,
    /// Push `false`
    Lgcb0 = 0x03,
    /// Push `true`
    Lgcb1 = 0x04,
    /// Push `undefined`
    Lgcu = 0x05,
    /// Push `null`
    Lgcn = 0x06,
    /// Push string constant
    Lgcs = 0x07,

    /// Load local slot
    Ldlg = 0x08,
    /// Store local slot
    Stlg = 0x09,
    /// Accepted alias of `LDLG` (source VM numbering); never emitted
    Ldlf = 0x0A,
    /// Accepted alias of `STLG`; never emitted
    Stlf = 0x0B,
    /// Load slot through parent hops
    Ldpg = 0x0C,
    /// Store slot through parent hops
    Stpg = 0x0D,

    Addg = 0x0E,
    Subg = 0x0F,
    Mulg = 0x10,
    Divg = 0x11,
    Modg = 0x12,
    Ltg = 0x13,
    Gtg = 0x14,
    Leg = 0x15,
    Geg = 0x16,
    Eqg = 0x17,
    Neqg = 0x18,
    Notg = 0x19,
    Negg = 0x1A,

    /// Discard top of stack
    Popg = 0x1B,
    /// Duplicate top of stack
    Dup = 0x1C,

    /// Unconditional branch
    Br = 0x1D,
    /// Branch if truthy
    Brt = 0x1E,
    /// Branch if falsy
    Brf = 0x1F,
    /// Reserved; rejected by assembler and disassembler
    Jmp = 0x20,

    /// Push closure over function-table entry, capturing current env
    Newc = 0x21,
    Call = 0x22,
    /// Tail call: reuse the current frame
    Callt = 0x23,
    /// Call primitive
    Callp = 0x24,
    /// Tail call primitive: call, then return its result
    Calltp = 0x25,

    /// Return top of stack
    Retg = 0x26,
    /// Return `undefined`
    Retu = 0x27,
    /// Return `null`
    Retn = 0x28,

    /// Pop size, push new array
    Newa = 0x29,
    /// Pop index and array, push element
    Ldag = 0x2A,
    /// Pop value, index and array; store
    Stag = 0x2B,
}

/// Operand layout of an opcode, as both the in-memory instruction and
/// the wire encoding see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// No operands
    None,
    /// Little-endian i32 immediate
    I32,
    /// Little-endian f64 immediate
    F64,
    /// u32 string reference (pool index in memory, byte offset on wire)
    StrRef,
    /// u32 function reference (table index in memory, byte offset on wire)
    FuncRef,
    /// u8 slot
    Slot,
    /// u8 slot, u8 env level
    SlotLevel,
    /// u8 primitive index, u8 argument count
    PrimArgs,
    /// u8 argument count
    Args,
    /// Signed 32-bit branch offset (instructions in memory, bytes on wire)
    BranchOff,
}

impl OperandShape {
    /// Encoded operand size in bytes.
    pub fn wire_size(self) -> usize {
        match self {
            OperandShape::None => 0,
            OperandShape::I32 | OperandShape::StrRef | OperandShape::FuncRef => 4,
            OperandShape::F64 => 8,
            OperandShape::Slot | OperandShape::Args => 1,
            OperandShape::SlotLevel | OperandShape::PrimArgs => 2,
            OperandShape::BranchOff => 4,
        }
    }
}

impl Opcode {
    /// Uppercase wire mnemonic, as disassembly prints it.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Lgci => "LGCI",
            Opcode::Lgcf64 => "LGCF64",
            Opcode::Lgcb0 => "LGCB0",
            Opcode::Lgcb1 => "LGCB1",
            Opcode::Lgcu => "LGCU",
            Opcode::Lgcn => "LGCN",
            Opcode::Lgcs => "LGCS",
            Opcode::Ldlg => "LDLG",
            Opcode::Stlg => "STLG",
            Opcode::Ldlf => "LDLF",
            Opcode::Stlf => "STLF",
            Opcode::Ldpg => "LDPG",
            Opcode::Stpg => "STPG",
            Opcode::Addg => "ADDG",
            Opcode::Subg => "SUBG",
            Opcode::Mulg => "MULG",
            Opcode::Divg => "DIVG",
            Opcode::Modg => "MODG",
            Opcode::Ltg => "LTG",
            Opcode::Gtg => "GTG",
            Opcode::Leg => "LEG",
            Opcode::Geg => "GEG",
            Opcode::Eqg => "EQG",
            Opcode::Neqg => "NEQG",
            Opcode::Notg => "NOTG",
            Opcode::Negg => "NEGG",
            Opcode::Popg => "POPG",
            Opcode::Dup => "DUP",
            Opcode::Br => "BR",
            Opcode::Brt => "BRT",
            Opcode::Brf => "BRF",
            Opcode::Jmp => "JMP",
            Opcode::Newc => "NEWC",
            Opcode::Call => "CALL",
            Opcode::Callt => "CALLT",
            Opcode::Callp => "CALLP",
            Opcode::Calltp => "CALLTP",
            Opcode::Retg => "RETG",
            Opcode::Retu => "RETU",
            Opcode::Retn => "RETN",
            Opcode::Newa => "NEWA",
            Opcode::Ldag => "LDAG",
            Opcode::Stag => "STAG",
        }
    }

    /// Operand layout.
    pub fn operand_shape(self) -> OperandShape {
        match self {
            Opcode::Lgci => OperandShape::I32,
            Opcode::Lgcf64 => OperandShape::F64,
            Opcode::Lgcs => OperandShape::StrRef,
            Opcode::Newc => OperandShape::FuncRef,
            Opcode::Ldlg | Opcode::Stlg | Opcode::Ldlf | Opcode::Stlf => OperandShape::Slot,
            Opcode::Ldpg | Opcode::Stpg => OperandShape::SlotLevel,
            Opcode::Call | Opcode::Callt => OperandShape::Args,
            Opcode::Callp | Opcode::Calltp => OperandShape::PrimArgs,
            Opcode::Br | Opcode::Brt | Opcode::Brf | Opcode::Jmp => OperandShape::BranchOff,
            _ => OperandShape::None,
        }
    }

    /// Full encoded size: one opcode byte plus operands.
    pub fn wire_size(self) -> usize {
        1 + self.operand_shape().wire_size()
    }

    /// `(pops, pushes)` for opcodes with a fixed stack contract.
    /// `None` for the call family, whose effect depends on the
    /// argument-count operand.
    pub fn fixed_stack_io(self) -> Option<(u32, u32)> {
        match self {
            Opcode::Lgci
            | Opcode::Lgcf64
            | Opcode::Lgcb0
            | Opcode::Lgcb1
            | Opcode::Lgcu
            | Opcode::Lgcn
            | Opcode::Lgcs
            | Opcode::Ldlg
            | Opcode::Ldlf
            | Opcode::Ldpg
            | Opcode::Newc
            | Opcode::Dup => Some((0, 1)),
            Opcode::Stlg | Opcode::Stlf | Opcode::Stpg | Opcode::Popg => Some((1, 0)),
            Opcode::Addg
            | Opcode::Subg
            | Opcode::Mulg
            | Opcode::Divg
            | Opcode::Modg
            | Opcode::Ltg
            | Opcode::Gtg
            | Opcode::Leg
            | Opcode::Geg
            | Opcode::Eqg
            | Opcode::Neqg => Some((2, 1)),
            Opcode::Notg | Opcode::Negg => Some((1, 1)),
            Opcode::Br | Opcode::Jmp => Some((0, 0)),
            Opcode::Brt | Opcode::Brf => Some((1, 0)),
            Opcode::Retg => Some((1, 0)),
            Opcode::Retu | Opcode::Retn => Some((0, 0)),
            Opcode::Newa => Some((1, 1)),
            Opcode::Ldag => Some((2, 1)),
            Opcode::Stag => Some((3, 0)),
            Opcode::Call | Opcode::Callt | Opcode::Callp | Opcode::Calltp => None,
        }
    }

    /// True for `BR`/`BRT`/`BRF` (not the reserved `JMP`).
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Br | Opcode::Brt | Opcode::Brf)
    }

    /// True for the `RET*` family.
    pub fn is_return(self) -> bool {
        matches!(self, Opcode::Retg | Opcode::Retu | Opcode::Retn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_codes_round_trip() {
        for byte in 0x01..=0x2Bu8 {
            let op = Opcode::try_from(byte).expect("assigned code");
            assert_eq!(op as u8, byte);
        }
    }

    #[test]
    fn zero_is_unassigned() {
        assert!(Opcode::try_from(0x00u8).is_err());
        assert!(Opcode::try_from(0x2Cu8).is_err());
        assert!(Opcode::try_from(0xFFu8).is_err());
    }

    #[test]
    fn wire_sizes_match_shapes() {
        assert_eq!(Opcode::Lgci.wire_size(), 5);
        assert_eq!(Opcode::Lgcf64.wire_size(), 9);
        assert_eq!(Opcode::Ldlg.wire_size(), 2);
        assert_eq!(Opcode::Ldpg.wire_size(), 3);
        assert_eq!(Opcode::Callp.wire_size(), 3);
        assert_eq!(Opcode::Br.wire_size(), 5);
        assert_eq!(Opcode::Addg.wire_size(), 1);
        assert_eq!(Opcode::Newc.wire_size(), 5);
    }

    #[test]
    fn aliases_share_the_local_shape() {
        assert_eq!(
            Opcode::Ldlf.operand_shape(),
            Opcode::Ldlg.operand_shape()
        );
        assert_eq!(Opcode::Ldlf.fixed_stack_io(), Some((0, 1)));
        assert_eq!(Opcode::Stlf.fixed_stack_io(), Some((1, 0)));
    }
}
