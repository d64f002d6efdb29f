//! Bytecode validator — static checks on emitted functions
//!
//! Performs the stack-discipline analysis both the function builder
//! (at `build()` time, to compute and certify `max_stack`) and tests
//! rely on:
//! 1. **Branch targets** — every `BR`/`BRT`/`BRF` lands inside the
//!    instruction list
//! 2. **Stack depth** — abstract interpretation over the control-flow
//!    graph: depth never goes negative, joins agree, and depth is 0
//!    immediately after every `RET*`
//! 3. **Terminator** — the final instruction is a `RET*`
//! 4. **References** — slots fit the frame; `NEWC`/`LGCS` indices fit
//!    the program (whole-program form only)

use super::{Instr, Opcode, SVMFunction, SVMProgram};

/// A validation failure at an instruction index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyCode,
    /// The last instruction is not a `RET*`.
    MissingTerminator,
    /// Control can run past the end of the instruction list.
    FallsOffEnd { at: usize },
    BranchOutOfBounds { at: usize, target: i64, len: usize },
    /// An instruction pops more values than the stack holds.
    StackUnderflow { at: usize, depth: i32, pops: u32 },
    /// Two paths reach one instruction with different depths.
    DepthMismatch { at: usize, first: i32, second: i32 },
    /// Depth just after a `RET*` is not zero.
    ReturnDepth { at: usize, depth: i32 },
    /// Declared `max_stack` differs from the analysed peak.
    MaxStackMismatch { declared: usize, computed: usize },
    /// `env_size` smaller than `num_args`.
    EnvTooSmall { env_size: usize, num_args: usize },
    /// A local/parent slot operand outside the frame.
    SlotOutOfRange { at: usize, slot: usize, env_size: usize },
    /// `NEWC` to a missing function-table entry.
    FunctionOutOfRange { at: usize, index: usize },
    /// `LGCS` to a missing string-pool entry.
    StringOutOfRange { at: usize, index: usize },
    /// Entry index outside the function table.
    EntryOutOfRange { entry: usize, len: usize },
    /// The reserved `JMP` opcode appeared in memory.
    ReservedOpcode { at: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCode => write!(f, "function has no instructions"),
            Self::MissingTerminator => write!(f, "last instruction is not a RET*"),
            Self::FallsOffEnd { at } => {
                write!(f, "instruction {at} can fall off the end of the function")
            }
            Self::BranchOutOfBounds { at, target, len } => {
                write!(f, "branch at {at} targets {target}, outside [0, {len})")
            }
            Self::StackUnderflow { at, depth, pops } => {
                write!(f, "instruction {at} pops {pops} with only {depth} on the stack")
            }
            Self::DepthMismatch { at, first, second } => {
                write!(f, "instruction {at} reached with depths {first} and {second}")
            }
            Self::ReturnDepth { at, depth } => {
                write!(f, "return at {at} leaves depth {depth}, expected 0")
            }
            Self::MaxStackMismatch { declared, computed } => {
                write!(f, "declared max_stack {declared} but analysis found {computed}")
            }
            Self::EnvTooSmall { env_size, num_args } => {
                write!(f, "env_size {env_size} smaller than num_args {num_args}")
            }
            Self::SlotOutOfRange { at, slot, env_size } => {
                write!(f, "slot {slot} at {at} outside frame of size {env_size}")
            }
            Self::FunctionOutOfRange { at, index } => {
                write!(f, "NEWC at {at} references missing function {index}")
            }
            Self::StringOutOfRange { at, index } => {
                write!(f, "LGCS at {at} references missing string {index}")
            }
            Self::EntryOutOfRange { entry, len } => {
                write!(f, "entry index {entry} outside function table of {len}")
            }
            Self::ReservedOpcode { at } => write!(f, "reserved opcode JMP at {at}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Abstract-interpretation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackAnalysis {
    /// Peak operand-stack depth over every reachable path.
    pub max_depth: usize,
}

/// Walk the control-flow graph tracking operand-stack depth.
///
/// Unreachable instructions are ignored; reachable paths must agree on
/// depth at every join, stay non-negative, and close every `RET*` at
/// depth zero.
pub fn analyze_stack(code: &[Instr]) -> Result<StackAnalysis, ValidationError> {
    if code.is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    let len = code.len();
    let mut depth_in: Vec<Option<i32>> = vec![None; len];
    let mut work: Vec<(usize, i32)> = vec![(0, 0)];
    let mut max_depth: i32 = 0;

    while let Some((at, depth)) = work.pop() {
        match depth_in[at] {
            Some(existing) if existing == depth => continue,
            Some(existing) => {
                return Err(ValidationError::DepthMismatch {
                    at,
                    first: existing,
                    second: depth,
                })
            }
            None => depth_in[at] = Some(depth),
        }
        max_depth = max_depth.max(depth);

        let instr = code[at];
        let (pops, pushes) = instr.stack_io();
        if depth < pops as i32 {
            return Err(ValidationError::StackUnderflow { at, depth, pops });
        }
        let out = depth - pops as i32 + pushes as i32;
        max_depth = max_depth.max(out);

        if instr.opcode().is_return() {
            if out != 0 {
                return Err(ValidationError::ReturnDepth { at, depth: out });
            }
            continue;
        }

        if let Some(offset) = instr.branch_offset() {
            let target = at as i64 + 1 + i64::from(offset);
            if target < 0 || target >= len as i64 {
                return Err(ValidationError::BranchOutOfBounds {
                    at,
                    target,
                    len,
                });
            }
            work.push((target as usize, out));
            if instr.opcode() == Opcode::Br {
                continue; // no fallthrough
            }
        }

        if at + 1 >= len {
            return Err(ValidationError::FallsOffEnd { at });
        }
        work.push((at + 1, out));
    }

    Ok(StackAnalysis {
        max_depth: max_depth.max(0) as usize,
    })
}

/// Validate one function against its declared header.
pub fn validate_function(func: &SVMFunction) -> Result<StackAnalysis, ValidationError> {
    if func.env_size < func.num_args {
        return Err(ValidationError::EnvTooSmall {
            env_size: func.env_size,
            num_args: func.num_args,
        });
    }
    match func.code.last() {
        None => return Err(ValidationError::EmptyCode),
        Some(last) if !last.opcode().is_return() => {
            return Err(ValidationError::MissingTerminator)
        }
        Some(_) => {}
    }
    for (at, instr) in func.code.iter().enumerate() {
        let slot = match instr {
            Instr::Ldlg(s) | Instr::Stlg(s) | Instr::Ldlf(s) | Instr::Stlf(s) => Some(*s),
            // Parent slots are checked against the *owning* frame at
            // runtime; only level-0 slots are checkable here.
            _ => None,
        };
        if let Some(slot) = slot {
            if usize::from(slot) >= func.env_size {
                return Err(ValidationError::SlotOutOfRange {
                    at,
                    slot: usize::from(slot),
                    env_size: func.env_size,
                });
            }
        }
    }
    let analysis = analyze_stack(&func.code)?;
    if analysis.max_depth != func.max_stack {
        return Err(ValidationError::MaxStackMismatch {
            declared: func.max_stack,
            computed: analysis.max_depth,
        });
    }
    Ok(analysis)
}

/// Validate a whole program: each function plus cross-references.
pub fn validate_program(program: &SVMProgram) -> Result<(), ValidationError> {
    if program.entry >= program.functions.len() {
        return Err(ValidationError::EntryOutOfRange {
            entry: program.entry,
            len: program.functions.len(),
        });
    }
    for func in &program.functions {
        validate_function(func)?;
        for (at, instr) in func.code.iter().enumerate() {
            match instr {
                Instr::Newc(f) if *f as usize >= program.functions.len() => {
                    return Err(ValidationError::FunctionOutOfRange {
                        at,
                        index: *f as usize,
                    })
                }
                Instr::Lgcs(s) if *s as usize >= program.strings.len() => {
                    return Err(ValidationError::StringOutOfRange {
                        at,
                        index: *s as usize,
                    })
                }
                _ => {}
            }
        }
    }
    Ok(())
}
