//! Shared plumbing for the `svmc` and `svmi` binaries: input loading,
//! error-to-exit-code mapping and diagnostic rendering.
//!
//! Exit codes: 0 success, 1 parse/compile error, 2 runtime error,
//! 3 I/O error.

use std::io::Write;
use std::path::{Path, PathBuf};
use svml_runtime::config::{Config, RunLimits};
use svml_runtime::{
    compile_program, vm, AssembleError, CompileError, CompileOutput, DisassembleError,
    Instrumentation, Program, RuntimeError, SVMProgram,
};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use thiserror::Error;

pub const EXIT_COMPILE: u8 = 1;
pub const EXIT_RUNTIME: u8 = 2;
pub const EXIT_IO: u8 = 3;

/// Everything a binary can fail with, tagged for exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: invalid AST JSON: {source}")]
    AstJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: invalid configuration: {detail}")]
    Config { path: PathBuf, detail: String },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{0}")]
    Assemble(#[from] AssembleError),
    #[error("{0}")]
    Disassemble(#[from] DisassembleError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl CliError {
    /// Map onto the documented exit codes.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Io { .. } => EXIT_IO,
            CliError::AstJson { .. }
            | CliError::Config { .. }
            | CliError::Compile(_)
            | CliError::Assemble(_)
            | CliError::Disassemble(_) => EXIT_COMPILE,
            CliError::Runtime(_) => EXIT_RUNTIME,
        }
    }
}

/// Read a serde-JSON AST (the front-end exchange format).
pub fn read_ast(path: &Path) -> Result<Program, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::AstJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Read raw container bytes.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, bytes).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the optional `svml.toml`, then apply flag overrides.
pub fn load_config(path: Option<&Path>, no_memo: bool) -> Result<Config, CliError> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Config::from_toml_str(&text).map_err(|e| CliError::Config {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?
        }
        None => Config::default(),
    };
    if no_memo {
        config.compile.enable_memoization = false;
        config.compile.enable_recursion_detection = false;
    }
    Ok(config)
}

/// Compile a loaded AST.
pub fn compile_ast(program: &Program, config: &Config) -> Result<CompileOutput, CliError> {
    Ok(compile_program(program, &config.compile)?)
}

/// Run a program and print its output followed by the final value.
pub fn run_and_print(
    program: &SVMProgram,
    limits: &RunLimits,
    instrumentation: Option<&Instrumentation>,
) -> Result<(), CliError> {
    let execution = vm::run(program, limits, instrumentation)?;
    print!("{}", execution.stdout);
    println!("{}", execution.value.to_display_string());
    Ok(())
}

/// Render an error to stderr, compiler-style and colored when the
/// stream supports it.
pub fn report(err: &CliError) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    if let CliError::Compile(compile) = err {
        // Already rendered in the error[SVxxxx] style.
        let _ = writeln!(stderr, "{}", compile.to_human_string().trim_end());
        return;
    }
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = write!(stderr, "error");
    let _ = stderr.reset();
    let _ = writeln!(stderr, ": {err}");
}
