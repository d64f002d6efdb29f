//! `svmi` — run SVML, either from a binary container or straight from
//! a serde-JSON AST.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use svml_cli::{
    compile_ast, load_config, read_ast, read_bytes, report, run_and_print, CliError,
};
use svml_runtime::disassemble;

#[derive(Parser)]
#[command(name = "svmi", version, about = "SVML interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Disassemble and run a binary container
    Interpret {
        /// Input .svm file
        input: PathBuf,
        /// Optional svml.toml with execution limits
        #[arg(long)]
        limits: Option<PathBuf>,
    },
    /// Compile an AST (JSON) and run it
    InterpretSource {
        /// Input AST file (front-end exchange JSON)
        input: PathBuf,
        /// Optional svml.toml with compile options and limits
        #[arg(long)]
        limits: Option<PathBuf>,
        /// Disable memoization instrumentation
        #[arg(long)]
        no_memo: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Interpret { input, limits } => {
            let config = load_config(limits.as_deref(), false)?;
            let bytes = read_bytes(&input)?;
            let program = disassemble(&bytes)?;
            // A container carries no instrumentation; memoization only
            // applies when compiling from source.
            run_and_print(&program, &config.limits, None)
        }
        Command::InterpretSource {
            input,
            limits,
            no_memo,
        } => {
            let config = load_config(limits.as_deref(), no_memo)?;
            let ast = read_ast(&input)?;
            let compiled = compile_ast(&ast, &config)?;
            run_and_print(
                &compiled.program,
                &config.limits,
                Some(&compiled.instrumentation),
            )
        }
    }
}
