//! `svmc` — compile a serde-JSON AST to an SVML container or a
//! textual disassembly dump.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use svml_cli::{compile_ast, load_config, read_ast, report, write_bytes, CliError};
use svml_runtime::{assemble, disassemble_to_string};

#[derive(Parser)]
#[command(name = "svmc", version, about = "SVML compiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile an AST (JSON) into SVML
    Compile {
        /// Input AST file (front-end exchange JSON)
        input: PathBuf,
        /// Output path; defaults to the input with the format's extension
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "binary")]
        format: Format,
        /// Optional svml.toml with compile options
        #[arg(long)]
        config: Option<PathBuf>,
        /// Disable memoization instrumentation
        #[arg(long)]
        no_memo: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Versioned binary container (.svm)
    Binary,
    /// Human-readable disassembly (.svml)
    Text,
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
    let Command::Compile {
        input,
        output,
        format,
        config,
        no_memo,
    } = cli.command;

    let config = load_config(config.as_deref(), no_memo)?;
    let ast = read_ast(&input)?;
    let compiled = compile_ast(&ast, &config)?;

    match format {
        Format::Binary => {
            let bytes = assemble(&compiled.program)?;
            let path = output.unwrap_or_else(|| input.with_extension("svm"));
            write_bytes(&path, &bytes)?;
        }
        Format::Text => {
            let text = disassemble_to_string(&compiled.program);
            let path = output.unwrap_or_else(|| input.with_extension("svml"));
            write_bytes(&path, text.as_bytes())?;
        }
    }
    Ok(())
}
