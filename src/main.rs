//! Cascade compiler CLI
//!
//! The `cascadec` command runs the front-end over the given files (or
//! standard input when none are given). Success is silent; failures exit
//! with a stage-specific code.

use cascade::driver::{self, Driver, Options};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process;

#[cfg(windows)]
const DEFAULT_OUTPUT: &str = "main.exe";
#[cfg(not(windows))]
const DEFAULT_OUTPUT: &str = "main";

#[derive(Parser)]
#[command(name = "cascadec")]
#[command(version = cascade::VERSION)]
#[command(about = "Compiler for the Cascade language", long_about = None)]
struct Cli {
    /// Source files to compile; standard input is read when none are given
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Whether or not to include debug symbols
    #[arg(short, long)]
    debug: bool,

    /// Optimization level
    #[arg(short = 'O', long = "optimize", value_name = "LEVEL", default_value_t = 0)]
    #[arg(value_parser = clap::value_parser!(u8).range(0..=3))]
    optimize: u8,

    /// What the compiler should output
    #[arg(short, long, value_enum, default_value_t = Emit::LlvmIr)]
    emit: Emit,

    /// File to put the output in
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// The target triple to output for
    #[arg(short, long, value_name = "TRIPLE")]
    target: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Emit {
    LlvmIr,
    LlvmBc,
    Asm,
    Obj,
    Exe,
}

impl From<Emit> for driver::Emit {
    fn from(emit: Emit) -> Self {
        match emit {
            Emit::LlvmIr => driver::Emit::LlvmIr,
            Emit::LlvmBc => driver::Emit::LlvmBc,
            Emit::Asm => driver::Emit::Asm,
            Emit::Obj => driver::Emit::Obj,
            Emit::Exe => driver::Emit::Exe,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // help and version are not failures
            let failed = err.use_stderr();
            let _ = err.print();
            process::exit(if failed { -1 } else { 0 });
        }
    };

    let options = Options {
        files: cli.files,
        debug: cli.debug,
        opt_level: driver::OptLevel::from_int(cli.optimize)
            .expect("clap validated the level range"),
        emit: cli.emit.into(),
        output: cli.output,
        target: cli.target,
    };

    match Driver::new(options).run() {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(err.exit_code());
        }
    }
}
