//! mcc CLI
//!
//! Driver for the compiler library: pick how far to run the pipeline,
//! write the `.s` file, and (by default) call the system gcc to produce
//! an executable next to the input.

use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use mcc::{CompileError, Options, Stage};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "mcc")]
#[command(version)]
#[command(about = "Compile a C subset to x86-64 System V assembly", long_about = None)]
struct Cli {
    /// Input C source file (already preprocessed)
    #[arg(required_unless_present = "completions")]
    input: Option<PathBuf>,

    /// Stop after lexing
    #[arg(long)]
    lex: bool,

    /// Stop after parsing
    #[arg(long)]
    parse: bool,

    /// Stop after semantic analysis
    #[arg(long)]
    validate: bool,

    /// Stop after intermediate-code generation
    #[arg(long)]
    tacky: bool,

    /// Stop after instruction selection (writes no file)
    #[arg(long)]
    codegen: bool,

    /// Write <input>.s and stop before assembling
    #[arg(short = 's')]
    assembly: bool,

    /// Pretty-print each stage's output to stdout
    #[arg(long)]
    debug: bool,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

impl Cli {
    fn stop_after(&self) -> Stage {
        if self.lex {
            Stage::Lex
        } else if self.parse {
            Stage::Parse
        } else if self.validate {
            Stage::Validate
        } else if self.tacky {
            Stage::Tacky
        } else if self.codegen {
            Stage::Codegen
        } else {
            Stage::Assembly
        }
    }

    /// Without any stop flag the driver also assembles and links.
    fn should_link(&self) -> bool {
        !(self.lex
            || self.parse
            || self.validate
            || self.tacky
            || self.codegen
            || self.assembly)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        generate(shell, &mut command, "mcc", &mut io::stdout());
        return;
    }

    let input = cli.input.clone().expect("clap requires an input file");
    let options = Options {
        stop_after: cli.stop_after(),
        debug: cli.debug,
    };

    if let Err(error) = run(&input, &options, cli.should_link()) {
        eprintln!("{}", error);
        process::exit(1);
    }
}

fn run(input: &Path, options: &Options, link: bool) -> Result<(), CompileError> {
    let Some(asm_path) = mcc::compile_file_to_assembly(input, options)? else {
        return Ok(());
    };
    if link {
        let executable = input.with_extension("");
        mcc::assemble_and_link(&asm_path, &executable)?;
    }
    Ok(())
}
