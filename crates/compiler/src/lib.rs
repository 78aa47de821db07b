//! mcc compiler library
//!
//! Compiles a subset of C to x86-64 System V assembly (AT&T syntax) and
//! optionally hands the result to the system `gcc` for assembling and
//! linking.
//!
//! The pipeline is a straight line; each stage consumes the previous
//! stage's value:
//!
//! ```text
//! source -> tokens -> syntax tree -> validated tree -> three-address IR
//!        -> abstract assembly -> .s text
//! ```
//!
//! ```rust
//! use mcc::compile_to_assembly;
//!
//! let asm = compile_to_assembly("int main(void) { return 42; }").unwrap();
//! assert!(asm.contains("movl $42, %eax"));
//! ```

pub mod ast;
pub mod codegen;
pub mod emitter;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod tacky;

pub use codegen::{CodeGen, CodegenError};
pub use lexer::{LexError, Lexer};
pub use parser::{ParseError, Parser};
pub use sema::{SemanticError, Symbol, Symbols};
pub use tacky::TackyGen;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use tracing::debug;

/// Any failure along the pipeline, plus the file and toolchain errors
/// around it.
#[derive(Debug)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    Semantic(SemanticError),
    Codegen(CodegenError),
    Io(std::io::Error),
    /// The external assembler/linker failed or is missing.
    Toolchain(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "lexical error: {}", e),
            CompileError::Parse(e) => write!(f, "syntax error: {}", e),
            CompileError::Semantic(e) => write!(f, "semantic error: {}", e),
            CompileError::Codegen(e) => write!(f, "code generation error: {}", e),
            CompileError::Io(e) => write!(f, "i/o error: {}", e),
            CompileError::Toolchain(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl From<SemanticError> for CompileError {
    fn from(e: SemanticError) -> Self {
        CompileError::Semantic(e)
    }
}

impl From<CodegenError> for CompileError {
    fn from(e: CodegenError) -> Self {
        CompileError::Codegen(e)
    }
}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::Io(e)
    }
}

/// The last stage to run before stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lex,
    Parse,
    Validate,
    Tacky,
    Codegen,
    Assembly,
}

/// Options for a single compilation.
#[derive(Debug, Clone)]
pub struct Options {
    pub stop_after: Stage,
    /// Pretty-print each stage's output to stdout.
    pub debug: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            stop_after: Stage::Assembly,
            debug: false,
        }
    }
}

/// Run the pipeline over a source string. Returns the assembly text,
/// or `None` when an earlier `stop_after` stage cut the run short.
pub fn run_pipeline(source: &str, options: &Options) -> Result<Option<String>, CompileError> {
    let tokens = Lexer::new(source).lex()?;
    debug!(count = tokens.len(), "lexed");
    if options.debug {
        for token in &tokens {
            println!("{}", token);
        }
    }
    if options.stop_after == Stage::Lex {
        return Ok(None);
    }

    let ast = Parser::new(tokens).parse()?;
    debug!(functions = ast.functions.len(), "parsed");
    if options.debug {
        println!("{:#?}", ast);
    }
    if options.stop_after == Stage::Parse {
        return Ok(None);
    }

    let (ast, symbols) = sema::validate(ast)?;
    debug!(symbols = symbols.len(), "validated");
    if options.debug {
        println!("{:#?}", ast);
    }
    if options.stop_after == Stage::Validate {
        return Ok(None);
    }

    let ir = TackyGen::new().generate(&ast);
    debug!(functions = ir.functions.len(), "lowered to ir");
    if options.debug {
        println!("{:#?}", ir);
    }
    if options.stop_after == Stage::Tacky {
        return Ok(None);
    }

    let asm = CodeGen::new(&symbols).generate(&ir)?;
    debug!(functions = asm.functions.len(), "selected instructions");
    if options.debug {
        println!("{:#?}", asm);
    }
    if options.stop_after == Stage::Codegen {
        return Ok(None);
    }

    let text = emitter::emit(&asm)?;
    if options.debug {
        println!("{}", text);
    }
    Ok(Some(text))
}

/// Compile a source string all the way to assembly text.
pub fn compile_to_assembly(source: &str) -> Result<String, CompileError> {
    let text = run_pipeline(source, &Options::default())?;
    Ok(text.expect("full pipeline always produces assembly"))
}

/// Compile `input` and write `<input>.s` next to it. Returns the path
/// written, or `None` when `stop_after` ended the run before emission.
pub fn compile_file_to_assembly(
    input: &Path,
    options: &Options,
) -> Result<Option<PathBuf>, CompileError> {
    let source = fs::read_to_string(input)?;
    let Some(text) = run_pipeline(&source, options)? else {
        return Ok(None);
    };
    let asm_path = input.with_extension("s");
    fs::write(&asm_path, text)?;
    debug!(path = %asm_path.display(), "wrote assembly");
    Ok(Some(asm_path))
}

/// Hand a `.s` file to the system `gcc` to assemble and link.
pub fn assemble_and_link(asm_path: &Path, output: &Path) -> Result<(), CompileError> {
    check_gcc()?;

    let result = Command::new("gcc")
        .arg(asm_path)
        .arg("-o")
        .arg(output)
        .output()
        .map_err(|e| CompileError::Toolchain(format!("failed to run gcc: {}", e)))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(CompileError::Toolchain(format!(
            "gcc failed with exit code {:?}:\n{}",
            result.status.code(),
            stderr
        )));
    }
    debug!(path = %output.display(), "linked executable");
    Ok(())
}

/// Cached result of probing for gcc; the probe only runs once per
/// process.
static GCC_CHECKED: OnceLock<Result<String, String>> = OnceLock::new();

fn check_gcc() -> Result<(), CompileError> {
    let probe = GCC_CHECKED.get_or_init(|| {
        let output = Command::new("gcc")
            .arg("--version")
            .output()
            .map_err(|e| format!("gcc not found: {}. Install gcc to produce executables.", e))?;
        if !output.status.success() {
            return Err(format!(
                "gcc --version failed with exit code {:?}",
                output.status.code()
            ));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or("gcc").to_string())
    });

    match probe {
        Ok(version) => {
            debug!(%version, "using system assembler");
            Ok(())
        }
        Err(message) => Err(CompileError::Toolchain(message.clone())),
    }
}
