//! Semantic analysis
//!
//! Three passes over the parsed tree, each rewriting or annotating it:
//!
//! 1. [`resolver`] renames every variable to a unique internal name and
//!    enforces scoping and lvalue rules.
//! 2. [`typecheck`] separates variables from functions and checks
//!    arities and redefinitions.
//! 3. [`control_flow`] attaches synthetic labels to loops and switches,
//!    resolves `break`/`continue`, validates case/default placement, and
//!    matches `goto` statements against their labels.
//!
//! The first error found aborts the whole analysis.

mod control_flow;
mod resolver;
mod typecheck;

pub use typecheck::{Symbol, Symbols};

use crate::ast::Program;
use std::fmt;

/// Everything semantic analysis can reject.
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticError {
    UndeclaredVariable(String),
    UndeclaredFunction(String),
    DuplicateDeclaration(String),
    /// An identifier declared with and without linkage in one scope.
    ConflictingDeclaration(String),
    InvalidLvalue,
    /// `++`/`--` applied to something that is not a variable.
    InvalidIncrementTarget { found: &'static str },
    NestedFunctionDefinition(String),
    BreakOutsideLoop,
    ContinueOutsideLoop,
    CaseOutsideSwitch,
    DefaultOutsideSwitch,
    NonConstantCase,
    DuplicateCase(i64),
    DuplicateDefault,
    DuplicateLabel(String),
    UndefinedLabel(String),
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    VariableUsedAsFunction(String),
    FunctionUsedAsVariable(String),
    FunctionRedefined(String),
    IncompatibleRedeclaration(String),
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticError::UndeclaredVariable(name) => {
                write!(f, "use of undeclared variable '{}'", name)
            }
            SemanticError::UndeclaredFunction(name) => {
                write!(f, "call to undeclared function '{}'", name)
            }
            SemanticError::DuplicateDeclaration(name) => {
                write!(f, "'{}' is already declared in this scope", name)
            }
            SemanticError::ConflictingDeclaration(name) => write!(
                f,
                "'{}' is declared with and without linkage in the same scope",
                name
            ),
            SemanticError::InvalidLvalue => {
                write!(f, "left side of an assignment must be a variable")
            }
            SemanticError::InvalidIncrementTarget { found } => {
                write!(f, "'++'/'--' cannot be applied to {}", found)
            }
            SemanticError::NestedFunctionDefinition(name) => {
                write!(f, "function '{}' defined inside another function", name)
            }
            SemanticError::BreakOutsideLoop => {
                write!(f, "'break' outside of a loop or switch")
            }
            SemanticError::ContinueOutsideLoop => write!(f, "'continue' outside of a loop"),
            SemanticError::CaseOutsideSwitch => write!(f, "'case' outside of a switch"),
            SemanticError::DefaultOutsideSwitch => write!(f, "'default' outside of a switch"),
            SemanticError::NonConstantCase => write!(f, "case value must be a constant"),
            SemanticError::DuplicateCase(value) => write!(f, "duplicate case value {}", value),
            SemanticError::DuplicateDefault => {
                write!(f, "multiple 'default' labels in one switch")
            }
            SemanticError::DuplicateLabel(label) => write!(f, "label '{}' defined twice", label),
            SemanticError::UndefinedLabel(label) => {
                write!(f, "goto target '{}' is not defined", label)
            }
            SemanticError::ArityMismatch {
                name,
                expected,
                got,
            } => write!(
                f,
                "function '{}' called with {} argument(s), expected {}",
                name, got, expected
            ),
            SemanticError::VariableUsedAsFunction(name) => {
                write!(f, "variable '{}' used as a function", name)
            }
            SemanticError::FunctionUsedAsVariable(name) => {
                write!(f, "function '{}' used as a variable", name)
            }
            SemanticError::FunctionRedefined(name) => {
                write!(f, "function '{}' is already defined", name)
            }
            SemanticError::IncompatibleRedeclaration(name) => {
                write!(f, "incompatible redeclaration of '{}'", name)
            }
        }
    }
}

impl std::error::Error for SemanticError {}

/// Run all three passes in order. Returns the rewritten program and the
/// symbol table (code generation needs the `defined` flags to decide
/// which calls go through the PLT).
pub fn validate(program: Program) -> Result<(Program, Symbols), SemanticError> {
    let program = resolver::resolve(program)?;
    let symbols = typecheck::check(&program)?;
    let program = control_flow::label(program)?;
    Ok((program, symbols))
}
