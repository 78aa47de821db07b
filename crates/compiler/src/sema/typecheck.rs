//! Type checking
//!
//! The supported subset has exactly two kinds of things: `int` variables
//! and functions. This pass builds the symbol table, keeps variables and
//! functions apart, and checks call arities and function redefinitions.

use super::SemanticError;
use crate::ast::{
    Block, BlockItem, Declaration, Expr, ForInit, FunctionDecl, Program, Statement, VariableDecl,
};
use std::collections::HashMap;

/// What an identifier denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Int,
    Function { arity: usize, defined: bool },
}

/// Resolved identifier to its symbol. Variable keys are the unique
/// internal names produced by resolution; function keys are the source
/// spellings.
pub type Symbols = HashMap<String, Symbol>;

pub(super) fn check(program: &Program) -> Result<Symbols, SemanticError> {
    let mut checker = TypeChecker {
        symbols: HashMap::new(),
    };
    for function in &program.functions {
        checker.check_function_decl(function)?;
    }
    Ok(checker.symbols)
}

struct TypeChecker {
    symbols: Symbols,
}

impl TypeChecker {
    fn check_function_decl(&mut self, decl: &FunctionDecl) -> Result<(), SemanticError> {
        let has_body = decl.body.is_some();
        let mut already_defined = false;

        match self.symbols.get(&decl.name) {
            Some(Symbol::Function { arity, defined }) => {
                if *arity != decl.params.len() {
                    return Err(SemanticError::IncompatibleRedeclaration(decl.name.clone()));
                }
                if *defined && has_body {
                    return Err(SemanticError::FunctionRedefined(decl.name.clone()));
                }
                already_defined = *defined;
            }
            Some(Symbol::Int) => {
                return Err(SemanticError::IncompatibleRedeclaration(decl.name.clone()));
            }
            None => {}
        }

        self.symbols.insert(
            decl.name.clone(),
            Symbol::Function {
                arity: decl.params.len(),
                defined: already_defined || has_body,
            },
        );

        if let Some(body) = &decl.body {
            for param in &decl.params {
                self.symbols.insert(param.clone(), Symbol::Int);
            }
            self.check_block(body)?;
        }
        Ok(())
    }

    fn check_variable_decl(&mut self, decl: &VariableDecl) -> Result<(), SemanticError> {
        self.symbols.insert(decl.name.clone(), Symbol::Int);
        if let Some(init) = &decl.init {
            self.check_expr(init)?;
        }
        Ok(())
    }

    fn check_block(&mut self, block: &Block) -> Result<(), SemanticError> {
        for item in &block.items {
            self.check_block_item(item)?;
        }
        Ok(())
    }

    fn check_block_item(&mut self, item: &BlockItem) -> Result<(), SemanticError> {
        match item {
            BlockItem::Declaration(Declaration::Variable(v)) => self.check_variable_decl(v),
            BlockItem::Declaration(Declaration::Function(f)) => self.check_function_decl(f),
            BlockItem::Statement(s) => self.check_statement(s),
        }
    }

    fn check_statement(&mut self, statement: &Statement) -> Result<(), SemanticError> {
        match statement {
            Statement::Return(e) | Statement::Expression(e) => self.check_expr(e),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check_expr(condition)?;
                self.check_statement(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.check_statement(else_branch)?;
                }
                Ok(())
            }
            Statement::Compound(block) => self.check_block(block),
            Statement::While {
                condition, body, ..
            } => {
                self.check_expr(condition)?;
                self.check_statement(body)
            }
            Statement::DoWhile {
                body, condition, ..
            } => {
                self.check_statement(body)?;
                self.check_expr(condition)
            }
            Statement::For {
                init,
                condition,
                post,
                body,
                ..
            } => {
                match init {
                    ForInit::Declaration(d) => self.check_variable_decl(d)?,
                    ForInit::Expression(Some(e)) => self.check_expr(e)?,
                    ForInit::Expression(None) => {}
                }
                if let Some(condition) = condition {
                    self.check_expr(condition)?;
                }
                if let Some(post) = post {
                    self.check_expr(post)?;
                }
                self.check_statement(body)
            }
            Statement::Switch {
                condition, body, ..
            } => {
                self.check_expr(condition)?;
                self.check_statement(body)
            }
            Statement::Case { value, body, .. } => {
                self.check_expr(value)?;
                for item in body {
                    self.check_block_item(item)?;
                }
                Ok(())
            }
            Statement::Default { body, .. } => {
                for item in body {
                    self.check_block_item(item)?;
                }
                Ok(())
            }
            Statement::Labeled { statement, .. } => self.check_statement(statement),
            Statement::Break { .. }
            | Statement::Continue { .. }
            | Statement::Goto(_)
            | Statement::Null => Ok(()),
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<(), SemanticError> {
        match expr {
            Expr::Constant(_) => Ok(()),
            Expr::Var(name) => match self.symbols.get(name) {
                Some(Symbol::Function { .. }) => {
                    Err(SemanticError::FunctionUsedAsVariable(name.clone()))
                }
                _ => Ok(()),
            },
            Expr::Unary { operand, .. } => self.check_expr(operand),
            Expr::Binary { left, right, .. } => {
                self.check_expr(left)?;
                self.check_expr(right)
            }
            Expr::Assignment { lvalue, rvalue, .. } => {
                self.check_expr(rvalue)?;
                self.check_expr(lvalue)
            }
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                self.check_expr(condition)?;
                self.check_expr(then_expr)?;
                self.check_expr(else_expr)
            }
            Expr::Call { name, args } => {
                match self.symbols.get(name) {
                    Some(Symbol::Int) => {
                        return Err(SemanticError::VariableUsedAsFunction(name.clone()));
                    }
                    Some(Symbol::Function { arity, .. }) => {
                        if *arity != args.len() {
                            return Err(SemanticError::ArityMismatch {
                                name: name.clone(),
                                expected: *arity,
                                got: args.len(),
                            });
                        }
                    }
                    // Resolution already rejected unknown names.
                    None => {}
                }
                for arg in args {
                    self.check_expr(arg)?;
                }
                Ok(())
            }
        }
    }
}
