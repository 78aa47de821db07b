//! Identifier resolution
//!
//! Walks the tree with a stack of scopes, renaming every variable to a
//! globally unique internal name (`name.N`) and rewriting references to
//! match. Function names have external linkage and keep their spelling.
//! Also the home of the lvalue rules: assignment targets and
//! increment/decrement operands must be variables.

use super::SemanticError;
use crate::ast::{
    Block, BlockItem, Declaration, Expr, ForInit, FunctionDecl, Program, Statement, UnaryOp,
    VariableDecl,
};
use std::collections::HashMap;

/// One name in one scope.
struct VarEntry {
    unique: String,
    has_linkage: bool,
}

pub(super) fn resolve(program: Program) -> Result<Program, SemanticError> {
    let mut resolver = Resolver::new();
    let functions = program
        .functions
        .into_iter()
        .map(|f| resolver.resolve_function_decl(f))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Program { functions })
}

struct Resolver {
    /// Innermost scope last. The file scope is index 0.
    scopes: Vec<HashMap<String, VarEntry>>,
    /// Feeds the `name.N` renaming; never reset within a run.
    counter: usize,
    in_function: bool,
}

impl Resolver {
    fn new() -> Self {
        Resolver {
            scopes: vec![HashMap::new()],
            counter: 0,
            in_function: false,
        }
    }

    // ------------------------------------------------------------------
    // Scope bookkeeping
    // ------------------------------------------------------------------

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    fn current_scope(&mut self) -> &mut HashMap<String, VarEntry> {
        self.scopes.last_mut().expect("scope stack never empty")
    }

    fn lookup(&self, name: &str) -> Option<&VarEntry> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Declare a variable in the current scope and hand back its unique
    /// internal name.
    fn declare_variable(&mut self, name: &str) -> Result<String, SemanticError> {
        if let Some(entry) = self.current_scope().get(name) {
            if entry.has_linkage {
                return Err(SemanticError::ConflictingDeclaration(name.to_string()));
            }
            return Err(SemanticError::DuplicateDeclaration(name.to_string()));
        }

        let unique = format!("{}.{}", name, self.counter);
        self.counter += 1;
        self.current_scope().insert(
            name.to_string(),
            VarEntry {
                unique: unique.clone(),
                has_linkage: false,
            },
        );
        Ok(unique)
    }

    /// Declare a function name. Functions have linkage and may be
    /// redeclared freely; clashing with a same-scope variable is an
    /// error.
    fn declare_function(&mut self, name: &str) -> Result<(), SemanticError> {
        if let Some(entry) = self.current_scope().get(name)
            && !entry.has_linkage
        {
            return Err(SemanticError::ConflictingDeclaration(name.to_string()));
        }
        self.current_scope().insert(
            name.to_string(),
            VarEntry {
                unique: name.to_string(),
                has_linkage: true,
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn resolve_function_decl(
        &mut self,
        decl: FunctionDecl,
    ) -> Result<FunctionDecl, SemanticError> {
        if decl.body.is_some() && self.in_function {
            return Err(SemanticError::NestedFunctionDefinition(decl.name));
        }
        self.declare_function(&decl.name)?;

        // Parameters live in the same scope as the body's outermost
        // block, so the scope opens here and the block reuses it.
        self.enter_scope();
        let params = decl
            .params
            .iter()
            .map(|p| self.declare_variable(p))
            .collect::<Result<Vec<_>, _>>()?;

        let body = match decl.body {
            Some(block) => {
                self.in_function = true;
                let items = self.resolve_block_items(block.items)?;
                self.in_function = false;
                Some(Block { items })
            }
            None => None,
        };
        self.exit_scope();

        Ok(FunctionDecl {
            name: decl.name,
            params,
            body,
        })
    }

    fn resolve_variable_decl(
        &mut self,
        decl: VariableDecl,
    ) -> Result<VariableDecl, SemanticError> {
        let name = self.declare_variable(&decl.name)?;
        let init = decl.init.map(|e| self.resolve_expression(e)).transpose()?;
        Ok(VariableDecl { name, init })
    }

    fn resolve_declaration(&mut self, decl: Declaration) -> Result<Declaration, SemanticError> {
        match decl {
            Declaration::Variable(v) => Ok(Declaration::Variable(self.resolve_variable_decl(v)?)),
            Declaration::Function(f) => {
                Ok(Declaration::Function(self.resolve_function_decl(f)?))
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn resolve_block(&mut self, block: Block) -> Result<Block, SemanticError> {
        self.enter_scope();
        let items = self.resolve_block_items(block.items)?;
        self.exit_scope();
        Ok(Block { items })
    }

    fn resolve_block_items(
        &mut self,
        items: Vec<BlockItem>,
    ) -> Result<Vec<BlockItem>, SemanticError> {
        items
            .into_iter()
            .map(|item| match item {
                BlockItem::Declaration(d) => {
                    Ok(BlockItem::Declaration(self.resolve_declaration(d)?))
                }
                BlockItem::Statement(s) => Ok(BlockItem::Statement(self.resolve_statement(s)?)),
            })
            .collect()
    }

    fn resolve_statement(&mut self, statement: Statement) -> Result<Statement, SemanticError> {
        match statement {
            Statement::Return(e) => Ok(Statement::Return(self.resolve_expression(e)?)),
            Statement::Expression(e) => Ok(Statement::Expression(self.resolve_expression(e)?)),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => Ok(Statement::If {
                condition: self.resolve_expression(condition)?,
                then_branch: Box::new(self.resolve_statement(*then_branch)?),
                else_branch: else_branch
                    .map(|s| self.resolve_statement(*s).map(Box::new))
                    .transpose()?,
            }),
            Statement::Compound(block) => Ok(Statement::Compound(self.resolve_block(block)?)),
            Statement::While {
                condition,
                body,
                label,
            } => Ok(Statement::While {
                condition: self.resolve_expression(condition)?,
                body: Box::new(self.resolve_statement(*body)?),
                label,
            }),
            Statement::DoWhile {
                body,
                condition,
                label,
            } => Ok(Statement::DoWhile {
                body: Box::new(self.resolve_statement(*body)?),
                condition: self.resolve_expression(condition)?,
                label,
            }),
            Statement::For {
                init,
                condition,
                post,
                body,
                label,
            } => {
                // The whole for statement is one scope: a declaration in
                // the init clause shadows outer names for the condition,
                // post expression, and body.
                self.enter_scope();
                let init = match init {
                    ForInit::Declaration(d) => {
                        ForInit::Declaration(self.resolve_variable_decl(d)?)
                    }
                    ForInit::Expression(e) => ForInit::Expression(
                        e.map(|e| self.resolve_expression(e)).transpose()?,
                    ),
                };
                let condition = condition.map(|e| self.resolve_expression(e)).transpose()?;
                let post = post.map(|e| self.resolve_expression(e)).transpose()?;
                let body = Box::new(self.resolve_statement(*body)?);
                self.exit_scope();
                Ok(Statement::For {
                    init,
                    condition,
                    post,
                    body,
                    label,
                })
            }
            Statement::Switch {
                condition,
                body,
                label,
            } => Ok(Statement::Switch {
                condition: self.resolve_expression(condition)?,
                body: Box::new(self.resolve_statement(*body)?),
                label,
            }),
            Statement::Case { value, body, label } => Ok(Statement::Case {
                // The value must stay a literal; validated later.
                value,
                body: self.resolve_block_items(body)?,
                label,
            }),
            Statement::Default { body, label } => Ok(Statement::Default {
                body: self.resolve_block_items(body)?,
                label,
            }),
            Statement::Labeled { label, statement } => Ok(Statement::Labeled {
                label,
                statement: Box::new(self.resolve_statement(*statement)?),
            }),
            s @ (Statement::Break { .. }
            | Statement::Continue { .. }
            | Statement::Goto(_)
            | Statement::Null) => Ok(s),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn resolve_expression(&mut self, expr: Expr) -> Result<Expr, SemanticError> {
        match expr {
            Expr::Constant(v) => Ok(Expr::Constant(v)),
            Expr::Var(name) => match self.lookup(&name) {
                Some(entry) => Ok(Expr::Var(entry.unique.clone())),
                None => Err(SemanticError::UndeclaredVariable(name)),
            },
            Expr::Assignment { op, lvalue, rvalue } => {
                if !matches!(*lvalue, Expr::Var(_)) {
                    return Err(SemanticError::InvalidLvalue);
                }
                Ok(Expr::Assignment {
                    op,
                    lvalue: Box::new(self.resolve_expression(*lvalue)?),
                    rvalue: Box::new(self.resolve_expression(*rvalue)?),
                })
            }
            Expr::Unary {
                op,
                operand,
                postfix,
            } => {
                if matches!(op, UnaryOp::Increment | UnaryOp::Decrement) {
                    check_increment_target(&operand)?;
                }
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(self.resolve_expression(*operand)?),
                    postfix,
                })
            }
            Expr::Binary { op, left, right } => Ok(Expr::Binary {
                op,
                left: Box::new(self.resolve_expression(*left)?),
                right: Box::new(self.resolve_expression(*right)?),
            }),
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => Ok(Expr::Conditional {
                condition: Box::new(self.resolve_expression(*condition)?),
                then_expr: Box::new(self.resolve_expression(*then_expr)?),
                else_expr: Box::new(self.resolve_expression(*else_expr)?),
            }),
            Expr::Call { name, args } => {
                let Some(entry) = self.lookup(&name) else {
                    return Err(SemanticError::UndeclaredFunction(name));
                };
                let name = entry.unique.clone();
                let args = args
                    .into_iter()
                    .map(|a| self.resolve_expression(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Call { name, args })
            }
        }
    }
}

/// `++`/`--` only ever applies to a plain variable; everything else gets
/// a diagnostic naming the offending shape.
fn check_increment_target(operand: &Expr) -> Result<(), SemanticError> {
    let found = match operand {
        Expr::Var(_) => return Ok(()),
        Expr::Constant(_) => "a constant",
        Expr::Binary { .. } => "a binary expression",
        Expr::Unary {
            op: UnaryOp::Increment | UnaryOp::Decrement,
            ..
        } => "another increment or decrement",
        Expr::Assignment { .. } => "an assignment",
        _ => return Err(SemanticError::InvalidLvalue),
    };
    Err(SemanticError::InvalidIncrementTarget { found })
}
