//! Control-flow labelling
//!
//! Attaches a fresh synthetic label to every loop, switch, case, and
//! default, and rewrites `break`/`continue` to carry the label of the
//! construct they leave. Also validates case/default placement, case
//! value uniqueness, and `goto`/label pairing, all per function.

use super::SemanticError;
use crate::ast::{Block, BlockItem, Declaration, Expr, Program, Statement};
use std::collections::HashSet;

pub(super) fn label(mut program: Program) -> Result<Program, SemanticError> {
    let mut labeler = Labeler::new();
    for function in &mut program.functions {
        labeler.defined_labels.clear();
        labeler.used_labels.clear();
        if let Some(body) = &mut function.body {
            labeler.label_block(body)?;
        }
        for used in &labeler.used_labels {
            if !labeler.defined_labels.contains(used) {
                return Err(SemanticError::UndefinedLabel(used.clone()));
            }
        }
    }
    Ok(program)
}

/// An enclosing construct a `break` or `continue` can target.
enum Target {
    Loop(String),
    Switch(String),
}

impl Target {
    fn label(&self) -> &str {
        match self {
            Target::Loop(l) | Target::Switch(l) => l,
        }
    }
}

struct Labeler {
    /// Shared by every label family, so labels are unique across kinds.
    counter: usize,
    /// Innermost enclosing loop/switch last.
    enclosing: Vec<Target>,
    /// Case values seen per active switch, innermost last.
    switch_values: Vec<HashSet<i64>>,
    /// Whether each active switch has seen its default yet.
    switch_defaults: Vec<bool>,
    /// Goto bookkeeping, reset per function.
    defined_labels: HashSet<String>,
    used_labels: HashSet<String>,
}

impl Labeler {
    fn new() -> Self {
        Labeler {
            counter: 0,
            enclosing: Vec::new(),
            switch_values: Vec::new(),
            switch_defaults: Vec::new(),
            defined_labels: HashSet::new(),
            used_labels: HashSet::new(),
        }
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let label = format!("_{}_{}", prefix, self.counter);
        self.counter += 1;
        label
    }

    fn label_block(&mut self, block: &mut Block) -> Result<(), SemanticError> {
        for item in &mut block.items {
            self.label_block_item(item)?;
        }
        Ok(())
    }

    fn label_block_item(&mut self, item: &mut BlockItem) -> Result<(), SemanticError> {
        match item {
            // Declarations cannot contain statements in this subset.
            BlockItem::Declaration(Declaration::Variable(_)) => Ok(()),
            BlockItem::Declaration(Declaration::Function(f)) => {
                // Nested declarations have no body; definitions were
                // rejected during resolution.
                debug_assert!(f.body.is_none());
                Ok(())
            }
            BlockItem::Statement(s) => self.label_statement(s),
        }
    }

    fn label_statement(&mut self, statement: &mut Statement) -> Result<(), SemanticError> {
        match statement {
            Statement::While { body, label, .. } => {
                let fresh = self.fresh("WHILE_LOOP");
                self.enclosing.push(Target::Loop(fresh.clone()));
                self.label_statement(body)?;
                self.enclosing.pop();
                *label = Some(fresh);
                Ok(())
            }
            Statement::DoWhile { body, label, .. } => {
                let fresh = self.fresh("DO_WHILE");
                self.enclosing.push(Target::Loop(fresh.clone()));
                self.label_statement(body)?;
                self.enclosing.pop();
                *label = Some(fresh);
                Ok(())
            }
            Statement::For { body, label, .. } => {
                let fresh = self.fresh("FOR_LOOP");
                self.enclosing.push(Target::Loop(fresh.clone()));
                self.label_statement(body)?;
                self.enclosing.pop();
                *label = Some(fresh);
                Ok(())
            }
            Statement::Switch { body, label, .. } => {
                let fresh = self.fresh("SWITCH");
                self.enclosing.push(Target::Switch(fresh.clone()));
                self.switch_values.push(HashSet::new());
                self.switch_defaults.push(false);
                self.label_statement(body)?;
                self.switch_defaults.pop();
                self.switch_values.pop();
                self.enclosing.pop();
                *label = Some(fresh);
                Ok(())
            }
            Statement::Break { label } => {
                let Some(target) = self.enclosing.last() else {
                    return Err(SemanticError::BreakOutsideLoop);
                };
                *label = Some(target.label().to_string());
                Ok(())
            }
            Statement::Continue { label } => {
                let target = self
                    .enclosing
                    .iter()
                    .rev()
                    .find(|t| matches!(t, Target::Loop(_)));
                let Some(target) = target else {
                    return Err(SemanticError::ContinueOutsideLoop);
                };
                *label = Some(target.label().to_string());
                Ok(())
            }
            Statement::Case { value, body, label } => {
                let Some(values) = self.switch_values.last_mut() else {
                    return Err(SemanticError::CaseOutsideSwitch);
                };
                let Expr::Constant(v) = value else {
                    return Err(SemanticError::NonConstantCase);
                };
                if !values.insert(*v) {
                    return Err(SemanticError::DuplicateCase(*v));
                }
                *label = Some(self.fresh("CASE"));
                for item in body {
                    self.label_block_item(item)?;
                }
                Ok(())
            }
            Statement::Default { body, label } => {
                let Some(has_default) = self.switch_defaults.last_mut() else {
                    return Err(SemanticError::DefaultOutsideSwitch);
                };
                if *has_default {
                    return Err(SemanticError::DuplicateDefault);
                }
                *has_default = true;
                *label = Some(self.fresh("DEFAULT"));
                for item in body {
                    self.label_block_item(item)?;
                }
                Ok(())
            }
            Statement::Labeled {
                label, statement, ..
            } => {
                if !self.defined_labels.insert(label.clone()) {
                    return Err(SemanticError::DuplicateLabel(label.clone()));
                }
                self.label_statement(statement)
            }
            Statement::Goto(target) => {
                self.used_labels.insert(target.clone());
                Ok(())
            }
            Statement::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.label_statement(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.label_statement(else_branch)?;
                }
                Ok(())
            }
            Statement::Compound(block) => self.label_block(block),
            Statement::Return(_)
            | Statement::Expression(_)
            | Statement::Null => Ok(()),
        }
    }
}
