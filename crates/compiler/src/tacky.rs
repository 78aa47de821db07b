//! Three-address intermediate representation ("tacky")
//!
//! A flat list of instructions per function. Operands are constants or
//! named variables; compiler temporaries are named `tmp.N` and assigned
//! exactly once. Control flow is explicit labels and jumps; the
//! structured statements of the tree are gone after this stage.

use crate::ast;
use crate::ast::{Block, BlockItem, Declaration, Expr, ForInit, Statement};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TackyProgram {
    pub functions: Vec<TackyFunction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TackyFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Instruction>,
}

/// An operand: a literal or a named slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Constant(i64),
    Var(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Return(Value),
    Unary {
        op: UnaryOp,
        src: Value,
        dst: Value,
    },
    Binary {
        op: BinaryOp,
        src1: Value,
        src2: Value,
        dst: Value,
    },
    Copy {
        src: Value,
        dst: Value,
    },
    Jump(String),
    JumpIfZero {
        condition: Value,
        target: String,
    },
    JumpIfNotZero {
        condition: Value,
        target: String,
    },
    Label(String),
    FunCall {
        name: String,
        args: Vec<Value>,
        dst: Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Complement,
    Negate,
    Not,
}

/// Instruction-level binary operators. The short-circuit operators do
/// not appear here; they are lowered to jumps during generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    BitAnd,
    BitOr,
    BitXor,
    LeftShiftLogical,
    RightShiftLogical,
    LeftShiftArithmetic,
    RightShiftArithmetic,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
}

impl BinaryOp {
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::GreaterThan
                | BinaryOp::LessOrEqual
                | BinaryOp::GreaterOrEqual
        )
    }
}

fn unary_op(op: ast::UnaryOp) -> UnaryOp {
    match op {
        ast::UnaryOp::Complement => UnaryOp::Complement,
        ast::UnaryOp::Negate => UnaryOp::Negate,
        ast::UnaryOp::Not => UnaryOp::Not,
        ast::UnaryOp::Increment | ast::UnaryOp::Decrement => {
            unreachable!("increment/decrement lower to add/subtract")
        }
    }
}

fn binary_op(op: ast::BinaryOp) -> BinaryOp {
    match op {
        ast::BinaryOp::Add => BinaryOp::Add,
        ast::BinaryOp::Subtract => BinaryOp::Subtract,
        ast::BinaryOp::Multiply => BinaryOp::Multiply,
        ast::BinaryOp::Divide => BinaryOp::Divide,
        ast::BinaryOp::Remainder => BinaryOp::Remainder,
        ast::BinaryOp::BitAnd => BinaryOp::BitAnd,
        ast::BinaryOp::BitOr => BinaryOp::BitOr,
        ast::BinaryOp::BitXor => BinaryOp::BitXor,
        ast::BinaryOp::LeftShiftLogical => BinaryOp::LeftShiftLogical,
        ast::BinaryOp::RightShiftLogical => BinaryOp::RightShiftLogical,
        ast::BinaryOp::LeftShiftArithmetic => BinaryOp::LeftShiftArithmetic,
        ast::BinaryOp::RightShiftArithmetic => BinaryOp::RightShiftArithmetic,
        ast::BinaryOp::Equal => BinaryOp::Equal,
        ast::BinaryOp::NotEqual => BinaryOp::NotEqual,
        ast::BinaryOp::LessThan => BinaryOp::LessThan,
        ast::BinaryOp::GreaterThan => BinaryOp::GreaterThan,
        ast::BinaryOp::LessOrEqual => BinaryOp::LessOrEqual,
        ast::BinaryOp::GreaterOrEqual => BinaryOp::GreaterOrEqual,
        ast::BinaryOp::LogicalAnd | ast::BinaryOp::LogicalOr => {
            unreachable!("short-circuit operators lower to jumps")
        }
    }
}

/// Lowers the validated tree to three-address code. Counters live here
/// and persist for a whole pipeline run, so temporaries and labels are
/// unique program-wide.
pub struct TackyGen {
    temp_counter: usize,
    label_counters: HashMap<String, usize>,
}

impl TackyGen {
    pub fn new() -> Self {
        TackyGen {
            temp_counter: 0,
            label_counters: HashMap::new(),
        }
    }

    pub fn generate(&mut self, program: &ast::Program) -> TackyProgram {
        let functions = program
            .functions
            .iter()
            .filter_map(|f| self.emit_function(f))
            .collect();
        TackyProgram { functions }
    }

    fn make_temporary(&mut self) -> Value {
        let n = self.temp_counter;
        self.temp_counter += 1;
        Value::Var(format!("tmp.{}", n))
    }

    fn make_label(&mut self, prefix: &str) -> String {
        let n = self.label_counters.entry(prefix.to_string()).or_insert(0);
        let label = format!("_{}_{}_", prefix, n);
        *n += 1;
        label
    }

    /// Declaration-only functions produce no code.
    fn emit_function(&mut self, function: &ast::FunctionDecl) -> Option<TackyFunction> {
        let body = function.body.as_ref()?;
        let mut instructions = Vec::new();
        self.emit_block(body, &mut instructions);
        // Falling off the end of a function returns 0.
        instructions.push(Instruction::Return(Value::Constant(0)));
        Some(TackyFunction {
            name: function.name.clone(),
            params: function.params.clone(),
            body: instructions,
        })
    }

    fn emit_block(&mut self, block: &Block, out: &mut Vec<Instruction>) {
        for item in &block.items {
            self.emit_block_item(item, out);
        }
    }

    fn emit_block_item(&mut self, item: &BlockItem, out: &mut Vec<Instruction>) {
        match item {
            BlockItem::Declaration(Declaration::Variable(decl)) => {
                if let Some(init) = &decl.init {
                    let value = self.emit_expr(init, out);
                    out.push(Instruction::Copy {
                        src: value,
                        dst: Value::Var(decl.name.clone()),
                    });
                }
            }
            // Nested function declarations carry no code.
            BlockItem::Declaration(Declaration::Function(_)) => {}
            BlockItem::Statement(s) => self.emit_statement(s, out),
        }
    }

    fn emit_statement(&mut self, statement: &Statement, out: &mut Vec<Instruction>) {
        match statement {
            Statement::Return(e) => {
                let value = self.emit_expr(e, out);
                out.push(Instruction::Return(value));
            }
            Statement::Expression(e) => {
                self.emit_expr(e, out);
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => self.emit_if(condition, then_branch, else_branch.as_deref(), out),
            Statement::Compound(block) => self.emit_block(block, out),
            Statement::While {
                condition,
                body,
                label,
            } => {
                let label = label.as_ref().expect("loop not labelled");
                let continue_label = format!("{}_CONTINUE", label);
                let break_label = format!("{}_BREAK", label);

                out.push(Instruction::Label(continue_label.clone()));
                let c = self.emit_expr(condition, out);
                out.push(Instruction::JumpIfZero {
                    condition: c,
                    target: break_label.clone(),
                });
                self.emit_statement(body, out);
                out.push(Instruction::Jump(continue_label));
                out.push(Instruction::Label(break_label));
            }
            Statement::DoWhile {
                body,
                condition,
                label,
            } => {
                let label = label.as_ref().expect("loop not labelled");
                let start_label = format!("{}_START", label);
                let continue_label = format!("{}_CONTINUE", label);
                let break_label = format!("{}_BREAK", label);

                out.push(Instruction::Label(start_label.clone()));
                self.emit_statement(body, out);
                out.push(Instruction::Label(continue_label));
                let c = self.emit_expr(condition, out);
                out.push(Instruction::JumpIfNotZero {
                    condition: c,
                    target: start_label,
                });
                out.push(Instruction::Label(break_label));
            }
            Statement::For {
                init,
                condition,
                post,
                body,
                label,
            } => {
                let label = label.as_ref().expect("loop not labelled");
                let start_label = format!("{}_START", label);
                let continue_label = format!("{}_CONTINUE", label);
                let break_label = format!("{}_BREAK", label);

                match init {
                    ForInit::Declaration(decl) => {
                        if let Some(init) = &decl.init {
                            let value = self.emit_expr(init, out);
                            out.push(Instruction::Copy {
                                src: value,
                                dst: Value::Var(decl.name.clone()),
                            });
                        }
                    }
                    ForInit::Expression(Some(e)) => {
                        self.emit_expr(e, out);
                    }
                    ForInit::Expression(None) => {}
                }
                out.push(Instruction::Label(start_label.clone()));
                if let Some(condition) = condition {
                    let c = self.emit_expr(condition, out);
                    out.push(Instruction::JumpIfZero {
                        condition: c,
                        target: break_label.clone(),
                    });
                }
                self.emit_statement(body, out);
                out.push(Instruction::Label(continue_label));
                if let Some(post) = post {
                    self.emit_expr(post, out);
                }
                out.push(Instruction::Jump(start_label));
                out.push(Instruction::Label(break_label));
            }
            Statement::Break { label } => {
                let label = label.as_ref().expect("break not labelled");
                out.push(Instruction::Jump(format!("{}_BREAK", label)));
            }
            Statement::Continue { label } => {
                let label = label.as_ref().expect("continue not labelled");
                out.push(Instruction::Jump(format!("{}_CONTINUE", label)));
            }
            Statement::Switch {
                condition,
                body,
                label,
            } => self.emit_switch(condition, body, label.as_deref(), out),
            Statement::Case { body, label, .. } => {
                out.push(Instruction::Label(
                    label.clone().expect("case not labelled"),
                ));
                for item in body {
                    self.emit_block_item(item, out);
                }
            }
            Statement::Default { body, label } => {
                out.push(Instruction::Label(
                    label.clone().expect("default not labelled"),
                ));
                for item in body {
                    self.emit_block_item(item, out);
                }
            }
            Statement::Goto(target) => {
                out.push(Instruction::Jump(target.clone()));
            }
            Statement::Labeled { label, statement } => {
                out.push(Instruction::Label(label.clone()));
                self.emit_statement(statement, out);
            }
            Statement::Null => {}
        }
    }

    fn emit_if(
        &mut self,
        condition: &Expr,
        then_branch: &Statement,
        else_branch: Option<&Statement>,
        out: &mut Vec<Instruction>,
    ) {
        let c = self.emit_expr(condition, out);
        match else_branch {
            None => {
                let end_label = self.make_label("IF_END");
                out.push(Instruction::JumpIfZero {
                    condition: c,
                    target: end_label.clone(),
                });
                self.emit_statement(then_branch, out);
                out.push(Instruction::Label(end_label));
            }
            Some(else_branch) => {
                let else_label = self.make_label("IF_ELSE");
                let end_label = self.make_label("IF_END");
                out.push(Instruction::JumpIfZero {
                    condition: c,
                    target: else_label.clone(),
                });
                self.emit_statement(then_branch, out);
                out.push(Instruction::Jump(end_label.clone()));
                out.push(Instruction::Label(else_label));
                self.emit_statement(else_branch, out);
                out.push(Instruction::Label(end_label));
            }
        }
    }

    /// A switch compares the scrutinee against each case value in turn,
    /// then falls through to the default (or past the whole statement).
    /// The body is emitted inline; its case and default markers become
    /// plain labels.
    fn emit_switch(
        &mut self,
        condition: &Expr,
        body: &Statement,
        label: Option<&str>,
        out: &mut Vec<Instruction>,
    ) {
        let label = label.expect("switch not labelled");
        let break_label = format!("{}_BREAK", label);

        let value = self.emit_expr(condition, out);
        let (cases, default) = collect_switch_targets(body);

        for (case_value, case_label) in cases {
            let matched = self.make_temporary();
            out.push(Instruction::Binary {
                op: BinaryOp::Equal,
                src1: value.clone(),
                src2: Value::Constant(case_value),
                dst: matched.clone(),
            });
            out.push(Instruction::JumpIfNotZero {
                condition: matched,
                target: case_label,
            });
        }
        match default {
            Some(default_label) => out.push(Instruction::Jump(default_label)),
            None => out.push(Instruction::Jump(break_label.clone())),
        }

        self.emit_statement(body, out);
        out.push(Instruction::Label(break_label));
    }

    fn emit_expr(&mut self, expr: &Expr, out: &mut Vec<Instruction>) -> Value {
        match expr {
            Expr::Constant(v) => Value::Constant(*v),
            Expr::Var(name) => Value::Var(name.clone()),
            Expr::Unary {
                op: ast::UnaryOp::Increment,
                operand,
                postfix,
            } => self.emit_increment(operand, BinaryOp::Add, *postfix, out),
            Expr::Unary {
                op: ast::UnaryOp::Decrement,
                operand,
                postfix,
            } => self.emit_increment(operand, BinaryOp::Subtract, *postfix, out),
            Expr::Unary { op, operand, .. } => {
                let src = self.emit_expr(operand, out);
                let dst = self.make_temporary();
                out.push(Instruction::Unary {
                    op: unary_op(*op),
                    src,
                    dst: dst.clone(),
                });
                dst
            }
            Expr::Binary {
                op: ast::BinaryOp::LogicalAnd,
                left,
                right,
            } => self.emit_logical_and(left, right, out),
            Expr::Binary {
                op: ast::BinaryOp::LogicalOr,
                left,
                right,
            } => self.emit_logical_or(left, right, out),
            Expr::Binary { op, left, right } => {
                let src1 = self.emit_expr(left, out);
                let src2 = self.emit_expr(right, out);
                let dst = self.make_temporary();
                out.push(Instruction::Binary {
                    op: binary_op(*op),
                    src1,
                    src2,
                    dst: dst.clone(),
                });
                dst
            }
            Expr::Assignment { op, lvalue, rvalue } => {
                let Expr::Var(name) = lvalue.as_ref() else {
                    unreachable!("assignment target validated as a variable");
                };
                let target = Value::Var(name.clone());
                match op.binary_op() {
                    None => {
                        let value = self.emit_expr(rvalue, out);
                        out.push(Instruction::Copy {
                            src: value,
                            dst: target.clone(),
                        });
                    }
                    Some(op) => {
                        let rhs = self.emit_expr(rvalue, out);
                        let result = self.make_temporary();
                        out.push(Instruction::Binary {
                            op: binary_op(op),
                            src1: target.clone(),
                            src2: rhs,
                            dst: result.clone(),
                        });
                        out.push(Instruction::Copy {
                            src: result,
                            dst: target.clone(),
                        });
                    }
                }
                target
            }
            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let else_label = self.make_label("CONDITIONAL_ELSE");
                let end_label = self.make_label("CONDITIONAL_END");
                let result = self.make_temporary();

                let c = self.emit_expr(condition, out);
                out.push(Instruction::JumpIfZero {
                    condition: c,
                    target: else_label.clone(),
                });
                let then_value = self.emit_expr(then_expr, out);
                out.push(Instruction::Copy {
                    src: then_value,
                    dst: result.clone(),
                });
                out.push(Instruction::Jump(end_label.clone()));
                out.push(Instruction::Label(else_label));
                let else_value = self.emit_expr(else_expr, out);
                out.push(Instruction::Copy {
                    src: else_value,
                    dst: result.clone(),
                });
                out.push(Instruction::Label(end_label));
                result
            }
            Expr::Call { name, args } => {
                let args = args.iter().map(|a| self.emit_expr(a, out)).collect();
                let dst = self.make_temporary();
                out.push(Instruction::FunCall {
                    name: name.clone(),
                    args,
                    dst: dst.clone(),
                });
                dst
            }
        }
    }

    /// Prefix forms yield the updated variable; postfix forms copy the
    /// old value into a temporary first and yield that.
    fn emit_increment(
        &mut self,
        operand: &Expr,
        op: BinaryOp,
        postfix: bool,
        out: &mut Vec<Instruction>,
    ) -> Value {
        let Expr::Var(name) = operand else {
            unreachable!("increment target validated as a variable");
        };
        let var = Value::Var(name.clone());

        let result = if postfix {
            let old = self.make_temporary();
            out.push(Instruction::Copy {
                src: var.clone(),
                dst: old.clone(),
            });
            old
        } else {
            var.clone()
        };

        out.push(Instruction::Binary {
            op,
            src1: var.clone(),
            src2: Value::Constant(1),
            dst: var,
        });
        result
    }

    fn emit_logical_and(&mut self, left: &Expr, right: &Expr, out: &mut Vec<Instruction>) -> Value {
        let false_label = self.make_label("AND_FALSE");
        let end_label = self.make_label("AND_END");
        let dst = self.make_temporary();

        let v1 = self.emit_expr(left, out);
        out.push(Instruction::JumpIfZero {
            condition: v1,
            target: false_label.clone(),
        });
        let v2 = self.emit_expr(right, out);
        out.push(Instruction::JumpIfZero {
            condition: v2,
            target: false_label.clone(),
        });
        out.push(Instruction::Copy {
            src: Value::Constant(1),
            dst: dst.clone(),
        });
        out.push(Instruction::Jump(end_label.clone()));
        out.push(Instruction::Label(false_label));
        out.push(Instruction::Copy {
            src: Value::Constant(0),
            dst: dst.clone(),
        });
        out.push(Instruction::Label(end_label));
        dst
    }

    fn emit_logical_or(&mut self, left: &Expr, right: &Expr, out: &mut Vec<Instruction>) -> Value {
        let true_label = self.make_label("OR_TRUE");
        let end_label = self.make_label("OR_END");
        let dst = self.make_temporary();

        let v1 = self.emit_expr(left, out);
        out.push(Instruction::JumpIfNotZero {
            condition: v1,
            target: true_label.clone(),
        });
        let v2 = self.emit_expr(right, out);
        out.push(Instruction::JumpIfNotZero {
            condition: v2,
            target: true_label.clone(),
        });
        out.push(Instruction::Copy {
            src: Value::Constant(0),
            dst: dst.clone(),
        });
        out.push(Instruction::Jump(end_label.clone()));
        out.push(Instruction::Label(true_label));
        out.push(Instruction::Copy {
            src: Value::Constant(1),
            dst: dst.clone(),
        });
        out.push(Instruction::Label(end_label));
        dst
    }
}

impl Default for TackyGen {
    fn default() -> Self {
        TackyGen::new()
    }
}

/// Collect `(value, label)` for each case plus the default label by
/// walking a switch body. Nested switches keep their markers to
/// themselves, so their subtrees are skipped.
fn collect_switch_targets(body: &Statement) -> (Vec<(i64, String)>, Option<String>) {
    let mut cases = Vec::new();
    let mut default = None;
    collect_from_statement(body, &mut cases, &mut default);
    (cases, default)
}

fn collect_from_statement(
    statement: &Statement,
    cases: &mut Vec<(i64, String)>,
    default: &mut Option<String>,
) {
    match statement {
        Statement::Case { value, body, label } => {
            let Expr::Constant(v) = value else {
                unreachable!("case value validated as a constant");
            };
            cases.push((*v, label.clone().expect("case not labelled")));
            for item in body {
                collect_from_item(item, cases, default);
            }
        }
        Statement::Default { body, label } => {
            *default = Some(label.clone().expect("default not labelled"));
            for item in body {
                collect_from_item(item, cases, default);
            }
        }
        // A nested switch owns its cases.
        Statement::Switch { .. } => {}
        Statement::Compound(block) => {
            for item in &block.items {
                collect_from_item(item, cases, default);
            }
        }
        Statement::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_from_statement(then_branch, cases, default);
            if let Some(else_branch) = else_branch {
                collect_from_statement(else_branch, cases, default);
            }
        }
        Statement::While { body, .. }
        | Statement::DoWhile { body, .. }
        | Statement::For { body, .. } => collect_from_statement(body, cases, default),
        Statement::Labeled { statement, .. } => collect_from_statement(statement, cases, default),
        Statement::Return(_)
        | Statement::Expression(_)
        | Statement::Break { .. }
        | Statement::Continue { .. }
        | Statement::Goto(_)
        | Statement::Null => {}
    }
}

fn collect_from_item(
    item: &BlockItem,
    cases: &mut Vec<(i64, String)>,
    default: &mut Option<String>,
) {
    if let BlockItem::Statement(s) = item {
        collect_from_statement(s, cases, default);
    }
}
