//! Recursive-descent parser
//!
//! Declarations and statements are parsed by straightforward recursive
//! descent; expressions use precedence climbing. Assignment and the
//! conditional operator recurse at their own precedence (right
//! associative), every other binary operator recurses one level tighter
//! (left associative).

use crate::ast::{
    AssignOp, BinaryOp, Block, BlockItem, Declaration, Expr, ForInit, FunctionDecl, Program,
    Statement, UnaryOp, VariableDecl,
};
use crate::lexer::{Token, TokenKind};
use std::fmt;

/// A token mismatch against the grammar.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// What the grammar called for at this point.
    pub expected: String,
    /// The token actually seen, or `None` at end of input.
    pub got: Option<Token>,
}

impl ParseError {
    fn new(expected: impl Into<String>, got: Option<&Token>) -> Self {
        ParseError {
            expected: expected.into(),
            got: got.cloned(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.got {
            Some(token) => write!(f, "expected {}, got {}", self.expected, token),
            None => write!(f, "expected {}, got end of input", self.expected),
        }
    }
}

impl std::error::Error for ParseError {}

/// Binding power of a binary, conditional, or assignment operator token.
/// Higher binds tighter. `None` for tokens that cannot continue an
/// expression.
fn binary_precedence(kind: TokenKind) -> Option<u8> {
    use TokenKind::*;
    let prec = match kind {
        Assign | PlusAssign | MinusAssign | StarAssign | SlashAssign | PercentAssign
        | AndAssign | OrAssign | XorAssign | LeftShiftAssign | RightShiftAssign => 3,
        QuestionMark => 4,
        LogicalOr => 5,
        LogicalAnd => 6,
        Pipe => 8,
        Caret => 9,
        Ampersand => 10,
        EqualEqual | NotEqual => 12,
        Less | LessEqual | Greater | GreaterEqual => 13,
        LeftShift | RightShift => 14,
        Plus | Minus => 15,
        Star | Slash | Percent => 16,
        _ => return None,
    };
    Some(prec)
}

fn assign_op(kind: TokenKind) -> Option<AssignOp> {
    use TokenKind::*;
    let op = match kind {
        Assign => AssignOp::Assign,
        PlusAssign => AssignOp::AddAssign,
        MinusAssign => AssignOp::SubAssign,
        StarAssign => AssignOp::MulAssign,
        SlashAssign => AssignOp::DivAssign,
        PercentAssign => AssignOp::RemAssign,
        AndAssign => AssignOp::AndAssign,
        OrAssign => AssignOp::OrAssign,
        XorAssign => AssignOp::XorAssign,
        LeftShiftAssign => AssignOp::LeftShiftAssign,
        RightShiftAssign => AssignOp::RightShiftAssign,
        _ => return None,
    };
    Some(op)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut functions = Vec::new();
        while !self.is_at_end() {
            functions.push(self.parse_function_decl()?);
        }
        Ok(Program { functions })
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_function_decl(&mut self) -> Result<FunctionDecl, ParseError> {
        self.expect(TokenKind::Int)?;
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::OpenParen)?;
        let params = self.parse_param_list()?;
        self.expect(TokenKind::CloseParen)?;

        let body = if self.check(TokenKind::Semicolon) {
            self.advance();
            None
        } else {
            Some(self.parse_block()?)
        };

        Ok(FunctionDecl { name, params, body })
    }

    /// `void`, an empty list, or `int name (, int name)*`.
    fn parse_param_list(&mut self) -> Result<Vec<String>, ParseError> {
        if self.check(TokenKind::Void) {
            self.advance();
            return Ok(Vec::new());
        }
        if self.check(TokenKind::CloseParen) {
            return Ok(Vec::new());
        }

        let mut params = Vec::new();
        self.expect(TokenKind::Int)?;
        params.push(self.expect(TokenKind::Identifier)?.lexeme);
        while self.check(TokenKind::Comma) {
            self.advance();
            self.expect(TokenKind::Int)?;
            params.push(self.expect(TokenKind::Identifier)?.lexeme);
        }
        Ok(params)
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect(TokenKind::OpenBrace)?;
        let mut items = Vec::new();
        while !self.check(TokenKind::CloseBrace) {
            if self.is_at_end() {
                return Err(ParseError::new("'}'", None));
            }
            items.push(self.parse_block_item()?);
        }
        self.expect(TokenKind::CloseBrace)?;
        Ok(Block { items })
    }

    fn parse_block_item(&mut self) -> Result<BlockItem, ParseError> {
        if self.check(TokenKind::Int) {
            Ok(BlockItem::Declaration(self.parse_declaration()?))
        } else {
            Ok(BlockItem::Statement(self.parse_statement()?))
        }
    }

    /// A declaration starting at `int`. `int name (` opens a nested
    /// function declaration, anything else is a variable.
    fn parse_declaration(&mut self) -> Result<Declaration, ParseError> {
        if self.peek_kind_at(2) == Some(TokenKind::OpenParen) {
            return Ok(Declaration::Function(self.parse_function_decl()?));
        }
        Ok(Declaration::Variable(self.parse_variable_decl()?))
    }

    fn parse_variable_decl(&mut self) -> Result<VariableDecl, ParseError> {
        self.expect(TokenKind::Int)?;
        let name = self.expect(TokenKind::Identifier)?.lexeme;
        let init = if self.check(TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression(0)?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(VariableDecl { name, init })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let Some(kind) = self.peek_kind() else {
            return Err(ParseError::new("statement", None));
        };

        match kind {
            TokenKind::Return => {
                self.advance();
                let expr = self.parse_expression(0)?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Return(expr))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::OpenBrace => Ok(Statement::Compound(self.parse_block()?)),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Break { label: None })
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Continue { label: None })
            }
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Case => self.parse_case(),
            TokenKind::Default => self.parse_default(),
            TokenKind::Goto => {
                self.advance();
                let label = self.expect(TokenKind::Identifier)?.lexeme;
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Goto(label))
            }
            TokenKind::Identifier if self.peek_kind_at(1) == Some(TokenKind::Colon) => {
                self.parse_labeled()
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Statement::Null)
            }
            _ => {
                let expr = self.parse_expression(0)?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Expression(expr))
            }
        }
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::OpenParen)?;
        let condition = self.parse_expression(0)?;
        self.expect(TokenKind::CloseParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.check(TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::OpenParen)?;
        let condition = self.parse_expression(0)?;
        self.expect(TokenKind::CloseParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::While {
            condition,
            body,
            label: None,
        })
    }

    fn parse_do_while(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::OpenParen)?;
        let condition = self.parse_expression(0)?;
        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::DoWhile {
            body,
            condition,
            label: None,
        })
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::OpenParen)?;

        // The init clause owns its semicolon when it is a declaration.
        let init = if self.check(TokenKind::Int) {
            ForInit::Declaration(self.parse_variable_decl()?)
        } else if self.check(TokenKind::Semicolon) {
            self.advance();
            ForInit::Expression(None)
        } else {
            let expr = self.parse_expression(0)?;
            self.expect(TokenKind::Semicolon)?;
            ForInit::Expression(Some(expr))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.expect(TokenKind::Semicolon)?;

        let post = if self.check(TokenKind::CloseParen) {
            None
        } else {
            Some(self.parse_expression(0)?)
        };
        self.expect(TokenKind::CloseParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(Statement::For {
            init,
            condition,
            post,
            body,
            label: None,
        })
    }

    fn parse_switch(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::Switch)?;
        self.expect(TokenKind::OpenParen)?;
        let condition = self.parse_expression(0)?;
        self.expect(TokenKind::CloseParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Statement::Switch {
            condition,
            body,
            label: None,
        })
    }

    fn parse_case(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::Case)?;
        let value = self.parse_expression(0)?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_case_body()?;
        Ok(Statement::Case {
            value,
            body,
            label: None,
        })
    }

    fn parse_default(&mut self) -> Result<Statement, ParseError> {
        self.expect(TokenKind::Default)?;
        self.expect(TokenKind::Colon)?;
        let body = self.parse_case_body()?;
        Ok(Statement::Default { body, label: None })
    }

    /// Everything between a case/default marker and the next one (or the
    /// end of the switch block).
    fn parse_case_body(&mut self) -> Result<Vec<BlockItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            match self.peek_kind() {
                None => return Err(ParseError::new("'}'", None)),
                Some(TokenKind::Case | TokenKind::Default | TokenKind::CloseBrace) => break,
                Some(_) => items.push(self.parse_block_item()?),
            }
        }
        Ok(items)
    }

    fn parse_labeled(&mut self) -> Result<Statement, ParseError> {
        let label = self.expect(TokenKind::Identifier)?.lexeme;
        self.expect(TokenKind::Colon)?;

        match self.peek_kind() {
            // A label must precede a statement, not a declaration and not
            // the end of the block.
            Some(TokenKind::Int) | Some(TokenKind::CloseBrace) | None => {
                Err(ParseError::new("statement after label", self.peek()))
            }
            Some(TokenKind::Semicolon) => {
                self.advance();
                Ok(Statement::Labeled {
                    label,
                    statement: Box::new(Statement::Null),
                })
            }
            Some(_) => Ok(Statement::Labeled {
                label,
                statement: Box::new(self.parse_statement()?),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expression(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;

        loop {
            let Some(kind) = self.peek_kind() else { break };
            let Some(prec) = binary_precedence(kind) else {
                break;
            };
            if prec < min_prec {
                break;
            }

            if let Some(op) = assign_op(kind) {
                self.advance();
                let rvalue = self.parse_expression(prec)?;
                left = Expr::Assignment {
                    op,
                    lvalue: Box::new(left),
                    rvalue: Box::new(rvalue),
                };
            } else if kind == TokenKind::QuestionMark {
                let then_expr = self.parse_conditional_middle()?;
                let else_expr = self.parse_expression(prec)?;
                left = Expr::Conditional {
                    condition: Box::new(left),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                };
            } else {
                let op = self.binary_op_for(kind, &left);
                self.advance();
                let right = self.parse_expression(prec + 1)?;
                left = Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
        }

        Ok(left)
    }

    fn parse_conditional_middle(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::QuestionMark)?;
        let middle = self.parse_expression(0)?;
        self.expect(TokenKind::Colon)?;
        Ok(middle)
    }

    /// Map an operator token to its AST operator. A shift whose left
    /// operand is a unary negation is tagged arithmetic; everywhere else
    /// the logical form is used.
    fn binary_op_for(&self, kind: TokenKind, left: &Expr) -> BinaryOp {
        let negated_left = matches!(
            left,
            Expr::Unary {
                op: UnaryOp::Negate,
                ..
            }
        );
        match kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::Percent => BinaryOp::Remainder,
            TokenKind::Ampersand => BinaryOp::BitAnd,
            TokenKind::Pipe => BinaryOp::BitOr,
            TokenKind::Caret => BinaryOp::BitXor,
            TokenKind::LeftShift if negated_left => BinaryOp::LeftShiftArithmetic,
            TokenKind::LeftShift => BinaryOp::LeftShiftLogical,
            TokenKind::RightShift if negated_left => BinaryOp::RightShiftArithmetic,
            TokenKind::RightShift => BinaryOp::RightShiftLogical,
            TokenKind::LogicalAnd => BinaryOp::LogicalAnd,
            TokenKind::LogicalOr => BinaryOp::LogicalOr,
            TokenKind::EqualEqual => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::LessThan,
            TokenKind::Greater => BinaryOp::GreaterThan,
            TokenKind::LessEqual => BinaryOp::LessOrEqual,
            TokenKind::GreaterEqual => BinaryOp::GreaterOrEqual,
            _ => unreachable!("token {:?} has a precedence but no operator", kind),
        }
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let Some(kind) = self.peek_kind() else {
            return Err(ParseError::new("expression", None));
        };

        match kind {
            TokenKind::Constant => {
                let token = self.advance().expect("constant was just peeked");
                let value = token
                    .lexeme
                    .parse::<i64>()
                    .map_err(|_| ParseError::new("integer constant", Some(&token)))?;
                Ok(Expr::Constant(value))
            }
            TokenKind::Tilde
            | TokenKind::Minus
            | TokenKind::Bang
            | TokenKind::Increment
            | TokenKind::Decrement => {
                let op = match kind {
                    TokenKind::Tilde => UnaryOp::Complement,
                    TokenKind::Minus => UnaryOp::Negate,
                    TokenKind::Bang => UnaryOp::Not,
                    TokenKind::Increment => UnaryOp::Increment,
                    _ => UnaryOp::Decrement,
                };
                self.advance();
                let mut operand = self.parse_factor()?;
                // `-x++` binds the postfix operator to the inner factor.
                if let Some(postfix) = self.peek_postfix_op() {
                    self.advance();
                    operand = Expr::Unary {
                        op: postfix,
                        operand: Box::new(operand),
                        postfix: true,
                    };
                }
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                    postfix: false,
                })
            }
            TokenKind::OpenParen => {
                self.advance();
                let inner = self.parse_expression(0)?;
                self.expect(TokenKind::CloseParen)?;
                Ok(inner)
            }
            TokenKind::Identifier => {
                let name = self.advance().expect("identifier was just peeked").lexeme;
                if self.check(TokenKind::OpenParen) {
                    return self.parse_call(name);
                }
                if let Some(postfix) = self.peek_postfix_op() {
                    self.advance();
                    return Ok(Expr::Unary {
                        op: postfix,
                        operand: Box::new(Expr::Var(name)),
                        postfix: true,
                    });
                }
                Ok(Expr::Var(name))
            }
            _ => Err(ParseError::new("expression", self.peek())),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ParseError> {
        self.expect(TokenKind::OpenParen)?;
        let mut args = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            args.push(self.parse_expression(0)?);
            while self.check(TokenKind::Comma) {
                self.advance();
                args.push(self.parse_expression(0)?);
            }
        }
        self.expect(TokenKind::CloseParen)?;
        Ok(Expr::Call { name, args })
    }

    fn peek_postfix_op(&self) -> Option<UnaryOp> {
        match self.peek_kind() {
            Some(TokenKind::Increment) => Some(UnaryOp::Increment),
            Some(TokenKind::Decrement) => Some(UnaryOp::Decrement),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| t.kind)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance().expect("token was just peeked"))
        } else {
            Err(ParseError::new(kind.to_string(), self.peek()))
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}
