// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! A Pratt parser turning a token stream into the `selina-ast` tree,
//! giving the `selina` binary a `parse(source) -> program | errors`
//! to hand the analyzer.

use selina_ast::{Expr, InfixOp, PrefixOp, Program, Stmt};

use crate::lexer::{Lexer, Token};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError(pub String);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum Precedence {
    Lowest,
    Assign,
    LogicalOr,
    LogicalAnd,
    Equals,
    LessGreater,
    BitOr,
    BitXor,
    BitAnd,
    Shift,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn precedence_of(token: &Token) -> Precedence {
    match token {
        Token::Assign => Precedence::Assign,
        Token::PipePipe => Precedence::LogicalOr,
        Token::AmpAmp => Precedence::LogicalAnd,
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt | Token::Gte | Token::Lte => Precedence::LessGreater,
        Token::Pipe => Precedence::BitOr,
        Token::Caret => Precedence::BitXor,
        Token::Amp => Precedence::BitAnd,
        Token::Lsh | Token::Rsh => Precedence::Shift,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Asterisk | Token::Slash | Token::SlashSlash | Token::Percent => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

pub struct Parser {
    lexer: Lexer,
    current: Token,
    peek: Token,
    errors: Vec<ParseError>,
}

pub fn parse(source: &str) -> Result<Program, Vec<ParseError>> {
    let mut parser = Parser::new(Lexer::new(source));
    let program = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(program)
    } else {
        Err(parser.errors)
    }
}

impl Parser {
    fn new(mut lexer: Lexer) -> Self {
        let current = lexer.next_token();
        let peek = lexer.next_token();
        Parser {
            lexer,
            current,
            peek,
            errors: Vec::new(),
        }
    }

    fn advance(&mut self) {
        self.current = std::mem::replace(&mut self.peek, self.lexer.next_token());
    }

    fn expect_peek(&mut self, expected: &Token) -> bool {
        if std::mem::discriminant(&self.peek) == std::mem::discriminant(expected) {
            self.advance();
            true
        } else {
            self.errors.push(ParseError(format!(
                "expected next token to be {expected}, got {} instead",
                self.peek
            )));
            false
        }
    }

    fn parse_program(&mut self) -> Program {
        let mut statements = Vec::new();
        while self.current != Token::Eof {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.advance();
                }
            }
            self.advance();
        }
        Program { statements }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.current {
            Token::Let => self.parse_let_statement(),
            Token::Return => self.parse_return_statement(),
            Token::Break => Ok(Stmt::Break),
            Token::Continue => Ok(Stmt::Continue),
            Token::While => self.parse_while_statement(),
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            _ => {
                let expr = self.parse_expression(Precedence::Lowest)?;
                if self.peek == Token::Semicolon {
                    self.advance();
                }
                Ok(Stmt::Expression(expr))
            }
        }
    }

    fn parse_let_statement(&mut self) -> Result<Stmt, ParseError> {
        if !self.expect_peek(&Token::Identifier(String::new())) {
            return Err(ParseError("expected identifier after let".to_string()));
        }
        let name = self.current_identifier()?;
        if !self.expect_peek(&Token::Assign) {
            return Err(ParseError("expected = in let statement".to_string()));
        }
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        if self.peek == Token::Semicolon {
            self.advance();
        }
        Ok(Stmt::Let { name, value })
    }

    fn parse_return_statement(&mut self) -> Result<Stmt, ParseError> {
        if self.peek == Token::Semicolon || self.peek == Token::RBrace {
            if self.peek == Token::Semicolon {
                self.advance();
            }
            return Ok(Stmt::Return(None));
        }
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        if self.peek == Token::Semicolon {
            self.advance();
        }
        Ok(Stmt::Return(Some(value)))
    }

    fn parse_while_statement(&mut self) -> Result<Stmt, ParseError> {
        if !self.expect_peek(&Token::LParen) {
            return Err(ParseError("expected ( after while".to_string()));
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&Token::RParen) {
            return Err(ParseError("expected ) after while condition".to_string()));
        }
        if !self.expect_peek(&Token::LBrace) {
            return Err(ParseError("expected { after while (...)".to_string()));
        }
        let body = self.parse_block()?;
        Ok(Stmt::While { condition, body })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        self.advance();
        while self.current != Token::RBrace && self.current != Token::Eof {
            statements.push(self.parse_statement()?);
            self.advance();
        }
        Ok(statements)
    }

    fn current_identifier(&self) -> Result<String, ParseError> {
        match &self.current {
            Token::Identifier(name) => Ok(name.clone()),
            other => Err(ParseError(format!("expected identifier, got {other}"))),
        }
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix()?;
        while self.peek != Token::Semicolon && precedence < precedence_of(&self.peek) {
            if !has_infix(&self.peek) {
                break;
            }
            self.advance();
            left = self.parse_infix(left)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.current.clone() {
            Token::Identifier(name) => Ok(Expr::Identifier(name)),
            Token::Integer(value) => Ok(Expr::IntegerLiteral(value)),
            Token::Decimal(value) => Ok(Expr::DecimalLiteral(value)),
            Token::StringLiteral(value) => Ok(Expr::StringLiteral(value)),
            Token::True => Ok(Expr::BooleanLiteral(true)),
            Token::False => Ok(Expr::BooleanLiteral(false)),
            Token::Bang => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::Unary {
                    op: PrefixOp::Bang,
                    right: Box::new(right),
                })
            }
            Token::Minus => {
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Ok(Expr::Unary {
                    op: PrefixOp::Minus,
                    right: Box::new(right),
                })
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression(Precedence::Lowest)?;
                if !self.expect_peek(&Token::RParen) {
                    return Err(ParseError("expected )".to_string()));
                }
                Ok(expr)
            }
            Token::LBracket => {
                let items = self.parse_expression_list(Token::RBracket)?;
                Ok(Expr::ArrayLiteral(items))
            }
            Token::LBrace => self.parse_hash_literal(),
            Token::If => self.parse_if_expression(),
            Token::Fn => self.parse_function_literal(),
            other => Err(ParseError(format!("no prefix parse function for {other}"))),
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr, ParseError> {
        match &self.current {
            Token::LParen => self.parse_call_expression(left),
            Token::LBracket => self.parse_index_expression(left),
            Token::Assign => self.parse_assign_expression(left),
            _ => self.parse_binary_expression(left),
        }
    }

    fn parse_binary_expression(&mut self, left: Expr) -> Result<Expr, ParseError> {
        let (op, swap_operands) = match self.current {
            Token::Plus => (InfixOp::Add, false),
            Token::Minus => (InfixOp::Sub, false),
            Token::Asterisk => (InfixOp::Mul, false),
            Token::Slash => (InfixOp::Div, false),
            Token::SlashSlash => (InfixOp::FloorDiv, false),
            Token::Percent => (InfixOp::Mod, false),
            Token::Amp => (InfixOp::BitAnd, false),
            Token::Pipe => (InfixOp::BitOr, false),
            Token::Caret => (InfixOp::BitXor, false),
            Token::Lsh => (InfixOp::Lsh, false),
            Token::Rsh => (InfixOp::Rsh, false),
            Token::AmpAmp => (InfixOp::LogicalAnd, false),
            Token::PipePipe => (InfixOp::LogicalOr, false),
            Token::Eq => (InfixOp::Eq, false),
            Token::NotEq => (InfixOp::NotEq, false),
            Token::Gt => (InfixOp::Gt, false),
            Token::Lt => (InfixOp::Lt, false),
            Token::Gte => (InfixOp::Gte, false),
            // `a <= b` has no dedicated opcode; it is `b >= a`, the same
            // swap the compiler already performs for bare `<`.
            Token::Lte => (InfixOp::Gte, true),
            ref other => return Err(ParseError(format!("{other} is not a binary operator"))),
        };
        let precedence = precedence_of(&self.current);
        self.advance();
        let right = self.parse_expression(precedence)?;
        let (left, right) = if swap_operands { (right, left) } else { (left, right) };
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_assign_expression(&mut self, left: Expr) -> Result<Expr, ParseError> {
        let Expr::Identifier(name) = left else {
            return Err(ParseError("left-hand side of = must be an identifier".to_string()));
        };
        self.advance();
        let value = self.parse_expression(Precedence::Assign)?;
        Ok(Expr::Assign {
            name,
            value: Box::new(value),
        })
    }

    fn parse_call_expression(&mut self, callee: Expr) -> Result<Expr, ParseError> {
        let args = self.parse_expression_list(Token::RParen)?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
        })
    }

    fn parse_index_expression(&mut self, left: Expr) -> Result<Expr, ParseError> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&Token::RBracket) {
            return Err(ParseError("expected ]".to_string()));
        }
        Ok(Expr::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    fn parse_expression_list(&mut self, end: Token) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        if self.peek == end {
            self.advance();
            return Ok(items);
        }
        self.advance();
        items.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek == Token::Comma {
            self.advance();
            self.advance();
            items.push(self.parse_expression(Precedence::Lowest)?);
        }
        if !self.expect_peek(&end) {
            return Err(ParseError(format!("expected {end}")));
        }
        Ok(items)
    }

    fn parse_hash_literal(&mut self) -> Result<Expr, ParseError> {
        let mut pairs = Vec::new();
        while self.peek != Token::RBrace {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;
            if !self.expect_peek(&Token::Colon) {
                return Err(ParseError("expected : in hash literal".to_string()));
            }
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if self.peek != Token::RBrace && !self.expect_peek(&Token::Comma) {
                return Err(ParseError("expected , or } in hash literal".to_string()));
            }
        }
        if !self.expect_peek(&Token::RBrace) {
            return Err(ParseError("expected } to close hash literal".to_string()));
        }
        Ok(Expr::HashLiteral(pairs))
    }

    fn parse_if_expression(&mut self) -> Result<Expr, ParseError> {
        if !self.expect_peek(&Token::LParen) {
            return Err(ParseError("expected ( after if".to_string()));
        }
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(&Token::RParen) {
            return Err(ParseError("expected ) after if condition".to_string()));
        }
        if !self.expect_peek(&Token::LBrace) {
            return Err(ParseError("expected { after if (...)".to_string()));
        }
        let consequence = self.parse_block()?;
        let alternative = if self.peek == Token::Else {
            self.advance();
            if !self.expect_peek(&Token::LBrace) {
                return Err(ParseError("expected { after else".to_string()));
            }
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Expr::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_function_literal(&mut self) -> Result<Expr, ParseError> {
        let name = if matches!(self.peek, Token::Identifier(_)) {
            self.advance();
            Some(self.current_identifier()?)
        } else {
            None
        };
        if !self.expect_peek(&Token::LParen) {
            return Err(ParseError("expected ( after fn".to_string()));
        }
        let params = self.parse_function_params()?;
        if !self.expect_peek(&Token::LBrace) {
            return Err(ParseError("expected { to open function body".to_string()));
        }
        let body = self.parse_block()?;
        Ok(Expr::FunctionLiteral { name, params, body })
    }

    fn parse_function_params(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if self.peek == Token::RParen {
            self.advance();
            return Ok(params);
        }
        self.advance();
        params.push(self.current_identifier()?);
        while self.peek == Token::Comma {
            self.advance();
            self.advance();
            params.push(self.current_identifier()?);
        }
        if !self.expect_peek(&Token::RParen) {
            return Err(ParseError("expected ) to close parameter list".to_string()));
        }
        Ok(params)
    }
}

fn has_infix(token: &Token) -> bool {
    !matches!(
        token,
        Token::Eof
            | Token::Semicolon
            | Token::RParen
            | Token::RBrace
            | Token::RBracket
            | Token::Comma
            | Token::Colon
    )
}
