// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! Pre-compile semantic checks shared by both back-ends. Neither
//! `selina-vm` nor `selina-eval` depends on this crate; an embedder
//! runs `analyze` once before choosing a back-end.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use selina_ast::{Expr, Program, Stmt};
use selina_symbol::SymbolTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    UnresolvedIdentifier(String),
    Redefinition(String),
    AssignToFunctionName(String),
    BreakOutsideLoop,
    ContinueOutsideLoop,
    NotCallable,
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::UnresolvedIdentifier(name) => {
                write!(f, "identifier not found: {name}")
            }
            AnalysisError::Redefinition(name) => write!(f, "{name} is already defined"),
            AnalysisError::AssignToFunctionName(name) => {
                write!(f, "cannot assign to function name: {name}")
            }
            AnalysisError::BreakOutsideLoop => write!(f, "break used outside of a loop"),
            AnalysisError::ContinueOutsideLoop => write!(f, "continue used outside of a loop"),
            AnalysisError::NotCallable => write!(f, "expression in call position is not callable"),
        }
    }
}

impl std::error::Error for AnalysisError {}

struct Frame {
    table: Rc<std::cell::RefCell<SymbolTable>>,
    defined: HashSet<String>,
    inside_loop: bool,
    function_name: Option<String>,
}

struct Analyzer {
    frames: Vec<Frame>,
    errors: Vec<AnalysisError>,
}

impl Analyzer {
    fn new() -> Self {
        Analyzer {
            frames: vec![Frame {
                table: SymbolTable::new(),
                defined: HashSet::new(),
                inside_loop: false,
                function_name: None,
            }],
            errors: Vec::new(),
        }
    }

    fn frame(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("analyzer frame stack is never empty")
    }

    fn define(&mut self, name: &str) {
        if self.frame().defined.contains(name) {
            self.errors.push(AnalysisError::Redefinition(name.to_string()));
        } else {
            self.frame().defined.insert(name.to_string());
        }
        self.frame().table.clone().borrow_mut().define(name);
    }

    fn resolve(&mut self, name: &str) {
        let table = self.frame().table.clone();
        if table.borrow_mut().resolve(name).is_none() {
            self.errors
                .push(AnalysisError::UnresolvedIdentifier(name.to_string()));
        }
    }

    fn walk_block(&mut self, block: &[Stmt]) {
        for stmt in block {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value } => {
                self.walk_expr(value);
                self.define(name);
            }
            Stmt::Return(value) => {
                if let Some(expr) = value {
                    self.walk_expr(expr);
                }
            }
            Stmt::Break => {
                if !self.frame().inside_loop {
                    self.errors.push(AnalysisError::BreakOutsideLoop);
                }
            }
            Stmt::Continue => {
                if !self.frame().inside_loop {
                    self.errors.push(AnalysisError::ContinueOutsideLoop);
                }
            }
            Stmt::Expression(expr) => self.walk_expr(expr),
            Stmt::While { condition, body } => {
                self.walk_expr(condition);
                let outer_table = self.frame().table.clone();
                self.frames.push(Frame {
                    table: SymbolTable::enclosed(outer_table),
                    defined: HashSet::new(),
                    inside_loop: true,
                    function_name: None,
                });
                self.walk_block(body);
                self.frames.pop();
            }
            Stmt::Block(stmts) => self.walk_block(stmts),
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::IntegerLiteral(_) | Expr::DecimalLiteral(_) | Expr::BooleanLiteral(_) => {}
            Expr::StringLiteral(_) => {}
            Expr::ArrayLiteral(items) => {
                for item in items {
                    self.walk_expr(item);
                }
            }
            Expr::HashLiteral(pairs) => {
                for (k, v) in pairs {
                    self.walk_expr(k);
                    self.walk_expr(v);
                }
            }
            Expr::Identifier(name) => self.resolve(name),
            Expr::Unary { right, .. } => self.walk_expr(right),
            Expr::Binary { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            Expr::If {
                condition,
                consequence,
                alternative,
            } => {
                self.walk_expr(condition);
                self.walk_block(consequence);
                if let Some(alt) = alternative {
                    self.walk_block(alt);
                }
            }
            Expr::FunctionLiteral { name, params, body } => {
                let outer_table = self.frame().table.clone();
                let table = SymbolTable::enclosed(outer_table);
                if let Some(fname) = name {
                    table.borrow_mut().define_function_name(fname);
                }
                self.frames.push(Frame {
                    table,
                    defined: HashSet::new(),
                    inside_loop: false,
                    function_name: name.clone(),
                });
                for param in params {
                    self.define(param);
                }
                self.walk_block(body);
                self.frames.pop();
            }
            Expr::Call { callee, args } => {
                if !matches!(
                    callee.as_ref(),
                    Expr::Identifier(_) | Expr::Call { .. } | Expr::FunctionLiteral { .. }
                ) {
                    self.errors.push(AnalysisError::NotCallable);
                }
                self.walk_expr(callee);
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            Expr::Index { left, index } => {
                self.walk_expr(left);
                self.walk_expr(index);
            }
            Expr::Assign { name, value } => {
                self.walk_expr(value);
                if self.frame().function_name.as_deref() == Some(name.as_str()) {
                    self.errors
                        .push(AnalysisError::AssignToFunctionName(name.clone()));
                }
                self.resolve(name);
            }
        }
    }
}

/// Enforces the name-resolution and control-flow rules both back-ends
/// rely on before either one runs. Errors are collected rather than
/// short-circuited so an embedder can report every problem in one pass.
pub fn analyze(program: &Program) -> Result<(), Vec<AnalysisError>> {
    let mut analyzer = Analyzer::new();
    analyzer.walk_block(&program.statements);
    if analyzer.errors.is_empty() {
        Ok(())
    } else {
        Err(analyzer.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn program(statements: Vec<Stmt>) -> Program {
        Program { statements }
    }

    #[test]
    fn unresolved_identifier_is_reported() {
        let p = program(vec![Stmt::Expression(Expr::Identifier("x".to_string()))]);
        let errors = analyze(&p).unwrap_err();
        assert_eq!(errors, vec![AnalysisError::UnresolvedIdentifier("x".to_string())]);
    }

    #[test]
    fn let_then_use_resolves_cleanly() {
        let p = program(vec![
            Stmt::Let {
                name: "x".to_string(),
                value: Expr::IntegerLiteral(1),
            },
            Stmt::Expression(Expr::Identifier("x".to_string())),
        ]);
        assert_eq!(analyze(&p), Ok(()));
    }

    #[test]
    fn redefinition_in_same_scope_is_an_error() {
        let p = program(vec![
            Stmt::Let {
                name: "x".to_string(),
                value: Expr::IntegerLiteral(1),
            },
            Stmt::Let {
                name: "x".to_string(),
                value: Expr::IntegerLiteral(2),
            },
        ]);
        let errors = analyze(&p).unwrap_err();
        assert_eq!(errors, vec![AnalysisError::Redefinition("x".to_string())]);
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let p = program(vec![Stmt::Break]);
        let errors = analyze(&p).unwrap_err();
        assert_eq!(errors, vec![AnalysisError::BreakOutsideLoop]);
    }

    #[test]
    fn break_inside_while_is_fine() {
        let p = program(vec![Stmt::While {
            condition: Expr::BooleanLiteral(true),
            body: vec![Stmt::Break],
        }]);
        assert_eq!(analyze(&p), Ok(()));
    }

    #[test]
    fn break_inside_function_inside_loop_does_not_leak() {
        let p = program(vec![Stmt::While {
            condition: Expr::BooleanLiteral(true),
            body: vec![Stmt::Expression(Expr::FunctionLiteral {
                name: None,
                params: vec![],
                body: vec![Stmt::Break],
            })],
        }]);
        let errors = analyze(&p).unwrap_err();
        assert_eq!(errors, vec![AnalysisError::BreakOutsideLoop]);
    }

    #[test]
    fn assigning_to_enclosing_function_name_is_an_error() {
        let p = program(vec![Stmt::Expression(Expr::FunctionLiteral {
            name: Some("fact".to_string()),
            params: vec![],
            body: vec![Stmt::Expression(Expr::Assign {
                name: "fact".to_string(),
                value: Expr::IntegerLiteral(1),
            })],
        })]);
        let errors = analyze(&p).unwrap_err();
        assert_eq!(
            errors,
            vec![AnalysisError::AssignToFunctionName("fact".to_string())]
        );
    }

    #[test]
    fn call_target_must_be_identifier_call_or_function_literal() {
        let p = program(vec![Stmt::Expression(Expr::Call {
            callee: Box::new(Expr::IntegerLiteral(1)),
            args: vec![],
        })]);
        let errors = analyze(&p).unwrap_err();
        assert_eq!(errors, vec![AnalysisError::NotCallable]);
    }

    #[test]
    fn recursive_function_may_call_itself_by_name() {
        let p = program(vec![Stmt::Let {
            name: "fact".to_string(),
            value: Expr::FunctionLiteral {
                name: Some("fact".to_string()),
                params: vec!["n".to_string()],
                body: vec![Stmt::Expression(Expr::Call {
                    callee: Box::new(Expr::Identifier("fact".to_string())),
                    args: vec![Expr::Identifier("n".to_string())],
                })],
            },
        }]);
        assert_eq!(analyze(&p), Ok(()));
    }
}
