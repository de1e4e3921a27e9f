// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! The tree-walking evaluator, the second of the two interchangeable
//! back-ends. Recursive dispatch over `Expr`/`Stmt` threading a current
//! `Environment` (`selina_object::Environment`) — no bytecode, no
//! frames, just the AST and a parent-linked scope chain.
//!
//! Operator semantics are delegated to `selina_object::{apply_infix,
//! apply_prefix}`, the same dispatch the VM uses, so the two back-ends
//! cannot drift apart on what an operator computes.

use std::cell::RefCell;
use std::rc::Rc;

use selina_ast::{Expr, InfixOp, PrefixOp, Program, Stmt};
use selina_object::{Environment, FunctionObj, Object, OrderedMap};

/// A fresh global scope seeded with every builtin under its name, the
/// evaluator's equivalent of the compiler seeding `builtin` symbols
/// into the root symbol table.
pub fn global_environment() -> Rc<RefCell<Environment>> {
    let env = Environment::new();
    for (index, name) in selina_builtins::names().enumerate() {
        let obj = selina_builtins::object_at(index).expect("index within the builtin table's own bounds");
        env.borrow_mut().set(name, obj);
    }
    env
}

pub fn eval_program(program: &Program, env: &Rc<RefCell<Environment>>) -> Object {
    match eval_block(&program.statements, env) {
        Object::ReturnValue(value) => *value,
        other => other,
    }
}

/// A plain sequence of statements sharing the caller's scope — used for
/// `if` branches and bare `{}` blocks, which the compiler also leaves
/// in the enclosing symbol table rather than giving their own scope.
/// Stops at the first `return_value`, `error`, `break` or `continue`
/// and hands it straight back for the caller to interpret.
fn eval_block(stmts: &[Stmt], env: &Rc<RefCell<Environment>>) -> Object {
    let mut result = Object::Null;
    for stmt in stmts {
        result = eval_stmt(stmt, env);
        if matches!(
            result,
            Object::ReturnValue(_) | Object::Error(_) | Object::Break | Object::Continue
        ) {
            return result;
        }
    }
    result
}

fn eval_stmt(stmt: &Stmt, env: &Rc<RefCell<Environment>>) -> Object {
    match stmt {
        Stmt::Let { name, value } => {
            let evaluated = eval_expr(value, env);
            if evaluated.is_error() {
                return evaluated;
            }
            env.borrow_mut().set(name, evaluated);
            Object::Null
        }
        Stmt::Return(value) => {
            let evaluated = match value {
                Some(expr) => eval_expr(expr, env),
                None => Object::Null,
            };
            if evaluated.is_error() {
                evaluated
            } else {
                Object::ReturnValue(Box::new(evaluated))
            }
        }
        Stmt::Break => Object::Break,
        Stmt::Continue => Object::Continue,
        Stmt::Expression(expr) => eval_expr(expr, env),
        Stmt::While { condition, body } => eval_while(condition, body, env),
        Stmt::Block(stmts) => eval_block(stmts, env),
    }
}

/// Each iteration's body runs in its own scope enclosing the loop's
/// environment, mirroring the compiler's loop-body-as-closure: a `let`
/// inside the body is fresh every iteration rather than leaking into
/// the next one or the surrounding function.
fn eval_while(condition: &Expr, body: &[Stmt], env: &Rc<RefCell<Environment>>) -> Object {
    loop {
        let condition_value = eval_expr(condition, env);
        if condition_value.is_error() {
            return condition_value;
        }
        if !condition_value.is_truthy() {
            return Object::Null;
        }
        let iteration_env = Environment::enclosed(env.clone());
        match eval_block(body, &iteration_env) {
            Object::Break => return Object::Null,
            Object::Continue => continue,
            result @ (Object::ReturnValue(_) | Object::Error(_)) => return result,
            _ => {}
        }
    }
}

fn eval_expr(expr: &Expr, env: &Rc<RefCell<Environment>>) -> Object {
    match expr {
        Expr::IntegerLiteral(value) => Object::Integer(*value),
        Expr::DecimalLiteral(value) => Object::Decimal(*value),
        Expr::BooleanLiteral(value) => Object::Boolean(*value),
        Expr::StringLiteral(value) => Object::string(value.clone()),
        Expr::ArrayLiteral(items) => {
            let mut evaluated = Vec::with_capacity(items.len());
            for item in items {
                let value = eval_expr(item, env);
                if value.is_error() {
                    return value;
                }
                evaluated.push(value);
            }
            Object::Array(Rc::new(evaluated))
        }
        Expr::HashLiteral(pairs) => eval_hash_literal(pairs, env),
        Expr::Identifier(name) => env
            .borrow()
            .get(name)
            .unwrap_or_else(|| Object::error(format!("identifier not found: {name}"))),
        Expr::Unary { op, right } => {
            let right = eval_expr(right, env);
            if right.is_error() {
                return right;
            }
            match selina_object::apply_prefix(*op, &right) {
                Some(result) => result,
                None => Object::error(format!("unknown operator: {op}{}", right.object_type())),
            }
        }
        Expr::Binary { op, left, right } => eval_binary(*op, left, right, env),
        Expr::If { condition, consequence, alternative } => {
            let condition = eval_expr(condition, env);
            if condition.is_error() {
                return condition;
            }
            if condition.is_truthy() {
                eval_block(consequence, env)
            } else if let Some(alt) = alternative {
                eval_block(alt, env)
            } else {
                Object::Null
            }
        }
        Expr::FunctionLiteral { name, params, body } => eval_function_literal(name, params, body, env),
        Expr::Call { callee, args } => eval_call(callee, args, env),
        Expr::Index { left, index } => {
            let left = eval_expr(left, env);
            if left.is_error() {
                return left;
            }
            let index = eval_expr(index, env);
            if index.is_error() {
                return index;
            }
            eval_index(left, index)
        }
        Expr::Assign { name, value } => {
            let evaluated = eval_expr(value, env);
            if evaluated.is_error() {
                return evaluated;
            }
            env.borrow_mut().reassign(name, evaluated.clone());
            evaluated
        }
    }
}

fn eval_binary(op: InfixOp, left: &Expr, right: &Expr, env: &Rc<RefCell<Environment>>) -> Object {
    let left = eval_expr(left, env);
    if left.is_error() {
        return left;
    }
    let right = eval_expr(right, env);
    if right.is_error() {
        return right;
    }
    match selina_object::apply_infix(op, &left, &right) {
        Some(result) => result,
        None if selina_object::is_binary_type_mismatch(op, &left, &right) => Object::error(format!(
            "type mismatch: {} {op} {}",
            left.object_type(),
            right.object_type()
        )),
        None => Object::error(format!(
            "unknown operator: {} {op} {}",
            left.object_type(),
            right.object_type()
        )),
    }
}

fn eval_hash_literal(pairs: &[(Expr, Expr)], env: &Rc<RefCell<Environment>>) -> Object {
    let mut map = OrderedMap::new();
    for (key_expr, value_expr) in pairs {
        let key = eval_expr(key_expr, env);
        if key.is_error() {
            return key;
        }
        let value = eval_expr(value_expr, env);
        if value.is_error() {
            return value;
        }
        match key.hash_key() {
            Some(hash_key) => {
                map.insert(hash_key, (key, value));
            }
            None => return Object::error(format!("unusable as hash key: {}", key.object_type())),
        }
    }
    Object::Hash(Rc::new(map))
}

/// A named function literal binds itself in a thin wrapper scope
/// around its defining environment, so a reference to its own name
/// from inside the body resolves without needing the outer `let` to
/// have completed yet — the evaluator's equivalent of the compiler's
/// `define_function_name` + `current_closure`.
fn eval_function_literal(
    name: &Option<String>,
    params: &[String],
    body: &[Stmt],
    env: &Rc<RefCell<Environment>>,
) -> Object {
    match name {
        None => Object::Function(Rc::new(FunctionObj {
            params: params.to_vec(),
            body: body.to_vec(),
            env: env.clone(),
        })),
        Some(fname) => {
            let named_env = Environment::enclosed(env.clone());
            let func = Rc::new(FunctionObj {
                params: params.to_vec(),
                body: body.to_vec(),
                env: named_env.clone(),
            });
            named_env.borrow_mut().set(fname, Object::Function(func.clone()));
            Object::Function(func)
        }
    }
}

fn eval_call(callee: &Expr, args: &[Expr], env: &Rc<RefCell<Environment>>) -> Object {
    let callee = eval_expr(callee, env);
    if callee.is_error() {
        return callee;
    }
    let mut evaluated_args = Vec::with_capacity(args.len());
    for arg in args {
        let value = eval_expr(arg, env);
        if value.is_error() {
            return value;
        }
        evaluated_args.push(value);
    }
    apply_function(callee, evaluated_args)
}

fn apply_function(callee: Object, args: Vec<Object>) -> Object {
    match callee {
        Object::Function(func) => {
            if args.len() != func.params.len() {
                return Object::error(format!(
                    "wrong number of arguments: want={}, got={}",
                    func.params.len(),
                    args.len()
                ));
            }
            let call_env = Environment::enclosed(func.env.clone());
            for (param, arg) in func.params.iter().zip(args) {
                call_env.borrow_mut().set(param, arg);
            }
            match eval_block(&func.body, &call_env) {
                Object::ReturnValue(value) => *value,
                other => other,
            }
        }
        Object::Builtin(builtin) => (builtin.func)(&args),
        other => Object::error(format!("not a function: {}", other.object_type())),
    }
}

fn eval_index(left: Object, index: Object) -> Object {
    match (&left, &index) {
        (Object::Array(items), Object::Integer(i)) => {
            if *i < 0 || *i as usize >= items.len() {
                Object::Null
            } else {
                items[*i as usize].clone()
            }
        }
        (Object::String(s), Object::Integer(i)) => {
            let chars: Vec<char> = s.chars().collect();
            if *i < 0 || *i as usize >= chars.len() {
                Object::Null
            } else {
                Object::string(chars[*i as usize].to_string())
            }
        }
        (Object::Hash(pairs), key) => match key.hash_key() {
            Some(hash_key) => pairs.get(&hash_key).map(|(_, v)| v.clone()).unwrap_or(Object::Null),
            None => Object::error(format!("unusable as hash key: {}", key.object_type())),
        },
        _ => Object::error(format!("index operator not supported: {}", left.object_type())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use selina_ast::{Expr, InfixOp, Stmt};

    fn run(statements: Vec<Stmt>) -> Object {
        let program = Program { statements };
        eval_program(&program, &global_environment())
    }

    #[test]
    fn arithmetic_follows_ast_shape_not_precedence_parsing() {
        // 5 + 5 * 2, already shaped as 5 + (5 * 2) by the AST.
        let expr = Expr::Binary {
            op: InfixOp::Add,
            left: Box::new(Expr::IntegerLiteral(5)),
            right: Box::new(Expr::Binary {
                op: InfixOp::Mul,
                left: Box::new(Expr::IntegerLiteral(5)),
                right: Box::new(Expr::IntegerLiteral(2)),
            }),
        };
        assert_eq!(run(vec![Stmt::Expression(expr)]), Object::Integer(15));
    }

    #[test]
    fn identifier_not_found_is_an_error_object() {
        let result = run(vec![Stmt::Expression(Expr::Identifier("missing".to_string()))]);
        assert!(result.is_error());
    }

    #[test]
    fn adding_mismatched_types_reports_type_mismatch() {
        // 1 + [][0] — the index miss yields null, so this is `1 + null`
        let expr = Expr::Binary {
            op: InfixOp::Add,
            left: Box::new(Expr::IntegerLiteral(1)),
            right: Box::new(Expr::Index {
                left: Box::new(Expr::ArrayLiteral(vec![])),
                index: Box::new(Expr::IntegerLiteral(0)),
            }),
        };
        match run(vec![Stmt::Expression(expr)]) {
            Object::Error(message) => assert!(message.starts_with("type mismatch")),
            other => panic!("expected an error object, got {other:?}"),
        }
    }

    #[test]
    fn subtracting_two_hashes_of_the_same_type_reports_unknown_operator() {
        let hash = || Expr::HashLiteral(vec![(Expr::StringLiteral("a".to_string()), Expr::IntegerLiteral(1))]);
        let expr = Expr::Binary { op: InfixOp::Sub, left: Box::new(hash()), right: Box::new(hash()) };
        match run(vec![Stmt::Expression(expr)]) {
            Object::Error(message) => assert!(message.starts_with("unknown operator")),
            other => panic!("expected an error object, got {other:?}"),
        }
    }

    #[test]
    fn while_loop_counts_up_to_three() {
        let statements = vec![
            Stmt::Let { name: "i".to_string(), value: Expr::IntegerLiteral(0) },
            Stmt::While {
                condition: Expr::Binary {
                    op: InfixOp::Lt,
                    left: Box::new(Expr::Identifier("i".to_string())),
                    right: Box::new(Expr::IntegerLiteral(3)),
                },
                body: vec![Stmt::Expression(Expr::Assign {
                    name: "i".to_string(),
                    value: Box::new(Expr::Binary {
                        op: InfixOp::Add,
                        left: Box::new(Expr::Identifier("i".to_string())),
                        right: Box::new(Expr::IntegerLiteral(1)),
                    }),
                })],
            },
            Stmt::Expression(Expr::Identifier("i".to_string())),
        ];
        assert_eq!(run(statements), Object::Integer(3));
    }

    #[test]
    fn break_stops_the_loop_immediately() {
        let statements = vec![
            Stmt::Let { name: "i".to_string(), value: Expr::IntegerLiteral(0) },
            Stmt::While {
                condition: Expr::BooleanLiteral(true),
                body: vec![
                    Stmt::Expression(Expr::Assign {
                        name: "i".to_string(),
                        value: Box::new(Expr::Binary {
                            op: InfixOp::Add,
                            left: Box::new(Expr::Identifier("i".to_string())),
                            right: Box::new(Expr::IntegerLiteral(1)),
                        }),
                    }),
                    Stmt::Break,
                ],
            },
            Stmt::Expression(Expr::Identifier("i".to_string())),
        ];
        assert_eq!(run(statements), Object::Integer(1));
    }

    #[test]
    fn recursive_named_function_literal_computes_fibonacci() {
        let fib_body = vec![Stmt::Expression(Expr::If {
            condition: Box::new(Expr::Binary {
                op: InfixOp::Lt,
                left: Box::new(Expr::Identifier("n".to_string())),
                right: Box::new(Expr::IntegerLiteral(2)),
            }),
            consequence: vec![Stmt::Expression(Expr::Identifier("n".to_string()))],
            alternative: Some(vec![Stmt::Expression(Expr::Binary {
                op: InfixOp::Add,
                left: Box::new(Expr::Call {
                    callee: Box::new(Expr::Identifier("fib".to_string())),
                    args: vec![Expr::Binary {
                        op: InfixOp::Sub,
                        left: Box::new(Expr::Identifier("n".to_string())),
                        right: Box::new(Expr::IntegerLiteral(1)),
                    }],
                }),
                right: Box::new(Expr::Call {
                    callee: Box::new(Expr::Identifier("fib".to_string())),
                    args: vec![Expr::Binary {
                        op: InfixOp::Sub,
                        left: Box::new(Expr::Identifier("n".to_string())),
                        right: Box::new(Expr::IntegerLiteral(2)),
                    }],
                }),
            })]),
        })];
        let statements = vec![
            Stmt::Let {
                name: "fib".to_string(),
                value: Expr::FunctionLiteral {
                    name: Some("fib".to_string()),
                    params: vec!["n".to_string()],
                    body: fib_body,
                },
            },
            Stmt::Expression(Expr::Call {
                callee: Box::new(Expr::Identifier("fib".to_string())),
                args: vec![Expr::IntegerLiteral(10)],
            }),
        ];
        assert_eq!(run(statements), Object::Integer(55));
    }

    #[test]
    fn counter_closure_increments_across_calls() {
        let inner = Expr::FunctionLiteral {
            name: None,
            params: vec![],
            body: vec![Stmt::Expression(Expr::Assign {
                name: "x".to_string(),
                value: Box::new(Expr::Binary {
                    op: InfixOp::Add,
                    left: Box::new(Expr::Identifier("x".to_string())),
                    right: Box::new(Expr::IntegerLiteral(1)),
                }),
            })],
        };
        let make_counter = Expr::FunctionLiteral {
            name: None,
            params: vec![],
            body: vec![
                Stmt::Let { name: "x".to_string(), value: Expr::IntegerLiteral(0) },
                Stmt::Expression(inner),
            ],
        };
        let statements = vec![
            Stmt::Let { name: "make_counter".to_string(), value: make_counter },
            Stmt::Let {
                name: "counter".to_string(),
                value: Expr::Call {
                    callee: Box::new(Expr::Identifier("make_counter".to_string())),
                    args: vec![],
                },
            },
            Stmt::Expression(Expr::Call {
                callee: Box::new(Expr::Identifier("counter".to_string())),
                args: vec![],
            }),
            Stmt::Expression(Expr::Call {
                callee: Box::new(Expr::Identifier("counter".to_string())),
                args: vec![],
            }),
        ];
        assert_eq!(run(statements), Object::Integer(2));
    }

    #[test]
    fn hash_index_miss_is_null_not_an_error() {
        let statements = vec![
            Stmt::Let {
                name: "h".to_string(),
                value: Expr::HashLiteral(vec![(Expr::StringLiteral("a".to_string()), Expr::IntegerLiteral(1))]),
            },
            Stmt::Expression(Expr::Index {
                left: Box::new(Expr::Identifier("h".to_string())),
                index: Box::new(Expr::StringLiteral("missing".to_string())),
            }),
        ];
        assert_eq!(run(statements), Object::Null);
    }
}
