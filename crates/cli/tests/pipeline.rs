// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! Whole-pipeline parity tests: the same program, built once as an
//! AST, must produce the same `Object` whether it is tree-walked by
//! `selina_eval` or compiled and run by `selina_compiler`/`selina_vm`.
//! Programs are built directly against `selina_ast` rather than
//! through a parser, since parsing is this binary's own private
//! concern, not a shared library surface the test suite can import.

use pretty_assertions::assert_eq;
use selina_ast::{Block, Expr, InfixOp, PrefixOp, Program, Stmt};
use selina_object::Object;

fn run_both(program: &Program) -> (Object, Object) {
    let env = selina_eval::global_environment();
    let evaluated = selina_eval::eval_program(program, &env);

    let bytecode = selina_compiler::Compiler::new()
        .compile(program)
        .expect("program compiles");
    let vm_bytecode = selina_vm::Bytecode {
        instructions: bytecode.instructions,
        constants: bytecode.constants,
    };
    let ran = selina_vm::Vm::new().run(vm_bytecode).expect("vm runs without a host fault");

    (evaluated, ran)
}

fn int(n: i64) -> Expr {
    Expr::IntegerLiteral(n)
}

fn ident(name: &str) -> Expr {
    Expr::Identifier(name.to_string())
}

fn binary(op: InfixOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary { op, left: Box::new(left), right: Box::new(right) }
}

fn program(statements: Vec<Stmt>) -> Program {
    Program { statements }
}

#[test]
fn arithmetic_and_comparisons_agree() {
    // (2 + 3) * 4 - 1 <= 19 && 7 // 2 == 3
    let expr = binary(
        InfixOp::LogicalAnd,
        binary(
            InfixOp::Gte,
            int(19),
            binary(
                InfixOp::Sub,
                binary(InfixOp::Mul, binary(InfixOp::Add, int(2), int(3)), int(4)),
                int(1),
            ),
        ),
        binary(InfixOp::Eq, binary(InfixOp::FloorDiv, int(7), int(2)), int(3)),
    );
    let prog = program(vec![Stmt::Expression(expr)]);

    let (evaluated, ran) = run_both(&prog);
    assert_eq!(evaluated, Object::Boolean(true));
    assert_eq!(evaluated, ran);
}

#[test]
fn if_else_branches_agree() {
    let expr = Expr::If {
        condition: Box::new(binary(InfixOp::Gt, int(10), int(3))),
        consequence: vec![Stmt::Expression(int(1))],
        alternative: Some(vec![Stmt::Expression(int(0))]),
    };
    let prog = program(vec![Stmt::Expression(expr)]);

    let (evaluated, ran) = run_both(&prog);
    assert_eq!(evaluated, Object::Integer(1));
    assert_eq!(evaluated, ran);
}

#[test]
fn while_loop_accumulation_agrees() {
    // let sum = 0; let i = 0; while (i < 5) { sum = sum + i; i = i + 1; } sum
    let body: Block = vec![
        Stmt::Expression(Expr::Assign {
            name: "sum".to_string(),
            value: Box::new(binary(InfixOp::Add, ident("sum"), ident("i"))),
        }),
        Stmt::Expression(Expr::Assign {
            name: "i".to_string(),
            value: Box::new(binary(InfixOp::Add, ident("i"), int(1))),
        }),
    ];
    let prog = program(vec![
        Stmt::Let { name: "sum".to_string(), value: int(0) },
        Stmt::Let { name: "i".to_string(), value: int(0) },
        Stmt::While { condition: binary(InfixOp::Lt, ident("i"), int(5)), body },
        Stmt::Expression(ident("sum")),
    ]);

    let (evaluated, ran) = run_both(&prog);
    assert_eq!(evaluated, Object::Integer(0 + 1 + 2 + 3 + 4));
    assert_eq!(evaluated, ran);
}

#[test]
fn recursive_function_call_agrees() {
    // let fib = fn fib(n) { if (n < 2) { n } else { fib(n - 1) + fib(n - 2) } }; fib(10)
    let fib_body: Block = vec![Stmt::Expression(Expr::If {
        condition: Box::new(binary(InfixOp::Lt, ident("n"), int(2))),
        consequence: vec![Stmt::Expression(ident("n"))],
        alternative: Some(vec![Stmt::Expression(binary(
            InfixOp::Add,
            Expr::Call {
                callee: Box::new(ident("fib")),
                args: vec![binary(InfixOp::Sub, ident("n"), int(1))],
            },
            Expr::Call {
                callee: Box::new(ident("fib")),
                args: vec![binary(InfixOp::Sub, ident("n"), int(2))],
            },
        ))]),
    })];
    let fib = Expr::FunctionLiteral {
        name: Some("fib".to_string()),
        params: vec!["n".to_string()],
        body: fib_body,
    };
    let prog = program(vec![
        Stmt::Let { name: "fib".to_string(), value: fib },
        Stmt::Expression(Expr::Call { callee: Box::new(ident("fib")), args: vec![int(10)] }),
    ]);

    let (evaluated, ran) = run_both(&prog);
    assert_eq!(evaluated, Object::Integer(55));
    assert_eq!(evaluated, ran);
}

#[test]
fn closure_over_captured_counter_agrees() {
    // let make_counter = fn() {
    //   let count = 0;
    //   fn() { count = count + 1; count }
    // };
    // let counter = make_counter();
    // counter(); counter(); counter()
    let inner = Expr::FunctionLiteral {
        name: None,
        params: vec![],
        body: vec![
            Stmt::Expression(Expr::Assign {
                name: "count".to_string(),
                value: Box::new(binary(InfixOp::Add, ident("count"), int(1))),
            }),
            Stmt::Expression(ident("count")),
        ],
    };
    let make_counter = Expr::FunctionLiteral {
        name: None,
        params: vec![],
        body: vec![
            Stmt::Let { name: "count".to_string(), value: int(0) },
            Stmt::Expression(inner),
        ],
    };
    let call_counter = || Stmt::Expression(Expr::Call { callee: Box::new(ident("counter")), args: vec![] });
    let prog = program(vec![
        Stmt::Let { name: "make_counter".to_string(), value: make_counter },
        Stmt::Let {
            name: "counter".to_string(),
            value: Expr::Call { callee: Box::new(ident("make_counter")), args: vec![] },
        },
        call_counter(),
        call_counter(),
        call_counter(),
    ]);

    let (evaluated, ran) = run_both(&prog);
    assert_eq!(evaluated, Object::Integer(3));
    assert_eq!(evaluated, ran);
}

#[test]
fn array_and_index_expressions_agree() {
    // let xs = [1, 2, 3]; xs[1] + xs[2]
    let prog = program(vec![
        Stmt::Let {
            name: "xs".to_string(),
            value: Expr::ArrayLiteral(vec![int(1), int(2), int(3)]),
        },
        Stmt::Expression(binary(
            InfixOp::Add,
            Expr::Index { left: Box::new(ident("xs")), index: Box::new(int(1)) },
            Expr::Index { left: Box::new(ident("xs")), index: Box::new(int(2)) },
        )),
    ]);

    let (evaluated, ran) = run_both(&prog);
    assert_eq!(evaluated, Object::Integer(5));
    assert_eq!(evaluated, ran);
}

#[test]
fn mismatched_type_addition_reports_distinct_messages_per_back_end() {
    // {"one":1}["one"] + {"one":1}["two"]
    // The "two" lookup misses and yields null, so this becomes
    // `1 + null` — an error object whose message differs by back end.
    // (The full scenario also compares the result to `null` with `==`,
    // but that comparison never runs: the error short-circuits first.)
    fn hash_lookup(key: &str) -> Expr {
        Expr::Index {
            left: Box::new(Expr::HashLiteral(vec![(
                Expr::StringLiteral("one".to_string()),
                int(1),
            )])),
            index: Box::new(Expr::StringLiteral(key.to_string())),
        }
    }
    let expr = binary(InfixOp::Add, hash_lookup("one"), hash_lookup("two"));
    let prog = program(vec![Stmt::Expression(expr)]);

    let env = selina_eval::global_environment();
    let evaluated = selina_eval::eval_program(&prog, &env);
    match evaluated {
        Object::Error(message) => assert!(
            message.starts_with("type mismatch"),
            "expected a type-mismatch error, got: {message}"
        ),
        other => panic!("expected an error object, got {other:?}"),
    }

    let bytecode = selina_compiler::Compiler::new().compile(&prog).expect("program compiles");
    let vm_bytecode =
        selina_vm::Bytecode { instructions: bytecode.instructions, constants: bytecode.constants };
    let ran = selina_vm::Vm::new().run(vm_bytecode).expect("vm runs without a host fault");
    match ran {
        Object::Error(message) => assert!(
            message.starts_with("unsupported types for binary operation"),
            "expected an unsupported-types error, got: {message}"
        ),
        other => panic!("expected an error object, got {other:?}"),
    }
}

#[test]
fn unary_negation_and_not_agree() {
    let expr = binary(
        InfixOp::LogicalAnd,
        Expr::Unary { op: PrefixOp::Bang, right: Box::new(Expr::BooleanLiteral(false)) },
        binary(InfixOp::Eq, Expr::Unary { op: PrefixOp::Minus, right: Box::new(int(5)) }, int(-5)),
    );
    let prog = program(vec![Stmt::Expression(expr)]);

    let (evaluated, ran) = run_both(&prog);
    assert_eq!(evaluated, Object::Boolean(true));
    assert_eq!(evaluated, ran);
}
