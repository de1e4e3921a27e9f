// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! `selina` — the embedder driver. Reads a program from a path or
//! stdin, runs the shared semantic checks, then either tree-walks it
//! or compiles and runs it on the VM, and prints `inspect()` of the
//! resulting object.

mod disassemble;
mod lexer;
mod parser;

use std::io::Read as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;

#[derive(Debug, ClapParser)]
#[command(name = "selina", about = "Run a Selina program")]
struct Args {
    /// Source file to run; omit or pass `-` to read from stdin.
    path: Option<PathBuf>,

    /// Use the tree-walking evaluator instead of the bytecode VM.
    #[arg(long)]
    eval: bool,

    /// Print the disassembled instruction stream before running.
    #[arg(long)]
    dump_bytecode: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let source = match read_source(args.path.as_deref()) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("selina: {err}");
            return ExitCode::FAILURE;
        }
    };

    let program = match parser::parse(&source) {
        Ok(program) => program,
        Err(errors) => {
            for error in errors {
                eprintln!("parse error: {error}");
            }
            return ExitCode::FAILURE;
        }
    };

    if let Err(errors) = selina_analyzer::analyze(&program) {
        for error in errors {
            eprintln!("analysis error: {error}");
        }
        return ExitCode::FAILURE;
    }

    if args.eval {
        let env = selina_eval::global_environment();
        let result = selina_eval::eval_program(&program, &env);
        println!("{}", result.inspect());
        return ExitCode::SUCCESS;
    }

    let compiled = match selina_compiler::Compiler::new().compile(&program) {
        Ok(compiled) => compiled,
        Err(err) => {
            eprintln!("selina: compile error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if args.dump_bytecode {
        eprint!("{}", disassemble::disassemble(&compiled.instructions, &compiled.constants));
    }

    let bytecode = selina_vm::Bytecode {
        instructions: compiled.instructions,
        constants: compiled.constants,
    };
    match selina_vm::Vm::new().run(bytecode) {
        Ok(result) => {
            println!("{}", result.inspect());
            ExitCode::SUCCESS
        }
        Err(fault) => {
            eprintln!("selina: {fault}");
            ExitCode::FAILURE
        }
    }
}

fn read_source(path: Option<&std::path::Path>) -> std::io::Result<String> {
    match path {
        None => read_stdin(),
        Some(p) if p == std::path::Path::new("-") => read_stdin(),
        Some(p) => std::fs::read_to_string(p),
    }
}

fn read_stdin() -> std::io::Result<String> {
    let mut source = String::new();
    std::io::stdin().read_to_string(&mut source)?;
    Ok(source)
}
