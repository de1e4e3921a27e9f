// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! AST → bytecode. The compiler owns a stack of `CompilationScope`s
//! (one instruction buffer per function/loop body under construction)
//! and a matching stack of `SymbolTable`s, building up an entry
//! struct and returning it one function body at a time.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use selina_ast::{Expr, InfixOp, PrefixOp, Program, Stmt};
use selina_isa::{BytecodeWriter, Opcode};
use selina_object::{CompiledFunctionObj, Object};
use selina_symbol::{Symbol, SymbolScope, SymbolTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    UnresolvedIdentifier(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnresolvedIdentifier(name) => {
                write!(f, "identifier not found: {name}")
            }
        }
    }
}

impl std::error::Error for CompileError {}

pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constants: Vec<Object>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

struct CompilationScope {
    instructions: BytecodeWriter,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

impl CompilationScope {
    fn new() -> Self {
        CompilationScope {
            instructions: BytecodeWriter::new(),
            last_instruction: None,
            previous_instruction: None,
        }
    }
}

pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: Rc<RefCell<SymbolTable>>,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let symbol_table = SymbolTable::new();
        for (index, name) in selina_builtins::names().enumerate() {
            symbol_table.borrow_mut().define_builtin(index, name);
        }
        Compiler {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::new()],
        }
    }

    pub fn compile(mut self, program: &Program) -> Result<Bytecode, CompileError> {
        self.compile_block(&program.statements)?;
        let scope = self.scopes.pop().expect("root compilation scope");
        Ok(Bytecode {
            instructions: scope.instructions.into_bytes(),
            constants: self.constants,
        })
    }

    fn scope(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("compiler scope stack is never empty")
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let position = self.scope().instructions.emit(op, operands);
        let scope = self.scope();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode: op, position });
        position
    }

    fn add_constant(&mut self, obj: Object) -> usize {
        self.constants.push(obj);
        self.constants.len() - 1
    }

    fn last_instruction_is(&mut self, op: Opcode) -> bool {
        self.scope().last_instruction.map(|i| i.opcode) == Some(op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scope();
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let position = self
            .scope()
            .last_instruction
            .expect("replace_last_pop_with_return called with no prior instruction")
            .position;
        self.scope().instructions.truncate(position);
        self.emit(Opcode::return_value, &[]);
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::new());
        let outer = self.symbol_table.clone();
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    /// Pops both the instruction buffer and the symbol table for the
    /// scope just finished compiling, returning its bytecode, the free
    /// variables it captured (in promotion order), and its local-slot
    /// count.
    fn leave_scope(&mut self) -> (Vec<u8>, Vec<Symbol>, usize) {
        let scope = self.scopes.pop().expect("unbalanced enter_scope/leave_scope");
        let free_symbols = std::mem::take(&mut self.symbol_table.borrow_mut().free_symbols);
        let num_locals = self.symbol_table.borrow().num_definitions();
        let outer = self
            .symbol_table
            .borrow()
            .outer()
            .expect("leave_scope called at the root symbol table");
        self.symbol_table = outer;
        (scope.instructions.into_bytes(), free_symbols, num_locals)
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::get_global, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::get_local, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::get_builtin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::get_free, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::current_closure, &[]),
        };
    }

    fn store_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::set_global, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::set_local, &[symbol.index]),
            // A free variable is only reachable via assignment when an
            // enclosing local gets captured as an upvalue (the counter
            // closure pattern); the captured slot itself is rebound
            // rather than the defining scope's local.
            SymbolScope::Free => self.emit(Opcode::set_free, &[symbol.index]),
            other => unreachable!("cannot store into a {other:?} symbol"),
        };
    }

    fn resolve(&mut self, name: &str) -> Result<Symbol, CompileError> {
        self.symbol_table
            .clone()
            .borrow_mut()
            .resolve(name)
            .ok_or_else(|| CompileError::UnresolvedIdentifier(name.to_string()))
    }

    fn compile_block(&mut self, block: &[Stmt]) -> Result<(), CompileError> {
        for stmt in block {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Let { name, value } => {
                self.compile_expr(value)?;
                let symbol = self.symbol_table.clone().borrow_mut().define(name);
                self.store_symbol(&symbol);
            }
            Stmt::Return(value) => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        self.emit(Opcode::null, &[]);
                    }
                }
                self.emit(Opcode::return_value, &[]);
            }
            Stmt::Break => {
                self.emit(Opcode::brake, &[]);
            }
            Stmt::Continue => {
                self.emit(Opcode::cont, &[]);
            }
            Stmt::Expression(expr) => {
                self.compile_expr(expr)?;
                self.emit(Opcode::pop, &[]);
            }
            Stmt::While { condition, body } => self.compile_while(condition, body)?,
            Stmt::Block(stmts) => self.compile_block(stmts)?,
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::IntegerLiteral(value) => {
                let idx = self.add_constant(Object::Integer(*value));
                self.emit(Opcode::constant, &[idx]);
            }
            Expr::DecimalLiteral(value) => {
                let idx = self.add_constant(Object::Decimal(*value));
                self.emit(Opcode::constant, &[idx]);
            }
            Expr::BooleanLiteral(value) => {
                self.emit(if *value { Opcode::op_true } else { Opcode::op_false }, &[]);
            }
            Expr::StringLiteral(value) => {
                let idx = self.add_constant(Object::string(value.clone()));
                self.emit(Opcode::constant, &[idx]);
            }
            Expr::ArrayLiteral(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(Opcode::array, &[items.len()]);
            }
            Expr::HashLiteral(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Opcode::hash, &[pairs.len() * 2]);
            }
            Expr::Identifier(name) => {
                let symbol = self.resolve(name)?;
                self.load_symbol(&symbol);
            }
            Expr::Unary { op, right } => {
                self.compile_expr(right)?;
                self.emit(
                    match op {
                        PrefixOp::Minus => Opcode::minus,
                        PrefixOp::Bang => Opcode::bang,
                    },
                    &[],
                );
            }
            Expr::Binary { op, left, right } => self.compile_binary(*op, left, right)?,
            Expr::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_deref())?,
            Expr::FunctionLiteral { name, params, body } => {
                self.compile_function_literal(name.as_deref(), params, body)?
            }
            Expr::Call { callee, args } => {
                self.compile_expr(callee)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(Opcode::call, &[args.len()]);
            }
            Expr::Index { left, index } => {
                self.compile_expr(left)?;
                self.compile_expr(index)?;
                self.emit(Opcode::index, &[]);
            }
            Expr::Assign { name, value } => {
                // An assignment is itself an expression and must leave
                // its value on the stack for the enclosing statement's
                // trailing `pop` (or an outer expression) to consume —
                // `store_symbol` pops to write the slot, so reload it.
                self.compile_expr(value)?;
                let symbol = self.resolve(name)?;
                self.store_symbol(&symbol);
                self.load_symbol(&symbol);
            }
        }
        Ok(())
    }

    /// `<` and `>=` have no dedicated opcode: `a < b` compiles as
    /// `b > a`, and `a >= b` as `!(b > a)`.
    fn compile_binary(&mut self, op: InfixOp, left: &Expr, right: &Expr) -> Result<(), CompileError> {
        if matches!(op, InfixOp::Lt | InfixOp::Gte) {
            self.compile_expr(right)?;
            self.compile_expr(left)?;
            self.emit(Opcode::greater_than, &[]);
            if op == InfixOp::Gte {
                self.emit(Opcode::bang, &[]);
            }
            return Ok(());
        }

        self.compile_expr(left)?;
        self.compile_expr(right)?;
        let opcode = match op {
            InfixOp::Add => Opcode::add,
            InfixOp::Sub => Opcode::sub,
            InfixOp::Mul => Opcode::mul,
            InfixOp::Div => Opcode::div,
            InfixOp::FloorDiv => Opcode::floor_div,
            InfixOp::Mod => Opcode::modulo,
            InfixOp::BitAnd => Opcode::bit_and,
            InfixOp::BitOr => Opcode::bit_or,
            InfixOp::BitXor => Opcode::bit_xor,
            InfixOp::Lsh => Opcode::bit_lsh,
            InfixOp::Rsh => Opcode::bit_rsh,
            InfixOp::LogicalAnd => Opcode::logical_and,
            InfixOp::LogicalOr => Opcode::logical_or,
            InfixOp::Eq => Opcode::equal,
            InfixOp::NotEq => Opcode::not_equal,
            InfixOp::Gt => Opcode::greater_than,
            InfixOp::Lt | InfixOp::Gte => unreachable!("handled above"),
        };
        self.emit(opcode, &[]);
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        consequence: &[Stmt],
        alternative: Option<&[Stmt]>,
    ) -> Result<(), CompileError> {
        self.compile_expr(condition)?;
        let jump_not_truthy_pos = self.emit(Opcode::jump_not_truthy, &[9999]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(Opcode::pop) {
            self.remove_last_pop();
        }
        let jump_pos = self.emit(Opcode::jump, &[9999]);

        let after_consequence = self.scope().instructions.len();
        self.scope()
            .instructions
            .replace_u16_operand(jump_not_truthy_pos + 1, after_consequence as u16);

        match alternative {
            None => {
                self.emit(Opcode::null, &[]);
            }
            Some(alt) => {
                self.compile_block(alt)?;
                if self.last_instruction_is(Opcode::pop) {
                    self.remove_last_pop();
                }
            }
        }

        let after_alternative = self.scope().instructions.len();
        self.scope()
            .instructions
            .replace_u16_operand(jump_pos + 1, after_alternative as u16);
        Ok(())
    }

    /// `while` bodies compile to a zero-argument closure that is
    /// immediately called once per iteration; `brake`/`cont` inside the
    /// body leave `false`/`true` on the stack for the surrounding code
    /// to inspect.
    fn compile_while(&mut self, condition: &Expr, body: &[Stmt]) -> Result<(), CompileError> {
        let loop_start = self.scope().instructions.len();
        self.compile_expr(condition)?;
        let jnt_condition_pos = self.emit(Opcode::jump_not_truthy, &[9999]);

        self.enter_scope();
        self.compile_block(body)?;
        self.emit(Opcode::cont, &[]);
        let (instructions, free_symbols, num_locals) = self.leave_scope();

        for free in &free_symbols {
            self.load_symbol(free);
        }

        let compiled = CompiledFunctionObj {
            instructions,
            num_locals,
            num_params: 0,
            inside_loop: true,
        };
        let const_idx = self.add_constant(Object::CompiledFunction(Rc::new(compiled)));
        self.emit(Opcode::closure, &[const_idx, free_symbols.len()]);
        self.emit(Opcode::call, &[0]);

        let jnt_break_pos = self.emit(Opcode::jump_not_truthy, &[9999]);
        self.emit(Opcode::jump, &[loop_start]);

        let after_loop = self.scope().instructions.len();
        self.scope()
            .instructions
            .replace_u16_operand(jnt_condition_pos + 1, after_loop as u16);
        self.scope()
            .instructions
            .replace_u16_operand(jnt_break_pos + 1, after_loop as u16);

        self.emit(Opcode::null, &[]);
        self.emit(Opcode::pop, &[]);
        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        name: Option<&str>,
        params: &[String],
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        self.enter_scope();
        if let Some(fname) = name {
            self.symbol_table.borrow_mut().define_function_name(fname);
        }
        for param in params {
            self.symbol_table.borrow_mut().define(param);
        }
        self.compile_block(body)?;

        if self.last_instruction_is(Opcode::pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::return_value) {
            self.emit(Opcode::ret, &[]);
        }

        let (instructions, free_symbols, num_locals) = self.leave_scope();
        for free in &free_symbols {
            self.load_symbol(free);
        }

        let compiled = CompiledFunctionObj {
            instructions,
            num_locals,
            num_params: params.len(),
            inside_loop: false,
        };
        let const_idx = self.add_constant(Object::CompiledFunction(Rc::new(compiled)));
        self.emit(Opcode::closure, &[const_idx, free_symbols.len()]);
        Ok(())
    }
}
