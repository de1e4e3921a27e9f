// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! The stack VM: a single-threaded, synchronous fetch-decode-execute
//! loop over compiled bytecode, built around this instruction set's
//! opcodes, constant pool and closures.
//!
//! Arithmetic, comparison and unary operators are not reimplemented
//! here: they are delegated to `selina_object::{apply_infix,
//! apply_prefix}` so the VM and the tree-walking evaluator can never
//! disagree on operator semantics.
//!
//! Most failures surface as ordinary `error` objects pushed onto the
//! stack (division by zero, unknown operator, unusable hash key, bad
//! index) — only conditions the language itself cannot express as a
//! value (stack overflow, an unknown opcode byte, calling a
//! non-callable, wrong argument count) are host faults returned as
//! `Err(VmError)`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use selina_ast::{InfixOp, PrefixOp};
use selina_isa::{read_operands, Opcode};
use selina_object::{BuiltinObj, ClosureObj, CompiledFunctionObj, Object, ObjectType, OrderedMap};

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    StackOverflow,
    StackUnderflow,
    UnknownOpcode(u8),
    NotCallable(ObjectType),
    WrongArgumentCount { want: usize, got: usize },
    CallStackOverflow,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::StackOverflow => write!(f, "stack overflow"),
            VmError::StackUnderflow => write!(f, "stack underflow"),
            VmError::UnknownOpcode(byte) => write!(f, "unknown opcode byte: {byte}"),
            VmError::NotCallable(ty) => write!(f, "not callable: {ty}"),
            VmError::WrongArgumentCount { want, got } => {
                write!(f, "wrong number of arguments: want={want}, got={got}")
            }
            VmError::CallStackOverflow => write!(f, "call stack overflow"),
        }
    }
}

impl std::error::Error for VmError {}

/// Bytecode handed to the VM: the instruction stream plus the constant
/// pool it indexes into. Mirrors `selina_compiler::Bytecode` field for
/// field so the VM does not need to depend on the compiler crate
/// (only its test suite does, to compile fixtures).
pub struct Bytecode {
    pub instructions: Vec<u8>,
    pub constants: Vec<Object>,
}

struct Frame {
    closure: Rc<ClosureObj>,
    ip: isize,
    base_pointer: usize,
}

pub struct Vm {
    constants: Vec<Object>,
    stack: Vec<Object>,
    sp: usize,
    globals: Vec<Object>,
    frames: Vec<Frame>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            constants: Vec::new(),
            stack: (0..STACK_SIZE).map(|_| Object::Null).collect(),
            sp: 0,
            globals: (0..GLOBALS_SIZE).map(|_| Object::Null).collect(),
            frames: Vec::with_capacity(MAX_FRAMES),
        }
    }

    /// Reuses `globals` across calls, the way a REPL keeps top-level
    /// bindings alive between successive inputs; the `selina` CLI only
    /// ever calls `run` once per process, but the evaluator-comparison
    /// tests run several programs against one `Vm`.
    pub fn run(&mut self, bytecode: Bytecode) -> Result<Object, VmError> {
        self.constants = bytecode.constants;
        let main_fn = Rc::new(CompiledFunctionObj {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_params: 0,
            inside_loop: false,
        });
        let main_closure = Rc::new(ClosureObj { func: main_fn, free: RefCell::new(Vec::new()) });
        self.sp = 0;
        self.frames.clear();
        self.frames.push(Frame { closure: main_closure, ip: 0, base_pointer: 0 });

        while self.frames.len() > 1 || self.has_more_instructions() {
            self.step()?;
        }

        tracing::trace!(sp = self.sp, "vm run complete");
        Ok(self.last_popped_stack_element().clone())
    }

    fn has_more_instructions(&self) -> bool {
        let frame = self.frames.last().expect("vm always has an active frame while running");
        (frame.ip as usize) < frame.closure.func.instructions.len()
    }

    /// The value a `pop` just removed is still sitting at `stack[sp]`;
    /// nothing overwrites it until the next `push`. Reading it back here
    /// is how the VM reports "the value of the last expression" without
    /// a dedicated return slot.
    fn last_popped_stack_element(&self) -> &Object {
        &self.stack[self.sp]
    }

    fn push(&mut self, obj: Object) -> Result<(), VmError> {
        if self.sp >= STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.stack[self.sp] = obj;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, VmError> {
        if self.sp == 0 {
            return Err(VmError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(std::mem::replace(&mut self.stack[self.sp], Object::Null))
    }

    fn step(&mut self) -> Result<(), VmError> {
        let closure = self.frames.last().expect("active frame").closure.clone();
        let ip = self.frames.last().expect("active frame").ip as usize;
        let instructions = &closure.func.instructions;
        let op = Opcode::from_u8(instructions[ip]).ok_or(VmError::UnknownOpcode(instructions[ip]))?;
        let rest: Vec<u8> = instructions[ip + 1..].to_vec();
        let (operands, width) = read_operands(op, &rest);
        self.frames.last_mut().expect("active frame").ip += 1 + width as isize;

        match op {
            Opcode::pop => {
                self.pop()?;
            }
            Opcode::null => self.push(Object::Null)?,
            Opcode::op_true => self.push(Object::Boolean(true))?,
            Opcode::op_false => self.push(Object::Boolean(false))?,
            Opcode::constant => {
                let obj = self.constants[operands[0]].clone();
                self.push(obj)?;
            }
            Opcode::add
            | Opcode::sub
            | Opcode::mul
            | Opcode::div
            | Opcode::floor_div
            | Opcode::modulo
            | Opcode::bit_and
            | Opcode::bit_or
            | Opcode::bit_xor
            | Opcode::bit_lsh
            | Opcode::bit_rsh
            | Opcode::logical_and
            | Opcode::logical_or
            | Opcode::equal
            | Opcode::not_equal
            | Opcode::greater_than => self.execute_infix(op)?,
            Opcode::minus | Opcode::bang => self.execute_prefix(op)?,
            Opcode::jump => {
                self.frames.last_mut().expect("active frame").ip = operands[0] as isize;
            }
            Opcode::jump_not_truthy => {
                let condition = self.pop()?;
                if !condition.is_truthy() {
                    self.frames.last_mut().expect("active frame").ip = operands[0] as isize;
                }
            }
            Opcode::get_global => {
                let obj = self.globals[operands[0]].clone();
                self.push(obj)?;
            }
            Opcode::set_global => {
                let obj = self.pop()?;
                self.globals[operands[0]] = obj;
            }
            Opcode::get_local => {
                let bp = self.frames.last().expect("active frame").base_pointer;
                let obj = self.stack[bp + operands[0]].clone();
                self.push(obj)?;
            }
            Opcode::set_local => {
                let bp = self.frames.last().expect("active frame").base_pointer;
                let obj = self.pop()?;
                self.stack[bp + operands[0]] = obj;
            }
            Opcode::get_free => {
                let obj = closure.free.borrow()[operands[0]].clone();
                self.push(obj)?;
            }
            Opcode::set_free => {
                let obj = self.pop()?;
                closure.free.borrow_mut()[operands[0]] = obj;
            }
            Opcode::get_builtin => {
                let obj = selina_builtins::object_at(operands[0])
                    .expect("get_builtin index comes from the compiler's own builtin table");
                self.push(obj)?;
            }
            Opcode::array => {
                let n = operands[0];
                let items = self.stack[self.sp - n..self.sp].to_vec();
                self.sp -= n;
                self.push(Object::Array(Rc::new(items)))?;
            }
            Opcode::hash => self.execute_build_hash(operands[0])?,
            Opcode::index => {
                let index = self.pop()?;
                let left = self.pop()?;
                self.execute_index(left, index)?;
            }
            Opcode::call => self.execute_call(operands[0])?,
            Opcode::return_value => {
                let return_value = self.pop()?;
                self.unwind_frame()?;
                self.push(return_value)?;
            }
            Opcode::ret => {
                self.unwind_frame()?;
                self.push(Object::Null)?;
            }
            Opcode::closure => self.execute_make_closure(operands[0], operands[1])?,
            Opcode::current_closure => self.push(Object::Closure(closure))?,
            Opcode::brake => {
                self.unwind_frame()?;
                self.push(Object::Boolean(false))?;
            }
            Opcode::cont => {
                self.unwind_frame()?;
                self.push(Object::Boolean(true))?;
            }
        }
        Ok(())
    }

    /// Pops the active frame and restores `sp` to just below the
    /// callee slot, the common tail of `return_value`/`ret`/`brake`/
    /// `cont` — the latter two unwind the synthetic loop-body closure
    /// exactly like a function return, which also means a `return`
    /// inside a `while` body only unwinds that synthetic frame rather
    /// than the enclosing function (see DESIGN.md).
    fn unwind_frame(&mut self) -> Result<(), VmError> {
        let frame = self.frames.pop().expect("unwind_frame called with no active frame");
        self.sp = frame.base_pointer - 1;
        tracing::trace!(frames = self.frames.len(), "frame popped");
        Ok(())
    }

    fn execute_infix(&mut self, op: Opcode) -> Result<(), VmError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let infix = opcode_to_infix(op);
        let result = match selina_object::apply_infix(infix, &left, &right) {
            Some(result) => result,
            None if selina_object::is_binary_type_mismatch(infix, &left, &right) => {
                Object::error(format!(
                    "unsupported types for binary operation: {} {} {}",
                    left.object_type(),
                    infix,
                    right.object_type()
                ))
            }
            None => Object::error(format!(
                "unknown operator: {} {} {}",
                left.object_type(),
                infix,
                right.object_type()
            )),
        };
        self.push(result)
    }

    fn execute_prefix(&mut self, op: Opcode) -> Result<(), VmError> {
        let right = self.pop()?;
        let prefix = if op == Opcode::minus { PrefixOp::Minus } else { PrefixOp::Bang };
        let result = match selina_object::apply_prefix(prefix, &right) {
            Some(result) => result,
            None => Object::error(format!("unknown operator: {prefix}{}", right.object_type())),
        };
        self.push(result)
    }

    fn execute_build_hash(&mut self, num_elements: usize) -> Result<(), VmError> {
        let items = self.stack[self.sp - num_elements..self.sp].to_vec();
        self.sp -= num_elements;
        let mut map = OrderedMap::new();
        for pair in items.chunks(2) {
            let key = pair[0].clone();
            let value = pair[1].clone();
            match key.hash_key() {
                Some(hash_key) => {
                    map.insert(hash_key, (key, value));
                }
                None => {
                    return self.push(Object::error(format!(
                        "unusable as hash key: {}",
                        key.object_type()
                    )))
                }
            }
        }
        self.push(Object::Hash(Rc::new(map)))
    }

    fn execute_index(&mut self, left: Object, index: Object) -> Result<(), VmError> {
        let result = match (&left, &index) {
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
            _ => Object::error(format!(
                "index operator not supported: {}",
                left.object_type()
            )),
        };
        self.push(result)
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), VmError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();
        match callee {
            Object::Closure(closure) => self.call_closure(closure, num_args),
            Object::Builtin(builtin) => self.call_builtin(builtin, num_args),
            other => Err(VmError::NotCallable(other.object_type())),
        }
    }

    fn call_closure(&mut self, closure: Rc<ClosureObj>, num_args: usize) -> Result<(), VmError> {
        if num_args != closure.func.num_params {
            return Err(VmError::WrongArgumentCount {
                want: closure.func.num_params,
                got: num_args,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(VmError::CallStackOverflow);
        }
        let base_pointer = self.sp - num_args;
        let num_locals = closure.func.num_locals;
        self.sp = base_pointer + num_locals;
        if self.sp > STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        tracing::trace!(frames = self.frames.len() + 1, "frame pushed");
        self.frames.push(Frame { closure, ip: 0, base_pointer });
        Ok(())
    }

    fn call_builtin(&mut self, builtin: Rc<BuiltinObj>, num_args: usize) -> Result<(), VmError> {
        let args = self.stack[self.sp - num_args..self.sp].to_vec();
        let result = (builtin.func)(&args);
        self.sp = self.sp - num_args - 1;
        self.push(result)
    }

    fn execute_make_closure(&mut self, const_idx: usize, num_free: usize) -> Result<(), VmError> {
        let func = match &self.constants[const_idx] {
            Object::CompiledFunction(f) => f.clone(),
            other => return Err(VmError::NotCallable(other.object_type())),
        };
        let free = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;
        tracing::trace!(num_free, "closure created");
        self.push(Object::Closure(Rc::new(ClosureObj { func, free: RefCell::new(free) })))
    }
}

fn opcode_to_infix(op: Opcode) -> InfixOp {
    match op {
        Opcode::add => InfixOp::Add,
        Opcode::sub => InfixOp::Sub,
        Opcode::mul => InfixOp::Mul,
        Opcode::div => InfixOp::Div,
        Opcode::floor_div => InfixOp::FloorDiv,
        Opcode::modulo => InfixOp::Mod,
        Opcode::bit_and => InfixOp::BitAnd,
        Opcode::bit_or => InfixOp::BitOr,
        Opcode::bit_xor => InfixOp::BitXor,
        Opcode::bit_lsh => InfixOp::Lsh,
        Opcode::bit_rsh => InfixOp::Rsh,
        Opcode::logical_and => InfixOp::LogicalAnd,
        Opcode::logical_or => InfixOp::LogicalOr,
        Opcode::equal => InfixOp::Eq,
        Opcode::not_equal => InfixOp::NotEq,
        Opcode::greater_than => InfixOp::Gt,
        other => unreachable!("{other:?} is not an infix opcode"),
    }
}
