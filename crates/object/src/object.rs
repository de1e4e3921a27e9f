// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use selina_ast as ast;

use crate::environment::Environment;
use crate::hashkey::HashKey;
use crate::ordered_map::OrderedMap;

#[derive(Debug, Clone)]
pub struct FunctionObj {
    pub params: Vec<String>,
    pub body: ast::Block,
    pub env: Rc<RefCell<Environment>>,
}

impl PartialEq for FunctionObj {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunctionObj {
    pub instructions: Vec<u8>,
    pub num_locals: usize,
    pub num_params: usize,
    pub inside_loop: bool,
}

#[derive(Debug, Clone)]
pub struct ClosureObj {
    pub func: Rc<CompiledFunctionObj>,
    /// Captured upvalues. Interior-mutable because `set_free` lets a
    /// closure body rebind one of its own captures (the counter-closure
    /// pattern requires successive calls to the *same* closure instance
    /// to observe each other's writes, not just reads of a value frozen
    /// at capture time).
    pub free: RefCell<Vec<Object>>,
}

impl PartialEq for ClosureObj {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

pub type BuiltinFn = fn(&[Object]) -> Object;

#[derive(Clone)]
pub struct BuiltinObj {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for BuiltinObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

impl PartialEq for BuiltinObj {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Runtime value. Every operator yields a *new* `Object` (or `None`);
/// nothing here is mutated in place except `ClosureObj::free`, which is
/// written exactly once, at construction, by the `closure` opcode /
/// function-literal evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    String(Rc<str>),
    Null,
    Break,
    Continue,
    Error(Rc<str>),
    ReturnValue(Box<Object>),
    Array(Rc<Vec<Object>>),
    Hash(Rc<OrderedMap<HashKey, (Object, Object)>>),
    Function(Rc<FunctionObj>),
    CompiledFunction(Rc<CompiledFunctionObj>),
    Closure(Rc<ClosureObj>),
    Builtin(Rc<BuiltinObj>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Integer,
    Decimal,
    Boolean,
    String,
    Null,
    Break,
    Continue,
    Error,
    ReturnValue,
    Array,
    Hash,
    Function,
    CompiledFunction,
    Closure,
    Builtin,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectType::Integer => "INTEGER",
            ObjectType::Decimal => "DECIMAL",
            ObjectType::Boolean => "BOOLEAN",
            ObjectType::String => "STRING",
            ObjectType::Null => "NULL",
            ObjectType::Break => "BREAK",
            ObjectType::Continue => "CONTINUE",
            ObjectType::Error => "ERROR",
            ObjectType::ReturnValue => "RETURN_VALUE",
            ObjectType::Array => "ARRAY",
            ObjectType::Hash => "HASH",
            ObjectType::Function => "FUNCTION",
            ObjectType::CompiledFunction => "COMPILED_FUNCTION",
            ObjectType::Closure => "CLOSURE",
            ObjectType::Builtin => "BUILTIN",
        };
        f.write_str(s)
    }
}

impl Object {
    pub fn error(message: impl Into<String>) -> Object {
        Object::Error(Rc::from(message.into()))
    }

    pub fn string(value: impl Into<String>) -> Object {
        Object::String(Rc::from(value.into()))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Object::Error(_))
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Integer(_) => ObjectType::Integer,
            Object::Decimal(_) => ObjectType::Decimal,
            Object::Boolean(_) => ObjectType::Boolean,
            Object::String(_) => ObjectType::String,
            Object::Null => ObjectType::Null,
            Object::Break => ObjectType::Break,
            Object::Continue => ObjectType::Continue,
            Object::Error(_) => ObjectType::Error,
            Object::ReturnValue(_) => ObjectType::ReturnValue,
            Object::Array(_) => ObjectType::Array,
            Object::Hash(_) => ObjectType::Hash,
            Object::Function(_) => ObjectType::Function,
            Object::CompiledFunction(_) => ObjectType::CompiledFunction,
            Object::Closure(_) => ObjectType::Closure,
            Object::Builtin(_) => ObjectType::Builtin,
        }
    }

    /// Falsy values: `false`, `null`, `0`, `0.0`, `""`, `[]`, `{}`.
    /// Everything else — including `error` objects — is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Object::Boolean(b) => *b,
            Object::Null => false,
            Object::Integer(i) => *i != 0,
            Object::Decimal(d) => *d != 0.0,
            Object::String(s) => !s.is_empty(),
            Object::Array(items) => !items.is_empty(),
            Object::Hash(pairs) => !pairs.is_empty(),
            _ => true,
        }
    }

    pub fn is_hashable(&self) -> bool {
        matches!(self, Object::Integer(_) | Object::String(_) | Object::Boolean(_))
    }

    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Object::Integer(i) => Some(HashKey::Integer(*i)),
            Object::String(s) => Some(HashKey::String(s.clone())),
            Object::Boolean(b) => Some(HashKey::Boolean(*b)),
            _ => None,
        }
    }

    /// Canonical textual rendering, used for `puts` and as the
    /// interpreter's print output.
    pub fn inspect(&self) -> String {
        match self {
            Object::Integer(i) => i.to_string(),
            Object::Decimal(d) => format_decimal(*d),
            Object::Boolean(b) => b.to_string(),
            Object::String(s) => s.to_string(),
            Object::Null => "null".to_string(),
            Object::Break => "break".to_string(),
            Object::Continue => "continue".to_string(),
            Object::Error(msg) => format!("ERROR: {msg}"),
            Object::ReturnValue(inner) => inner.inspect(),
            Object::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|o| o.inspect()).collect();
                format!("[{}]", rendered.join(", "))
            }
            Object::Hash(pairs) => {
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|(_, (k, v))| format!("{}: {}", k.inspect(), v.inspect()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            Object::Function(f) => format!("fn({}) {{ ... }}", f.params.join(", ")),
            Object::CompiledFunction(_) => "compiled_function".to_string(),
            Object::Closure(_) => "closure".to_string(),
            Object::Builtin(b) => format!("builtin({})", b.name),
        }
    }
}

fn format_decimal(d: f64) -> String {
    if d.is_infinite() {
        if d > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        }
    } else if d.is_nan() {
        "NaN".to_string()
    } else {
        format!("{d}")
    }
}

pub const TRUE: Object = Object::Boolean(true);
pub const FALSE: Object = Object::Boolean(false);
pub const NULL: Object = Object::Null;
pub const BREAK: Object = Object::Break;
pub const CONTINUE: Object = Object::Continue;

pub fn native_bool(b: bool) -> Object {
    if b {
        TRUE
    } else {
        FALSE
    }
}
