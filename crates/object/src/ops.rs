// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! Operator semantics, implemented as a dispatch table keyed on
//! `(op, type(lhs), type(rhs))` rather than per-variant methods.
//!
//! Every function here returns `None` for "operator not defined"; the
//! caller (evaluator or VM) turns that into "unknown operator" / "type
//! mismatch" with the operand types in the message.

use std::rc::Rc;

use selina_ast::{InfixOp, PrefixOp};

use crate::object::{native_bool, Object};

/// Numeric promotion rank: `bool ≺ integer ≺ decimal`.
fn numeric_rank(o: &Object) -> Option<u8> {
    match o {
        Object::Boolean(_) => Some(0),
        Object::Integer(_) => Some(1),
        Object::Decimal(_) => Some(2),
        _ => None,
    }
}

fn as_i64(o: &Object) -> i64 {
    match o {
        Object::Boolean(b) => *b as i64,
        Object::Integer(i) => *i,
        _ => unreachable!("as_i64 called on non-integer-domain object"),
    }
}

fn as_f64(o: &Object) -> f64 {
    match o {
        Object::Boolean(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Object::Integer(i) => *i as f64,
        Object::Decimal(d) => *d,
        _ => unreachable!("as_f64 called on non-numeric object"),
    }
}

fn math_mod_i64(a: i64, b: i64) -> i64 {
    ((a % b) + b) % b
}

fn math_mod_f64(a: f64, b: f64) -> f64 {
    ((a % b) + b) % b
}

/// `+ - * // %` between two numerics. Division (`/`) is handled
/// separately since it always produces `decimal`.
fn arithmetic(op: InfixOp, left: &Object, right: &Object) -> Option<Object> {
    let rank = numeric_rank(left)?.max(numeric_rank(right)?);
    if rank <= 1 {
        let a = as_i64(left);
        let b = as_i64(right);
        match op {
            InfixOp::Add => Some(Object::Integer(a.wrapping_add(b))),
            InfixOp::Sub => Some(Object::Integer(a.wrapping_sub(b))),
            InfixOp::Mul => Some(Object::Integer(a.wrapping_mul(b))),
            InfixOp::FloorDiv => {
                if b == 0 {
                    Some(Object::error("division by zero"))
                } else {
                    Some(Object::Decimal((a as f64 / b as f64).floor()))
                }
            }
            InfixOp::Mod => {
                if b == 0 {
                    Some(Object::error("division by zero"))
                } else {
                    Some(Object::Integer(math_mod_i64(a, b)))
                }
            }
            _ => None,
        }
    } else {
        let a = as_f64(left);
        let b = as_f64(right);
        match op {
            InfixOp::Add => Some(Object::Decimal(a + b)),
            InfixOp::Sub => Some(Object::Decimal(a - b)),
            InfixOp::Mul => Some(Object::Decimal(a * b)),
            InfixOp::FloorDiv => Some(Object::Decimal((a / b).floor())),
            InfixOp::Mod => Some(Object::Decimal(math_mod_f64(a, b))),
            _ => None,
        }
    }
}

/// `/` always yields `decimal`; zero-divisor only errors when the
/// computation was happening in the integer domain (both operands
/// bool/integer) — once either side is `decimal`, IEEE 754 takes over
/// and `1.0/0` is `inf`, not an error.
fn division(left: &Object, right: &Object) -> Option<Object> {
    let rank = numeric_rank(left)?.max(numeric_rank(right)?);
    if rank <= 1 && as_i64(right) == 0 {
        return Some(Object::error("division by zero"));
    }
    Some(Object::Decimal(as_f64(left) / as_f64(right)))
}

fn bitwise_keep_bool(op: InfixOp, left: &Object, right: &Object) -> Option<Object> {
    if let (Object::Boolean(a), Object::Boolean(b)) = (left, right) {
        let result = match op {
            InfixOp::BitAnd => a & b,
            InfixOp::BitOr => a | b,
            InfixOp::BitXor => a ^ b,
            _ => unreachable!(),
        };
        return Some(native_bool(result));
    }
    let rank = numeric_rank(left)?.max(numeric_rank(right)?);
    if rank > 1 {
        return None; // bitwise ops are not defined on decimals
    }
    let a = as_i64(left);
    let b = as_i64(right);
    let result = match op {
        InfixOp::BitAnd => a & b,
        InfixOp::BitOr => a | b,
        InfixOp::BitXor => a ^ b,
        _ => unreachable!(),
    };
    Some(Object::Integer(result))
}

fn shift(op: InfixOp, left: &Object, right: &Object) -> Option<Object> {
    let rank = numeric_rank(left)?.max(numeric_rank(right)?);
    if rank > 1 {
        return None;
    }
    let a = as_i64(left);
    let b = as_i64(right);
    let result = match op {
        InfixOp::Lsh => a.wrapping_shl(b as u32),
        InfixOp::Rsh => a.wrapping_shr(b as u32),
        _ => unreachable!(),
    };
    Some(Object::Integer(result))
}

fn logical(op: InfixOp, left: &Object, right: &Object) -> Object {
    match op {
        InfixOp::LogicalAnd => native_bool(left.is_truthy() && right.is_truthy()),
        InfixOp::LogicalOr => native_bool(left.is_truthy() || right.is_truthy()),
        _ => unreachable!(),
    }
}

/// Natural ordering between two comparable objects, or `None` when the
/// pair can't be ordered (arrays, hashes, cross-family mismatches):
/// the caller reports "unknown operator" for those.
fn greater_than(left: &Object, right: &Object) -> Option<Object> {
    if let (Some(_), Some(_)) = (numeric_rank(left), numeric_rank(right)) {
        return Some(native_bool(as_f64(left) > as_f64(right)));
    }
    if let (Object::String(a), Object::String(b)) = (left, right) {
        return Some(native_bool(a > b));
    }
    None
}

/// `==`: defined for every pair, never errors. Unrelated types simply
/// compare unequal.
pub fn objects_equal(left: &Object, right: &Object) -> bool {
    if let (Some(_), Some(_)) = (numeric_rank(left), numeric_rank(right)) {
        return as_f64(left) == as_f64(right);
    }
    match (left, right) {
        (Object::String(a), Object::String(b)) => a == b,
        (Object::Null, Object::Null) => true,
        (Object::Break, Object::Break) => true,
        (Object::Continue, Object::Continue) => true,
        (Object::Error(a), Object::Error(b)) => a == b,
        (Object::Array(a), Object::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| objects_equal(x, y))
        }
        (Object::Hash(a), Object::Hash(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, (_, v))| {
                    b.get(k).is_some_and(|(_, v2)| objects_equal(v, v2))
                })
        }
        (Object::Function(a), Object::Function(b)) => Rc::ptr_eq(a, b),
        (Object::Closure(a), Object::Closure(b)) => Rc::ptr_eq(a, b),
        (Object::CompiledFunction(a), Object::CompiledFunction(b)) => Rc::ptr_eq(a, b),
        (Object::Builtin(a), Object::Builtin(b)) => a.name == b.name,
        _ => false,
    }
}

/// `a < b` compiles (and evaluates) as `b > a` — there is no dedicated
/// `Lt` opcode; the object model mirrors that by reusing `greater_than`
/// with swapped operands instead of a separate code path, so the
/// tree-walker and the VM agree on the result.
fn less_than(left: &Object, right: &Object) -> Option<Object> {
    greater_than(right, left)
}

/// `a >= b` has no dedicated opcode either; we resolve it the same way
/// the compiler will: `!(a < b)`.
fn greater_or_equal(left: &Object, right: &Object) -> Option<Object> {
    match less_than(left, right)? {
        Object::Boolean(b) => Some(native_bool(!b)),
        other => Some(other),
    }
}

fn sequence_add(left: &Object, right: &Object) -> Option<Object> {
    match (left, right) {
        (Object::String(a), Object::String(b)) => {
            Some(Object::string(format!("{a}{b}")))
        }
        (Object::Array(a), Object::Array(b)) => {
            let mut items = (**a).clone();
            items.extend((**b).iter().cloned());
            Some(Object::Array(Rc::new(items)))
        }
        (Object::Hash(a), Object::Hash(b)) => {
            let mut merged = (**a).clone();
            for (_, (k, v)) in b.iter() {
                if let Some(key) = k.hash_key() {
                    merged.insert(key, (k.clone(), v.clone()));
                }
            }
            Some(Object::Hash(Rc::new(merged)))
        }
        _ => None,
    }
}

fn repeat_sequence<T: Clone>(items: &[T], count: i64) -> Vec<T> {
    if count <= 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(items.len() * count as usize);
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    out
}

fn sequence_mul(left: &Object, right: &Object) -> Option<Object> {
    match (left, right) {
        (Object::Integer(n), Object::Array(items)) | (Object::Array(items), Object::Integer(n)) => {
            Some(Object::Array(Rc::new(repeat_sequence(items, *n))))
        }
        (Object::Integer(n), Object::String(s)) | (Object::String(s), Object::Integer(n)) => {
            let single: Vec<char> = s.chars().collect();
            let repeated = repeat_sequence(&single, *n);
            Some(Object::string(repeated.into_iter().collect::<String>()))
        }
        _ => None,
    }
}

pub fn apply_infix(op: InfixOp, left: &Object, right: &Object) -> Option<Object> {
    if left.is_error() {
        return Some(left.clone());
    }
    if right.is_error() {
        return Some(right.clone());
    }

    match op {
        InfixOp::Eq => Some(native_bool(objects_equal(left, right))),
        InfixOp::NotEq => Some(native_bool(!objects_equal(left, right))),
        InfixOp::Add => sequence_add(left, right).or_else(|| arithmetic(op, left, right)),
        InfixOp::Mul => sequence_mul(left, right).or_else(|| arithmetic(op, left, right)),
        InfixOp::Sub | InfixOp::FloorDiv | InfixOp::Mod => arithmetic(op, left, right),
        InfixOp::Div => division(left, right),
        InfixOp::BitAnd | InfixOp::BitOr | InfixOp::BitXor => bitwise_keep_bool(op, left, right),
        InfixOp::Lsh | InfixOp::Rsh => shift(op, left, right),
        InfixOp::LogicalAnd | InfixOp::LogicalOr => Some(logical(op, left, right)),
        InfixOp::Gt => greater_than(left, right),
        InfixOp::Lt => less_than(left, right),
        InfixOp::Gte => greater_or_equal(left, right),
    }
}

/// Whether an `apply_infix` miss (`None`) on `op`/`left`/`right` should
/// be reported as a type mismatch rather than "unknown operator".
/// Comparison (`>`/`<`/`>=`) has no ordering relation between unrelated
/// types and is always "unknown operator", matching `greater_than`'s
/// own `None` for any non-numeric, non-string pair. Every other
/// operator failing on operands of two different `ObjectType`s is a
/// type mismatch; a same-type pair that still fails (two arrays with
/// `-`, two hashes with `%`, ...) stays "unknown operator".
pub fn is_binary_type_mismatch(op: InfixOp, left: &Object, right: &Object) -> bool {
    if matches!(op, InfixOp::Gt | InfixOp::Lt | InfixOp::Gte) {
        return false;
    }
    left.object_type() != right.object_type()
}

pub fn apply_prefix(op: PrefixOp, right: &Object) -> Option<Object> {
    if right.is_error() {
        return Some(right.clone());
    }

    match op {
        PrefixOp::Bang => Some(native_bool(!right.is_truthy())),
        PrefixOp::Minus => match right {
            Object::Integer(i) => Some(Object::Integer(-i)),
            Object::Decimal(d) => Some(Object::Decimal(-d)),
            Object::Boolean(b) => Some(Object::Integer(-(*b as i64))),
            _ => None,
        },
    }
}
