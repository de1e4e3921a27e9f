// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! The fixed builtin function table, queried by name (the evaluator's
//! initial environment) and by index (the compiler's `builtin`
//! symbols, and the VM's `get_builtin` opcode) — both views must agree
//! on order, so this crate is the single source of truth for it.

use std::rc::Rc;

use selina_object::{BuiltinFn, BuiltinObj, Object};

/// Order is load-bearing: `selina-compiler` calls `define_builtin(i,
/// name)` in this order when seeding the root symbol table, and
/// `get_builtin i` at runtime must land on the same entry.
const TABLE: &[(&str, BuiltinFn)] = &[
    ("len", len),
    ("puts", puts),
    ("first", first),
    ("last", last),
    ("rest", rest),
    ("push", push),
    ("type", type_of),
    ("chr", chr),
];

pub fn names() -> impl Iterator<Item = &'static str> {
    TABLE.iter().map(|(name, _)| *name)
}

pub fn by_name(name: &str) -> Option<(usize, BuiltinFn)> {
    TABLE
        .iter()
        .position(|(n, _)| *n == name)
        .map(|i| (i, TABLE[i].1))
}

pub fn by_index(index: usize) -> Option<(&'static str, BuiltinFn)> {
    TABLE.get(index).copied()
}

/// `Object::Builtin` value for the builtin at `index`, for seeding an
/// evaluator's initial environment or answering a VM `get_builtin`.
pub fn object_at(index: usize) -> Option<Object> {
    let (name, func) = by_index(index)?;
    Some(Object::Builtin(Rc::new(BuiltinObj { name, func })))
}

fn arity_error(name: &str, want: &str, got: usize) -> Object {
    Object::error(format!(
        "wrong number of arguments to `{name}`. got={got}, want={want}"
    ))
}

fn len(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error("len", "1", args.len());
    }
    match &args[0] {
        Object::String(s) => Object::Integer(s.chars().count() as i64),
        Object::Array(items) => Object::Integer(items.len() as i64),
        Object::Hash(pairs) => Object::Integer(pairs.len() as i64),
        other => Object::error(format!(
            "argument to `len` not supported, got {}",
            other.object_type()
        )),
    }
}

fn puts(args: &[Object]) -> Object {
    if args.is_empty() {
        println!();
        return Object::Null;
    }
    let rendered: Vec<String> = args
        .iter()
        .map(|o| match o {
            Object::String(s) => s.to_string(),
            other => other.inspect(),
        })
        .collect();
    println!("{}", rendered.join(" "));
    Object::Null
}

fn first(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error("first", "1", args.len());
    }
    match &args[0] {
        Object::Array(items) => items.first().cloned().unwrap_or(Object::Null),
        Object::String(s) => match s.chars().next() {
            Some(c) => Object::string(c.to_string()),
            None => Object::Null,
        },
        other => Object::error(format!(
            "argument to `first` not supported, got {}",
            other.object_type()
        )),
    }
}

fn last(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error("last", "1", args.len());
    }
    match &args[0] {
        Object::Array(items) => items.last().cloned().unwrap_or(Object::Null),
        Object::String(s) => match s.chars().last() {
            Some(c) => Object::string(c.to_string()),
            None => Object::Null,
        },
        other => Object::error(format!(
            "argument to `last` not supported, got {}",
            other.object_type()
        )),
    }
}

fn rest(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error("rest", "1", args.len());
    }
    match &args[0] {
        Object::Array(items) => {
            if items.len() <= 1 {
                Object::Null
            } else {
                Object::Array(Rc::new(items[1..].to_vec()))
            }
        }
        Object::String(s) => {
            let mut chars = s.chars();
            if chars.next().is_none() {
                return Object::Null;
            }
            let remainder: String = chars.collect();
            if remainder.is_empty() {
                Object::Null
            } else {
                Object::string(remainder)
            }
        }
        other => Object::error(format!(
            "argument to `rest` not supported, got {}",
            other.object_type()
        )),
    }
}

fn push(args: &[Object]) -> Object {
    if args.is_empty() {
        return arity_error("push", "2 or 3", args.len());
    }
    match &args[0] {
        Object::Array(items) => {
            if args.len() != 2 {
                return arity_error("push", "2", args.len());
            }
            let mut items = (**items).clone();
            items.push(args[1].clone());
            Object::Array(Rc::new(items))
        }
        Object::String(s) => {
            if args.len() != 2 {
                return arity_error("push", "2", args.len());
            }
            match &args[1] {
                Object::String(suffix) => Object::string(format!("{s}{suffix}")),
                other => Object::error(format!(
                    "argument to `push` not supported, got {}",
                    other.object_type()
                )),
            }
        }
        Object::Hash(pairs) => {
            if args.len() != 3 {
                return arity_error("push", "3", args.len());
            }
            let key = &args[1];
            let value = args[2].clone();
            match key.hash_key() {
                Some(hash_key) => {
                    let mut pairs = (**pairs).clone();
                    pairs.insert(hash_key, (key.clone(), value));
                    Object::Hash(Rc::new(pairs))
                }
                None => Object::error(format!(
                    "unusable as hash key: {}",
                    key.object_type()
                )),
            }
        }
        other => Object::error(format!(
            "argument to `push` not supported, got {}",
            other.object_type()
        )),
    }
}

fn type_of(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error("type", "1", args.len());
    }
    Object::string(args[0].object_type().to_string().to_lowercase())
}

fn chr(args: &[Object]) -> Object {
    if args.len() != 1 {
        return arity_error("chr", "1", args.len());
    }
    match &args[0] {
        Object::Integer(i) if (0..=127).contains(i) => {
            Object::string((*i as u8 as char).to_string())
        }
        Object::Integer(_) => Object::error("chr: argument not a valid ASCII code"),
        other => Object::error(format!(
            "argument to `chr` not supported, got {}",
            other.object_type()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_order_is_stable_and_queryable_both_ways() {
        for (i, name) in names().enumerate() {
            assert_eq!(by_name(name).unwrap().0, i);
            assert_eq!(by_index(i).unwrap().0, name);
        }
    }

    #[test]
    fn len_of_string_counts_chars_not_bytes() {
        let result = len(&[Object::string("héllo")]);
        assert_eq!(result, Object::Integer(5));
    }

    #[test]
    fn len_rejects_unsupported_type() {
        let result = len(&[Object::Integer(1)]);
        assert!(result.is_error());
    }

    #[test]
    fn first_and_last_on_empty_array_are_null() {
        let empty = Object::Array(Rc::new(vec![]));
        assert_eq!(first(&[empty.clone()]), Object::Null);
        assert_eq!(last(&[empty]), Object::Null);
    }

    #[test]
    fn rest_of_single_element_array_is_null() {
        let arr = Object::Array(Rc::new(vec![Object::Integer(1)]));
        assert_eq!(rest(&[arr]), Object::Null);
    }

    #[test]
    fn push_on_array_is_non_mutating() {
        let original = Rc::new(vec![Object::Integer(1), Object::Integer(2)]);
        let arr = Object::Array(original.clone());
        let result = push(&[arr, Object::Integer(3)]);
        assert_eq!(
            result,
            Object::Array(Rc::new(vec![
                Object::Integer(1),
                Object::Integer(2),
                Object::Integer(3)
            ]))
        );
        assert_eq!(original.len(), 2);
    }

    #[test]
    fn push_onto_hash_requires_hashable_key() {
        use selina_object::{HashKey, OrderedMap};
        let hash = Object::Hash(Rc::new(OrderedMap::<HashKey, (Object, Object)>::new()));
        let result = push(&[hash, Object::Array(Rc::new(vec![])), Object::Integer(1)]);
        assert!(result.is_error());
    }

    #[test]
    fn type_of_reports_lowercase_name() {
        assert_eq!(type_of(&[Object::Integer(1)]), Object::string("integer"));
    }

    #[test]
    fn chr_of_valid_ascii_code() {
        assert_eq!(chr(&[Object::Integer(65)]), Object::string("A"));
    }

    #[test]
    fn chr_rejects_out_of_range_code() {
        assert!(chr(&[Object::Integer(9999)]).is_error());
    }
}
