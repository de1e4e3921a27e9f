// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! The name -> value chain the tree-walking evaluator threads through
//! every call. `Rc<RefCell<_>>` is the one deliberate piece of interior
//! mutability in the object model — every other `Object` variant is
//! immutable after construction, but closures share and mutate the
//! environment that captured them, so the environment itself cannot be
//! plain-owned.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::Object;

pub struct Environment {
    store: HashMap<String, Object>,
    outer: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            store: HashMap::new(),
            outer: None,
        }))
    }

    pub fn enclosed(outer: Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            store: HashMap::new(),
            outer: Some(outer),
        }))
    }

    /// Walk the parent chain looking for `name`.
    pub fn get(&self, name: &str) -> Option<Object> {
        if let Some(value) = self.store.get(name) {
            return Some(value.clone());
        }
        self.outer.as_ref().and_then(|o| o.borrow().get(name))
    }

    /// Bind `name` in *this* scope (`let`).
    pub fn set(&mut self, name: &str, value: Object) {
        self.store.insert(name.to_owned(), value);
    }

    /// Write to the nearest scope that already binds `name`, walking
    /// outward; falls back to defining it in the current scope if no
    /// enclosing scope has it.
    pub fn reassign(&mut self, name: &str, value: Object) {
        if self.store.contains_key(name) {
            self.store.insert(name.to_owned(), value);
            return;
        }
        if let Some(outer) = &self.outer {
            if outer.borrow().contains(name) {
                outer.borrow_mut().reassign(name, value);
                return;
            }
        }
        self.store.insert(name.to_owned(), value);
    }

    fn contains(&self, name: &str) -> bool {
        self.store.contains_key(name)
            || self
                .outer
                .as_ref()
                .is_some_and(|o| o.borrow().contains(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn get_walks_parent_chain() {
        let outer = Environment::new();
        outer.borrow_mut().set("x", Object::Integer(1));
        let inner = Environment::enclosed(outer);
        assert_eq!(inner.borrow().get("x"), Some(Object::Integer(1)));
    }

    #[test]
    fn reassign_writes_to_defining_scope() {
        let outer = Environment::new();
        outer.borrow_mut().set("x", Object::Integer(1));
        let inner = Environment::enclosed(outer.clone());
        inner.borrow_mut().reassign("x", Object::Integer(2));
        assert_eq!(outer.borrow().get("x"), Some(Object::Integer(2)));
        assert_eq!(inner.borrow().get("x"), Some(Object::Integer(2)));
    }

    #[test]
    fn reassign_undefined_name_defines_in_current_scope() {
        let env = Environment::new();
        env.borrow_mut().reassign("y", Object::Integer(5));
        assert_eq!(env.borrow().get("y"), Some(Object::Integer(5)));
    }
}
