// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! Name resolution shared by the compiler and the pre-compile analyzer.
//! A `SymbolTable` is a chain of scopes, nested the same way
//! `CompilationScope`s nest in the compiler — one table per function
//! body plus the root.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

pub struct SymbolTable {
    outer: Option<Rc<RefCell<SymbolTable>>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    /// Symbols captured from an enclosing scope, in promotion order:
    /// position `i` here is exactly the index a `free` symbol at this
    /// scope carries.
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Rc<RefCell<SymbolTable>> {
        Rc::new(RefCell::new(SymbolTable {
            outer: None,
            store: HashMap::new(),
            num_definitions: 0,
            free_symbols: Vec::new(),
        }))
    }

    pub fn enclosed(outer: Rc<RefCell<SymbolTable>>) -> Rc<RefCell<SymbolTable>> {
        Rc::new(RefCell::new(SymbolTable {
            outer: Some(outer),
            store: HashMap::new(),
            num_definitions: 0,
            free_symbols: Vec::new(),
        }))
    }

    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// The enclosing table, if any — used by the compiler's
    /// `leave_scope` to pop back to it once a function/loop body has
    /// been fully compiled.
    pub fn outer(&self) -> Option<Rc<RefCell<SymbolTable>>> {
        self.outer.clone()
    }

    /// Assigns the next index in this scope; `global` at the root
    /// table, `local` everywhere else. Redefinition is diagnosed by
    /// the analyzer, not here.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// `builtin` symbols live only at the root table, indexed by the
    /// order `selina-builtins` exposes them in.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// The name a function literal is bound to for self-reference from
    /// inside its own body, at index 0 of the new scope.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original);
        let symbol = Symbol {
            name: self.free_symbols[self.free_symbols.len() - 1].name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Searches this scope then parents. A `global`/`builtin` hit
    /// returns unchanged; a `local`/`free` symbol found in an
    /// enclosing scope is promoted into this scope's `free[]` list as
    /// a side effect, because the compiler emits `get_free` using the
    /// index assigned at this exact moment.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.clone()?;
        let found = outer.borrow_mut().resolve(name)?;
        match found.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(found),
            _ => Some(self.define_free(found)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn define_assigns_global_scope_at_root() {
        let table = SymbolTable::new();
        let a = table.borrow_mut().define("a");
        assert_eq!(a.scope, SymbolScope::Global);
        assert_eq!(a.index, 0);
    }

    #[test]
    fn define_assigns_local_scope_in_enclosed_table() {
        let root = SymbolTable::new();
        root.borrow_mut().define("a");
        let inner = SymbolTable::enclosed(root);
        let b = inner.borrow_mut().define("b");
        assert_eq!(b.scope, SymbolScope::Local);
        assert_eq!(b.index, 0);
    }

    #[test]
    fn resolve_global_from_nested_scope_is_unchanged() {
        let root = SymbolTable::new();
        root.borrow_mut().define("a");
        let inner = SymbolTable::enclosed(root);
        let resolved = inner.borrow_mut().resolve("a").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Global);
        assert_eq!(resolved.index, 0);
        assert!(inner.borrow().free_symbols.is_empty());
    }

    #[test]
    fn resolve_enclosing_local_promotes_to_free() {
        let root = SymbolTable::new();
        let first = SymbolTable::enclosed(root);
        first.borrow_mut().define("a");
        let second = SymbolTable::enclosed(first.clone());

        let resolved = second.borrow_mut().resolve("a").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Free);
        assert_eq!(resolved.index, 0);
        assert_eq!(second.borrow().free_symbols[0].scope, SymbolScope::Local);
        assert_eq!(second.borrow().free_symbols[0].name, "a");
    }

    #[test]
    fn resolving_same_free_name_twice_reuses_cached_symbol() {
        let root = SymbolTable::new();
        let first = SymbolTable::enclosed(root);
        first.borrow_mut().define("a");
        let second = SymbolTable::enclosed(first);

        let once = second.borrow_mut().resolve("a").unwrap();
        let twice = second.borrow_mut().resolve("a").unwrap();
        assert_eq!(once, twice);
        assert_eq!(second.borrow().free_symbols.len(), 1);
    }

    #[test]
    fn builtin_symbols_do_not_get_promoted_to_free() {
        let root = SymbolTable::new();
        root.borrow_mut().define_builtin(0, "len");
        let inner = SymbolTable::enclosed(root);
        let resolved = inner.borrow_mut().resolve("len").unwrap();
        assert_eq!(resolved.scope, SymbolScope::Builtin);
        assert!(inner.borrow().free_symbols.is_empty());
    }

    #[test]
    fn function_name_symbol_is_function_scope_at_index_zero() {
        let table = SymbolTable::new();
        let sym = table.borrow_mut().define_function_name("fib");
        assert_eq!(sym.scope, SymbolScope::Function);
        assert_eq!(sym.index, 0);
    }

    #[test]
    fn unresolved_name_is_none() {
        let table = SymbolTable::new();
        assert!(table.borrow_mut().resolve("missing").is_none());
    }
}
