// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! The value system shared by both back-ends. The VM and the
//! tree-walking evaluator build on the same `Object` enum so that
//! `evaluate(P) == compile_then_run(P)` is a statement about one set
//! of operator semantics, not two.

mod environment;
mod hashkey;
mod object;
mod ops;
mod ordered_map;

pub use environment::Environment;
pub use hashkey::HashKey;
pub use object::{
    native_bool, BuiltinFn, BuiltinObj, ClosureObj, CompiledFunctionObj, FunctionObj, Object,
    ObjectType, BREAK, CONTINUE, FALSE, NULL, TRUE,
};
pub use ops::{apply_infix, apply_prefix, is_binary_type_mismatch, objects_equal};
pub use ordered_map::OrderedMap;
