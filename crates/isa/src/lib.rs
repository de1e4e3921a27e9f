// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

//! The Selina instruction set: a flat, single-byte opcode enum plus the
//! encoder/decoder pair that turns `(Opcode, operands)` into a byte
//! stream and back.
//!
//! Unlike a fixed-width ISA, instructions here are not aligned: each
//! opcode is one byte followed by zero or more inline operands whose
//! widths are declared by the opcode itself (see [`operand_widths`]).
//! All multi-byte operands are big-endian, so a raw hex dump of the
//! instruction stream reads left-to-right like the source bytes.

mod writer;

pub use writer::{make, read_operands, BytecodeWriter};

/// 16-bit constant-pool / jump-target / global-slot operand width, in bytes.
pub const WIDTH_U16: u8 = 2;
/// 8-bit local-slot / free-slot / builtin-index / arg-count operand width.
pub const WIDTH_U8: u8 = 1;

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[allow(non_camel_case_types)]
pub enum Opcode {
    // stack
    pop = 0,
    null,
    op_true,
    op_false,

    // constants
    constant, // u16: constant pool index

    // arithmetic
    add,
    sub,
    mul,
    div,
    floor_div,
    modulo,

    // bitwise
    bit_and,
    bit_or,
    bit_xor,
    bit_lsh,
    bit_rsh,

    // logical
    logical_and,
    logical_or,

    // comparison
    equal,
    not_equal,
    greater_than,

    // unary
    minus,
    bang,

    // control flow
    jump,             // u16: target address
    jump_not_truthy,  // u16: target address

    // globals
    get_global, // u16
    set_global, // u16

    // locals
    get_local, // u8
    set_local, // u8

    // free variables
    get_free, // u8
    set_free, // u8: rebinds a captured upvalue in the executing closure

    // builtins
    get_builtin, // u8

    // aggregates
    array, // u16: element count
    hash,  // u16: 2 * pair count
    index,

    // calls
    call, // u8: argument count
    return_value,
    ret,

    // closures
    closure, // u16 constant index, u8 free count
    current_closure,

    // loops
    brake,
    cont,
}

pub const OPCODE_COUNT: usize = Opcode::cont as usize + 1;

impl Opcode {
    /// Declared operand widths, in emission order, for this opcode.
    /// Collapses "kind" and "count" into the widths directly, since
    /// this ISA only ever uses 1-byte or 2-byte operands.
    pub fn operand_widths(self) -> &'static [u8] {
        use Opcode::*;
        match self {
            constant | jump | jump_not_truthy | get_global | set_global | array | hash => {
                &[WIDTH_U16]
            }
            get_local | set_local | get_free | set_free | get_builtin | call => &[WIDTH_U8],
            closure => &[WIDTH_U16, WIDTH_U8],
            pop | null | op_true | op_false | add | sub | mul | div | floor_div | modulo
            | bit_and | bit_or | bit_xor | bit_lsh | bit_rsh | logical_and | logical_or
            | equal | not_equal | greater_than | minus | bang | index | return_value | ret
            | current_closure | brake | cont => &[],
        }
    }

    /// Total encoded length of this instruction, opcode byte included.
    pub fn instruction_width(self) -> usize {
        1 + self
            .operand_widths()
            .iter()
            .map(|w| *w as usize)
            .sum::<usize>()
    }

    pub fn from_u8(byte: u8) -> Option<Opcode> {
        if (byte as usize) < OPCODE_COUNT {
            // SAFETY: `Opcode` is `repr(u8)` and every discriminant in
            // `0..OPCODE_COUNT` is assigned by the enum above.
            Some(unsafe { std::mem::transmute::<u8, Opcode>(byte) })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_opcode_round_trips_through_from_u8() {
        for byte in 0..OPCODE_COUNT as u8 {
            let op = Opcode::from_u8(byte).expect("valid opcode byte");
            assert_eq!(op as u8, byte);
        }
    }

    #[test]
    fn unknown_opcode_byte_is_none() {
        assert_eq!(Opcode::from_u8(255), None);
    }

    #[test]
    fn instruction_widths_match_declared_operands() {
        assert_eq!(Opcode::constant.instruction_width(), 3);
        assert_eq!(Opcode::get_local.instruction_width(), 2);
        assert_eq!(Opcode::closure.instruction_width(), 4);
        assert_eq!(Opcode::pop.instruction_width(), 1);
    }
}
