//! Bytecode opcodes for the Harlequin interpreter
//!
//! Defines the stack-machine instruction set and its wire encoding.

use core_types::{ErrorCode, HqError, HqResult, ValueType};

use crate::serializer::Serializer;

/// Bytecode opcodes for Harlequin execution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Control
    /// Do nothing
    Nop,
    /// Return from the current function
    Return,
    /// Suspend the execution context; the next run resumes after this instruction
    Yield,
    /// Call a function by signature
    Call(String),
    /// Pop a function value and call it
    CallValue,
    /// Pop a value and raise it as an exception
    Raise,
    /// Stop the execution context in `Abort` without raising
    Abort,

    // Loads and stores
    /// Push a module constant
    LoadConstant(u32),
    /// Push a global variable
    LoadGlobal(String),
    /// Pop into a global variable
    StoreGlobal(String),
    /// Push a local slot
    LoadLocal(u32),
    /// Pop into a local slot
    StoreLocal(u32),
    /// Push an I/O register
    LoadParam(u32),
    /// Pop into an I/O register
    StoreParam(u32),
    /// Pop an object, push one of its members
    LoadObject(String),
    /// Pop a value then an object, store the value into a member
    StoreObject(String),
    /// Pop an index then an array, push the element
    LoadArray,
    /// Pop a value, an index, then an array, store the element
    StoreArray,

    // Stack
    /// Push null
    PushNull,
    /// Push a boolean literal
    PushBool(bool),
    /// Discard the top value
    Pop,
    /// Duplicate the top value
    Dup,

    // Construction
    /// Push a new object of a declared class
    InitObject(String),
    /// Push a new null-filled array
    InitArray(u32),
    /// Push a function value
    InitFunction(String),

    // Branches (absolute instruction index)
    /// Unconditional branch
    Branch(u32),
    /// Pop and branch when truthy
    BranchIfTrue(u32),
    /// Pop and branch when falsy
    BranchIfFalse(u32),

    // Arithmetic and comparison
    /// Add top two values (string concatenation for strings)
    Add,
    /// Subtract top from second-top
    Sub,
    /// Multiply top two values
    Mul,
    /// Divide second-top by top
    Div,
    /// Remainder of second-top by top
    Mod,
    /// Equality
    Eq,
    /// Inequality
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Logical NOT of the top value's truthiness
    Not,

    // Bitwise, integers of one type
    /// Complement an integer, or negate a boolean
    BitNot,
    /// Exclusive or of two integers or two booleans
    BitXor,
    /// Shift the top integer left; bits shifted past the width are lost
    LeftShift(u8),
    /// Pop an amount then a value, rotate the value left
    LeftRotate,
    /// Pop an amount then a value, rotate the value right
    RightRotate,

    // Conversion
    /// Pop an array or string, push its length as uint32
    Length,
    /// Convert the top value to a primitive type or string
    Cast(ValueType),
}

impl Opcode {
    /// Mnemonic used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Return => "return",
            Opcode::Yield => "yield",
            Opcode::Call(_) => "call",
            Opcode::CallValue => "call_value",
            Opcode::Raise => "raise",
            Opcode::Abort => "abort",
            Opcode::LoadConstant(_) => "load_constant",
            Opcode::LoadGlobal(_) => "load_global",
            Opcode::StoreGlobal(_) => "store_global",
            Opcode::LoadLocal(_) => "load_local",
            Opcode::StoreLocal(_) => "store_local",
            Opcode::LoadParam(_) => "load_param",
            Opcode::StoreParam(_) => "store_param",
            Opcode::LoadObject(_) => "load_object",
            Opcode::StoreObject(_) => "store_object",
            Opcode::LoadArray => "load_array",
            Opcode::StoreArray => "store_array",
            Opcode::PushNull => "push_null",
            Opcode::PushBool(_) => "push_bool",
            Opcode::Pop => "pop",
            Opcode::Dup => "dup",
            Opcode::InitObject(_) => "init_object",
            Opcode::InitArray(_) => "init_array",
            Opcode::InitFunction(_) => "init_function",
            Opcode::Branch(_) => "branch",
            Opcode::BranchIfTrue(_) => "branch_if_true",
            Opcode::BranchIfFalse(_) => "branch_if_false",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::Lt => "lt",
            Opcode::Le => "le",
            Opcode::Gt => "gt",
            Opcode::Ge => "ge",
            Opcode::Not => "not",
            Opcode::BitNot => "bit_not",
            Opcode::BitXor => "bit_xor",
            Opcode::LeftShift(_) => "left_shift",
            Opcode::LeftRotate => "left_rotate",
            Opcode::RightRotate => "right_rotate",
            Opcode::Length => "length",
            Opcode::Cast(_) => "cast",
        }
    }

    /// Whether `Cast` accepts `target`: a number, a boolean or a string.
    pub fn is_cast_target(target: ValueType) -> bool {
        (target.is_primitive() && target != ValueType::Null) || target == ValueType::String
    }

    /// Branch target, if this is a branch.
    pub fn branch_target(&self) -> Option<u32> {
        match self {
            Opcode::Branch(target) | Opcode::BranchIfTrue(target) | Opcode::BranchIfFalse(target) => {
                Some(*target)
            }
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Opcode::Nop => 0,
            Opcode::Return => 1,
            Opcode::Yield => 2,
            Opcode::Call(_) => 3,
            Opcode::CallValue => 4,
            Opcode::Raise => 5,
            Opcode::LoadConstant(_) => 6,
            Opcode::LoadGlobal(_) => 7,
            Opcode::StoreGlobal(_) => 8,
            Opcode::LoadLocal(_) => 9,
            Opcode::StoreLocal(_) => 10,
            Opcode::LoadParam(_) => 11,
            Opcode::StoreParam(_) => 12,
            Opcode::LoadObject(_) => 13,
            Opcode::StoreObject(_) => 14,
            Opcode::LoadArray => 15,
            Opcode::StoreArray => 16,
            Opcode::PushNull => 17,
            Opcode::PushBool(_) => 18,
            Opcode::Pop => 19,
            Opcode::Dup => 20,
            Opcode::InitObject(_) => 21,
            Opcode::InitArray(_) => 22,
            Opcode::InitFunction(_) => 23,
            Opcode::Branch(_) => 24,
            Opcode::BranchIfTrue(_) => 25,
            Opcode::BranchIfFalse(_) => 26,
            Opcode::Add => 27,
            Opcode::Sub => 28,
            Opcode::Mul => 29,
            Opcode::Div => 30,
            Opcode::Mod => 31,
            Opcode::Eq => 32,
            Opcode::Ne => 33,
            Opcode::Lt => 34,
            Opcode::Le => 35,
            Opcode::Gt => 36,
            Opcode::Ge => 37,
            Opcode::Not => 38,
            Opcode::Abort => 39,
            Opcode::BitNot => 40,
            Opcode::BitXor => 41,
            Opcode::LeftShift(_) => 42,
            Opcode::LeftRotate => 43,
            Opcode::RightRotate => 44,
            Opcode::Length => 45,
            Opcode::Cast(_) => 46,
        }
    }

    /// Encode this opcode as a tag byte plus operand.
    pub fn encode(&self, ser: &mut Serializer) -> HqResult<()> {
        ser.write_u8(self.tag())?;
        match self {
            Opcode::Call(name)
            | Opcode::LoadGlobal(name)
            | Opcode::StoreGlobal(name)
            | Opcode::LoadObject(name)
            | Opcode::StoreObject(name)
            | Opcode::InitObject(name)
            | Opcode::InitFunction(name) => ser.write_string(name),
            Opcode::LoadConstant(index)
            | Opcode::LoadLocal(index)
            | Opcode::StoreLocal(index)
            | Opcode::LoadParam(index)
            | Opcode::StoreParam(index)
            | Opcode::InitArray(index)
            | Opcode::Branch(index)
            | Opcode::BranchIfTrue(index)
            | Opcode::BranchIfFalse(index) => ser.write_u32(*index),
            Opcode::PushBool(flag) => ser.write_bool(*flag),
            Opcode::LeftShift(amount) => ser.write_u8(*amount),
            Opcode::Cast(target) => ser.write_u8(target.tag()),
            _ => Ok(()),
        }
    }

    /// Decode one opcode written by [`Opcode::encode`].
    pub fn decode(ser: &mut Serializer) -> HqResult<Self> {
        let tag = ser.read_u8()?;
        let opcode = match tag {
            0 => Opcode::Nop,
            1 => Opcode::Return,
            2 => Opcode::Yield,
            3 => Opcode::Call(ser.read_string()?),
            4 => Opcode::CallValue,
            5 => Opcode::Raise,
            6 => Opcode::LoadConstant(ser.read_u32()?),
            7 => Opcode::LoadGlobal(ser.read_string()?),
            8 => Opcode::StoreGlobal(ser.read_string()?),
            9 => Opcode::LoadLocal(ser.read_u32()?),
            10 => Opcode::StoreLocal(ser.read_u32()?),
            11 => Opcode::LoadParam(ser.read_u32()?),
            12 => Opcode::StoreParam(ser.read_u32()?),
            13 => Opcode::LoadObject(ser.read_string()?),
            14 => Opcode::StoreObject(ser.read_string()?),
            15 => Opcode::LoadArray,
            16 => Opcode::StoreArray,
            17 => Opcode::PushNull,
            18 => Opcode::PushBool(ser.read_bool()?),
            19 => Opcode::Pop,
            20 => Opcode::Dup,
            21 => Opcode::InitObject(ser.read_string()?),
            22 => Opcode::InitArray(ser.read_u32()?),
            23 => Opcode::InitFunction(ser.read_string()?),
            24 => Opcode::Branch(ser.read_u32()?),
            25 => Opcode::BranchIfTrue(ser.read_u32()?),
            26 => Opcode::BranchIfFalse(ser.read_u32()?),
            27 => Opcode::Add,
            28 => Opcode::Sub,
            29 => Opcode::Mul,
            30 => Opcode::Div,
            31 => Opcode::Mod,
            32 => Opcode::Eq,
            33 => Opcode::Ne,
            34 => Opcode::Lt,
            35 => Opcode::Le,
            36 => Opcode::Gt,
            37 => Opcode::Ge,
            38 => Opcode::Not,
            39 => Opcode::Abort,
            40 => Opcode::BitNot,
            41 => Opcode::BitXor,
            42 => Opcode::LeftShift(ser.read_u8()?),
            43 => Opcode::LeftRotate,
            44 => Opcode::RightRotate,
            45 => Opcode::Length,
            46 => {
                let tag = ser.read_u8()?;
                let target = ValueType::from_tag(tag).ok_or_else(|| {
                    HqError::new(ErrorCode::InvalidData, format!("unknown cast target {}", tag))
                })?;
                Opcode::Cast(target)
            }
            _ => {
                return Err(HqError::new(
                    ErrorCode::InvalidData,
                    format!("unknown opcode tag {}", tag),
                ))
            }
        };
        Ok(opcode)
    }
}
