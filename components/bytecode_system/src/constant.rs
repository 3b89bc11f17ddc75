//! Module constant pool entries
//!
//! Constants are primitive literals and strings. They become runtime values
//! when a `LoadConstant` instruction executes.

use core_types::{ErrorCode, HqError, HqResult, ValueType};

use crate::serializer::Serializer;

/// A literal stored in a module's constant pool
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Null literal
    Null,
    /// Boolean literal
    Bool(bool),
    /// 8-bit signed literal
    Int8(i8),
    /// 16-bit signed literal
    Int16(i16),
    /// 32-bit signed literal
    Int32(i32),
    /// 64-bit signed literal
    Int64(i64),
    /// 8-bit unsigned literal
    Uint8(u8),
    /// 16-bit unsigned literal
    Uint16(u16),
    /// 32-bit unsigned literal
    Uint32(u32),
    /// 64-bit unsigned literal
    Uint64(u64),
    /// Single precision literal
    Float32(f32),
    /// Double precision literal
    Float64(f64),
    /// String literal
    String(String),
}

impl Constant {
    /// Runtime type this constant produces.
    pub fn value_type(&self) -> ValueType {
        match self {
            Constant::Null => ValueType::Null,
            Constant::Bool(_) => ValueType::Bool,
            Constant::Int8(_) => ValueType::Int8,
            Constant::Int16(_) => ValueType::Int16,
            Constant::Int32(_) => ValueType::Int32,
            Constant::Int64(_) => ValueType::Int64,
            Constant::Uint8(_) => ValueType::Uint8,
            Constant::Uint16(_) => ValueType::Uint16,
            Constant::Uint32(_) => ValueType::Uint32,
            Constant::Uint64(_) => ValueType::Uint64,
            Constant::Float32(_) => ValueType::Float32,
            Constant::Float64(_) => ValueType::Float64,
            Constant::String(_) => ValueType::String,
        }
    }

    /// Encode as the value type tag followed by the payload.
    pub fn encode(&self, ser: &mut Serializer) -> HqResult<()> {
        ser.write_u8(self.value_type().tag())?;
        match self {
            Constant::Null => Ok(()),
            Constant::Bool(v) => ser.write_bool(*v),
            Constant::Int8(v) => ser.write_i8(*v),
            Constant::Int16(v) => ser.write_i16(*v),
            Constant::Int32(v) => ser.write_i32(*v),
            Constant::Int64(v) => ser.write_i64(*v),
            Constant::Uint8(v) => ser.write_u8(*v),
            Constant::Uint16(v) => ser.write_u16(*v),
            Constant::Uint32(v) => ser.write_u32(*v),
            Constant::Uint64(v) => ser.write_u64(*v),
            Constant::Float32(v) => ser.write_f32(*v),
            Constant::Float64(v) => ser.write_f64(*v),
            Constant::String(v) => ser.write_string(v),
        }
    }

    /// Decode a constant written by [`Constant::encode`].
    pub fn decode(ser: &mut Serializer) -> HqResult<Self> {
        let tag = ser.read_u8()?;
        let ty = ValueType::from_tag(tag).ok_or_else(|| {
            HqError::new(ErrorCode::InvalidData, format!("unknown value tag {}", tag))
        })?;
        let constant = match ty {
            ValueType::Null => Constant::Null,
            ValueType::Bool => Constant::Bool(ser.read_bool()?),
            ValueType::Int8 => Constant::Int8(ser.read_i8()?),
            ValueType::Int16 => Constant::Int16(ser.read_i16()?),
            ValueType::Int32 => Constant::Int32(ser.read_i32()?),
            ValueType::Int64 => Constant::Int64(ser.read_i64()?),
            ValueType::Uint8 => Constant::Uint8(ser.read_u8()?),
            ValueType::Uint16 => Constant::Uint16(ser.read_u16()?),
            ValueType::Uint32 => Constant::Uint32(ser.read_u32()?),
            ValueType::Uint64 => Constant::Uint64(ser.read_u64()?),
            ValueType::Float32 => Constant::Float32(ser.read_f32()?),
            ValueType::Float64 => Constant::Float64(ser.read_f64()?),
            ValueType::String => Constant::String(ser.read_string()?),
            other => {
                return Err(HqError::new(
                    ErrorCode::InvalidData,
                    format!("{} cannot be a constant", other),
                ))
            }
        };
        Ok(constant)
    }
}
