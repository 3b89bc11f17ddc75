//! Type tags for runtime values.
//!
//! The value payloads themselves live in `memory_manager`; this module only
//! carries the closed set of tags so every layer can name a type.

use std::fmt;

/// Closed set of runtime value types.
///
/// The discriminants are the wire tags used by module blobs and guarded
/// block handlers.
///
/// # Examples
///
/// ```
/// use core_types::ValueType;
///
/// assert!(ValueType::Int32.is_primitive());
/// assert!(ValueType::Array.is_container());
/// assert_eq!(ValueType::from_tag(ValueType::Float64.tag()), Some(ValueType::Float64));
/// assert_eq!(ValueType::Object.to_string(), "object");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// The absent value
    Null = 0,
    /// Boolean
    Bool = 1,
    /// Signed 8-bit integer
    Int8 = 2,
    /// Signed 16-bit integer
    Int16 = 3,
    /// Signed 32-bit integer
    Int32 = 4,
    /// Signed 64-bit integer
    Int64 = 5,
    /// Unsigned 8-bit integer
    Uint8 = 6,
    /// Unsigned 16-bit integer
    Uint16 = 7,
    /// Unsigned 32-bit integer
    Uint32 = 8,
    /// Unsigned 64-bit integer
    Uint64 = 9,
    /// Single precision float
    Float32 = 10,
    /// Double precision float
    Float64 = 11,
    /// Immutable UTF-8 string
    String = 12,
    /// Reference to a function by signature
    Function = 13,
    /// Class-typed object with named members
    Object = 14,
    /// Growable sequence of values
    Array = 15,
    /// Opaque host object
    Native = 16,
}

impl ValueType {
    /// All tags in discriminant order.
    pub const ALL: [ValueType; 17] = [
        ValueType::Null,
        ValueType::Bool,
        ValueType::Int8,
        ValueType::Int16,
        ValueType::Int32,
        ValueType::Int64,
        ValueType::Uint8,
        ValueType::Uint16,
        ValueType::Uint32,
        ValueType::Uint64,
        ValueType::Float32,
        ValueType::Float64,
        ValueType::String,
        ValueType::Function,
        ValueType::Object,
        ValueType::Array,
        ValueType::Native,
    ];

    /// The wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Resolves a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Numbers, booleans and null.
    pub fn is_primitive(self) -> bool {
        (self as u8) <= (ValueType::Float64 as u8)
    }

    /// Types whose slots can hold other values and so can form cycles.
    pub fn is_container(self) -> bool {
        matches!(self, ValueType::Object | ValueType::Array)
    }

    /// Lower-case name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int8 => "int8",
            ValueType::Int16 => "int16",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Uint8 => "uint8",
            ValueType::Uint16 => "uint16",
            ValueType::Uint32 => "uint32",
            ValueType::Uint64 => "uint64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::String => "string",
            ValueType::Function => "function",
            ValueType::Object => "object",
            ValueType::Array => "array",
            ValueType::Native => "native",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
