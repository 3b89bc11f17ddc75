//! Bytecode system for the Harlequin runtime
//!
//! This crate provides the instruction set, function and module definitions,
//! the binary module blob format and the endian-aware serializer beneath it.
//!
//! # Features
//!
//! - Stack-machine opcode set with a stable wire encoding
//! - Function definitions with guarded blocks for exception handling
//! - Module blobs (`HQMD` magic, versioned, length-checked)
//! - Serializer with native, little and big endian modes
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Constant, FunctionDef, ModuleDef, Opcode};
//!
//! let mut module = ModuleDef::new("Demo");
//!
//! // Add constants
//! let idx = module.add_constant(Constant::Int32(42));
//!
//! // Emit instructions
//! let mut main = FunctionDef::script("Demo.main()");
//! main.emit(Opcode::LoadConstant(idx));
//! main.emit(Opcode::StoreParam(0));
//! main.emit(Opcode::Return);
//! module.add_function(main);
//!
//! // Serialize
//! let bytes = module.to_bytes().unwrap();
//! let restored = ModuleDef::from_bytes(&bytes).unwrap();
//! assert_eq!(restored, module);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod constant;
pub mod function;
pub mod module;
pub mod opcode;
pub mod serializer;

// Re-export main types at crate root
pub use constant::Constant;
pub use function::{ExceptionHandler, FunctionDef, FunctionKind, GuardedBlock};
pub use module::{ModuleDef, ObjectSchema};
pub use opcode::Opcode;
pub use serializer::{EndianOrder, Serializer, SerializerMode};
