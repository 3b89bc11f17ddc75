//! Contract compliance tests for bytecode_system
//!
//! These tests pin the wire format and the error codes hosts depend on.

use bytecode_system::{
    Constant, EndianOrder, FunctionDef, ModuleDef, Opcode, Serializer, SerializerMode,
};
use core_types::constants::{MODULE_MAGIC, MODULE_VERSION};
use core_types::ErrorCode;

/// Contract: blobs start with magic, version and payload length, little-endian
#[test]
fn contract_module_blob_header() {
    let mut module = ModuleDef::new("Contract");
    module.add_constant(Constant::Bool(true));
    let bytes = module.to_bytes().unwrap();

    assert_eq!(&bytes[0..4], &MODULE_MAGIC);
    assert_eq!(&bytes[4..8], &MODULE_VERSION.to_le_bytes());
    assert_eq!(&bytes[8..12], &((bytes.len() - 12) as u32).to_le_bytes());
}

/// Contract: malformed blobs report InvalidData, never panic
#[test]
fn contract_malformed_blob_is_invalid_data() {
    let mut module = ModuleDef::new("Contract");
    let mut f = FunctionDef::script("Contract.f()");
    f.emit(Opcode::Call("Contract.g()".to_string()));
    f.emit(Opcode::Return);
    module.add_function(f);
    let bytes = module.to_bytes().unwrap();

    for cut in 0..bytes.len() {
        let err = ModuleDef::from_bytes(&bytes[..cut]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidData, "cut at {}", cut);
    }
}

/// Contract: writing to a reader serializer is InvalidType
#[test]
fn contract_reader_is_read_only() {
    let mut ser = Serializer::new(SerializerMode::Reader);
    ser.load_buffer(&[0]).unwrap();
    assert_eq!(ser.write_bool(true).unwrap_err().code(), ErrorCode::InvalidType);
    assert_eq!(ser.stream_len(), 1);
}

/// Contract: Unknown is not a selectable byte order
#[test]
fn contract_unknown_endianness() {
    let mut ser = Serializer::new(SerializerMode::Writer);
    assert_eq!(
        ser.set_endianness(EndianOrder::Unknown).unwrap_err().code(),
        ErrorCode::InvalidArg
    );
}

/// Contract: reading past the end is StreamEnd
#[test]
fn contract_stream_end() {
    let mut ser = Serializer::new(SerializerMode::Reader);
    ser.load_buffer(&[1]).unwrap();
    ser.read_u8().unwrap();
    assert_eq!(ser.read_u8().unwrap_err().code(), ErrorCode::StreamEnd);
}
