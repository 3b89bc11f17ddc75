//! Tests for the Serializer stream

use bytecode_system::{EndianOrder, Serializer, SerializerMode};
use core_types::ErrorCode;

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("hq_serializer_{}_{}", std::process::id(), name))
}

// ============================================================================
// Byte order
// ============================================================================

#[test]
fn test_big_endian_round_trip() {
    let mut writer = Serializer::new(SerializerMode::Writer);
    writer.set_endianness(EndianOrder::Big).unwrap();
    writer.write_i64(-42).unwrap();
    writer.write_f64(3.75).unwrap();
    writer.write_u32(0xDEAD_BEEF).unwrap();
    assert_eq!(&writer.as_bytes()[16..20], &[0xDE, 0xAD, 0xBE, 0xEF]);

    let mut reader = Serializer::new(SerializerMode::Reader);
    reader.load_buffer(writer.as_bytes()).unwrap();
    reader.set_endianness(EndianOrder::Big).unwrap();
    assert_eq!(reader.read_i64().unwrap(), -42);
    assert_eq!(reader.read_f64().unwrap(), 3.75);
    assert_eq!(reader.read_u32().unwrap(), 0xDEAD_BEEF);
}

#[test]
fn test_mismatched_order_reads_swapped_bytes() {
    let mut writer = Serializer::new(SerializerMode::Writer);
    writer.set_endianness(EndianOrder::Little).unwrap();
    writer.write_u16(0x0102).unwrap();

    let mut reader = Serializer::new(SerializerMode::Reader);
    reader.load_buffer(writer.as_bytes()).unwrap();
    reader.set_endianness(EndianOrder::Big).unwrap();
    assert_eq!(reader.read_u16().unwrap(), 0x0201);
}

#[test]
fn test_raw_buffers_are_never_swapped() {
    let mut writer = Serializer::new(SerializerMode::Writer);
    writer.set_endianness(EndianOrder::Big).unwrap();
    writer.write_buffer(&[1, 2, 3]).unwrap();
    assert_eq!(writer.as_bytes(), &[1, 2, 3]);
}

// ============================================================================
// Cursor and mode
// ============================================================================

#[test]
fn test_load_positions_cursor_by_mode() {
    let mut reader = Serializer::new(SerializerMode::Reader);
    reader.load_buffer(&[9, 8, 7]).unwrap();
    assert_eq!(reader.position(), 0);

    let mut writer = Serializer::new(SerializerMode::Writer);
    writer.load_buffer(&[9, 8, 7]).unwrap();
    assert_eq!(writer.position(), 3);
    writer.write_u8(6).unwrap();
    assert_eq!(writer.as_bytes(), &[9, 8, 7, 6]);
}

#[test]
fn test_set_position_bounds() {
    let mut ser = Serializer::new(SerializerMode::Reader);
    ser.load_buffer(&[1, 2]).unwrap();
    assert!(ser.set_position(2).is_ok());
    assert_eq!(ser.set_position(3).unwrap_err().code(), ErrorCode::InvalidArg);
}

#[test]
fn test_empty_buffer_rejected() {
    let mut ser = Serializer::new(SerializerMode::Reader);
    assert_eq!(ser.load_buffer(&[]).unwrap_err().code(), ErrorCode::InvalidArg);
}

#[test]
fn test_read_past_end_keeps_position() {
    let mut ser = Serializer::new(SerializerMode::Reader);
    ser.load_buffer(&[1, 2, 3]).unwrap();
    assert_eq!(ser.read_u32().unwrap_err().code(), ErrorCode::StreamEnd);
    assert_eq!(ser.position(), 0);
    assert_eq!(ser.read_u16().unwrap(), u16::from_ne_bytes([1, 2]));
}

// ============================================================================
// Files
// ============================================================================

#[test]
fn test_save_and_load_file() {
    let path = temp_path("save_load");
    let mut writer = Serializer::new(SerializerMode::Writer);
    writer.write_u32(11).unwrap();
    writer.save_file(&path, false).unwrap();
    writer.save_file(&path, true).unwrap();

    let mut reader = Serializer::new(SerializerMode::Reader);
    reader.load_file(&path).unwrap();
    assert_eq!(reader.stream_len(), 8);
    assert_eq!(reader.read_u32().unwrap(), 11);
    assert_eq!(reader.read_u32().unwrap(), 11);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_missing_file() {
    let mut ser = Serializer::new(SerializerMode::Reader);
    let err = ser.load_file(temp_path("does_not_exist")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FailedToOpenFile);
}
