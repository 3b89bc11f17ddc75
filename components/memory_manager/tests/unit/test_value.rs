//! Unit tests for value handles and container access

use core_types::{ErrorCode, ValueType};
use memory_manager::{Heap, ObjectLayout, Value, ValueData};

#[test]
fn test_every_scalar_round_trips_through_its_accessor() {
    let heap = Heap::new();
    assert!(Value::create_bool(&heap, true).as_bool().unwrap());
    assert_eq!(Value::create_int8(&heap, -8).as_int8().unwrap(), -8);
    assert_eq!(Value::create_int16(&heap, -16).as_int16().unwrap(), -16);
    assert_eq!(Value::create_int32(&heap, -32).as_int32().unwrap(), -32);
    assert_eq!(Value::create_int64(&heap, -64).as_int64().unwrap(), -64);
    assert_eq!(Value::create_uint8(&heap, 8).as_uint8().unwrap(), 8);
    assert_eq!(Value::create_uint16(&heap, 16).as_uint16().unwrap(), 16);
    assert_eq!(Value::create_uint32(&heap, 32).as_uint32().unwrap(), 32);
    assert_eq!(Value::create_uint64(&heap, 64).as_uint64().unwrap(), 64);
    assert_eq!(Value::create_float32(&heap, 1.5).as_float32().unwrap(), 1.5);
    assert_eq!(Value::create_float64(&heap, 2.5).as_float64().unwrap(), 2.5);
    assert_eq!(Value::create_string(&heap, "hi").as_str().unwrap(), "hi");
    assert_eq!(
        Value::create_function(&heap, "Main.f()").function_signature().unwrap(),
        "Main.f()"
    );
}

#[test]
fn test_type_tags_match_payload() {
    let heap = Heap::new();
    assert_eq!(Value::null().value_type(), ValueType::Null);
    assert_eq!(Value::create_null(&heap).value_type(), ValueType::Null);
    assert_eq!(Value::create_uint64(&heap, 1).value_type(), ValueType::Uint64);
    assert_eq!(Value::create_array(&heap, 0).unwrap().value_type(), ValueType::Array);
    assert_eq!(Value::create_native(&heap, 5u32).value_type(), ValueType::Native);
    let layout = ObjectLayout::new("A", ["x"]);
    assert_eq!(Value::create_object(&heap, &layout).value_type(), ValueType::Object);
}

#[test]
fn test_reference_counting() {
    let heap = Heap::new();
    let value = Value::create_string(&heap, "shared");
    let weak = value.downgrade();
    let copies: Vec<_> = (0..3).map(|_| value.clone()).collect();
    assert_eq!(value.ref_count(), 4);
    drop(copies);
    assert_eq!(value.ref_count(), 1);
    drop(value);
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_array_holds_references() {
    let heap = Heap::new();
    let array = Value::create_array(&heap, 3).unwrap();
    let item = Value::create_int32(&heap, 11);
    array.set_array_element(2, item.clone()).unwrap();
    assert_eq!(item.ref_count(), 2);
    assert!(Value::ptr_eq(&array.array_element(2).unwrap(), &item));

    array.set_array_element(2, Value::null()).unwrap();
    assert_eq!(item.ref_count(), 1);
}

#[test]
fn test_non_array_access_is_invalid_type() {
    let heap = Heap::new();
    let scalar = Value::create_int32(&heap, 1);
    assert_eq!(scalar.array_len().unwrap_err().code(), ErrorCode::InvalidType);
    assert_eq!(scalar.object_member("x").unwrap_err().code(), ErrorCode::InvalidType);
}

#[test]
fn test_object_layout_is_shared() {
    let heap = Heap::new();
    let layout = ObjectLayout::new("Game.Point", ["x", "y"]);
    let a = Value::create_object(&heap, &layout);
    let b = Value::create_object(&heap, &layout);
    assert!(std::sync::Arc::ptr_eq(
        a.object_layout().unwrap(),
        b.object_layout().unwrap()
    ));
    a.set_object_member("x", Value::create_int8(&heap, 1)).unwrap();
    assert!(b.object_member("x").unwrap().is_null());
}

#[test]
fn test_payload_match() {
    let heap = Heap::new();
    let value = Value::create_int16(&heap, 300);
    match value.data() {
        ValueData::Int16(raw) => assert_eq!(*raw, 300),
        _ => panic!("unexpected payload"),
    }
}

#[test]
fn test_expose_and_hide() {
    let heap = Heap::new();
    let array = Value::create_array(&heap, 0).unwrap();
    assert!(!array.is_exposed());
    array.gc_expose().unwrap();
    assert!(array.is_exposed());
    array.gc_hide().unwrap();
    assert!(!array.is_exposed());
    assert_eq!(
        Value::create_null(&heap).gc_hide().unwrap_err().code(),
        ErrorCode::InvalidType
    );
}

#[test]
fn test_display() {
    let heap = Heap::new();
    let layout = ObjectLayout::new("P", ["a"]);
    let object = Value::create_object(&heap, &layout);
    object.set_object_member("a", Value::create_bool(&heap, true)).unwrap();
    assert_eq!(object.to_string(), "P{a: true}");
    assert_eq!(Value::create_function(&heap, "f()").to_string(), "function<f()>");
}
