//! Unit tests for ValueType

use core_types::ValueType;

#[test]
fn test_value_type_names() {
    assert_eq!(ValueType::Null.name(), "null");
    assert_eq!(ValueType::Bool.name(), "bool");
    assert_eq!(ValueType::Int64.name(), "int64");
    assert_eq!(ValueType::Uint8.name(), "uint8");
    assert_eq!(ValueType::Float32.name(), "float32");
    assert_eq!(ValueType::String.name(), "string");
    assert_eq!(ValueType::Native.name(), "native");
}

#[test]
fn test_value_type_tag_round_trip() {
    for ty in ValueType::ALL {
        assert_eq!(ValueType::from_tag(ty.tag()), Some(ty));
    }
}

#[test]
fn test_value_type_unknown_tag() {
    assert_eq!(ValueType::from_tag(200), None);
}

#[test]
fn test_value_type_classification() {
    let containers: Vec<_> = ValueType::ALL.iter().filter(|t| t.is_container()).collect();
    assert_eq!(containers, vec![&ValueType::Object, &ValueType::Array]);

    assert!(ValueType::Uint64.is_primitive());
    assert!(!ValueType::Function.is_primitive());
    assert!(!ValueType::Function.is_container());
}
