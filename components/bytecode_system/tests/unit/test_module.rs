//! Tests for ModuleDef and the module blob

use bytecode_system::{
    Constant, ExceptionHandler, FunctionDef, GuardedBlock, ModuleDef, ObjectSchema, Opcode,
};
use core_types::{ErrorCode, ValueType};

fn guarded_module() -> ModuleDef {
    let mut module = ModuleDef::new("Tests/Guarded");
    let message = module.add_constant(Constant::String("boom".to_string()));
    module.add_constant(Constant::Uint64(u64::MAX));
    module.add_global("last_error");
    module.add_object_schema(ObjectSchema::new("Tests.Error", ["code"]));

    let mut main = FunctionDef::script("Tests/Guarded.main()");
    main.add_local("caught");
    main.emit(Opcode::LoadConstant(message));
    main.emit(Opcode::Raise);
    let handler = main.emit(Opcode::StoreLocal(0));
    main.emit(Opcode::Return);
    main.add_guarded_block(
        GuardedBlock::new(0, 2)
            .with_handler(ExceptionHandler::for_class("Tests.Error", handler))
            .with_handler(ExceptionHandler::for_type(ValueType::String, handler)),
    );
    module.add_function(main);
    module
}

#[test]
fn test_round_trip_preserves_guarded_blocks() {
    let module = guarded_module();
    let restored = ModuleDef::from_bytes(&module.to_bytes().unwrap()).unwrap();
    let main = restored.function("Tests/Guarded.main()").unwrap();
    assert_eq!(main.guarded_blocks.len(), 1);
    assert_eq!(main.guarded_blocks[0].handlers.len(), 2);
    assert_eq!(
        main.guarded_blocks[0].handlers[0].class_name.as_deref(),
        Some("Tests.Error")
    );
    assert_eq!(restored.constants[1], Constant::Uint64(u64::MAX));
}

#[test]
fn test_bad_magic() {
    let mut bytes = guarded_module().to_bytes().unwrap();
    bytes[0] = b'X';
    assert_eq!(ModuleDef::from_bytes(&bytes).unwrap_err().code(), ErrorCode::InvalidData);
}

#[test]
fn test_bad_version() {
    let mut bytes = guarded_module().to_bytes().unwrap();
    bytes[4] = 99;
    assert_eq!(ModuleDef::from_bytes(&bytes).unwrap_err().code(), ErrorCode::InvalidData);
}

#[test]
fn test_length_mismatch() {
    let mut bytes = guarded_module().to_bytes().unwrap();
    bytes.push(0);
    assert_eq!(ModuleDef::from_bytes(&bytes).unwrap_err().code(), ErrorCode::InvalidData);
}

#[test]
fn test_empty_and_short_input() {
    assert_eq!(ModuleDef::from_bytes(&[]).unwrap_err().code(), ErrorCode::InvalidData);
    assert_eq!(ModuleDef::from_bytes(b"HQMD").unwrap_err().code(), ErrorCode::InvalidData);
}

#[test]
fn test_constant_index_validated() {
    let mut module = ModuleDef::new("M");
    let mut f = FunctionDef::script("M.f()");
    f.emit(Opcode::LoadConstant(0));
    module.add_function(f);
    assert_eq!(module.validate().unwrap_err().code(), ErrorCode::InvalidData);
}
