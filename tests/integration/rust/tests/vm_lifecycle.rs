//! VM Lifecycle Integration Tests
//!
//! Creation, reporting, background collection and disposal of virtual
//! machines hosting real scripts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytecode_system::{Constant, FunctionDef, ModuleDef, Opcode};
use core_types::{ErrorCode, MessageType, ReportConfig};
use integration_tests::load_and_run;
use interpreter::{ExecStatus, ExecutionContext, GcMode, RunMode, VmContext, VmInit};
use memory_manager::Value;
use parking_lot::Mutex;

/// `Ring.make()` builds a ring of as many arrays as register 0 says and
/// returns one of them.
fn ring_module() -> ModuleDef {
    let mut def = ModuleDef::new("Ring");
    let zero = def.add_constant(Constant::Uint32(0));
    let one = def.add_constant(Constant::Uint32(1));

    let mut make = FunctionDef::script("Ring.make()").with_arity(0, 1);
    make.add_local("n");
    make.add_local("first");
    make.add_local("current");
    make.emit(Opcode::LoadParam(0)); // 0
    make.emit(Opcode::StoreLocal(0));
    make.emit(Opcode::InitArray(1)); // 2
    make.emit(Opcode::Dup);
    make.emit(Opcode::StoreLocal(1));
    make.emit(Opcode::StoreLocal(2));
    make.emit(Opcode::LoadLocal(0)); // 6: loop head
    make.emit(Opcode::LoadConstant(one));
    make.emit(Opcode::Le);
    make.emit(Opcode::BranchIfTrue(21));
    make.emit(Opcode::InitArray(1)); // 10: link back to current
    make.emit(Opcode::Dup);
    make.emit(Opcode::LoadConstant(zero));
    make.emit(Opcode::LoadLocal(2));
    make.emit(Opcode::StoreArray);
    make.emit(Opcode::StoreLocal(2));
    make.emit(Opcode::LoadLocal(0)); // 16
    make.emit(Opcode::LoadConstant(one));
    make.emit(Opcode::Sub);
    make.emit(Opcode::StoreLocal(0));
    make.emit(Opcode::Branch(6)); // 20
    make.emit(Opcode::LoadLocal(1)); // 21: close the ring
    make.emit(Opcode::LoadConstant(zero));
    make.emit(Opcode::LoadLocal(2));
    make.emit(Opcode::StoreArray);
    make.emit(Opcode::LoadLocal(1));
    make.emit(Opcode::Return);
    def.add_function(make);
    def
}

fn make_ring(vm: &VmContext, size: u32) -> ExecutionContext {
    let exec = ExecutionContext::new(vm).unwrap();
    exec.initialize(&vm.function("Ring.make()").unwrap()).unwrap();
    exec.set_io_register(0, Value::create_uint32(vm, size)).unwrap();
    exec.run(RunMode::Full).unwrap();
    assert!(exec.has_status(ExecStatus::Complete));
    exec
}

fn ring_len(start: &Value) -> usize {
    let mut len = 1;
    let mut current = start.array_element(0).unwrap();
    while !Value::ptr_eq(&current, start) {
        len += 1;
        current = current.array_element(0).unwrap();
    }
    len
}

#[test]
fn test_ring_is_collected_once_unreachable() {
    let vm = VmContext::new(VmInit::default()).unwrap();
    vm.load_module("Ring", &ring_module().to_bytes().unwrap()).unwrap();

    let exec = make_ring(&vm, 16);
    let ring = exec.io_register(0).unwrap();
    assert_eq!(ring_len(&ring), 16);
    let weak = ring.downgrade();
    drop(ring);

    exec.set_io_register(0, Value::null()).unwrap();
    vm.run_garbage_collector(GcMode::Full).unwrap();
    assert!(weak.upgrade().is_none());
    assert!(vm.gc_stats().freed_last_cycle >= 16);
}

#[test]
fn test_background_thread_collects_rings() {
    let init = VmInit {
        gc_enable_thread: true,
        gc_time_wait_ms: 1,
        ..VmInit::default()
    };
    let vm = VmContext::new(init).unwrap();
    vm.load_module("Ring", &ring_module().to_bytes().unwrap()).unwrap();

    let exec = make_ring(&vm, 8);
    let weaks: Vec<_> = (0..4)
        .map(|_| {
            exec.reset().unwrap();
            exec.set_io_register(0, Value::create_uint32(&vm, 8)).unwrap();
            exec.run(RunMode::Full).unwrap();
            let ring = exec.io_register(0).unwrap();
            assert_eq!(ring_len(&ring), 8);
            ring.downgrade()
        })
        .collect();
    exec.set_io_register(0, Value::null()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while weaks.iter().any(|weak| weak.upgrade().is_some()) {
        assert!(Instant::now() < deadline, "rings were never collected");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(vm.gc_stats().cycles_completed >= 1);

    drop(exec);
    vm.dispose().unwrap();
}

#[test]
fn test_report_level_filters_callback() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    let init = VmInit {
        report: ReportConfig {
            callback: Some(Arc::new(move |kind: MessageType, text: &str| {
                sink.lock().push((kind, text.to_string()));
            })),
            level: MessageType::Fatal,
        },
        ..VmInit::default()
    };
    let vm = VmContext::new(init).unwrap();

    let mut def = ModuleDef::new("Oops");
    let mut main = FunctionDef::script("Oops.main()");
    main.emit(Opcode::PushNull);
    main.emit(Opcode::Raise);
    def.add_function(main);
    let exec = load_and_run(&vm, "Oops", &def, "Oops.main()").unwrap();
    assert!(exec.has_unhandled_exception());
    // Recoverable exceptions report at Error, below the configured level
    assert!(messages.lock().is_empty());

    vm.report().report(MessageType::Fatal, format_args!("host {}", "shutdown"));
    assert_eq!(
        *messages.lock(),
        vec![(MessageType::Fatal, "host shutdown".to_string())]
    );
}

#[test]
fn test_machines_are_isolated() {
    let first = VmContext::new(VmInit::default()).unwrap();
    let second = VmContext::new(VmInit::default()).unwrap();
    let mut def = ModuleDef::new("Shared");
    def.add_global("slot");
    let blob = def.to_bytes().unwrap();
    first.load_module("Shared", &blob).unwrap();
    second.load_module("Shared", &blob).unwrap();

    first
        .set_global_variable("slot", Value::create_int8(&first, 1))
        .unwrap();
    assert!(second.global_variable("slot").unwrap().is_null());

    let foreign = Value::create_int8(&first, 2);
    let err = second.set_global_variable("slot", foreign).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Mismatch);
}

#[test]
fn test_dispose_after_contexts_finish() {
    let vm = VmContext::new(VmInit {
        gc_enable_thread: true,
        ..VmInit::default()
    })
    .unwrap();
    vm.load_module("Ring", &ring_module().to_bytes().unwrap()).unwrap();
    let exec = make_ring(&vm, 3);
    let ring = exec.io_register(0).unwrap();

    assert_eq!(vm.dispose().unwrap_err().code(), ErrorCode::InvalidOperation);
    drop(exec);
    vm.dispose().unwrap();

    // Containers still held by the host are emptied
    assert!(ring.array_element(0).unwrap().is_null());
    assert_eq!(
        vm.load_module("Ring", &ring_module().to_bytes().unwrap())
            .unwrap_err()
            .code(),
        ErrorCode::InvalidOperation
    );
}
