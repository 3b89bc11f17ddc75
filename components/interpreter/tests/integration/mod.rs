//! Integration tests for interpreter
//!
//! Tests interaction between the VM, execution contexts and the collector

use std::time::{Duration, Instant};

use bytecode_system::{Constant, FunctionDef, ModuleDef, ObjectSchema, Opcode};
use interpreter::{ExecStatus, ExecutionContext, GcMode, RunMode, VmContext, VmInit};
use memory_manager::Value;

/// Module with `Cycle.make()` returning a self-referencing array and
/// `Cycle.keep()` storing one in the `kept` global.
fn cycle_module() -> ModuleDef {
    let mut def = ModuleDef::new("Cycle");
    def.add_global("kept");
    let zero = def.add_constant(Constant::Int32(0));

    let mut make = FunctionDef::script("Cycle.make()").with_arity(0, 1);
    make.add_local("array");
    make.emit(Opcode::InitArray(1));
    make.emit(Opcode::StoreLocal(0));
    make.emit(Opcode::LoadLocal(0));
    make.emit(Opcode::LoadConstant(zero));
    make.emit(Opcode::LoadLocal(0));
    make.emit(Opcode::StoreArray);
    make.emit(Opcode::LoadLocal(0));
    make.emit(Opcode::Return);
    def.add_function(make);

    let mut keep = FunctionDef::script("Cycle.keep()");
    keep.emit(Opcode::Call("Cycle.make()".to_string()));
    keep.emit(Opcode::StoreGlobal("kept".to_string()));
    keep.emit(Opcode::Return);
    def.add_function(keep);
    def
}

fn run_to_end(vm: &VmContext, signature: &str) -> ExecutionContext {
    let exec = ExecutionContext::new(vm).unwrap();
    exec.initialize(&vm.function(signature).unwrap()).unwrap();
    exec.run(RunMode::Full).unwrap();
    assert!(exec.has_status(ExecStatus::Complete));
    exec
}

#[test]
fn test_unreachable_cycle_is_collected() {
    let vm = VmContext::new(VmInit::default()).unwrap();
    vm.add_module(cycle_module()).unwrap();

    let exec = run_to_end(&vm, "Cycle.make()");
    let weak = exec.io_register(0).unwrap().downgrade();

    // Still rooted through the register
    vm.run_garbage_collector(GcMode::Full).unwrap();
    let array = weak.upgrade().unwrap();
    assert!(Value::ptr_eq(&array.array_element(0).unwrap(), &array));
    drop(array);

    exec.set_io_register(0, Value::null()).unwrap();
    vm.run_garbage_collector(GcMode::Full).unwrap();
    assert!(weak.upgrade().is_none());
    assert!(vm.gc_stats().freed_total >= 1);
}

#[test]
fn test_cycle_rooted_in_global_survives() {
    let vm = VmContext::new(VmInit::default()).unwrap();
    vm.add_module(cycle_module()).unwrap();
    let _exec = run_to_end(&vm, "Cycle.keep()");

    vm.run_garbage_collector(GcMode::Full).unwrap();
    vm.run_garbage_collector(GcMode::Full).unwrap();
    let kept = vm.global_variable("kept").unwrap();
    assert!(Value::ptr_eq(&kept.array_element(0).unwrap(), &kept));

    let weak = kept.downgrade();
    drop(kept);
    vm.set_global_variable("kept", Value::null()).unwrap();
    vm.run_garbage_collector(GcMode::Full).unwrap();
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_dropped_context_releases_its_roots() {
    let vm = VmContext::new(VmInit::default()).unwrap();
    vm.add_module(cycle_module()).unwrap();
    let exec = run_to_end(&vm, "Cycle.make()");
    let weak = exec.io_register(0).unwrap().downgrade();

    drop(exec);
    vm.run_garbage_collector(GcMode::Full).unwrap();
    assert!(weak.upgrade().is_none());
    assert_eq!(vm.execution_count(), 0);
}

#[test]
fn test_incremental_steps_complete_a_cycle() {
    let init = VmInit {
        gc_time_slice_ms: 1,
        ..VmInit::default()
    };
    let vm = VmContext::new(init).unwrap();
    vm.add_module(cycle_module()).unwrap();
    let exec = run_to_end(&vm, "Cycle.make()");
    let weak = exec.io_register(0).unwrap().downgrade();
    exec.set_io_register(0, Value::null()).unwrap();

    let before = vm.gc_stats().cycles_completed;
    while vm.gc_stats().cycles_completed < before + 2 {
        vm.run_garbage_collector(GcMode::Step).unwrap();
    }
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_background_collector_thread() {
    let init = VmInit {
        gc_enable_thread: true,
        gc_time_wait_ms: 1,
        ..VmInit::default()
    };
    let vm = VmContext::new(init).unwrap();
    vm.add_module(cycle_module()).unwrap();
    let exec = run_to_end(&vm, "Cycle.make()");
    let weak = exec.io_register(0).unwrap().downgrade();
    exec.set_io_register(0, Value::null()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while weak.upgrade().is_some() {
        assert!(Instant::now() < deadline, "background collector made no progress");
        std::thread::sleep(Duration::from_millis(5));
    }

    drop(exec);
    vm.dispose().unwrap();
}

#[test]
fn test_scripts_run_while_collector_thread_is_active() {
    let init = VmInit {
        gc_enable_thread: true,
        gc_time_wait_ms: 1,
        ..VmInit::default()
    };
    let vm = VmContext::new(init).unwrap();
    let mut def = ModuleDef::new("Churn");
    def.add_object_schema(ObjectSchema::new("Churn.Node", ["next"]));
    let mut build = FunctionDef::script("Churn.build()").with_arity(0, 1);
    build.emit(Opcode::InitObject("Churn.Node".to_string()));
    build.emit(Opcode::Dup);
    build.emit(Opcode::InitObject("Churn.Node".to_string()));
    build.emit(Opcode::StoreObject("next".to_string()));
    build.emit(Opcode::Return);
    def.add_function(build);
    vm.add_module(def).unwrap();

    let exec = ExecutionContext::new(&vm).unwrap();
    exec.initialize(&vm.function("Churn.build()").unwrap()).unwrap();
    for _ in 0..200 {
        exec.reset().unwrap();
        exec.run(RunMode::Full).unwrap();
        assert!(exec.has_status(ExecStatus::Complete));
        let node = exec.io_register(0).unwrap();
        let next = node.object_member("next").unwrap();
        assert_eq!(next.object_type_name().unwrap(), "Churn.Node");
    }
}

#[test]
fn test_threads_share_one_vm() {
    let vm = VmContext::new(VmInit::default()).unwrap();
    let mut def = ModuleDef::new("Count");
    let limit = def.add_constant(Constant::Int64(1000));
    let one = def.add_constant(Constant::Int64(1));
    let start = def.add_constant(Constant::Int64(0));
    let mut count = FunctionDef::script("Count.run()").with_arity(0, 1);
    count.add_local("n");
    count.emit(Opcode::LoadConstant(start)); // 0
    count.emit(Opcode::StoreLocal(0));
    count.emit(Opcode::LoadLocal(0)); // 2
    count.emit(Opcode::LoadConstant(limit));
    count.emit(Opcode::Lt);
    count.emit(Opcode::BranchIfFalse(11));
    count.emit(Opcode::LoadLocal(0)); // 6
    count.emit(Opcode::LoadConstant(one));
    count.emit(Opcode::Add);
    count.emit(Opcode::StoreLocal(0));
    count.emit(Opcode::Branch(2)); // 10
    count.emit(Opcode::LoadLocal(0)); // 11
    count.emit(Opcode::Return);
    def.add_function(count);
    vm.add_module(def).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let vm = vm.clone();
            std::thread::spawn(move || {
                let exec = run_to_end(&vm, "Count.run()");
                exec.io_register(0).unwrap().as_int64().unwrap()
            })
        })
        .collect();
    for _ in 0..10 {
        vm.run_garbage_collector(GcMode::Step).unwrap();
    }
    for worker in workers {
        assert_eq!(worker.join().unwrap(), 1000);
    }
}
