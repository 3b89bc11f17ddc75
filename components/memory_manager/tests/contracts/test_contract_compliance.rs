//! Contract compliance tests for memory_manager
//!
//! These tests pin the observable collector and value semantics hosts rely on.

use core_types::{ErrorCode, ValueType};
use memory_manager::{
    GarbageCollector, GcConfig, GcPhase, Heap, MarkColor, RootSource, StepMode, Value,
};

struct NoRoots;

impl RootSource for NoRoots {
    fn visit_roots(&self, _visit: &mut dyn FnMut(&Value)) {}
}

/// Contract: a fresh collector is idle and reports the default timing
#[test]
fn contract_collector_starts_idle() {
    let gc = GarbageCollector::new(Heap::new(), GcConfig::default());
    assert_eq!(gc.phase(), GcPhase::Idle);
    assert_eq!(gc.config().time_slice.as_millis(), 8);
    assert_eq!(gc.config().time_wait.as_millis(), 3);
    assert_eq!(gc.stats().cycles_completed, 0);
}

/// Contract: a full step always leaves the collector idle with one more cycle
#[test]
fn contract_full_step_completes() {
    let heap = Heap::new();
    let gc = GarbageCollector::new(heap, GcConfig::default());
    assert!(gc.step(&NoRoots, StepMode::Full));
    assert_eq!(gc.phase(), GcPhase::Idle);
    assert_eq!(gc.stats().cycles_completed, 1);
}

/// Contract: exposed containers are never collected
#[test]
fn contract_exposed_never_collected() {
    let heap = Heap::new();
    let gc = GarbageCollector::new(heap.clone(), GcConfig::default());
    let array = Value::create_array(&heap, 1).unwrap();
    array.set_array_element(0, array.clone()).unwrap();
    array.gc_expose().unwrap();
    let weak = array.downgrade();
    drop(array);

    for _ in 0..3 {
        gc.collect(&NoRoots);
    }
    let array = weak.upgrade().unwrap();
    assert!(Value::ptr_eq(&array.array_element(0).unwrap(), &array));
    array.gc_hide().unwrap();
    gc.collect(&NoRoots);
}

/// Contract: reachable survivors are black after a cycle, scalars stay white
#[test]
fn contract_mark_colors_after_cycle() {
    let heap = Heap::new();
    let gc = GarbageCollector::new(heap.clone(), GcConfig::default());
    let array = Value::create_array(&heap, 0).unwrap();
    let scalar = Value::create_int32(&heap, 1);
    array.gc_expose().unwrap();
    gc.collect(&NoRoots);
    assert_eq!(array.mark_color(), MarkColor::Black);
    assert_eq!(scalar.mark_color(), MarkColor::White);
}

/// Contract: exposing a null value is InvalidType
#[test]
fn contract_expose_null_invalid_type() {
    let heap = Heap::new();
    let null = Value::create_null(&heap);
    assert_eq!(null.value_type(), ValueType::Null);
    assert_eq!(null.gc_expose().unwrap_err().code(), ErrorCode::InvalidType);
}

/// Contract: values cannot be stored across heaps
#[test]
fn contract_cross_heap_store_is_mismatch() {
    let a = Heap::new();
    let b = Heap::new();
    let array = Value::create_array(&a, 1).unwrap();
    let err = array
        .set_array_element(0, Value::create_string(&b, "x"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Mismatch);
    array.set_array_element(0, Value::null()).unwrap();
}
