//! Memory Manager - values, heaps and the cycle collector
//!
//! This component provides:
//! - Reference-counted [`Value`] handles over a tagged payload
//! - [`Heap`] allocation domains with a container registry and write barrier
//! - An incremental, time-sliced [`GarbageCollector`] for container cycles
//! - A background [`GcThread`] that drives collection concurrently
//!
//! # Examples
//!
//! ```
//! use memory_manager::{GarbageCollector, GcConfig, Heap, RootSource, Value};
//!
//! struct NoRoots;
//! impl RootSource for NoRoots {
//!     fn visit_roots(&self, _visit: &mut dyn FnMut(&Value)) {}
//! }
//!
//! let heap = Heap::new();
//! let gc = GarbageCollector::new(heap.clone(), GcConfig::default());
//!
//! let a = Value::create_array(&heap, 1).unwrap();
//! a.set_array_element(0, a.clone()).unwrap();
//! let weak = a.downgrade();
//! drop(a);
//!
//! gc.collect(&NoRoots);
//! assert!(weak.upgrade().is_none());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod concurrent_gc;
pub mod gc;
pub mod heap;
pub mod object;
pub mod value;

pub use concurrent_gc::{AtomicMarkColor, GcHost, GcPhase, GcThread, MarkStack};
pub use gc::{GarbageCollector, GcConfig, GcStats, MarkColor, RootSource, StepMode};
pub use heap::{AsHeap, Heap};
pub use object::{ArrayData, ObjectLayout, ScriptObject};
pub use value::{Value, ValueData, WeakValue};
