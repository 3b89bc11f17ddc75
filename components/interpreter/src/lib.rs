//! Bytecode interpreter for the Harlequin runtime
//!
//! This crate provides the virtual machine and its execution contexts:
//! - [`VmContext`] owning the heap, collector, module registry and globals
//! - [`ExecutionContext`] cooperative fibers with I/O registers and a
//!   status state machine
//! - A match-based dispatch loop with guarded-block exception unwinding
//! - Native function binding through [`CallContext`]
//!
//! # Example
//!
//! ```
//! use bytecode_system::{FunctionDef, ModuleDef, Opcode};
//! use interpreter::{ExecStatus, ExecutionContext, RunMode, VmContext, VmInit};
//! use memory_manager::Value;
//!
//! let vm = VmContext::new(VmInit::default()).unwrap();
//!
//! let mut module = ModuleDef::new("Demo");
//! module.add_function(FunctionDef::native("Demo.double(int64)", 1, 1));
//! let mut main = FunctionDef::script("Demo.main()").with_arity(0, 1);
//! main.emit(Opcode::LoadParam(0));
//! main.emit(Opcode::Call("Demo.double(int64)".to_string()));
//! main.emit(Opcode::Yield);
//! main.emit(Opcode::Return);
//! module.add_function(main);
//! vm.add_module(module).unwrap();
//!
//! vm.bind_native_function("Demo.double(int64)", |call| {
//!     let doubled = call.arg(0)?.as_int64()? * 2;
//!     call.push_return(Value::create_int64(call.vm(), doubled))
//! })
//! .unwrap();
//!
//! let exec = ExecutionContext::new(&vm).unwrap();
//! exec.initialize(&vm.function("Demo.main()").unwrap()).unwrap();
//! exec.set_io_register(0, Value::create_int64(&vm, 21)).unwrap();
//!
//! exec.run(RunMode::Full).unwrap();
//! assert!(exec.has_status(ExecStatus::Yielded));
//! exec.run(RunMode::Full).unwrap();
//! assert!(exec.has_status(ExecStatus::Complete));
//! assert_eq!(exec.io_register(0).unwrap().as_int64().unwrap(), 42);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod call_frame;
pub mod context;
mod dispatch;
pub mod gc_integration;
pub mod native;
pub mod registry;
pub mod vm;

// Re-export main types at crate root
pub use call_frame::Frame;
pub use context::{AbortHandle, ExecStatus, ExecutionContext, RunMode};
pub use gc_integration::GcMode;
pub use native::{CallContext, NativeFunction};
pub use registry::{Function, Module};
pub use vm::{ModuleInit, VmContext, VmInit};
