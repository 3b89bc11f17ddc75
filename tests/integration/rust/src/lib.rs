//! Integration test suite for the Harlequin runtime
//!
//! This crate verifies the components work together across their
//! boundaries: module blobs built with `bytecode_system`, loaded and run by
//! `interpreter`, with values managed by `memory_manager`.

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use memory_manager;
}

use bytecode_system::ModuleDef;
use interpreter::{ExecStatus, ExecutionContext, RunMode, VmContext};

/// Serialize `def`, load the blob under `name` and run `entry` until it
/// stops yielding.
pub fn load_and_run(
    vm: &VmContext,
    name: &str,
    def: &ModuleDef,
    entry: &str,
) -> core_types::HqResult<ExecutionContext> {
    let bytes = def.to_bytes()?;
    vm.load_module(name, &bytes)?;
    let exec = ExecutionContext::new(vm)?;
    exec.initialize(&vm.function(entry)?)?;
    loop {
        exec.run(RunMode::Full)?;
        if !exec.has_status(ExecStatus::Yielded) {
            return Ok(exec);
        }
    }
}
