//! Collector integration for the virtual machine
//!
//! The VM is the collector's root source: module constants, globals and,
//! for every attached execution context, its frames, I/O registers and
//! current exception.

use std::cell::Cell;
use std::marker::PhantomData;

use memory_manager::{GarbageCollector, GcHost, RootSource, StepMode, Value};

use crate::vm::VmShared;

/// How much collection [`VmContext::run_garbage_collector`] performs.
///
/// [`VmContext::run_garbage_collector`]: crate::VmContext::run_garbage_collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GcMode {
    /// One time slice
    #[default]
    Step,
    /// A complete cycle, idle to idle
    Full,
}

impl From<GcMode> for StepMode {
    fn from(mode: GcMode) -> Self {
        match mode {
            GcMode::Step => StepMode::Slice,
            GcMode::Full => StepMode::Full,
        }
    }
}

thread_local! {
    static SCRIPT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as executing script for its lifetime.
///
/// Native functions run inside a scope, so collection requested from them
/// can be refused instead of deadlocking on the mutator guard.
pub(crate) struct ScriptScope {
    _not_send: PhantomData<*const ()>,
}

impl ScriptScope {
    pub(crate) fn enter() -> Self {
        SCRIPT_DEPTH.with(|depth| depth.set(depth.get() + 1));
        ScriptScope {
            _not_send: PhantomData,
        }
    }
}

impl Drop for ScriptScope {
    fn drop(&mut self) {
        SCRIPT_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Whether this thread is inside a script run.
pub(crate) fn in_script() -> bool {
    SCRIPT_DEPTH.with(|depth| depth.get() > 0)
}

impl RootSource for VmShared {
    fn visit_roots(&self, visit: &mut dyn FnMut(&Value)) {
        self.registry.read().visit_roots(visit);
        self.globals.read().values().for_each(|v| visit(v));

        let executions: Vec<_> = {
            let mut executions = self.executions.lock();
            executions.retain(|exec| exec.strong_count() > 0);
            executions.iter().filter_map(|exec| exec.upgrade()).collect()
        };
        for exec in &executions {
            exec.visit_roots(visit);
        }
    }
}

impl GcHost for VmShared {
    fn collector(&self) -> &GarbageCollector {
        &self.collector
    }
}
