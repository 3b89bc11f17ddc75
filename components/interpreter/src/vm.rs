//! Virtual machine context
//!
//! A [`VmContext`] owns the heap and its collector, the report sink, the
//! registry of loaded modules and the global variables. Execution contexts
//! attach to it on creation and keep it alive.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytecode_system::{ModuleDef, Serializer, SerializerMode};
use core_types::constants::{
    GC_DEFAULT_TIME_SLICE_MS, GC_DEFAULT_TIME_WAIT_MS, STANDARD_EXCEPTION_MESSAGE_MEMBER,
    THREAD_DEFAULT_STACK_SIZE, THREAD_MINIMUM_STACK_SIZE,
};
use core_types::{
    ErrorCode, HqError, HqResult, MessageType, ReportConfig, ReportSink, StandardException,
};
use memory_manager::{
    AsHeap, GarbageCollector, GcConfig, GcStats, GcThread, Heap, ObjectLayout, Value,
};
use parking_lot::{Mutex, RwLock};

use crate::context::{ExecShared, ExecStatus, ExecutionContext, RunMode};
use crate::gc_integration::{in_script, GcMode};
use crate::native::{CallContext, NativeFunction};
use crate::registry::{Function, Module, Registry};

/// Virtual machine creation parameters.
#[derive(Debug, Clone)]
pub struct VmInit {
    /// Host message callback and minimum level
    pub report: ReportConfig,
    /// Stack size of the background collector thread, in bytes
    pub gc_thread_stack_size: usize,
    /// Budget of one collector step
    pub gc_time_slice_ms: u32,
    /// Idle time between background collector steps
    pub gc_time_wait_ms: u32,
    /// Run the collector on a background thread
    pub gc_enable_thread: bool,
}

impl Default for VmInit {
    fn default() -> Self {
        Self {
            report: ReportConfig::default(),
            gc_thread_stack_size: THREAD_DEFAULT_STACK_SIZE,
            gc_time_slice_ms: GC_DEFAULT_TIME_SLICE_MS,
            gc_time_wait_ms: GC_DEFAULT_TIME_WAIT_MS,
            gc_enable_thread: false,
        }
    }
}

impl VmInit {
    fn validate(&self) -> HqResult<()> {
        if self.gc_thread_stack_size < THREAD_MINIMUM_STACK_SIZE {
            return Err(HqError::new(
                ErrorCode::InvalidArg,
                format!(
                    "gc thread stack size {} is below the minimum {}",
                    self.gc_thread_stack_size, THREAD_MINIMUM_STACK_SIZE
                ),
            ));
        }
        if self.gc_time_slice_ms == 0 {
            return Err(HqError::new(
                ErrorCode::InvalidArg,
                "gc time slice must be positive",
            ));
        }
        Ok(())
    }

    fn gc_config(&self) -> GcConfig {
        GcConfig {
            time_slice: Duration::from_millis(u64::from(self.gc_time_slice_ms)),
            time_wait: Duration::from_millis(u64::from(self.gc_time_wait_ms)),
        }
    }
}

/// Outcome of [`VmContext::initialize_modules`].
#[derive(Debug)]
pub enum ModuleInit {
    /// Every module initializer ran to completion
    Complete,
    /// An initializer ended in an exception or abort; its context is kept
    /// for inspection
    ScriptError(ExecutionContext),
}

pub(crate) struct VmShared {
    pub(crate) heap: Heap,
    pub(crate) collector: GarbageCollector,
    report: ReportSink,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) globals: RwLock<HashMap<String, Value>>,
    pub(crate) executions: Mutex<Vec<Weak<ExecShared>>>,
    gc_thread: Mutex<Option<GcThread>>,
    disposed: AtomicBool,
}

impl VmShared {
    fn teardown(&self) {
        let thread = self.gc_thread.lock().take();
        if let Some(thread) = thread {
            thread.stop_thread();
        }
        self.collector.shutdown();
    }
}

impl Drop for VmShared {
    fn drop(&mut self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.teardown();
            log::info!("vm {} dropped", self.heap.id());
        }
    }
}

/// Handle to a virtual machine. Clones share the same machine.
///
/// # Examples
///
/// ```
/// use interpreter::{VmContext, VmInit};
/// use memory_manager::Value;
///
/// let vm = VmContext::new(VmInit::default()).unwrap();
/// let value = Value::create_int64(&vm, -5);
/// assert!(vm.heap().owns(&value));
/// vm.dispose().unwrap();
/// assert!(vm.is_disposed());
/// ```
#[derive(Clone)]
pub struct VmContext {
    shared: Arc<VmShared>,
}

impl VmContext {
    /// Create a virtual machine, starting the collector thread if enabled.
    pub fn new(init: VmInit) -> HqResult<Self> {
        init.validate()?;
        let heap = Heap::new();
        let collector = GarbageCollector::new(heap.clone(), init.gc_config());
        let shared = Arc::new(VmShared {
            heap,
            collector,
            report: ReportSink::new(init.report.clone()),
            registry: RwLock::new(Registry::with_builtins()),
            globals: RwLock::new(HashMap::new()),
            executions: Mutex::new(Vec::new()),
            gc_thread: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        if init.gc_enable_thread {
            let thread = GcThread::spawn(
                Arc::downgrade(&shared),
                init.gc_thread_stack_size,
                init.gc_config().time_wait,
            )?;
            *shared.gc_thread.lock() = Some(thread);
        }

        log::info!(
            "vm {} created (gc thread {})",
            shared.heap.id(),
            if init.gc_enable_thread { "on" } else { "off" }
        );
        Ok(Self { shared })
    }

    /// Stop the collector and release every module and global.
    ///
    /// Fails with `InvalidOperation` while execution contexts are attached.
    /// Containers the host still holds are emptied.
    pub fn dispose(&self) -> HqResult<()> {
        if self.is_disposed() {
            return Ok(());
        }
        if self.execution_count() > 0 {
            return Err(HqError::new(
                ErrorCode::InvalidOperation,
                format!("{} execution contexts still attached", self.execution_count()),
            ));
        }
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.teardown();
        let registry = std::mem::take(&mut *self.shared.registry.write());
        let globals = std::mem::take(&mut *self.shared.globals.write());
        drop((registry, globals));
        log::info!("vm {} disposed", self.shared.heap.id());
        Ok(())
    }

    /// Whether [`VmContext::dispose`] has run
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// The heap values of this machine are allocated from
    pub fn heap(&self) -> &Heap {
        &self.shared.heap
    }

    /// The host report sink
    pub fn report(&self) -> &ReportSink {
        &self.shared.report
    }

    /// Collector statistics
    pub fn gc_stats(&self) -> GcStats {
        self.shared.collector.stats()
    }

    /// Number of live execution contexts attached to this machine
    pub fn execution_count(&self) -> usize {
        self.shared
            .executions
            .lock()
            .iter()
            .filter(|exec| exec.strong_count() > 0)
            .count()
    }

    /// Run the collector on the calling thread.
    ///
    /// Refused with `InvalidOperation` from inside a native function, where
    /// the calling script holds the heap.
    pub fn run_garbage_collector(&self, mode: GcMode) -> HqResult<()> {
        self.check_live()?;
        if in_script() {
            return Err(HqError::new(
                ErrorCode::InvalidOperation,
                "garbage collection requested from inside a script",
            ));
        }
        self.shared.collector.step(&*self.shared, mode.into());
        Ok(())
    }

    /// Decode a module blob and register it under `name`.
    pub fn load_module(&self, name: &str, bytes: &[u8]) -> HqResult<Arc<Module>> {
        let mut def = ModuleDef::from_bytes(bytes)?;
        def.name = name.to_string();
        self.add_module(def)
    }

    /// Read a module blob from a file and register it under `name`.
    pub fn load_module_from_file(&self, name: &str, path: impl AsRef<Path>) -> HqResult<Arc<Module>> {
        let mut input = Serializer::new(SerializerMode::Reader);
        input.load_file(path)?;
        self.load_module(name, input.as_bytes())
    }

    /// Register a module definition.
    ///
    /// Module names use `/` separators; `\` is converted. A module that
    /// fails validation or conflicts with a loaded one is rejected whole.
    pub fn add_module(&self, mut def: ModuleDef) -> HqResult<Arc<Module>> {
        self.check_live()?;
        def.name = def.name.replace('\\', "/");
        def.validate()?;

        let _guard = self.shared.heap.mutator_guard();
        let name = def.name.clone();
        let module = self.shared.registry.write().link(name, def, &self.shared.heap)?;
        {
            let mut globals = self.shared.globals.write();
            for global in module.global_names() {
                globals.insert(global.clone(), Value::null());
            }
        }
        log::debug!(
            "loaded module {} ({} functions, {} globals)",
            module.name(),
            module.function_signatures().len(),
            module.global_names().len()
        );
        Ok(module)
    }

    /// A loaded module by name
    pub fn module(&self, name: &str) -> HqResult<Arc<Module>> {
        let name = name.replace('\\', "/");
        self.shared
            .registry
            .read()
            .module(&name)
            .cloned()
            .ok_or_else(|| non_existent(format!("module {} is not loaded", name)))
    }

    /// Names of loaded modules, in load order
    pub fn module_names(&self) -> Vec<String> {
        let registry = self.shared.registry.read();
        registry.modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// A loaded function by signature
    pub fn function(&self, signature: &str) -> HqResult<Arc<Function>> {
        self.lookup_function(signature)
            .ok_or_else(|| non_existent(format!("function {} is not defined", signature)))
    }

    /// Signatures of every loaded function, in load order
    pub fn function_signatures(&self) -> Vec<String> {
        let registry = self.shared.registry.read();
        registry
            .modules
            .iter()
            .flat_map(|m| m.function_signatures().iter().cloned())
            .collect()
    }

    /// Supply the implementation of a native function declaration.
    ///
    /// Binding again replaces the previous implementation.
    pub fn bind_native_function<F>(&self, signature: &str, function: F) -> HqResult<()>
    where
        F: Fn(&mut CallContext<'_>) -> HqResult<()> + Send + Sync + 'static,
    {
        let mut registry = self.shared.registry.write();
        let declared = registry
            .functions
            .get(signature)
            .ok_or_else(|| non_existent(format!("function {} is not defined", signature)))?;
        if !declared.is_native() {
            return Err(HqError::new(
                ErrorCode::InvalidType,
                format!("{} is not a native function", signature),
            ));
        }
        registry
            .natives
            .insert(signature.to_string(), Arc::new(function));
        Ok(())
    }

    /// Read a global variable
    pub fn global_variable(&self, name: &str) -> HqResult<Value> {
        self.check_live()?;
        self.lookup_global(name)
            .ok_or_else(|| non_existent(format!("global {} is not declared", name)))
    }

    /// Write a global variable
    pub fn set_global_variable(&self, name: &str, value: Value) -> HqResult<()> {
        self.check_live()?;
        if !self.shared.heap.owns(&value) {
            return Err(HqError::new(
                ErrorCode::Mismatch,
                "global value belongs to another virtual machine",
            ));
        }
        let _guard = self.shared.heap.mutator_guard();
        match self.replace_global(name, value) {
            Some(old) => {
                drop(old);
                Ok(())
            }
            None => Err(non_existent(format!("global {} is not declared", name))),
        }
    }

    /// Names of declared globals, in declaration order
    pub fn global_variable_names(&self) -> Vec<String> {
        let registry = self.shared.registry.read();
        registry
            .modules
            .iter()
            .flat_map(|m| m.global_names().iter().cloned())
            .collect()
    }

    /// The layout of a declared class
    pub fn object_layout(&self, class_name: &str) -> HqResult<Arc<ObjectLayout>> {
        self.check_live()?;
        self.shared
            .registry
            .read()
            .layouts
            .get(class_name)
            .cloned()
            .ok_or_else(|| non_existent(format!("class {} is not declared", class_name)))
    }

    /// A new object of a declared class with every member null
    pub fn create_object(&self, class_name: &str) -> HqResult<Value> {
        let layout = self.object_layout(class_name)?;
        Ok(Value::create_object(self, &layout))
    }

    /// A standard exception object carrying `message`
    pub fn create_standard_exception(
        &self,
        kind: StandardException,
        message: &str,
    ) -> HqResult<Value> {
        let exception = self.create_object(&kind.class_name())?;
        exception.set_object_member(
            STANDARD_EXCEPTION_MESSAGE_MEMBER,
            Value::create_string(self, message),
        )?;
        Ok(exception)
    }

    /// Run every module initializer that has not run yet, in load order.
    ///
    /// Yields inside an initializer are resumed. Each initializer runs at
    /// most once, even when it fails.
    pub fn initialize_modules(&self) -> HqResult<ModuleInit> {
        self.check_live()?;
        loop {
            let module = {
                let mut registry = self.shared.registry.write();
                let Some(module) = registry.modules.get(registry.initialized).cloned() else {
                    return Ok(ModuleInit::Complete);
                };
                registry.initialized += 1;
                module
            };
            let Some(init) = module.init_function() else {
                continue;
            };

            log::debug!("initializing module {}", module.name());
            let exec = ExecutionContext::new(self)?;
            exec.set_entry(init)?;
            loop {
                exec.run(RunMode::Full)?;
                match exec.status() {
                    Some(ExecStatus::Yielded) => continue,
                    Some(ExecStatus::Complete) => break,
                    _ => {
                        self.report().report(
                            MessageType::Error,
                            format_args!("initializer of module {} failed", module.name()),
                        );
                        return Ok(ModuleInit::ScriptError(exec));
                    }
                }
            }
        }
    }

    pub(crate) fn check_live(&self) -> HqResult<()> {
        if self.is_disposed() {
            return Err(HqError::new(
                ErrorCode::InvalidOperation,
                "virtual machine is disposed",
            ));
        }
        Ok(())
    }

    pub(crate) fn attach_execution(&self, exec: Weak<ExecShared>) {
        let mut executions = self.shared.executions.lock();
        executions.retain(|e| e.strong_count() > 0);
        executions.push(exec);
    }

    pub(crate) fn lookup_function(&self, signature: &str) -> Option<Arc<Function>> {
        self.shared.registry.read().functions.get(signature).cloned()
    }

    pub(crate) fn lookup_native(&self, signature: &str) -> Option<NativeFunction> {
        self.shared.registry.read().natives.get(signature).cloned()
    }

    pub(crate) fn lookup_global(&self, name: &str) -> Option<Value> {
        self.shared.globals.read().get(name).cloned()
    }

    /// Swaps a declared global, returning the previous value. Callers hold
    /// the mutator guard.
    pub(crate) fn replace_global(&self, name: &str, value: Value) -> Option<Value> {
        let mut globals = self.shared.globals.write();
        globals
            .get_mut(name)
            .map(|slot| std::mem::replace(slot, value))
    }
}

impl AsHeap for VmContext {
    fn as_heap(&self) -> &Heap {
        &self.shared.heap
    }
}

impl std::fmt::Debug for VmContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmContext")
            .field("heap", &self.shared.heap.id())
            .field("disposed", &self.is_disposed())
            .field("collector", &self.shared.collector)
            .finish()
    }
}

fn non_existent(message: String) -> HqError {
    HqError::new(ErrorCode::NonExistent, message)
}
