//! Execution contexts
//!
//! An [`ExecutionContext`] is one cooperative script fiber: a frame stack,
//! a bank of I/O registers shared with the host, and a status that moves
//! through `Running` into one of the terminal states. Only one thread runs a
//! context at a time; the host interleaves other work at `Yielded`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use bytecode_system::FunctionKind;
use core_types::constants::IO_REGISTER_COUNT;
use core_types::{ErrorCode, ExceptionSeverity, HqError, HqResult, StandardException};
use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;

use memory_manager::Value;

use crate::call_frame::Frame;
use crate::dispatch::{self, BatchOutcome};
use crate::registry::Function;
use crate::vm::VmContext;

/// Instructions executed per heap guard acquisition in `RunMode::Full`.
const FULL_BATCH: usize = 128;

/// Status of an execution context. At most one holds at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecStatus {
    /// Inside `run`, or stepped with work remaining
    Running,
    /// Suspended at a yield; the next `run` resumes
    Yielded,
    /// The entry function returned
    Complete,
    /// An exception reached the host
    Exception,
    /// Stopped by an abort request
    Abort,
}

impl ExecStatus {
    /// Whether a `reset` is needed before the context can run again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecStatus::Complete | ExecStatus::Exception | ExecStatus::Abort
        )
    }

    /// Name used in diagnostics
    pub fn name(self) -> &'static str {
        match self {
            ExecStatus::Running => "running",
            ExecStatus::Yielded => "yielded",
            ExecStatus::Complete => "complete",
            ExecStatus::Exception => "exception",
            ExecStatus::Abort => "abort",
        }
    }
}

/// How far one call to [`ExecutionContext::run`] goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunMode {
    /// Execute a single instruction
    Step,
    /// Run until completion, a yield, an unhandled exception or an abort
    #[default]
    Full,
}

pub(crate) struct FrameStack {
    pub(crate) frames: Vec<Frame>,
    pub(crate) entry: Option<Arc<Function>>,
}

/// An exception raised by a native function or host call, applied at the
/// next safe point.
pub(crate) struct PendingRaise {
    pub(crate) value: Value,
    pub(crate) severity: ExceptionSeverity,
}

pub(crate) struct ExecShared {
    pub(crate) vm: VmContext,
    pub(crate) frames: Mutex<FrameStack>,
    pub(crate) registers: Mutex<Vec<Value>>,
    pub(crate) exception: Mutex<Option<(Value, ExceptionSeverity)>>,
    pub(crate) status: AtomicCell<Option<ExecStatus>>,
    pub(crate) unhandled: AtomicBool,
    /// Mirrors `frames.len()` so depth reads never wait on a running script
    pub(crate) depth: AtomicUsize,
    pub(crate) running_on: AtomicCell<Option<ThreadId>>,
    pub(crate) yield_requested: AtomicBool,
    pub(crate) abort_requested: AtomicBool,
    pub(crate) pending_raise: Mutex<Option<PendingRaise>>,
}

impl ExecShared {
    pub(crate) fn sync_depth(&self, stack: &FrameStack) {
        self.depth.store(stack.frames.len(), Ordering::SeqCst);
    }

    pub(crate) fn visit_roots(&self, visit: &mut dyn FnMut(&Value)) {
        for frame in &self.frames.lock().frames {
            frame.visit_values(visit);
        }
        self.registers.lock().iter().for_each(|v| visit(v));
        if let Some((value, _)) = &*self.exception.lock() {
            visit(value);
        }
        if let Some(pending) = &*self.pending_raise.lock() {
            visit(&pending.value);
        }
    }
}

/// Clears `running_on` when a run ends, including by panic in a native.
struct RunningGuard<'a>(&'a ExecShared);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running_on.store(None);
    }
}

/// One cooperative script fiber attached to a virtual machine.
///
/// # Examples
///
/// ```
/// use bytecode_system::{Constant, FunctionDef, ModuleDef, Opcode};
/// use interpreter::{ExecStatus, ExecutionContext, RunMode, VmContext, VmInit};
///
/// let vm = VmContext::new(VmInit::default()).unwrap();
/// let mut module = ModuleDef::new("Demo");
/// let answer = module.add_constant(Constant::Int32(42));
/// let mut main = FunctionDef::script("Demo.main()").with_arity(0, 1);
/// main.emit(Opcode::LoadConstant(answer));
/// main.emit(Opcode::Return);
/// module.add_function(main);
/// vm.add_module(module).unwrap();
///
/// let exec = ExecutionContext::new(&vm).unwrap();
/// exec.initialize(&vm.function("Demo.main()").unwrap()).unwrap();
/// exec.run(RunMode::Full).unwrap();
/// assert!(exec.has_status(ExecStatus::Complete));
/// assert_eq!(exec.io_register(0).unwrap().as_int32().unwrap(), 42);
/// ```
pub struct ExecutionContext {
    shared: Arc<ExecShared>,
}

impl ExecutionContext {
    /// Create a context with no entry function.
    pub fn new(vm: &VmContext) -> HqResult<Self> {
        vm.check_live()?;
        let shared = Arc::new(ExecShared {
            vm: vm.clone(),
            frames: Mutex::new(FrameStack {
                frames: Vec::new(),
                entry: None,
            }),
            registers: Mutex::new(vec![Value::null(); IO_REGISTER_COUNT]),
            exception: Mutex::new(None),
            status: AtomicCell::new(None),
            unhandled: AtomicBool::new(false),
            depth: AtomicUsize::new(0),
            running_on: AtomicCell::new(None),
            yield_requested: AtomicBool::new(false),
            abort_requested: AtomicBool::new(false),
            pending_raise: Mutex::new(None),
        });
        vm.attach_execution(Arc::downgrade(&shared));
        Ok(Self { shared })
    }

    pub(crate) fn shared(&self) -> &ExecShared {
        &self.shared
    }

    /// Assign the entry function and reset.
    ///
    /// Native functions and module initializers cannot be entries.
    pub fn initialize(&self, entry: &Arc<Function>) -> HqResult<()> {
        if entry.kind() != FunctionKind::Script {
            return Err(HqError::new(
                ErrorCode::InvalidOperation,
                format!("{} cannot be an entry function", entry.signature()),
            ));
        }
        self.set_entry(entry)
    }

    pub(crate) fn set_entry(&self, entry: &Arc<Function>) -> HqResult<()> {
        if entry.heap_id() != self.vm().heap().id() {
            return Err(HqError::new(
                ErrorCode::Mismatch,
                format!("{} belongs to another virtual machine", entry.signature()),
            ));
        }
        self.check_not_running()?;
        self.shared.frames.lock().entry = Some(Arc::clone(entry));
        self.reset()
    }

    /// Return to the state right after `initialize`.
    ///
    /// Frames, status, the current exception and the unhandled flag are
    /// cleared and the entry frame is pushed again. Registers are kept.
    pub fn reset(&self) -> HqResult<()> {
        self.check_not_running()?;
        let shared = &self.shared;
        let released = {
            let mut stack = shared.frames.lock();
            let released = std::mem::take(&mut stack.frames);
            if let Some(entry) = stack.entry.clone() {
                stack.frames.push(Frame::new(entry));
            }
            shared.sync_depth(&stack);
            released
        };
        let exception = shared.exception.lock().take();
        let pending = shared.pending_raise.lock().take();
        shared.status.store(None);
        shared.unhandled.store(false, Ordering::SeqCst);
        shared.yield_requested.store(false, Ordering::SeqCst);
        shared.abort_requested.store(false, Ordering::SeqCst);
        drop((released, exception, pending));
        Ok(())
    }

    /// Execute bytecode.
    ///
    /// A context already in a terminal state is left untouched. Errors are
    /// API misuse only; script failures surface as [`ExecStatus::Exception`].
    pub fn run(&self, mode: RunMode) -> HqResult<()> {
        let shared = &self.shared;
        if shared.depth.load(Ordering::SeqCst) == 0 {
            return Err(no_function());
        }
        let me = thread::current().id();
        if shared.running_on.compare_exchange(None, Some(me)).is_err() {
            return Err(HqError::new(
                ErrorCode::InvalidOperation,
                "execution context is already running",
            ));
        }
        let _running = RunningGuard(shared);

        if shared.status.load().is_some_and(ExecStatus::is_terminal) {
            return Ok(());
        }
        shared.yield_requested.store(false, Ordering::SeqCst);
        shared.status.store(Some(ExecStatus::Running));

        let budget = match mode {
            RunMode::Step => 1,
            RunMode::Full => FULL_BATCH,
        };
        loop {
            match dispatch::run_batch(self, budget) {
                BatchOutcome::More if mode == RunMode::Full => continue,
                BatchOutcome::More | BatchOutcome::Stopped => break,
            }
        }
        Ok(())
    }

    /// Suspend at the next safe point. Only valid while running.
    pub fn yield_execution(&self) -> HqResult<()> {
        self.check_in_run()?;
        self.shared.yield_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Raise `value` as a script exception at the next safe point.
    pub fn raise_exception(&self, value: Value, severity: ExceptionSeverity) -> HqResult<()> {
        self.check_in_run()?;
        if !self.vm().heap().owns(&value) {
            return Err(HqError::new(
                ErrorCode::Mismatch,
                "exception value belongs to another virtual machine",
            ));
        }
        *self.shared.pending_raise.lock() = Some(PendingRaise { value, severity });
        Ok(())
    }

    /// Raise a standard exception with `message` as its `_message` member.
    pub fn raise_standard_exception(
        &self,
        severity: ExceptionSeverity,
        kind: StandardException,
        message: &str,
    ) -> HqResult<()> {
        self.check_in_run()?;
        let value = self.vm().create_standard_exception(kind, message)?;
        self.raise_exception(value, severity)
    }

    /// Current status, `None` if never run since the last reset
    pub fn status(&self) -> Option<ExecStatus> {
        self.shared.status.load()
    }

    /// Whether the context is in `status`
    pub fn has_status(&self, status: ExecStatus) -> bool {
        self.status() == Some(status)
    }

    /// Whether an exception reached the host since the last reset
    pub fn has_unhandled_exception(&self) -> bool {
        self.shared.unhandled.load(Ordering::SeqCst)
    }

    /// The exception that reached the host, until the next reset
    pub fn exception(&self) -> Option<Value> {
        self.shared.exception.lock().as_ref().map(|(v, _)| v.clone())
    }

    /// Severity of the exception that reached the host
    pub fn exception_severity(&self) -> Option<ExceptionSeverity> {
        self.shared.exception.lock().as_ref().map(|(_, s)| *s)
    }

    /// Number of frames on the stack
    pub fn frame_stack_depth(&self) -> usize {
        self.shared.depth.load(Ordering::SeqCst)
    }

    /// A snapshot of the innermost frame
    pub fn current_frame(&self) -> Option<Frame> {
        self.shared.frames.lock().frames.last().cloned()
    }

    /// Write an I/O register.
    pub fn set_io_register(&self, index: usize, value: Value) -> HqResult<()> {
        check_register(index)?;
        let heap = self.vm().heap();
        if !heap.owns(&value) {
            return Err(HqError::new(
                ErrorCode::Mismatch,
                "register value belongs to another virtual machine",
            ));
        }
        let _guard = heap.mutator_guard();
        let old = std::mem::replace(&mut self.shared.registers.lock()[index], value);
        drop(old);
        Ok(())
    }

    /// Read an I/O register.
    pub fn io_register(&self, index: usize) -> HqResult<Value> {
        check_register(index)?;
        Ok(self.shared.registers.lock()[index].clone())
    }

    /// A handle that can abort this context from any thread
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(Arc::downgrade(&self.shared))
    }

    /// The owning virtual machine
    pub fn vm(&self) -> &VmContext {
        &self.shared.vm
    }

    fn check_not_running(&self) -> HqResult<()> {
        if self.shared.running_on.load().is_some() {
            return Err(HqError::new(
                ErrorCode::InvalidOperation,
                "execution context is running",
            ));
        }
        Ok(())
    }

    fn check_in_run(&self) -> HqResult<()> {
        if self.frame_stack_depth() == 0 {
            return Err(no_function());
        }
        if self.shared.running_on.load() != Some(thread::current().id()) {
            return Err(HqError::new(
                ErrorCode::InvalidOperation,
                "only valid while the context runs on this thread",
            ));
        }
        Ok(())
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        let frames = std::mem::take(&mut self.shared.frames.lock().frames);
        let registers = std::mem::take(&mut *self.shared.registers.lock());
        let exception = self.shared.exception.lock().take();
        let pending = self.shared.pending_raise.lock().take();
        self.shared.depth.store(0, Ordering::SeqCst);
        drop((frames, registers, exception, pending));
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("status", &self.status())
            .field("depth", &self.frame_stack_depth())
            .field("unhandled", &self.has_unhandled_exception())
            .finish()
    }
}

/// Requests an abort of an execution context from any thread.
///
/// The request is honored at the next instruction boundary. Aborting a
/// context that is not running takes effect when it next runs; a dropped
/// context ignores the request.
#[derive(Clone, Debug)]
pub struct AbortHandle(Weak<ExecShared>);

impl AbortHandle {
    /// Request the abort
    pub fn abort(&self) {
        if let Some(shared) = self.0.upgrade() {
            shared.abort_requested.store(true, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for ExecShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecShared")
            .field("status", &self.status.load())
            .field("depth", &self.depth.load(Ordering::SeqCst))
            .finish()
    }
}

fn no_function() -> HqError {
    HqError::new(
        ErrorCode::ScriptNoFunction,
        "execution context has no active function",
    )
}

fn check_register(index: usize) -> HqResult<()> {
    if index >= IO_REGISTER_COUNT {
        return Err(HqError::new(
            ErrorCode::InvalidArg,
            format!("register {} out of {}", index, IO_REGISTER_COUNT),
        ));
    }
    Ok(())
}
