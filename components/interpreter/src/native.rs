//! Host function bindings
//!
//! A module declares native functions by signature; the host binds an
//! implementation with [`VmContext::bind_native_function`]. When script code
//! calls one, the implementation receives a [`CallContext`] holding the
//! popped arguments and collecting the values it returns.
//!
//! [`VmContext::bind_native_function`]: crate::VmContext::bind_native_function

use std::sync::Arc;

use core_types::{ErrorCode, ExceptionSeverity, HqError, HqResult, StandardException};
use memory_manager::Value;

use crate::context::ExecutionContext;
use crate::registry::Function;
use crate::vm::VmContext;

/// Implementation of a native function.
///
/// An `Err` return is raised in the calling script as a fatal
/// `RuntimeError` carrying the error message.
pub type NativeFunction = Arc<dyn Fn(&mut CallContext<'_>) -> HqResult<()> + Send + Sync>;

/// What a native function sees of the script that called it.
pub struct CallContext<'a> {
    exec: &'a ExecutionContext,
    function: &'a Function,
    args: Vec<Value>,
    returns: Vec<Value>,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(exec: &'a ExecutionContext, function: &'a Function, args: Vec<Value>) -> Self {
        Self {
            exec,
            function,
            args,
            returns: Vec::new(),
        }
    }

    /// The calling execution context
    pub fn execution(&self) -> &ExecutionContext {
        self.exec
    }

    /// The virtual machine the script runs in
    pub fn vm(&self) -> &VmContext {
        self.exec.vm()
    }

    /// Signature of the function being called
    pub fn signature(&self) -> &str {
        self.function.signature()
    }

    /// Arguments in declaration order
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Number of arguments passed
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// One argument
    pub fn arg(&self, index: usize) -> HqResult<Value> {
        self.args.get(index).cloned().ok_or_else(|| {
            HqError::new(
                ErrorCode::OutOfRange,
                format!("{}: argument {} of {}", self.signature(), index, self.args.len()),
            )
        })
    }

    /// Queue a return value. Missing return values are filled with null.
    pub fn push_return(&mut self, value: Value) -> HqResult<()> {
        if self.returns.len() >= self.function.return_count() {
            return Err(HqError::new(
                ErrorCode::StackFull,
                format!(
                    "{} declares {} return values",
                    self.signature(),
                    self.function.return_count()
                ),
            ));
        }
        if !self.vm().heap().owns(&value) {
            return Err(HqError::new(
                ErrorCode::Mismatch,
                "return value belongs to another virtual machine",
            ));
        }
        self.returns.push(value);
        Ok(())
    }

    /// Number of return values pushed so far
    pub fn return_count(&self) -> usize {
        self.returns.len()
    }

    /// Suspend the script once this call returns
    pub fn yield_execution(&self) -> HqResult<()> {
        self.exec.yield_execution()
    }

    /// Raise `value` in the calling script once this call returns
    pub fn raise_exception(&self, value: Value, severity: ExceptionSeverity) -> HqResult<()> {
        self.exec.raise_exception(value, severity)
    }

    /// Raise a standard exception in the calling script
    pub fn raise_standard_exception(
        &self,
        severity: ExceptionSeverity,
        kind: StandardException,
        message: &str,
    ) -> HqResult<()> {
        self.exec.raise_standard_exception(severity, kind, message)
    }

    /// Abort the calling script once this call returns
    pub fn abort(&self) {
        self.exec.abort_handle().abort();
    }

    /// Read an I/O register of the calling context
    pub fn io_register(&self, index: usize) -> HqResult<Value> {
        self.exec.io_register(index)
    }

    /// Write an I/O register of the calling context
    pub fn set_io_register(&self, index: usize, value: Value) -> HqResult<()> {
        self.exec.set_io_register(index, value)
    }

    /// Return values padded with null up to the declared count.
    pub(crate) fn into_returns(self) -> Vec<Value> {
        let mut returns = self.returns;
        returns.resize_with(self.function.return_count(), Value::null);
        returns
    }
}

impl std::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("signature", &self.signature())
            .field("args", &self.args.len())
            .field("returns", &self.returns.len())
            .finish()
    }
}
