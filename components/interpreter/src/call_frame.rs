//! Activation records for the execution frame stack

use std::sync::Arc;

use core_types::constants::VALUE_STACK_SIZE;
use core_types::{ErrorCode, HqError, HqResult};
use memory_manager::Value;

use crate::registry::Function;

/// One function invocation: locals, operand stack and resume offset.
///
/// Frames live in an execution context's frame stack; the caller of a frame
/// is the one directly beneath it. [`ExecutionContext::current_frame`]
/// hands out snapshots, so editing a returned frame does not affect the
/// running script.
///
/// [`ExecutionContext::current_frame`]: crate::ExecutionContext::current_frame
#[derive(Clone)]
pub struct Frame {
    function: Arc<Function>,
    ip: usize,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    /// Create a frame with null locals and an empty operand stack
    pub fn new(function: Arc<Function>) -> Self {
        let locals = vec![Value::null(); function.local_names().len()];
        Self {
            function,
            ip: 0,
            locals,
            stack: Vec::with_capacity(VALUE_STACK_SIZE),
        }
    }

    /// The function this frame executes
    pub fn function(&self) -> &Arc<Function> {
        &self.function
    }

    /// Signature of the executing function
    pub fn signature(&self) -> &str {
        self.function.signature()
    }

    /// Offset of the next instruction to execute
    pub fn bytecode_offset(&self) -> usize {
        self.ip
    }

    pub(crate) fn set_bytecode_offset(&mut self, ip: usize) {
        self.ip = ip;
    }

    /// Offset of the instruction currently executing, or last executed
    pub(crate) fn current_offset(&self) -> u32 {
        self.ip.saturating_sub(1) as u32
    }

    /// Push onto the operand stack
    pub fn push_value(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop from the operand stack
    pub fn pop_value(&mut self) -> HqResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| HqError::new(ErrorCode::StackEmpty, "operand stack is empty"))
    }

    /// Read the operand stack without popping; depth 0 is the top
    pub fn peek_value(&self, depth: usize) -> HqResult<Value> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .map(|index| self.stack[index].clone())
            .ok_or_else(|| {
                HqError::new(
                    ErrorCode::OutOfRange,
                    format!("operand stack depth {} out of {}", depth, self.stack.len()),
                )
            })
    }

    /// Number of operand stack entries
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Remove the top `count` operands, oldest first
    pub(crate) fn pop_values(&mut self, count: usize) -> HqResult<Vec<Value>> {
        let split = self.stack.len().checked_sub(count).ok_or_else(|| {
            HqError::new(
                ErrorCode::StackEmpty,
                format!("{} operands needed, {} available", count, self.stack.len()),
            )
        })?;
        Ok(self.stack.split_off(split))
    }

    pub(crate) fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Number of local slots
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Read a local slot
    pub fn local(&self, index: usize) -> HqResult<Value> {
        self.locals
            .get(index)
            .cloned()
            .ok_or_else(|| self.local_out_of_range(index))
    }

    /// Replace a local slot
    pub fn set_local(&mut self, index: usize, value: Value) -> HqResult<()> {
        let len = self.locals.len();
        let slot = self.locals.get_mut(index).ok_or_else(|| {
            HqError::new(
                ErrorCode::OutOfRange,
                format!("local {} out of {}", index, len),
            )
        })?;
        *slot = value;
        Ok(())
    }

    /// Read a local slot by its declared name
    pub fn local_by_name(&self, name: &str) -> HqResult<Value> {
        self.function
            .local_names()
            .iter()
            .position(|local| local == name)
            .and_then(|index| self.locals.get(index).cloned())
            .ok_or_else(|| {
                HqError::new(
                    ErrorCode::NonExistent,
                    format!("{} has no local {}", self.signature(), name),
                )
            })
    }

    fn local_out_of_range(&self, index: usize) -> HqError {
        HqError::new(
            ErrorCode::OutOfRange,
            format!("local {} out of {}", index, self.locals.len()),
        )
    }

    pub(crate) fn visit_values(&self, visit: &mut dyn FnMut(&Value)) {
        self.locals.iter().for_each(|v| visit(v));
        self.stack.iter().for_each(|v| visit(v));
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("function", &self.signature())
            .field("ip", &self.ip)
            .field("locals", &self.locals.len())
            .field("stack", &self.stack.len())
            .finish()
    }
}
