//! Dispatch loop for bytecode execution
//!
//! Executes instructions in batches. Each batch holds the heap's mutator
//! guard and the context's frame lock; both are released between batches so
//! the collector can run its exclusive phases. Native calls release the
//! frame lock while keeping the mutator guard.
//!
//! After every instruction the loop reaches a safe point where pending
//! raises, abort requests and yield requests are applied, in that order.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytecode_system::{FunctionKind, Opcode};
use core_types::constants::{FRAME_STACK_SIZE, IO_REGISTER_COUNT};
use core_types::{ErrorCode, ExceptionSeverity, HqError, MessageType, StandardException};
use memory_manager::{Value, ValueData};
use parking_lot::MutexGuard;

use crate::call_frame::Frame;
use crate::context::{ExecShared, ExecStatus, ExecutionContext, FrameStack};
use crate::gc_integration::ScriptScope;
use crate::native::CallContext;
use crate::registry::Function;
use crate::vm::VmContext;

/// Result of one batch of instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchOutcome {
    /// The budget ran out with the context still running
    More,
    /// The context left `Running`
    Stopped,
}

/// Why an instruction did not complete normally.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// A fault detected by the interpreter, raised as a standard exception
    Fault(StandardException, String),
    /// A value raised by script code
    Throw(Value, ExceptionSeverity),
}

impl Interrupt {
    fn runtime(message: impl Into<String>) -> Self {
        Interrupt::Fault(StandardException::RuntimeError, message.into())
    }

    fn type_error(message: impl Into<String>) -> Self {
        Interrupt::Fault(StandardException::TypeError, message.into())
    }

    fn index(message: impl Into<String>) -> Self {
        Interrupt::Fault(StandardException::IndexOutOfRangeError, message.into())
    }
}

impl From<HqError> for Interrupt {
    fn from(err: HqError) -> Self {
        let kind = match err.code() {
            ErrorCode::InvalidType => StandardException::TypeError,
            ErrorCode::OutOfRange => StandardException::IndexOutOfRangeError,
            _ => StandardException::RuntimeError,
        };
        Interrupt::Fault(kind, err.message().to_string())
    }
}

enum Control {
    Next,
    /// The entry frame returned
    Finished,
}

type Step = Result<Control, Interrupt>;

/// Runs up to `budget` instructions.
pub(crate) fn run_batch(exec: &ExecutionContext, budget: usize) -> BatchOutcome {
    let shared = exec.shared();
    let vm = &shared.vm;
    let _guard = vm.heap().mutator_guard();
    let _scope = ScriptScope::enter();
    let mut stack = shared.frames.lock();

    if honor_abort(shared) {
        return BatchOutcome::Stopped;
    }

    for _ in 0..budget {
        match step(exec, &mut stack) {
            Ok(Control::Next) => {}
            Ok(Control::Finished) => {
                shared.status.store(Some(ExecStatus::Complete));
                return BatchOutcome::Stopped;
            }
            Err(interrupt) => {
                let (value, severity) = into_exception(vm, interrupt);
                unwind(shared, &mut stack, value, severity);
            }
        }

        let pending = shared.pending_raise.lock().take();
        if let Some(pending) = pending {
            unwind(shared, &mut stack, pending.value, pending.severity);
        }
        if shared.status.load() == Some(ExecStatus::Exception) {
            return BatchOutcome::Stopped;
        }
        if honor_abort(shared) {
            return BatchOutcome::Stopped;
        }
        if shared.yield_requested.swap(false, Ordering::SeqCst) {
            shared.status.store(Some(ExecStatus::Yielded));
            return BatchOutcome::Stopped;
        }
    }
    BatchOutcome::More
}

fn honor_abort(shared: &ExecShared) -> bool {
    if !shared.abort_requested.swap(false, Ordering::SeqCst) {
        return false;
    }
    shared.status.store(Some(ExecStatus::Abort));
    log::debug!("execution aborted at depth {}", shared.depth.load(Ordering::SeqCst));
    true
}

fn into_exception(vm: &VmContext, interrupt: Interrupt) -> (Value, ExceptionSeverity) {
    match interrupt {
        Interrupt::Throw(value, severity) => (value, severity),
        Interrupt::Fault(kind, message) => {
            let value = vm
                .create_standard_exception(kind, &message)
                .unwrap_or_else(|_| Value::create_string(vm, &message));
            (value, ExceptionSeverity::Fatal)
        }
    }
}

/// Transfers control to the innermost matching handler.
///
/// A caught value only travels on the handler's operand stack. Without a
/// handler every frame is discarded, the value is kept in the exception slot
/// and the context ends in `Exception`. Returns whether a handler was found.
pub(crate) fn unwind(
    shared: &ExecShared,
    stack: &mut FrameStack,
    value: Value,
    severity: ExceptionSeverity,
) -> bool {
    let value_type = value.value_type();
    let class_name = value.object_type_name().ok();

    while let Some(frame) = stack.frames.last_mut() {
        if let Some(target) = find_handler(frame.function(), frame.current_offset(), value_type, class_name) {
            frame.set_bytecode_offset(target as usize);
            frame.clear_stack();
            frame.push_value(value.clone());
            shared.sync_depth(stack);
            return true;
        }
        stack.frames.pop();
    }

    shared.sync_depth(stack);
    *shared.exception.lock() = Some((value.clone(), severity));
    shared.unhandled.store(true, Ordering::SeqCst);
    shared.status.store(Some(ExecStatus::Exception));
    let message_type = match severity {
        ExceptionSeverity::Recoverable => MessageType::Error,
        ExceptionSeverity::Fatal => MessageType::Fatal,
    };
    shared
        .vm
        .report()
        .report(message_type, format_args!("unhandled exception: {}", value));
    false
}

/// Handler offset for an exception raised at `offset`, most nested block
/// first.
fn find_handler(
    function: &Function,
    offset: u32,
    value_type: core_types::ValueType,
    class_name: Option<&str>,
) -> Option<u32> {
    let mut blocks: Vec<_> = function
        .definition()
        .guarded_blocks
        .iter()
        .filter(|block| block.contains(offset))
        .collect();
    blocks.sort_by_key(|block| block.len());
    blocks
        .iter()
        .flat_map(|block| block.handlers.iter())
        .find(|handler| handler.matches(value_type, class_name))
        .map(|handler| handler.offset)
}

fn current(stack: &mut FrameStack) -> Result<&mut Frame, Interrupt> {
    stack
        .frames
        .last_mut()
        .ok_or_else(|| Interrupt::runtime("no active frame"))
}

fn pop(stack: &mut FrameStack) -> Result<Value, Interrupt> {
    current(stack)?
        .pop_value()
        .map_err(|_| Interrupt::runtime("operand stack underflow"))
}

fn push(stack: &mut FrameStack, value: Value) -> Result<(), Interrupt> {
    current(stack)?.push_value(value);
    Ok(())
}

/// Executes the instruction at the current frame's offset.
fn step(exec: &ExecutionContext, stack: &mut MutexGuard<'_, FrameStack>) -> Step {
    let shared = exec.shared();
    let vm = &shared.vm;

    let frame = current(stack)?;
    let function = Arc::clone(frame.function());
    let ip = frame.bytecode_offset();
    let Some(opcode) = function.definition().code.get(ip) else {
        return do_return(shared, stack);
    };
    frame.set_bytecode_offset(ip + 1);

    match opcode {
        Opcode::Nop => {}
        Opcode::Return => return do_return(shared, stack),
        Opcode::Yield => shared.yield_requested.store(true, Ordering::SeqCst),
        Opcode::Call(signature) => {
            let callee = vm
                .lookup_function(signature)
                .ok_or_else(|| Interrupt::runtime(format!("unknown function {}", signature)))?;
            call(exec, stack, callee)?;
        }
        Opcode::CallValue => {
            let target = pop(stack)?;
            let signature = target.function_signature()?;
            let callee = vm
                .lookup_function(signature)
                .ok_or_else(|| Interrupt::runtime(format!("unknown function {}", signature)))?;
            call(exec, stack, callee)?;
        }
        Opcode::Raise => {
            let value = pop(stack)?;
            return Err(Interrupt::Throw(value, ExceptionSeverity::Recoverable));
        }
        Opcode::Abort => shared.abort_requested.store(true, Ordering::SeqCst),

        Opcode::LoadConstant(index) => {
            let value = function
                .constant(*index)
                .cloned()
                .ok_or_else(|| Interrupt::runtime(format!("constant {} out of range", index)))?;
            push(stack, value)?;
        }
        Opcode::LoadGlobal(name) => {
            let value = vm
                .lookup_global(name)
                .ok_or_else(|| Interrupt::runtime(format!("unknown global {}", name)))?;
            push(stack, value)?;
        }
        Opcode::StoreGlobal(name) => {
            let value = pop(stack)?;
            if let Some(old) = vm.replace_global(name, value) {
                drop(old);
            } else {
                return Err(Interrupt::runtime(format!("unknown global {}", name)));
            }
        }
        Opcode::LoadLocal(index) => {
            let frame = current(stack)?;
            let value = frame.local(*index as usize)?;
            frame.push_value(value);
        }
        Opcode::StoreLocal(index) => {
            let value = pop(stack)?;
            current(stack)?.set_local(*index as usize, value)?;
        }
        Opcode::LoadParam(index) => {
            let value = shared
                .registers
                .lock()
                .get(*index as usize)
                .cloned()
                .ok_or_else(|| Interrupt::index(format!("register {} out of range", index)))?;
            push(stack, value)?;
        }
        Opcode::StoreParam(index) => {
            let value = pop(stack)?;
            let old = {
                let mut registers = shared.registers.lock();
                let slot = registers
                    .get_mut(*index as usize)
                    .ok_or_else(|| Interrupt::index(format!("register {} out of range", index)))?;
                std::mem::replace(slot, value)
            };
            drop(old);
        }
        Opcode::LoadObject(member) => {
            let object = pop(stack)?;
            push(stack, object.object_member(member)?)?;
        }
        Opcode::StoreObject(member) => {
            let value = pop(stack)?;
            let object = pop(stack)?;
            object.set_object_member(member, value)?;
        }
        Opcode::LoadArray => {
            let index = pop(stack)?;
            let array = pop(stack)?;
            let index = array_index(&index)?;
            push(stack, array.array_element(index)?)?;
        }
        Opcode::StoreArray => {
            let value = pop(stack)?;
            let index = pop(stack)?;
            let array = pop(stack)?;
            let index = array_index(&index)?;
            array.set_array_element(index, value)?;
        }

        Opcode::PushNull => push(stack, Value::null())?,
        Opcode::PushBool(raw) => push(stack, Value::create_bool(vm, *raw))?,
        Opcode::Pop => {
            pop(stack)?;
        }
        Opcode::Dup => {
            let frame = current(stack)?;
            let top = frame
                .peek_value(0)
                .map_err(|_| Interrupt::runtime("operand stack underflow"))?;
            frame.push_value(top);
        }

        Opcode::InitObject(class_name) => {
            let value = vm.create_object(class_name)?;
            push(stack, value)?;
        }
        Opcode::InitArray(count) => {
            let value = Value::create_array(vm, *count as usize)?;
            push(stack, value)?;
        }
        Opcode::InitFunction(signature) => {
            if vm.lookup_function(signature).is_none() {
                return Err(Interrupt::runtime(format!("unknown function {}", signature)));
            }
            push(stack, Value::create_function(vm, signature))?;
        }

        Opcode::Branch(target) => current(stack)?.set_bytecode_offset(*target as usize),
        Opcode::BranchIfTrue(target) => {
            if pop(stack)?.evaluate_as_boolean() {
                current(stack)?.set_bytecode_offset(*target as usize);
            }
        }
        Opcode::BranchIfFalse(target) => {
            if !pop(stack)?.evaluate_as_boolean() {
                current(stack)?.set_bytecode_offset(*target as usize);
            }
        }

        Opcode::Add => binary(vm, stack, ArithOp::Add)?,
        Opcode::Sub => binary(vm, stack, ArithOp::Sub)?,
        Opcode::Mul => binary(vm, stack, ArithOp::Mul)?,
        Opcode::Div => binary(vm, stack, ArithOp::Div)?,
        Opcode::Mod => binary(vm, stack, ArithOp::Mod)?,
        Opcode::Eq | Opcode::Ne => {
            let b = pop(stack)?;
            let a = pop(stack)?;
            let equal = equals(&a, &b);
            let result = if matches!(opcode, Opcode::Eq) { equal } else { !equal };
            push(stack, Value::create_bool(vm, result))?;
        }
        Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
            let b = pop(stack)?;
            let a = pop(stack)?;
            let result = match (compare(&a, &b)?, opcode) {
                (None, _) => false,
                (Some(order), Opcode::Lt) => order == CmpOrdering::Less,
                (Some(order), Opcode::Le) => order != CmpOrdering::Greater,
                (Some(order), Opcode::Gt) => order == CmpOrdering::Greater,
                (Some(order), _) => order != CmpOrdering::Less,
            };
            push(stack, Value::create_bool(vm, result))?;
        }
        Opcode::Not => {
            let value = pop(stack)?;
            push(stack, Value::create_bool(vm, !value.evaluate_as_boolean()))?;
        }

        Opcode::BitNot => {
            let value = pop(stack)?;
            push(stack, bit_not(vm, &value)?)?;
        }
        Opcode::BitXor => bitwise(vm, stack, BitOp::Xor)?,
        Opcode::LeftRotate => bitwise(vm, stack, BitOp::RotateLeft)?,
        Opcode::RightRotate => bitwise(vm, stack, BitOp::RotateRight)?,
        Opcode::LeftShift(amount) => {
            let value = pop(stack)?;
            push(stack, shift_left(vm, &value, *amount)?)?;
        }

        Opcode::Length => {
            let value = pop(stack)?;
            let length = match value.data() {
                ValueData::String(raw) => raw.len(),
                ValueData::Array(_) => value.array_len()?,
                _ => {
                    return Err(Interrupt::type_error(format!(
                        "expected array or string, found {}",
                        value.value_type()
                    )))
                }
            };
            let length = u32::try_from(length)
                .map_err(|_| Interrupt::runtime(format!("length {} exceeds uint32", length)))?;
            push(stack, Value::create_uint32(vm, length))?;
        }
        Opcode::Cast(target) => {
            let value = pop(stack)?;
            push(stack, cast(vm, &value, *target)?)?;
        }
    }
    Ok(Control::Next)
}

/// Pops the current frame, handing its return values to the caller or,
/// for the entry frame, to I/O registers `0..n`.
fn do_return(shared: &ExecShared, stack: &mut FrameStack) -> Step {
    let is_entry = stack.frames.len() == 1;
    let frame = current(stack)?;
    let count = frame.function().return_count();
    // Checked while the frame is still on the stack so its handlers apply
    if is_entry && count > IO_REGISTER_COUNT {
        return Err(Interrupt::index(format!(
            "{} return values exceed the register bank",
            count
        )));
    }
    let returns = frame.pop_values(count).map_err(|_| {
        Interrupt::runtime(format!(
            "{} returns {} values but its stack holds {}",
            frame.signature(),
            count,
            frame.stack_len()
        ))
    })?;
    let finished = stack.frames.pop();
    shared.sync_depth(stack);

    match stack.frames.last_mut() {
        Some(caller) => {
            returns.into_iter().for_each(|value| caller.push_value(value));
            drop(finished);
            Ok(Control::Next)
        }
        None => {
            let mut registers = shared.registers.lock();
            for (slot, value) in registers.iter_mut().zip(returns) {
                *slot = value;
            }
            drop(registers);
            drop(finished);
            Ok(Control::Finished)
        }
    }
}

fn call(
    exec: &ExecutionContext,
    stack: &mut MutexGuard<'_, FrameStack>,
    callee: Arc<Function>,
) -> Result<(), Interrupt> {
    match callee.kind() {
        FunctionKind::Init => Err(Interrupt::runtime(format!(
            "{} is a module initializer",
            callee.signature()
        ))),
        FunctionKind::Native => call_native(exec, stack, &callee),
        FunctionKind::Script => {
            if stack.frames.len() >= FRAME_STACK_SIZE {
                return Err(Interrupt::runtime("frame stack overflow"));
            }
            let args = current(stack)?
                .pop_values(callee.param_count())
                .map_err(|_| Interrupt::runtime(format!("too few arguments for {}", callee.signature())))?;
            let mut frame = Frame::new(callee);
            for (index, value) in args.into_iter().enumerate() {
                frame.set_local(index, value)?;
            }
            stack.frames.push(frame);
            exec.shared().sync_depth(stack);
            Ok(())
        }
    }
}

fn call_native(
    exec: &ExecutionContext,
    stack: &mut MutexGuard<'_, FrameStack>,
    callee: &Arc<Function>,
) -> Result<(), Interrupt> {
    let native = exec
        .vm()
        .lookup_native(callee.signature())
        .ok_or_else(|| Interrupt::runtime(format!("native {} is not bound", callee.signature())))?;
    let args = current(stack)?
        .pop_values(callee.param_count())
        .map_err(|_| Interrupt::runtime(format!("too few arguments for {}", callee.signature())))?;

    let mut call = CallContext::new(exec, callee, args);
    let result = MutexGuard::unlocked(stack, || native(&mut call));
    if let Err(err) = result {
        return Err(Interrupt::runtime(format!("{}: {}", callee.signature(), err)));
    }
    let returns = call.into_returns();
    let caller = current(stack)?;
    returns.into_iter().for_each(|value| caller.push_value(value));
    Ok(())
}

fn array_index(index: &Value) -> Result<usize, Interrupt> {
    let raw: i128 = match index.data() {
        ValueData::Int8(v) => (*v).into(),
        ValueData::Int16(v) => (*v).into(),
        ValueData::Int32(v) => (*v).into(),
        ValueData::Int64(v) => (*v).into(),
        ValueData::Uint8(v) => (*v).into(),
        ValueData::Uint16(v) => (*v).into(),
        ValueData::Uint32(v) => (*v).into(),
        ValueData::Uint64(v) => (*v).into(),
        _ => {
            return Err(Interrupt::type_error(format!(
                "array index must be an integer, found {}",
                index.value_type()
            )))
        }
    };
    usize::try_from(raw).map_err(|_| Interrupt::index(format!("negative array index {}", raw)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

fn binary(vm: &VmContext, stack: &mut FrameStack, op: ArithOp) -> Result<(), Interrupt> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    let result = arithmetic(vm, op, &a, &b)?;
    push(stack, result)
}

macro_rules! int_arith {
    ($vm:expr, $op:expr, $a:expr, $b:expr, $create:ident) => {{
        let (a, b) = ($a, $b);
        let raw = match $op {
            ArithOp::Add => a.wrapping_add(b),
            ArithOp::Sub => a.wrapping_sub(b),
            ArithOp::Mul => a.wrapping_mul(b),
            ArithOp::Div | ArithOp::Mod if b == 0 => {
                return Err(Interrupt::Fault(
                    StandardException::DivideByZeroError,
                    "integer division by zero".to_string(),
                ))
            }
            ArithOp::Div => a.wrapping_div(b),
            ArithOp::Mod => a.wrapping_rem(b),
        };
        Value::$create($vm, raw)
    }};
}

macro_rules! float_arith {
    ($vm:expr, $op:expr, $a:expr, $b:expr, $create:ident) => {{
        let (a, b) = ($a, $b);
        let raw = match $op {
            ArithOp::Add => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Mod => a % b,
        };
        Value::$create($vm, raw)
    }};
}

/// Same-type arithmetic. Integers wrap; strings concatenate under `Add`.
fn arithmetic(vm: &VmContext, op: ArithOp, a: &Value, b: &Value) -> Result<Value, Interrupt> {
    use ValueData::*;
    let value = match (a.data(), b.data()) {
        (Int8(a), Int8(b)) => int_arith!(vm, op, *a, *b, create_int8),
        (Int16(a), Int16(b)) => int_arith!(vm, op, *a, *b, create_int16),
        (Int32(a), Int32(b)) => int_arith!(vm, op, *a, *b, create_int32),
        (Int64(a), Int64(b)) => int_arith!(vm, op, *a, *b, create_int64),
        (Uint8(a), Uint8(b)) => int_arith!(vm, op, *a, *b, create_uint8),
        (Uint16(a), Uint16(b)) => int_arith!(vm, op, *a, *b, create_uint16),
        (Uint32(a), Uint32(b)) => int_arith!(vm, op, *a, *b, create_uint32),
        (Uint64(a), Uint64(b)) => int_arith!(vm, op, *a, *b, create_uint64),
        (Float32(a), Float32(b)) => float_arith!(vm, op, *a, *b, create_float32),
        (Float64(a), Float64(b)) => float_arith!(vm, op, *a, *b, create_float64),
        (String(a), String(b)) if op == ArithOp::Add => {
            let mut joined = std::string::String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Value::create_string(vm, &joined)
        }
        _ => {
            return Err(Interrupt::type_error(format!(
                "cannot apply {:?} to {} and {}",
                op,
                a.value_type(),
                b.value_type()
            )))
        }
    };
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitOp {
    Xor,
    RotateLeft,
    RotateRight,
}

fn bitwise(vm: &VmContext, stack: &mut FrameStack, op: BitOp) -> Result<(), Interrupt> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    let result = bitwise_value(vm, op, &a, &b)?;
    push(stack, result)
}

// Rotation amounts wrap at the operand width; negative amounts wrap upward.
macro_rules! int_bitwise {
    ($vm:expr, $op:expr, $a:expr, $b:expr, $bits:expr, $create:ident) => {{
        let (a, b) = ($a, $b);
        let raw = match $op {
            BitOp::Xor => a ^ b,
            BitOp::RotateLeft => a.rotate_left(b.rem_euclid($bits) as u32),
            BitOp::RotateRight => a.rotate_right(b.rem_euclid($bits) as u32),
        };
        Value::$create($vm, raw)
    }};
}

fn bitwise_value(vm: &VmContext, op: BitOp, a: &Value, b: &Value) -> Result<Value, Interrupt> {
    use ValueData::*;
    let value = match (a.data(), b.data()) {
        (Bool(a), Bool(b)) if op == BitOp::Xor => Value::create_bool(vm, a ^ b),
        (Int8(a), Int8(b)) => int_bitwise!(vm, op, *a, *b, 8, create_int8),
        (Int16(a), Int16(b)) => int_bitwise!(vm, op, *a, *b, 16, create_int16),
        (Int32(a), Int32(b)) => int_bitwise!(vm, op, *a, *b, 32, create_int32),
        (Int64(a), Int64(b)) => int_bitwise!(vm, op, *a, *b, 64, create_int64),
        (Uint8(a), Uint8(b)) => int_bitwise!(vm, op, *a, *b, 8, create_uint8),
        (Uint16(a), Uint16(b)) => int_bitwise!(vm, op, *a, *b, 16, create_uint16),
        (Uint32(a), Uint32(b)) => int_bitwise!(vm, op, *a, *b, 32, create_uint32),
        (Uint64(a), Uint64(b)) => int_bitwise!(vm, op, *a, *b, 64, create_uint64),
        _ => {
            return Err(Interrupt::type_error(format!(
                "cannot apply {:?} to {} and {}",
                op,
                a.value_type(),
                b.value_type()
            )))
        }
    };
    Ok(value)
}

fn bit_not(vm: &VmContext, value: &Value) -> Result<Value, Interrupt> {
    use ValueData::*;
    let value = match value.data() {
        Bool(v) => Value::create_bool(vm, !v),
        Int8(v) => Value::create_int8(vm, !v),
        Int16(v) => Value::create_int16(vm, !v),
        Int32(v) => Value::create_int32(vm, !v),
        Int64(v) => Value::create_int64(vm, !v),
        Uint8(v) => Value::create_uint8(vm, !v),
        Uint16(v) => Value::create_uint16(vm, !v),
        Uint32(v) => Value::create_uint32(vm, !v),
        Uint64(v) => Value::create_uint64(vm, !v),
        _ => {
            return Err(Interrupt::type_error(format!(
                "cannot complement {}",
                value.value_type()
            )))
        }
    };
    Ok(value)
}

fn shift_left(vm: &VmContext, value: &Value, amount: u8) -> Result<Value, Interrupt> {
    use ValueData::*;
    let amount = u32::from(amount);
    let value = match value.data() {
        Int8(v) => Value::create_int8(vm, v.checked_shl(amount).unwrap_or(0)),
        Int16(v) => Value::create_int16(vm, v.checked_shl(amount).unwrap_or(0)),
        Int32(v) => Value::create_int32(vm, v.checked_shl(amount).unwrap_or(0)),
        Int64(v) => Value::create_int64(vm, v.checked_shl(amount).unwrap_or(0)),
        Uint8(v) => Value::create_uint8(vm, v.checked_shl(amount).unwrap_or(0)),
        Uint16(v) => Value::create_uint16(vm, v.checked_shl(amount).unwrap_or(0)),
        Uint32(v) => Value::create_uint32(vm, v.checked_shl(amount).unwrap_or(0)),
        Uint64(v) => Value::create_uint64(vm, v.checked_shl(amount).unwrap_or(0)),
        _ => {
            return Err(Interrupt::type_error(format!(
                "cannot shift {}",
                value.value_type()
            )))
        }
    };
    Ok(value)
}

/// A primitive widened for conversion.
#[derive(Debug, Clone, Copy)]
enum Scalar {
    Bool(bool),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl Scalar {
    fn of(value: &Value) -> Option<Self> {
        use ValueData::*;
        let scalar = match value.data() {
            Bool(v) => Scalar::Bool(*v),
            Int8(v) => Scalar::Signed((*v).into()),
            Int16(v) => Scalar::Signed((*v).into()),
            Int32(v) => Scalar::Signed((*v).into()),
            Int64(v) => Scalar::Signed(*v),
            Uint8(v) => Scalar::Unsigned((*v).into()),
            Uint16(v) => Scalar::Unsigned((*v).into()),
            Uint32(v) => Scalar::Unsigned((*v).into()),
            Uint64(v) => Scalar::Unsigned(*v),
            Float32(v) => Scalar::Float((*v).into()),
            Float64(v) => Scalar::Float(*v),
            _ => return None,
        };
        Some(scalar)
    }

    fn truthy(self) -> bool {
        match self {
            Scalar::Bool(v) => v,
            Scalar::Signed(v) => v != 0,
            Scalar::Unsigned(v) => v != 0,
            Scalar::Float(v) => v != 0.0,
        }
    }

    fn render(self) -> String {
        match self {
            Scalar::Bool(v) => v.to_string(),
            Scalar::Signed(v) => v.to_string(),
            Scalar::Unsigned(v) => v.to_string(),
            Scalar::Float(v) => format!("{:.6}", v),
        }
    }
}

// Integer targets truncate; float sources saturate.
macro_rules! convert {
    ($scalar:expr, $ty:ty) => {
        match $scalar {
            Scalar::Bool(v) => u8::from(v) as $ty,
            Scalar::Signed(v) => v as $ty,
            Scalar::Unsigned(v) => v as $ty,
            Scalar::Float(v) => v as $ty,
        }
    };
}

/// Converts a primitive value to `target`. Casting to the value's own type
/// yields the value itself.
fn cast(vm: &VmContext, value: &Value, target: core_types::ValueType) -> Result<Value, Interrupt> {
    use core_types::ValueType as T;
    if value.value_type() == target {
        return Ok(value.clone());
    }
    let source = Scalar::of(value).ok_or_else(|| {
        Interrupt::type_error(format!("cannot cast {} to {}", value.value_type(), target))
    })?;
    let result = match target {
        T::Bool => Value::create_bool(vm, source.truthy()),
        T::Int8 => Value::create_int8(vm, convert!(source, i8)),
        T::Int16 => Value::create_int16(vm, convert!(source, i16)),
        T::Int32 => Value::create_int32(vm, convert!(source, i32)),
        T::Int64 => Value::create_int64(vm, convert!(source, i64)),
        T::Uint8 => Value::create_uint8(vm, convert!(source, u8)),
        T::Uint16 => Value::create_uint16(vm, convert!(source, u16)),
        T::Uint32 => Value::create_uint32(vm, convert!(source, u32)),
        T::Uint64 => Value::create_uint64(vm, convert!(source, u64)),
        T::Float32 => Value::create_float32(vm, convert!(source, f32)),
        T::Float64 => Value::create_float64(vm, convert!(source, f64)),
        T::String => Value::create_string(vm, &source.render()),
        _ => {
            return Err(Interrupt::type_error(format!(
                "cannot cast {} to {}",
                value.value_type(),
                target
            )))
        }
    };
    Ok(result)
}

/// Equality. Values of different types are never equal; containers and
/// native values compare by identity.
fn equals(a: &Value, b: &Value) -> bool {
    use ValueData::*;
    match (a.data(), b.data()) {
        (Null, Null) => true,
        (Bool(a), Bool(b)) => a == b,
        (Int8(a), Int8(b)) => a == b,
        (Int16(a), Int16(b)) => a == b,
        (Int32(a), Int32(b)) => a == b,
        (Int64(a), Int64(b)) => a == b,
        (Uint8(a), Uint8(b)) => a == b,
        (Uint16(a), Uint16(b)) => a == b,
        (Uint32(a), Uint32(b)) => a == b,
        (Uint64(a), Uint64(b)) => a == b,
        (Float32(a), Float32(b)) => a == b,
        (Float64(a), Float64(b)) => a == b,
        (String(a), String(b)) => a == b,
        (Function(a), Function(b)) => a == b,
        _ => Value::ptr_eq(a, b),
    }
}

/// Ordering of same-type numbers or strings; `None` when either is NaN.
fn compare(a: &Value, b: &Value) -> Result<Option<CmpOrdering>, Interrupt> {
    use ValueData::*;
    let order = match (a.data(), b.data()) {
        (Int8(a), Int8(b)) => a.partial_cmp(b),
        (Int16(a), Int16(b)) => a.partial_cmp(b),
        (Int32(a), Int32(b)) => a.partial_cmp(b),
        (Int64(a), Int64(b)) => a.partial_cmp(b),
        (Uint8(a), Uint8(b)) => a.partial_cmp(b),
        (Uint16(a), Uint16(b)) => a.partial_cmp(b),
        (Uint32(a), Uint32(b)) => a.partial_cmp(b),
        (Uint64(a), Uint64(b)) => a.partial_cmp(b),
        (Float32(a), Float32(b)) => a.partial_cmp(b),
        (Float64(a), Float64(b)) => a.partial_cmp(b),
        (String(a), String(b)) => a.partial_cmp(b),
        _ => {
            return Err(Interrupt::type_error(format!(
                "cannot compare {} with {}",
                a.value_type(),
                b.value_type()
            )))
        }
    };
    Ok(order)
}
