//! Function definitions and guarded blocks
//!
//! A [`FunctionDef`] is the static description of a callable: its signature,
//! arity, local slot names, exception handling ranges and bytecode.

use core_types::constants::IO_REGISTER_COUNT;
use core_types::{ErrorCode, HqError, HqResult, ValueType};

use crate::opcode::Opcode;
use crate::serializer::Serializer;

/// How a function is implemented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Bytecode function
    Script,
    /// Host function bound at runtime
    Native,
    /// Module initializer, run once by `initialize_modules`
    Init,
}

impl FunctionKind {
    fn tag(self) -> u8 {
        match self {
            FunctionKind::Script => 0,
            FunctionKind::Native => 1,
            FunctionKind::Init => 2,
        }
    }

    fn from_tag(tag: u8) -> HqResult<Self> {
        match tag {
            0 => Ok(FunctionKind::Script),
            1 => Ok(FunctionKind::Native),
            2 => Ok(FunctionKind::Init),
            _ => Err(HqError::new(
                ErrorCode::InvalidData,
                format!("unknown function kind {}", tag),
            )),
        }
    }
}

/// One catch clause of a guarded block
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExceptionHandler {
    /// Type of exception value this clause accepts
    pub value_type: ValueType,
    /// Required class name when `value_type` is `Object`
    pub class_name: Option<String>,
    /// Instruction index the handler starts at
    pub offset: u32,
}

impl ExceptionHandler {
    /// Handler matching any value of a type.
    pub fn for_type(value_type: ValueType, offset: u32) -> Self {
        Self {
            value_type,
            class_name: None,
            offset,
        }
    }

    /// Handler matching objects of one class.
    pub fn for_class(class_name: impl Into<String>, offset: u32) -> Self {
        Self {
            value_type: ValueType::Object,
            class_name: Some(class_name.into()),
            offset,
        }
    }

    /// Whether this clause accepts an exception of the given type and class.
    pub fn matches(&self, value_type: ValueType, class_name: Option<&str>) -> bool {
        if self.value_type != value_type {
            return false;
        }
        match (value_type, &self.class_name) {
            (ValueType::Object, Some(expected)) => class_name == Some(expected.as_str()),
            _ => true,
        }
    }
}

/// Half-open instruction range `[start, end)` protected by handlers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardedBlock {
    /// First protected instruction
    pub start: u32,
    /// One past the last protected instruction
    pub end: u32,
    /// Clauses tried in order
    pub handlers: Vec<ExceptionHandler>,
}

impl GuardedBlock {
    /// Creates a block with no handlers.
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            handlers: Vec::new(),
        }
    }

    /// Adds a clause, builder style.
    pub fn with_handler(mut self, handler: ExceptionHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Whether the instruction at `offset` is protected.
    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Width of the range; narrower blocks are more deeply nested.
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Static description of a function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Unique signature, e.g. `Main.add(int32,int32)`
    pub signature: String,
    /// Implementation kind
    pub kind: FunctionKind,
    /// Values popped from the caller into the first locals
    pub param_count: u32,
    /// Values moved back to the caller on return
    pub return_count: u32,
    /// Names of the local slots, parameters first
    pub local_names: Vec<String>,
    /// Exception handling ranges
    pub guarded_blocks: Vec<GuardedBlock>,
    /// Bytecode; empty for native functions
    pub code: Vec<Opcode>,
}

impl FunctionDef {
    /// Create an empty script function
    pub fn script(signature: impl Into<String>) -> Self {
        Self::with_kind(signature, FunctionKind::Script)
    }

    /// Create a native declaration
    pub fn native(signature: impl Into<String>, param_count: u32, return_count: u32) -> Self {
        let mut def = Self::with_kind(signature, FunctionKind::Native);
        def.param_count = param_count;
        def.return_count = return_count;
        def
    }

    /// Create an empty module initializer
    pub fn init(signature: impl Into<String>) -> Self {
        Self::with_kind(signature, FunctionKind::Init)
    }

    fn with_kind(signature: impl Into<String>, kind: FunctionKind) -> Self {
        Self {
            signature: signature.into(),
            kind,
            param_count: 0,
            return_count: 0,
            local_names: Vec::new(),
            guarded_blocks: Vec::new(),
            code: Vec::new(),
        }
    }

    /// Declare parameter and return counts, builder style
    pub fn with_arity(mut self, param_count: u32, return_count: u32) -> Self {
        self.param_count = param_count;
        self.return_count = return_count;
        self
    }

    /// Declare a local slot and return its index
    pub fn add_local(&mut self, name: impl Into<String>) -> u32 {
        self.local_names.push(name.into());
        (self.local_names.len() - 1) as u32
    }

    /// Emit an instruction and return its index
    pub fn emit(&mut self, opcode: Opcode) -> u32 {
        self.code.push(opcode);
        (self.code.len() - 1) as u32
    }

    /// Replace the instruction at `index`, for patching forward branches
    pub fn patch(&mut self, index: u32, opcode: Opcode) -> HqResult<()> {
        let slot = self.code.get_mut(index as usize).ok_or_else(|| {
            HqError::new(ErrorCode::OutOfRange, format!("no instruction at {}", index))
        })?;
        *slot = opcode;
        Ok(())
    }

    /// Add a guarded block
    pub fn add_guarded_block(&mut self, block: GuardedBlock) {
        self.guarded_blocks.push(block);
    }

    /// Index of the next instruction to be emitted
    pub fn next_offset(&self) -> u32 {
        self.code.len() as u32
    }

    /// Whether this function is implemented by the host
    pub fn is_native(&self) -> bool {
        self.kind == FunctionKind::Native
    }

    /// Checks that the declaration is internally consistent.
    pub fn validate(&self) -> HqResult<()> {
        let invalid = |message: String| Err(HqError::new(ErrorCode::InvalidData, message));

        if self.signature.is_empty() {
            return invalid("function with empty signature".to_string());
        }
        // Entry returns land in the register bank, so no function may exceed it
        let limit = IO_REGISTER_COUNT as u32;
        if self.param_count > limit || self.return_count > limit {
            return invalid(format!(
                "{}: arity ({}, {}) exceeds the limit of {}",
                self.signature, self.param_count, self.return_count, limit
            ));
        }
        if self.kind != FunctionKind::Native {
            if (self.local_names.len() as u32) < self.param_count {
                return invalid(format!(
                    "{}: {} parameters but {} locals",
                    self.signature,
                    self.param_count,
                    self.local_names.len()
                ));
            }
            let len = self.code.len() as u32;
            for (index, op) in self.code.iter().enumerate() {
                if let Opcode::Cast(target) = op {
                    if !Opcode::is_cast_target(*target) {
                        return invalid(format!(
                            "{}: cast at {} targets {}",
                            self.signature, index, target
                        ));
                    }
                }
                if let Some(target) = op.branch_target() {
                    if target >= len {
                        return invalid(format!(
                            "{}: branch at {} targets {}",
                            self.signature, index, target
                        ));
                    }
                }
            }
            for block in &self.guarded_blocks {
                if block.start > block.end || block.end > len {
                    return invalid(format!(
                        "{}: guarded block [{}, {}) out of bounds",
                        self.signature, block.start, block.end
                    ));
                }
                if block.handlers.iter().any(|h| h.offset >= len) {
                    return invalid(format!("{}: handler offset out of bounds", self.signature));
                }
            }
        } else if !self.code.is_empty() {
            return invalid(format!("{}: native function with bytecode", self.signature));
        }
        Ok(())
    }

    pub(crate) fn encode(&self, ser: &mut Serializer) -> HqResult<()> {
        ser.write_string(&self.signature)?;
        ser.write_u8(self.kind.tag())?;
        ser.write_u32(self.param_count)?;
        ser.write_u32(self.return_count)?;

        ser.write_u32(self.local_names.len() as u32)?;
        for name in &self.local_names {
            ser.write_string(name)?;
        }

        ser.write_u32(self.guarded_blocks.len() as u32)?;
        for block in &self.guarded_blocks {
            ser.write_u32(block.start)?;
            ser.write_u32(block.end)?;
            ser.write_u32(block.handlers.len() as u32)?;
            for handler in &block.handlers {
                ser.write_u8(handler.value_type.tag())?;
                match &handler.class_name {
                    Some(name) => {
                        ser.write_bool(true)?;
                        ser.write_string(name)?;
                    }
                    None => ser.write_bool(false)?,
                }
                ser.write_u32(handler.offset)?;
            }
        }

        ser.write_u32(self.code.len() as u32)?;
        for op in &self.code {
            op.encode(ser)?;
        }
        Ok(())
    }

    pub(crate) fn decode(ser: &mut Serializer) -> HqResult<Self> {
        let signature = ser.read_string()?;
        let kind = FunctionKind::from_tag(ser.read_u8()?)?;
        let param_count = ser.read_u32()?;
        let return_count = ser.read_u32()?;

        let local_count = read_count(ser)?;
        let mut local_names = Vec::with_capacity(local_count);
        for _ in 0..local_count {
            local_names.push(ser.read_string()?);
        }

        let block_count = read_count(ser)?;
        let mut guarded_blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            let start = ser.read_u32()?;
            let end = ser.read_u32()?;
            let handler_count = read_count(ser)?;
            let mut handlers = Vec::with_capacity(handler_count);
            for _ in 0..handler_count {
                let tag = ser.read_u8()?;
                let value_type = ValueType::from_tag(tag).ok_or_else(|| {
                    HqError::new(ErrorCode::InvalidData, format!("unknown value tag {}", tag))
                })?;
                let class_name = if ser.read_bool()? {
                    Some(ser.read_string()?)
                } else {
                    None
                };
                let offset = ser.read_u32()?;
                handlers.push(ExceptionHandler {
                    value_type,
                    class_name,
                    offset,
                });
            }
            guarded_blocks.push(GuardedBlock {
                start,
                end,
                handlers,
            });
        }

        let code_count = read_count(ser)?;
        let mut code = Vec::with_capacity(code_count);
        for _ in 0..code_count {
            code.push(Opcode::decode(ser)?);
        }

        Ok(Self {
            signature,
            kind,
            param_count,
            return_count,
            local_names,
            guarded_blocks,
            code,
        })
    }
}

/// Reads an element count, refusing counts that cannot fit in what is left.
pub(crate) fn read_count(ser: &mut Serializer) -> HqResult<usize> {
    let count = ser.read_u32()? as usize;
    if count > ser.remaining() {
        return Err(HqError::new(
            ErrorCode::InvalidData,
            format!("count {} exceeds remaining {} bytes", count, ser.remaining()),
        ));
    }
    Ok(count)
}
