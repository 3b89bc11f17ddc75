//! Module definitions and the binary module blob
//!
//! Wire layout, little-endian throughout:
//!
//! ```text
//! MODULE_MAGIC (4) | version u32 | payload length u32 | payload
//! payload = name | constants | globals | object schemas | functions
//! ```

use core_types::constants::{MODULE_MAGIC, MODULE_VERSION};
use core_types::{ErrorCode, HqError, HqResult};

use crate::constant::Constant;
use crate::function::{read_count, FunctionDef, FunctionKind};
use crate::serializer::{EndianOrder, Serializer, SerializerMode};

/// Class declaration: a name and its ordered member names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectSchema {
    /// Fully qualified class name
    pub class_name: String,
    /// Member names in declaration order
    pub members: Vec<String>,
}

impl ObjectSchema {
    /// Create a schema
    pub fn new<I, S>(class_name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_name: class_name.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }
}

/// A compiled module
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModuleDef {
    /// Module name, `/` separated
    pub name: String,
    /// Constant pool shared by the module's functions
    pub constants: Vec<Constant>,
    /// Global variable names declared by this module
    pub globals: Vec<String>,
    /// Classes declared by this module
    pub object_schemas: Vec<ObjectSchema>,
    /// Functions, including at most one initializer
    pub functions: Vec<FunctionDef>,
}

impl ModuleDef {
    /// Create an empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a constant and return its pool index
    pub fn add_constant(&mut self, constant: Constant) -> u32 {
        self.constants.push(constant);
        (self.constants.len() - 1) as u32
    }

    /// Declare a global variable
    pub fn add_global(&mut self, name: impl Into<String>) {
        self.globals.push(name.into());
    }

    /// Declare a class
    pub fn add_object_schema(&mut self, schema: ObjectSchema) {
        self.object_schemas.push(schema);
    }

    /// Add a function definition
    pub fn add_function(&mut self, function: FunctionDef) {
        self.functions.push(function);
    }

    /// The module initializer, if any
    pub fn init_function(&self) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.kind == FunctionKind::Init)
    }

    /// Look up a function by signature
    pub fn function(&self, signature: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.signature == signature)
    }

    /// Checks structural consistency of every function and declaration.
    pub fn validate(&self) -> HqResult<()> {
        if self.name.is_empty() {
            return Err(HqError::new(ErrorCode::InvalidData, "module with empty name"));
        }
        let init_count = self
            .functions
            .iter()
            .filter(|f| f.kind == FunctionKind::Init)
            .count();
        if init_count > 1 {
            return Err(HqError::new(
                ErrorCode::InvalidData,
                format!("{}: {} init functions", self.name, init_count),
            ));
        }
        for function in &self.functions {
            function.validate()?;
            for op in &function.code {
                if let crate::Opcode::LoadConstant(index) = op {
                    if *index as usize >= self.constants.len() {
                        return Err(HqError::new(
                            ErrorCode::InvalidData,
                            format!("{}: constant {} out of range", function.signature, index),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Serialize module to a blob
    pub fn to_bytes(&self) -> HqResult<Vec<u8>> {
        let mut payload = Serializer::new(SerializerMode::Writer);
        payload.set_endianness(EndianOrder::Little)?;
        self.encode_payload(&mut payload)?;
        let payload = payload.into_bytes();

        let payload_len = u32::try_from(payload.len())
            .map_err(|_| HqError::new(ErrorCode::InvalidData, "module payload too large"))?;

        let mut blob = Serializer::new(SerializerMode::Writer);
        blob.set_endianness(EndianOrder::Little)?;
        blob.write_buffer(&MODULE_MAGIC)?;
        blob.write_u32(MODULE_VERSION)?;
        blob.write_u32(payload_len)?;
        if !payload.is_empty() {
            blob.write_buffer(&payload)?;
        }
        Ok(blob.into_bytes())
    }

    /// Deserialize and validate a module blob
    pub fn from_bytes(bytes: &[u8]) -> HqResult<Self> {
        Self::decode_blob(bytes).map_err(|err| match err.code() {
            ErrorCode::StreamEnd => HqError::new(
                ErrorCode::InvalidData,
                format!("truncated module blob: {}", err.message()),
            ),
            _ => err,
        })
    }

    fn decode_blob(bytes: &[u8]) -> HqResult<Self> {
        if bytes.len() < MODULE_MAGIC.len() + 8 {
            return Err(HqError::new(
                ErrorCode::InvalidData,
                "too few bytes for module header",
            ));
        }

        let mut ser = Serializer::new(SerializerMode::Reader);
        ser.load_buffer(bytes)?;
        ser.set_endianness(EndianOrder::Little)?;

        let mut magic = [0u8; 4];
        ser.read_buffer(&mut magic)?;
        if magic != MODULE_MAGIC {
            return Err(HqError::new(ErrorCode::InvalidData, "invalid module magic"));
        }

        let version = ser.read_u32()?;
        if version != MODULE_VERSION {
            return Err(HqError::new(
                ErrorCode::InvalidData,
                format!("unsupported module version {}", version),
            ));
        }

        let payload_len = ser.read_u32()? as usize;
        if payload_len != ser.remaining() {
            return Err(HqError::new(
                ErrorCode::InvalidData,
                format!(
                    "payload length {} does not match {} remaining bytes",
                    payload_len,
                    ser.remaining()
                ),
            ));
        }

        let module = Self::decode_payload(&mut ser)?;
        if ser.remaining() != 0 {
            return Err(HqError::new(
                ErrorCode::InvalidData,
                format!("{} trailing bytes after module", ser.remaining()),
            ));
        }
        module.validate()?;
        log::trace!(
            "decoded module {} ({} functions, {} constants)",
            module.name,
            module.functions.len(),
            module.constants.len()
        );
        Ok(module)
    }

    fn encode_payload(&self, ser: &mut Serializer) -> HqResult<()> {
        ser.write_string(&self.name)?;

        ser.write_u32(self.constants.len() as u32)?;
        for constant in &self.constants {
            constant.encode(ser)?;
        }

        ser.write_u32(self.globals.len() as u32)?;
        for global in &self.globals {
            ser.write_string(global)?;
        }

        ser.write_u32(self.object_schemas.len() as u32)?;
        for schema in &self.object_schemas {
            ser.write_string(&schema.class_name)?;
            ser.write_u32(schema.members.len() as u32)?;
            for member in &schema.members {
                ser.write_string(member)?;
            }
        }

        ser.write_u32(self.functions.len() as u32)?;
        for function in &self.functions {
            function.encode(ser)?;
        }
        Ok(())
    }

    fn decode_payload(ser: &mut Serializer) -> HqResult<Self> {
        let name = ser.read_string()?;

        let constant_count = read_count(ser)?;
        let mut constants = Vec::with_capacity(constant_count);
        for _ in 0..constant_count {
            constants.push(Constant::decode(ser)?);
        }

        let global_count = read_count(ser)?;
        let mut globals = Vec::with_capacity(global_count);
        for _ in 0..global_count {
            globals.push(ser.read_string()?);
        }

        let schema_count = read_count(ser)?;
        let mut object_schemas = Vec::with_capacity(schema_count);
        for _ in 0..schema_count {
            let class_name = ser.read_string()?;
            let member_count = read_count(ser)?;
            let mut members = Vec::with_capacity(member_count);
            for _ in 0..member_count {
                members.push(ser.read_string()?);
            }
            object_schemas.push(ObjectSchema {
                class_name,
                members,
            });
        }

        let function_count = read_count(ser)?;
        let mut functions = Vec::with_capacity(function_count);
        for _ in 0..function_count {
            functions.push(FunctionDef::decode(ser)?);
        }

        Ok(Self {
            name,
            constants,
            globals,
            object_schemas,
            functions,
        })
    }
}
