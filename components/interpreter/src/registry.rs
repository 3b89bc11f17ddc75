//! Loaded modules, functions and classes of a virtual machine

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytecode_system::{Constant, FunctionDef, FunctionKind, ModuleDef};
use core_types::constants::STANDARD_EXCEPTION_MESSAGE_MEMBER;
use core_types::{ErrorCode, HqError, HqResult, StandardException};
use memory_manager::{Heap, ObjectLayout, Value};

use crate::native::NativeFunction;

/// A function declared by a loaded module.
pub struct Function {
    def: FunctionDef,
    module_name: String,
    constants: Arc<[Value]>,
    heap_id: u64,
}

impl Function {
    /// Full signature, e.g. `Game/Main.update(float64)`
    pub fn signature(&self) -> &str {
        &self.def.signature
    }

    /// Script, native or module initializer
    pub fn kind(&self) -> FunctionKind {
        self.def.kind
    }

    /// Whether the host supplies the implementation
    pub fn is_native(&self) -> bool {
        self.def.is_native()
    }

    /// Number of values popped from the caller on entry
    pub fn param_count(&self) -> usize {
        self.def.param_count as usize
    }

    /// Number of values pushed onto the caller on return
    pub fn return_count(&self) -> usize {
        self.def.return_count as usize
    }

    /// Declared local slot names, parameters first
    pub fn local_names(&self) -> &[String] {
        &self.def.local_names
    }

    /// Name of the declaring module
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// The underlying definition
    pub fn definition(&self) -> &FunctionDef {
        &self.def
    }

    pub(crate) fn constant(&self, index: u32) -> Option<&Value> {
        self.constants.get(index as usize)
    }

    pub(crate) fn heap_id(&self) -> u64 {
        self.heap_id
    }

    #[cfg(test)]
    pub(crate) fn for_test(def: FunctionDef, heap: &Heap) -> Arc<Self> {
        Arc::new(Function {
            def,
            module_name: "Test".to_string(),
            constants: Arc::from(Vec::new()),
            heap_id: heap.id(),
        })
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("signature", &self.def.signature)
            .field("kind", &self.def.kind)
            .field("module", &self.module_name)
            .finish()
    }
}

/// A module registered with a virtual machine.
#[derive(Debug)]
pub struct Module {
    name: String,
    globals: Vec<String>,
    classes: Vec<String>,
    functions: Vec<String>,
    init: Option<Arc<Function>>,
    constants: Arc<[Value]>,
}

impl Module {
    /// Registered module name, `/` separated
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Globals declared by this module, in declaration order
    pub fn global_names(&self) -> &[String] {
        &self.globals
    }

    /// Classes declared by this module
    pub fn class_names(&self) -> &[String] {
        &self.classes
    }

    /// Signatures of every function in this module
    pub fn function_signatures(&self) -> &[String] {
        &self.functions
    }

    /// The module initializer, if it declares one
    pub fn init_function(&self) -> Option<&Arc<Function>> {
        self.init.as_ref()
    }

    /// Number of constants in the module's pool
    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }
}

/// Module-level tables, read-mostly once loading is done.
#[derive(Default)]
pub(crate) struct Registry {
    pub(crate) modules: Vec<Arc<Module>>,
    pub(crate) functions: HashMap<String, Arc<Function>>,
    pub(crate) layouts: HashMap<String, Arc<ObjectLayout>>,
    pub(crate) natives: HashMap<String, NativeFunction>,
    /// Number of modules, in load order, whose initializer already ran
    pub(crate) initialized: usize,
}

impl Registry {
    /// A registry holding the built-in exception classes.
    pub(crate) fn with_builtins() -> Self {
        let mut registry = Registry::default();
        for kind in StandardException::ALL {
            let class_name = kind.class_name();
            let layout = ObjectLayout::new(&class_name, [STANDARD_EXCEPTION_MESSAGE_MEMBER]);
            registry.layouts.insert(class_name, layout);
        }
        registry
    }

    pub(crate) fn module(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Links a validated module definition.
    ///
    /// Every conflict is checked before anything is inserted, so a failed
    /// load leaves the registry unchanged.
    pub(crate) fn link(&mut self, name: String, def: ModuleDef, heap: &Heap) -> HqResult<Arc<Module>> {
        if self.module(&name).is_some() {
            return Err(duplicate(format!("module {} is already loaded", name)));
        }
        let mut signatures = HashSet::new();
        for function in &def.functions {
            if self.functions.contains_key(&function.signature)
                || !signatures.insert(function.signature.as_str())
            {
                return Err(duplicate(format!("function {} is already defined", function.signature)));
            }
        }
        let mut classes = HashSet::new();
        for schema in &def.object_schemas {
            if self.layouts.contains_key(&schema.class_name)
                || !classes.insert(schema.class_name.as_str())
            {
                return Err(duplicate(format!("class {} is already defined", schema.class_name)));
            }
        }
        let mut globals: HashSet<&str> = self
            .modules
            .iter()
            .flat_map(|m| m.globals.iter().map(String::as_str))
            .collect();
        for global in &def.globals {
            if !globals.insert(global.as_str()) {
                return Err(duplicate(format!("global {} is already declared", global)));
            }
        }

        let constants: Arc<[Value]> = def
            .constants
            .iter()
            .map(|constant| constant_value(heap, constant))
            .collect::<Vec<_>>()
            .into();

        let mut init = None;
        let mut signatures = Vec::with_capacity(def.functions.len());
        for function in def.functions {
            signatures.push(function.signature.clone());
            let function = Arc::new(Function {
                def: function,
                module_name: name.clone(),
                constants: Arc::clone(&constants),
                heap_id: heap.id(),
            });
            if function.kind() == FunctionKind::Init {
                init = Some(Arc::clone(&function));
            }
            self.functions
                .insert(function.signature().to_string(), function);
        }

        let mut classes = Vec::with_capacity(def.object_schemas.len());
        for schema in def.object_schemas {
            let layout = ObjectLayout::new(&schema.class_name, &schema.members);
            classes.push(schema.class_name.clone());
            self.layouts.insert(schema.class_name, layout);
        }

        let module = Arc::new(Module {
            name,
            globals: def.globals,
            classes,
            functions: signatures,
            init,
            constants,
        });
        self.modules.push(Arc::clone(&module));
        Ok(module)
    }

    pub(crate) fn visit_roots(&self, visit: &mut dyn FnMut(&Value)) {
        for module in &self.modules {
            module.constants.iter().for_each(|v| visit(v));
        }
    }
}

fn duplicate(message: String) -> HqError {
    HqError::new(ErrorCode::Duplicate, message)
}

/// Materializes a pool constant on the VM heap.
pub(crate) fn constant_value(heap: &Heap, constant: &Constant) -> Value {
    match constant {
        Constant::Null => Value::create_null(heap),
        Constant::Bool(v) => Value::create_bool(heap, *v),
        Constant::Int8(v) => Value::create_int8(heap, *v),
        Constant::Int16(v) => Value::create_int16(heap, *v),
        Constant::Int32(v) => Value::create_int32(heap, *v),
        Constant::Int64(v) => Value::create_int64(heap, *v),
        Constant::Uint8(v) => Value::create_uint8(heap, *v),
        Constant::Uint16(v) => Value::create_uint16(heap, *v),
        Constant::Uint32(v) => Value::create_uint32(heap, *v),
        Constant::Uint64(v) => Value::create_uint64(heap, *v),
        Constant::Float32(v) => Value::create_float32(heap, *v),
        Constant::Float64(v) => Value::create_float64(heap, *v),
        Constant::String(v) => Value::create_string(heap, v),
    }
}
