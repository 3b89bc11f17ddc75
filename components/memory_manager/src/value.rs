//! Runtime values.
//!
//! A [`Value`] is a reference-counted handle to an immutable type tag and
//! payload. Cloning adds a reference and dropping releases one; scalars are
//! freed as soon as the last reference goes away. Containers may form cycles
//! and are additionally tracked by the collector of the heap they were
//! allocated from.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use core_types::{ErrorCode, HqError, HqResult, ValueType};

use crate::gc::{GcHeader, MarkColor};
use crate::heap::{AsHeap, HeapShared};
use crate::object::{clear_slots, ArrayData, ObjectLayout, ScriptObject};

/// Depth beyond which `Display` elides nested containers.
const DISPLAY_DEPTH: usize = 2;

/// Payload of a value, one variant per [`ValueType`].
pub enum ValueData {
    /// The absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed 8-bit integer
    Int8(i8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 8-bit integer
    Uint8(u8),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Single precision float
    Float32(f32),
    /// Double precision float
    Float64(f64),
    /// Immutable string
    String(Box<str>),
    /// Function reference by signature
    Function(Arc<str>),
    /// Opaque host object, dropped with the last reference
    Native(Arc<dyn Any + Send + Sync>),
    /// Array elements
    Array(ArrayData),
    /// Object members
    Object(ScriptObject),
}

impl ValueData {
    /// The type tag of this payload.
    pub fn value_type(&self) -> ValueType {
        match self {
            ValueData::Null => ValueType::Null,
            ValueData::Bool(_) => ValueType::Bool,
            ValueData::Int8(_) => ValueType::Int8,
            ValueData::Int16(_) => ValueType::Int16,
            ValueData::Int32(_) => ValueType::Int32,
            ValueData::Int64(_) => ValueType::Int64,
            ValueData::Uint8(_) => ValueType::Uint8,
            ValueData::Uint16(_) => ValueType::Uint16,
            ValueData::Uint32(_) => ValueType::Uint32,
            ValueData::Uint64(_) => ValueType::Uint64,
            ValueData::Float32(_) => ValueType::Float32,
            ValueData::Float64(_) => ValueType::Float64,
            ValueData::String(_) => ValueType::String,
            ValueData::Function(_) => ValueType::Function,
            ValueData::Native(_) => ValueType::Native,
            ValueData::Array(_) => ValueType::Array,
            ValueData::Object(_) => ValueType::Object,
        }
    }
}

pub(crate) struct ValueNode {
    pub(crate) header: GcHeader,
    heap: Option<Arc<HeapShared>>,
    data: ValueData,
}

impl ValueNode {
    /// Calls `visit` for every value this container references.
    pub(crate) fn for_each_child(&self, visit: &mut dyn FnMut(&Value)) {
        match &self.data {
            ValueData::Array(array) => array.elements.read().iter().for_each(|v| visit(v)),
            ValueData::Object(object) => object.slots.read().iter().for_each(|v| visit(v)),
            _ => {}
        }
    }

    /// Nulls every slot, returning the previous contents so the caller can
    /// drop them outside the container lock.
    pub(crate) fn dispose(&self) -> Vec<Value> {
        match &self.data {
            ValueData::Array(array) => clear_slots(&array.elements),
            ValueData::Object(object) => clear_slots(&object.slots),
            _ => Vec::new(),
        }
    }
}

/// Reference-counted runtime value.
///
/// # Examples
///
/// ```
/// use memory_manager::{Heap, Value};
/// use core_types::ValueType;
///
/// let heap = Heap::new();
/// let number = Value::create_int32(&heap, 7);
/// assert_eq!(number.value_type(), ValueType::Int32);
/// assert_eq!(number.as_int32().unwrap(), 7);
///
/// let copy = number.clone();
/// assert_eq!(number.ref_count(), 2);
/// drop(copy);
/// assert_eq!(number.ref_count(), 1);
/// ```
#[derive(Clone)]
pub struct Value(Arc<ValueNode>);

/// Non-owning reference to a value.
#[derive(Clone)]
pub struct WeakValue(Weak<ValueNode>);

impl WeakValue {
    /// The value, if it is still alive.
    pub fn upgrade(&self) -> Option<Value> {
        self.0.upgrade().map(Value)
    }
}

macro_rules! scalar_value {
    ($($create:ident, $as:ident, $variant:ident, $ty:ty;)*) => {
        $(
            #[doc = concat!("Creates a `", stringify!($ty), "` value.")]
            pub fn $create(heap: &impl AsHeap, raw: $ty) -> Value {
                Value::create(heap, ValueData::$variant(raw))
            }

            #[doc = concat!("Reads a `", stringify!($ty), "` value; `InvalidType` on any other type.")]
            pub fn $as(&self) -> HqResult<$ty> {
                match self.data() {
                    ValueData::$variant(raw) => Ok(*raw),
                    _ => Err(self.type_error(ValueType::$variant)),
                }
            }
        )*
    };
}

impl Value {
    /// Creates a value from a raw payload.
    ///
    /// Container payloads cannot be built outside this crate; use
    /// [`Value::create_array`] and [`Value::create_object`] for those.
    pub fn create(heap: &impl AsHeap, data: ValueData) -> Value {
        let shared = &heap.as_heap().shared;
        let is_container = data.value_type().is_container();
        let node = Arc::new(ValueNode {
            header: GcHeader::new(),
            heap: Some(Arc::clone(shared)),
            data,
        });
        if is_container {
            shared.register(&node);
        }
        Value(node)
    }

    /// The shared null value, valid in every heap.
    pub fn null() -> Value {
        static NULL: OnceLock<Value> = OnceLock::new();
        NULL.get_or_init(|| {
            Value(Arc::new(ValueNode {
                header: GcHeader::new(),
                heap: None,
                data: ValueData::Null,
            }))
        })
        .clone()
    }

    /// Creates a null value owned by `heap`.
    pub fn create_null(heap: &impl AsHeap) -> Value {
        Value::create(heap, ValueData::Null)
    }

    scalar_value! {
        create_bool, as_bool, Bool, bool;
        create_int8, as_int8, Int8, i8;
        create_int16, as_int16, Int16, i16;
        create_int32, as_int32, Int32, i32;
        create_int64, as_int64, Int64, i64;
        create_uint8, as_uint8, Uint8, u8;
        create_uint16, as_uint16, Uint16, u16;
        create_uint32, as_uint32, Uint32, u32;
        create_uint64, as_uint64, Uint64, u64;
        create_float32, as_float32, Float32, f32;
        create_float64, as_float64, Float64, f64;
    }

    /// Creates a string value.
    pub fn create_string(heap: &impl AsHeap, raw: &str) -> Value {
        Value::create(heap, ValueData::String(raw.into()))
    }

    /// Creates a function reference.
    pub fn create_function(heap: &impl AsHeap, signature: &str) -> Value {
        Value::create(heap, ValueData::Function(Arc::from(signature)))
    }

    /// Wraps a host object. Its destructor runs when the last reference drops.
    pub fn create_native<T: Any + Send + Sync>(heap: &impl AsHeap, object: T) -> Value {
        Value::create(heap, ValueData::Native(Arc::new(object)))
    }

    /// Creates a null-filled array of `count` elements.
    pub fn create_array(heap: &impl AsHeap, count: usize) -> HqResult<Value> {
        let mut elements = Vec::new();
        elements.try_reserve_exact(count).map_err(|_| {
            HqError::new(
                ErrorCode::BadAllocation,
                format!("cannot reserve {} array elements", count),
            )
        })?;
        elements.resize_with(count, Value::null);
        Ok(Value::create(heap, ValueData::Array(ArrayData::new(elements))))
    }

    /// Creates an object with every member null.
    pub fn create_object(heap: &impl AsHeap, layout: &Arc<ObjectLayout>) -> Value {
        Value::create(
            heap,
            ValueData::Object(ScriptObject::new(Arc::clone(layout))),
        )
    }

    pub(crate) fn from_node(node: Arc<ValueNode>) -> Value {
        Value(node)
    }

    pub(crate) fn node(&self) -> &ValueNode {
        &self.0
    }

    pub(crate) fn heap_shared(&self) -> Option<&Arc<HeapShared>> {
        self.0.heap.as_ref()
    }

    /// The payload.
    pub fn data(&self) -> &ValueData {
        &self.0.data
    }

    /// The type tag.
    pub fn value_type(&self) -> ValueType {
        self.0.data.value_type()
    }

    /// Whether this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self.0.data, ValueData::Null)
    }

    /// Whether this is an array or object.
    pub fn is_container(&self) -> bool {
        self.value_type().is_container()
    }

    /// Number of live references to this value.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Whether two handles refer to the same value.
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// A non-owning reference.
    pub fn downgrade(&self) -> WeakValue {
        WeakValue(Arc::downgrade(&self.0))
    }

    /// Current tri-color mark.
    pub fn mark_color(&self) -> MarkColor {
        self.0.header.color()
    }

    /// Marks the value as held by the host so the collector treats it as a
    /// root.
    pub fn gc_expose(&self) -> HqResult<()> {
        self.check_exposable()?;
        self.0.header.set_exposed(true);
        if let Some(shared) = self.heap_shared() {
            shared.expose_barrier(self);
        }
        Ok(())
    }

    /// Clears the host hold set by [`Value::gc_expose`].
    pub fn gc_hide(&self) -> HqResult<()> {
        self.check_exposable()?;
        self.0.header.set_exposed(false);
        Ok(())
    }

    /// Whether the host currently holds this value exposed.
    pub fn is_exposed(&self) -> bool {
        self.0.header.is_exposed()
    }

    fn check_exposable(&self) -> HqResult<()> {
        if self.is_null() {
            return Err(HqError::new(
                ErrorCode::InvalidType,
                "null values cannot be exposed",
            ));
        }
        Ok(())
    }

    fn type_error(&self, expected: ValueType) -> HqError {
        HqError::new(
            ErrorCode::InvalidType,
            format!("expected {}, found {}", expected, self.value_type()),
        )
    }

    /// Reads a string value.
    pub fn as_str(&self) -> HqResult<&str> {
        match self.data() {
            ValueData::String(raw) => Ok(raw),
            _ => Err(self.type_error(ValueType::String)),
        }
    }

    /// Signature of a function value.
    pub fn function_signature(&self) -> HqResult<&str> {
        match self.data() {
            ValueData::Function(signature) => Ok(signature),
            _ => Err(self.type_error(ValueType::Function)),
        }
    }

    /// Downcasts a native value.
    pub fn native<T: Any + Send + Sync>(&self) -> HqResult<Arc<T>> {
        match self.data() {
            ValueData::Native(object) => Arc::clone(object).downcast::<T>().map_err(|_| {
                HqError::new(ErrorCode::InvalidType, "native object has a different type")
            }),
            _ => Err(self.type_error(ValueType::Native)),
        }
    }

    fn array(&self) -> HqResult<&ArrayData> {
        match self.data() {
            ValueData::Array(array) => Ok(array),
            _ => Err(self.type_error(ValueType::Array)),
        }
    }

    fn object(&self) -> HqResult<&ScriptObject> {
        match self.data() {
            ValueData::Object(object) => Ok(object),
            _ => Err(self.type_error(ValueType::Object)),
        }
    }

    /// Number of array elements.
    pub fn array_len(&self) -> HqResult<usize> {
        Ok(self.array()?.elements.read().len())
    }

    /// Reads an array element.
    pub fn array_element(&self, index: usize) -> HqResult<Value> {
        let elements = self.array()?.elements.read();
        elements.get(index).cloned().ok_or_else(|| out_of_range(index, elements.len()))
    }

    /// Replaces an array element.
    pub fn set_array_element(&self, index: usize, value: Value) -> HqResult<()> {
        let array = self.array()?;
        self.check_same_heap(&value)?;
        let shared = self.heap_shared();
        let _guard = shared.map(|s| s.mutator_guard());

        let old = {
            let mut elements = array.elements.write();
            let len = elements.len();
            let slot = elements.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
            if let Some(shared) = shared {
                shared.write_barrier(slot, &value);
            }
            std::mem::replace(slot, value)
        };
        drop(old);
        Ok(())
    }

    /// Class name of an object value.
    pub fn object_type_name(&self) -> HqResult<&str> {
        Ok(self.object()?.layout.class_name())
    }

    /// Class layout of an object value.
    pub fn object_layout(&self) -> HqResult<&Arc<ObjectLayout>> {
        Ok(&self.object()?.layout)
    }

    /// Member names of an object value, in declaration order.
    pub fn object_member_names(&self) -> HqResult<Vec<String>> {
        Ok(self
            .object()?
            .layout
            .member_names()
            .map(str::to_string)
            .collect())
    }

    /// Reads an object member; `NonExistent` if the class has no such member.
    pub fn object_member(&self, name: &str) -> HqResult<Value> {
        let object = self.object()?;
        let index = member_index(object, name)?;
        Ok(object.slots.read()[index].clone())
    }

    /// Replaces an object member.
    pub fn set_object_member(&self, name: &str, value: Value) -> HqResult<()> {
        let object = self.object()?;
        let index = member_index(object, name)?;
        self.check_same_heap(&value)?;
        let shared = self.heap_shared();
        let _guard = shared.map(|s| s.mutator_guard());

        let old = {
            let mut slots = object.slots.write();
            if let Some(shared) = shared {
                shared.write_barrier(&slots[index], &value);
            }
            std::mem::replace(&mut slots[index], value)
        };
        drop(old);
        Ok(())
    }

    fn check_same_heap(&self, value: &Value) -> HqResult<()> {
        match (self.heap_shared(), value.heap_shared()) {
            (Some(ours), Some(theirs)) if !Arc::ptr_eq(ours, theirs) => Err(HqError::new(
                ErrorCode::Mismatch,
                "value belongs to a different virtual machine",
            )),
            _ => Ok(()),
        }
    }

    /// Truthiness: null, false, numeric zero and the empty string are false;
    /// everything else is true.
    pub fn evaluate_as_boolean(&self) -> bool {
        match self.data() {
            ValueData::Null => false,
            ValueData::Bool(b) => *b,
            ValueData::Int8(v) => *v != 0,
            ValueData::Int16(v) => *v != 0,
            ValueData::Int32(v) => *v != 0,
            ValueData::Int64(v) => *v != 0,
            ValueData::Uint8(v) => *v != 0,
            ValueData::Uint16(v) => *v != 0,
            ValueData::Uint32(v) => *v != 0,
            ValueData::Uint64(v) => *v != 0,
            ValueData::Float32(v) => *v != 0.0,
            ValueData::Float64(v) => *v != 0.0,
            ValueData::String(s) => !s.is_empty(),
            ValueData::Function(_)
            | ValueData::Native(_)
            | ValueData::Array(_)
            | ValueData::Object(_) => true,
        }
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self.data() {
            ValueData::Null => f.write_str("null"),
            ValueData::Bool(v) => write!(f, "{}", v),
            ValueData::Int8(v) => write!(f, "{}", v),
            ValueData::Int16(v) => write!(f, "{}", v),
            ValueData::Int32(v) => write!(f, "{}", v),
            ValueData::Int64(v) => write!(f, "{}", v),
            ValueData::Uint8(v) => write!(f, "{}", v),
            ValueData::Uint16(v) => write!(f, "{}", v),
            ValueData::Uint32(v) => write!(f, "{}", v),
            ValueData::Uint64(v) => write!(f, "{}", v),
            ValueData::Float32(v) => write!(f, "{}", v),
            ValueData::Float64(v) => write!(f, "{}", v),
            ValueData::String(s) => write!(f, "{:?}", s),
            ValueData::Function(signature) => write!(f, "function<{}>", signature),
            ValueData::Native(_) => f.write_str("native"),
            ValueData::Array(array) => {
                if depth >= DISPLAY_DEPTH {
                    return f.write_str("[...]");
                }
                f.write_str("[")?;
                for (i, element) in array.elements.read().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    element.fmt_depth(f, depth + 1)?;
                }
                f.write_str("]")
            }
            ValueData::Object(object) => {
                write!(f, "{}", object.layout.class_name())?;
                if depth >= DISPLAY_DEPTH {
                    return f.write_str("{...}");
                }
                f.write_str("{")?;
                let slots = object.slots.read();
                for (i, (name, slot)) in object.layout.member_names().zip(slots.iter()).enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: ", name)?;
                    slot.fmt_depth(f, depth + 1)?;
                }
                f.write_str("}")
            }
        }
    }
}

fn out_of_range(index: usize, len: usize) -> HqError {
    HqError::new(
        ErrorCode::OutOfRange,
        format!("index {} out of range for length {}", index, len),
    )
}

fn member_index(object: &ScriptObject, name: &str) -> HqResult<usize> {
    object.layout.member_index(name).ok_or_else(|| {
        HqError::new(
            ErrorCode::NonExistent,
            format!("{} has no member {}", object.layout.class_name(), name),
        )
    })
}

impl Default for Value {
    fn default() -> Self {
        Value::null()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_depth(f, 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}: ", self.value_type())?;
        self.fmt_depth(f, DISPLAY_DEPTH - 1)?;
        f.write_str(")")
    }
}
