//! Container payloads: arrays and class-typed objects
//!
//! Objects share an [`ObjectLayout`] per class: the class name and the
//! ordered member names. Member values live in a slot vector indexed by the
//! layout offsets.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::value::Value;

/// Shape shared by every object of one class.
///
/// # Example
///
/// ```
/// use memory_manager::ObjectLayout;
///
/// let layout = ObjectLayout::new("Game.Point", ["x", "y"]);
/// assert_eq!(layout.class_name(), "Game.Point");
/// assert_eq!(layout.member_index("y"), Some(1));
/// assert_eq!(layout.member_index("z"), None);
/// ```
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ObjectLayout {
    class_name: Arc<str>,
    members: Vec<Arc<str>>,
}

impl ObjectLayout {
    /// Creates a shared layout.
    pub fn new<I, S>(class_name: &str, members: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Arc::new(ObjectLayout {
            class_name: Arc::from(class_name),
            members: members.into_iter().map(|m| Arc::from(m.as_ref())).collect(),
        })
    }

    /// Fully qualified class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Member names in slot order.
    pub fn member_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.members.iter().map(|m| &**m)
    }

    /// Slot offset of a member.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| &**m == name)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the class declares no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Element storage of an array value
pub struct ArrayData {
    pub(crate) elements: RwLock<Vec<Value>>,
}

impl ArrayData {
    pub(crate) fn new(elements: Vec<Value>) -> Self {
        ArrayData {
            elements: RwLock::new(elements),
        }
    }
}

/// Member storage of an object value
pub struct ScriptObject {
    pub(crate) layout: Arc<ObjectLayout>,
    pub(crate) slots: RwLock<Vec<Value>>,
}

impl ScriptObject {
    pub(crate) fn new(layout: Arc<ObjectLayout>) -> Self {
        let slots = (0..layout.len()).map(|_| Value::null()).collect();
        ScriptObject {
            layout,
            slots: RwLock::new(slots),
        }
    }

    /// The object's class layout.
    pub fn layout(&self) -> &Arc<ObjectLayout> {
        &self.layout
    }
}

/// Replaces every slot with null, returning what was there.
pub(crate) fn clear_slots(slots: &RwLock<Vec<Value>>) -> Vec<Value> {
    let mut guard = slots.write();
    guard
        .iter_mut()
        .map(|slot| std::mem::replace(slot, Value::null()))
        .collect()
}
