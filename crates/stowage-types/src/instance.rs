//! Live object handles.
//!
//! An [`Instance`] is a shared handle to one entity: a type name plus its
//! field values in runtime field order. Two handles denote the same object
//! iff they point to the same allocation; [`InstanceKey`] captures that
//! identity as a hashable value.
//!
//! References between entities are stored as [`ObjectId`](crate::ObjectId)
//! values, so a cyclic graph never forms a cycle of `Arc`s. The identity
//! registry is the arena that maps those ids back to handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TypeError;
use crate::id::ObjectId;
use crate::value::Value;

/// Identity of a live instance, derived from its allocation address.
///
/// Only meaningful while some handle to the instance is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey(usize);

struct Entity {
    type_name: String,
    values: RwLock<Vec<Value>>,
}

/// Shared handle to a live entity.
#[derive(Clone)]
pub struct Instance(Arc<Entity>);

impl Instance {
    /// Create a new entity of `type_name` with the given field values.
    pub fn new(type_name: impl Into<String>, values: Vec<Value>) -> Self {
        Self(Arc::new(Entity {
            type_name: type_name.into(),
            values: RwLock::new(values),
        }))
    }

    pub fn type_name(&self) -> &str {
        &self.0.type_name
    }

    /// Identity of this instance.
    pub fn key(&self) -> InstanceKey {
        InstanceKey(Arc::as_ptr(&self.0) as usize)
    }

    /// Returns `true` if both handles denote the same entity.
    pub fn same(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of one field value.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.values.read().get(index).cloned()
    }

    /// Snapshot of all field values.
    pub fn values(&self) -> Vec<Value> {
        self.0.values.read().clone()
    }

    /// Overwrite one field. The new value must have the field's kind.
    pub fn set(&self, index: usize, value: Value) -> Result<(), TypeError> {
        let mut values = self.0.values.write();
        let len = values.len();
        let slot = values
            .get_mut(index)
            .ok_or_else(|| TypeError::IndexOutOfBounds {
                type_name: self.0.type_name.clone(),
                index,
                len,
            })?;
        if slot.kind() != value.kind() {
            return Err(TypeError::KindMismatch {
                expected: slot.kind(),
                actual: value.kind(),
            });
        }
        *slot = value;
        Ok(())
    }

    /// Overwrite all fields at once, under a single write lock.
    ///
    /// Either every field is replaced or none is.
    pub fn replace_values(&self, replacement: Vec<Value>) -> Result<(), TypeError> {
        let mut values = self.0.values.write();
        if replacement.len() != values.len() {
            return Err(TypeError::IndexOutOfBounds {
                type_name: self.0.type_name.clone(),
                index: replacement.len(),
                len: values.len(),
            });
        }
        for (current, new) in values.iter().zip(&replacement) {
            if current.kind() != new.kind() {
                return Err(TypeError::KindMismatch {
                    expected: current.kind(),
                    actual: new.kind(),
                });
            }
        }
        *values = replacement;
        Ok(())
    }

    /// Non-null object ids held in reference fields, in field order.
    pub fn references(&self) -> Vec<ObjectId> {
        self.0
            .values
            .read()
            .iter()
            .filter_map(Value::as_reference)
            .collect()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.0.type_name)
            .field("key", &self.key())
            .finish()
    }
}
