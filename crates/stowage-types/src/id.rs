use std::fmt;

use serde::{Deserialize, Serialize};

/// Persistent identity of one object instance.
///
/// Object ids are assigned monotonically by an id provider and identify a
/// persisted object for its entire lifetime. They are never reused within a
/// persistence domain. The value `0` is reserved as the null reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The null object id. Represents "no object".
    pub const NULL: Self = Self(0);

    /// Wrap a raw id value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the null object id.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Persistent identity of a fully-qualified type name.
///
/// A type id is stable across all schema versions of the same type name, so
/// it identifies a lineage of shapes rather than a single shape.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(u64);

impl TypeId {
    /// The null type id. Never assigned to a real type.
    pub const NULL: Self = Self(0);

    /// Wrap a raw id value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw id value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the null type id.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TypeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
