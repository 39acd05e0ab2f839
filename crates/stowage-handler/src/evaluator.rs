//! Persistability and eagerness predicates.

use std::collections::BTreeSet;

use crate::runtime::{FieldDescriptor, RuntimeType};

/// Decides whether a runtime type may be persisted at all.
pub trait TypeEvaluator: Send + Sync {
    fn is_persistable(&self, runtime: &RuntimeType) -> bool;
}

/// Decides per field whether it is persisted and whether it is stored eagerly.
pub trait FieldEvaluator: Send + Sync {
    fn is_persistable(&self, runtime: &RuntimeType, field: &FieldDescriptor) -> bool;

    /// Eager reference fields are re-stored even when their target was
    /// already persisted in the session.
    fn is_eager(&self, runtime: &RuntimeType, field: &FieldDescriptor) -> bool;
}

/// Rejects the type names in its exclusion set.
#[derive(Clone, Debug, Default)]
pub struct TypeFilter {
    excluded: BTreeSet<String>,
}

impl TypeFilter {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }
}

impl TypeEvaluator for TypeFilter {
    fn is_persistable(&self, runtime: &RuntimeType) -> bool {
        !self.excluded.contains(runtime.name())
    }
}

/// Transient and eager fields listed as `Type#field`.
#[derive(Clone, Debug, Default)]
pub struct FieldFilter {
    transient: BTreeSet<String>,
    eager: BTreeSet<String>,
}

impl FieldFilter {
    pub fn new<I, J, S, T>(transient: I, eager: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            transient: transient.into_iter().map(Into::into).collect(),
            eager: eager.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_transient(mut self, field: impl Into<String>) -> Self {
        self.transient.insert(field.into());
        self
    }

    pub fn with_eager(mut self, field: impl Into<String>) -> Self {
        self.eager.insert(field.into());
        self
    }
}

impl FieldEvaluator for FieldFilter {
    fn is_persistable(&self, runtime: &RuntimeType, field: &FieldDescriptor) -> bool {
        !self.transient.contains(&qualified(runtime, field))
    }

    fn is_eager(&self, runtime: &RuntimeType, field: &FieldDescriptor) -> bool {
        field.is_reference() && self.eager.contains(&qualified(runtime, field))
    }
}

fn qualified(runtime: &RuntimeType, field: &FieldDescriptor) -> String {
    format!("{}#{}", runtime.name(), field.name())
}
