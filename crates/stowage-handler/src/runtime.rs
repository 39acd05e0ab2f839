//! Runtime type metadata: the ordered fields a type has in this process.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use stowage_dictionary::{DictionaryResult, Member, TypeDefinition};
use stowage_types::{Instance, TypeError, TypeId, Value, ValueKind};

use crate::evaluator::FieldEvaluator;

/// One field of a runtime type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    declared_type: String,
    reference: bool,
    kind: ValueKind,
}

impl FieldDescriptor {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        reference: bool,
    ) -> Result<Self, TypeError> {
        let declared_type = declared_type.into();
        let kind = ValueKind::from_declared_type(&declared_type, reference)?;
        Ok(Self {
            name: name.into(),
            declared_type,
            reference,
            kind,
        })
    }

    pub fn value(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            declared_type: kind.declared_name().to_string(),
            reference: kind.is_reference(),
            kind,
        }
    }

    pub fn reference(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: target_type.into(),
            reference: true,
            kind: ValueKind::Reference,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    fn to_member(&self) -> Member {
        if self.reference {
            Member::reference(self.name.clone(), self.declared_type.clone())
        } else {
            Member::value(self.name.clone(), self.kind)
        }
    }
}

/// Ordered field list of one type as the application defines it.
///
/// ```
/// use stowage_handler::RuntimeType;
/// use stowage_types::ValueKind;
///
/// let node = RuntimeType::new("Node")
///     .with_value("id", ValueKind::I64)
///     .with_reference("next", "Node");
/// assert_eq!(node.field_index("next"), Some(1));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeType {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl RuntimeType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_value(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.with_field(FieldDescriptor::value(name, kind))
    }

    pub fn with_reference(self, name: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.with_field(FieldDescriptor::reference(name, target_type))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn default_values(&self) -> Vec<Value> {
        self.fields.iter().map(|f| f.kind.default_value()).collect()
    }

    /// A fresh instance with every field at its default.
    pub fn instantiate(&self) -> Instance {
        Instance::new(self.name.clone(), self.default_values())
    }

    /// Indexes of the fields `evaluator` persists, in declaration order.
    pub fn persisted_fields(&self, evaluator: &dyn FieldEvaluator) -> Vec<usize> {
        (0..self.fields.len())
            .filter(|&i| evaluator.is_persistable(self, &self.fields[i]))
            .collect()
    }

    /// The persisted shape of this type under `type_id`.
    pub fn definition(
        &self,
        type_id: TypeId,
        evaluator: &dyn FieldEvaluator,
    ) -> DictionaryResult<TypeDefinition> {
        let members = self
            .persisted_fields(evaluator)
            .into_iter()
            .map(|i| self.fields[i].to_member())
            .collect();
        TypeDefinition::new(self.name.clone(), type_id, members)
    }
}

/// Every runtime type known to the process, by name.
#[derive(Debug, Default)]
pub struct RuntimeTypeCatalog {
    types: RwLock<BTreeMap<String, Arc<RuntimeType>>>,
}

impl RuntimeTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a runtime type.
    pub fn register(&self, runtime: RuntimeType) -> Arc<RuntimeType> {
        let runtime = Arc::new(runtime);
        self.types
            .write()
            .insert(runtime.name.clone(), Arc::clone(&runtime));
        runtime
    }

    pub fn get(&self, name: &str) -> Option<Arc<RuntimeType>> {
        self.types.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.types.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl FromIterator<RuntimeType> for RuntimeTypeCatalog {
    fn from_iter<I: IntoIterator<Item = RuntimeType>>(iter: I) -> Self {
        let catalog = Self::new();
        for runtime in iter {
            catalog.register(runtime);
        }
        catalog
    }
}
