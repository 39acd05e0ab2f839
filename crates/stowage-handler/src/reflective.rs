//! Direct handler: stored layout and runtime layout agree.

use std::sync::Arc;

use stowage_dictionary::TypeDefinition;
use stowage_types::{Instance, ObjectId, RawRecord, TypeId, Value};

use crate::error::{HandlerError, HandlerResult};
use crate::evaluator::FieldEvaluator;
use crate::handler::{HandlerKind, TypeHandler};
use crate::runtime::RuntimeType;

/// Maps each persisted member straight onto its runtime field.
#[derive(Debug)]
pub struct ReflectiveTypeHandler {
    runtime: Arc<RuntimeType>,
    definition: TypeDefinition,
    layout: u32,
    /// Runtime field index of each member.
    slots: Vec<usize>,
    eager: Vec<bool>,
}

impl ReflectiveTypeHandler {
    /// Build the handler writing `runtime`'s persisted fields as `layout`.
    pub fn new(
        runtime: Arc<RuntimeType>,
        type_id: TypeId,
        layout: u32,
        fields: &dyn FieldEvaluator,
    ) -> HandlerResult<Self> {
        let definition = runtime.definition(type_id, fields)?;
        let slots = runtime.persisted_fields(fields);
        let eager = slots
            .iter()
            .map(|&slot| fields.is_eager(&runtime, &runtime.fields()[slot]))
            .collect();
        Ok(Self {
            runtime,
            definition,
            layout,
            slots,
            eager,
        })
    }

    pub fn runtime(&self) -> &Arc<RuntimeType> {
        &self.runtime
    }

    pub fn definition(&self) -> &TypeDefinition {
        &self.definition
    }

    pub fn layout(&self) -> u32 {
        self.layout
    }

    pub(crate) fn shape_error(&self, record: &RawRecord, reason: impl Into<String>) -> HandlerError {
        HandlerError::RecordShape {
            object_id: record.object_id,
            type_id: self.definition.type_id(),
            reason: reason.into(),
        }
    }

    fn check_instance(&self, instance: &Instance) -> HandlerResult<()> {
        if instance.type_name() != self.runtime.name()
            || instance.len() != self.runtime.fields().len()
        {
            return Err(HandlerError::TypeMismatch {
                expected: self.runtime.name().to_string(),
                actual: instance.type_name().to_string(),
            });
        }
        Ok(())
    }

    /// Write current-layout member values into `instance`, all or nothing.
    pub(crate) fn apply(&self, instance: &Instance, members: Vec<Value>) -> HandlerResult<()> {
        self.check_instance(instance)?;
        let mut values = instance.values();
        for (slot, value) in self.slots.iter().zip(members) {
            values[*slot] = value;
        }
        instance.replace_values(values)?;
        Ok(())
    }
}

impl TypeHandler for ReflectiveTypeHandler {
    fn type_id(&self) -> TypeId {
        self.definition.type_id()
    }

    fn type_name(&self) -> &str {
        self.runtime.name()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Reflective
    }

    fn stored_definition(&self) -> &TypeDefinition {
        &self.definition
    }

    fn current_definition(&self) -> Option<&TypeDefinition> {
        Some(&self.definition)
    }

    fn current_layout(&self) -> Option<u32> {
        Some(self.layout)
    }

    fn validate_record(&self, record: &RawRecord) -> HandlerResult<()> {
        if record.type_id != self.type_id() {
            return Err(self.shape_error(record, format!("record carries type id {}", record.type_id)));
        }
        if record.layout != self.layout {
            return Err(self.shape_error(record, format!("unknown layout {}", record.layout)));
        }
        if !self.definition.matches_values(&record.values) {
            return Err(self.shape_error(record, "values do not match the member list"));
        }
        Ok(())
    }

    fn create(&self, _record: &RawRecord) -> HandlerResult<Instance> {
        Ok(self.runtime.instantiate())
    }

    fn populate(&self, instance: &Instance, record: &RawRecord) -> HandlerResult<()> {
        self.validate_record(record)?;
        self.apply(instance, record.values.clone())
    }

    fn decompose(&self, object_id: ObjectId, instance: &Instance) -> HandlerResult<RawRecord> {
        self.check_instance(instance)?;
        let values = self
            .slots
            .iter()
            .map(|&slot| instance.get(slot))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| HandlerError::TypeMismatch {
                expected: self.runtime.name().to_string(),
                actual: instance.type_name().to_string(),
            })?;
        Ok(RawRecord::new(object_id, self.type_id(), values).with_layout(self.layout))
    }

    fn is_eager(&self, member_index: usize) -> bool {
        self.eager.get(member_index).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::FieldFilter;
    use stowage_types::ValueKind;

    fn handler(filter: FieldFilter) -> ReflectiveTypeHandler {
        let runtime = RuntimeType::new("Node")
            .with_value("id", ValueKind::I64)
            .with_value("cache", ValueKind::Bytes)
            .with_reference("next", "Node");
        ReflectiveTypeHandler::new(Arc::new(runtime), TypeId::new(1000), 0, &filter).unwrap()
    }

    fn record(values: Vec<Value>) -> RawRecord {
        RawRecord::new(ObjectId::new(1), TypeId::new(1000), values)
    }

    #[test]
    fn populate_and_decompose_skip_transient_fields() {
        let h = handler(FieldFilter::default().with_transient("Node#cache"));
        let rec = record(vec![Value::I64(7), Value::Reference(ObjectId::new(2))]);
        h.validate_record(&rec).unwrap();

        let instance = h.create(&rec).unwrap();
        instance.set(1, Value::Bytes(vec![1, 2])).unwrap();
        h.populate(&instance, &rec).unwrap();
        assert_eq!(instance.get(0), Some(Value::I64(7)));
        assert_eq!(instance.get(1), Some(Value::Bytes(vec![1, 2])));
        assert_eq!(instance.get(2), Some(Value::Reference(ObjectId::new(2))));

        let out = h.decompose(ObjectId::new(1), &instance).unwrap();
        assert_eq!(out, rec);
    }

    #[test]
    fn malformed_records_are_rejected() {
        let h = handler(FieldFilter::default().with_transient("Node#cache"));
        let short = record(vec![Value::I64(7)]);
        assert!(matches!(h.validate_record(&short), Err(HandlerError::RecordShape { .. })));

        let wrong_layout = record(vec![Value::I64(7), Value::Reference(ObjectId::NULL)]).with_layout(3);
        assert!(h.validate_record(&wrong_layout).is_err());

        let instance = h.create(&short).unwrap();
        assert!(h.populate(&instance, &short).is_err());
        assert_eq!(instance.get(0), Some(Value::I64(0)));
    }

    #[test]
    fn decompose_rejects_foreign_instances() {
        let h = handler(FieldFilter::default());
        let other = Instance::new("Other", vec![]);
        assert!(matches!(
            h.decompose(ObjectId::new(1), &other),
            Err(HandlerError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn eager_flags_follow_members() {
        let h = handler(FieldFilter::default().with_eager("Node#next"));
        assert!(!h.is_eager(0));
        assert!(h.is_eager(2));
        assert!(!h.is_eager(9));
        assert_eq!(h.kind(), HandlerKind::Reflective);
        assert_eq!(h.current_layout(), Some(0));
    }
}
