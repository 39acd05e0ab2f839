//! Handlers for stored types that cannot be instantiated.

use stowage_dictionary::{TypeDefinition, TypeLineage};
use stowage_types::{Instance, ObjectId, RawRecord, TypeId};

use crate::error::{HandlerError, HandlerResult};
use crate::handler::{HandlerKind, TypeHandler};

/// Checks a record against the lineage layout it names.
fn validate_in_lineage(lineage: &TypeLineage, record: &RawRecord) -> HandlerResult<()> {
    let shape_error = |reason: String| HandlerError::RecordShape {
        object_id: record.object_id,
        type_id: lineage.type_id(),
        reason,
    };
    if record.type_id != lineage.type_id() {
        return Err(shape_error(format!("record carries type id {}", record.type_id)));
    }
    let definition = lineage
        .definitions()
        .get(record.layout as usize)
        .ok_or_else(|| shape_error(format!("unknown layout {}", record.layout)))?;
    if !definition.matches_values(&record.values) {
        return Err(shape_error(format!(
            "values do not match layout {}",
            record.layout
        )));
    }
    Ok(())
}

/// A stored type whose runtime type no longer exists.
///
/// Records still decode (for skipping or migration); instantiation fails.
#[derive(Debug)]
pub struct DeletedTypeHandler {
    lineage: TypeLineage,
    latest: TypeDefinition,
}

impl DeletedTypeHandler {
    /// Returns `None` for an empty lineage.
    pub fn new(lineage: TypeLineage) -> Option<Self> {
        let latest = lineage.latest()?.clone();
        Some(Self { lineage, latest })
    }

    pub fn lineage(&self) -> &TypeLineage {
        &self.lineage
    }

    fn error(&self) -> HandlerError {
        HandlerError::DeletedType {
            type_id: self.lineage.type_id(),
            type_name: self.latest.type_name().to_string(),
        }
    }
}

impl TypeHandler for DeletedTypeHandler {
    fn type_id(&self) -> TypeId {
        self.lineage.type_id()
    }

    fn type_name(&self) -> &str {
        self.latest.type_name()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Deleted
    }

    fn stored_definition(&self) -> &TypeDefinition {
        &self.latest
    }

    fn current_definition(&self) -> Option<&TypeDefinition> {
        None
    }

    fn current_layout(&self) -> Option<u32> {
        None
    }

    fn validate_record(&self, record: &RawRecord) -> HandlerResult<()> {
        validate_in_lineage(&self.lineage, record)
    }

    fn loadable_references(&self, _record: &RawRecord) -> Vec<ObjectId> {
        Vec::new()
    }

    fn create(&self, _record: &RawRecord) -> HandlerResult<Instance> {
        Err(self.error())
    }

    fn populate(&self, _instance: &Instance, _record: &RawRecord) -> HandlerResult<()> {
        Err(self.error())
    }

    fn decompose(&self, _object_id: ObjectId, _instance: &Instance) -> HandlerResult<RawRecord> {
        Err(self.error())
    }
}

/// A stored type no live root can reach; legacy mapping is never computed.
#[derive(Debug)]
pub struct UnreachableTypeHandler {
    lineage: TypeLineage,
    latest: TypeDefinition,
}

impl UnreachableTypeHandler {
    /// Returns `None` for an empty lineage.
    pub fn new(lineage: TypeLineage) -> Option<Self> {
        let latest = lineage.latest()?.clone();
        Some(Self { lineage, latest })
    }

    fn error(&self) -> HandlerError {
        HandlerError::UnreachableType {
            type_id: self.lineage.type_id(),
            type_name: self.latest.type_name().to_string(),
        }
    }
}

impl TypeHandler for UnreachableTypeHandler {
    fn type_id(&self) -> TypeId {
        self.lineage.type_id()
    }

    fn type_name(&self) -> &str {
        self.latest.type_name()
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Unreachable
    }

    fn stored_definition(&self) -> &TypeDefinition {
        &self.latest
    }

    fn current_definition(&self) -> Option<&TypeDefinition> {
        None
    }

    fn current_layout(&self) -> Option<u32> {
        None
    }

    fn validate_record(&self, record: &RawRecord) -> HandlerResult<()> {
        validate_in_lineage(&self.lineage, record)
    }

    fn loadable_references(&self, _record: &RawRecord) -> Vec<ObjectId> {
        Vec::new()
    }

    fn create(&self, _record: &RawRecord) -> HandlerResult<Instance> {
        Err(self.error())
    }

    fn populate(&self, _instance: &Instance, _record: &RawRecord) -> HandlerResult<()> {
        Err(self.error())
    }

    fn decompose(&self, _object_id: ObjectId, _instance: &Instance) -> HandlerResult<RawRecord> {
        Err(self.error())
    }
}
