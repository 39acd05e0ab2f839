use std::fmt;

use stowage_dictionary::TypeDefinition;
use stowage_types::{Instance, ObjectId, RawRecord, TypeId};

use crate::error::HandlerResult;

/// Which creation path produced a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Reflective,
    Legacy,
    Deleted,
    Unreachable,
    Custom,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reflective => "reflective",
            Self::Legacy => "legacy",
            Self::Deleted => "deleted",
            Self::Unreachable => "unreachable",
            Self::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Codec between one persisted type id and one runtime type.
///
/// Loading calls, per record: [`validate_record`](Self::validate_record),
/// [`create`](Self::create) during instantiation and
/// [`populate`](Self::populate) once every referenced object is registered.
/// Storing calls [`decompose`](Self::decompose).
///
/// Implementations are immutable after construction and must be safe to
/// share across threads.
pub trait TypeHandler: Send + Sync + fmt::Debug {
    fn type_id(&self) -> TypeId;

    /// Current runtime type name (or the stored name for dead types).
    fn type_name(&self) -> &str;

    fn kind(&self) -> HandlerKind;

    /// The newest stored shape this handler decodes.
    fn stored_definition(&self) -> &TypeDefinition;

    /// The shape this handler writes, `None` when it cannot instantiate.
    fn current_definition(&self) -> Option<&TypeDefinition>;

    /// Lineage position written by [`decompose`](Self::decompose).
    fn current_layout(&self) -> Option<u32>;

    /// Check that `record` fits a layout this handler decodes.
    fn validate_record(&self, record: &RawRecord) -> HandlerResult<()>;

    /// Object ids that must be materialized before `record` is populated.
    fn loadable_references(&self, record: &RawRecord) -> Vec<ObjectId> {
        record.references().collect()
    }

    /// A bare instance with default field values.
    fn create(&self, record: &RawRecord) -> HandlerResult<Instance>;

    /// Copy the record's member values into `instance`.
    fn populate(&self, instance: &Instance, record: &RawRecord) -> HandlerResult<()>;

    /// Current-layout record of `instance` under `object_id`.
    fn decompose(&self, object_id: ObjectId, instance: &Instance) -> HandlerResult<RawRecord>;

    /// Whether the current-layout member at `member_index` is stored eagerly.
    fn is_eager(&self, _member_index: usize) -> bool {
        false
    }
}
