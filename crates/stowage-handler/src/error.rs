use stowage_dictionary::DictionaryError;
use stowage_mapping::MappingError;
use stowage_types::{ObjectId, TypeError, TypeId, ValueKind};

/// Errors from handler resolution and record coding.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum HandlerError {
    /// The runtime type failed the persistability predicate.
    #[error("type not persistable: {type_name}")]
    TypeNotPersistable { type_name: String },

    /// The stored type no longer exists at runtime.
    #[error("type {type_name} ({type_id}) was deleted")]
    DeletedType { type_id: TypeId, type_name: String },

    /// The type was classified as unreachable from every root.
    #[error("type {type_name} ({type_id}) is unreachable")]
    UnreachableType { type_id: TypeId, type_name: String },

    /// No lineage exists for a type id.
    #[error("unknown type id: {0}")]
    UnknownTypeId(TypeId),

    /// No runtime type is registered under a name.
    #[error("unknown runtime type: {0}")]
    UnknownRuntimeType(String),

    /// A record does not fit the layout it claims.
    #[error("malformed record {object_id} of type {type_id}: {reason}")]
    RecordShape {
        object_id: ObjectId,
        type_id: TypeId,
        reason: String,
    },

    /// An instance was handed to the handler of another type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// A member binding cannot convert stored values.
    #[error("incompatible mapping of {type_name}#{member} ({type_id}): {from} to {to}")]
    IncompatibleMapping {
        type_id: TypeId,
        type_name: String,
        member: String,
        from: ValueKind,
        to: ValueKind,
    },

    /// A handler is already installed for the type id.
    #[error("duplicate handler for type id {0}")]
    DuplicateHandler(TypeId),

    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for handler operations.
pub type HandlerResult<T> = Result<T, HandlerError>;
