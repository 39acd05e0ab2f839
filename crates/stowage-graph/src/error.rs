use stowage_handler::HandlerError;
use stowage_registry::RegistryError;
use stowage_types::{ObjectId, TypeId};

/// Failure reported by a [`Source`](crate::Source) or [`Target`](crate::Target).
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Result alias for storage transfers.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors from loading or storing a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// Decoding or encoding one record failed.
    #[error("object {object_id} of type {type_id}: {source}")]
    Record {
        object_id: ObjectId,
        type_id: TypeId,
        #[source]
        source: HandlerError,
    },

    /// A referenced object could not be obtained.
    #[error("unresolved reference to {object_id} (referenced by {referenced_by:?})")]
    UnresolvedReference {
        object_id: ObjectId,
        referenced_by: Option<ObjectId>,
    },

    /// A requested root was registered as skipped on this builder and has
    /// no instance.
    #[error("object {object_id} is skipped by this loader")]
    SkippedObject { object_id: ObjectId },

    /// An object another load was building did not become available.
    #[error("object {object_id} loaded concurrently: {reason}")]
    ConcurrentLoad { object_id: ObjectId, reason: String },

    #[error(transparent)]
    Identity(#[from] RegistryError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Result alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
