use stowage_types::ObjectId;

/// Errors from identity registry operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An object id or an instance is already bound to a different
    /// counterpart.
    #[error("identity conflict for object {object_id}: {reason}")]
    IdentityConflict { object_id: ObjectId, reason: String },

    /// The null object id cannot be bound to an instance.
    #[error("cannot register an instance under the null object id")]
    NullObjectId,
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
