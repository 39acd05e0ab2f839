use stowage_types::TypeId;

/// Errors from type dictionary operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DictionaryError {
    /// A definition conflicts with existing type history or id assignment.
    #[error("type inconsistency for {type_name} ({type_id}): {reason}")]
    TypeInconsistency {
        type_id: TypeId,
        type_name: String,
        reason: String,
    },

    /// A definition or member is malformed.
    #[error("invalid definition of {type_name}: {reason}")]
    InvalidDefinition { type_name: String, reason: String },

    /// Snapshot serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for dictionary operations.
pub type DictionaryResult<T> = Result<T, DictionaryError>;
