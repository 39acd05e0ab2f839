use stowage_types::TypeId;

/// Errors from member mapping.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// Strict mode found equally good alternative pairings.
    #[error("ambiguous mapping for {type_name}#{member} ({type_id}): candidates {candidates:?}")]
    AmbiguousMemberMapping {
        type_id: TypeId,
        type_name: String,
        member: String,
        candidates: Vec<String>,
    },

    /// A refactoring mapping document could not be parsed.
    #[error("invalid refactoring mapping: {0}")]
    InvalidRefactoring(String),

    /// A refactoring mapping file could not be read.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;
