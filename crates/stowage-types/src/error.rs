use thiserror::Error;

use crate::value::ValueKind;

/// Errors produced by value and instance operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown declared type: {0}")]
    UnknownDeclaredType(String),

    #[error("field index {index} out of bounds for {type_name} with {len} fields")]
    IndexOutOfBounds {
        type_name: String,
        index: usize,
        len: usize,
    },

    #[error("value kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: ValueKind,
        actual: ValueKind,
    },
}
