//! Errors raised by cells and the wire codec.

use thiserror::Error;

/// A rejected cell write.
///
/// Cell errors are programmer errors (a schema or caller bug). They are
/// returned to the immediate caller of `write`/`set` and never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    /// The value failed the cell's type guard.
    #[error("type violation on `{cell}`: expected {expected}, found {found}")]
    TypeViolation {
        cell: String,
        expected: String,
        found: String,
    },
    /// `null` written to a cell that does not accept it.
    #[error("null written to non-nullable cell `{cell}`")]
    NullViolation { cell: String },
}

impl CellError {
    /// Name of the cell that rejected the write.
    #[must_use]
    pub fn cell(&self) -> &str {
        match self {
            Self::TypeViolation { cell, .. } | Self::NullViolation { cell } => cell,
        }
    }
}

/// A wire value that cannot be decoded into the declared field type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: &'static str },
    #[error("invalid date `{raw}`: {reason}")]
    InvalidDate { raw: String, reason: String },
    #[error("invalid file payload: {0}")]
    InvalidFile(String),
}
