//! Error types for models, collections, and sync.

use std::fmt;

use nimbus_core::{CellError, WireError};
use serde_json::Value as Json;
use thiserror::Error;

use crate::transport::TransportError;

/// A model or collection operation that was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error(transparent)]
    Cell(#[from] CellError),
    #[error("field `{field}`: {source}")]
    Wire {
        field: String,
        #[source]
        source: WireError,
    },
    #[error("model of schema `{found}` given to a `{expected}` collection")]
    SchemaMismatch { expected: String, found: String },
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("model has no `{0}` attribute")]
    MissingId(String),
    #[error("duplicate id `{0}`")]
    DuplicateId(String),
    #[error("invalid schema `{schema}`: {reason}")]
    InvalidSchema { schema: String, reason: String },
}

/// Coarse classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    Server,
    Unavailable,
    Other,
}

impl DomainErrorKind {
    /// Classify an HTTP status.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::RateLimited,
            502..=504 => Self::Unavailable,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::RateLimited => "rate limited",
            Self::Server => "server error",
            Self::Unavailable => "unavailable",
            Self::Other => "error",
        }
    }
}

impl fmt::Display for DomainErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend-reported failure, mapped by the store's error mapper.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} ({status}): {message}")]
pub struct DomainError {
    pub kind: DomainErrorKind,
    pub status: u16,
    /// The raw response body.
    pub payload: Json,
    pub message: String,
}

/// Why a fetch or save did not succeed.
///
/// Carried inside [`SyncOutcome::Failed`](crate::SyncOutcome::Failed); never
/// returned as an `Err` from `fetch`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no store attached")]
    NoStore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(DomainErrorKind::from_status(404), DomainErrorKind::NotFound);
        assert_eq!(DomainErrorKind::from_status(503), DomainErrorKind::Unavailable);
        assert_eq!(DomainErrorKind::from_status(500), DomainErrorKind::Server);
        assert_eq!(DomainErrorKind::from_status(418), DomainErrorKind::Other);
    }

    #[test]
    fn wire_error_names_field() {
        let err = ModelError::Wire {
            field: "cpu".into(),
            source: WireError::TypeMismatch {
                expected: "number".into(),
                found: "string",
            },
        };
        assert_eq!(err.to_string(), "field `cpu`: expected number, found string");
    }
}
