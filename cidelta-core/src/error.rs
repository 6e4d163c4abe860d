//! Error types shared by every cidelta component.
//!
//! Validation failures name the offending field so the top level can report
//! exactly which part of a payload or configuration was rejected.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the reference tracking and diffing engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// External input was malformed (missing field, bad commit id, unknown
    /// result string, empty identifier).
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Persisted state is corrupted.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A lookup the current command cannot proceed without came back empty.
    #[error("not found: {0}")]
    NotFound(String),

    /// An identical request is already pending.
    #[error("duplicate request: {0}")]
    Duplicate(String),

    /// Build server or version control collaborator failure.
    #[error("{0}")]
    Client(String),

    /// Configuration file could not be read or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Workspace document could not be read or written.
    #[error("workspace I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error is bad input rather than an environment failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
