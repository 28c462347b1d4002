//! Error types for the herald-store crate.

use std::io;

use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// No row with this key.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// A row with this key or unique name already exists.
    #[error("{kind} already exists: {key}")]
    AlreadyExists { kind: &'static str, key: String },

    /// Store configuration or path validation failed.
    #[error("Store validation error: {0}")]
    Validation(String),

    /// The backing store cannot be reached right now.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Internal error (lock poisoning, capacity, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub(crate) fn job_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "job",
            key: id.to_string(),
        }
    }

    pub(crate) fn template_not_found(key: impl ToString) -> Self {
        Self::NotFound {
            kind: "template",
            key: key.to_string(),
        }
    }

    pub(crate) fn tracking_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "tracking record",
            key: id.to_string(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the operation may succeed if retried once the store recovers
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_))
    }
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
