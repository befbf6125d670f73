//! Error types for docsink
//!
//! Two layers of errors live here:
//!
//! - [`StorageError`]: what a [`DocumentStore`](crate::traits::DocumentStore)
//!   reports. Conflicts are a dedicated variant so callers never have to
//!   inspect message text to recognise a concurrent checkpoint write.
//! - [`Error`]: what the ingestion components report to their callers.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Result type alias for docsink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for storage collaborator operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Error types for the ingestion components
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before any side effect (empty batch, missing fields,
    /// negative counts, duplicate batch id)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A checkpoint record failed its schema or invariant checks
    #[error("Corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),

    /// Storage rejected a checkpoint write because another writer got there first
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A commit referenced a batch that is not pending
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    /// The storage liveness check failed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Any other storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error (local checkpoint snapshot)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a corrupt checkpoint error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::CorruptCheckpoint(msg.into())
    }

    /// Returns true if the error was raised before anything was mutated
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

/// Errors reported by a storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The store cannot be reached
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A document identifier already exists (or repeats within the batch)
    #[error("duplicate document id: {0}")]
    DuplicateDocument(String),

    /// A checkpoint write raced with another writer
    #[error("concurrent checkpoint write: {0}")]
    Conflict(String),

    /// Engine-specific failure
    #[error("{0}")]
    Backend(String),
}

impl StorageError {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        StorageError::Backend(msg.into())
    }

    /// Returns true for the structured concurrent-write signal
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}
