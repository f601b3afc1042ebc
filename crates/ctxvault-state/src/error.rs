//! Error types for ctxvault-state

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Filesystem error
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata (de)serialization error
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedded database error
    #[error("Database query failed: {0}")]
    Database(String),

    /// Path rejected before reaching storage
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Stored record could not be interpreted
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<rusqlite::Error> for StateError {
    fn from(err: rusqlite::Error) -> Self {
        StateError::Database(err.to_string())
    }
}
