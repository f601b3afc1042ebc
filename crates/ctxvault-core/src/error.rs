//! Error taxonomy for the namespace, repositories and context pipeline.
//!
//! Absence is not an error: reads return `Option`, and no-op updates,
//! promotions and deletions return `Ok(false)`.

use ctxvault_state::StateError;

/// ctxvault core errors.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// No mount matches the path. Always propagated by the namespace.
    #[error("no mount found for path: {path}")]
    MountNotFound { path: String },

    #[error("invalid memory category: {0}")]
    InvalidCategory(String),

    #[error("invalid update mode: {0}")]
    InvalidMode(String),

    /// A project, key or id that cannot be used as a single path segment.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("storage error: {0}")]
    State(#[from] StateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl ContextError {
    /// True for the NotFound-mount condition (a 404 for front ends).
    pub fn is_mount_not_found(&self) -> bool {
        matches!(self, Self::MountNotFound { .. })
    }
}

/// Result type for ctxvault core operations.
pub type ContextResult<T> = std::result::Result<T, ContextError>;
