//! ctxvault-state: Node Model and Storage Backends for ctxvault
//!
//! This crate is the persistence layer of the context vault. It defines the
//! path-addressed [`Node`] record and the [`StorageBackend`] capability set,
//! with three interchangeable implementations.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: lossless node serialization, atomic writes, revision history.
//!
//! ## Key Components
//!
//! - `Node` / `NodeMetadata`: the serializable unit of data
//! - `FsBackend`: file tree with sidecar metadata and on-disk revisions
//! - `SqliteBackend`: single-table embedded database, linear-scan search
//! - `MemoryBackend`: in-process map (tests, ephemeral mounts)

mod error;
pub mod fakes;
pub mod fs;
pub mod node;
pub mod primitives;
pub mod sqlite;
pub mod storage_traits;

pub use error::StateError;
pub use fakes::MemoryBackend;
pub use fs::FsBackend;
pub use node::{Node, NodeKind, NodeMetadata};
pub use primitives::{estimate_tokens, short_hash};
pub use sqlite::SqliteBackend;
pub use storage_traits::{validate_key, SearchFilter, StorageBackend};

/// Result type for ctxvault-state operations
pub type StateResult<T> = std::result::Result<T, StateError>;
