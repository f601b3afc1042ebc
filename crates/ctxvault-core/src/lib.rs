//! ctxvault Core Library
//!
//! Routes hierarchical paths to storage backends, layers typed repositories
//! (memory, history, scratchpad) over the namespace, and assembles
//! token-budgeted context manifests from them.
//!
//! ```ignore
//! let config = VaultConfig::load(&VaultConfig::default_path())?.apply_env()?;
//! let vault = Vault::open(&config)?;
//! vault.memory().store("proj", MemoryCategory::Fact, "db", "PostgreSQL")?;
//! let manifest = vault.constructor().construct("proj", 8000, ScoringStrategy::Recency)?;
//! ```

pub mod bundle;
pub mod config;
pub mod error;
pub mod metrics;
pub mod namespace;
pub mod obs;
pub mod pipeline;
pub mod repository;
pub mod telemetry;
pub mod vault;

pub use bundle::{export_bundle, import_bundle, Bundle, BUNDLE_FORMAT_VERSION};
pub use config::{BackendKind, VaultConfig};
pub use error::{ContextError, ContextResult};
pub use metrics::{MetricsSnapshot, METRICS};
pub use namespace::{normalize_path, Namespace};
pub use obs::VaultSpan;
pub use pipeline::{
    fit_budget, ContextConstructor, ContextUpdater, Manifest, ScoringStrategy, UpdateMode,
    DEFAULT_STALENESS_THRESHOLD, DEFAULT_TOKEN_BUDGET,
};
pub use repository::{
    HistoryRepository, MemoryCategory, MemoryRepository, NoteOptions, ScratchpadRepository,
    ToolUsage, Transcript, TranscriptEntry,
};
pub use telemetry::init_tracing;
pub use vault::{MaintenanceReport, Vault};

pub use ctxvault_state::{
    estimate_tokens, short_hash, FsBackend, MemoryBackend, Node, NodeKind, NodeMetadata,
    SearchFilter, SqliteBackend, StorageBackend,
};

/// ctxvault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
