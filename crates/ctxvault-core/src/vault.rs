//! One configured namespace with its repositories and pipeline.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ctxvault_state::{FsBackend, MemoryBackend, SqliteBackend, StorageBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{BackendKind, VaultConfig};
use crate::error::ContextResult;
use crate::metrics::METRICS;
use crate::namespace::Namespace;
use crate::obs::VaultSpan;
use crate::pipeline::{ContextConstructor, ContextUpdater};
use crate::repository::{HistoryRepository, MemoryRepository, ScratchpadRepository};

/// What one maintenance pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub notes_swept: usize,
    pub sessions_pruned: usize,
}

/// A mounted namespace plus the repositories and pipeline built on it.
#[derive(Debug, Clone)]
pub struct Vault {
    config: VaultConfig,
    namespace: Arc<Namespace>,
    memory: MemoryRepository,
    history: HistoryRepository,
    scratchpad: ScratchpadRepository,
    updater: ContextUpdater,
}

impl Vault {
    /// Open the backend selected by `config` and mount it.
    pub fn open(config: &VaultConfig) -> ContextResult<Self> {
        let backend: Arc<dyn StorageBackend> = match config.backend {
            BackendKind::Filesystem => Arc::new(FsBackend::new(config.tree_dir())?),
            BackendKind::Sqlite => Arc::new(SqliteBackend::open(config.database_path())?),
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        info!(backend = %config.backend, base_dir = %config.base_dir.display(), "vault opened");
        Ok(Self::with_backend(config, backend))
    }

    /// Mount an already constructed backend at `config.mount_prefix`.
    pub fn with_backend(config: &VaultConfig, backend: Arc<dyn StorageBackend>) -> Self {
        let namespace = Arc::new(Namespace::new());
        namespace.mount(&config.mount_prefix, backend);

        let memory = MemoryRepository::with_root(namespace.clone(), &config.memory_root);
        let history = HistoryRepository::with_root(namespace.clone(), &config.history_root);
        let scratchpad = ScratchpadRepository::with_root(namespace.clone(), &config.scratchpad_root);
        let updater = ContextUpdater::new(ContextConstructor::new(history.clone(), memory.clone()));

        Self {
            config: config.clone(),
            namespace,
            memory,
            history,
            scratchpad,
            updater,
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    pub fn memory(&self) -> &MemoryRepository {
        &self.memory
    }

    pub fn history(&self) -> &HistoryRepository {
        &self.history
    }

    pub fn scratchpad(&self) -> &ScratchpadRepository {
        &self.scratchpad
    }

    pub fn constructor(&self) -> &ContextConstructor {
        self.updater.constructor()
    }

    pub fn updater(&self) -> &ContextUpdater {
        &self.updater
    }

    /// Sweep expired scratchpad notes and prune old sessions of `projects`.
    pub fn maintain(&self, projects: &[&str]) -> ContextResult<MaintenanceReport> {
        self.maintain_at(projects, Utc::now())
    }

    /// [`maintain`](Self::maintain) against an explicit clock reading.
    pub fn maintain_at(&self, projects: &[&str], now: DateTime<Utc>) -> ContextResult<MaintenanceReport> {
        let mut report = MaintenanceReport {
            notes_swept: self.scratchpad.gc_at(now)?,
            ..MaintenanceReport::default()
        };

        // a retention reaching past the representable range never prunes
        let max_age = Duration::days(i64::from(self.config.prune_max_age_days));
        match now.checked_sub_signed(max_age) {
            Some(cutoff) => {
                for project in projects {
                    let _span = VaultSpan::enter(project);
                    report.sessions_pruned += self.history.prune(project, cutoff)?;
                }
            }
            None => debug!(
                max_age_days = self.config.prune_max_age_days,
                "retention exceeds clock range; session pruning skipped"
            ),
        }

        METRICS.flush();
        info!(
            notes_swept = report.notes_swept,
            sessions_pruned = report.sessions_pruned,
            "maintenance finished"
        );
        Ok(report)
    }
}
