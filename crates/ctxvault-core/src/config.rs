//! Vault configuration.
//!
//! Loaded from an optional JSON file, then overridden from the environment:
//!
//! | variable                | field          |
//! |-------------------------|----------------|
//! | `CTXVAULT_BASE_DIR`     | `base_dir`     |
//! | `CTXVAULT_BACKEND`      | `backend`      |
//! | `CTXVAULT_TOKEN_BUDGET` | `token_budget` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ContextError, ContextResult};
use crate::pipeline::DEFAULT_TOKEN_BUDGET;
use crate::repository::{DEFAULT_HISTORY_ROOT, DEFAULT_MEMORY_ROOT, DEFAULT_SCRATCHPAD_ROOT};

pub const ENV_BASE_DIR: &str = "CTXVAULT_BASE_DIR";
pub const ENV_BACKEND: &str = "CTXVAULT_BACKEND";
pub const ENV_TOKEN_BUDGET: &str = "CTXVAULT_TOKEN_BUDGET";

/// Which storage backend the vault mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// File tree with revision history.
    #[default]
    Filesystem,
    /// Single-table embedded database.
    Sqlite,
    /// Process-local, nothing persisted.
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "filesystem" | "fs" => Ok(Self::Filesystem),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(ContextError::Config(format!("unknown backend: {other}"))),
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ctxvault")
}

/// Settings for [`Vault::open`](crate::Vault::open).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub base_dir: PathBuf,
    pub backend: BackendKind,
    pub token_budget: u64,
    /// Age after which history sessions are pruned by maintenance.
    pub prune_max_age_days: u32,
    pub mount_prefix: String,
    pub memory_root: String,
    pub history_root: String,
    pub scratchpad_root: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            backend: BackendKind::default(),
            token_budget: DEFAULT_TOKEN_BUDGET,
            prune_max_age_days: 30,
            mount_prefix: "/context".to_string(),
            memory_root: DEFAULT_MEMORY_ROOT.to_string(),
            history_root: DEFAULT_HISTORY_ROOT.to_string(),
            scratchpad_root: DEFAULT_SCRATCHPAD_ROOT.to_string(),
        }
    }
}

impl VaultConfig {
    /// Config rooted at `base_dir` with every other field defaulted.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Default config file location, `<default base dir>/config.json`.
    pub fn default_path() -> PathBuf {
        default_base_dir().join("config.json")
    }

    /// Read a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> ContextResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `CTXVAULT_*` overrides from the process environment.
    pub fn apply_env(self) -> ContextResult<Self> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(mut self, lookup: F) -> ContextResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_BASE_DIR) {
            self.base_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup(ENV_BACKEND) {
            self.backend = backend.parse()?;
        }
        if let Some(budget) = lookup(ENV_TOKEN_BUDGET) {
            self.token_budget = budget.trim().parse().map_err(|_| {
                ContextError::Config(format!("{ENV_TOKEN_BUDGET} is not a number: {budget}"))
            })?;
        }
        Ok(self)
    }

    /// Directory of the file-tree backend.
    pub fn tree_dir(&self) -> PathBuf {
        self.base_dir.join("tree")
    }

    /// Database file of the embedded-database backend.
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("ctxvault.db")
    }
}
