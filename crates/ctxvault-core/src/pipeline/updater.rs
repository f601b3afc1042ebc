//! Re-deriving manifests from previous ones.
//!
//! The updater never touches the store directly: every mode starts from a
//! fresh construction and reconciles it with the previous manifest.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use ctxvault_state::Node;
use serde::{Deserialize, Serialize};

use super::constructor::{ContextConstructor, Manifest, ScoringStrategy};
use crate::error::{ContextError, ContextResult};
use crate::obs;

pub const DEFAULT_STALENESS_THRESHOLD: f64 = 0.5;

/// How a previous manifest is reconciled with a fresh construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Ignore the previous manifest.
    #[default]
    Snapshot,
    /// Keep previously shown items still present, append new ones.
    Incremental,
    /// Per path, keep whichever version was updated last.
    Adaptive,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Incremental => "incremental",
            Self::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snapshot" => Ok(Self::Snapshot),
            "incremental" => Ok(Self::Incremental),
            "adaptive" => Ok(Self::Adaptive),
            _ => Err(ContextError::InvalidMode(s.to_string())),
        }
    }
}

/// Previous items whose path is still among the fresh items, followed by
/// fresh items that were not shown before, trimmed from the end.
fn merge_incremental(fresh: Manifest, previous: &Manifest, budget: u64) -> Manifest {
    let fresh_paths: HashSet<&str> = fresh.items.iter().map(|n| n.path.as_str()).collect();
    let previous_paths: HashSet<&str> = previous.items.iter().map(|n| n.path.as_str()).collect();

    let mut combined: Vec<Node> = previous
        .items
        .iter()
        .filter(|n| fresh_paths.contains(n.path.as_str()))
        .cloned()
        .collect();
    combined.extend(
        fresh
            .items
            .iter()
            .filter(|n| !previous_paths.contains(n.path.as_str()))
            .cloned(),
    );

    let mut merged = Manifest::from_items(combined, fresh.strategy, fresh.excluded_count);
    merged.trim_to(budget);
    merged
}

/// Fresh construction order, taking the previous node at a path when it is
/// at least as recent as the fresh one.
fn merge_adaptive(fresh: Manifest, previous: &Manifest, budget: u64) -> Manifest {
    let previous_by_path: HashMap<&str, &Node> = previous
        .items
        .iter()
        .map(|n| (n.path.as_str(), n))
        .collect();

    let strategy = fresh.strategy;
    let excluded_count = fresh.excluded_count;
    let combined: Vec<Node> = fresh
        .items
        .into_iter()
        .map(|node| match previous_by_path.get(node.path.as_str()) {
            Some(prev) if prev.metadata.updated_at >= node.metadata.updated_at => (*prev).clone(),
            _ => node,
        })
        .collect();

    let mut merged = Manifest::from_items(combined, strategy, excluded_count);
    merged.trim_to(budget);
    merged
}

/// Produces the next manifest for a project from the previous one.
#[derive(Debug, Clone)]
pub struct ContextUpdater {
    constructor: ContextConstructor,
}

impl ContextUpdater {
    pub fn new(constructor: ContextConstructor) -> Self {
        Self { constructor }
    }

    pub fn constructor(&self) -> &ContextConstructor {
        &self.constructor
    }

    /// Build the next manifest. Without a previous manifest every mode
    /// behaves like [`UpdateMode::Snapshot`].
    pub fn update(
        &self,
        project: &str,
        token_budget: u64,
        strategy: ScoringStrategy,
        mode: UpdateMode,
        previous: Option<&Manifest>,
    ) -> ContextResult<Manifest> {
        let fresh = self.constructor.construct(project, token_budget, strategy)?;
        let manifest = match (mode, previous) {
            (UpdateMode::Snapshot, _) | (_, None) => fresh,
            (UpdateMode::Incremental, Some(prev)) => merge_incremental(fresh, prev, token_budget),
            (UpdateMode::Adaptive, Some(prev)) => merge_adaptive(fresh, prev, token_budget),
        };

        obs::emit_manifest_updated(project, mode.as_str(), manifest.len(), manifest.total_tokens);
        Ok(manifest)
    }

    /// Whether `manifest` looks stale enough to rebuild.
    ///
    /// An empty manifest always needs a refresh. When all items share one
    /// `updated_at` nothing is stale. Otherwise the share of items carrying
    /// the oldest timestamp is compared against `staleness_threshold`.
    pub fn should_refresh(&self, manifest: &Manifest, staleness_threshold: f64) -> bool {
        let timestamps = manifest.items.iter().map(|n| n.metadata.updated_at);
        let (Some(oldest), Some(newest)) = (timestamps.clone().min(), timestamps.max()) else {
            return true;
        };
        if oldest == newest {
            return false;
        }

        let stale = manifest
            .items
            .iter()
            .filter(|n| n.metadata.updated_at == oldest)
            .count();
        stale as f64 / manifest.len() as f64 >= staleness_threshold
    }
}
