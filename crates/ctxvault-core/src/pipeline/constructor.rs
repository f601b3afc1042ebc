//! Budgeted manifest construction from memory and history.

use std::fmt;

use ctxvault_state::Node;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ContextResult;
use crate::metrics::METRICS;
use crate::obs;
use crate::repository::{HistoryRepository, MemoryCategory, MemoryRepository};

pub const DEFAULT_TOKEN_BUDGET: u64 = 8000;

/// Relevance priority of history digests (after every memory category).
const HISTORY_PRIORITY: u32 = 100;

/// Candidate ordering applied before the budget fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringStrategy {
    /// Newest `updated_at` first.
    #[default]
    Recency,
    /// Ascending `(category priority, updated_at)`: facts before
    /// experiential before episodic before procedural before user
    /// preferences, history digests last. Within one priority the oldest
    /// entry comes first.
    Relevance,
}

impl ScoringStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recency => "recency",
            Self::Relevance => "relevance",
        }
    }

    /// Parse a strategy name. Unknown names fall back to recency.
    pub fn from_name(name: &str) -> Self {
        match name {
            "recency" => Self::Recency,
            "relevance" => Self::Relevance,
            other => {
                warn!(strategy = %other, "unknown scoring strategy, using recency");
                Self::Recency
            }
        }
    }
}

impl fmt::Display for ScoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, budget-fitted selection of nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub items: Vec<Node>,
    pub total_tokens: u64,
    pub strategy: ScoringStrategy,
    /// Candidates that did not fit the budget.
    pub excluded_count: usize,
}

impl Manifest {
    /// Build a manifest over `items`, summing their token estimates.
    pub fn from_items(items: Vec<Node>, strategy: ScoringStrategy, excluded_count: usize) -> Self {
        let total_tokens = items.iter().map(Node::token_estimate).sum();
        Self {
            items,
            total_tokens,
            strategy,
            excluded_count,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.items.iter().map(|n| n.path.as_str()).collect()
    }

    /// Drop items from the end until the total fits `budget`.
    pub fn trim_to(&mut self, budget: u64) {
        while self.total_tokens > budget {
            match self.items.pop() {
                Some(dropped) => self.total_tokens -= dropped.token_estimate(),
                None => break,
            }
        }
    }
}

/// Single-pass first-fit over `scored`.
///
/// Each candidate is taken when it still fits the remaining budget and
/// counted as excluded otherwise; scanning continues past a candidate that
/// does not fit, so a later smaller one can still be included.
pub fn fit_budget<I>(scored: I, budget: u64, strategy: ScoringStrategy) -> Manifest
where
    I: IntoIterator<Item = Node>,
{
    let mut items = Vec::new();
    let mut total_tokens = 0u64;
    let mut excluded_count = 0;

    for node in scored {
        let cost = node.token_estimate();
        if total_tokens.saturating_add(cost) <= budget {
            total_tokens += cost;
            items.push(node);
        } else {
            excluded_count += 1;
        }
    }

    Manifest {
        items,
        total_tokens,
        strategy,
        excluded_count,
    }
}

struct Candidate {
    priority: u32,
    node: Node,
}

fn score(mut candidates: Vec<Candidate>, strategy: ScoringStrategy) -> Vec<Node> {
    match strategy {
        ScoringStrategy::Recency => candidates
            .sort_by(|a, b| b.node.metadata.updated_at.cmp(&a.node.metadata.updated_at)),
        ScoringStrategy::Relevance => {
            candidates.sort_by_key(|c| (c.priority, c.node.metadata.updated_at))
        }
    }
    candidates.into_iter().map(|c| c.node).collect()
}

/// Gathers a project's memory entries and session digests into a manifest.
#[derive(Debug, Clone)]
pub struct ContextConstructor {
    history: HistoryRepository,
    memory: MemoryRepository,
}

impl ContextConstructor {
    pub fn new(history: HistoryRepository, memory: MemoryRepository) -> Self {
        Self { history, memory }
    }

    fn candidates(&self, project: &str) -> ContextResult<Vec<Candidate>> {
        let mut candidates = Vec::new();
        for category in MemoryCategory::ALL {
            candidates.extend(
                self.memory
                    .recall_all(project, category)?
                    .into_iter()
                    .map(|node| Candidate {
                        priority: category.priority(),
                        node,
                    }),
            );
        }
        candidates.extend(
            self.history
                .sessions(project)?
                .into_iter()
                .map(|node| Candidate {
                    priority: HISTORY_PRIORITY,
                    node,
                }),
        );
        Ok(candidates)
    }

    /// Score every candidate of `project` and fit them into `token_budget`.
    pub fn construct(
        &self,
        project: &str,
        token_budget: u64,
        strategy: ScoringStrategy,
    ) -> ContextResult<Manifest> {
        let candidates = self.candidates(project)?;
        debug!(project = %project, candidates = candidates.len(), "scoring candidates");

        let manifest = fit_budget(score(candidates, strategy), token_budget, strategy);

        METRICS.inc_manifests_built();
        obs::emit_manifest_built(
            project,
            strategy.as_str(),
            manifest.len(),
            manifest.total_tokens,
            manifest.excluded_count,
        );
        Ok(manifest)
    }
}
