//! Process-wide activity counters.
//!
//! The namespace counts node writes, the constructor counts manifests and
//! scratchpad gc counts swept notes. [`Metrics::flush`] logs a
//! [`MetricsSnapshot`] once per maintenance pass.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub static METRICS: Metrics = Metrics::new();

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub nodes_written: u64,
    pub manifests_built: u64,
    pub notes_swept: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    nodes_written: AtomicU64,
    manifests_built: AtomicU64,
    notes_swept: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64, name: &'static str) {
    if by > 0 {
        counter.fetch_add(by, Ordering::Relaxed);
        tracing::trace!(metric = name, by, "counter bumped");
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            nodes_written: AtomicU64::new(0),
            manifests_built: AtomicU64::new(0),
            notes_swept: AtomicU64::new(0),
        }
    }

    pub fn inc_nodes_written(&self) {
        bump(&self.nodes_written, 1, "nodes_written");
    }

    pub fn inc_manifests_built(&self) {
        bump(&self.manifests_built, 1, "manifests_built");
    }

    /// A gc pass that removed nothing leaves the counter untouched.
    pub fn add_notes_swept(&self, n: u64) {
        bump(&self.notes_swept, n, "notes_swept");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nodes_written: self.nodes_written.load(Ordering::Relaxed),
            manifests_built: self.manifests_built.load(Ordering::Relaxed),
            notes_swept: self.notes_swept.load(Ordering::Relaxed),
        }
    }

    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            nodes_written = s.nodes_written,
            manifests_built = s.manifests_built,
            notes_swept = s.notes_swept,
        );
    }

    /// Zero every counter and return what they held.
    pub fn reset(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nodes_written: self.nodes_written.swap(0, Ordering::Relaxed),
            manifests_built: self.manifests_built.swap(0, Ordering::Relaxed),
            notes_swept: self.notes_swept.swap(0, Ordering::Relaxed),
        }
    }
}
