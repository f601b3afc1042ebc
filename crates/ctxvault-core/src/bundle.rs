//! Subtree export and import as a single JSON document.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "exported_at": "2026-01-01T00:00:00.000000000Z",
//!   "base_path": "/context/memory/proj",
//!   "node_count": 2,
//!   "nodes": [ { "path": "...", "node_type": "file", "metadata": {...}, "content": "..." } ]
//! }
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use ctxvault_state::node::timestamp;
use ctxvault_state::Node;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::ContextResult;
use crate::namespace::{join_path, normalize_path, Namespace};
use crate::obs;
use crate::repository::absorb_missing_mount;

pub const BUNDLE_FORMAT_VERSION: &str = "1.0";

/// A serialized subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub version: String,
    #[serde(with = "timestamp")]
    pub exported_at: DateTime<Utc>,
    pub base_path: String,
    pub node_count: usize,
    pub nodes: Vec<Node>,
}

impl Bundle {
    /// Walk `base_path` and collect every file node below it. A path that
    /// no mount covers yields an empty bundle.
    pub fn collect(ns: &Namespace, base_path: &str) -> ContextResult<Self> {
        let base_path = normalize_path(base_path);
        let nodes = absorb_missing_mount(ns.walk(&base_path))?;
        Ok(Self {
            version: BUNDLE_FORMAT_VERSION.to_string(),
            exported_at: Utc::now(),
            base_path,
            node_count: nodes.len(),
            nodes,
        })
    }

    /// Path of `node` once moved from `base_path` onto `target_prefix`.
    ///
    /// Nodes outside `base_path` keep their path.
    pub fn rebase(&self, node_path: &str, target_prefix: &str) -> String {
        let rest = if self.base_path == "/" {
            Some(node_path)
        } else {
            node_path
                .strip_prefix(self.base_path.as_str())
                .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        };
        match rest {
            Some(rest) => normalize_path(&join_path(target_prefix, rest)),
            None => node_path.to_string(),
        }
    }
}

/// Export the subtree at `base_path` to `out`. Returns the node count.
pub fn export_bundle(ns: &Namespace, base_path: &str, out: &Path) -> ContextResult<usize> {
    let bundle = Bundle::collect(ns, base_path)?;

    let dir = match out.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    // Atomic write: temp file in the same directory, then rename.
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, &bundle)?;
    tmp.write_all(b"\n")?;
    tmp.persist(out).map_err(|e| e.error)?;

    obs::emit_bundle_exported(&bundle.base_path, bundle.node_count);
    Ok(bundle.node_count)
}

/// Import every node of the bundle at `file`, optionally rebased onto
/// `target_prefix`. Each node's `updated_at` becomes the import time.
pub fn import_bundle(ns: &Namespace, file: &Path, target_prefix: Option<&str>) -> ContextResult<usize> {
    let raw = fs::read_to_string(file)?;
    let bundle: Bundle = serde_json::from_str(&raw)?;
    if bundle.version != BUNDLE_FORMAT_VERSION {
        warn!(version = %bundle.version, "importing bundle with unexpected format version");
    }

    let now = Utc::now();
    let mut imported = 0;
    for node in &bundle.nodes {
        let mut node = node.clone();
        if let Some(prefix) = target_prefix {
            node.path = bundle.rebase(&node.path, prefix);
        }
        node.metadata.updated_at = now;
        ns.write(&node.path, &node)?;
        imported += 1;
    }

    obs::emit_bundle_imported(&bundle.base_path, imported);
    Ok(imported)
}
