//! Hierarchical namespace with mount points.
//!
//! Each mount binds a path prefix to one [`StorageBackend`]. A request is
//! routed to the mount with the longest prefix that equals the path or is a
//! proper ancestor of it, and the backend sees the path relative to that
//! prefix. The namespace itself holds no node data.

use std::collections::BTreeMap;
use std::sync::Arc;

use ctxvault_state::{Node, NodeKind, SearchFilter, StorageBackend};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{ContextError, ContextResult};
use crate::metrics::METRICS;

/// Coerce `path` to exactly one leading slash and no trailing slash.
pub fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

/// Join a normalized base path and a child name.
pub(crate) fn join_path(base: &str, child: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), child.trim_matches('/'))
}

/// Mount table routing absolute paths to storage backends.
#[derive(Default)]
pub struct Namespace {
    mounts: RwLock<BTreeMap<String, Arc<dyn StorageBackend>>>,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("mounts", &self.mounts())
            .finish()
    }
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `prefix` to `backend`, replacing any existing mount there.
    pub fn mount(&self, prefix: &str, backend: Arc<dyn StorageBackend>) {
        let prefix = normalize_path(prefix);
        info!(prefix = %prefix, backend = backend.kind(), "mounted");
        self.mounts.write().insert(prefix, backend);
    }

    /// Remove the mount at `prefix`. Returns whether one existed.
    pub fn unmount(&self, prefix: &str) -> bool {
        let prefix = normalize_path(prefix);
        let removed = self.mounts.write().remove(&prefix).is_some();
        if removed {
            info!(prefix = %prefix, "unmounted");
        }
        removed
    }

    /// Mounted prefixes, sorted.
    pub fn mounts(&self) -> Vec<String> {
        self.mounts.read().keys().cloned().collect()
    }

    /// Whether any mount covers `path`.
    pub fn is_mounted(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Longest-prefix resolution to `(backend, relative path)`.
    fn resolve(&self, path: &str) -> ContextResult<(Arc<dyn StorageBackend>, String)> {
        let path = normalize_path(path);
        let mounts = self.mounts.read();

        let best = mounts
            .iter()
            .filter(|(prefix, _)| {
                prefix.as_str() == "/"
                    || path == **prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|(prefix, _)| prefix.len());

        match best {
            Some((prefix, backend)) => {
                let rel = path[prefix.len()..].trim_start_matches('/').to_string();
                debug!(path = %path, mount = %prefix, rel = %rel, "resolved");
                Ok((Arc::clone(backend), rel))
            }
            None => Err(ContextError::MountNotFound { path }),
        }
    }

    pub fn read(&self, path: &str) -> ContextResult<Option<Node>> {
        let (backend, rel) = self.resolve(path)?;
        Ok(backend.read(&rel)?)
    }

    pub fn write(&self, path: &str, node: &Node) -> ContextResult<()> {
        let (backend, rel) = self.resolve(path)?;
        backend.write(&rel, node)?;
        METRICS.inc_nodes_written();
        Ok(())
    }

    pub fn list(&self, path: &str) -> ContextResult<Vec<String>> {
        let (backend, rel) = self.resolve(path)?;
        Ok(backend.list(&rel)?)
    }

    pub fn delete(&self, path: &str) -> ContextResult<bool> {
        let (backend, rel) = self.resolve(path)?;
        Ok(backend.delete(&rel)?)
    }

    pub fn search(&self, path: &str, filter: &SearchFilter) -> ContextResult<Vec<Node>> {
        let (backend, rel) = self.resolve(path)?;
        Ok(backend.search(&rel, filter)?)
    }

    /// Revision versions kept by the backing store (file-tree mounts only).
    pub fn versions(&self, path: &str) -> ContextResult<Vec<u64>> {
        let (backend, rel) = self.resolve(path)?;
        Ok(backend.versions(&rel)?)
    }

    pub fn read_version(&self, path: &str, version: u64) -> ContextResult<Option<Node>> {
        let (backend, rel) = self.resolve(path)?;
        Ok(backend.read_version(&rel, version)?)
    }

    /// Deterministic depth-first walk of the subtree at `path`.
    ///
    /// Children are visited in listing order; a child that reads as a file
    /// node is emitted, anything else is descended into.
    pub fn walk(&self, path: &str) -> ContextResult<Vec<Node>> {
        let mut out = Vec::new();
        self.walk_into(&normalize_path(path), &mut out)?;
        Ok(out)
    }

    fn walk_into(&self, base: &str, out: &mut Vec<Node>) -> ContextResult<()> {
        for child in self.list(base)? {
            let child_path = join_path(base, &child);
            match self.read(&child_path)? {
                Some(node) if node.kind == NodeKind::File => out.push(node),
                _ => self.walk_into(&child_path, out)?,
            }
        }
        Ok(())
    }
}
