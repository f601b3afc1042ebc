//! In-memory fake for the storage trait (testing and ephemeral mounts)
//!
//! Provides `MemoryBackend`, which satisfies the `StorageBackend` contract
//! without touching disk.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;

use crate::node::Node;
use crate::storage_traits::*;
use crate::StateResult;

/// In-memory backend backed by a `BTreeMap<key, Node>`.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    nodes: Mutex<BTreeMap<String, Node>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn read(&self, path: &str) -> StateResult<Option<Node>> {
        let key = validate_key(path, true)?;
        Ok(self.nodes.lock().get(&key).cloned())
    }

    fn write(&self, path: &str, node: &Node) -> StateResult<()> {
        let key = validate_key(path, false)?;
        self.nodes.lock().insert(key, node.clone());
        Ok(())
    }

    fn list(&self, path: &str) -> StateResult<Vec<String>> {
        let key = validate_key(path, true)?;
        let prefix = subtree_prefix(&key);
        let nodes = self.nodes.lock();
        let names: BTreeSet<String> = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| first_segment(k, &prefix).map(str::to_string))
            .collect();
        Ok(names.into_iter().collect())
    }

    fn delete(&self, path: &str) -> StateResult<bool> {
        let key = validate_key(path, true)?;
        Ok(self.nodes.lock().remove(&key).is_some())
    }

    fn search(&self, path: &str, filter: &SearchFilter) -> StateResult<Vec<Node>> {
        let key = validate_key(path, true)?;
        let prefix = subtree_prefix(&key);
        let nodes = self.nodes.lock();
        Ok(nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, n)| n)
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }
}
