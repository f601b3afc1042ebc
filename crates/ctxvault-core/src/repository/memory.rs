//! Categorized long-lived memory.
//!
//! Entries live at `{root}/{project}/{category}/{key}`. Every store to the
//! same key is a new revision: the version goes up by one and `created_at`
//! is carried forward.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use ctxvault_state::{estimate_tokens, Node, NodeKind, NodeMetadata, SearchFilter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{absorb_missing_mount, segment};
use crate::error::{ContextError, ContextResult};
use crate::namespace::{join_path, normalize_path, Namespace};

pub const DEFAULT_MEMORY_ROOT: &str = "/context/memory";

/// Source label for plain stores.
const USER_SOURCE: &str = "user";
/// Source label written by [`MemoryRepository::update`].
const UPDATE_SOURCE: &str = "evaluator";

/// The five kinds of memory a project keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryCategory {
    Fact,
    Episodic,
    Experiential,
    Procedural,
    User,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 5] = [
        Self::Fact,
        Self::Episodic,
        Self::Experiential,
        Self::Procedural,
        Self::User,
    ];

    /// Directory name under the project subtree.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Fact => "facts",
            Self::Episodic => "episodic",
            Self::Experiential => "experiential",
            Self::Procedural => "procedural",
            Self::User => "user",
        }
    }

    /// Ordering key for relevance scoring; lower sorts first.
    pub fn priority(&self) -> u32 {
        match self {
            Self::Fact => 1,
            Self::Experiential => 2,
            Self::Episodic => 3,
            Self::Procedural => 4,
            Self::User => 5,
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for MemoryCategory {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fact" | "facts" => Ok(Self::Fact),
            "episodic" => Ok(Self::Episodic),
            "experiential" => Ok(Self::Experiential),
            "procedural" => Ok(Self::Procedural),
            "user" | "user-preference" | "user_preference" | "preference" => Ok(Self::User),
            _ => Err(ContextError::InvalidCategory(s.to_string())),
        }
    }
}

/// A tool usage record stored as procedural memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub tool: String,
    pub description: String,
    #[serde(default)]
    pub usage: String,
}

impl ToolUsage {
    pub fn new(tool: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            description: description.into(),
            usage: String::new(),
        }
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }
}

/// Repository of per-project categorized memory entries.
#[derive(Debug, Clone)]
pub struct MemoryRepository {
    ns: Arc<Namespace>,
    root: String,
}

impl MemoryRepository {
    pub fn new(ns: Arc<Namespace>) -> Self {
        Self::with_root(ns, DEFAULT_MEMORY_ROOT)
    }

    pub fn with_root(ns: Arc<Namespace>, root: &str) -> Self {
        Self {
            ns,
            root: normalize_path(root),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn project_dir(&self, project: &str) -> ContextResult<String> {
        Ok(join_path(&self.root, segment(project)?))
    }

    fn category_dir(&self, project: &str, category: MemoryCategory) -> ContextResult<String> {
        Ok(join_path(&self.project_dir(project)?, category.dir_name()))
    }

    fn entry_path(&self, project: &str, category: MemoryCategory, key: &str) -> ContextResult<String> {
        Ok(join_path(&self.category_dir(project, category)?, segment(key)?))
    }

    /// Store `value` with source `"user"` and no tags.
    pub fn store(
        &self,
        project: &str,
        category: MemoryCategory,
        key: &str,
        value: &str,
    ) -> ContextResult<Node> {
        self.store_with(project, category, key, value, USER_SOURCE, Vec::<String>::new())
    }

    /// Store `value` as the next revision of the entry and return what was
    /// written.
    pub fn store_with<I, S>(
        &self,
        project: &str,
        category: MemoryCategory,
        key: &str,
        value: &str,
        source: &str,
        tags: I,
    ) -> ContextResult<Node>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = self.entry_path(project, category, key)?;
        let existing = self.ns.read(&path)?;

        let metadata = NodeMetadata::revise(existing.as_ref().map(|n| &n.metadata), Utc::now())
            .with_source(source)
            .with_tags(tags)
            .with_token_estimate(estimate_tokens(value));
        let node = Node::file(path.as_str(), value, metadata);
        self.ns.write(&path, &node)?;

        debug!(
            project = %project,
            category = %category,
            key = %key,
            version = node.metadata.version,
            "memory stored"
        );
        Ok(node)
    }

    pub fn recall(
        &self,
        project: &str,
        category: MemoryCategory,
        key: &str,
    ) -> ContextResult<Option<Node>> {
        self.ns.read(&self.entry_path(project, category, key)?)
    }

    /// Every entry in one category, in key order. Empty when the category
    /// has never been written.
    pub fn recall_all(&self, project: &str, category: MemoryCategory) -> ContextResult<Vec<Node>> {
        let dir = self.category_dir(project, category)?;
        let keys = absorb_missing_mount(self.ns.list(&dir))?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(node) = self.ns.read(&join_path(&dir, &key))? {
                if node.kind == NodeKind::File {
                    entries.push(node);
                }
            }
        }
        Ok(entries)
    }

    /// Overwrite an existing entry, keeping its tags. Returns `false` when
    /// the key does not exist.
    pub fn update(
        &self,
        project: &str,
        category: MemoryCategory,
        key: &str,
        value: &str,
    ) -> ContextResult<bool> {
        let Some(existing) = self.recall(project, category, key)? else {
            return Ok(false);
        };
        self.store_with(
            project,
            category,
            key,
            value,
            UPDATE_SOURCE,
            existing.metadata.tags,
        )?;
        Ok(true)
    }

    pub fn forget(&self, project: &str, category: MemoryCategory, key: &str) -> ContextResult<bool> {
        self.ns.delete(&self.entry_path(project, category, key)?)
    }

    /// Filtered search across every category of a project.
    pub fn search(&self, project: &str, filter: &SearchFilter) -> ContextResult<Vec<Node>> {
        let dir = self.project_dir(project)?;
        absorb_missing_mount(self.ns.search(&dir, filter))
    }

    pub fn store_procedural(&self, project: &str, usage: &ToolUsage) -> ContextResult<Node> {
        let value = serde_json::to_string(usage)?;
        self.store_with(
            project,
            MemoryCategory::Procedural,
            &usage.tool,
            &value,
            "procedural",
            ["tool"],
        )
    }

    pub fn recall_procedural(&self, project: &str, tool: &str) -> ContextResult<Option<ToolUsage>> {
        match self.recall(project, MemoryCategory::Procedural, tool)? {
            Some(Node {
                content: Some(content),
                ..
            }) => Ok(Some(serde_json::from_str(&content)?)),
            _ => Ok(None),
        }
    }

    pub fn store_user_preference(&self, project: &str, key: &str, value: &str) -> ContextResult<Node> {
        self.store_with(
            project,
            MemoryCategory::User,
            key,
            value,
            USER_SOURCE,
            ["preference"],
        )
    }

    /// All user preferences of a project as `key -> value`.
    pub fn recall_user_preferences(&self, project: &str) -> ContextResult<BTreeMap<String, String>> {
        Ok(self
            .recall_all(project, MemoryCategory::User)?
            .into_iter()
            .map(|node| (node.name().to_string(), node.content.unwrap_or_default()))
            .collect())
    }
}
