//! Storage trait definition for ctxvault
//!
//! `StorageBackend` is the fixed capability set every mount exposes:
//! read, write, list, delete, search. Revision history is an optional
//! extension (`versions` / `read_version`) with empty default impls.
//!
//! Paths handed to a backend are *relative* to its mount point
//! (`proj/facts/db`, never `/context/memory/proj/facts/db`). The empty path
//! addresses the backend root.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use chrono::{DateTime, Utc};

use crate::error::StateError;
use crate::node::Node;
use crate::StateResult;

/// Suffix of the file-tree backend's metadata sidecars. Reserved for all
/// backends so every implementation accepts the same set of paths.
pub const META_SUFFIX: &str = ".meta.json";

/// Root-level directory holding file-tree revisions. Reserved likewise.
pub const VERSIONS_DIR: &str = ".versions";

/// Name prefix of the file-tree backend's in-flight temp files. No path
/// segment may start with it.
pub const TEMP_PREFIX: &str = ".ctxvault-tmp";

/// Validate and canonicalize a backend-relative path.
///
/// Strips leading/trailing slashes and rejects empty segments, `.` / `..`,
/// segments carrying the metadata suffix or the temp prefix, and the
/// revision directory.
/// The root (`""`) is only accepted when `allow_root` is set.
pub fn validate_key(path: &str, allow_root: bool) -> StateResult<String> {
    let key = path.trim_matches('/');
    if key.is_empty() {
        return if allow_root {
            Ok(String::new())
        } else {
            Err(StateError::InvalidPath("empty path".to_string()))
        };
    }
    for (i, segment) in key.split('/').enumerate() {
        let reserved = segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.ends_with(META_SUFFIX)
            || segment.starts_with(TEMP_PREFIX)
            || (i == 0 && segment == VERSIONS_DIR);
        if reserved {
            return Err(StateError::InvalidPath(path.to_string()));
        }
    }
    Ok(key.to_string())
}

/// Filters applied by `search`. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Node tags must be a superset of these.
    pub tags: Vec<String>,
    /// Exact source match.
    pub source: Option<String>,
    /// `updated_at >= since`.
    pub since: Option<DateTime<Utc>>,
}

impl SearchFilter {
    /// Filter that matches all nodes.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        if !node.metadata.has_tags(&self.tags) {
            return false;
        }
        if let Some(source) = &self.source {
            if &node.metadata.source != source {
                return false;
            }
        }
        if let Some(since) = self.since {
            if node.metadata.updated_at < since {
                return false;
            }
        }
        true
    }
}

/// Path-keyed node storage.
///
/// Guarantees:
/// - The path is the sole identity key; `write` to an existing path replaces
///   the node, it never merges.
/// - `list` returns the sorted, de-duplicated immediate child names.
/// - `list` and `search` under a subtree with no data return an empty vec.
/// - `search` results are ordered by relative path.
/// - Implementations are interchangeable: the same operation sequence yields
///   the same observable results, except for revision history.
pub trait StorageBackend: Send + Sync {
    /// Short human-readable backend name for logs.
    fn kind(&self) -> &'static str;

    /// Read the node at `path`, `None` if nothing is stored there.
    fn read(&self, path: &str) -> StateResult<Option<Node>>;

    /// Store `node` at `path`, replacing any existing node.
    fn write(&self, path: &str, node: &Node) -> StateResult<()>;

    /// Immediate child names under `path`.
    fn list(&self, path: &str) -> StateResult<Vec<String>>;

    /// Remove the node at `path`. Returns whether anything existed.
    fn delete(&self, path: &str) -> StateResult<bool>;

    /// All nodes strictly below `path` accepted by `filter`.
    fn search(&self, path: &str, filter: &SearchFilter) -> StateResult<Vec<Node>>;

    /// Ascending versions for which a revision snapshot exists (the current
    /// version is not included). Backends without history return empty.
    fn versions(&self, _path: &str) -> StateResult<Vec<u64>> {
        Ok(Vec::new())
    }

    /// Read a revision snapshot.
    fn read_version(&self, _path: &str, _version: u64) -> StateResult<Option<Node>> {
        Ok(None)
    }
}

/// Immediate child name of `key` below `prefix` (`prefix` is `""` or ends
/// with `/`). Shared by the key-scanning backends.
pub(crate) fn first_segment<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = key.strip_prefix(prefix)?;
    rest.split('/').next().filter(|s| !s.is_empty())
}

/// `"a/b"` -> `"a/b/"`, `""` -> `""`.
pub(crate) fn subtree_prefix(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}
