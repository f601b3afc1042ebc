//! Node model: the path-addressed unit of context data.
//!
//! A [`Node`] serializes losslessly to a plain JSON record:
//!
//! ```json
//! {
//!   "path": "/context/memory/proj/facts/db",
//!   "node_type": "file",
//!   "metadata": { "created_at": "...", "updated_at": "...", "version": 1, ... },
//!   "content": "PostgreSQL"
//! }
//! ```
//!
//! Partial records deserialize with defaults: `source = ""`,
//! `content_type = "text/plain"`, `token_estimate = 0`, no tags, no TTL,
//! `version = 1`, empty `extra`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StateError;
use crate::StateResult;

/// Default content type for nodes.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Whether a node carries content or only groups children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "directory" => Ok(Self::Directory),
            other => Err(StateError::InvalidRecord(format!("unknown node type: {other}"))),
        }
    }
}

/// RFC 3339 timestamps, always UTC with nanosecond precision and a `Z`
/// suffix, so every persisted timestamp shares one textual representation.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

fn default_version() -> u64 {
    1
}

/// Metadata carried by every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Free-text provenance label ("user", "capture", "promotion", ...)
    #[serde(default)]
    pub source: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub token_estimate: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    /// Starts at 1, incremented by one on every overwrite of the same path.
    #[serde(default = "default_version")]
    pub version: u64,
    /// Open-ended backend or caller specific metadata.
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl NodeMetadata {
    /// Metadata for a node written for the first time at `now`.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            source: String::new(),
            content_type: default_content_type(),
            token_estimate: 0,
            tags: Vec::new(),
            ttl_seconds: None,
            version: 1,
            extra: BTreeMap::new(),
        }
    }

    /// Metadata for the next revision of a path.
    ///
    /// Carries `created_at` forward from `previous` and sets
    /// `version = previous.version + 1`; with no previous revision this is
    /// [`NodeMetadata::fresh`]. Callers that overwrite a path go through here
    /// so the file-tree backend can key the snapshot of the old revision by
    /// its own version number.
    pub fn revise(previous: Option<&NodeMetadata>, now: DateTime<Utc>) -> Self {
        let mut meta = Self::fresh(now);
        if let Some(prev) = previous {
            meta.created_at = prev.created_at;
            meta.version = prev.version + 1;
        }
        meta
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: Option<u64>) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_token_estimate(mut self, tokens: u64) -> Self {
        self.token_estimate = tokens;
        self
    }

    /// True when every tag in `required` is present on this node.
    pub fn has_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tags.contains(t))
    }
}

/// A path-addressed unit of text content plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Absolute, slash-delimited path within a namespace.
    pub path: String,
    #[serde(rename = "node_type")]
    pub kind: NodeKind,
    pub metadata: NodeMetadata,
    /// Absent for directories.
    #[serde(default)]
    pub content: Option<String>,
}

impl Node {
    pub fn file(path: impl Into<String>, content: impl Into<String>, metadata: NodeMetadata) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::File,
            metadata,
            content: Some(content.into()),
        }
    }

    pub fn directory(path: impl Into<String>, metadata: NodeMetadata) -> Self {
        Self {
            path: path.into(),
            kind: NodeKind::Directory,
            metadata,
            content: None,
        }
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn token_estimate(&self) -> u64 {
        self.metadata.token_estimate
    }

    /// Serialize to a plain structured record.
    pub fn to_record(&self) -> StateResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize from a plain structured record, applying field defaults.
    pub fn from_record(record: Value) -> StateResult<Self> {
        Ok(serde_json::from_value(record)?)
    }
}
