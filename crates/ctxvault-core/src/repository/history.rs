//! Session history: condensed digests of agent transcripts.
//!
//! A transcript arrives already parsed into [`TranscriptEntry`] values (the
//! wire format belongs to whichever adapter captured it). Only the digest is
//! stored, at `{root}/{project}/{session_id}`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ctxvault_state::{estimate_tokens, short_hash, Node, NodeKind, NodeMetadata};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{absorb_missing_mount, segment};
use crate::error::ContextResult;
use crate::namespace::{join_path, normalize_path, Namespace};
use crate::obs;

pub const DEFAULT_HISTORY_ROOT: &str = "/context/history";

pub const SESSION_TAGS: [&str; 2] = ["session", "history"];
const CAPTURE_SOURCE: &str = "capture";

const SUMMARY_CHARS: usize = 300;
const ITEM_CHARS: usize = 200;
const RAW_FALLBACK_CHARS: usize = 2000;
const SESSION_ID_LEN: usize = 12;

/// One extracted transcript event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Summary {
        text: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    Prompt {
        text: String,
    },
    FileOperation {
        tool: String,
        target: String,
    },
    AssistantText {
        text: String,
    },
    Error {
        text: String,
    },
}

/// A raw transcript plus the entries an adapter extracted from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub raw: String,
    #[serde(default)]
    pub entries: Vec<TranscriptEntry>,
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn bullet_section(title: &str, items: &[String]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let lines: Vec<String> = items.iter().map(|item| format!("- {item}")).collect();
    Some(format!("## {title}\n{}", lines.join("\n")))
}

impl Transcript {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: TranscriptEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Session id announced by the first summary entry, if any.
    pub fn announced_session_id(&self) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            TranscriptEntry::Summary {
                session_id: Some(id),
                ..
            } if !id.is_empty() => Some(id.as_str()),
            _ => None,
        })
    }

    /// Render the digest: up to four labelled sections separated by a blank
    /// line, or the head of the raw text when nothing was extracted.
    pub fn digest(&self) -> String {
        let mut summary: Option<String> = None;
        let mut fallback_summary: Option<String> = None;
        let mut prompts = Vec::new();
        let mut file_ops = Vec::new();
        let mut errors = Vec::new();

        for entry in &self.entries {
            match entry {
                TranscriptEntry::Summary { text, .. } => {
                    if summary.is_none() && !text.is_empty() {
                        summary = Some(text.clone());
                    }
                }
                TranscriptEntry::Prompt { text } => prompts.push(truncate(text, ITEM_CHARS)),
                TranscriptEntry::FileOperation { tool, target } => {
                    file_ops.push(format!("{tool}: {target}"))
                }
                TranscriptEntry::AssistantText { text } => {
                    let text = text.trim();
                    if fallback_summary.is_none() && !text.is_empty() {
                        fallback_summary = Some(truncate(text, SUMMARY_CHARS));
                    }
                }
                TranscriptEntry::Error { text } => errors.push(truncate(text, ITEM_CHARS)),
            }
        }

        let mut sections = Vec::new();
        if let Some(summary) = summary.or(fallback_summary) {
            sections.push(format!("## Summary\n{summary}"));
        }
        sections.extend(bullet_section("Prompts", &prompts));
        sections.extend(bullet_section("File Operations", &file_ops));
        sections.extend(bullet_section("Errors", &errors));

        if sections.is_empty() {
            truncate(&self.raw, RAW_FALLBACK_CHARS)
        } else {
            sections.join("\n\n")
        }
    }
}

/// Repository of per-project session digests.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    ns: Arc<Namespace>,
    root: String,
}

impl HistoryRepository {
    pub fn new(ns: Arc<Namespace>) -> Self {
        Self::with_root(ns, DEFAULT_HISTORY_ROOT)
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

    fn session_path(&self, project: &str, session_id: &str) -> ContextResult<String> {
        Ok(join_path(&self.project_dir(project)?, segment(session_id)?))
    }

    /// Distil `transcript` into a digest node and return the session id used.
    ///
    /// The id is, in order: `session_id`, the id announced by the first
    /// summary entry, or a short hash of the raw transcript.
    pub fn ingest_session(
        &self,
        transcript: &Transcript,
        project: &str,
        session_id: Option<&str>,
    ) -> ContextResult<String> {
        let session_id = session_id
            .or_else(|| transcript.announced_session_id())
            .map(str::to_string)
            .unwrap_or_else(|| short_hash(&transcript.raw, SESSION_ID_LEN));
        let path = self.session_path(project, &session_id)?;

        let content = transcript.digest();
        // a re-capture counts as new for pruning but still bumps the version
        let mut metadata = NodeMetadata::fresh(Utc::now())
            .with_source(CAPTURE_SOURCE)
            .with_tags(SESSION_TAGS)
            .with_token_estimate(estimate_tokens(&content));
        if let Some(existing) = self.ns.read(&path)? {
            metadata.version = existing.metadata.version + 1;
        }
        let node = Node::file(path.as_str(), content, metadata);
        self.ns.write(&path, &node)?;

        obs::emit_session_ingested(project, &session_id, node.metadata.token_estimate);
        Ok(session_id)
    }

    pub fn get_session(&self, project: &str, session_id: &str) -> ContextResult<Option<Node>> {
        self.ns.read(&self.session_path(project, session_id)?)
    }

    /// Session ids of a project, sorted. Empty when none were ingested.
    pub fn list_sessions(&self, project: &str) -> ContextResult<Vec<String>> {
        absorb_missing_mount(self.ns.list(&self.project_dir(project)?))
    }

    /// Every session digest of a project, in session id order.
    pub fn sessions(&self, project: &str) -> ContextResult<Vec<Node>> {
        let dir = self.project_dir(project)?;
        let mut nodes = Vec::new();
        for id in self.list_sessions(project)? {
            if let Some(node) = self.ns.read(&join_path(&dir, &id))? {
                if node.kind == NodeKind::File {
                    nodes.push(node);
                }
            }
        }
        Ok(nodes)
    }

    /// Delete every session created strictly before `before`.
    pub fn prune(&self, project: &str, before: DateTime<Utc>) -> ContextResult<usize> {
        let mut removed = 0;
        for id in self.list_sessions(project)? {
            let path = self.session_path(project, &id)?;
            let Some(node) = self.ns.read(&path)? else {
                continue;
            };
            if node.kind == NodeKind::File
                && node.metadata.created_at < before
                && self.ns.delete(&path)?
            {
                debug!(path = %path, "session pruned");
                removed += 1;
            }
        }
        obs::emit_sessions_pruned(project, removed);
        Ok(removed)
    }
}
