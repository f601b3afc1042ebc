//! Ephemeral per-task notes with a time-to-live.
//!
//! A note is promoted into memory, archived into an arbitrary path, or
//! left to expire and be swept by [`ScratchpadRepository::gc`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ctxvault_state::{estimate_tokens, Node, NodeKind, NodeMetadata};
use tracing::debug;

use super::memory::{MemoryCategory, MemoryRepository};
use super::{absorb_missing_mount, segment};
use crate::error::ContextResult;
use crate::metrics::METRICS;
use crate::namespace::{join_path, normalize_path, Namespace};
use crate::obs;

pub const DEFAULT_SCRATCHPAD_ROOT: &str = "/context/scratchpad";
pub const DEFAULT_NOTE_TTL_SECS: u64 = 3600;

const ARCHIVED_TAG: &str = "archived";

/// TTL and tags for a new note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteOptions {
    pub ttl_seconds: Option<u64>,
    pub tags: Vec<String>,
}

impl Default for NoteOptions {
    fn default() -> Self {
        Self {
            ttl_seconds: Some(DEFAULT_NOTE_TTL_SECS),
            tags: vec!["scratchpad".to_string()],
        }
    }
}

impl NoteOptions {
    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }

    /// The note is never swept.
    pub fn no_expiry(mut self) -> Self {
        self.ttl_seconds = None;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Repository of task-scoped scratchpad notes.
#[derive(Debug, Clone)]
pub struct ScratchpadRepository {
    ns: Arc<Namespace>,
    root: String,
}

impl ScratchpadRepository {
    pub fn new(ns: Arc<Namespace>) -> Self {
        Self::with_root(ns, DEFAULT_SCRATCHPAD_ROOT)
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

    fn task_dir(&self, task_id: &str) -> ContextResult<String> {
        Ok(join_path(&self.root, segment(task_id)?))
    }

    fn note_path(&self, task_id: &str, note_id: &str) -> ContextResult<String> {
        Ok(join_path(&self.task_dir(task_id)?, segment(note_id)?))
    }

    /// Create a note with the default one hour TTL.
    pub fn create(&self, task_id: &str, note_id: &str, content: &str) -> ContextResult<Node> {
        self.create_with(task_id, note_id, content, &NoteOptions::default())
    }

    /// Create or replace a note. Replacing restarts its TTL clock.
    pub fn create_with(
        &self,
        task_id: &str,
        note_id: &str,
        content: &str,
        options: &NoteOptions,
    ) -> ContextResult<Node> {
        let path = self.note_path(task_id, note_id)?;
        let mut metadata = NodeMetadata::fresh(Utc::now())
            .with_source("scratchpad")
            .with_tags(options.tags.iter().cloned())
            .with_ttl(options.ttl_seconds)
            .with_token_estimate(estimate_tokens(content));
        if let Some(existing) = self.ns.read(&path)? {
            metadata.version = existing.metadata.version + 1;
        }

        let node = Node::file(path.as_str(), content, metadata);
        self.ns.write(&path, &node)?;
        debug!(task_id = %task_id, note_id = %note_id, ttl = ?options.ttl_seconds, "note created");
        Ok(node)
    }

    pub fn read(&self, task_id: &str, note_id: &str) -> ContextResult<Option<Node>> {
        self.ns.read(&self.note_path(task_id, note_id)?)
    }

    pub fn list_notes(&self, task_id: &str) -> ContextResult<Vec<String>> {
        absorb_missing_mount(self.ns.list(&self.task_dir(task_id)?))
    }

    /// Copy the note into memory with source `"promotion"`, then delete it.
    ///
    /// Returns `false` without side effects when the note does not exist.
    pub fn promote(
        &self,
        task_id: &str,
        note_id: &str,
        memory: &MemoryRepository,
        project: &str,
        category: MemoryCategory,
        key: &str,
    ) -> ContextResult<bool> {
        let path = self.note_path(task_id, note_id)?;
        let Some(note) = self.ns.read(&path)? else {
            return Ok(false);
        };

        let entry = memory.store_with(
            project,
            category,
            key,
            note.content.as_deref().unwrap_or_default(),
            "promotion",
            note.metadata.tags,
        )?;
        self.ns.delete(&path)?;

        obs::emit_note_promoted(task_id, note_id, &entry.path);
        Ok(true)
    }

    /// Copy the note to `destination` tagged `"archived"`, then delete it.
    ///
    /// The copy keeps the note's creation time and carries no TTL.
    pub fn archive(&self, task_id: &str, note_id: &str, destination: &str) -> ContextResult<bool> {
        let path = self.note_path(task_id, note_id)?;
        let Some(note) = self.ns.read(&path)? else {
            return Ok(false);
        };

        let destination = normalize_path(destination);
        let previous = self.ns.read(&destination)?;
        let mut metadata = NodeMetadata::revise(previous.as_ref().map(|n| &n.metadata), Utc::now())
            .with_source("archive")
            .with_tags(note.metadata.tags.iter().cloned())
            .with_token_estimate(note.metadata.token_estimate);
        metadata.created_at = note.metadata.created_at;
        if !metadata.has_tags(&[ARCHIVED_TAG.to_string()]) {
            metadata.tags.push(ARCHIVED_TAG.to_string());
        }

        let archived = Node {
            path: destination.clone(),
            kind: NodeKind::File,
            metadata,
            content: note.content,
        };
        self.ns.write(&destination, &archived)?;
        self.ns.delete(&path)?;

        obs::emit_note_archived(task_id, note_id, &destination);
        Ok(true)
    }

    /// Sweep every note whose TTL has elapsed.
    pub fn gc(&self) -> ContextResult<usize> {
        self.gc_at(Utc::now())
    }

    /// [`gc`](Self::gc) against an explicit clock reading.
    pub fn gc_at(&self, now: DateTime<Utc>) -> ContextResult<usize> {
        let tasks = absorb_missing_mount(self.ns.list(&self.root))?;
        let mut removed = 0;

        for task in tasks {
            let dir = join_path(&self.root, &task);
            for note_id in absorb_missing_mount(self.ns.list(&dir))? {
                let path = join_path(&dir, &note_id);
                let Some(note) = self.ns.read(&path)? else {
                    continue;
                };
                let Some(ttl) = note.metadata.ttl_seconds else {
                    continue;
                };
                let expired = (now - note.metadata.created_at)
                    .to_std()
                    .is_ok_and(|elapsed| elapsed > std::time::Duration::from_secs(ttl));
                if expired && self.ns.delete(&path)? {
                    debug!(path = %path, "expired note swept");
                    removed += 1;
                }
            }
        }

        METRICS.add_notes_swept(removed as u64);
        obs::emit_scratchpad_swept(removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ctxvault_state::MemoryBackend;

    fn setup() -> (Arc<Namespace>, ScratchpadRepository) {
        let ns = Arc::new(Namespace::new());
        ns.mount("/context", Arc::new(MemoryBackend::new()));
        (ns.clone(), ScratchpadRepository::new(ns))
    }

    #[test]
    fn create_applies_default_ttl_and_tags() {
        let (_ns, pad) = setup();
        let note = pad.create("t1", "n1", "remember this").unwrap();
        assert_eq!(note.path, "/context/scratchpad/t1/n1");
        assert_eq!(note.metadata.ttl_seconds, Some(3600));
        assert_eq!(note.metadata.tags, vec!["scratchpad"]);
        assert_eq!(pad.list_notes("t1").unwrap(), vec!["n1"]);
        assert!(pad.list_notes("t2").unwrap().is_empty());
    }

    #[test]
    fn promote_moves_note_into_memory() {
        let (ns, pad) = setup();
        let memory = MemoryRepository::new(ns);
        pad.create_with("t1", "n1", "use sqlite", &NoteOptions::default().tags(["db"]))
            .unwrap();

        assert!(pad
            .promote("t1", "n1", &memory, "proj", MemoryCategory::Fact, "store")
            .unwrap());
        assert!(pad.read("t1", "n1").unwrap().is_none());

        let entry = memory.recall("proj", MemoryCategory::Fact, "store").unwrap().unwrap();
        assert_eq!(entry.content.as_deref(), Some("use sqlite"));
        assert_eq!(entry.metadata.source, "promotion");
        assert_eq!(entry.metadata.tags, vec!["db"]);
    }

    #[test]
    fn promote_missing_note_has_no_effect() {
        let (ns, pad) = setup();
        let memory = MemoryRepository::new(ns);
        assert!(!pad
            .promote("t1", "ghost", &memory, "proj", MemoryCategory::Fact, "k")
            .unwrap());
        assert!(memory.recall("proj", MemoryCategory::Fact, "k").unwrap().is_none());
    }

    #[test]
    fn archive_keeps_creation_time_and_marks_archived() {
        let (ns, pad) = setup();
        let note = pad.create("t1", "n1", "draft").unwrap();
        assert!(pad.archive("t1", "n1", "/context/history/proj/archived-n1").unwrap());
        assert!(pad.read("t1", "n1").unwrap().is_none());

        let archived = ns.read("/context/history/proj/archived-n1").unwrap().unwrap();
        assert_eq!(archived.metadata.created_at, note.metadata.created_at);
        assert_eq!(archived.metadata.tags, vec!["scratchpad", "archived"]);
        assert_eq!(archived.metadata.source, "archive");
        assert_eq!(archived.metadata.ttl_seconds, None);
        assert_eq!(archived.content.as_deref(), Some("draft"));

        assert!(!pad.archive("t1", "n1", "/context/history/proj/again").unwrap());
    }

    #[test]
    fn gc_sweeps_expired_notes_only() {
        let (_ns, pad) = setup();
        let zero = pad
            .create_with("t1", "zero", "x", &NoteOptions::default().ttl(0))
            .unwrap();
        pad.create_with("t1", "forever", "x", &NoteOptions::default().no_expiry())
            .unwrap();
        pad.create("t2", "hour", "x").unwrap();

        let later = zero.metadata.created_at + Duration::milliseconds(1);
        assert_eq!(pad.gc_at(later).unwrap(), 1);
        assert_eq!(pad.list_notes("t1").unwrap(), vec!["forever"]);

        let much_later = later + Duration::days(365);
        assert_eq!(pad.gc_at(much_later).unwrap(), 1);
        assert_eq!(pad.list_notes("t1").unwrap(), vec!["forever"]);
        assert!(pad.list_notes("t2").unwrap().is_empty());
    }

    #[test]
    fn gc_without_mount_is_zero() {
        let pad = ScratchpadRepository::new(Arc::new(Namespace::new()));
        assert_eq!(pad.gc().unwrap(), 0);
    }
}
