//! Structured observability hooks for vault lifecycle events.
//!
//! Every emitter logs at `info!` with an `event = "..."` field so log
//! pipelines can filter on it. Verbosity is controlled through
//! `CTXVAULT_LOG` (see [`crate::telemetry::init_tracing`]).

use tracing::info;

/// RAII guard that enters a project-scoped tracing span.
///
/// ```ignore
/// let _span = VaultSpan::enter("proj");
/// // every event below carries project = "proj"
/// ```
pub struct VaultSpan {
    _span: tracing::span::EnteredSpan,
}

impl VaultSpan {
    /// Create and enter a span tagged with the project.
    pub fn enter(project: &str) -> Self {
        let span = tracing::info_span!("ctxvault.project", project = %project);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a manifest was constructed from scratch.
pub fn emit_manifest_built(project: &str, strategy: &str, items: usize, total_tokens: u64, excluded: usize) {
    info!(
        event = "manifest.built",
        project = %project,
        strategy = %strategy,
        items = items,
        total_tokens = total_tokens,
        excluded = excluded,
    );
}

/// Emit event: a manifest was re-derived from a previous one.
pub fn emit_manifest_updated(project: &str, mode: &str, items: usize, total_tokens: u64) {
    info!(
        event = "manifest.updated",
        project = %project,
        mode = %mode,
        items = items,
        total_tokens = total_tokens,
    );
}

/// Emit event: a transcript was distilled into a session digest.
pub fn emit_session_ingested(project: &str, session_id: &str, tokens: u64) {
    info!(event = "history.ingested", project = %project, session_id = %session_id, tokens = tokens);
}

/// Emit event: old sessions were pruned.
pub fn emit_sessions_pruned(project: &str, removed: usize) {
    info!(event = "history.pruned", project = %project, removed = removed);
}

/// Emit event: scratchpad garbage collection finished.
pub fn emit_scratchpad_swept(removed: usize) {
    info!(event = "scratchpad.swept", removed = removed);
}

/// Emit event: a scratchpad note became a memory entry.
pub fn emit_note_promoted(task_id: &str, note_id: &str, destination: &str) {
    info!(event = "scratchpad.promoted", task_id = %task_id, note_id = %note_id, destination = %destination);
}

/// Emit event: a scratchpad note was archived.
pub fn emit_note_archived(task_id: &str, note_id: &str, destination: &str) {
    info!(event = "scratchpad.archived", task_id = %task_id, note_id = %note_id, destination = %destination);
}

/// Emit event: a subtree was exported to a bundle file.
pub fn emit_bundle_exported(base_path: &str, nodes: usize) {
    info!(event = "bundle.exported", base_path = %base_path, nodes = nodes);
}

/// Emit event: a bundle file was imported.
pub fn emit_bundle_imported(base_path: &str, nodes: usize) {
    info!(event = "bundle.imported", base_path = %base_path, nodes = nodes);
}
