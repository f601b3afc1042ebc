//! Typed repositories layered over the [`Namespace`](crate::Namespace).
//!
//! Each repository owns one subtree of the namespace and imposes a schema on
//! it: categorized memory entries, distilled session digests, and TTL'd
//! scratchpad notes.

mod history;
mod memory;
mod scratchpad;

pub use history::{HistoryRepository, Transcript, TranscriptEntry, DEFAULT_HISTORY_ROOT};
pub use memory::{MemoryCategory, MemoryRepository, ToolUsage, DEFAULT_MEMORY_ROOT};
pub use scratchpad::{
    NoteOptions, ScratchpadRepository, DEFAULT_NOTE_TTL_SECS, DEFAULT_SCRATCHPAD_ROOT,
};

use ctxvault_state::storage_traits::{META_SUFFIX, TEMP_PREFIX, VERSIONS_DIR};

use crate::error::{ContextError, ContextResult};

/// Turn a missing mount into an empty result.
///
/// Listing or searching a subtree that nothing backs is "no data" from a
/// repository's point of view; every other error still propagates.
pub(crate) fn absorb_missing_mount<T: Default>(result: ContextResult<T>) -> ContextResult<T> {
    match result {
        Err(ContextError::MountNotFound { path }) => {
            tracing::debug!(path = %path, "no mount for repository subtree");
            Ok(T::default())
        }
        other => other,
    }
}

/// Validate a caller-supplied project, key or id as one path segment.
pub(crate) fn segment(name: &str) -> ContextResult<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name == VERSIONS_DIR
        || name.contains('/')
        || name.starts_with(TEMP_PREFIX)
        || name.ends_with(META_SUFFIX);
    if invalid {
        return Err(ContextError::InvalidName(name.to_string()));
    }
    Ok(name)
}
