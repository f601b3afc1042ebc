//! Context assembly: scoring candidates into a token budget and refreshing
//! previously built manifests.

mod constructor;
mod updater;

pub use constructor::{fit_budget, ContextConstructor, Manifest, ScoringStrategy, DEFAULT_TOKEN_BUDGET};
pub use updater::{ContextUpdater, UpdateMode, DEFAULT_STALENESS_THRESHOLD};
