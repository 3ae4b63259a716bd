//! Commits as seen by sequence extraction, and their deferred payloads.
//!
//! Evolution studies walk thousands of commits, but only ever need the
//! heavyweight per-commit data (commit message, feature model, presence
//! conditions) for a small sliding window of them. [`Deferred`] makes that
//! explicit: first access loads and memoizes, `evict` frees the payload so a
//! long walk stays bounded. Single-threaded by construction; callers must
//! not evict while another consumer still needs the value (a later access
//! simply reloads).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::CommitId;

/// One usable (parent, child) commit pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvolutionStep {
    /// The commit being evolved from.
    pub parent: CommitId,
    /// The commit being evolved to.
    pub child: CommitId,
}

impl EvolutionStep {
    pub fn new(parent: impl Into<CommitId>, child: impl Into<CommitId>) -> Self {
        EvolutionStep {
            parent: parent.into(),
            child: child.into(),
        }
    }
}

/// A deferred, single-assignment cache for one heavyweight payload.
///
/// Holds an optional payload plus a loader closure. `get` loads on first
/// access and memoizes; `evict` drops the payload but keeps the loader, so a
/// subsequent `get` reloads rather than failing.
///
/// There is deliberately no global cache registry: each owner carries its
/// own `Deferred` fields and decides when to evict them.
pub struct Deferred<T> {
    value: Option<T>,
    loader: Box<dyn FnMut() -> T>,
}

impl<T> Deferred<T> {
    /// Creates an unloaded cache with the given loader.
    pub fn new(loader: impl FnMut() -> T + 'static) -> Self {
        Deferred {
            value: None,
            loader: Box::new(loader),
        }
    }

    /// Creates an already-loaded cache (no load on first access).
    pub fn loaded(value: T, loader: impl FnMut() -> T + 'static) -> Self {
        Deferred {
            value: Some(value),
            loader: Box::new(loader),
        }
    }

    /// Returns the payload, loading and memoizing it on first access.
    pub fn get(&mut self) -> &T {
        let loader = &mut self.loader;
        self.value.get_or_insert_with(|| loader())
    }

    /// Drops the cached payload. The loader is kept, so a later `get`
    /// reloads the value.
    pub fn evict(&mut self) {
        self.value = None;
    }

    /// True if the payload is currently resident.
    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("loaded", &self.value.is_some())
            .finish()
    }
}

/// Releases per-item caches once sequence extraction is done with an item.
///
/// Implemented by anything carrying [`Deferred`] payloads that the cleaning
/// iterator in [`crate::sequence`] should free as soon as the item becomes
/// unreachable.
pub trait Evict {
    fn evict(&mut self);
}

/// One studied commit as exposed by the version-control collaborator.
///
/// Carries the identifier and parent references needed by sequence
/// extraction, light metadata, and the commit message as a deferred payload
/// (the message is only consulted when a sequence is reported).
#[derive(Debug)]
pub struct StudyCommit {
    /// The commit's identifier.
    pub id: CommitId,
    /// Parent commit ids; empty for history roots, several for merges.
    pub parents: Vec<CommitId>,
    /// Author timestamp, if the collaborator provided one.
    pub timestamp: Option<DateTime<Utc>>,
    /// Commit message, loaded on demand.
    pub message: Deferred<String>,
}

impl StudyCommit {
    /// Creates a commit whose message loads through `load_message`.
    pub fn new(
        id: impl Into<CommitId>,
        parents: Vec<CommitId>,
        timestamp: Option<DateTime<Utc>>,
        load_message: impl FnMut() -> String + 'static,
    ) -> Self {
        StudyCommit {
            id: id.into(),
            parents,
            timestamp,
            message: Deferred::new(load_message),
        }
    }

    /// True if this commit has exactly one parent.
    ///
    /// Only single-parent commits can extend a chain; merge commits and
    /// history roots always start new sequences.
    pub fn has_single_parent(&self) -> bool {
        self.parents.len() == 1
    }
}

impl Evict for StudyCommit {
    fn evict(&mut self) {
        self.message.evict();
    }
}
