//! Newtype wrappers for domain identifiers.
//!
//! Commit identifiers are opaque strings handed to us by the version-control
//! collaborator (a git SHA in practice, but nothing here depends on that).
//! The newtype prevents accidental mixing with file paths or feature names
//! and gives sequence extraction a deterministic ordering to tie-break on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An identifier of one studied commit.
///
/// Ordering is plain lexicographic ordering of the underlying string. This
/// is the documented tie-break rule wherever sequence extraction must choose
/// between otherwise equal candidates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    /// Creates a new commit id from a string.
    ///
    /// Note: this does not validate the format; ids are opaque to this crate.
    pub fn new(s: impl Into<String>) -> Self {
        CommitId(s.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (7-character) version of the id for display.
    pub fn short(&self) -> &str {
        // Use get() to avoid panic on multi-byte content; ids are normally
        // ASCII hex but nothing enforces that.
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        CommitId(s)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        CommitId(s.to_string())
    }
}
