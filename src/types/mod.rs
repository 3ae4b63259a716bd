//! Core domain types for evolution replay.
//!
//! This module contains the fundamental value types used throughout the
//! crate, designed to encode invariants via the type system.

pub mod commit;
pub mod ids;
pub mod range;

// Re-export commonly used types at the module level
pub use commit::{Deferred, Evict, EvolutionStep, StudyCommit};
pub use ids::CommitId;
pub use range::{InvalidRange, LineRange};
