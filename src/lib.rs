//! Evolution replay core for preprocessor-based software product lines.
//!
//! This library provides the data model and algorithms for replaying how the
//! feature-to-code mapping of a product line changes across commits:
//!
//! - [`tree`]: presence-condition trees modelling nested conditional blocks,
//!   with sorted nested-interval insertion
//! - [`projection`]: derivation of a variant's source tree together with an
//!   exact original↔derived line mapping (the "ground truth")
//! - [`sequence`]: reconstruction of maximal commit chains from unordered
//!   parent→child evolution steps
//!
//! Version-control access, feature-model sampling, and orchestration live in
//! embedding tools; this crate is the algorithmic core they call into.

pub mod dataset;
pub mod formula;
pub mod matching;
pub mod projection;
pub mod sequence;
pub mod tree;
pub mod types;
