//! Inclusive 1-based line ranges.
//!
//! All line numbers in this crate are 1-based and ranges are inclusive on
//! both ends, matching how annotations are recorded in the artefact CSV.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error constructing a [`LineRange`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid line range [{from}, {to}]: line numbers are 1-based and from <= to must hold")]
pub struct InvalidRange {
    pub from: usize,
    pub to: usize,
}

/// An inclusive, 1-based line range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    from: usize,
    to: usize,
}

impl LineRange {
    /// Creates a range, validating `1 <= from <= to`.
    pub fn new(from: usize, to: usize) -> Result<Self, InvalidRange> {
        if from == 0 || to < from {
            return Err(InvalidRange { from, to });
        }
        Ok(LineRange { from, to })
    }

    /// First line of the range.
    pub fn from(&self) -> usize {
        self.from
    }

    /// Last line of the range (inclusive).
    pub fn to(&self) -> usize {
        self.to
    }

    /// Number of lines covered.
    pub fn len(&self) -> usize {
        self.to - self.from + 1
    }

    /// Always false: a valid range covers at least one line.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if `line` falls inside the range.
    pub fn contains_line(&self, line: usize) -> bool {
        self.from <= line && line <= self.to
    }

    /// True if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &LineRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }

    /// True if the two ranges share no line.
    pub fn is_disjoint_from(&self, other: &LineRange) -> bool {
        self.to < other.from || other.to < self.from
    }

    /// True if the ranges share at least one line.
    pub fn overlaps(&self, other: &LineRange) -> bool {
        !self.is_disjoint_from(other)
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}
