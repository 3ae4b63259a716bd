//! Block matching and ground truth.
//!
//! A projection pairs every retained block of the SPL tree with its derived
//! counterpart in the variant tree. [`BlockMatching`] keeps that pairing in
//! both directions and in lockstep; [`GroundTruth`] bundles the derived
//! artefact tree with its matching so a study can verify, line by line,
//! where every derived block came from.

use std::collections::HashMap;

use thiserror::Error;

use crate::tree::{ArtefactTree, NodeId};

/// Errors from recording block matches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchingError {
    /// A node was matched twice. The matching is append-only; a duplicate
    /// key means the projection visited a node twice, which is a logic
    /// error, never silently overwritten.
    #[error("block already matched")]
    DuplicateMatch,
}

/// Bidirectional, append-only mapping between SPL nodes and variant nodes.
///
/// Keys on the forward side are ids of the SPL-side tree; values are ids of
/// the derived variant tree. The inverse map is maintained in lockstep.
#[derive(Debug, Clone, Default)]
pub struct BlockMatching {
    forward: HashMap<NodeId, NodeId>,
    inverse: HashMap<NodeId, NodeId>,
}

impl BlockMatching {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one (original, derived) pair. Append-only: a duplicate on
    /// either side is an error.
    pub fn insert(&mut self, original: NodeId, derived: NodeId) -> Result<(), MatchingError> {
        if self.forward.contains_key(&original) || self.inverse.contains_key(&derived) {
            return Err(MatchingError::DuplicateMatch);
        }
        self.forward.insert(original, derived);
        self.inverse.insert(derived, original);
        Ok(())
    }

    /// The derived counterpart of an SPL node, if retained.
    pub fn derived(&self, original: NodeId) -> Option<NodeId> {
        self.forward.get(&original).copied()
    }

    /// The SPL origin of a derived node.
    pub fn original(&self, derived: NodeId) -> Option<NodeId> {
        self.inverse.get(&derived).copied()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Iterates (original, derived) pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.forward.iter().map(|(&o, &d)| (o, d))
    }

    /// Folds another matching into this one, used when combining sibling
    /// derivations. Key sets must be disjoint.
    pub fn union(&mut self, other: BlockMatching) -> Result<(), MatchingError> {
        for (original, derived) in other.forward {
            self.insert(original, derived)?;
        }
        Ok(())
    }
}

/// The verified outcome of projecting one variant: the derived artefact
/// tree, the block matching into it, and the derived file paths.
#[derive(Debug)]
pub struct GroundTruth {
    /// The derived (variant-side) artefact tree.
    pub variant_tree: ArtefactTree,
    /// Matching from SPL nodes to nodes of `variant_tree`.
    pub matching: BlockMatching,
    /// Relative paths of the files that were derived, in projection order.
    pub derived_paths: Vec<String>,
}

impl GroundTruth {
    pub fn new(variant_tree: ArtefactTree) -> Self {
        GroundTruth {
            variant_tree,
            matching: BlockMatching::new(),
            derived_paths: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Formula;
    use crate::tree::{AnnotationStyle, ArtefactTree};
    use crate::types::LineRange;

    /// Ids for tests come from a real arena so they are honest NodeIds.
    fn some_ids(count: usize) -> Vec<NodeId> {
        let mut tree = ArtefactTree::new("ids");
        let file = tree
            .add_file(tree.root(), "f.c", Formula::True, 1000)
            .unwrap();
        (0..count)
            .map(|i| {
                tree.insert_annotation(
                    file,
                    Formula::var(format!("F{}", i)),
                    LineRange::new(2 * i + 1, 2 * i + 1).unwrap(),
                    AnnotationStyle::External,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn insert_and_lookup_both_directions() {
        let ids = some_ids(4);
        let mut matching = BlockMatching::new();
        matching.insert(ids[0], ids[1]).unwrap();
        matching.insert(ids[2], ids[3]).unwrap();

        assert_eq!(matching.derived(ids[0]), Some(ids[1]));
        assert_eq!(matching.original(ids[1]), Some(ids[0]));
        assert_eq!(matching.derived(ids[1]), None);
        assert_eq!(matching.len(), 2);
    }

    #[test]
    fn duplicate_original_is_rejected() {
        let ids = some_ids(3);
        let mut matching = BlockMatching::new();
        matching.insert(ids[0], ids[1]).unwrap();
        assert_eq!(
            matching.insert(ids[0], ids[2]).unwrap_err(),
            MatchingError::DuplicateMatch
        );
    }

    #[test]
    fn duplicate_derived_is_rejected() {
        let ids = some_ids(3);
        let mut matching = BlockMatching::new();
        matching.insert(ids[0], ids[2]).unwrap();
        assert_eq!(
            matching.insert(ids[1], ids[2]).unwrap_err(),
            MatchingError::DuplicateMatch
        );
    }

    #[test]
    fn union_folds_disjoint_matchings() {
        let ids = some_ids(4);
        let mut left = BlockMatching::new();
        left.insert(ids[0], ids[1]).unwrap();
        let mut right = BlockMatching::new();
        right.insert(ids[2], ids[3]).unwrap();

        left.union(right).unwrap();
        assert_eq!(left.len(), 2);
        assert_eq!(left.original(ids[3]), Some(ids[2]));
    }

    #[test]
    fn union_detects_collisions() {
        let ids = some_ids(3);
        let mut left = BlockMatching::new();
        left.insert(ids[0], ids[1]).unwrap();
        let mut right = BlockMatching::new();
        right.insert(ids[0], ids[2]).unwrap();

        assert!(left.union(right).is_err());
    }

    #[test]
    fn inverse_is_exact_inverse_of_forward() {
        let ids = some_ids(6);
        let mut matching = BlockMatching::new();
        for pair in ids.chunks(2) {
            matching.insert(pair[0], pair[1]).unwrap();
        }
        for (original, derived) in matching.iter() {
            assert_eq!(matching.original(derived), Some(original));
        }
    }
}
