//! Arena-indexed artefact trees.
//!
//! An [`ArtefactTree`] owns every node of one parsed product-line snapshot:
//! grouping nodes, source files, and the nested annotation blocks inside each
//! file. Nodes live in a flat arena and refer to each other by [`NodeId`];
//! parent references are plain non-owning indices, so the parent/child cycle
//! of the data model never turns into an ownership cycle.
//!
//! The tree owns the sorted nested-interval insertion algorithm: annotation
//! siblings are kept sorted by start line and pairwise disjoint, ancestry
//! equals textual nesting, and a partial overlap (no containment either way)
//! is a [`TreeError::StructuralViolation`] — malformed directives in the
//! source, fatal to that file's parse and never silently repaired.
//!
//! SPL-side trees are insert-only: they are built once during parsing and
//! read thereafter. Presence conditions are therefore recomputed on demand
//! rather than cached, since caching during parsing would go stale with
//! every insertion.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formula::Formula;
use crate::types::{InvalidRange, LineRange};

/// Errors from building or querying an artefact tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Two sibling annotation ranges overlap without either containing the
    /// other. Indicates malformed source markers; fatal to the file's parse.
    #[error("structural violation in {path}: inserted block {inserted} partially overlaps existing block {existing}")]
    StructuralViolation {
        path: String,
        existing: LineRange,
        inserted: LineRange,
    },

    /// A line range failed validation.
    #[error(transparent)]
    InvalidRange(#[from] InvalidRange),

    /// The node exists but has the wrong kind for the operation.
    #[error("node is not a {expected}")]
    KindMismatch { expected: &'static str },
}

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Index of a node within one [`ArtefactTree`]'s arena.
///
/// Ids are only meaningful for the tree that issued them; the block matching
/// of a projection pairs ids from two different trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// How an annotation block is realised in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnotationStyle {
    /// A real directive pair (`#if`/`#endif`). The recorded range runs from
    /// the opening directive to the closing directive; the governed code is
    /// the interior, `[from + 1, to - 1]`.
    Internal,
    /// A synthetic block with no physical directive: the whole-file wrapper,
    /// or any block of a derived variant.
    External,
}

/// The closed set of node kinds in an artefact tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtefactKind {
    /// Synthetic grouping node without a physical file. Its feature mapping
    /// is always `True`; typically the parse root.
    Group { name: String },

    /// One source file: case-sensitive relative path plus the file-level
    /// inclusion condition.
    File { path: String, condition: Formula },

    /// One nested conditional block inside a file.
    Annotation {
        mapping: Formula,
        range: LineRange,
        style: AnnotationStyle,
    },
}

/// A node in the arena: its kind plus tree wiring.
#[derive(Debug, Clone)]
pub struct Artefact {
    pub kind: ArtefactKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Ownership tree over grouping nodes, source files, and annotations.
#[derive(Debug, Clone)]
pub struct ArtefactTree {
    nodes: Vec<Artefact>,
    root: NodeId,
}

impl ArtefactTree {
    /// Creates a tree with a synthetic group root.
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = Artefact {
            kind: ArtefactKind::Group {
                name: root_name.into(),
            },
            parent: None,
            children: Vec::new(),
        };
        ArtefactTree {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// The root grouping node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Artefact {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    fn alloc(&mut self, kind: ArtefactKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Artefact {
            kind,
            parent,
            children: Vec::new(),
        });
        id
    }

    /// Adds a nested grouping node under `parent` (which must be a group).
    pub fn add_group(&mut self, parent: NodeId, name: impl Into<String>) -> TreeResult<NodeId> {
        self.expect_group(parent)?;
        let id = self.alloc(ArtefactKind::Group { name: name.into() }, Some(parent));
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Adds a source file under `parent` together with its synthetic root
    /// annotation spanning `[1, file_length]` (External, mapping `True`).
    ///
    /// Returns the file node; use [`ArtefactTree::annotation_root`] to reach
    /// the wrapper block.
    pub fn add_file(
        &mut self,
        parent: NodeId,
        path: impl Into<String>,
        condition: Formula,
        file_length: usize,
    ) -> TreeResult<NodeId> {
        self.expect_group(parent)?;
        let span = LineRange::new(1, file_length)?;
        let file = self.alloc(
            ArtefactKind::File {
                path: path.into(),
                condition,
            },
            Some(parent),
        );
        self.nodes[parent.0].children.push(file);
        let wrapper = self.alloc(
            ArtefactKind::Annotation {
                mapping: Formula::True,
                range: span,
                style: AnnotationStyle::External,
            },
            Some(file),
        );
        self.nodes[file.0].children.push(wrapper);
        Ok(file)
    }

    /// The synthetic whole-file wrapper annotation of a file node.
    pub fn annotation_root(&self, file: NodeId) -> TreeResult<NodeId> {
        match &self.nodes[file.0].kind {
            ArtefactKind::File { .. } => Ok(self.nodes[file.0].children[0]),
            _ => Err(TreeError::KindMismatch { expected: "file" }),
        }
    }

    /// Inserts an annotation block into a file's tree, maintaining the
    /// sorted nested-interval invariant.
    ///
    /// Siblings are searched by range: blocks entirely left or right of the
    /// new one narrow the search; a sibling containing the new block
    /// receives it recursively; a sibling contained by the new block is
    /// swapped out and re-inserted beneath it; anything else is a partial
    /// overlap and fails with [`TreeError::StructuralViolation`].
    pub fn insert_annotation(
        &mut self,
        file: NodeId,
        mapping: Formula,
        range: LineRange,
        style: AnnotationStyle,
    ) -> TreeResult<NodeId> {
        let wrapper = self.annotation_root(file)?;
        let wrapper_range = self.annotation_range(wrapper);
        if !wrapper_range.contains(&range) {
            return Err(TreeError::StructuralViolation {
                path: self.file_path(file).to_string(),
                existing: wrapper_range,
                inserted: range,
            });
        }
        let id = self.alloc(
            ArtefactKind::Annotation {
                mapping,
                range,
                style,
            },
            None,
        );
        match self.insert_sorted(wrapper, id) {
            Ok(()) => Ok(id),
            Err((existing, inserted)) => Err(TreeError::StructuralViolation {
                path: self.file_path(file).to_string(),
                existing,
                inserted,
            }),
        }
    }

    /// Sorted insertion of annotation `node` into the children of `parent`.
    ///
    /// Errors carry the two offending ranges; the caller attaches the path.
    fn insert_sorted(
        &mut self,
        parent: NodeId,
        node: NodeId,
    ) -> Result<(), (LineRange, LineRange)> {
        let node_range = self.annotation_range(node);
        let mut lo = 0usize;
        let mut hi = self.nodes[parent.0].children.len();

        while lo < hi {
            let mid = (lo + hi) / 2;
            let sibling = self.nodes[parent.0].children[mid];
            let sibling_range = self.annotation_range(sibling);

            if sibling_range.to() < node_range.from() {
                lo = mid + 1;
            } else if node_range.to() < sibling_range.from() {
                hi = mid;
            } else if sibling_range.contains(&node_range) {
                // Nested inside an existing sibling: descend.
                return self.insert_sorted(sibling, node);
            } else if node_range.contains(&sibling_range) {
                // The new block encloses this sibling, and possibly more of
                // its neighbours: take their slot and adopt them all.
                return self.adopt_enclosed(parent, node, mid);
            } else {
                return Err((sibling_range, node_range));
            }
        }

        self.nodes[parent.0].children.insert(lo, node);
        self.nodes[node.0].parent = Some(parent);
        Ok(())
    }

    /// Replaces the run of siblings overlapping `node`'s range with `node`
    /// itself and moves them beneath it.
    ///
    /// `mid` is a sibling index known to be enclosed by `node`. The run is
    /// contiguous because siblings are sorted and disjoint; any member of it
    /// not fully enclosed partially overlaps `node`, which is an error.
    fn adopt_enclosed(
        &mut self,
        parent: NodeId,
        node: NodeId,
        mid: usize,
    ) -> Result<(), (LineRange, LineRange)> {
        let node_range = self.annotation_range(node);

        let mut start = mid;
        while start > 0 {
            let prev = self.nodes[parent.0].children[start - 1];
            if self.annotation_range(prev).overlaps(&node_range) {
                start -= 1;
            } else {
                break;
            }
        }
        let mut end = mid + 1;
        while end < self.nodes[parent.0].children.len() {
            let next = self.nodes[parent.0].children[end];
            if self.annotation_range(next).overlaps(&node_range) {
                end += 1;
            } else {
                break;
            }
        }

        let absorbed: Vec<NodeId> = self.nodes[parent.0].children[start..end].to_vec();
        for &sibling in &absorbed {
            let sibling_range = self.annotation_range(sibling);
            if !node_range.contains(&sibling_range) {
                return Err((sibling_range, node_range));
            }
        }

        self.nodes[parent.0].children.splice(start..end, [node]);
        self.nodes[node.0].parent = Some(parent);
        // The absorbed run was sorted and disjoint, so it becomes the new
        // node's child list unchanged.
        for sibling in absorbed {
            self.nodes[sibling.0].parent = Some(node);
            self.nodes[node.0].children.push(sibling);
        }
        Ok(())
    }

    /// The feature mapping directly attached to a node.
    ///
    /// Groups map to `True`, files to their inclusion condition, annotations
    /// to their block condition.
    pub fn feature_mapping(&self, id: NodeId) -> Formula {
        match &self.nodes[id.0].kind {
            ArtefactKind::Group { .. } => Formula::True,
            ArtefactKind::File { condition, .. } => condition.clone(),
            ArtefactKind::Annotation { mapping, .. } => mapping.clone(),
        }
    }

    /// The presence condition of a node: the conjunction of feature mappings
    /// along the path to the root.
    ///
    /// Recomputed on every call; SPL trees mutate during parsing, so a cache
    /// would go stale.
    pub fn presence_condition(&self, id: NodeId) -> Formula {
        let mut conjuncts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            conjuncts.push(self.feature_mapping(current));
            cursor = self.nodes[current.0].parent;
        }
        conjuncts.reverse();
        Formula::and(conjuncts)
    }

    /// The recorded range of an annotation node.
    ///
    /// Panics if `id` is not an annotation; internal callers only reach
    /// annotation subtrees.
    pub fn annotation_range(&self, id: NodeId) -> LineRange {
        match &self.nodes[id.0].kind {
            ArtefactKind::Annotation { range, .. } => *range,
            _ => unreachable!("annotation subtrees contain only annotations"),
        }
    }

    pub fn annotation_style(&self, id: NodeId) -> AnnotationStyle {
        match &self.nodes[id.0].kind {
            ArtefactKind::Annotation { style, .. } => *style,
            _ => unreachable!("annotation subtrees contain only annotations"),
        }
    }

    /// The first line of actual code governed by an annotation.
    ///
    /// For Internal blocks the recorded start is the opening directive, one
    /// before the first code line; External blocks start on code.
    pub fn first_code_line(&self, id: NodeId) -> usize {
        let range = self.annotation_range(id);
        match self.annotation_style(id) {
            AnnotationStyle::Internal => range.from() + 1,
            AnnotationStyle::External => range.from(),
        }
    }

    /// The last line of actual code governed by an annotation.
    ///
    /// For Internal blocks the recorded end is the closing directive, one
    /// past the last code line; External blocks end on code.
    pub fn last_code_line(&self, id: NodeId) -> usize {
        let range = self.annotation_range(id);
        match self.annotation_style(id) {
            AnnotationStyle::Internal => range.to() - 1,
            AnnotationStyle::External => range.to(),
        }
    }

    /// The path of a file node.
    pub fn file_path(&self, file: NodeId) -> &str {
        match &self.nodes[file.0].kind {
            ArtefactKind::File { path, .. } => path,
            _ => "",
        }
    }

    /// All file nodes, in depth-first order.
    pub fn files(&self) -> Vec<NodeId> {
        let mut files = Vec::new();
        self.collect_files(self.root, &mut files);
        files
    }

    fn collect_files(&self, id: NodeId, into: &mut Vec<NodeId>) {
        match &self.nodes[id.0].kind {
            ArtefactKind::File { .. } => into.push(id),
            ArtefactKind::Group { .. } => {
                for &child in &self.nodes[id.0].children {
                    self.collect_files(child, into);
                }
            }
            ArtefactKind::Annotation { .. } => {}
        }
    }

    /// Finds a file node by its case-sensitive relative path.
    pub fn find_file(&self, path: &str) -> Option<NodeId> {
        self.files()
            .into_iter()
            .find(|&f| self.file_path(f) == path)
    }

    /// Appends an already-positioned annotation as the last child of
    /// `parent`, bypassing sorted insertion.
    ///
    /// Used by variant projection, which visits children in order and
    /// computes derived ranges that are sorted and disjoint by construction.
    pub(crate) fn push_annotation(
        &mut self,
        parent: NodeId,
        mapping: Formula,
        range: LineRange,
        style: AnnotationStyle,
    ) -> NodeId {
        let id = self.alloc(
            ArtefactKind::Annotation {
                mapping,
                range,
                style,
            },
            Some(parent),
        );
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Checks the nesting invariant over a file's annotation subtree:
    /// children sorted ascending by start line, pairwise disjoint, and
    /// contained in their parent's range.
    pub fn verify(&self, file: NodeId) -> TreeResult<()> {
        let wrapper = self.annotation_root(file)?;
        self.verify_subtree(file, wrapper)
    }

    fn verify_subtree(&self, file: NodeId, node: NodeId) -> TreeResult<()> {
        let range = self.annotation_range(node);
        let mut previous: Option<LineRange> = None;
        for &child in &self.nodes[node.0].children {
            let child_range = self.annotation_range(child);
            let ordered = previous
                .map(|p| p.to() < child_range.from())
                .unwrap_or(true);
            if !ordered || !range.contains(&child_range) {
                return Err(TreeError::StructuralViolation {
                    path: self.file_path(file).to_string(),
                    existing: range,
                    inserted: child_range,
                });
            }
            previous = Some(child_range);
            self.verify_subtree(file, child)?;
        }
        Ok(())
    }

    fn expect_group(&self, id: NodeId) -> TreeResult<()> {
        match self.nodes[id.0].kind {
            ArtefactKind::Group { .. } => Ok(()),
            _ => Err(TreeError::KindMismatch { expected: "group" }),
        }
    }
}
