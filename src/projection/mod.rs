//! Variant projection: deriving a feature-restricted source tree with
//! exact line-level ground truth.
//!
//! Given an SPL-side artefact tree and a variant's feature selection, this
//! module derives the tree of code that survives the selection, computes the
//! exact line-number remapping caused by removed blocks, writes the derived
//! files, and records every retained (original, derived) block pair in a
//! [`BlockMatching`].
//!
//! The derivation never mutates the SPL tree; it only reads it and allocates
//! nodes in a fresh variant-side tree. Matching and ground truth are created
//! per projection call and handed to the caller — nothing is shared between
//! projections.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::formula::{Formula, FormulaError};
use crate::matching::{BlockMatching, GroundTruth, MatchingError};
use crate::tree::{AnnotationStyle, ArtefactTree, NodeId, TreeError};
use crate::types::{InvalidRange, LineRange};

#[cfg(test)]
mod tests;

/// Errors from variant projection.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The physical source file behind an SPL file node is absent.
    #[error("source file not found: {path}")]
    MissingSource { path: String },

    /// Reading a source file or writing a derived file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The physical file is shorter than the annotations claim.
    #[error("{path} has no line {line}: annotations cover more lines than the file")]
    SourceTooShort { path: String, line: usize },

    /// The formula capability failed (e.g. enumeration limit exceeded).
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// A block was matched twice; indicates a derivation logic error.
    #[error(transparent)]
    Matching(#[from] MatchingError),

    /// The SPL tree rejected an operation.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// A derived range degenerated, which the derivation should prevent.
    #[error(transparent)]
    Range(#[from] InvalidRange),
}

/// A concrete feature selection for which source code is derived.
#[derive(Debug, Clone)]
pub struct Variant {
    name: String,
    selection: Formula,
}

impl Variant {
    /// Creates a variant from its name and selection formula (typically a
    /// conjunction of positive and negated feature literals).
    pub fn new(name: impl Into<String>, selection: Formula) -> Self {
        Variant {
            name: name.into(),
            selection,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this variant's selection implies the given presence
    /// condition, i.e. the annotated code survives in this variant.
    pub fn is_implementing(&self, condition: &Formula) -> Result<bool, FormulaError> {
        self.selection.implies(condition)
    }
}

/// Options controlling tree-level projection.
///
/// `exit_on_error` and `ignore_missing_files` are independent; all four
/// combinations are meaningful. A missing SPL file is downgraded to a
/// skipped file by `ignore_missing_files` before `exit_on_error` is
/// consulted.
pub struct ProjectionConfig {
    /// Abort the whole generation on the first failing file. On by default:
    /// a failing commit's generation aborts the revision unless configured
    /// otherwise.
    pub exit_on_error: bool,

    /// Treat a missing source file as empty success instead of a failure.
    pub ignore_missing_files: bool,

    /// Independent file filter (by relative path), applied before any
    /// feature logic. `true` keeps the file.
    pub filter: Option<Box<dyn Fn(&str) -> bool>>,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        ProjectionConfig {
            exit_on_error: true,
            ignore_missing_files: false,
            filter: None,
        }
    }
}

impl std::fmt::Debug for ProjectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionConfig")
            .field("exit_on_error", &self.exit_on_error)
            .field("ignore_missing_files", &self.ignore_missing_files)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Result of projecting a whole tree: the aggregate ground truth plus the
/// per-file failures that were tolerated (empty unless `exit_on_error` is
/// off).
#[derive(Debug)]
pub struct ProjectionOutcome {
    pub ground_truth: GroundTruth,
    pub failures: Vec<(String, ProjectionError)>,
}

/// One derived block, described before materialisation.
///
/// The derivation runs bottom-up over the SPL tree and produces this
/// side-effect-free description first; materialising it into the variant
/// tree afterwards means a block that turns out to derive nothing never
/// half-exists in the arena or the matching.
struct DerivedBlock {
    origin: NodeId,
    mapping: Formula,
    range: LineRange,
    children: Vec<DerivedBlock>,
}

/// Derives one annotation node under the given running offset.
///
/// Returns the derived block (or `None` if the node is excluded or derives
/// no lines) together with the offset the caller continues with for later
/// siblings. Excluded subtrees debit their full original line count from the
/// offset so later siblings stay correctly positioned.
fn derive_block(
    spl: &ArtefactTree,
    node: NodeId,
    variant: &Variant,
    offset: i64,
) -> Result<(Option<DerivedBlock>, i64), ProjectionError> {
    let range = spl.annotation_range(node);
    let full_len = range.len() as i64;

    if !variant.is_implementing(&spl.presence_condition(node))? {
        return Ok((None, offset - full_len));
    }

    let cf = spl.first_code_line(node) as i64;
    let cl = spl.last_code_line(node) as i64;
    if cl < cf {
        // A directive pair with an empty interior derives nothing.
        return Ok((None, offset - full_len));
    }

    // Internal blocks drop their directive lines in the variant; the offset
    // shifts once before the content and once after it.
    let opening_drop = cf - range.from() as i64;
    let closing_drop = range.to() as i64 - cl;

    let content_offset = offset - opening_drop;
    let derived_from = cf + content_offset;

    let mut inner = content_offset;
    let mut children = Vec::new();
    for &child in spl.children(node) {
        let (derived, next) = derive_block(spl, child, variant, inner)?;
        if let Some(block) = derived {
            children.push(block);
        }
        inner = next;
    }

    let derived_to = cl + inner;
    if derived_to < derived_from {
        // Every governed line sat in excluded children: the block is
        // retained by the selection but derives no code.
        debug_assert!(children.is_empty());
        return Ok((None, offset - full_len));
    }

    let block = DerivedBlock {
        origin: node,
        mapping: spl.feature_mapping(node),
        range: LineRange::new(derived_from as usize, derived_to as usize)?,
        children,
    };
    Ok((Some(block), inner - closing_drop))
}

/// Writes a derived block description into the variant tree, recording every
/// (original, derived) pair in the shared matching.
fn materialize(
    block: DerivedBlock,
    out: &mut ArtefactTree,
    parent: NodeId,
    matching: &mut BlockMatching,
) -> Result<NodeId, MatchingError> {
    let id = out.push_annotation(parent, block.mapping, block.range, AnnotationStyle::External);
    matching.insert(block.origin, id)?;
    for child in block.children {
        materialize(child, out, id, matching)?;
    }
    Ok(id)
}

/// The 1-based original line ranges a retained node contributes to the
/// variant, in order.
///
/// Gap lines between consecutive children (and between the node's code
/// bounds and its first/last child) are directly owned by the node and
/// copied unconditionally; included children contribute their own selection
/// recursively.
pub fn lines_to_copy(
    spl: &ArtefactTree,
    node: NodeId,
    variant: &Variant,
) -> Result<Vec<LineRange>, ProjectionError> {
    let cf = spl.first_code_line(node);
    let cl = spl.last_code_line(node);
    if cl < cf {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut cursor = cf;
    for &child in spl.children(node) {
        let child_range = spl.annotation_range(child);
        if cursor < child_range.from() {
            out.push(LineRange::new(cursor, child_range.from() - 1)?);
        }
        if variant.is_implementing(&spl.presence_condition(child))? {
            out.extend(lines_to_copy(spl, child, variant)?);
        }
        cursor = child_range.to() + 1;
    }
    if cursor <= cl {
        out.push(LineRange::new(cursor, cl)?);
    }
    Ok(out)
}

/// Projects a single SPL file into the variant.
///
/// Fails with [`ProjectionError::MissingSource`] if the physical file is
/// absent. On success the target file is created (parent directories
/// included) and exactly the selected lines are copied into it; the derived
/// file node is added to `ground.variant_tree` and every retained block is
/// recorded in `ground.matching`.
///
/// Returns the derived file node, or `None` if the file derives no lines
/// (the target is then created empty and no node is added).
pub fn project_file(
    spl: &ArtefactTree,
    file: NodeId,
    variant: &Variant,
    source_root: &Path,
    target_root: &Path,
    ground: &mut GroundTruth,
) -> Result<Option<NodeId>, ProjectionError> {
    let path = spl.file_path(file).to_string();
    let source_path = source_root.join(&path);
    if !source_path.is_file() {
        return Err(ProjectionError::MissingSource { path });
    }

    let content = fs::read_to_string(&source_path).map_err(|source| ProjectionError::Io {
        path: path.clone(),
        source,
    })?;
    let source_lines: Vec<&str> = content.lines().collect();

    let wrapper = spl.annotation_root(file)?;
    let (derived_root, _) = derive_block(spl, wrapper, variant, 0)?;

    let target_path = target_root.join(&path);
    if let Some(dir) = target_path.parent() {
        fs::create_dir_all(dir).map_err(|source| ProjectionError::Io {
            path: path.clone(),
            source,
        })?;
    }
    let target = File::create(&target_path).map_err(|source| ProjectionError::Io {
        path: path.clone(),
        source,
    })?;
    let mut writer = BufWriter::new(target);

    let Some(derived_root) = derived_root else {
        debug!(path = %path, "file derives no lines for this variant");
        ground.derived_paths.push(path);
        return Ok(None);
    };

    // Copy the selected original lines into the derived file.
    for range in lines_to_copy(spl, wrapper, variant)? {
        for line in range.from()..=range.to() {
            let text = source_lines
                .get(line - 1)
                .ok_or(ProjectionError::SourceTooShort {
                    path: path.clone(),
                    line,
                })?;
            writeln!(writer, "{}", text).map_err(|source| ProjectionError::Io {
                path: path.clone(),
                source,
            })?;
        }
    }
    writer.flush().map_err(|source| ProjectionError::Io {
        path: path.clone(),
        source,
    })?;

    // Mirror the file into the variant tree and record the matching.
    let condition = spl.feature_mapping(file);
    let derived_len = derived_root.range.to();
    let variant_root = ground.variant_tree.root();
    let variant_file =
        ground
            .variant_tree
            .add_file(variant_root, path.clone(), condition, derived_len)?;
    let variant_wrapper = ground.variant_tree.annotation_root(variant_file)?;
    ground.matching.insert(wrapper, variant_wrapper)?;
    for child in derived_root.children {
        materialize(child, &mut ground.variant_tree, variant_wrapper, &mut ground.matching)?;
    }

    ground.derived_paths.push(path);
    Ok(Some(variant_file))
}

/// Projects every file of the SPL tree for the given variant.
///
/// Files are taken in depth-first order; the independent filter is applied
/// first, then the implication test on the file's presence condition. Error
/// policy follows the configuration: missing sources can be tolerated, and
/// other failures either abort the generation or are collected per file.
pub fn project_tree(
    spl: &ArtefactTree,
    variant: &Variant,
    source_root: &Path,
    target_root: &Path,
    config: &ProjectionConfig,
) -> Result<ProjectionOutcome, ProjectionError> {
    let files = spl.files();
    info!(
        variant = variant.name(),
        files = files.len(),
        "projecting variant"
    );

    let mut ground = GroundTruth::new(ArtefactTree::new(variant.name()));
    let mut failures: Vec<(String, ProjectionError)> = Vec::new();

    for file in files {
        let path = spl.file_path(file).to_string();

        if let Some(filter) = &config.filter {
            if !filter(&path) {
                debug!(path = %path, "filtered out");
                continue;
            }
        }

        let retained = match variant.is_implementing(&spl.presence_condition(file)) {
            Ok(retained) => retained,
            Err(err) => {
                let err = ProjectionError::from(err);
                if config.exit_on_error {
                    warn!(path = %path, error = %err, "aborting generation");
                    return Err(err);
                }
                warn!(path = %path, error = %err, "skipping file");
                failures.push((path, err));
                continue;
            }
        };
        if !retained {
            debug!(path = %path, "file condition not implied by selection");
            continue;
        }

        match project_file(spl, file, variant, source_root, target_root, &mut ground) {
            Ok(_) => {}
            Err(err @ ProjectionError::MissingSource { .. }) if config.ignore_missing_files => {
                debug!(path = %path, error = %err, "missing source tolerated");
            }
            Err(err) if config.exit_on_error => {
                warn!(path = %path, error = %err, "aborting generation");
                return Err(err);
            }
            Err(err) => {
                warn!(path = %path, error = %err, "skipping file");
                failures.push((path, err));
            }
        }
    }

    Ok(ProjectionOutcome {
        ground_truth: ground,
        failures,
    })
}
