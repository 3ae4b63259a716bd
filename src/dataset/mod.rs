//! The semicolon-delimited artefact listing format.
//!
//! One row per annotation block, headed by
//! `Path;File Condition;Block Condition;Presence Condition;start;end`.
//! `start`/`end` are 1-based inclusive. A row starting at line 1 is taken as
//! the synthetic whole-file wrapper and opens the file; it must precede the
//! file's other rows. Every other row is a real directive pair whose
//! recorded `end` is the closing-directive line.
//!
//! The presence-condition column is read for well-formedness but not
//! trusted: presence conditions are recomputed from the tree on demand.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::formula::{Formula, ParseError};
use crate::tree::{AnnotationStyle, ArtefactTree, NodeId, TreeError};
use crate::types::{InvalidRange, LineRange};

/// The mandatory header row.
pub const HEADER: &str = "Path;File Condition;Block Condition;Presence Condition;start;end";

const FIELD_COUNT: usize = 6;

/// Errors from reading or writing artefact listings. Parse errors carry the
/// 1-based line number of the offending row.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO failure on artefact listing: {0}")]
    Io(#[from] io::Error),

    #[error("artefact listing is empty")]
    Empty,

    #[error("unexpected header {found:?}")]
    Header { found: String },

    #[error("line {line}: expected {FIELD_COUNT} fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("line {line}: {source}")]
    Formula {
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error("line {line}: invalid line number {value:?}")]
    LineNumber { line: usize, value: String },

    #[error("line {line}: {source}")]
    Range {
        line: usize,
        #[source]
        source: InvalidRange,
    },

    #[error("line {line}: block for {path:?} precedes its whole-file wrapper")]
    UnknownFile { line: usize, path: String },

    #[error("line {line}: duplicate whole-file wrapper for {path:?}")]
    DuplicateFile { line: usize, path: String },

    #[error("line {line}: {source}")]
    Structure {
        line: usize,
        #[source]
        source: TreeError,
    },
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Reads an artefact listing into a tree rooted at a single group node.
pub fn read_artefact_csv<R: BufRead>(reader: R) -> DatasetResult<ArtefactTree> {
    let mut lines = reader.lines();
    let header = lines.next().ok_or(DatasetError::Empty)??;
    if header.trim() != HEADER {
        return Err(DatasetError::Header { found: header });
    }

    let mut tree = ArtefactTree::new("artefacts");
    for (index, line) in lines.enumerate() {
        let line_no = index + 2;
        let raw = line?;
        if raw.trim().is_empty() {
            continue;
        }
        parse_row(&mut tree, &raw, line_no)?;
    }
    debug!(files = tree.files().len(), "artefact listing loaded");
    Ok(tree)
}

fn parse_row(tree: &mut ArtefactTree, raw: &str, line_no: usize) -> DatasetResult<()> {
    let fields: Vec<&str> = raw.split(';').collect();
    if fields.len() != FIELD_COUNT {
        return Err(DatasetError::FieldCount {
            line: line_no,
            found: fields.len(),
        });
    }

    let path = fields[0].trim();
    let file_condition = parse_formula(fields[1], line_no)?;
    let block_condition = parse_formula(fields[2], line_no)?;
    // Checked for well-formedness only; recomputed from the tree later.
    parse_formula(fields[3], line_no)?;
    let start = parse_line_number(fields[4], line_no)?;
    let end = parse_line_number(fields[5], line_no)?;
    let range = LineRange::new(start, end).map_err(|source| DatasetError::Range {
        line: line_no,
        source,
    })?;

    if start == 1 {
        // A block starting at line 1 is always the synthetic whole-file
        // wrapper, never a real directive (a directive pair and the wrapper
        // could not share a start line).
        if tree.find_file(path).is_some() {
            return Err(DatasetError::DuplicateFile {
                line: line_no,
                path: path.to_string(),
            });
        }
        tree.add_file(tree.root(), path, file_condition, end)
            .map_err(|source| DatasetError::Structure {
                line: line_no,
                source,
            })?;
        return Ok(());
    }

    let file = tree.find_file(path).ok_or_else(|| DatasetError::UnknownFile {
        line: line_no,
        path: path.to_string(),
    })?;
    tree.insert_annotation(file, block_condition, range, AnnotationStyle::Internal)
        .map_err(|source| DatasetError::Structure {
            line: line_no,
            source,
        })?;
    Ok(())
}

fn parse_formula(field: &str, line_no: usize) -> DatasetResult<Formula> {
    Formula::parse(field.trim()).map_err(|source| DatasetError::Formula {
        line: line_no,
        source,
    })
}

fn parse_line_number(field: &str, line_no: usize) -> DatasetResult<usize> {
    field
        .trim()
        .parse::<usize>()
        .map_err(|_| DatasetError::LineNumber {
            line: line_no,
            value: field.trim().to_string(),
        })
}

/// Writes the listing back out, one row per annotation node, files in
/// depth-first order and blocks in pre-order. Reading the output reproduces
/// the same row set.
pub fn write_artefact_csv<W: Write>(tree: &ArtefactTree, mut writer: W) -> DatasetResult<()> {
    writeln!(writer, "{}", HEADER)?;
    for file in tree.files() {
        let wrapper = tree
            .annotation_root(file)
            .map_err(|source| DatasetError::Structure { line: 0, source })?;
        write_block(tree, file, wrapper, &mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_block<W: Write>(
    tree: &ArtefactTree,
    file: NodeId,
    node: NodeId,
    writer: &mut W,
) -> DatasetResult<()> {
    let range = tree.annotation_range(node);
    writeln!(
        writer,
        "{};{};{};{};{};{}",
        tree.file_path(file),
        tree.feature_mapping(file),
        tree.feature_mapping(node),
        tree.presence_condition(node),
        range.from(),
        range.to(),
    )?;
    for &child in tree.children(node) {
        write_block(tree, file, child, writer)?;
    }
    Ok(())
}

/// Loads an artefact listing from disk.
pub fn load_artefact_file(path: &Path) -> DatasetResult<ArtefactTree> {
    debug!(path = %path.display(), "loading artefact listing");
    let file = File::open(path)?;
    read_artefact_csv(BufReader::new(file))
}

/// Saves an artefact listing to disk.
pub fn save_artefact_file(tree: &ArtefactTree, path: &Path) -> DatasetResult<()> {
    let file = File::create(path)?;
    write_artefact_csv(tree, BufWriter::new(file))
}
