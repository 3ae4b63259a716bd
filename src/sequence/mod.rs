//! Sequence extraction: assembling unordered parent→child commit pairs into
//! maximal continuous chains.
//!
//! Two reconstructions are provided. [`domino_sort`] works from bare
//! [`EvolutionStep`]s: it grows chains by matching each step onto a chain's
//! tail, then welds chains whose endpoints meet until no weld is possible.
//! [`longest_non_overlapping`] works from [`StudyCommit`]s with parent
//! information: it enumerates every simple path from each sequence start and
//! keeps the longest ones, stripping prefixes already claimed by a longer
//! sequence.
//!
//! Only single-parent commits extend a chain; history roots, merge commits,
//! and commits whose parent was not analyzed always start new sequences.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::types::{CommitId, EvolutionStep, Evict, StudyCommit};


/// Errors from sequence construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// A sequence needs at least two commits to contain a step.
    #[error("a sequence needs at least two commits, got {len}")]
    TooShort { len: usize },

    /// A sequence referenced a commit the caller did not supply.
    #[error("sequence references unknown commit {id}")]
    UnknownCommit { id: CommitId },
}

/// A maximal ordered commit list; consecutive elements form evolution steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    commits: Vec<CommitId>,
}

impl Sequence {
    /// Creates a sequence from at least two commits.
    pub fn new(commits: Vec<CommitId>) -> Result<Self, SequenceError> {
        if commits.len() < 2 {
            return Err(SequenceError::TooShort {
                len: commits.len(),
            });
        }
        Ok(Sequence { commits })
    }

    /// Internal constructor for chains the algorithms have already sized.
    fn from_chain(commits: Vec<CommitId>) -> Self {
        debug_assert!(commits.len() >= 2);
        Sequence { commits }
    }

    pub fn commits(&self) -> &[CommitId] {
        &self.commits
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn first(&self) -> &CommitId {
        &self.commits[0]
    }

    pub fn last(&self) -> &CommitId {
        &self.commits[self.commits.len() - 1]
    }

    /// The evolution steps formed by consecutive commits.
    pub fn steps(&self) -> impl Iterator<Item = EvolutionStep> + '_ {
        self.commits
            .windows(2)
            .map(|pair| EvolutionStep::new(pair[0].clone(), pair[1].clone()))
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, commit) in self.commits.iter().enumerate() {
            if index > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", commit.short())?;
        }
        Ok(())
    }
}

/// Reconstructs maximal chains from unordered evolution steps.
///
/// Pass 1 pushes each step's child onto a chain currently topped by its
/// parent, or starts a fresh two-commit chain. Pass 2 welds chains whose
/// last and first commits coincide until no weld remains; every weld
/// removes one chain, so the pass terminates.
pub fn domino_sort(steps: impl IntoIterator<Item = EvolutionStep>) -> Vec<Sequence> {
    let mut chains: Vec<Vec<CommitId>> = Vec::new();
    for EvolutionStep { parent, child } in steps {
        match chains.iter_mut().find(|chain| chain.last() == Some(&parent)) {
            Some(chain) => chain.push(child),
            None => chains.push(vec![parent, child]),
        }
    }
    weld(&mut chains);
    debug!(chains = chains.len(), "domino sort complete");
    chains.into_iter().map(Sequence::from_chain).collect()
}

fn weld(chains: &mut Vec<Vec<CommitId>>) {
    while let Some((into, from)) = find_weld(chains) {
        let absorbed = chains.remove(from);
        let target = if from < into { into - 1 } else { into };
        // The shared commit appears in both chains; keep one copy.
        chains[target].extend(absorbed.into_iter().skip(1));
    }
}

fn find_weld(chains: &[Vec<CommitId>]) -> Option<(usize, usize)> {
    for (i, left) in chains.iter().enumerate() {
        for (j, right) in chains.iter().enumerate() {
            if i != j && left.last() == right.first() {
                return Some((i, j));
            }
        }
    }
    None
}

/// Extracts the longest non-overlapping sequences from analyzed commits.
///
/// Sequence starts are commits with zero or multiple parents, or whose
/// single parent is not among `commits`. Every simple path from a start is
/// a candidate; candidates are taken longest first (equal lengths ordered
/// by their commit ids, so the result is deterministic), each candidate
/// loses the leading commits a longer sequence already claimed, and
/// anything shrinking below two commits is dropped.
pub fn longest_non_overlapping(commits: &[StudyCommit]) -> Vec<Sequence> {
    let known: HashSet<&CommitId> = commits.iter().map(|commit| &commit.id).collect();
    let mut children: BTreeMap<CommitId, Vec<CommitId>> = BTreeMap::new();
    let mut starts: Vec<CommitId> = Vec::new();

    for commit in commits {
        match commit.parents.as_slice() {
            [parent] if known.contains(parent) => children
                .entry(parent.clone())
                .or_default()
                .push(commit.id.clone()),
            // Roots, merges, and commits with an unanalyzed parent.
            _ => starts.push(commit.id.clone()),
        }
    }
    for list in children.values_mut() {
        list.sort();
    }
    starts.sort();

    let mut candidates: Vec<Vec<CommitId>> = Vec::new();
    let mut prefix = Vec::new();
    for start in &starts {
        collect_paths(start, &children, &mut prefix, &mut candidates);
    }
    candidates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut claimed: HashSet<CommitId> = HashSet::new();
    let mut sequences = Vec::new();
    for mut candidate in candidates {
        // Commits of this candidate already claimed by a longer sequence
        // always form a leading run (paths only ever share prefixes).
        let first_unclaimed = candidate
            .iter()
            .position(|id| !claimed.contains(id))
            .unwrap_or(candidate.len());
        let tail = candidate.split_off(first_unclaimed);
        if tail.len() < 2 {
            continue;
        }
        claimed.extend(tail.iter().cloned());
        sequences.push(Sequence::from_chain(tail));
    }
    debug!(
        starts = starts.len(),
        sequences = sequences.len(),
        "longest-non-overlapping extraction complete"
    );
    sequences
}

/// Records every root-to-leaf path below `node` into `out`.
fn collect_paths(
    node: &CommitId,
    children: &BTreeMap<CommitId, Vec<CommitId>>,
    prefix: &mut Vec<CommitId>,
    out: &mut Vec<Vec<CommitId>>,
) {
    prefix.push(node.clone());
    match children.get(node) {
        Some(kids) if !kids.is_empty() => {
            for kid in kids {
                collect_paths(kid, children, prefix, out);
            }
        }
        _ => out.push(prefix.clone()),
    }
    prefix.pop();
}

/// Arranges owned commits into the chain layout consumed by
/// [`CleaningIter`]. The sequences must be pairwise disjoint; a commit
/// missing from `commits` (or claimed twice) is an error.
pub fn chain_commits(
    sequences: &[Sequence],
    commits: impl IntoIterator<Item = StudyCommit>,
) -> Result<Vec<Vec<StudyCommit>>, SequenceError> {
    let mut by_id: HashMap<CommitId, StudyCommit> = commits
        .into_iter()
        .map(|commit| (commit.id.clone(), commit))
        .collect();
    let mut chains = Vec::with_capacity(sequences.len());
    for sequence in sequences {
        let mut chain = Vec::with_capacity(sequence.len());
        for id in sequence.commits() {
            let commit = by_id
                .remove(id)
                .ok_or_else(|| SequenceError::UnknownCommit { id: id.clone() })?;
            chain.push(commit);
        }
        chains.push(chain);
    }
    Ok(chains)
}

/// Consume-once walk over chains of evictable items.
///
/// `next_step` yields consecutive (parent, child) links chain by chain. The
/// stack-of-stacks layout identifies items that will never be referenced
/// again without extra bookkeeping: once a link has been stepped past its
/// parent is unreachable and its caches are released; at the end of a chain
/// the final item is released too. Chains shorter than two items contain no
/// link and are released wholesale when reached.
pub struct CleaningIter<T: Evict> {
    chains: Vec<Vec<T>>,
    chain: usize,
    pos: usize,
    started: bool,
}

impl<T: Evict> CleaningIter<T> {
    pub fn new(chains: Vec<Vec<T>>) -> Self {
        CleaningIter {
            chains,
            chain: 0,
            pos: 0,
            started: false,
        }
    }

    /// The next (parent, child) link, releasing items that became
    /// unreachable since the previous call.
    ///
    /// Not a [`std::iter::Iterator`]: the yielded borrows point into the
    /// iterator itself and must be dropped before the next call.
    pub fn next_step(&mut self) -> Option<(&mut T, &mut T)> {
        if self.started {
            self.step_past();
        } else {
            self.started = true;
            self.skip_linkless_chains();
        }
        if self.chain >= self.chains.len() {
            return None;
        }
        let pos = self.pos;
        let (left, right) = self.chains[self.chain].split_at_mut(pos + 1);
        Some((&mut left[pos], &mut right[0]))
    }

    /// Consumes the current link: its parent is now unreachable, and at the
    /// chain's end so is the final item.
    fn step_past(&mut self) {
        if self.chain >= self.chains.len() {
            return;
        }
        self.chains[self.chain][self.pos].evict();
        self.pos += 1;
        if self.pos + 1 >= self.chains[self.chain].len() {
            self.chains[self.chain][self.pos].evict();
            self.chain += 1;
            self.pos = 0;
            self.skip_linkless_chains();
        }
    }

    fn skip_linkless_chains(&mut self) {
        while self.chain < self.chains.len() && self.chains[self.chain].len() < 2 {
            for item in &mut self.chains[self.chain] {
                item.evict();
            }
            self.chain += 1;
        }
    }
}
