//! Merge-join of the source and destination listings

use super::strategy::SyncStrategies;
use crate::types::{FileStats, SyncError};
use std::cmp::Ordering;

/// Pairs up source and destination entries by compare key and asks the
/// resolved strategies which of them to act on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Comparator {
    strategies: SyncStrategies,
}

impl Comparator {
    pub fn new(strategies: SyncStrategies) -> Self {
        Self { strategies }
    }

    /// Join two listings.
    ///
    /// Both inputs must be sorted ascending by `compare_key` in the same
    /// order; this is not checked, and unsorted input silently yields wrong
    /// decisions. The first error from either side is passed on and ends
    /// the join.
    pub fn call<S, D>(&self, src_files: S, dest_files: D) -> MergeJoin<S::IntoIter, D::IntoIter>
    where
        S: IntoIterator<Item = Result<FileStats, SyncError>>,
        D: IntoIterator<Item = Result<FileStats, SyncError>>,
    {
        MergeJoin {
            src: src_files.into_iter(),
            dest: dest_files.into_iter(),
            strategies: self.strategies,
            src_file: None,
            dest_file: None,
            src_done: false,
            dest_done: false,
            failed: false,
        }
    }
}

/// Lazy output of [`Comparator::call`]. Holds at most one entry per side.
pub struct MergeJoin<S, D> {
    src: S,
    dest: D,
    strategies: SyncStrategies,
    src_file: Option<FileStats>,
    dest_file: Option<FileStats>,
    src_done: bool,
    dest_done: bool,
    failed: bool,
}

impl<S, D> MergeJoin<S, D>
where
    S: Iterator<Item = Result<FileStats, SyncError>>,
    D: Iterator<Item = Result<FileStats, SyncError>>,
{
    fn not_at_dest(&self, src: FileStats) -> Option<FileStats> {
        self.strategies
            .file_not_at_dest
            .determine_should_sync(Some(&src), None)
            .then_some(src)
    }

    fn not_at_src(&self, mut dest: FileStats) -> Option<FileStats> {
        self.strategies
            .file_not_at_src
            .determine_should_sync(None, Some(&mut dest))
            .then_some(dest)
    }

    fn at_both(&self, src: FileStats, mut dest: FileStats) -> Option<FileStats> {
        self.strategies
            .file_at_src_and_dest
            .determine_should_sync(Some(&src), Some(&mut dest))
            .then_some(src)
    }
}

impl<S, D> Iterator for MergeJoin<S, D>
where
    S: Iterator<Item = Result<FileStats, SyncError>>,
    D: Iterator<Item = Result<FileStats, SyncError>>,
{
    type Item = Result<FileStats, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.src_file.is_none() && !self.src_done {
                match self.src.next() {
                    Some(Ok(file)) => self.src_file = Some(file),
                    Some(Err(err)) => {
                        self.failed = true;
                        return Some(Err(err));
                    }
                    None => self.src_done = true,
                }
            }
            if self.dest_file.is_none() && !self.dest_done {
                match self.dest.next() {
                    Some(Ok(file)) => self.dest_file = Some(file),
                    Some(Err(err)) => {
                        self.failed = true;
                        return Some(Err(err));
                    }
                    None => self.dest_done = true,
                }
            }

            let emitted = match (self.src_file.take(), self.dest_file.take()) {
                (Some(src), Some(dest)) => match src.compare_key.cmp(&dest.compare_key) {
                    Ordering::Equal => self.at_both(src, dest),
                    Ordering::Less => {
                        self.dest_file = Some(dest);
                        self.not_at_dest(src)
                    }
                    Ordering::Greater => {
                        self.src_file = Some(src);
                        self.not_at_src(dest)
                    }
                },
                (Some(src), None) => self.not_at_dest(src),
                (None, Some(dest)) => self.not_at_src(dest),
                (None, None) => return None,
            };

            if let Some(file) = emitted {
                return Some(Ok(file));
            }
        }
    }
}
