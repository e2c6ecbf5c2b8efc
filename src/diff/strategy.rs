//! Sync strategies: per-slot rules deciding whether an entry is transferred

use crate::config::Parameters;
use crate::types::{FileStats, Operation};
use std::fmt;

/// Where a compare key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSlot {
    /// Present on both sides
    FileAtSrcAndDest,
    /// Only in the source listing
    FileNotAtDest,
    /// Only in the destination listing
    FileNotAtSrc,
}

/// A rule deciding whether to act on an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Transfer when size or modification time differ (default)
    SizeAndLastModified,
    /// Transfer only when sizes differ
    SizeOnly,
    /// Like the default, but downloads need identical timestamps
    ExactTimestamps,
    /// Always transfer files missing at the destination (default)
    MissingFile,
    /// Never act on files missing at the source (default)
    Never,
    /// Delete files missing at the source
    Delete,
}

impl SyncStrategy {
    /// Slot this strategy fills.
    pub fn slot(self) -> SyncSlot {
        match self {
            SyncStrategy::SizeAndLastModified | SyncStrategy::SizeOnly | SyncStrategy::ExactTimestamps => {
                SyncSlot::FileAtSrcAndDest
            }
            SyncStrategy::MissingFile => SyncSlot::FileNotAtDest,
            SyncStrategy::Never | SyncStrategy::Delete => SyncSlot::FileNotAtSrc,
        }
    }

    /// Command-line option that turns this strategy on.
    pub fn argument_name(self) -> Option<&'static str> {
        match self {
            SyncStrategy::SizeOnly => Some("size-only"),
            SyncStrategy::ExactTimestamps => Some("exact-timestamps"),
            SyncStrategy::Delete => Some("delete"),
            _ => None,
        }
    }

    /// Whether the user asked for this strategy.
    pub fn use_sync_strategy(self, params: &Parameters) -> bool {
        match self {
            SyncStrategy::SizeOnly => params.size_only,
            SyncStrategy::ExactTimestamps => params.exact_timestamps,
            SyncStrategy::Delete => params.delete,
            _ => false,
        }
    }

    /// Decide whether to act on an entry.
    ///
    /// `src` is `None` for destination-only entries and `dest` is `None` for
    /// source-only entries. `Delete` rewrites the destination entry's
    /// operation to `Delete`.
    pub fn determine_should_sync(self, src: Option<&FileStats>, dest: Option<&mut FileStats>) -> bool {
        match self {
            SyncStrategy::MissingFile => true,
            SyncStrategy::Never => false,
            SyncStrategy::Delete => {
                if let Some(dest) = dest {
                    tracing::debug!(path = %dest.src, "not at source, deleting");
                    dest.operation = Some(Operation::Delete);
                }
                true
            }
            SyncStrategy::SizeOnly => match (src, dest) {
                (Some(src), Some(dest)) => {
                    let should_sync = !compare_size(src, dest);
                    if should_sync {
                        tracing::debug!(src = %src.src, dest = %dest.src, "syncing, sizes differ");
                    }
                    should_sync
                }
                _ => true,
            },
            SyncStrategy::SizeAndLastModified | SyncStrategy::ExactTimestamps => match (src, dest) {
                (Some(src), Some(dest)) => {
                    let same_size = compare_size(src, dest);
                    let same_time = self.compare_time(src, dest);
                    let should_sync = !same_size || !same_time;
                    if should_sync {
                        tracing::debug!(
                            src = %src.src,
                            dest = %dest.src,
                            src_size = ?src.size,
                            dest_size = ?dest.size,
                            src_time = ?src.last_update,
                            dest_time = ?dest.last_update,
                            "syncing"
                        );
                    }
                    should_sync
                }
                _ => true,
            },
        }
    }

    /// Whether the destination counts as up to date timewise.
    ///
    /// Uploads and copies are current when the destination is not older;
    /// downloads when the local file is not newer. An unknown time is never
    /// current.
    fn compare_time(self, src: &FileStats, dest: &FileStats) -> bool {
        let (Some(src_time), Some(dest_time)) = (src.last_update, dest.last_update) else {
            return false;
        };
        match src.operation {
            Some(Operation::Download) if self == SyncStrategy::ExactTimestamps => dest_time == src_time,
            Some(Operation::Upload) | Some(Operation::Copy) => dest_time >= src_time,
            Some(Operation::Download) => dest_time <= src_time,
            _ => false,
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStrategy::SizeAndLastModified => "size_and_last_modified",
            SyncStrategy::SizeOnly => "size_only",
            SyncStrategy::ExactTimestamps => "exact_timestamps",
            SyncStrategy::MissingFile => "missing_file",
            SyncStrategy::Never => "never",
            SyncStrategy::Delete => "delete",
        };
        f.write_str(name)
    }
}

fn compare_size(src: &FileStats, dest: &FileStats) -> bool {
    src.size == dest.size
}

/// The strategy in effect for each slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStrategies {
    pub file_at_src_and_dest: SyncStrategy,
    pub file_not_at_dest: SyncStrategy,
    pub file_not_at_src: SyncStrategy,
}

impl Default for SyncStrategies {
    fn default() -> Self {
        Self {
            file_at_src_and_dest: SyncStrategy::SizeAndLastModified,
            file_not_at_dest: SyncStrategy::MissingFile,
            file_not_at_src: SyncStrategy::Never,
        }
    }
}

impl SyncStrategies {
    /// Optional strategies, in the order they may override the defaults.
    pub const REGISTRY: [SyncStrategy; 3] = [
        SyncStrategy::SizeOnly,
        SyncStrategy::ExactTimestamps,
        SyncStrategy::Delete,
    ];

    /// Start from the defaults and let every enabled strategy replace the
    /// one in its slot; later registry entries win.
    pub fn resolve(params: &Parameters) -> Self {
        let mut strategies = Self::default();
        for strategy in Self::REGISTRY {
            if strategy.use_sync_strategy(params) {
                strategies.set(strategy);
            }
        }
        tracing::debug!(?strategies, "sync strategies resolved");
        strategies
    }

    fn set(&mut self, strategy: SyncStrategy) {
        match strategy.slot() {
            SyncSlot::FileAtSrcAndDest => self.file_at_src_and_dest = strategy,
            SyncSlot::FileNotAtDest => self.file_not_at_dest = strategy,
            SyncSlot::FileNotAtSrc => self.file_not_at_src = strategy,
        }
    }
}
