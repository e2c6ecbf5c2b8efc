//! Core type definitions for objsync

mod error;
mod file_stats;

pub use error::SyncError;
pub use file_stats::{FileInfo, FileStats, Operation, PathKind, PathsType};
