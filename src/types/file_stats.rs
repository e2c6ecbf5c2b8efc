//! Per-file records flowing through the sync pipeline

use crate::config::Parameters;
use crate::store::{ObjectInfo, ObjectStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a path lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    /// A path on the local filesystem
    Local,
    /// A `bucket/key` path in the object store
    Remote,
}

impl PathKind {
    /// Separator used to build child paths of this kind.
    pub fn separator(self) -> char {
        match self {
            PathKind::Local => std::path::MAIN_SEPARATOR,
            PathKind::Remote => '/',
        }
    }
}

/// Direction of a command, computed once from the src/dest kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathsType {
    LocalRemote,
    RemoteLocal,
    RemoteRemote,
    /// Single remote path (rm)
    Remote,
}

impl PathsType {
    /// Transfer operation implied by this direction.
    pub fn operation(self) -> Operation {
        match self {
            PathsType::LocalRemote => Operation::Upload,
            PathsType::RemoteLocal => Operation::Download,
            PathsType::RemoteRemote => Operation::Copy,
            PathsType::Remote => Operation::Delete,
        }
    }
}

/// Operation to perform for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Upload,
    Download,
    Copy,
    Delete,
}

impl Operation {
    /// Lowercase name used in result lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Download => "download",
            Operation::Copy => "copy",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered file or object.
///
/// `src` and `dest` are absolute local paths or `bucket/key` strings.
/// `compare_key` is the path relative to the listing root with `/`
/// separators, so local and remote listings can be merge-joined.
///
/// Entries produced by the reverse listing of `sync` carry no operation
/// until a strategy assigns one.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStats {
    pub src: String,
    pub dest: String,
    pub compare_key: String,
    pub src_type: PathKind,
    pub dest_type: PathKind,
    pub size: Option<u64>,
    pub last_update: Option<DateTime<Utc>>,
    pub operation: Option<Operation>,
    pub remote_metadata: Option<ObjectInfo>,
}

/// A `FileStats` bound to the clients and parameters needed to act on it.
#[derive(Clone)]
pub struct FileInfo {
    pub stats: FileStats,
    /// Client for the side being written (or the only remote side)
    pub client: Arc<dyn ObjectStore>,
    /// Client for the side being read
    pub source_client: Arc<dyn ObjectStore>,
    pub is_stream: bool,
    pub parameters: Arc<Parameters>,
}

impl FileInfo {
    /// Whether the operation can succeed given the object's storage class.
    ///
    /// Objects archived in cold storage (and not restored) cannot be read,
    /// so downloads, copies, and moves out of the store would fail. Uploads
    /// and local deletes are never affected.
    pub fn is_glacier_compatible(&self) -> bool {
        let archived = self
            .stats
            .remote_metadata
            .as_ref()
            .is_some_and(|info| info.is_glacier_object());
        if !archived {
            return true;
        }

        match self.stats.operation {
            Some(Operation::Copy) | Some(Operation::Download) => false,
            _ if self.parameters.is_move && self.stats.src_type == PathKind::Remote => false,
            _ => true,
        }
    }
}

impl fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfo")
            .field("stats", &self.stats)
            .field("is_stream", &self.is_stream)
            .finish_non_exhaustive()
    }
}
