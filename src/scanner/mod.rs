//! File discovery
//!
//! [`FileGenerator`] turns the roots of a command into a lazy stream of
//! [`FileStats`], listing the local tree or the remote prefix in ascending
//! compare-key order.

mod local;
mod remote;

pub use local::{sort_for_listing, LocalLister, LocalStat};
pub use remote::{list_objects, BucketLister, RemoteEntry};

use crate::paths::{find_dest_path_comp_key, FormattedPaths};
use crate::results::ResultQueue;
use crate::store::ObjectStore;
use crate::types::{FileStats, Operation, PathKind, SyncError};
use std::sync::Arc;

/// Lazy stream of discovered entries. An `Err` aborts the command.
pub type StatsStream = Box<dyn Iterator<Item = Result<FileStats, SyncError>>>;

/// Lists one side of a command.
pub struct FileGenerator {
    client: Arc<dyn ObjectStore>,
    operation: Option<Operation>,
    follow_symlinks: bool,
    page_size: usize,
    queue: Option<ResultQueue>,
}

impl FileGenerator {
    /// # Arguments
    /// * `client` - Store to list remote paths with
    /// * `operation` - Stamped on every entry; `None` for the reverse listing of `sync`
    /// * `follow_symlinks` - Descend into and transfer symlink targets
    /// * `page_size` - Keys per listing page
    /// * `queue` - Where skip warnings go
    pub fn new(
        client: Arc<dyn ObjectStore>,
        operation: Option<Operation>,
        follow_symlinks: bool,
        page_size: usize,
        queue: Option<ResultQueue>,
    ) -> Self {
        Self {
            client,
            operation,
            follow_symlinks,
            page_size,
            queue,
        }
    }

    /// List `files.src` and derive each entry's destination and compare key.
    pub fn call(&self, files: &FormattedPaths) -> StatsStream {
        let operation = self.operation;
        let src_type = files.src.kind;
        let dest_type = files.dest.kind;

        match src_type {
            PathKind::Local => {
                let lister = LocalLister::new(
                    &files.src.path,
                    files.dir_op,
                    self.follow_symlinks,
                    self.queue.clone(),
                );
                let files = files.clone();
                Box::new(lister.map(move |entry| {
                    let (src, stat) = entry?;
                    let (dest, compare_key) = find_dest_path_comp_key(&files, &src);
                    Ok(FileStats {
                        src,
                        dest,
                        compare_key,
                        src_type,
                        dest_type,
                        size: Some(stat.size),
                        last_update: Some(stat.last_update),
                        operation,
                        remote_metadata: None,
                    })
                }))
            }
            PathKind::Remote => {
                let listing = list_objects(
                    Arc::clone(&self.client),
                    &files.src.path,
                    files.dir_op,
                    operation,
                    self.page_size,
                );
                let files = files.clone();
                Box::new(listing.map(move |entry| {
                    let entry = entry?;
                    let (dest, compare_key) = find_dest_path_comp_key(&files, &entry.path);
                    Ok(FileStats {
                        src: entry.path,
                        dest,
                        compare_key,
                        src_type,
                        dest_type,
                        size: entry.size,
                        last_update: entry.last_update,
                        operation,
                        remote_metadata: entry.info,
                    })
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathInfo;
    use crate::store::{MemoryObjectStore, SeedObject};
    use std::fs;
    use std::path::MAIN_SEPARATOR;
    use tempfile::TempDir;

    #[test]
    fn test_local_upload_entries() {
        let temp = TempDir::new().expect("create temp dir");
        fs::create_dir(temp.path().join("sub")).expect("create sub");
        fs::write(temp.path().join("sub").join("a.txt"), b"abc").expect("write a.txt");

        let files = FormattedPaths {
            src: PathInfo {
                path: format!("{}{}", temp.path().display(), MAIN_SEPARATOR),
                kind: PathKind::Local,
            },
            dest: PathInfo {
                path: "bucket/prefix/".to_string(),
                kind: PathKind::Remote,
            },
            dir_op: true,
            use_src_name: true,
        };
        let generator = FileGenerator::new(
            Arc::new(MemoryObjectStore::new()),
            Some(Operation::Upload),
            true,
            1000,
            None,
        );
        let entries: Vec<FileStats> = generator
            .call(&files)
            .map(|e| e.expect("entry"))
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].compare_key, "sub/a.txt");
        assert_eq!(entries[0].dest, "bucket/prefix/sub/a.txt");
        assert_eq!(entries[0].size, Some(3));
        assert_eq!(entries[0].operation, Some(Operation::Upload));
        assert!(entries[0].last_update.is_some());
    }

    #[test]
    fn test_remote_reverse_listing_has_no_operation() {
        let store = MemoryObjectStore::new();
        store.seed("bucket", "p/x", SeedObject::new(b"x".to_vec()));
        let files = FormattedPaths {
            src: PathInfo {
                path: "bucket/p/".to_string(),
                kind: PathKind::Remote,
            },
            dest: PathInfo {
                path: "/tmp/out/".to_string(),
                kind: PathKind::Local,
            },
            dir_op: true,
            use_src_name: true,
        };
        let entries: Vec<FileStats> = FileGenerator::new(Arc::new(store), None, true, 1000, None)
            .call(&files)
            .map(|e| e.expect("entry"))
            .collect();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].compare_key, "x");
        assert_eq!(entries[0].operation, None);
        assert!(entries[0].remote_metadata.is_some());
    }
}
