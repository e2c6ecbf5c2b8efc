//! Lazy local directory listing
//!
//! Directories are read one at a time, depth-first. Each directory's
//! children are sorted with directories carrying a trailing separator and
//! the separator compared as `/`, so the walk yields paths in the same
//! order an object store lists the equivalent keys.

use crate::results::{create_warning, ResultQueue};
use crate::types::SyncError;
use chrono::{DateTime, TimeZone, Utc};
use std::fs::{self, File};
use std::path::{Path, MAIN_SEPARATOR};
use std::time::{SystemTime, UNIX_EPOCH};

/// Size and modification time of one local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalStat {
    pub size: u64,
    pub last_update: DateTime<Utc>,
}

/// Depth-first iterator over the files below a root.
///
/// Entries that cannot be transferred are skipped with a warning on the
/// result queue. When symlinks are not followed, a linked directory is
/// skipped with a warning and a linked file is skipped silently.
pub struct LocalLister {
    frames: Vec<std::vec::IntoIter<String>>,
    single: Option<String>,
    follow_symlinks: bool,
    queue: Option<ResultQueue>,
}

impl LocalLister {
    /// Start a listing of `path`.
    ///
    /// # Arguments
    /// * `path` - Absolute root; a directory for `dir_op`, else a single file
    /// * `dir_op` - Walk the directory instead of stat-ing one file
    /// * `follow_symlinks` - Descend into and transfer symlink targets
    /// * `queue` - Where warnings go; dropped when `None`
    pub fn new(path: &str, dir_op: bool, follow_symlinks: bool, queue: Option<ResultQueue>) -> Self {
        let mut lister = Self {
            frames: Vec::new(),
            single: None,
            follow_symlinks,
            queue,
        };
        if lister.should_ignore(path) {
            return lister;
        }
        if dir_op {
            let mut root = path.to_string();
            if !root.ends_with(MAIN_SEPARATOR) {
                root.push(MAIN_SEPARATOR);
            }
            lister.frames.push(vec![root].into_iter());
        } else {
            lister.single = Some(path.to_string());
        }
        lister
    }

    fn warn(&self, path: &str, message: &str, skip_file: bool) {
        if let Some(queue) = &self.queue {
            queue.put(create_warning(path, message, skip_file));
        }
    }

    /// Children of `dir` as full paths, in listing order.
    fn read_sorted(&self, dir: &str) -> Result<Vec<String>, SyncError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    let shown = format!("{}{}", dir, raw.to_string_lossy());
                    self.warn(
                        &shown,
                        "Please check your locale settings. The file name could not be decoded.",
                        true,
                    );
                    continue;
                }
            };
            let mut full = format!("{}{}", dir, name);
            if self.should_ignore(&full) {
                continue;
            }
            if Path::new(&full).is_dir() {
                full.push(MAIN_SEPARATOR);
            }
            names.push(full);
        }
        sort_for_listing(&mut names);
        Ok(names)
    }

    fn should_ignore(&self, path: &str) -> bool {
        if !self.follow_symlinks {
            let trimmed = path.strip_suffix(MAIN_SEPARATOR).unwrap_or(path);
            let is_link = fs::symlink_metadata(trimmed)
                .map(|meta| meta.file_type().is_symlink())
                .unwrap_or(false);
            if is_link {
                if Path::new(trimmed).is_dir() {
                    self.warn(trimmed, "Symlinked directory is not followed.", true);
                } else {
                    tracing::debug!(path = %trimmed, "skipping symlink");
                }
                return true;
            }
        }
        self.triggers_warning(path)
    }

    fn triggers_warning(&self, path: &str) -> bool {
        let Ok(meta) = fs::metadata(path) else {
            self.warn(path, "File does not exist.", true);
            return true;
        };
        if is_special_file(&meta) {
            self.warn(
                path,
                "File is character special device, block special device, FIFO, or socket.",
                true,
            );
            return true;
        }
        if !is_readable(path, &meta) {
            self.warn(path, "File/Directory is not readable.", true);
            return true;
        }
        false
    }

    fn stat(&self, path: &str) -> Option<LocalStat> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::debug!(path, error = %err, "stat failed");
                self.triggers_warning(path);
                return None;
            }
        };
        let last_update = match meta.modified().ok().and_then(to_utc) {
            Some(time) => time,
            None => {
                self.warn(
                    path,
                    "File has an invalid timestamp. Passing epoch time as timestamp.",
                    false,
                );
                DateTime::<Utc>::from(UNIX_EPOCH)
            }
        };
        Some(LocalStat {
            size: meta.len(),
            last_update,
        })
    }
}

impl Iterator for LocalLister {
    type Item = Result<(String, LocalStat), SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(path) = self.single.take() {
            return self.stat(&path).map(|stat| Ok((path, stat)));
        }

        loop {
            let next = self.frames.last_mut()?.next();
            let Some(path) = next else {
                self.frames.pop();
                continue;
            };

            if path.ends_with(MAIN_SEPARATOR) {
                match self.read_sorted(&path) {
                    Ok(children) => self.frames.push(children.into_iter()),
                    Err(err) => return Some(Err(err)),
                }
                continue;
            }

            if let Some(stat) = self.stat(&path) {
                return Some(Ok((path, stat)));
            }
        }
    }
}

/// Sort full paths as the store would sort the equivalent keys.
pub fn sort_for_listing(paths: &mut [String]) {
    paths.sort_by_cached_key(|path| path.replace(MAIN_SEPARATOR, "/"));
}

fn to_utc(time: SystemTime) -> Option<DateTime<Utc>> {
    let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (i64::try_from(after.as_secs()).ok()?, after.subsec_nanos()),
        Err(err) => {
            let before = err.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            if before.subsec_nanos() == 0 {
                (-secs, 0)
            } else {
                (-secs - 1, 1_000_000_000 - before.subsec_nanos())
            }
        }
    };
    Utc.timestamp_opt(secs, nanos).single()
}

#[cfg(unix)]
fn is_special_file(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    let file_type = meta.file_type();
    file_type.is_char_device()
        || file_type.is_block_device()
        || file_type.is_fifo()
        || file_type.is_socket()
}

#[cfg(not(unix))]
fn is_special_file(meta: &fs::Metadata) -> bool {
    !meta.is_file() && !meta.is_dir()
}

fn is_readable(path: &str, meta: &fs::Metadata) -> bool {
    if meta.is_dir() {
        fs::read_dir(path).is_ok()
    } else {
        File::open(path).is_ok()
    }
}
