//! Path classification and formatting
//!
//! Local paths are made absolute (without resolving symlinks) and remote
//! paths are kept as `bucket/key`. Whether a destination takes the source's
//! name is decided once here; every discovered file then derives its own
//! destination and compare key with [`find_dest_path_comp_key`].

use crate::types::{PathKind, SyncError};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

/// Prefix that marks a remote path on the command line.
pub const REMOTE_PREFIX: &str = "s3://";

/// A classified, normalized path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    pub path: String,
    pub kind: PathKind,
}

/// Source and destination roots for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPaths {
    pub src: PathInfo,
    pub dest: PathInfo,
    pub dir_op: bool,
    /// Destination paths are built from the source's relative path
    pub use_src_name: bool,
}

impl FormattedPaths {
    /// Roots swapped, for listing the destination of a sync.
    pub fn reversed(&self) -> FormattedPaths {
        FormattedPaths {
            src: self.dest.clone(),
            dest: self.src.clone(),
            dir_op: self.dir_op,
            use_src_name: self.use_src_name,
        }
    }
}

/// Normalizes command-line paths.
pub struct PathFormatter;

impl PathFormatter {
    /// Split off the remote prefix, if any.
    pub fn identify_type(path: &str) -> (PathKind, String) {
        match path.strip_prefix(REMOTE_PREFIX) {
            Some(rest) => (PathKind::Remote, rest.to_string()),
            None => (PathKind::Local, path.to_string()),
        }
    }

    /// Format both roots of a command.
    ///
    /// Only the destination decides `use_src_name`; the source is
    /// normalized the same way so its root ends in a separator for
    /// directory operations.
    pub fn format(src: &str, dest: &str, dir_op: bool) -> Result<FormattedPaths, SyncError> {
        let (src_kind, src_path) = Self::identify_type(src);
        let (dest_kind, dest_path) = Self::identify_type(dest);

        let (src_path, _) = Self::format_path(src_kind, &src_path, dir_op)?;
        let (dest_path, use_src_name) = Self::format_path(dest_kind, &dest_path, dir_op)?;

        Ok(FormattedPaths {
            src: PathInfo {
                path: src_path,
                kind: src_kind,
            },
            dest: PathInfo {
                path: dest_path,
                kind: dest_kind,
            },
            dir_op,
            use_src_name,
        })
    }

    fn format_path(kind: PathKind, path: &str, dir_op: bool) -> Result<(String, bool), SyncError> {
        match kind {
            PathKind::Local => Self::local_format(path, dir_op),
            PathKind::Remote => Ok(Self::remote_format(path, dir_op)),
        }
    }

    /// Absolute local path plus whether it names a directory.
    ///
    /// Existing directories, directory operations, and paths written with a
    /// trailing separator all take the source name (and get a trailing
    /// separator); anything else is a literal file path.
    pub fn local_format(path: &str, dir_op: bool) -> Result<(String, bool), SyncError> {
        let mut full_path = absolute_path(Path::new(path))?
            .to_string_lossy()
            .into_owned();
        let names_dir = dir_op || Path::new(&full_path).is_dir() || ends_with_separator(path);
        if names_dir {
            if !full_path.ends_with(MAIN_SEPARATOR) {
                full_path.push(MAIN_SEPARATOR);
            }
            return Ok((full_path, true));
        }
        Ok((full_path, false))
    }

    /// Remote path plus whether it names a prefix.
    pub fn remote_format(path: &str, dir_op: bool) -> (String, bool) {
        if dir_op {
            let mut path = path.to_string();
            if !path.ends_with('/') {
                path.push('/');
            }
            return (path, true);
        }
        (path.to_string(), path.ends_with('/'))
    }
}

/// Destination path and compare key for a discovered source path.
///
/// # Arguments
/// * `files` - Formatted roots of the command
/// * `src_path` - Full source path as produced by the listing
///
/// # Returns
/// `(dest_path, compare_key)`; the compare key always uses `/`.
pub fn find_dest_path_comp_key(files: &FormattedPaths, src_path: &str) -> (String, String) {
    let src_sep = files.src.kind.separator();
    let dest_sep = files.dest.kind.separator();

    let rel_path = if files.dir_op {
        src_path
            .strip_prefix(files.src.path.as_str())
            .unwrap_or(src_path)
            .to_string()
    } else {
        src_path.rsplit(src_sep).next().unwrap_or(src_path).to_string()
    };

    let compare_key = rel_path.replace(src_sep, "/");
    let dest_path = if files.use_src_name {
        format!("{}{}", files.dest.path, rel_path.replace(src_sep, &dest_sep.to_string()))
    } else {
        files.dest.path.clone()
    };
    (dest_path, compare_key)
}

/// `bucket/a/b` into `("bucket", "a/b")`.
pub fn split_bucket_key(path: &str) -> (String, String) {
    let path = path.strip_prefix(REMOTE_PREFIX).unwrap_or(path);
    match path.split_once('/') {
        Some((bucket, key)) => (bucket.to_string(), key.to_string()),
        None => (path.to_string(), String::new()),
    }
}

/// `bucket/key` as `s3://bucket/key`.
pub fn format_remote_path(path: &str) -> String {
    format!("{}{}", REMOTE_PREFIX, path)
}

/// Display form of a local path, relative to the working directory.
///
/// The directory part is made relative and the file name kept, so a file in
/// the working directory reads `./name`. Falls back to the path as given
/// when no relative form exists (another drive, unknown cwd).
pub fn relative_path(path: &str) -> String {
    let Ok(cwd) = std::env::current_dir() else {
        return path.to_string();
    };
    let Ok(absolute) = absolute_path(Path::new(path)) else {
        return path.to_string();
    };
    let (Some(dir), Some(name)) = (absolute.parent(), absolute.file_name()) else {
        return path.to_string();
    };

    match relative_to(dir, &normalize(&cwd)) {
        Some(rel) => {
            let rel = if rel.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                rel
            };
            rel.join(name).to_string_lossy().into_owned()
        }
        None => path.to_string(),
    }
}

/// Absolute, lexically normalized path (`.` and `..` removed, symlinks kept).
pub fn absolute_path(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize(&joined))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(out.components().next_back(), Some(Component::RootDir | Component::Prefix(_)) | None) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn relative_to(target: &Path, base: &Path) -> Option<PathBuf> {
    let target: Vec<Component> = target.components().collect();
    let base: Vec<Component> = base.components().collect();
    if target.first() != base.first() {
        return None;
    }
    let common = target
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base.len() {
        rel.push("..");
    }
    for component in &target[common..] {
        rel.push(component.as_os_str());
    }
    Some(rel)
}

fn ends_with_separator(path: &str) -> bool {
    path.ends_with(MAIN_SEPARATOR) || path.ends_with('/')
}
