//! Validated parameters of one command

use crate::filter::FilterPattern;
use crate::paths::{split_bucket_key, PathFormatter, REMOTE_PREFIX};
use crate::types::{Operation, PathKind, PathsType, SyncError};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Marks stdin (as source) or stdout (as destination).
pub const STREAM_PATH: &str = "-";

/// Default number of keys requested per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// The four commands served by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Cp,
    Mv,
    Rm,
    Sync,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Cp => "cp",
            Command::Mv => "mv",
            Command::Rm => "rm",
            Command::Sync => "sync",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission half of a `permission=grantee` grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantPermission {
    Read,
    ReadAcp,
    WriteAcp,
    FullControl,
}

/// An access grant such as `read=uri=http://acs.example/groups/AllUsers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub permission: GrantPermission,
    pub grantee: String,
}

impl FromStr for Grant {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let Some((permission, grantee)) = raw.split_once('=') else {
            return Err(SyncError::Validation(
                "grants should be of the form permission=principal".to_string(),
            ));
        };
        let permission = match permission {
            "read" => GrantPermission::Read,
            "readacl" => GrantPermission::ReadAcp,
            "writeacl" => GrantPermission::WriteAcp,
            "full" => GrantPermission::FullControl,
            _ => {
                return Err(SyncError::Validation(
                    "permission must be one of: read|readacl|writeacl|full".to_string(),
                ))
            }
        };
        Ok(Grant {
            permission,
            grantee: grantee.to_string(),
        })
    }
}

/// Options forwarded to store requests. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub acl: Option<String>,
    pub grants: Vec<Grant>,
    pub storage_class: Option<String>,
    pub website_redirect: Option<String>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub expires: Option<String>,
    /// Server-side encryption with store-managed keys (`AES256`, `aws:kms`)
    pub sse: Option<String>,
    pub sse_kms_key_id: Option<String>,
    /// Customer-provided key algorithm for the object being written or read
    pub sse_c: Option<String>,
    pub sse_c_key: Option<String>,
    /// Customer-provided key of the copy source
    pub sse_c_copy_source: Option<String>,
    pub sse_c_copy_source_key: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub metadata_directive: Option<String>,
    pub request_payer: Option<String>,
}

/// User-facing switches of a command, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub recursive: bool,
    pub delete: bool,
    pub exact_timestamps: bool,
    pub size_only: bool,
    pub follow_symlinks: bool,
    pub only_show_errors: bool,
    pub quiet: bool,
    pub no_progress: bool,
    pub page_size: usize,
    pub dryrun: bool,
    pub filters: Vec<FilterPattern>,
    pub expected_size: Option<u64>,
    pub force_glacier_transfer: bool,
    pub ignore_glacier_warnings: bool,
    pub guess_mime_type: bool,
    pub request: RequestOptions,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            delete: false,
            exact_timestamps: false,
            size_only: false,
            follow_symlinks: true,
            only_show_errors: false,
            quiet: false,
            no_progress: false,
            page_size: DEFAULT_PAGE_SIZE,
            dryrun: false,
            filters: Vec::new(),
            expected_size: None,
            force_glacier_transfer: false,
            ignore_glacier_warnings: false,
            guess_mime_type: true,
            request: RequestOptions::default(),
        }
    }
}

/// Validated, normalized parameters shared by every stage of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub command: Command,

    /// Source path as given (remote paths keep their `s3://` prefix)
    pub src: String,

    /// Destination path; equals `src` for `rm`
    pub dest: String,

    /// Direction of the command, computed once
    pub paths_type: PathsType,

    /// Recursive command or `sync`
    pub dir_op: bool,

    /// Remove destination files missing from the source (`sync --delete`)
    pub delete: bool,

    pub exact_timestamps: bool,
    pub size_only: bool,
    pub follow_symlinks: bool,

    /// Only set by `mv`
    pub is_move: bool,

    /// Source or destination is `-`
    pub is_stream: bool,

    pub only_show_errors: bool,
    pub quiet: bool,
    pub no_progress: bool,
    pub page_size: usize,
    pub dryrun: bool,

    /// Include/exclude patterns in declaration order
    pub filters: Vec<FilterPattern>,

    /// Size of a stdin upload, when known
    pub expected_size: Option<u64>,

    pub force_glacier_transfer: bool,
    pub ignore_glacier_warnings: bool,
    pub guess_mime_type: bool,
    pub request: RequestOptions,
}

impl Parameters {
    /// Validate a command invocation.
    ///
    /// # Arguments
    /// * `command` - Which command is being run
    /// * `src` - Source path (`s3://bucket/key`, a local path, or `-`)
    /// * `dest` - Destination path; `rm` takes none
    /// * `options` - Remaining switches
    ///
    /// # Errors
    /// * `SyncError::Validation` for path combinations the command rejects
    /// * `SyncError::Io` when the download target directory cannot be created
    pub fn new(
        command: Command,
        src: &str,
        dest: Option<&str>,
        options: SyncOptions,
    ) -> Result<Parameters, SyncError> {
        let src = normalize_bucket_root(src);
        let dest = match (command, dest) {
            (Command::Rm, _) => src.clone(),
            (_, Some(dest)) => normalize_bucket_root(dest),
            (_, None) => {
                return Err(SyncError::Validation(format!(
                    "the {} command requires a source and a destination",
                    command
                )))
            }
        };

        let is_stream = src == STREAM_PATH || dest == STREAM_PATH;
        if is_stream && (command != Command::Cp || options.recursive) {
            return Err(SyncError::Validation(
                "Streaming currently is only compatible with non-recursive cp commands".to_string(),
            ));
        }

        let paths_type = paths_type_for(command, &src, &dest)?;
        let dir_op = command == Command::Sync || options.recursive;

        let params = Parameters {
            command,
            src,
            dest,
            paths_type,
            dir_op,
            delete: options.delete,
            exact_timestamps: options.exact_timestamps,
            size_only: options.size_only,
            follow_symlinks: options.follow_symlinks,
            is_move: command == Command::Mv,
            is_stream,
            only_show_errors: options.only_show_errors || is_stream,
            quiet: options.quiet,
            no_progress: options.no_progress,
            page_size: options.page_size.max(1),
            dryrun: options.dryrun,
            filters: options.filters,
            expected_size: options.expected_size,
            force_glacier_transfer: options.force_glacier_transfer,
            ignore_glacier_warnings: options.ignore_glacier_warnings,
            guess_mime_type: options.guess_mime_type,
            request: options.request,
        };

        params.validate_same_path()?;
        params.validate_local_source()?;
        params.create_download_root()?;
        Ok(params)
    }

    /// Operation implied by the command's direction.
    pub fn operation(&self) -> Operation {
        self.paths_type.operation()
    }

    pub fn is_sync(&self) -> bool {
        self.command == Command::Sync
    }

    fn validate_same_path(&self) -> Result<(), SyncError> {
        if !self.is_move || self.paths_type != PathsType::RemoteRemote {
            return Ok(());
        }
        let same = self.src == self.dest
            || (self.dest.ends_with('/')
                && format!("{}{}", self.dest, basename(&self.src)) == self.src);
        if same {
            return Err(SyncError::Validation(format!(
                "Cannot mv a file onto itself: {} - {}",
                self.src, self.dest
            )));
        }
        Ok(())
    }

    fn validate_local_source(&self) -> Result<(), SyncError> {
        if self.paths_type == PathsType::LocalRemote
            && !self.is_stream
            && !Path::new(&self.src).exists()
        {
            return Err(SyncError::Validation(format!(
                "The user-provided path {} does not exist.",
                self.src
            )));
        }
        Ok(())
    }

    /// Downloads of a whole prefix create their target directory up front.
    fn create_download_root(&self) -> Result<(), SyncError> {
        if self.paths_type != PathsType::RemoteLocal || !self.dir_op || self.is_stream {
            return Ok(());
        }
        let dest = Path::new(&self.dest);
        if !dest.exists() {
            tracing::debug!(path = %dest.display(), "creating download directory");
            fs::create_dir_all(dest)?;
        }
        Ok(())
    }
}

/// `s3://bucket` means the bucket root, written `s3://bucket/`.
fn normalize_bucket_root(path: &str) -> String {
    if path.starts_with(REMOTE_PREFIX) {
        let (_, key) = split_bucket_key(path);
        if key.is_empty() && !path.ends_with('/') {
            return format!("{}/", path);
        }
    }
    path.to_string()
}

fn paths_type_for(command: Command, src: &str, dest: &str) -> Result<PathsType, SyncError> {
    let (src_kind, _) = PathFormatter::identify_type(src);
    let (dest_kind, _) = PathFormatter::identify_type(dest);

    if command == Command::Rm {
        if src_kind != PathKind::Remote {
            return Err(SyncError::Validation(format!(
                "rm only operates on remote paths, got {}",
                src
            )));
        }
        return Ok(PathsType::Remote);
    }

    match (src_kind, dest_kind) {
        (PathKind::Local, PathKind::Remote) => Ok(PathsType::LocalRemote),
        (PathKind::Remote, PathKind::Local) => Ok(PathsType::RemoteLocal),
        (PathKind::Remote, PathKind::Remote) => Ok(PathsType::RemoteRemote),
        (PathKind::Local, PathKind::Local) => Err(SyncError::Validation(format!(
            "Cannot {} between two local paths: {} - {}",
            command, src, dest
        ))),
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts() -> SyncOptions {
        SyncOptions::default()
    }

    fn recursive() -> SyncOptions {
        SyncOptions {
            recursive: true,
            ..SyncOptions::default()
        }
    }

    #[test]
    fn test_bucket_root_gets_trailing_slash() {
        let params = Parameters::new(Command::Cp, "s3://bucket", Some("s3://other/x"), opts())
            .expect("valid copy");
        assert_eq!(params.src, "s3://bucket/");
        assert_eq!(params.dest, "s3://other/x");
        assert_eq!(params.paths_type, PathsType::RemoteRemote);
    }

    #[test]
    fn test_sync_is_always_dir_op() {
        let params = Parameters::new(Command::Sync, "s3://a/", Some("s3://b/"), opts())
            .expect("valid sync");
        assert!(params.dir_op);
        assert!(params.is_sync());
        assert!(!params.is_move);
    }

    #[test]
    fn test_only_mv_sets_is_move() {
        let mv = Parameters::new(Command::Mv, "s3://a/k", Some("s3://b/k"), opts()).expect("mv");
        let cp = Parameters::new(Command::Cp, "s3://a/k", Some("s3://b/k"), opts()).expect("cp");
        assert!(mv.is_move);
        assert!(!cp.is_move);
    }

    #[test]
    fn test_rm_uses_src_as_dest() {
        let params = Parameters::new(Command::Rm, "s3://bucket/key", None, recursive())
            .expect("valid rm");
        assert_eq!(params.dest, params.src);
        assert_eq!(params.paths_type, PathsType::Remote);
        assert_eq!(params.operation(), Operation::Delete);
    }

    #[test]
    fn test_rm_rejects_local_path() {
        let err = Parameters::new(Command::Rm, "./local", None, opts()).expect_err("local rm");
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_local_to_local_rejected() {
        let temp = TempDir::new().expect("create temp dir");
        let src = temp.path().to_string_lossy().into_owned();
        let err = Parameters::new(Command::Cp, &src, Some("./elsewhere"), opts())
            .expect_err("local to local");
        assert!(err.to_string().contains("two local paths"));
    }

    #[test]
    fn test_mv_onto_itself_rejected() {
        let err = Parameters::new(Command::Mv, "s3://b/k", Some("s3://b/k"), opts())
            .expect_err("same key");
        assert_eq!(err.to_string(), "Cannot mv a file onto itself: s3://b/k - s3://b/k");

        let err = Parameters::new(Command::Mv, "s3://b/dir/k", Some("s3://b/dir/"), opts())
            .expect_err("same key via prefix");
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_missing_upload_source_rejected() {
        let temp = TempDir::new().expect("create temp dir");
        let missing = temp.path().join("nope.txt").to_string_lossy().into_owned();
        let err = Parameters::new(Command::Cp, &missing, Some("s3://b/"), opts())
            .expect_err("missing source");
        assert_eq!(
            err.to_string(),
            format!("The user-provided path {} does not exist.", missing)
        );
    }

    #[test]
    fn test_streams_only_for_plain_cp() {
        let params = Parameters::new(Command::Cp, "-", Some("s3://b/k"), opts()).expect("stdin");
        assert!(params.is_stream);
        assert!(params.only_show_errors);
        assert_eq!(params.paths_type, PathsType::LocalRemote);

        assert!(Parameters::new(Command::Mv, "-", Some("s3://b/k"), opts()).is_err());
        assert!(Parameters::new(Command::Cp, "s3://b/k", Some("-"), recursive()).is_err());
    }

    #[test]
    fn test_recursive_download_creates_target_directory() {
        let temp = TempDir::new().expect("create temp dir");
        let target = temp.path().join("nested").join("out");
        let dest = target.to_string_lossy().into_owned();

        Parameters::new(Command::Cp, "s3://b/prefix/", Some(&dest), recursive())
            .expect("valid download");
        assert!(target.is_dir());
    }

    #[test]
    fn test_grant_parsing() {
        let grant: Grant = "readacl=id=abc".parse().expect("grant parses");
        assert_eq!(grant.permission, GrantPermission::ReadAcp);
        assert_eq!(grant.grantee, "id=abc");

        let err = "read".parse::<Grant>().expect_err("no separator");
        assert_eq!(err.to_string(), "grants should be of the form permission=principal");
        let err = "write=id=abc".parse::<Grant>().expect_err("bad permission");
        assert_eq!(err.to_string(), "permission must be one of: read|readacl|writeacl|full");
    }

    #[test]
    fn test_defaults() {
        let defaults = SyncOptions::default();
        assert!(defaults.follow_symlinks);
        assert!(defaults.guess_mime_type);
        assert_eq!(defaults.page_size, DEFAULT_PAGE_SIZE);
    }
}
