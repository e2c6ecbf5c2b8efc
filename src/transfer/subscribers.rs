//! Subscribers attached to transfers by the request submitters

use super::{DataSink, DataSource, Subscriber, TransferError, TransferMeta, TransferOutcome, TransferRequest};
use crate::results::{create_warning, ResultQueue, ResultRecord, TransferTarget};
use crate::store::ObjectStore;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Tells the transfer its size up front.
pub struct ProvideSizeSubscriber {
    size: u64,
}

impl ProvideSizeSubscriber {
    pub fn new(size: u64) -> Self {
        Self { size }
    }
}

impl Subscriber for ProvideSizeSubscriber {
    fn on_queued(&self, meta: &mut TransferMeta) -> Result<(), TransferError> {
        meta.size = Some(self.size);
        Ok(())
    }
}

/// Fills in a content type guessed from the file name, unless one was given.
///
/// Uploads guess from the local file, copies from the source key.
pub struct ProvideContentTypeSubscriber;

impl Subscriber for ProvideContentTypeSubscriber {
    fn on_queued(&self, meta: &mut TransferMeta) -> Result<(), TransferError> {
        if meta.extra_args.content_type.is_some() {
            return Ok(());
        }
        let guessed = match &meta.request {
            TransferRequest::Upload {
                source: DataSource::File(path),
                ..
            } => path.to_str().and_then(guess_content_type),
            TransferRequest::Copy { source_key, .. } => guess_content_type(source_key),
            _ => None,
        };
        if let Some(content_type) = guessed {
            meta.extra_args.content_type = Some(content_type.to_string());
        }
        Ok(())
    }
}

/// Creates the parent directory of a download target.
pub struct DirectoryCreatorSubscriber;

impl Subscriber for DirectoryCreatorSubscriber {
    fn on_queued(&self, meta: &mut TransferMeta) -> Result<(), TransferError> {
        if let TransferRequest::Download {
            sink: DataSink::File(path),
            ..
        } = &meta.request
        {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

/// Stamps a downloaded file with the object's modification time.
///
/// Failing to set the time does not fail the download; it only warns.
pub struct LastModifiedSetterSubscriber {
    last_modified: DateTime<Utc>,
    queue: ResultQueue,
}

impl LastModifiedSetterSubscriber {
    pub fn new(last_modified: DateTime<Utc>, queue: ResultQueue) -> Self {
        Self {
            last_modified,
            queue,
        }
    }

    fn apply(&self, path: &Path) -> std::io::Result<()> {
        let mtime = FileTime::from_unix_time(
            self.last_modified.timestamp(),
            self.last_modified.timestamp_subsec_nanos(),
        );
        filetime::set_file_mtime(path, mtime)
    }
}

impl Subscriber for LastModifiedSetterSubscriber {
    fn on_done(&self, meta: &TransferMeta, outcome: &mut TransferOutcome) {
        if outcome.is_err() {
            return;
        }
        let TransferRequest::Download {
            sink: DataSink::File(path),
            ..
        } = &meta.request
        else {
            return;
        };
        if let Err(err) = self.apply(path) {
            let display = path.display().to_string();
            let message = format!(
                "Successfully Downloaded {} but was unable to update the last modified time. {}",
                display, err
            );
            self.queue.put(create_warning(&display, &message, false));
        }
    }
}

/// Removes the local source file once an upload succeeded (move).
pub struct DeleteSourceFileSubscriber {
    path: PathBuf,
}

impl DeleteSourceFileSubscriber {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Subscriber for DeleteSourceFileSubscriber {
    fn on_done(&self, _meta: &TransferMeta, outcome: &mut TransferOutcome) {
        if outcome.is_ok() {
            if let Err(err) = fs::remove_file(&self.path) {
                *outcome = Err(err.into());
            }
        }
    }
}

/// Removes the source object once a download or copy succeeded (move).
pub struct DeleteSourceObjectSubscriber {
    client: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
}

impl DeleteSourceObjectSubscriber {
    pub fn new(client: Arc<dyn ObjectStore>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl Subscriber for DeleteSourceObjectSubscriber {
    fn on_done(&self, _meta: &TransferMeta, outcome: &mut TransferOutcome) {
        if outcome.is_ok() {
            if let Err(err) = self.client.delete_object(&self.bucket, &self.key) {
                *outcome = Err(err.into());
            }
        }
    }
}

/// Publishes the transfer's lifecycle on the result queue. Always last.
pub struct ResultSubscriber {
    queue: ResultQueue,
    target: TransferTarget,
}

impl ResultSubscriber {
    pub fn new(queue: ResultQueue, target: TransferTarget) -> Self {
        Self { queue, target }
    }
}

impl Subscriber for ResultSubscriber {
    fn on_queued(&self, meta: &mut TransferMeta) -> Result<(), TransferError> {
        self.queue.put(ResultRecord::Queued {
            target: self.target.clone(),
            total_transfer_size: meta.size,
        });
        Ok(())
    }

    fn on_progress(&self, meta: &TransferMeta, bytes_transferred: u64) {
        self.queue.put(ResultRecord::Progress {
            target: self.target.clone(),
            bytes_transferred,
            total_transfer_size: meta.size,
            timestamp: Instant::now(),
        });
    }

    fn on_done(&self, _meta: &TransferMeta, outcome: &mut TransferOutcome) {
        match outcome {
            Ok(()) => self.queue.put(ResultRecord::Success {
                target: self.target.clone(),
            }),
            // Reported once, by whoever aborted the command.
            Err(err) if err.is_fatal() => {}
            Err(err) => self.queue.put(ResultRecord::Failure {
                target: self.target.clone(),
                error: err.to_string(),
            }),
        }
    }
}

/// Extension to content type, sorted by extension.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("7z", "application/x-7z-compressed"),
    ("aac", "audio/aac"),
    ("avi", "video/x-msvideo"),
    ("avif", "image/avif"),
    ("bin", "application/octet-stream"),
    ("bmp", "image/bmp"),
    ("bz2", "application/x-bzip2"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("doc", "application/msword"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("eot", "application/vnd.ms-fontobject"),
    ("epub", "application/epub+zip"),
    ("flac", "audio/flac"),
    ("gif", "image/gif"),
    ("gz", "application/gzip"),
    ("heic", "image/heic"),
    ("htm", "text/html"),
    ("html", "text/html"),
    ("ico", "image/vnd.microsoft.icon"),
    ("ics", "text/calendar"),
    ("jar", "application/java-archive"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("jsonld", "application/ld+json"),
    ("m4a", "audio/mp4"),
    ("manifest", "text/cache-manifest"),
    ("map", "application/json"),
    ("md", "text/markdown"),
    ("mid", "audio/midi"),
    ("midi", "audio/midi"),
    ("mjs", "text/javascript"),
    ("mov", "video/quicktime"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("mpeg", "video/mpeg"),
    ("odp", "application/vnd.oasis.opendocument.presentation"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("oga", "audio/ogg"),
    ("ogg", "audio/ogg"),
    ("ogv", "video/ogg"),
    ("otf", "font/otf"),
    ("parquet", "application/vnd.apache.parquet"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("rar", "application/vnd.rar"),
    ("rss", "application/rss+xml"),
    ("rtf", "application/rtf"),
    ("sh", "application/x-sh"),
    ("svg", "image/svg+xml"),
    ("tar", "application/x-tar"),
    ("tgz", "application/gzip"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("toml", "application/toml"),
    ("ts", "video/mp2t"),
    ("tsv", "text/tab-separated-values"),
    ("ttf", "font/ttf"),
    ("txt", "text/plain"),
    ("wasm", "application/wasm"),
    ("wav", "audio/wav"),
    ("weba", "audio/webm"),
    ("webm", "video/webm"),
    ("webmanifest", "application/manifest+json"),
    ("webp", "image/webp"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("xhtml", "application/xhtml+xml"),
    ("xls", "application/vnd.ms-excel"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("xml", "application/xml"),
    ("xz", "application/x-xz"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("zip", "application/zip"),
    ("zst", "application/zstd"),
];

/// Guess a content type from a file name's extension (case-insensitive).
pub fn guess_content_type(name: &str) -> Option<&'static str> {
    let file_name = name.rsplit(['/', '\\']).next()?;
    let (_, extension) = file_name.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    CONTENT_TYPES
        .binary_search_by(|(ext, _)| ext.cmp(&extension.as_str()))
        .ok()
        .map(|index| CONTENT_TYPES[index].1)
}
