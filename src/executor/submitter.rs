//! Request submitters: turn a [`FileInfo`] into a transfer request
//!
//! Each submitter handles one kind of entry. The handler offers every entry
//! to the submitters in [`TransferRequestSubmitter::all`] order and the
//! first one that accepts it submits it. Before submitting, a submitter
//! may warn about the entry and skip it.

use crate::config::Parameters;
use crate::paths::{format_remote_path, relative_path, split_bucket_key};
use crate::results::{create_warning, ResultQueue, ResultRecord, TransferTarget, TransferType};
use crate::transfer::{
    DataSink, DataSource, DeleteSourceFileSubscriber, DeleteSourceObjectSubscriber,
    DirectoryCreatorSubscriber, ExtraArgs, LastModifiedSetterSubscriber,
    ProvideContentTypeSubscriber, ProvideSizeSubscriber, RequestParamsMapper, ResultSubscriber,
    Subscriber, TransferFuture, TransferManager, TransferRequest,
};
use crate::types::{FileInfo, Operation, PathKind};
use crate::ui::SharedOutput;
use indicatif::HumanBytes;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Largest object a single upload may create (5 TiB).
pub const MAX_UPLOAD_SIZE: u64 = 5 * 1024 * 1024 * 1024 * 1024;

/// Display form of a streamed source or destination.
const STREAM_DISPLAY: &str = "-";

/// The kinds of entries a submitter can handle, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitterKind {
    UploadStream,
    DownloadStream,
    Upload,
    Download,
    Copy,
    RemoteDelete,
    LocalDelete,
}

impl SubmitterKind {
    pub const DISPATCH_ORDER: [SubmitterKind; 7] = [
        SubmitterKind::UploadStream,
        SubmitterKind::DownloadStream,
        SubmitterKind::Upload,
        SubmitterKind::Download,
        SubmitterKind::Copy,
        SubmitterKind::RemoteDelete,
        SubmitterKind::LocalDelete,
    ];
}

/// What became of an entry offered to a submitter.
pub enum Submission {
    /// Handed to the transfer manager
    Transfer(TransferFuture),
    /// Completed synchronously (local delete)
    Local,
    /// Skipped after a warning
    Skipped,
    /// Announced only, because of `--dryrun`
    DryRun,
}

impl Submission {
    /// Whether the entry counts towards the expected total.
    pub fn counts(&self) -> bool {
        matches!(self, Submission::Transfer(_) | Submission::Local)
    }
}

/// Submits one kind of entry.
pub struct TransferRequestSubmitter {
    kind: SubmitterKind,
    transfer_manager: Arc<dyn TransferManager>,
    queue: ResultQueue,
    params: Arc<Parameters>,
    stdout: SharedOutput,
}

impl TransferRequestSubmitter {
    pub fn new(
        kind: SubmitterKind,
        transfer_manager: Arc<dyn TransferManager>,
        queue: ResultQueue,
        params: Arc<Parameters>,
        stdout: SharedOutput,
    ) -> Self {
        Self {
            kind,
            transfer_manager,
            queue,
            params,
            stdout,
        }
    }

    /// One submitter per kind, in dispatch order.
    ///
    /// `stdout` receives the body of streamed downloads.
    pub fn all(
        transfer_manager: Arc<dyn TransferManager>,
        queue: ResultQueue,
        params: Arc<Parameters>,
        stdout: SharedOutput,
    ) -> Vec<TransferRequestSubmitter> {
        SubmitterKind::DISPATCH_ORDER
            .iter()
            .map(|&kind| {
                TransferRequestSubmitter::new(
                    kind,
                    Arc::clone(&transfer_manager),
                    queue.clone(),
                    Arc::clone(&params),
                    stdout.clone(),
                )
            })
            .collect()
    }

    pub fn kind(&self) -> SubmitterKind {
        self.kind
    }

    /// Whether this submitter handles `info`.
    pub fn can_submit(&self, info: &FileInfo) -> bool {
        let operation = info.stats.operation;
        match self.kind {
            SubmitterKind::UploadStream => info.is_stream && operation == Some(Operation::Upload),
            SubmitterKind::DownloadStream => info.is_stream && operation == Some(Operation::Download),
            SubmitterKind::Upload => operation == Some(Operation::Upload),
            SubmitterKind::Download => operation == Some(Operation::Download),
            SubmitterKind::Copy => operation == Some(Operation::Copy),
            SubmitterKind::RemoteDelete => {
                operation == Some(Operation::Delete) && info.stats.src_type == PathKind::Remote
            }
            SubmitterKind::LocalDelete => {
                operation == Some(Operation::Delete) && info.stats.src_type == PathKind::Local
            }
        }
    }

    /// Warn and skip, announce a dry run, or submit.
    pub fn submit(&self, info: &FileInfo) -> Submission {
        if self.warn_and_signal_if_skip(info) {
            return Submission::Skipped;
        }
        if self.params.dryrun {
            self.queue.put(ResultRecord::DryRun {
                target: self.target(info),
            });
            return Submission::DryRun;
        }
        match self.kind {
            SubmitterKind::LocalDelete => self.delete_local(info),
            _ => {
                let (request, extra_args, subscribers) = self.request(info);
                tracing::debug!(
                    kind = request.kind(),
                    src = %info.stats.src,
                    dest = %info.stats.dest,
                    "submitting transfer"
                );
                Submission::Transfer(self.transfer_manager.submit(request, extra_args, subscribers))
            }
        }
    }

    fn warn_and_signal_if_skip(&self, info: &FileInfo) -> bool {
        match self.kind {
            SubmitterKind::Upload | SubmitterKind::UploadStream => self.warn_if_too_large(info),
            SubmitterKind::Download | SubmitterKind::DownloadStream => {
                self.warn_glacier(info) || self.warn_parent_reference(info)
            }
            SubmitterKind::Copy => self.warn_glacier(info),
            SubmitterKind::RemoteDelete | SubmitterKind::LocalDelete => false,
        }
    }

    fn warn_if_too_large(&self, info: &FileInfo) -> bool {
        let size = match self.kind {
            SubmitterKind::UploadStream => self.params.expected_size,
            _ => info.stats.size,
        };
        match size {
            Some(size) if size > MAX_UPLOAD_SIZE => {
                let message = format!(
                    "File {} exceeds s3 upload limit of {}.",
                    self.display_src(info),
                    HumanBytes(MAX_UPLOAD_SIZE)
                );
                self.queue
                    .put(create_warning(&self.display_src(info), &message, false));
                true
            }
            _ => false,
        }
    }

    fn warn_glacier(&self, info: &FileInfo) -> bool {
        if self.params.force_glacier_transfer || info.is_glacier_compatible() {
            return false;
        }
        if !self.params.ignore_glacier_warnings {
            let operation = info.stats.operation.unwrap_or(Operation::Download);
            let message = format!(
                "Object is of storage class GLACIER. Unable to perform {op} operations on \
                 GLACIER objects. You must restore the object to be able to perform the \
                 operation. See objsync {op} help for additional parameter options to ignore \
                 or force these transfers.",
                op = operation
            );
            self.queue.put(create_warning(
                &format_remote_path(&info.stats.src),
                &message,
                true,
            ));
        }
        true
    }

    fn warn_parent_reference(&self, info: &FileInfo) -> bool {
        if !references_parent(&info.stats.compare_key) {
            return false;
        }
        tracing::debug!(key = %info.stats.compare_key, "key escapes the download root");
        self.queue.put(create_warning(
            &info.stats.compare_key,
            "File references a parent directory.",
            true,
        ));
        true
    }

    fn delete_local(&self, info: &FileInfo) -> Submission {
        let target = self.target(info);
        self.queue.put(ResultRecord::Queued {
            target: target.clone(),
            total_transfer_size: Some(0),
        });
        match fs::remove_file(&info.stats.src) {
            Ok(()) => self.queue.put(ResultRecord::Success { target }),
            Err(err) => self.queue.put(ResultRecord::Failure {
                target,
                error: err.to_string(),
            }),
        }
        Submission::Local
    }

    fn request(&self, info: &FileInfo) -> (TransferRequest, ExtraArgs, Vec<Box<dyn Subscriber>>) {
        let stats = &info.stats;
        let options = &self.params.request;
        let is_move = self.params.is_move;
        let mut extra_args = ExtraArgs::default();
        let mut subscribers: Vec<Box<dyn Subscriber>> = Vec::new();

        let request = match self.kind {
            SubmitterKind::Upload => {
                RequestParamsMapper::map_put_object_params(&mut extra_args, options);
                if let Some(size) = stats.size {
                    subscribers.push(Box::new(ProvideSizeSubscriber::new(size)));
                }
                if self.params.guess_mime_type && options.content_type.is_none() {
                    subscribers.push(Box::new(ProvideContentTypeSubscriber));
                }
                if is_move {
                    subscribers.push(Box::new(DeleteSourceFileSubscriber::new(&stats.src)));
                }
                let (bucket, key) = split_bucket_key(&stats.dest);
                TransferRequest::Upload {
                    source: DataSource::File(PathBuf::from(&stats.src)),
                    bucket,
                    key,
                    client: Arc::clone(&info.client),
                }
            }
            SubmitterKind::UploadStream => {
                RequestParamsMapper::map_put_object_params(&mut extra_args, options);
                if let Some(size) = self.params.expected_size {
                    subscribers.push(Box::new(ProvideSizeSubscriber::new(size)));
                }
                let (bucket, key) = split_bucket_key(&stats.dest);
                TransferRequest::Upload {
                    source: DataSource::Stdin,
                    bucket,
                    key,
                    client: Arc::clone(&info.client),
                }
            }
            SubmitterKind::Download => {
                RequestParamsMapper::map_get_object_params(&mut extra_args, options);
                if let Some(size) = stats.size {
                    subscribers.push(Box::new(ProvideSizeSubscriber::new(size)));
                }
                subscribers.push(Box::new(DirectoryCreatorSubscriber));
                if let Some(last_update) = stats.last_update {
                    subscribers.push(Box::new(LastModifiedSetterSubscriber::new(
                        last_update,
                        self.queue.clone(),
                    )));
                }
                let (bucket, key) = split_bucket_key(&stats.src);
                if is_move {
                    subscribers.push(Box::new(DeleteSourceObjectSubscriber::new(
                        Arc::clone(&info.source_client),
                        bucket.clone(),
                        key.clone(),
                    )));
                }
                TransferRequest::Download {
                    bucket,
                    key,
                    sink: DataSink::File(PathBuf::from(&stats.dest)),
                    client: Arc::clone(&info.source_client),
                }
            }
            SubmitterKind::DownloadStream => {
                RequestParamsMapper::map_get_object_params(&mut extra_args, options);
                let (bucket, key) = split_bucket_key(&stats.src);
                TransferRequest::Download {
                    bucket,
                    key,
                    sink: DataSink::Stdout(self.stdout.clone()),
                    client: Arc::clone(&info.source_client),
                }
            }
            SubmitterKind::Copy => {
                RequestParamsMapper::map_copy_object_params(&mut extra_args, options);
                if let Some(size) = stats.size {
                    subscribers.push(Box::new(ProvideSizeSubscriber::new(size)));
                }
                if self.params.guess_mime_type && options.content_type.is_none() {
                    subscribers.push(Box::new(ProvideContentTypeSubscriber));
                }
                let (source_bucket, source_key) = split_bucket_key(&stats.src);
                if is_move {
                    subscribers.push(Box::new(DeleteSourceObjectSubscriber::new(
                        Arc::clone(&info.source_client),
                        source_bucket.clone(),
                        source_key.clone(),
                    )));
                }
                let (bucket, key) = split_bucket_key(&stats.dest);
                TransferRequest::Copy {
                    source_bucket,
                    source_key,
                    bucket,
                    key,
                    client: Arc::clone(&info.client),
                }
            }
            SubmitterKind::RemoteDelete | SubmitterKind::LocalDelete => {
                RequestParamsMapper::map_delete_object_params(&mut extra_args, options);
                let (bucket, key) = split_bucket_key(&stats.src);
                TransferRequest::Delete {
                    bucket,
                    key,
                    client: Arc::clone(&info.client),
                }
            }
        };

        subscribers.push(Box::new(ResultSubscriber::new(
            self.queue.clone(),
            self.target(info),
        )));
        (request, extra_args, subscribers)
    }

    /// How the entry is named in result lines.
    fn target(&self, info: &FileInfo) -> TransferTarget {
        let operation = info.stats.operation.unwrap_or(Operation::Delete);
        let transfer_type = TransferType::for_operation(operation, self.params.is_move);
        let dest = match self.kind {
            SubmitterKind::RemoteDelete | SubmitterKind::LocalDelete => None,
            SubmitterKind::DownloadStream => Some(STREAM_DISPLAY.to_string()),
            SubmitterKind::Download => Some(relative_path(&info.stats.dest)),
            _ => Some(format_remote_path(&info.stats.dest)),
        };
        TransferTarget::new(transfer_type, self.display_src(info), dest)
    }

    fn display_src(&self, info: &FileInfo) -> String {
        match self.kind {
            SubmitterKind::UploadStream => STREAM_DISPLAY.to_string(),
            SubmitterKind::Upload | SubmitterKind::LocalDelete => relative_path(&info.stats.src),
            _ => format_remote_path(&info.stats.src),
        }
    }
}

/// Whether a `/`-separated key climbs above its root once normalized.
fn references_parent(key: &str) -> bool {
    let mut depth: usize = 0;
    for part in key.split('/') {
        match part {
            "" | "." => {}
            ".." => match depth.checked_sub(1) {
                Some(parent) => depth = parent,
                None => return true,
            },
            _ => depth += 1,
        }
    }
    false
}
