//! Transfer layer
//!
//! A [`TransferManager`] accepts requests, runs them concurrently, and
//! reports their lifecycle to [`Subscriber`]s: `on_queued` synchronously at
//! submission, `on_progress` while bytes move, `on_done` once with the
//! outcome. Subscribers may change the outcome, e.g. a failed delete of
//! the source after a move turns the transfer into a failure.

mod args;
mod manager;
mod subscribers;

pub use args::{ExtraArgs, RequestParamsMapper};
pub use manager::{PooledTransferManager, TransferConfig};
pub use subscribers::{
    guess_content_type, DeleteSourceFileSubscriber, DeleteSourceObjectSubscriber,
    DirectoryCreatorSubscriber, LastModifiedSetterSubscriber, ProvideContentTypeSubscriber,
    ProvideSizeSubscriber, ResultSubscriber,
};

use crate::store::{ObjectStore, StoreError};
use crate::types::SyncError;
use crate::ui::SharedOutput;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Where upload bytes come from.
pub enum DataSource {
    File(PathBuf),
    Stdin,
}

/// Where download bytes go.
pub enum DataSink {
    File(PathBuf),
    Stdout(SharedOutput),
}

/// One unit of work for the transfer layer.
pub enum TransferRequest {
    Upload {
        source: DataSource,
        bucket: String,
        key: String,
        client: Arc<dyn ObjectStore>,
    },
    Download {
        bucket: String,
        key: String,
        sink: DataSink,
        client: Arc<dyn ObjectStore>,
    },
    Copy {
        source_bucket: String,
        source_key: String,
        bucket: String,
        key: String,
        client: Arc<dyn ObjectStore>,
    },
    Delete {
        bucket: String,
        key: String,
        client: Arc<dyn ObjectStore>,
    },
}

impl TransferRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            TransferRequest::Upload { .. } => "upload",
            TransferRequest::Download { .. } => "download",
            TransferRequest::Copy { .. } => "copy",
            TransferRequest::Delete { .. } => "delete",
        }
    }
}

/// A request plus what is known about it while it runs.
pub struct TransferMeta {
    pub transfer_id: u64,
    pub request: TransferRequest,
    pub extra_args: ExtraArgs,
    /// Total bytes, if known. May be learned only once the transfer starts.
    pub size: Option<u64>,
}

/// Why a transfer did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Io(String),

    /// Stopped by a user interrupt
    #[error("cancelled")]
    Cancelled,

    /// The transfer body panicked; reported like any other per-file failure
    #[error("transfer panicked: {0}")]
    Panicked(String),

    /// The transfer layer itself broke down
    #[error("{0}")]
    Fatal(String),
}

impl TransferError {
    /// Fatal outcomes are reported once for the whole command, not per file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransferError::Cancelled | TransferError::Fatal(_))
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err.to_string())
    }
}

/// Outcome of one transfer.
pub type TransferOutcome = Result<(), TransferError>;

/// Observer of a single transfer.
pub trait Subscriber: Send + Sync {
    fn on_queued(&self, _meta: &mut TransferMeta) -> Result<(), TransferError> {
        Ok(())
    }

    fn on_progress(&self, _meta: &TransferMeta, _bytes_transferred: u64) {}

    fn on_done(&self, _meta: &TransferMeta, _outcome: &mut TransferOutcome) {}
}

/// Handle to an in-flight transfer.
pub struct TransferFuture {
    transfer_id: u64,
    done: oneshot::Receiver<TransferOutcome>,
}

impl TransferFuture {
    pub(crate) fn new(transfer_id: u64, done: oneshot::Receiver<TransferOutcome>) -> Self {
        Self { transfer_id, done }
    }

    pub fn transfer_id(&self) -> u64 {
        self.transfer_id
    }

    /// Block until the transfer finishes. Must not be called from async code.
    pub fn result(self) -> TransferOutcome {
        self.done
            .blocking_recv()
            .unwrap_or_else(|_| Err(TransferError::Fatal("transfer task was dropped".to_string())))
    }
}

/// Runs transfers concurrently.
pub trait TransferManager: Send + Sync {
    /// Queue a transfer. `on_queued` runs before this returns.
    fn submit(
        &self,
        request: TransferRequest,
        extra_args: ExtraArgs,
        subscribers: Vec<Box<dyn Subscriber>>,
    ) -> TransferFuture;

    /// Block until every submitted transfer has finished.
    fn wait(&self) -> Result<(), SyncError>;

    /// Make transfers that have not finished yet end with `Cancelled`.
    fn cancel(&self);
}
