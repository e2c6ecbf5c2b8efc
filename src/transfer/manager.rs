//! Concurrent transfer pool
//!
//! Transfers run on a tokio multi-thread runtime:
//! - each submission becomes a task that first acquires a semaphore permit
//! - the store calls and file IO then run on the blocking pool
//! - `wait` drains the task handles from outside the runtime

use super::{
    DataSink, DataSource, Subscriber, TransferError, TransferFuture, TransferManager, TransferMeta,
    TransferOutcome, TransferRequest,
};
use crate::transfer::ExtraArgs;
use crate::types::SyncError;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;

/// Default number of transfers allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Chunk size for streaming file and stdin bodies.
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Tuning knobs for [`PooledTransferManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    pub max_concurrent_requests: usize,
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Transfer manager backed by a private tokio runtime.
pub struct PooledTransferManager {
    runtime: Runtime,
    semaphore: Arc<Semaphore>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
    chunk_size: usize,
    cancelled: Arc<AtomicBool>,
}

impl PooledTransferManager {
    /// Create the runtime and the concurrency limit.
    pub fn new(config: TransferConfig) -> Result<Self, SyncError> {
        let permits = config.max_concurrent_requests.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(permits)
            .thread_name("objsync-transfer")
            .enable_all()
            .build()
            .map_err(SyncError::Io)?;

        Ok(Self {
            runtime,
            semaphore: Arc::new(Semaphore::new(permits)),
            handles: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            chunk_size: config.chunk_size.max(1),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share a cancellation flag with the caller (set on ctrl-c).
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    fn track(&self, handle: JoinHandle<()>) {
        match self.handles.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    fn take_handles(&self) -> Vec<JoinHandle<()>> {
        match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl TransferManager for PooledTransferManager {
    fn submit(
        &self,
        request: TransferRequest,
        extra_args: ExtraArgs,
        subscribers: Vec<Box<dyn Subscriber>>,
    ) -> TransferFuture {
        let transfer_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut meta = TransferMeta {
            transfer_id,
            request,
            extra_args,
            size: None,
        };

        // Every subscriber sees on_queued, even after an earlier one failed,
        // so the result subscriber always announces the transfer.
        let mut queued_error = None;
        for subscriber in &subscribers {
            if let Err(err) = subscriber.on_queued(&mut meta) {
                queued_error.get_or_insert(err);
            }
        }

        let (done_tx, done_rx) = oneshot::channel();
        let semaphore = Arc::clone(&self.semaphore);
        let cancelled = Arc::clone(&self.cancelled);
        let chunk_size = self.chunk_size;

        let handle = self.runtime.spawn(async move {
            let permit = semaphore.acquire_owned().await.ok();
            let task = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let mut outcome = match queued_error {
                    Some(err) => Err(err),
                    None if cancelled.load(Ordering::SeqCst) => Err(TransferError::Cancelled),
                    None => panic::catch_unwind(AssertUnwindSafe(|| {
                        execute(&mut meta, &subscribers, chunk_size, &cancelled)
                    }))
                    .unwrap_or_else(|payload| Err(TransferError::Panicked(panic_message(payload.as_ref())))),
                };
                for subscriber in &subscribers {
                    subscriber.on_done(&meta, &mut outcome);
                }
                outcome
            });

            let outcome = task.await.unwrap_or_else(|err| {
                Err(TransferError::Fatal(format!("transfer task failed: {}", err)))
            });
            let _ = done_tx.send(outcome);
        });
        self.track(handle);

        TransferFuture::new(transfer_id, done_rx)
    }

    fn wait(&self) -> Result<(), SyncError> {
        loop {
            let handles = self.take_handles();
            if handles.is_empty() {
                return Ok(());
            }
            self.runtime.block_on(async move {
                for handle in handles {
                    handle
                        .await
                        .map_err(|e| SyncError::Transfer(format!("transfer task failed: {}", e)))?;
                }
                Ok::<(), SyncError>(())
            })?;
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

fn execute(
    meta: &mut TransferMeta,
    subscribers: &[Box<dyn Subscriber>],
    chunk_size: usize,
    cancelled: &AtomicBool,
) -> TransferOutcome {
    // Downloads learn their size from the body; record it before any
    // progress is reported so the late size reaches the recorder.
    let body = match &meta.request {
        TransferRequest::Download { bucket, key, client, .. } => {
            let body = client.get_object(bucket, key)?;
            meta.size.get_or_insert(body.len() as u64);
            Some(body)
        }
        _ => None,
    };

    let meta: &TransferMeta = meta;
    let report = |bytes: u64| {
        for subscriber in subscribers {
            subscriber.on_progress(meta, bytes);
        }
    };

    match &meta.request {
        TransferRequest::Upload {
            source,
            bucket,
            key,
            client,
        } => {
            let body = match source {
                DataSource::File(path) => {
                    read_chunked(File::open(path)?, chunk_size, cancelled, &report)?
                }
                DataSource::Stdin => {
                    read_chunked(io::stdin().lock(), chunk_size, cancelled, &report)?
                }
            };
            client.put_object(bucket, key, body, &meta.extra_args)?;
        }
        TransferRequest::Download { sink, .. } => {
            let body = body.unwrap_or_default();
            match sink {
                DataSink::File(path) => write_file_atomic(path, &body, chunk_size, cancelled, &report)?,
                DataSink::Stdout(out) => {
                    for chunk in body.chunks(chunk_size) {
                        check_cancelled(cancelled)?;
                        out.write_bytes(chunk)?;
                        report(chunk.len() as u64);
                    }
                }
            }
        }
        TransferRequest::Copy {
            source_bucket,
            source_key,
            bucket,
            key,
            client,
        } => {
            check_cancelled(cancelled)?;
            client.copy_object(source_bucket, source_key, bucket, key, &meta.extra_args)?;
            if let Some(size) = meta.size {
                report(size);
            }
        }
        TransferRequest::Delete { bucket, key, client } => {
            check_cancelled(cancelled)?;
            client.delete_object(bucket, key)?;
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn check_cancelled(cancelled: &AtomicBool) -> TransferOutcome {
    if cancelled.load(Ordering::SeqCst) {
        return Err(TransferError::Cancelled);
    }
    Ok(())
}

fn read_chunked(
    mut reader: impl Read,
    chunk_size: usize,
    cancelled: &AtomicBool,
    report: &dyn Fn(u64),
) -> Result<Vec<u8>, TransferError> {
    let mut body = Vec::new();
    let mut buffer = vec![0u8; chunk_size];
    loop {
        check_cancelled(cancelled)?;
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        body.extend_from_slice(&buffer[..bytes_read]);
        report(bytes_read as u64);
    }
    Ok(body)
}

/// Write to a sibling `.objsync-part` file, then rename over the target.
fn write_file_atomic(
    dest: &Path,
    body: &[u8],
    chunk_size: usize,
    cancelled: &AtomicBool,
    report: &dyn Fn(u64),
) -> TransferOutcome {
    let part_path = part_path(dest);
    let result = (|| -> TransferOutcome {
        let mut part_file = File::create(&part_path)?;
        for chunk in body.chunks(chunk_size) {
            check_cancelled(cancelled)?;
            part_file.write_all(chunk)?;
            report(chunk.len() as u64);
        }
        part_file.sync_all()?;
        drop(part_file);
        fs::rename(&part_path, dest)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&part_path);
    }
    result
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".objsync-part");
    PathBuf::from(name)
}
