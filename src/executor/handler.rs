//! Drives the entries of a command through the submitters

use super::submitter::TransferRequestSubmitter;
use crate::results::{CommandResult, CommandResultRecorder, ResultQueue, ResultRecord};
use crate::transfer::TransferManager;
use crate::types::{FileInfo, SyncError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Final stage of the pipeline.
///
/// Consumes the stream of [`FileInfo`], hands each entry to the first
/// submitter that accepts it, then waits for every transfer to finish. The
/// result consumer runs for the whole call, so the caller always gets a
/// [`CommandResult`], even when the stream or the transfers fail.
pub struct TransferHandler {
    recorder: CommandResultRecorder,
    dispatcher: Dispatcher,
}

struct Dispatcher {
    transfer_manager: Arc<dyn TransferManager>,
    submitters: Vec<TransferRequestSubmitter>,
    queue: ResultQueue,
    cancelled: Arc<AtomicBool>,
}

impl TransferHandler {
    /// # Arguments
    /// * `transfer_manager` - Runs the submitted transfers
    /// * `submitters` - Tried in order for every entry
    /// * `recorder` - Result pipeline scope; its queue must be the one the submitters publish on
    /// * `queue` - Queue for the final submission count
    /// * `cancelled` - Set on ctrl-c
    pub fn new(
        transfer_manager: Arc<dyn TransferManager>,
        submitters: Vec<TransferRequestSubmitter>,
        recorder: CommandResultRecorder,
        queue: ResultQueue,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            recorder,
            dispatcher: Dispatcher {
                transfer_manager,
                submitters,
                queue,
                cancelled,
            },
        }
    }

    pub fn call<I>(self, infos: I) -> CommandResult
    where
        I: IntoIterator<Item = Result<FileInfo, SyncError>>,
    {
        let TransferHandler {
            recorder,
            dispatcher,
        } = self;
        recorder.record(|_| dispatcher.run(infos))
    }
}

impl Dispatcher {
    fn run<I>(&self, infos: I) -> Result<(), SyncError>
    where
        I: IntoIterator<Item = Result<FileInfo, SyncError>>,
    {
        let mut total_submissions = 0usize;

        for info in infos {
            if self.cancelled.load(Ordering::SeqCst) {
                self.transfer_manager.cancel();
                return Err(SyncError::Cancelled);
            }
            let info = match info {
                Ok(info) => info,
                Err(err) => {
                    tracing::debug!(error = %err, "file stream failed, stopping transfers");
                    self.transfer_manager.cancel();
                    let _ = self.transfer_manager.wait();
                    return Err(err);
                }
            };

            let Some(submitter) = self.submitters.iter().find(|s| s.can_submit(&info)) else {
                tracing::debug!(src = %info.stats.src, operation = ?info.stats.operation, "no submitter");
                continue;
            };
            if submitter.submit(&info).counts() {
                total_submissions += 1;
            }
        }

        self.queue
            .put(ResultRecord::FinalTotalSubmissions { total_submissions });
        self.transfer_manager.wait()?;
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Command, Parameters, SyncOptions};
    use crate::results::ResultReceiver;
    use crate::store::{MemoryObjectStore, SeedObject, StoreError};
    use crate::transfer::{PooledTransferManager, TransferConfig};
    use crate::types::{FileStats, Operation, PathKind};
    use crate::ui::SharedOutput;

    fn delete_entry(store: &Arc<MemoryObjectStore>, params: &Arc<Parameters>, key: &str) -> Result<FileInfo, SyncError> {
        Ok(FileInfo {
            stats: FileStats {
                src: format!("bucket/{}", key),
                dest: format!("bucket/{}", key),
                compare_key: key.to_string(),
                src_type: PathKind::Remote,
                dest_type: PathKind::Remote,
                size: None,
                last_update: None,
                operation: Some(Operation::Delete),
                remote_metadata: None,
            },
            client: store.clone(),
            source_client: store.clone(),
            is_stream: false,
            parameters: Arc::clone(params),
        })
    }

    fn handler(params: &Arc<Parameters>, cancelled: Arc<AtomicBool>) -> (TransferHandler, ResultQueue) {
        let (queue, receiver): (ResultQueue, ResultReceiver) = ResultQueue::new();
        let tm: Arc<dyn TransferManager> = Arc::new(
            PooledTransferManager::new(TransferConfig::default())
                .expect("create transfer manager")
                .with_cancellation(Arc::clone(&cancelled)),
        );
        let submitters = TransferRequestSubmitter::all(
            Arc::clone(&tm),
            queue.clone(),
            Arc::clone(params),
            SharedOutput::sink(),
        );
        let recorder = CommandResultRecorder::new(queue.clone(), receiver, None);
        (
            TransferHandler::new(tm, submitters, recorder, queue.clone(), cancelled),
            queue,
        )
    }

    fn rm_params() -> Arc<Parameters> {
        Arc::new(
            Parameters::new(
                Command::Rm,
                "s3://bucket/",
                None,
                SyncOptions {
                    recursive: true,
                    ..SyncOptions::default()
                },
            )
            .expect("valid rm"),
        )
    }

    #[test]
    fn test_all_entries_submitted() {
        let store = Arc::new(MemoryObjectStore::new().with_bucket("bucket"));
        for key in ["a", "b", "c"] {
            store.seed("bucket", key, SeedObject::new(b"x".to_vec()));
        }
        let params = rm_params();
        let (handler, _) = handler(&params, Arc::new(AtomicBool::new(false)));

        let entries: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|k| delete_entry(&store, &params, k))
            .collect();
        let result = handler.call(entries);

        assert_eq!(result, CommandResult::default());
        assert!(store.keys("bucket").is_empty());
    }

    #[test]
    fn test_failed_transfer_counts_as_failed_task() {
        let store = Arc::new(MemoryObjectStore::new().with_bucket("bucket"));
        store.seed("bucket", "a", SeedObject::new(b"x".to_vec()));
        store.seed("bucket", "b", SeedObject::new(b"x".to_vec()));
        store.fail_on("bucket", "b");
        let params = rm_params();
        let (handler, _) = handler(&params, Arc::new(AtomicBool::new(false)));

        let result = handler.call(vec![
            delete_entry(&store, &params, "a"),
            delete_entry(&store, &params, "b"),
        ]);

        assert_eq!(result.num_tasks_failed, 1);
        assert_eq!(store.keys("bucket"), vec!["b"]);
    }

    #[test]
    fn test_stream_error_aborts_remaining_entries() {
        let store = Arc::new(MemoryObjectStore::new().with_bucket("bucket"));
        store.seed("bucket", "z", SeedObject::new(b"x".to_vec()));
        let params = rm_params();
        let (handler, _) = handler(&params, Arc::new(AtomicBool::new(false)));

        let result = handler.call(vec![
            Err(SyncError::Store(StoreError::NoSuchBucket("bucket".to_string()))),
            delete_entry(&store, &params, "z"),
        ]);

        assert_eq!(result.num_tasks_failed, 1);
        assert_eq!(store.keys("bucket"), vec!["z"]);
    }

    #[test]
    fn test_cancelled_before_start_submits_nothing() {
        let store = Arc::new(MemoryObjectStore::new().with_bucket("bucket"));
        store.seed("bucket", "a", SeedObject::new(b"x".to_vec()));
        let params = rm_params();
        let (handler, _) = handler(&params, Arc::new(AtomicBool::new(true)));

        let result = handler.call(vec![delete_entry(&store, &params, "a")]);

        assert_eq!(result.num_tasks_failed, 1);
        assert_eq!(store.calls().delete, 0);
    }

    #[test]
    fn test_empty_stream_succeeds() {
        let params = rm_params();
        let (handler, _) = handler(&params, Arc::new(AtomicBool::new(false)));
        let result = handler.call(Vec::<Result<FileInfo, SyncError>>::new());
        assert_eq!(result, CommandResult::default());
    }
}
