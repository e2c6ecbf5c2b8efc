//! Scope guard around the result pipeline of one command

use super::processor::ResultProcessor;
use super::queue::{ResultQueue, ResultReceiver};
use super::record::{CommandResult, ResultRecord};
use super::recorder::ResultRecorder;
use crate::types::SyncError;
use crate::ui::ResultPrinter;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

/// Runs a command body with the result consumer alive around it.
///
/// Whatever happens inside the body, the caller gets a [`CommandResult`]:
/// an error returned by the body is turned into an `Error` record (a
/// cancellation into `CtrlC`) and is not propagated.
pub struct CommandResultRecorder {
    queue: ResultQueue,
    pending: Option<ResultProcessor>,
    handle: Option<JoinHandle<ResultRecorder>>,
    stats: Option<ResultRecorder>,
}

impl CommandResultRecorder {
    pub fn new(queue: ResultQueue, receiver: ResultReceiver, printer: Option<ResultPrinter>) -> Self {
        Self {
            queue,
            pending: Some(ResultProcessor::new(receiver, printer)),
            handle: None,
            stats: None,
        }
    }

    /// Start the consumer thread. Calling it twice is a no-op.
    pub fn start(&mut self) -> io::Result<()> {
        if let Some(processor) = self.pending.take() {
            self.handle = Some(processor.spawn()?);
        }
        Ok(())
    }

    /// Queue the shutdown sentinel and wait for the consumer to finish.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.queue.shutdown();
        match handle.join() {
            Ok(stats) => self.stats = Some(stats),
            Err(_) => {
                tracing::warn!("result processor thread panicked");
                let mut stats = ResultRecorder::new();
                stats.errors = 1;
                self.stats = Some(stats);
            }
        }
    }

    /// Failed tasks (file failures plus fatal errors) and warned files.
    pub fn command_result(&self) -> CommandResult {
        self.stats
            .as_ref()
            .map(|stats| CommandResult {
                num_tasks_failed: stats.files_failed + stats.errors,
                num_tasks_warned: stats.files_warned,
            })
            .unwrap_or_default()
    }

    /// Run `body` inside the recorder scope.
    ///
    /// # Arguments
    /// * `body` - Command logic; receives the queue to publish records on
    ///
    /// # Returns
    /// The aggregate result after every queued record has been processed.
    pub fn record<F>(mut self, body: F) -> CommandResult
    where
        F: FnOnce(&ResultQueue) -> Result<(), SyncError>,
    {
        if let Err(err) = self.start() {
            tracing::error!(error = %err, "cannot start result processor");
            return CommandResult {
                num_tasks_failed: 1,
                num_tasks_warned: 0,
            };
        }

        let queue = self.queue.clone();
        match panic::catch_unwind(AssertUnwindSafe(|| body(&queue))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "command aborted");
                self.queue.put(error_record(&err));
            }
            Err(payload) => self.queue.put(ResultRecord::Error {
                error: panic_message(payload.as_ref()),
            }),
        }

        self.shutdown();
        self.command_result()
    }
}

impl Drop for CommandResultRecorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn error_record(err: &SyncError) -> ResultRecord {
    if err.is_cancellation() {
        ResultRecord::CtrlC {
            error: err.to_string(),
        }
    } else {
        ResultRecord::Error {
            error: err.to_string(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected panic".to_string()
    }
}
