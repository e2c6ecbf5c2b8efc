//! Background consumer of the result queue

use super::queue::{QueueItem, ResultReceiver};
use super::record::ResultRecord;
use super::recorder::ResultRecorder;
use crate::ui::ResultPrinter;
use std::io;
use std::thread::{self, JoinHandle};

/// Owns the recorder and the printer and feeds every record to both, in
/// that order, on a dedicated thread.
pub struct ResultProcessor {
    receiver: ResultReceiver,
    recorder: ResultRecorder,
    printer: Option<ResultPrinter>,
}

impl ResultProcessor {
    pub fn new(receiver: ResultReceiver, printer: Option<ResultPrinter>) -> Self {
        Self {
            receiver,
            recorder: ResultRecorder::new(),
            printer,
        }
    }

    /// Start consuming on a new thread. The handle yields the final
    /// statistics once a shutdown sentinel has been processed.
    pub fn spawn(self) -> io::Result<JoinHandle<ResultRecorder>> {
        thread::Builder::new()
            .name("result-processor".to_string())
            .spawn(move || self.run())
    }

    /// Process records until shutdown, returning the statistics.
    pub fn run(mut self) -> ResultRecorder {
        let mut dispatching = true;
        while let Some(item) = self.receiver.recv_blocking() {
            let record = match item {
                QueueItem::Shutdown => break,
                QueueItem::Record(record) => record,
            };
            if !dispatching {
                tracing::debug!(?record, "discarding record after fatal error");
                continue;
            }

            self.process(&record);
            if matches!(record, ResultRecord::Error { .. } | ResultRecord::CtrlC { .. }) {
                dispatching = false;
            }
        }
        self.recorder
    }

    fn process(&mut self, record: &ResultRecord) {
        self.recorder.record(record);
        if let Some(printer) = self.printer.as_mut() {
            if let Err(err) = printer.print(record, &self.recorder) {
                tracing::warn!(error = %err, "result printer failed, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{ResultQueue, TransferTarget, TransferType};
    use crate::ui::{PrinterMode, SharedOutput};

    fn target(src: &str) -> TransferTarget {
        TransferTarget::new(TransferType::Delete, src, None)
    }

    #[test]
    fn test_processes_until_shutdown() {
        let (queue, receiver) = ResultQueue::new();
        let handle = ResultProcessor::new(receiver, None).spawn().expect("spawn processor");

        queue.put(ResultRecord::Queued {
            target: target("s3://b/a"),
            total_transfer_size: Some(0),
        });
        queue.put(ResultRecord::Success {
            target: target("s3://b/a"),
        });
        queue.shutdown();

        let stats = handle.join().expect("join processor");
        assert_eq!(stats.files_transferred, 1);
        assert_eq!(stats.expected_files_transferred, 1);
    }

    #[test]
    fn test_records_after_error_are_drained_not_dispatched() {
        let (queue, receiver) = ResultQueue::new();
        let (out, _out_buf) = SharedOutput::capture();
        let (err, err_buf) = SharedOutput::capture();
        let printer = ResultPrinter::new(PrinterMode::NoProgress, out, err);

        queue.put(ResultRecord::Error {
            error: "listing failed".to_string(),
        });
        queue.put(ResultRecord::Failure {
            target: target("s3://b/late"),
            error: "ignored".to_string(),
        });
        queue.shutdown();

        let stats = ResultProcessor::new(receiver, Some(printer)).run();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.files_failed, 0);
        assert_eq!(err_buf.contents(), "fatal error: listing failed\n");
    }
}
