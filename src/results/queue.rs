//! The result queue: many producers, one consumer

use super::record::ResultRecord;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

pub(crate) enum QueueItem {
    Record(ResultRecord),
    Shutdown,
}

/// Producer handle. Cloned into every submitter and subscriber.
///
/// The channel is unbounded, so `put` never blocks a transfer thread.
#[derive(Clone)]
pub struct ResultQueue {
    tx: UnboundedSender<QueueItem>,
}

/// Consumer half, owned by the result processor thread.
pub struct ResultReceiver {
    rx: UnboundedReceiver<QueueItem>,
}

impl ResultQueue {
    pub fn new() -> (ResultQueue, ResultReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ResultQueue { tx }, ResultReceiver { rx })
    }

    pub fn put(&self, record: ResultRecord) {
        if self.tx.send(QueueItem::Record(record)).is_err() {
            tracing::debug!("result consumer is gone, dropping record");
        }
    }

    /// Ask the consumer to stop once everything queued so far is handled.
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(QueueItem::Shutdown);
    }
}

impl ResultReceiver {
    /// Block until the next item arrives. `None` once every sender is gone.
    pub(crate) fn recv_blocking(&mut self) -> Option<QueueItem> {
        self.rx.blocking_recv()
    }

    /// Records queued so far, without blocking. Stops at a shutdown sentinel.
    pub fn drain(&mut self) -> Vec<ResultRecord> {
        let mut records = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(QueueItem::Record(record)) => records.push(record),
                Ok(QueueItem::Shutdown) | Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                    break
                }
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_drain_preserves_order() {
        let (queue, mut receiver) = ResultQueue::new();
        queue.put(ResultRecord::Warning {
            message: "first".to_string(),
        });
        queue.put(ResultRecord::FinalTotalSubmissions {
            total_submissions: 1,
        });

        let records = receiver.drain();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], ResultRecord::Warning { .. }));
        assert!(matches!(
            records[1],
            ResultRecord::FinalTotalSubmissions { total_submissions: 1 }
        ));
    }

    #[test]
    fn test_put_after_consumer_dropped_does_not_panic() {
        let (queue, receiver) = ResultQueue::new();
        drop(receiver);
        queue.put(ResultRecord::Error {
            error: "late".to_string(),
        });
    }
}
