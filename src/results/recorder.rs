//! Running statistics built from the result stream

use super::record::{ResultRecord, TransferTarget};
use std::collections::HashMap;
use std::time::Instant;

/// Aggregate statistics for one command.
///
/// Updated only by the result consumer thread, so no field needs locking.
/// In-flight transfers are tracked by their `type:src[:dest]` key, which
/// makes the totals independent of how records for different files
/// interleave.
#[derive(Debug, Clone, Default)]
pub struct ResultRecorder {
    pub bytes_transferred: u64,
    pub bytes_failed_to_transfer: u64,
    pub files_transferred: usize,
    pub files_failed: usize,
    pub files_warned: usize,
    pub errors: usize,
    pub expected_bytes_transferred: u64,
    pub expected_files_transferred: usize,
    pub final_expected_files_transferred: Option<usize>,
    pub start_time: Option<Instant>,
    /// Bytes per second since the first queued transfer
    pub bytes_transfer_speed: f64,
    ongoing_progress: HashMap<String, u64>,
    ongoing_total_sizes: HashMap<String, Option<u64>>,
}

impl ResultRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the producer has announced how many transfers it
    /// submitted and all of them have been queued.
    pub fn expected_totals_are_final(&self) -> bool {
        self.final_expected_files_transferred == Some(self.expected_files_transferred)
    }

    /// Transfers queued but not yet finished.
    pub fn remaining_files(&self) -> usize {
        self.expected_files_transferred
            .saturating_sub(self.files_transferred)
    }

    /// Fold one record into the statistics.
    pub fn record(&mut self, record: &ResultRecord) {
        match record {
            ResultRecord::Queued {
                target,
                total_transfer_size,
            } => self.record_queued(target, *total_transfer_size),
            ResultRecord::Progress {
                target,
                bytes_transferred,
                total_transfer_size,
                timestamp,
            } => self.record_progress(target, *bytes_transferred, *total_transfer_size, *timestamp),
            ResultRecord::Success { target } => {
                self.remove_ongoing(target);
                self.files_transferred += 1;
            }
            ResultRecord::Failure { target, .. } => self.record_failure(target),
            ResultRecord::Warning { .. } => self.files_warned += 1,
            ResultRecord::Error { .. } | ResultRecord::CtrlC { .. } => self.errors += 1,
            ResultRecord::FinalTotalSubmissions { total_submissions } => {
                self.final_expected_files_transferred = Some(*total_submissions);
            }
            ResultRecord::DryRun { .. } => {}
        }
    }

    fn record_queued(&mut self, target: &TransferTarget, total_transfer_size: Option<u64>) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
        let key = target.ongoing_key();
        self.ongoing_total_sizes.insert(key.clone(), total_transfer_size);
        self.ongoing_progress.insert(key, 0);
        // An unknown size is credited later, from progress records.
        if let Some(size) = total_transfer_size {
            self.expected_bytes_transferred += size;
        }
        self.expected_files_transferred += 1;
    }

    fn record_progress(
        &mut self,
        target: &TransferTarget,
        bytes: u64,
        total_transfer_size: Option<u64>,
        timestamp: Instant,
    ) {
        let key = target.ongoing_key();
        self.backfill_unknown_size(&key, bytes, total_transfer_size);
        *self.ongoing_progress.entry(key).or_insert(0) += bytes;
        self.bytes_transferred += bytes;

        match self.start_time {
            Some(start) if timestamp > start => {
                let elapsed = timestamp.duration_since(start).as_secs_f64();
                if elapsed > 0.0 {
                    self.bytes_transfer_speed = self.bytes_transferred as f64 / elapsed;
                }
            }
            Some(_) => {}
            None => self.start_time = Some(timestamp),
        }
    }

    fn backfill_unknown_size(&mut self, key: &str, bytes: u64, total_transfer_size: Option<u64>) {
        let slot = self.ongoing_total_sizes.entry(key.to_string()).or_insert(None);
        if slot.is_some() {
            return;
        }
        match total_transfer_size {
            Some(total) => {
                *slot = Some(total);
                let seen = self.ongoing_progress.get(key).copied().unwrap_or(0);
                self.expected_bytes_transferred += total.saturating_sub(seen);
            }
            None => self.expected_bytes_transferred += bytes,
        }
    }

    fn record_failure(&mut self, target: &TransferTarget) {
        let key = target.ongoing_key();
        if let Some(Some(total)) = self.ongoing_total_sizes.get(&key) {
            let seen = self.ongoing_progress.get(&key).copied().unwrap_or(0);
            self.bytes_failed_to_transfer += total.saturating_sub(seen);
        }
        self.remove_ongoing(target);
        self.files_failed += 1;
        self.files_transferred += 1;
    }

    fn remove_ongoing(&mut self, target: &TransferTarget) {
        let key = target.ongoing_key();
        self.ongoing_progress.remove(&key);
        self.ongoing_total_sizes.remove(&key);
    }
}
