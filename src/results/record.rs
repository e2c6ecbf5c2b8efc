//! Records exchanged between producers and the result consumer

use crate::types::Operation;
use std::fmt;
use std::time::Instant;

/// Name shown for a transfer in result lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferType {
    Upload,
    Download,
    Copy,
    Delete,
    Move,
}

impl TransferType {
    /// Result name for `operation`; every transfer of a move reads `move`.
    pub fn for_operation(operation: Operation, is_move: bool) -> Self {
        if is_move {
            return TransferType::Move;
        }
        match operation {
            Operation::Upload => TransferType::Upload,
            Operation::Download => TransferType::Download,
            Operation::Copy => TransferType::Copy,
            Operation::Delete => TransferType::Delete,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferType::Upload => "upload",
            TransferType::Download => "download",
            TransferType::Copy => "copy",
            TransferType::Delete => "delete",
            TransferType::Move => "move",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one transfer as displayed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferTarget {
    pub transfer_type: TransferType,
    pub src: String,
    pub dest: Option<String>,
}

impl TransferTarget {
    pub fn new(transfer_type: TransferType, src: impl Into<String>, dest: Option<String>) -> Self {
        Self {
            transfer_type,
            src: src.into(),
            dest,
        }
    }

    /// Key used to track in-flight progress: `type:src[:dest]`.
    pub fn ongoing_key(&self) -> String {
        match &self.dest {
            Some(dest) => format!("{}:{}:{}", self.transfer_type, self.src, dest),
            None => format!("{}:{}", self.transfer_type, self.src),
        }
    }

    /// `src` or `src to dest`.
    pub fn location(&self) -> String {
        match &self.dest {
            Some(dest) => format!("{} to {}", self.src, dest),
            None => self.src.clone(),
        }
    }
}

/// One event on the result queue.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRecord {
    Queued {
        target: TransferTarget,
        total_transfer_size: Option<u64>,
    },
    Progress {
        target: TransferTarget,
        bytes_transferred: u64,
        total_transfer_size: Option<u64>,
        timestamp: Instant,
    },
    Success {
        target: TransferTarget,
    },
    Failure {
        target: TransferTarget,
        error: String,
    },
    /// Non-file error that aborted the command
    Error {
        error: String,
    },
    CtrlC {
        error: String,
    },
    DryRun {
        target: TransferTarget,
    },
    FinalTotalSubmissions {
        total_submissions: usize,
    },
    /// Fully formatted `warning: ...` line
    Warning {
        message: String,
    },
}

/// Terminal summary of a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub num_tasks_failed: usize,
    pub num_tasks_warned: usize,
}

/// Build a warning record.
///
/// With `skip_file` the message is prefixed by `Skipping file <path>. `.
pub fn create_warning(path: &str, message: &str, skip_file: bool) -> ResultRecord {
    let mut text = String::from("warning: ");
    if skip_file {
        text.push_str(&format!("Skipping file {}. ", path));
    }
    text.push_str(message);
    ResultRecord::Warning { message: text }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_type_for_move() {
        assert_eq!(
            TransferType::for_operation(Operation::Upload, true),
            TransferType::Move
        );
        assert_eq!(
            TransferType::for_operation(Operation::Download, false).to_string(),
            "download"
        );
    }

    #[test]
    fn test_ongoing_key_with_and_without_dest() {
        let copy = TransferTarget::new(TransferType::Copy, "s3://a/k", Some("s3://b/k".to_string()));
        assert_eq!(copy.ongoing_key(), "copy:s3://a/k:s3://b/k");
        assert_eq!(copy.location(), "s3://a/k to s3://b/k");

        let delete = TransferTarget::new(TransferType::Delete, "s3://a/k", None);
        assert_eq!(delete.ongoing_key(), "delete:s3://a/k");
        assert_eq!(delete.location(), "s3://a/k");
    }

    #[test]
    fn test_create_warning_skip_prefix() {
        let record = create_warning("./big.iso", "File is too large.", true);
        assert_eq!(
            record,
            ResultRecord::Warning {
                message: "warning: Skipping file ./big.iso. File is too large.".to_string()
            }
        );
    }

    #[test]
    fn test_create_warning_without_skip() {
        let record = create_warning("./a", "Something odd.", false);
        assert_eq!(
            record,
            ResultRecord::Warning {
                message: "warning: Something odd.".to_string()
            }
        );
    }
}
