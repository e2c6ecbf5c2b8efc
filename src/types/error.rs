//! Error types for objsync

use crate::store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for objsync orchestration.
///
/// Per-file problems never surface here; they travel through the result
/// queue as `Failure` or `Warning` records. A `SyncError` aborts the whole
/// command and becomes a single `fatal error:` line.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Standard IO error (automatically converted via #[from])
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument combination or path (logic checks)
    #[error("{0}")]
    Validation(String),

    /// Permission denied for specific path
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Object store failure while listing or looking up keys
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An include/exclude glob could not be compiled
    #[error("Invalid filter pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// The transfer layer failed as a whole (not a single file)
    #[error("Transfer manager error: {0}")]
    Transfer(String),

    /// The user interrupted the command
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Check if this error is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(self, SyncError::Validation(_) | SyncError::Config(_))
    }

    /// Check if this error stems from a user interrupt
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    /// Check if this error is related to permissions
    pub fn is_permission_error(&self) -> bool {
        match self {
            SyncError::PermissionDenied { .. } => true,
            SyncError::Io(err) => err.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    // Automatic Conversion Tests (#[from] macro)

    #[test]
    fn test_io_error_automatic_conversion() {
        let io_error = IoError::new(ErrorKind::NotFound, "file not found");
        let sync_error: SyncError = io_error.into();

        assert!(matches!(sync_error, SyncError::Io(_)));
        assert!(sync_error.to_string().contains("IO error"));
    }

    #[test]
    fn test_store_error_keeps_its_message() {
        let err: SyncError = StoreError::NotFound {
            bucket: "bucket".to_string(),
            key: "missing.txt".to_string(),
        }
        .into();

        assert_eq!(err.to_string(), "Key \"missing.txt\" does not exist");
    }

    #[test]
    fn test_validation_error_is_plain_message() {
        let error = SyncError::Validation("Cannot mv a file onto itself".to_string());
        assert_eq!(error.to_string(), "Cannot mv a file onto itself");
        assert!(error.is_validation_error());
    }

    #[test]
    fn test_pattern_error() {
        let error = SyncError::Pattern {
            pattern: "[".to_string(),
            message: "unclosed character class".to_string(),
        };
        assert!(error.to_string().contains("'['"));
        assert!(!error.is_validation_error());
    }

    #[test]
    fn test_is_cancellation() {
        assert!(SyncError::Cancelled.is_cancellation());
        assert!(!SyncError::Config("x".to_string()).is_cancellation());
    }

    #[test]
    fn test_is_permission_error() {
        assert!(SyncError::PermissionDenied {
            path: PathBuf::from("file.txt")
        }
        .is_permission_error());
        assert!(SyncError::Io(IoError::new(ErrorKind::PermissionDenied, "denied"))
            .is_permission_error());
        assert!(!SyncError::Io(IoError::new(ErrorKind::NotFound, "gone")).is_permission_error());
    }

    #[test]
    fn test_result_propagation() {
        fn inner_function() -> Result<(), SyncError> {
            Err(SyncError::Config("test error".to_string()))
        }

        fn outer_function() -> Result<(), SyncError> {
            inner_function()?;
            Ok(())
        }

        let result = outer_function();
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
