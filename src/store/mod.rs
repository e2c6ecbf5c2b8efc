//! Object store abstraction
//!
//! The pipeline talks to object storage only through [`ObjectStore`], so the
//! listing, comparison, and transfer logic is independent of any wire client.
//! Two implementations ship with the crate: an in-memory store used by tests
//! and a directory-backed store used by the binary.

mod dir;
mod memory;

pub use dir::DirObjectStore;
pub use memory::{CallCounts, MemoryObjectStore, SeedObject};

use crate::transfer::ExtraArgs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Storage classes whose objects must be restored before they can be read.
pub const GLACIER_STORAGE_CLASSES: [&str; 2] = ["GLACIER", "DEEP_ARCHIVE"];

/// Metadata describing one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    /// Restore status, e.g. `ongoing-request="false", expiry-date="..."`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ObjectInfo {
    /// Archived in cold storage and not restored.
    pub fn is_glacier_object(&self) -> bool {
        let cold = self
            .storage_class
            .as_deref()
            .is_some_and(|class| GLACIER_STORAGE_CLASSES.contains(&class));
        cold && !self.is_restored()
    }

    /// A completed restore leaves `ongoing-request="false"` in the status.
    pub fn is_restored(&self) -> bool {
        self.restore
            .as_deref()
            .is_some_and(|status| status.contains("ongoing-request=\"false\""))
    }
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects in ascending key order
    pub objects: Vec<ObjectInfo>,
    /// Token to pass back for the next page, `None` on the last page
    pub next_continuation: Option<String>,
}

/// Errors reported by an object store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Key \"{key}\" does not exist")]
    NotFound { bucket: String, key: String },

    #[error("The specified bucket does not exist: {0}")]
    NoSuchBucket(String),

    #[error("An error occurred ({code}): {message}")]
    Service { code: String, message: String },

    #[error("{0}")]
    Io(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Minimal object-storage client used by the pipeline.
///
/// Calls are synchronous; the transfer layer runs them on a blocking pool.
pub trait ObjectStore: Send + Sync {
    /// List up to `page_size` objects under `prefix`, starting after the
    /// position encoded in `continuation`.
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StoreError>;

    /// Look up a single object.
    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, StoreError>;

    /// Fetch an object's body.
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store `body` under `key`, applying the request parameters in `args`.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        args: &ExtraArgs,
    ) -> Result<(), StoreError>;

    /// Server-side copy between two keys of this store.
    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
        args: &ExtraArgs,
    ) -> Result<(), StoreError>;

    /// Remove an object. Deleting a missing key is not an error.
    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn object(class: Option<&str>, restore: Option<&str>) -> ObjectInfo {
        ObjectInfo {
            key: "a".to_string(),
            size: 1,
            last_modified: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            storage_class: class.map(str::to_string),
            restore: restore.map(str::to_string),
            etag: None,
            content_type: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_standard_object_is_not_archived() {
        assert!(!object(None, None).is_glacier_object());
        assert!(!object(Some("STANDARD"), None).is_glacier_object());
    }

    #[test]
    fn test_deep_archive_is_archived() {
        assert!(object(Some("DEEP_ARCHIVE"), None).is_glacier_object());
    }

    #[test]
    fn test_restored_archive_is_readable() {
        let info = object(Some("GLACIER"), Some("ongoing-request=\"false\", expiry-date=\"soon\""));
        assert!(info.is_restored());
        assert!(!info.is_glacier_object());
    }

    #[test]
    fn test_not_found_message() {
        let err = StoreError::NotFound {
            bucket: "b".to_string(),
            key: "k".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Key \"k\" does not exist");
    }

    #[test]
    fn test_object_info_json_omits_unset_fields() {
        let json = serde_json::to_string(&object(None, None)).expect("serialize object info");
        assert!(!json.contains("storage_class"));
        assert!(!json.contains("metadata"));
    }
}
