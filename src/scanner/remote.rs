//! Remote listing: paginated prefix listings and single-key lookups

use crate::paths::split_bucket_key;
use crate::store::{ObjectInfo, ObjectStore};
use crate::types::{Operation, SyncError};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;

/// One listed object.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    /// `bucket/key`
    pub path: String,
    pub size: Option<u64>,
    pub last_update: Option<DateTime<Utc>>,
    pub info: Option<ObjectInfo>,
}

impl RemoteEntry {
    fn listed(path: String, info: ObjectInfo) -> Self {
        Self {
            path,
            size: Some(info.size),
            last_update: Some(info.last_modified),
            info: Some(info),
        }
    }
}

/// Walks every page of a prefix listing, fetching the next page only when
/// the current one is used up.
pub struct BucketLister {
    client: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    page_size: usize,
    continuation: Option<String>,
    buffer: VecDeque<ObjectInfo>,
    exhausted: bool,
}

impl BucketLister {
    pub fn new(client: Arc<dyn ObjectStore>, bucket: &str, prefix: &str, page_size: usize) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            page_size,
            continuation: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch_page(&mut self) -> Result<(), SyncError> {
        let page = self.client.list_objects(
            &self.bucket,
            &self.prefix,
            self.continuation.as_deref(),
            self.page_size,
        )?;
        tracing::debug!(
            bucket = %self.bucket,
            prefix = %self.prefix,
            objects = page.objects.len(),
            "listed page"
        );
        self.buffer.extend(page.objects);
        self.continuation = page.next_continuation;
        self.exhausted = self.continuation.is_none();
        Ok(())
    }
}

impl Iterator for BucketLister {
    type Item = Result<(String, ObjectInfo), SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() {
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        let info = self.buffer.pop_front()?;
        Some(Ok((format!("{}/{}", self.bucket, info.key), info)))
    }
}

/// List `path` (`bucket/key`) the way the pipeline needs it.
///
/// A single key under a non-directory operation is looked up directly
/// (deletes skip even that). Otherwise the prefix is listed; zero-byte keys
/// ending in `/` are folder markers and only kept for deletes, and
/// non-directory operations keep only the exact key.
pub fn list_objects(
    client: Arc<dyn ObjectStore>,
    path: &str,
    dir_op: bool,
    operation: Option<Operation>,
    page_size: usize,
) -> Box<dyn Iterator<Item = Result<RemoteEntry, SyncError>>> {
    let (bucket, key) = split_bucket_key(path);
    let path = path.to_string();

    if !dir_op && !key.is_empty() {
        return Box::new(std::iter::once_with(move || {
            single_object(client.as_ref(), &path, &bucket, &key, operation)
        }));
    }

    let is_delete = operation == Some(Operation::Delete);
    let lister = BucketLister::new(client, &bucket, &key, page_size);
    Box::new(lister.filter_map(move |listed| {
        let (source_path, info) = match listed {
            Ok(listed) => listed,
            Err(err) => return Some(Err(err)),
        };
        if info.size == 0 && source_path.ends_with('/') {
            return is_delete.then(|| Ok(RemoteEntry::listed(source_path, info)));
        }
        if !dir_op && source_path != path {
            return None;
        }
        Some(Ok(RemoteEntry::listed(source_path, info)))
    }))
}

fn single_object(
    client: &dyn ObjectStore,
    path: &str,
    bucket: &str,
    key: &str,
    operation: Option<Operation>,
) -> Result<RemoteEntry, SyncError> {
    if operation == Some(Operation::Delete) {
        return Ok(RemoteEntry {
            path: path.to_string(),
            size: None,
            last_update: None,
            info: None,
        });
    }
    let info = client.head_object(bucket, key)?;
    Ok(RemoteEntry::listed(path.to_string(), info))
}
