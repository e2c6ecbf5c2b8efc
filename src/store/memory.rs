//! In-memory object store

use super::{ListPage, ObjectInfo, ObjectStore, StoreError};
use crate::hash::object_etag;
use crate::transfer::ExtraArgs;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    info: ObjectInfo,
    args: ExtraArgs,
}

type Buckets = BTreeMap<String, BTreeMap<String, StoredObject>>;

/// Number of calls made against a [`MemoryObjectStore`], per request kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub head: usize,
    pub get: usize,
    pub put: usize,
    pub copy: usize,
    pub delete: usize,
}

impl CallCounts {
    /// Calls that change the store's contents.
    pub fn mutations(&self) -> usize {
        self.put + self.copy + self.delete
    }
}

/// Object contents and attributes used to seed a store directly.
#[derive(Debug, Clone, Default)]
pub struct SeedObject {
    pub body: Vec<u8>,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
    pub restore: Option<String>,
}

impl SeedObject {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn modified_at(mut self, when: DateTime<Utc>) -> Self {
        self.last_modified = Some(when);
        self
    }

    pub fn storage_class(mut self, class: &str) -> Self {
        self.storage_class = Some(class.to_string());
        self
    }

    pub fn restore(mut self, status: &str) -> Self {
        self.restore = Some(status.to_string());
        self
    }
}

/// `BTreeMap`-backed store that keeps keys ordered like a real listing.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<Buckets>,
    calls: Mutex<CallCounts>,
    failing: Mutex<BTreeSet<(String, String)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`create_bucket`](Self::create_bucket).
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.create_bucket(bucket);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        if let Ok(mut buckets) = self.buckets.lock() {
            buckets.entry(bucket.to_string()).or_default();
        }
    }

    /// Insert an object without counting a call, creating the bucket if needed.
    pub fn seed(&self, bucket: &str, key: &str, seed: SeedObject) {
        let info = ObjectInfo {
            key: key.to_string(),
            size: seed.body.len() as u64,
            last_modified: seed.last_modified.unwrap_or_else(Utc::now),
            storage_class: seed.storage_class,
            restore: seed.restore,
            etag: Some(object_etag(&seed.body)),
            content_type: None,
            metadata: BTreeMap::new(),
        };
        if let Ok(mut buckets) = self.buckets.lock() {
            buckets.entry(bucket.to_string()).or_default().insert(
                key.to_string(),
                StoredObject {
                    body: seed.body,
                    info,
                    args: ExtraArgs::default(),
                },
            );
        }
    }

    /// Make every mutating or reading call on `bucket/key` fail.
    pub fn fail_on(&self, bucket: &str, key: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert((bucket.to_string(), key.to_string()));
        }
    }

    pub fn body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.stored(bucket, key).map(|obj| obj.body)
    }

    pub fn object_info(&self, bucket: &str, key: &str) -> Option<ObjectInfo> {
        self.stored(bucket, key).map(|obj| obj.info)
    }

    /// Extra arguments the object was last written with.
    pub fn object_args(&self, bucket: &str, key: &str) -> Option<ExtraArgs> {
        self.stored(bucket, key).map(|obj| obj.args)
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .ok()
            .and_then(|buckets| buckets.get(bucket).map(|objs| objs.keys().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn calls(&self) -> CallCounts {
        self.calls.lock().map(|calls| *calls).unwrap_or_default()
    }

    fn stored(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        let buckets = self.buckets.lock().ok()?;
        buckets.get(bucket)?.get(key).cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Buckets>, StoreError> {
        self.buckets
            .lock()
            .map_err(|_| StoreError::Io("memory store lock poisoned".to_string()))
    }

    fn count(&self, bump: impl FnOnce(&mut CallCounts)) {
        if let Ok(mut calls) = self.calls.lock() {
            bump(&mut calls);
        }
    }

    fn check_failure(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let failing = self
            .failing
            .lock()
            .map(|set| set.contains(&(bucket.to_string(), key.to_string())))
            .unwrap_or(false);
        if failing {
            return Err(StoreError::Service {
                code: "InternalError".to_string(),
                message: format!("injected failure for {}/{}", bucket, key),
            });
        }
        Ok(())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        self.count(|c| c.list += 1);
        let buckets = self.lock()?;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;

        let start = match continuation {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let page_size = page_size.max(1);
        let mut page: Vec<ObjectInfo> = objects
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(page_size + 1)
            .map(|(_, obj)| obj.info.clone())
            .collect();

        let next_continuation = if page.len() > page_size {
            page.truncate(page_size);
            page.last().map(|info| info.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next_continuation,
        })
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, StoreError> {
        self.count(|c| c.head += 1);
        let buckets = self.lock()?;
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| obj.info.clone())
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.count(|c| c.get += 1);
        self.check_failure(bucket, key)?;
        let buckets = self.lock()?;
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|obj| obj.body.clone())
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        args: &ExtraArgs,
    ) -> Result<(), StoreError> {
        self.count(|c| c.put += 1);
        self.check_failure(bucket, key)?;
        let mut buckets = self.lock()?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;

        let info = ObjectInfo {
            key: key.to_string(),
            size: body.len() as u64,
            last_modified: Utc::now(),
            storage_class: args.storage_class.clone(),
            restore: None,
            etag: Some(object_etag(&body)),
            content_type: args.content_type.clone(),
            metadata: args.metadata.clone(),
        };
        objects.insert(
            key.to_string(),
            StoredObject {
                body,
                info,
                args: args.clone(),
            },
        );
        Ok(())
    }

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
        args: &ExtraArgs,
    ) -> Result<(), StoreError> {
        self.count(|c| c.copy += 1);
        self.check_failure(source_bucket, source_key)?;
        self.check_failure(bucket, key)?;
        let mut buckets = self.lock()?;
        let source = buckets
            .get(source_bucket)
            .and_then(|objects| objects.get(source_key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: source_bucket.to_string(),
                key: source_key.to_string(),
            })?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;

        let replace = args.metadata_directive.as_deref() == Some("REPLACE");
        let info = ObjectInfo {
            key: key.to_string(),
            size: source.info.size,
            last_modified: Utc::now(),
            storage_class: args.storage_class.clone(),
            restore: None,
            etag: source.info.etag.clone(),
            content_type: if replace || args.content_type.is_some() {
                args.content_type.clone()
            } else {
                source.info.content_type.clone()
            },
            metadata: if replace {
                args.metadata.clone()
            } else {
                source.info.metadata.clone()
            },
        };
        objects.insert(
            key.to_string(),
            StoredObject {
                body: source.body,
                info,
                args: args.clone(),
            },
        );
        Ok(())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.count(|c| c.delete += 1);
        self.check_failure(bucket, key)?;
        let mut buckets = self.lock()?;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }
}
