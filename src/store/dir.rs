//! Directory-backed object store
//!
//! Each bucket is a directory under the store root and each key a file
//! below it. Attributes that a filesystem cannot hold (storage class,
//! content type, user metadata) live in a JSON sidecar tree under
//! `<root>/.objsync-meta/<bucket>/<key>.json`.

use super::{ListPage, ObjectInfo, ObjectStore, StoreError};
use crate::hash::{file_etag, object_etag};
use crate::transfer::ExtraArgs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const META_DIR: &str = ".objsync-meta";
const STAGING_DIR: &str = ".staging";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    restore: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

/// Object store rooted at a local directory.
#[derive(Debug)]
pub struct DirObjectStore {
    root: PathBuf,
    staging_seq: AtomicU64,
}

impl DirObjectStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(META_DIR).join(STAGING_DIR))?;
        Ok(Self {
            root,
            staging_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        if bucket.is_empty() || bucket.starts_with('.') || bucket.contains(['/', '\\']) {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    fn existing_bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        Ok(dir)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.starts_with('/')
            && !key.ends_with('/')
            && key.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        if !valid {
            return Err(StoreError::Service {
                code: "InvalidKey".to_string(),
                message: format!("key cannot be stored in a directory store: {}", key),
            });
        }
        let mut path = self.bucket_dir(bucket)?;
        path.extend(key.split('/'));
        Ok(path)
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(META_DIR).join(bucket);
        path.extend(key.split('/'));
        let mut name = path.into_os_string();
        name.push(".json");
        PathBuf::from(name)
    }

    fn read_sidecar(&self, bucket: &str, key: &str) -> Result<Sidecar, StoreError> {
        match fs::read(self.sidecar_path(bucket, key)) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Io(format!("corrupt metadata for {}/{}: {}", bucket, key, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Sidecar::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_sidecar(&self, bucket: &str, key: &str, sidecar: &Sidecar) -> Result<(), StoreError> {
        let path = self.sidecar_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(sidecar)
            .map_err(|e| StoreError::Io(format!("cannot encode metadata: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Write then rename, so readers never see a half-written object.
    fn write_body(&self, path: &Path, body: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let seq = self.staging_seq.fetch_add(1, Ordering::Relaxed);
        let staging = self
            .root
            .join(META_DIR)
            .join(STAGING_DIR)
            .join(format!("{}-{}.part", std::process::id(), seq));

        let mut file = fs::File::create(&staging)?;
        file.write_all(body)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&staging, path)?;
        Ok(())
    }

    fn info_for(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        compute_etag: bool,
    ) -> Result<ObjectInfo, StoreError> {
        let metadata = fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                e.into()
            }
        })?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        let sidecar = self.read_sidecar(bucket, key)?;
        let etag = match sidecar.etag {
            Some(etag) => Some(etag),
            None if compute_etag => Some(file_etag(path)?),
            None => None,
        };

        Ok(ObjectInfo {
            key: key.to_string(),
            size: metadata.len(),
            last_modified: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default(),
            storage_class: sidecar.storage_class,
            restore: sidecar.restore,
            etag,
            content_type: sidecar.content_type,
            metadata: sidecar.metadata,
        })
    }

    fn prune_empty_dirs(&self, bucket_dir: &Path, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == bucket_dir || !dir.starts_with(bucket_dir) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

impl ObjectStore for DirObjectStore {
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        let bucket_dir = self.existing_bucket_dir(bucket)?;

        let walker = ignore::WalkBuilder::new(&bucket_dir)
            .standard_filters(false)
            .follow_links(false)
            .build();

        let mut keys: Vec<(String, PathBuf)> = Vec::new();
        for result in walker {
            let entry = result.map_err(|e| StoreError::Io(e.to_string()))?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&bucket_dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let after_token = continuation.map_or(true, |token| key.as_str() > token);
            if key.starts_with(prefix) && after_token {
                keys.push((key, entry.into_path()));
            }
        }
        keys.sort();

        let page_size = page_size.max(1);
        let next_continuation = if keys.len() > page_size {
            keys.truncate(page_size);
            keys.last().map(|(key, _)| key.clone())
        } else {
            None
        };

        let objects = keys
            .iter()
            .map(|(key, path)| self.info_for(bucket, key, path, false))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListPage {
            objects,
            next_continuation,
        })
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, StoreError> {
        self.existing_bucket_dir(bucket)?;
        let path = self.object_path(bucket, key)?;
        self.info_for(bucket, key, &path, true)
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        self.existing_bucket_dir(bucket)?;
        let path = self.object_path(bucket, key)?;
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                e.into()
            }
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        args: &ExtraArgs,
    ) -> Result<(), StoreError> {
        self.existing_bucket_dir(bucket)?;
        let path = self.object_path(bucket, key)?;
        self.write_body(&path, &body)?;
        self.write_sidecar(
            bucket,
            key,
            &Sidecar {
                storage_class: args.storage_class.clone(),
                restore: None,
                content_type: args.content_type.clone(),
                etag: Some(object_etag(&body)),
                metadata: args.metadata.clone(),
            },
        )
    }

    fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
        args: &ExtraArgs,
    ) -> Result<(), StoreError> {
        let body = self.get_object(source_bucket, source_key)?;
        let source = self.read_sidecar(source_bucket, source_key)?;
        let replace = args.metadata_directive.as_deref() == Some("REPLACE");

        self.existing_bucket_dir(bucket)?;
        let path = self.object_path(bucket, key)?;
        self.write_body(&path, &body)?;
        self.write_sidecar(
            bucket,
            key,
            &Sidecar {
                storage_class: args.storage_class.clone(),
                restore: None,
                content_type: if replace || args.content_type.is_some() {
                    args.content_type.clone()
                } else {
                    source.content_type
                },
                etag: Some(object_etag(&body)),
                metadata: if replace {
                    args.metadata.clone()
                } else {
                    source.metadata
                },
            },
        )
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let bucket_dir = self.existing_bucket_dir(bucket)?;
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path) {
            Ok(()) => self.prune_empty_dirs(&bucket_dir, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match fs::remove_file(self.sidecar_path(bucket, key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
