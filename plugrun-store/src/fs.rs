//! Filesystem content store
//!
//! Buckets are directories under a root and keys are `/`-separated paths
//! inside them. Keys that would leave the bucket directory are rejected
//! before the filesystem is touched.

use crate::error::{Result, StoreError};
use crate::store::{content_type_for, ContentStore, FileMetadata, StoredFile};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Files under a root directory, laid out as `{root}/{bucket}/{key}`
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        check_relative(bucket, "bucket")?;
        Ok(self.root.join(bucket))
    }

    /// Path for `bucket`/`key`, or an error if either would escape the root
    fn path_for(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        check_relative(key, "key")?;
        Ok(self.bucket_dir(bucket)?.join(key))
    }

    async fn metadata_for(&self, bucket: &str, key: &str, path: &Path) -> Result<FileMetadata> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| io_error(e, bucket, key))?;
        if !meta.is_file() {
            return Err(StoreError::not_found(bucket, key));
        }

        let last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
        let etag = last_modified.map(|t| format!("{:x}-{:x}", meta.len(), t.timestamp_millis()));
        Ok(FileMetadata {
            size: meta.len(),
            last_modified,
            content_type: content_type_for(key).map(str::to_string),
            etag,
        })
    }
}

/// Only plain path components are allowed
fn check_relative(value: &str, what: &str) -> Result<()> {
    let path = Path::new(value);
    let plain = !value.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if plain {
        Ok(())
    } else {
        Err(StoreError::Storage(format!(
            "{} `{}` resolves outside the store root",
            what, value
        )))
    }
}

fn io_error(err: std::io::Error, bucket: &str, key: &str) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::not_found(bucket, key)
    } else {
        StoreError::Storage(format!("Failed to access {}/{}: {}", bucket, key, err))
    }
}

#[async_trait]
impl ContentStore for FsStore {
    async fn get_file(&self, bucket: &str, key: &str) -> Result<StoredFile> {
        let path = self.path_for(bucket, key)?;
        let metadata = self.metadata_for(bucket, key, &path).await?;
        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(e, bucket, key))?;

        Ok(StoredFile {
            size: content.len() as u64,
            content: Bytes::from(content),
            last_modified: metadata.last_modified,
            content_type: metadata.content_type,
            etag: metadata.etag,
        })
    }

    async fn file_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let path = self.path_for(bucket, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(e, bucket, key)),
        }
    }

    async fn list_files(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<Vec<String>> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let mut keys = Vec::new();
        let mut pending = vec![(bucket_dir, String::new())];

        while let Some((dir, relative)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(e, bucket, &relative)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error(e, bucket, &relative))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = if relative.is_empty() {
                    name
                } else {
                    format!("{}/{}", relative, name)
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| io_error(e, bucket, &key))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), key));
                } else if file_type.is_file() && key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        if let Some(max) = max_keys {
            keys.truncate(max);
        }
        Ok(keys)
    }

    async fn get_file_metadata(&self, bucket: &str, key: &str) -> Result<FileMetadata> {
        let path = self.path_for(bucket, key)?;
        self.metadata_for(bucket, key, &path).await
    }

    fn name(&self) -> &str {
        "fs"
    }
}
