//! In-memory content store

use crate::error::{Result, StoreError};
use crate::store::{content_type_for, ContentStore, FileMetadata, StoredFile};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use tokio::sync::RwLock;

/// Files held in a map keyed by `(bucket, key)`
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<(String, String), StoredFile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` under `bucket`/`key`, replacing any previous file
    pub async fn put(&self, bucket: &str, key: &str, content: impl Into<Bytes>) {
        let content = content.into();
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);

        let file = StoredFile {
            size: content.len() as u64,
            content,
            last_modified: Some(Utc::now()),
            content_type: content_type_for(key).map(str::to_string),
            etag: Some(format!("{:016x}", hasher.finish())),
        };
        self.files
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), file);
        tracing::debug!(bucket, key, "Stored file");
    }

    /// Remove a file, returning whether it existed
    pub async fn remove(&self, bucket: &str, key: &str) -> bool {
        self.files
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_file(&self, bucket: &str, key: &str) -> Result<StoredFile> {
        self.files
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn file_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .files
            .read()
            .await
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn list_files(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<Vec<String>> {
        let files = self.files.read().await;
        let start = (bucket.to_string(), prefix.to_string());
        Ok(files
            .range(start..)
            .take_while(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), _)| k.clone())
            .take(max_keys.unwrap_or(usize::MAX))
            .collect())
    }

    async fn get_file_metadata(&self, bucket: &str, key: &str) -> Result<FileMetadata> {
        self.get_file(bucket, key).await.map(|file| file.metadata())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
