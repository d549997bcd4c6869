//! Content store trait and file types

use crate::error::{Result, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file read from a store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub content: Bytes,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

impl StoredFile {
    /// Content as UTF-8 text
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.content)
            .map_err(|e| StoreError::Storage(format!("File is not valid UTF-8: {}", e)))
    }

    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            size: self.size,
            last_modified: self.last_modified,
            content_type: self.content_type.clone(),
            etag: self.etag.clone(),
        }
    }
}

/// File attributes without the content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: u64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub etag: Option<String>,
}

/// Read-only access to files addressed by bucket and key
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_file(&self, bucket: &str, key: &str) -> Result<StoredFile>;

    async fn file_exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Keys starting with `prefix`, sorted, at most `max_keys` of them
    async fn list_files(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: Option<usize>,
    ) -> Result<Vec<String>>;

    async fn get_file_metadata(&self, bucket: &str, key: &str) -> Result<FileMetadata>;

    /// Get store name
    fn name(&self) -> &str;
}

/// Content type implied by a key's extension
pub fn content_type_for(key: &str) -> Option<&'static str> {
    let extension = key.rsplit_once('.').map(|(_, ext)| ext)?;
    match extension {
        "js" | "mjs" | "cjs" => Some("application/javascript"),
        "ts" | "tsx" => Some("application/typescript"),
        "json" => Some("application/json"),
        "txt" | "md" => Some("text/plain"),
        _ => None,
    }
}
