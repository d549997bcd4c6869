//! Error types for the content store

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store failed or rejected the request
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File not found: {bucket}/{key}")]
    FileNotFound { bucket: String, key: String },

    /// Bundle or manifest missing for a slug
    #[error("Plugin not found: {slug}")]
    PluginNotFound { slug: String },

    #[error("Invalid manifest for plugin {slug}: {source}")]
    InvalidManifest {
        slug: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Storage(_) | StoreError::FileNotFound { .. } => "STORAGE_ERROR",
            StoreError::PluginNotFound { .. } => "PLUGIN_NOT_FOUND",
            StoreError::InvalidManifest { .. } => "INVALID_MANIFEST",
        }
    }

    pub(crate) fn not_found(bucket: &str, key: &str) -> Self {
        StoreError::FileNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}
