//! Remote collaborators of the upload pipeline.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reference to an uploaded object, as returned by the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    pub key: String,
    /// Store-specific location (URL or path) of the stored bytes.
    pub location: String,
}

/// Record written to the metadata store once the bytes are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub filename: String,
    #[serde(rename = "url")]
    pub remote_url: String,
    #[serde(rename = "uploaded_at")]
    pub uploaded_at_epoch_millis: i64,
    #[serde(rename = "file_size")]
    pub file_size_bytes: u64,
    pub retry_count: u32,
}

/// Blob storage for recording bytes. Overwriting an existing key is allowed.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, local_path: &Path) -> Result<RemoteRef>;

    /// Resolve a fetchable URL for a stored object.
    async fn download_url(&self, remote: &RemoteRef) -> Result<String>;
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn record_metadata(&self, record: &RecordingMetadata) -> Result<()>;
}
