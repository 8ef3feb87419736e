//! HTTP implementations of the object and metadata stores.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use tracing::{debug, error, info};

use super::store::{MetadataStore, ObjectStore, RecordingMetadata, RemoteRef};

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("3gp") => "audio/3gpp",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

/// Stores objects with `PUT {endpoint}/{key}`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    public_base_url: Option<String>,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>, public_base_url: Option<String>) -> Self {
        let endpoint = endpoint.into();
        info!("Initialized HTTP object store at {}", endpoint);
        Self {
            client: reqwest::Client::new(),
            endpoint,
            public_base_url,
        }
    }

    pub fn object_url(&self, key: &str) -> String {
        join_url(&self.endpoint, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(&self, key: &str, local_path: &Path) -> Result<RemoteRef> {
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {:?}", local_path))?;
        let url = self.object_url(key);
        debug!("PUT {} ({} bytes)", url, bytes.len());

        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type_for(local_path))
            .body(bytes)
            .send()
            .await
            .context("Failed to send object upload request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Object upload failed with status {}: {}", status, body);
            bail!("Object store returned {}: {}", status, body.trim());
        }

        Ok(RemoteRef {
            key: key.to_string(),
            location: url,
        })
    }

    async fn download_url(&self, remote: &RemoteRef) -> Result<String> {
        let url = match &self.public_base_url {
            Some(base) => join_url(base, &remote.key),
            None => remote.location.clone(),
        };
        let parsed = reqwest::Url::parse(&url)
            .with_context(|| format!("Invalid download URL '{}'", url))?;
        Ok(parsed.to_string())
    }
}

/// Posts each record as JSON to a collection endpoint.
pub struct HttpMetadataStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMetadataStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        info!("Initialized HTTP metadata store at {}", endpoint);
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl MetadataStore for HttpMetadataStore {
    async fn record_metadata(&self, record: &RecordingMetadata) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .context("Failed to send metadata request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Metadata write failed with status {}: {}", status, body);
            bail!("Metadata store returned {}: {}", status, body.trim());
        }

        debug!("Metadata recorded for {}", record.filename);
        Ok(())
    }
}
