//! Object store backed by a local (or mounted) directory.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::store::{ObjectStore, RemoteRef};

pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url,
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            bail!("Invalid object key '{}'", key);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(&self, key: &str, local_path: &Path) -> Result<RemoteRef> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let copied = tokio::fs::copy(local_path, &dest)
            .await
            .with_context(|| format!("Failed to copy {:?} to {:?}", local_path, dest))?;
        debug!("Stored {} bytes at {:?}", copied, dest);

        Ok(RemoteRef {
            key: key.to_string(),
            location: dest.to_string_lossy().into_owned(),
        })
    }

    async fn download_url(&self, remote: &RemoteRef) -> Result<String> {
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{}/{}", base.trim_end_matches('/'), remote.key));
        }

        let path = PathBuf::from(&remote.location);
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        reqwest::Url::from_file_path(&absolute)
            .map(|url| url.to_string())
            .map_err(|_| anyhow!("Cannot build file URL for {:?}", absolute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_copies_under_key() {
        let src = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let file = src.path().join("call.3gp");
        std::fs::write(&file, b"amr").unwrap();

        let store = LocalObjectStore::new(root.path(), None);
        let remote = store.put_object("call_recordings/call.3gp", &file).await.unwrap();

        let stored = root.path().join("call_recordings").join("call.3gp");
        assert_eq!(std::fs::read(&stored).unwrap(), b"amr");
        let url = store.download_url(&remote).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("call_recordings/call.3gp"));
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_object() {
        let src = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let file = src.path().join("call.3gp");
        let store = LocalObjectStore::new(root.path(), None);

        std::fs::write(&file, b"first").unwrap();
        store.put_object("k/call.3gp", &file).await.unwrap();
        std::fs::write(&file, b"second").unwrap();
        store.put_object("k/call.3gp", &file).await.unwrap();

        assert_eq!(
            std::fs::read(root.path().join("k").join("call.3gp")).unwrap(),
            b"second"
        );
    }

    #[tokio::test]
    async fn test_public_base_url() {
        let store = LocalObjectStore::new("/srv/objects", Some("https://cdn.example/".to_string()));
        let remote = RemoteRef {
            key: "call_recordings/a.3gp".to_string(),
            location: "/srv/objects/call_recordings/a.3gp".to_string(),
        };
        assert_eq!(
            store.download_url(&remote).await.unwrap(),
            "https://cdn.example/call_recordings/a.3gp"
        );
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let root = TempDir::new().unwrap();
        let store = LocalObjectStore::new(root.path(), None);
        assert!(store
            .put_object("../outside.3gp", Path::new("/dev/null"))
            .await
            .is_err());
        assert!(store.put_object("", Path::new("/dev/null")).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_source_is_error() {
        let root = TempDir::new().unwrap();
        let store = LocalObjectStore::new(root.path(), None);
        assert!(store
            .put_object("k/missing.3gp", &root.path().join("missing.3gp"))
            .await
            .is_err());
    }
}
