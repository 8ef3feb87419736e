use std::path::PathBuf;

use crate::error::RecordingError;

/// Resolves a writable directory for new recordings.
pub trait StorageLocationProvider: Send + Sync {
    fn recordings_dir(&self) -> Result<PathBuf, RecordingError>;
}

/// A fixed directory, created on demand.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    dir: PathBuf,
}

impl DirectoryStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl StorageLocationProvider for DirectoryStorage {
    fn recordings_dir(&self) -> Result<PathBuf, RecordingError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| RecordingError::FileSystemError {
            path: self.dir.clone(),
            reason: e.to_string(),
        })?;
        Ok(self.dir.clone())
    }
}
