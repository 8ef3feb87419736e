//! Error types for the recording lifecycle and the upload pipeline.
//!
//! Collaborator boundaries (stores, config, db) use `anyhow`; the states a
//! caller has to branch on are typed here.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures reported by a capture device.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("capture device is busy")]
    Busy,

    #[error("unsupported capture configuration: {0}")]
    Unsupported(String),

    #[error("capture device I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture backend error: {0}")]
    Backend(String),
}

/// Failures surfaced by `RecordingSession::start` / `stop`.
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(#[source] DeviceError),

    #[error("file system error at {path:?}: {reason}")]
    FileSystemError { path: PathBuf, reason: String },

    #[error("no active or persisted recording to stop")]
    NothingToStop,

    #[error("a recording is already in progress: {0:?}")]
    AlreadyRecording(PathBuf),
}

impl RecordingError {
    /// Classifies a device failure that happened while writing to `path`.
    pub fn from_device(err: DeviceError, path: &Path) -> Self {
        match err {
            DeviceError::Io(io) => RecordingError::FileSystemError {
                path: path.to_path_buf(),
                reason: io.to_string(),
            },
            other => RecordingError::DeviceUnavailable(other),
        }
    }
}

/// Which half of an upload attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Bytes,
    DownloadUrl,
    Metadata,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::Bytes => "bytes",
            UploadStage::DownloadUrl => "download_url",
            UploadStage::Metadata => "metadata",
        }
    }
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone)]
pub enum UploadError {
    #[error("transient upload failure during {stage} stage: {reason}")]
    TransientUploadFailure { stage: UploadStage, reason: String },

    #[error("upload abandoned after {attempts} attempts: {last_error}")]
    PermanentUploadFailure { attempts: u32, last_error: String },

    #[error("upload job for {0:?} already finished")]
    JobFinished(PathBuf),
}

impl UploadError {
    pub fn transient(stage: UploadStage, err: &anyhow::Error) -> Self {
        UploadError::TransientUploadFailure {
            stage,
            reason: format!("{err:#}"),
        }
    }
}
