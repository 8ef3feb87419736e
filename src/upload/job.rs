//! Per-recording upload job and its retry policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    Pending,
    UploadingBytes,
    UploadingMetadata,
    Succeeded,
    Failed,
}

impl UploadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UploadingBytes => "uploading_bytes",
            Self::UploadingMetadata => "uploading_metadata",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before the first attempt; not counted as a retry.
    pub settle_delay: Duration,
    pub backoff_step: Duration,
    pub max_attempts: u32,
    pub object_prefix: String,
    pub delete_after_upload: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            backoff_step: Duration::from_secs(5),
            max_attempts: 3,
            object_prefix: "call_recordings/".to_string(),
            delete_after_upload: false,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `attempt * backoff_step`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

#[derive(Debug, Clone)]
pub struct UploadJob {
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    /// Modification time of the file when the job was created.
    pub modified: Option<SystemTime>,
    /// Retries consumed so far; 0 during the first try.
    pub attempt: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub phase: UploadPhase,
}

impl UploadJob {
    pub fn new(
        file_path: impl Into<PathBuf>,
        file_size_bytes: u64,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            file_size_bytes,
            modified: None,
            attempt: 0,
            max_attempts,
            created_at,
            phase: UploadPhase::Pending,
        }
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    pub fn filename(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.to_string_lossy().into_owned())
    }

    pub fn object_key(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.filename())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn can_retry(&self) -> bool {
        !self.is_terminal() && self.attempt < self.max_attempts
    }

    /// Consume one retry and return its 1-based number.
    pub fn schedule_retry(&mut self) -> u32 {
        debug_assert!(self.can_retry());
        self.attempt += 1;
        self.phase = UploadPhase::Pending;
        self.attempt
    }
}
