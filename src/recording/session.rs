//! One call recording from device start to finished file.
//!
//! The session owns the capture device exclusively. At most one recording is
//! active; the file path is persisted through the [`SettingsStore`] before
//! `start` returns so that `stop` can recover it after a restart.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clock::Clock;
use super::device::{CaptureDevice, CaptureProfile};
use super::storage::StorageLocationProvider;
use crate::error::RecordingError;
use crate::settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Recording,
    Stopped,
    /// The last stop returned its file but the device reported an error.
    ///
    /// Like `Idle` the device is released and `start` is allowed; the status
    /// only keeps the failure visible until the next successful start.
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Recording => "recording",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Failed => "failed",
        }
    }
}

/// Reference to a recording file, persisted across the stop boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingHandle {
    pub file_path: PathBuf,
}

impl RecordingHandle {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_path.file_name().and_then(|n| n.to_str())
    }
}

/// The recording currently being captured.
#[derive(Debug, Clone)]
pub struct ActiveRecording {
    pub session_id: Uuid,
    pub file_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

pub struct RecordingSession {
    device: Box<dyn CaptureDevice>,
    settings: Arc<dyn SettingsStore>,
    profile: CaptureProfile,
    filename_prefix: String,
    status: SessionStatus,
    active: Option<ActiveRecording>,
    last_error: Option<String>,
}

impl RecordingSession {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        settings: Arc<dyn SettingsStore>,
        profile: CaptureProfile,
        filename_prefix: impl Into<String>,
    ) -> Self {
        Self {
            device,
            settings,
            profile,
            filename_prefix: filename_prefix.into(),
            status: SessionStatus::Idle,
            active: None,
            last_error: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_recording(&self) -> bool {
        self.status == SessionStatus::Recording
    }

    pub fn active(&self) -> Option<&ActiveRecording> {
        self.active.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether a previous process left a recording path behind.
    pub fn has_persisted_handle(&self) -> bool {
        match self.settings.get_current_path() {
            Ok(path) => path.is_some(),
            Err(e) => {
                warn!("Failed to read persisted recording path: {:#}", e);
                false
            }
        }
    }

    /// Begin capturing into a new timestamped file.
    pub fn start(
        &mut self,
        clock: &dyn Clock,
        storage: &dyn StorageLocationProvider,
    ) -> Result<RecordingHandle, RecordingError> {
        if let Some(active) = &self.active {
            warn!("Recording already in progress: {:?}", active.file_path);
            return Err(RecordingError::AlreadyRecording(active.file_path.clone()));
        }

        let dir = match storage.recordings_dir() {
            Ok(dir) => dir,
            Err(e) => return Err(self.fail_start(e)),
        };

        let started_at = clock.now();
        let file_path = self.unique_file_path(&dir, started_at);

        let profile = self.profile.resolve_for(self.device.as_ref());
        if profile.source != self.profile.source {
            warn!(
                "Audio source {:?} unsupported, falling back to {:?}",
                self.profile.source, profile.source
            );
        }

        let started = self
            .device
            .configure(&profile, &file_path)
            .and_then(|_| self.device.start());
        if let Err(e) = started {
            self.device.release();
            discard_partial_file(&file_path);
            return Err(self.fail_start(RecordingError::from_device(e, &file_path)));
        }

        if let Ok(Some(previous)) = self.settings.get_current_path() {
            if previous != file_path {
                warn!(
                    "Replacing persisted handle of an unfinished recording {:?}",
                    previous
                );
            }
        }

        if let Err(e) = self.settings.set_current_path(&file_path) {
            if let Err(stop_err) = self.device.stop() {
                debug!("Device stop after persist failure: {}", stop_err);
            }
            self.device.release();
            discard_partial_file(&file_path);
            return Err(self.fail_start(RecordingError::FileSystemError {
                path: file_path,
                reason: format!("failed to persist recording handle: {e:#}"),
            }));
        }

        let session_id = Uuid::new_v4();
        info!(
            "Recording {} started: {:?} ({:?}, {:?}/{:?}, {} bps, {} Hz)",
            session_id,
            file_path,
            profile.source,
            profile.container,
            profile.codec,
            profile.bitrate,
            profile.sample_rate
        );

        self.active = Some(ActiveRecording {
            session_id,
            file_path: file_path.clone(),
            started_at,
        });
        self.status = SessionStatus::Recording;
        self.last_error = None;

        Ok(RecordingHandle { file_path })
    }

    /// Stop capture and hand back the finished file.
    ///
    /// Works without an in-memory recording when a handle was persisted by an
    /// earlier process. The file is never deleted here.
    pub fn stop(&mut self, clock: &dyn Clock) -> Result<RecordingHandle, RecordingError> {
        let active = self.active.take();

        let mut device_failure = None;
        if active.is_some() {
            if let Err(e) = self.device.stop() {
                error!("Error stopping capture device: {}", e);
                device_failure = Some(e.to_string());
            }
            self.device.release();
        }

        let persisted = match self.settings.get_current_path() {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to read persisted recording path: {:#}", e);
                None
            }
        };

        let file_path = match (persisted, &active) {
            (Some(path), Some(_)) => path,
            (Some(path), None) => {
                self.finalize_leftover(&path);
                path
            }
            (None, Some(active)) => active.file_path.clone(),
            (None, None) => {
                debug!("Stop requested with nothing recording");
                return Err(RecordingError::NothingToStop);
            }
        };

        if let Err(e) = self.settings.clear_current_path() {
            warn!("Failed to clear persisted recording path: {:#}", e);
        }

        match &active {
            Some(active) => {
                let elapsed = clock.now() - active.started_at;
                info!(
                    "Recording {} stopped after {}s: {:?}",
                    active.session_id,
                    elapsed.num_seconds().max(0),
                    file_path
                );
            }
            None => info!("Recovered persisted recording {:?}", file_path),
        }

        self.status = if device_failure.is_some() {
            SessionStatus::Failed
        } else {
            SessionStatus::Stopped
        };
        self.last_error = device_failure;

        Ok(RecordingHandle { file_path })
    }

    /// Takes over a recording persisted by an earlier process and clears its
    /// handle.
    ///
    /// Returns `None` while a recording is active or when nothing was
    /// persisted.
    pub fn take_leftover(&mut self) -> Option<RecordingHandle> {
        if self.active.is_some() {
            return None;
        }
        let file_path = match self.settings.get_current_path() {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read persisted recording path: {:#}", e);
                return None;
            }
        };

        self.finalize_leftover(&file_path);
        if let Err(e) = self.settings.clear_current_path() {
            warn!("Failed to clear persisted recording path: {:#}", e);
        }
        info!("Recovered persisted recording {:?}", file_path);
        Some(RecordingHandle { file_path })
    }

    /// Lets the device rebuild a file that an interrupted capture never wrote.
    fn finalize_leftover(&mut self, path: &Path) {
        if path.exists() {
            return;
        }
        let profile = self.profile.resolve_for(self.device.as_ref());
        match self.device.recover(&profile, path) {
            Ok(true) => info!("Rebuilt interrupted recording {:?}", path),
            Ok(false) => warn!("No audio left for interrupted recording {:?}", path),
            Err(e) => warn!("Failed to rebuild interrupted recording {:?}: {}", path, e),
        }
    }

    fn fail_start(&mut self, err: RecordingError) -> RecordingError {
        error!("Failed to start recording: {}", err);
        self.status = SessionStatus::Idle;
        self.active = None;
        self.last_error = Some(err.to_string());
        err
    }

    fn unique_file_path(&self, dir: &Path, now: DateTime<Utc>) -> PathBuf {
        let timestamp = now.with_timezone(&Local).format("%Y%m%d_%H%M%S");
        let ext = self.profile.container.extension();
        let path = dir.join(format!("{}_{}.{}", self.filename_prefix, timestamp, ext));

        // Handle collision by appending counter
        if path.exists() {
            for i in 1..100 {
                let alt_path = dir.join(format!(
                    "{}_{}_{}.{}",
                    self.filename_prefix, timestamp, i, ext
                ));
                if !alt_path.exists() {
                    return alt_path;
                }
            }
            return dir.join(format!(
                "{}_{}_{}.{}",
                self.filename_prefix,
                timestamp,
                Uuid::new_v4().simple(),
                ext
            ));
        }

        path
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.active.is_some() {
            debug!("Dropping active RecordingSession, releasing device");
            self.device.release();
        }
    }
}

fn discard_partial_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove partial recording {:?}: {}", path, e);
        }
    }
}
