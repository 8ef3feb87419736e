//! Durable single-slot memory of the recording in progress.
//!
//! The path of the file being written is stored here when a recording starts
//! so that a stop arriving after a restart can still find it. Absent is a
//! valid state: no recording is in progress.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub trait SettingsStore: Send + Sync {
    fn set_current_path(&self, path: &Path) -> Result<()>;

    fn get_current_path(&self) -> Result<Option<PathBuf>>;

    fn clear_current_path(&self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_recording_path: Option<PathBuf>,
}

/// JSON document on disk, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::new(crate::global::state_file()?))
    }

    fn load(&self) -> Result<PersistedState> {
        if !self.path.exists() {
            return Ok(PersistedState::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file {:?}", self.path))?;
        if content.trim().is_empty() {
            return Ok(PersistedState::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file {:?}", self.path))
    }

    fn save(&self, state: &PersistedState) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).context("Failed to create state directory")?;

        let content = serde_json::to_string_pretty(state)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .context("Failed to create temporary state file")?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace state file {:?}", self.path))?;
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn set_current_path(&self, path: &Path) -> Result<()> {
        let mut state = self.load()?;
        state.current_recording_path = Some(path.to_path_buf());
        self.save(&state)?;
        debug!("Persisted current recording path {:?}", path);
        Ok(())
    }

    fn get_current_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.load()?.current_recording_path)
    }

    fn clear_current_path(&self) -> Result<()> {
        let mut state = self.load()?;
        if state.current_recording_path.take().is_some() {
            self.save(&state)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    current: Mutex<Option<PathBuf>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            current: Mutex::new(Some(path.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn set_current_path(&self, path: &Path) -> Result<()> {
        *self.slot() = Some(path.to_path_buf());
        Ok(())
    }

    fn get_current_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.slot().clone())
    }

    fn clear_current_path(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
