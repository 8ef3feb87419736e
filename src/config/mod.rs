use crate::global;
use crate::recording::{AudioSourceKind, CaptureProfile, Codec, Container};
use crate::upload::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recording: RecordingConfig,
    pub upload: UploadConfig,
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Where finished recordings are written. Defaults to the data dir.
    pub directory: Option<PathBuf>,
    pub filename_prefix: String,
    pub audio_source: AudioSourceKind,
    pub container: Container,
    pub codec: Codec,
    pub bitrate: u32,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectBackend {
    Local,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    Sqlite,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Pause after a call ends before the first upload attempt.
    pub settle_delay_secs: u64,
    /// Retry `n` waits `n * backoff_step_secs`.
    pub backoff_step_secs: u64,
    pub max_attempts: u32,
    pub object_prefix: String,
    pub backend: ObjectBackend,
    pub local_root: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub public_base_url: Option<String>,
    pub delete_after_upload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub backend: MetadataBackend,
    pub endpoint: Option<String>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let profile = CaptureProfile::default();
        Self {
            directory: None,
            filename_prefix: "call_recording".to_string(),
            audio_source: profile.source,
            container: profile.container,
            codec: profile.codec,
            bitrate: profile.bitrate,
            sample_rate: profile.sample_rate,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 2,
            backoff_step_secs: 5,
            max_attempts: 3,
            object_prefix: "call_recordings/".to_string(),
            backend: ObjectBackend::Local,
            local_root: None,
            endpoint: None,
            public_base_url: None,
            delete_after_upload: false,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            backend: MetadataBackend::Sqlite,
            endpoint: None,
        }
    }
}

impl RecordingConfig {
    pub fn profile(&self) -> CaptureProfile {
        CaptureProfile {
            source: self.audio_source,
            container: self.container,
            codec: self.codec,
            bitrate: self.bitrate,
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    pub fn recordings_dir(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => global::recordings_dir(),
        }
    }
}

impl UploadConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            settle_delay: Duration::from_secs(self.settle_delay_secs),
            backoff_step: Duration::from_secs(self.backoff_step_secs),
            max_attempts: self.max_attempts,
            object_prefix: self.object_prefix.clone(),
            delete_after_upload: self.delete_after_upload,
        }
    }

    pub fn local_root(&self) -> Result<PathBuf> {
        match &self.local_root {
            Some(dir) => Ok(dir.clone()),
            None => global::remote_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
