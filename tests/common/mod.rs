#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use callvault::call::CallStateMonitor;
use callvault::error::DeviceError;
use callvault::recording::{
    AudioSourceKind, CaptureDevice, CaptureProfile, DirectoryStorage, FixedClock,
    RecordingSession,
};
use callvault::settings::SettingsStore;
use callvault::upload::{
    MetadataStore, ObjectStore, RecordingMetadata, RemoteRef, RetryPolicy, UploadPipeline,
};
use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct DeviceLog {
    pub starts: u32,
    pub stops: u32,
    pub releases: u32,
}

/// Capture device that writes a few bytes into the output on stop.
#[derive(Default)]
pub struct FakeDevice {
    pub log: Arc<Mutex<DeviceLog>>,
    pub fail_start: bool,
    output: Option<PathBuf>,
}

impl FakeDevice {
    pub fn new(log: Arc<Mutex<DeviceLog>>) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn failing(log: Arc<Mutex<DeviceLog>>) -> Self {
        Self {
            log,
            fail_start: true,
            output: None,
        }
    }
}

impl CaptureDevice for FakeDevice {
    fn supports_source(&self, _source: AudioSourceKind) -> bool {
        true
    }

    fn configure(&mut self, _profile: &CaptureProfile, output: &Path) -> Result<(), DeviceError> {
        std::fs::File::create(output)?;
        self.output = Some(output.to_path_buf());
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        if self.fail_start {
            return Err(DeviceError::Busy);
        }
        self.log.lock().unwrap().starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.log.lock().unwrap().stops += 1;
        if let Some(output) = &self.output {
            std::fs::write(output, b"#!AMR\n call audio")?;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.log.lock().unwrap().releases += 1;
        self.output = None;
    }
}

/// Object store that fails the first `failures` puts.
#[derive(Default)]
pub struct MemoryObjects {
    pub failures: u32,
    pub keys: Mutex<Vec<String>>,
}

impl MemoryObjects {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn put_object(&self, key: &str, local_path: &Path) -> Result<RemoteRef> {
        let mut keys = self.keys.lock().unwrap();
        keys.push(key.to_string());
        if keys.len() as u32 <= self.failures {
            return Err(anyhow!("connection reset"));
        }
        if !local_path.is_file() {
            return Err(anyhow!("missing local file {:?}", local_path));
        }
        Ok(RemoteRef {
            key: key.to_string(),
            location: format!("mem://{key}"),
        })
    }

    async fn download_url(&self, remote: &RemoteRef) -> Result<String> {
        Ok(format!("https://recordings.example/{}", remote.key))
    }
}

#[derive(Default)]
pub struct MemoryMetadata {
    pub records: Mutex<Vec<RecordingMetadata>>,
}

impl MemoryMetadata {
    pub fn records(&self) -> Vec<RecordingMetadata> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadata {
    async fn record_metadata(&self, record: &RecordingMetadata) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 6, 2, 18, 30, 0).unwrap()))
}

pub struct Harness {
    pub monitor: CallStateMonitor,
    pub objects: Arc<MemoryObjects>,
    pub metadata: Arc<MemoryMetadata>,
    pub device_log: Arc<Mutex<DeviceLog>>,
}

pub fn harness(
    dir: &Path,
    device: FakeDevice,
    settings: Arc<dyn SettingsStore>,
    objects: Arc<MemoryObjects>,
) -> Harness {
    let device_log = device.log.clone();
    let metadata = Arc::new(MemoryMetadata::default());
    let clock = fixed_clock();

    let session = RecordingSession::new(
        Box::new(device),
        settings,
        CaptureProfile::default(),
        "call_recording",
    );
    let pipeline = UploadPipeline::new(
        objects.clone(),
        metadata.clone(),
        clock.clone(),
        RetryPolicy::default(),
    );
    let monitor = CallStateMonitor::new(
        session,
        pipeline,
        clock,
        Arc::new(DirectoryStorage::new(dir)),
    );

    Harness {
        monitor,
        objects,
        metadata,
        device_log,
    }
}

pub fn recordings_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}
