use crate::call::{CallStateMonitor, MonitorOutcome};
use crate::config::{Config, MetadataBackend, ObjectBackend};
use crate::recording::{CpalCaptureDevice, DirectoryStorage, RecordingSession, SystemClock};
use crate::settings::FileSettingsStore;
use crate::upload::{
    HttpMetadataStore, HttpObjectStore, LocalObjectStore, MetadataStore, ObjectStore,
    SqliteMetadataStore, UploadOutcome, UploadPipeline,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCommand {
    /// A raw call-state signal from the platform.
    Signal(String),
    Shutdown,
}

pub async fn run_service(config: Config) -> Result<()> {
    info!("Starting callvault service");

    let mut monitor = build_monitor(&config)?;
    if monitor.session().has_persisted_handle() {
        warn!("A recording from a previous run will be finalized on the next call signal");
    }

    let (tx, mut rx) = mpsc::channel::<ServiceCommand>(32);

    let reader_tx = tx.clone();
    tokio::spawn(async move {
        if let Err(e) = read_signals(tokio::io::stdin(), reader_tx).await {
            error!("Signal reader failed: {:#}", e);
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(ServiceCommand::Shutdown).await;
        }
    });

    info!("callvault is ready, reading call states (OFFHOOK / IDLE) from stdin");

    let outcomes = drive(&mut monitor, &mut rx).await;
    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    info!(
        "Service stopped: {} upload(s) finished, {} failed",
        outcomes.len(),
        failed
    );
    Ok(())
}

/// Feed one signal per non-empty line to the service loop until EOF.
pub async fn read_signals<R>(reader: R, tx: mpsc::Sender<ServiceCommand>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read signal")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if tx.send(ServiceCommand::Signal(line.to_string())).await.is_err() {
            break;
        }
    }
    debug!("Signal source closed");
    Ok(())
}

/// Dispatch commands to the monitor until the channel closes or a shutdown
/// is requested.
///
/// On channel close the in-flight uploads are awaited and their outcomes
/// returned. On shutdown they are abandoned.
pub async fn drive(
    monitor: &mut CallStateMonitor,
    rx: &mut mpsc::Receiver<ServiceCommand>,
) -> Vec<UploadOutcome> {
    let mut uploads: Vec<JoinHandle<UploadOutcome>> = Vec::new();

    while let Some(command) = rx.recv().await {
        match command {
            ServiceCommand::Signal(raw) => match monitor.on_signal(&raw) {
                MonitorOutcome::Started { handle, recovered } => {
                    info!("Recording call to {:?}", handle.file_path);
                    uploads.extend(recovered);
                }
                MonitorOutcome::Stopped { handle, upload } => {
                    info!("Call recorded: {:?}", handle.file_path);
                    uploads.extend(upload);
                }
                MonitorOutcome::StartFailed { error, recovered } => {
                    error!("Call not recorded: {}", error);
                    uploads.extend(recovered);
                }
                MonitorOutcome::StopFailed(e) => error!("Recording not finalized: {}", e),
                other => debug!("Signal {:?} -> {:?}", raw, other),
            },
            ServiceCommand::Shutdown => {
                info!("Shutdown requested");
                let pending = uploads.iter().filter(|u| !u.is_finished()).count();
                if pending > 0 {
                    warn!("Abandoning {} in-flight upload(s)", pending);
                }
                return Vec::new();
            }
        }
    }

    let mut outcomes = Vec::with_capacity(uploads.len());
    for upload in uploads {
        match upload.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!("Upload task panicked: {}", e),
        }
    }
    outcomes
}

pub fn build_monitor(config: &Config) -> Result<CallStateMonitor> {
    let settings = Arc::new(FileSettingsStore::open_default()?);
    let session = RecordingSession::new(
        Box::new(CpalCaptureDevice::new()),
        settings,
        config.recording.profile(),
        config.recording.filename_prefix.clone(),
    );
    let storage = Arc::new(DirectoryStorage::new(config.recording.recordings_dir()?));

    Ok(CallStateMonitor::new(
        session,
        build_pipeline(config)?,
        Arc::new(SystemClock),
        storage,
    ))
}

pub fn build_pipeline(config: &Config) -> Result<UploadPipeline> {
    let objects: Arc<dyn ObjectStore> = match config.upload.backend {
        ObjectBackend::Local => Arc::new(LocalObjectStore::new(
            config.upload.local_root()?,
            config.upload.public_base_url.clone(),
        )),
        ObjectBackend::Http => {
            let endpoint = config
                .upload
                .endpoint
                .clone()
                .context("upload.endpoint is required for the http backend")?;
            Arc::new(HttpObjectStore::new(
                endpoint,
                config.upload.public_base_url.clone(),
            ))
        }
    };

    let metadata: Arc<dyn MetadataStore> = match config.metadata.backend {
        MetadataBackend::Sqlite => Arc::new(SqliteMetadataStore::open_default()?),
        MetadataBackend::Http => {
            let endpoint = config
                .metadata
                .endpoint
                .clone()
                .context("metadata.endpoint is required for the http backend")?;
            Arc::new(HttpMetadataStore::new(endpoint))
        }
    };

    Ok(UploadPipeline::new(
        objects,
        metadata,
        Arc::new(SystemClock),
        config.upload.retry_policy(),
    ))
}
