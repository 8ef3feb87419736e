//! Background upload of finished recordings.
//!
//! Each finished file gets one job: settle delay, then byte upload followed by
//! the metadata write. Any failure retries both steps after a linear backoff
//! until the job's retries run out. Jobs run detached from the call path and
//! are not persisted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::job::{RetryPolicy, UploadJob, UploadPhase};
use super::store::{MetadataStore, ObjectStore, RecordingMetadata};
use crate::error::{UploadError, UploadStage};
use crate::recording::{Clock, RecordingHandle};

#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Succeeded(RecordingMetadata),
    Failed(UploadError),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Succeeded(_))
    }
}

/// How long a finished job keeps guarding its file against resubmission.
const FINISHED_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Identifies one version of a file, so a new recording written to a path
/// that was uploaded and deleted before is not mistaken for the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    size: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(job: &UploadJob) -> Self {
        Self {
            size: job.file_size_bytes,
            modified: job.modified,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RegistryEntry {
    phase: UploadPhase,
    stamp: FileStamp,
    updated: Instant,
}

impl RegistryEntry {
    /// Whether this entry rules out another job for `job`'s file.
    fn blocks(&self, job: &UploadJob) -> bool {
        match self.phase {
            UploadPhase::Failed => false,
            UploadPhase::Succeeded => self.stamp == FileStamp::of(job),
            _ => true,
        }
    }
}

type Registry = HashMap<PathBuf, RegistryEntry>;

struct PipelineInner {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    /// Last known phase per file; guards against duplicate jobs.
    registry: Mutex<Registry>,
}

#[derive(Clone)]
pub struct UploadPipeline {
    inner: Arc<PipelineInner>,
}

impl UploadPipeline {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                objects,
                metadata,
                clock,
                policy,
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn phase_of(&self, path: &Path) -> Option<UploadPhase> {
        self.registry().get(path).map(|entry| entry.phase)
    }

    /// Build a job for a finished recording.
    ///
    /// Returns `None` when the file is missing or empty.
    pub fn prepare_job(&self, handle: &RecordingHandle) -> Option<UploadJob> {
        let (size, modified) = match std::fs::metadata(&handle.file_path) {
            Ok(meta) if meta.is_file() => (meta.len(), meta.modified().ok()),
            Ok(_) => {
                info!("Not a regular file, skipping upload: {:?}", handle.file_path);
                return None;
            }
            Err(e) => {
                info!(
                    "Recording {:?} not found, skipping upload: {}",
                    handle.file_path, e
                );
                return None;
            }
        };
        if size == 0 {
            warn!("Recording {:?} is empty, skipping upload", handle.file_path);
            return None;
        }

        Some(
            UploadJob::new(
                handle.file_path.clone(),
                size,
                self.inner.policy.max_attempts,
                self.inner.clock.now(),
            )
            .with_modified(modified),
        )
    }

    /// Schedule the upload of a finished recording on the tokio runtime.
    ///
    /// Returns `None` when no job was created: the file is missing or empty,
    /// or a job for it is already running or has succeeded.
    pub fn submit(&self, handle: &RecordingHandle) -> Option<JoinHandle<UploadOutcome>> {
        let job = self.prepare_job(handle)?;

        {
            let mut registry = self.registry();
            prune_finished(&mut registry);
            if let Some(entry) = registry.get(job.path()) {
                if entry.blocks(&job) {
                    info!(
                        "Upload for {:?} already {}, not scheduling another",
                        job.file_path,
                        entry.phase.as_str()
                    );
                    return None;
                }
            }
            registry.insert(job.file_path.clone(), entry_for(&job, UploadPhase::Pending));
        }

        info!(
            "Scheduling upload of {:?} ({} bytes) in {}s",
            job.file_path,
            job.file_size_bytes,
            self.inner.policy.settle_delay.as_secs()
        );

        let pipeline = self.clone();
        Some(tokio::spawn(async move { pipeline.run(job).await }))
    }

    /// Drive a job to a terminal state.
    pub async fn run(&self, mut job: UploadJob) -> UploadOutcome {
        // Let connectivity recover after the call
        sleep(self.inner.policy.settle_delay).await;

        loop {
            match self.attempt_upload(&mut job).await {
                Ok(record) => {
                    info!(
                        "Upload of {} complete after {} retries",
                        record.filename, record.retry_count
                    );
                    if self.inner.policy.delete_after_upload {
                        match tokio::fs::remove_file(&job.file_path).await {
                            Ok(()) => {
                                debug!("Deleted local recording {:?}", job.file_path);
                                // Nothing left at the path to guard.
                                self.registry().remove(job.path());
                            }
                            Err(e) => warn!(
                                "Failed to delete local recording {:?}: {}",
                                job.file_path, e
                            ),
                        }
                    }
                    return UploadOutcome::Succeeded(record);
                }
                Err(err @ UploadError::JobFinished(_)) => {
                    return UploadOutcome::Failed(err);
                }
                Err(err) => {
                    if job.can_retry() {
                        let retry = job.schedule_retry();
                        let delay = self.inner.policy.backoff_for(retry);
                        warn!(
                            "Upload of {} failed ({}), retry {}/{} in {}s",
                            job.filename(),
                            err,
                            retry,
                            job.max_attempts,
                            delay.as_secs()
                        );
                        self.set_phase(&job, UploadPhase::Pending);
                        sleep(delay).await;
                    } else {
                        job.phase = UploadPhase::Failed;
                        self.set_phase(&job, UploadPhase::Failed);
                        let attempts = job.attempt + 1;
                        error!(
                            "Upload of {} abandoned after {} attempts: {}",
                            job.filename(),
                            attempts,
                            err
                        );
                        return UploadOutcome::Failed(UploadError::PermanentUploadFailure {
                            attempts,
                            last_error: err.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// One attempt: store the bytes, resolve their URL, then write metadata.
    ///
    /// Metadata is only written after the byte upload succeeded. A job that
    /// already reached a terminal state is never re-entered.
    pub async fn attempt_upload(
        &self,
        job: &mut UploadJob,
    ) -> Result<RecordingMetadata, UploadError> {
        let already_uploaded = self
            .registry()
            .get(job.path())
            .is_some_and(|entry| entry.phase == UploadPhase::Succeeded && entry.blocks(job));
        if job.is_terminal() || already_uploaded {
            warn!("Refusing to re-run finished upload for {:?}", job.file_path);
            return Err(UploadError::JobFinished(job.file_path.clone()));
        }

        let key = job.object_key(&self.inner.policy.object_prefix);
        debug!("Upload attempt {} for {}", job.attempt + 1, key);

        job.phase = UploadPhase::UploadingBytes;
        self.set_phase(job, UploadPhase::UploadingBytes);
        let remote = match self.inner.objects.put_object(&key, &job.file_path).await {
            Ok(remote) => remote,
            Err(e) => return Err(self.fail_attempt(job, UploadStage::Bytes, &e)),
        };
        let url = match self.inner.objects.download_url(&remote).await {
            Ok(url) => url,
            Err(e) => return Err(self.fail_attempt(job, UploadStage::DownloadUrl, &e)),
        };
        info!("Uploaded {} to {}", job.filename(), remote.location);

        job.phase = UploadPhase::UploadingMetadata;
        self.set_phase(job, UploadPhase::UploadingMetadata);
        let record = RecordingMetadata {
            filename: job.filename(),
            remote_url: url,
            uploaded_at_epoch_millis: self.inner.clock.now().timestamp_millis(),
            file_size_bytes: job.file_size_bytes,
            retry_count: job.attempt,
        };
        if let Err(e) = self.inner.metadata.record_metadata(&record).await {
            return Err(self.fail_attempt(job, UploadStage::Metadata, &e));
        }

        job.phase = UploadPhase::Succeeded;
        self.set_phase(job, UploadPhase::Succeeded);
        Ok(record)
    }

    fn fail_attempt(
        &self,
        job: &mut UploadJob,
        stage: UploadStage,
        err: &anyhow::Error,
    ) -> UploadError {
        error!("Upload {} stage failed for {}: {:#}", stage, job.filename(), err);
        job.phase = UploadPhase::Pending;
        self.set_phase(job, UploadPhase::Pending);
        UploadError::transient(stage, err)
    }

    fn set_phase(&self, job: &UploadJob, phase: UploadPhase) {
        self.registry().insert(job.file_path.clone(), entry_for(job, phase));
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

fn entry_for(job: &UploadJob, phase: UploadPhase) -> RegistryEntry {
    RegistryEntry {
        phase,
        stamp: FileStamp::of(job),
        updated: Instant::now(),
    }
}

fn prune_finished(registry: &mut Registry) {
    let now = Instant::now();
    registry.retain(|_, entry| {
        !entry.phase.is_terminal() || now.duration_since(entry.updated) < FINISHED_RETENTION
    });
}
