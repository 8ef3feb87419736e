//! Turns raw call-state signals into recording start/stop and upload jobs.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::signal::{CallEvent, CallSignal, CallState};
use crate::error::RecordingError;
use crate::recording::{Clock, RecordingHandle, RecordingSession, StorageLocationProvider};
use crate::upload::{UploadOutcome, UploadPipeline};

/// What a single signal caused.
#[derive(Debug)]
pub enum MonitorOutcome {
    /// Unrecognized signal; no transition.
    Ignored,
    /// Call started while a recording was already running.
    AlreadyRecording,
    /// Call ended with nothing to stop.
    NotRecording,
    Started {
        handle: RecordingHandle,
        /// Upload of a recording an earlier process never finished.
        recovered: Option<JoinHandle<UploadOutcome>>,
    },
    Stopped {
        handle: RecordingHandle,
        /// `None` when no upload job was created for the file.
        upload: Option<JoinHandle<UploadOutcome>>,
    },
    StartFailed {
        error: RecordingError,
        recovered: Option<JoinHandle<UploadOutcome>>,
    },
    StopFailed(RecordingError),
}

pub struct CallStateMonitor {
    session: RecordingSession,
    pipeline: UploadPipeline,
    clock: Arc<dyn Clock>,
    storage: Arc<dyn StorageLocationProvider>,
    state: CallState,
}

impl CallStateMonitor {
    pub fn new(
        session: RecordingSession,
        pipeline: UploadPipeline,
        clock: Arc<dyn Clock>,
        storage: Arc<dyn StorageLocationProvider>,
    ) -> Self {
        Self {
            session,
            pipeline,
            clock,
            storage,
            state: CallState::Idle,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn pipeline(&self) -> &UploadPipeline {
        &self.pipeline
    }

    pub fn on_signal(&mut self, raw: &str) -> MonitorOutcome {
        self.handle_signal(CallSignal::parse(raw))
    }

    pub fn handle_signal(&mut self, signal: CallSignal) -> MonitorOutcome {
        debug!("Phone state changed: {:?}", signal);
        match signal.event() {
            Some(CallEvent::CallStarted) => {
                self.state = CallState::OffHook;
                self.call_started()
            }
            Some(CallEvent::CallEnded) => {
                self.state = CallState::Idle;
                self.call_ended()
            }
            None => {
                debug!("Ignoring phone state {:?}", signal);
                MonitorOutcome::Ignored
            }
        }
    }

    fn call_started(&mut self) -> MonitorOutcome {
        if self.session.is_recording() {
            debug!("Call started while already recording, nothing to do");
            return MonitorOutcome::AlreadyRecording;
        }

        let recovered = self.upload_leftover();

        info!("Call started, starting recording");
        match self
            .session
            .start(self.clock.as_ref(), self.storage.as_ref())
        {
            Ok(handle) => MonitorOutcome::Started { handle, recovered },
            Err(error) => {
                error!("Could not record call: {}", error);
                MonitorOutcome::StartFailed { error, recovered }
            }
        }
    }

    /// A handle still persisted when a new call starts belongs to a process
    /// that died mid-call. Finish it before it gets overwritten.
    fn upload_leftover(&mut self) -> Option<JoinHandle<UploadOutcome>> {
        let handle = self.session.take_leftover()?;
        warn!(
            "Recording {:?} was left unfinished by a previous run, uploading it",
            handle.file_path
        );
        let upload = self.pipeline.submit(&handle);
        if upload.is_none() {
            warn!("No upload scheduled for {:?}", handle.file_path);
        }
        upload
    }

    fn call_ended(&mut self) -> MonitorOutcome {
        if !self.session.is_recording() && !self.session.has_persisted_handle() {
            debug!("Call ended while not recording, nothing to do");
            return MonitorOutcome::NotRecording;
        }

        info!("Call ended, stopping recording");
        match self.session.stop(self.clock.as_ref()) {
            Ok(handle) => {
                let upload = self.pipeline.submit(&handle);
                if upload.is_none() {
                    warn!("No upload scheduled for {:?}", handle.file_path);
                }
                MonitorOutcome::Stopped { handle, upload }
            }
            Err(RecordingError::NothingToStop) => MonitorOutcome::NotRecording,
            Err(e) => {
                error!("Could not stop recording: {}", e);
                MonitorOutcome::StopFailed(e)
            }
        }
    }
}
