//! Capture device abstraction and the fixed recording profile.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DeviceError;

/// Which input the device records from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSourceKind {
    /// Both sides of the call line.
    VoiceCall,
    /// Microphone tuned for voice communication.
    VoiceCommunication,
    /// Raw microphone.
    Microphone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    ThreeGpp,
    Mpeg4,
    Ogg,
    Wav,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::ThreeGpp => "3gp",
            Container::Mpeg4 => "m4a",
            Container::Ogg => "ogg",
            Container::Wav => "wav",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    AmrNb,
    Aac,
    Opus,
    Pcm16,
}

/// Fixed encoding settings applied to the device before capture starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureProfile {
    pub source: AudioSourceKind,
    pub container: Container,
    pub codec: Codec,
    /// Bits per second.
    pub bitrate: u32,
    /// Hz.
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self {
            source: AudioSourceKind::VoiceCall,
            container: Container::ThreeGpp,
            codec: Codec::AmrNb,
            bitrate: 12_200,
            sample_rate: 8_000,
            channels: 1,
        }
    }
}

impl CaptureProfile {
    /// Returns the profile with its source downgraded to the raw microphone
    /// when the device cannot record the preferred one.
    pub fn resolve_for(&self, device: &dyn CaptureDevice) -> CaptureProfile {
        if device.supports_source(self.source) {
            return self.clone();
        }
        CaptureProfile {
            source: AudioSourceKind::Microphone,
            ..self.clone()
        }
    }
}

/// A platform audio recorder.
///
/// Every call can fail. `release` must be safe to call in any state and any
/// number of times.
pub trait CaptureDevice: Send {
    fn supports_source(&self, source: AudioSourceKind) -> bool;

    /// Prepares the device to write `profile`-encoded audio to `output`.
    fn configure(&mut self, profile: &CaptureProfile, output: &Path) -> Result<(), DeviceError>;

    fn start(&mut self) -> Result<(), DeviceError>;

    /// Stops capture and finalizes the output file.
    fn stop(&mut self) -> Result<(), DeviceError>;

    fn release(&mut self);

    /// Finalizes audio an interrupted process left behind for `output`.
    ///
    /// Returns `Ok(false)` when there is nothing to recover.
    fn recover(
        &mut self,
        _profile: &CaptureProfile,
        _output: &Path,
    ) -> Result<bool, DeviceError> {
        Ok(false)
    }
}
