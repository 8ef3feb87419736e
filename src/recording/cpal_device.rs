//! Desktop capture device backed by cpal.
//!
//! Samples from the default input device are down-mixed to mono and streamed
//! into a 16-bit staging WAV next to the destination. The WAV header is
//! refreshed about once a second, so a process killed mid-call still leaves
//! playable audio behind for [`CaptureDevice::recover`]. On stop the staging
//! file is either moved into place (WAV/PCM profiles) or transcoded with
//! ffmpeg into the profile's container, codec and bitrate.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use super::device::{AudioSourceKind, CaptureDevice, CaptureProfile, Codec, Container};
use crate::error::DeviceError;

struct Target {
    profile: CaptureProfile,
    output: PathBuf,
    staging: PathBuf,
}

/// The stream lives on its own thread because `cpal::Stream` is not `Send`.
///
/// The thread finalizes the staging WAV on exit and returns the number of
/// samples written.
struct CaptureThread {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<Result<u64, DeviceError>>,
}

type SharedWriter = Arc<Mutex<Option<StagingWriter>>>;

/// Mono 16-bit WAV fed from the audio callback.
struct StagingWriter {
    writer: WavWriter<BufWriter<File>>,
    flush_every: u64,
    unflushed: u64,
    written: u64,
    failure: Option<String>,
}

impl StagingWriter {
    fn create(path: &Path, sample_rate: u32) -> Result<Self, DeviceError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec).map_err(from_hound)?;
        Ok(Self {
            writer,
            flush_every: u64::from(sample_rate.max(1)),
            unflushed: 0,
            written: 0,
            failure: None,
        })
    }

    /// Appends interleaved frames, down-mixed to mono.
    fn push(&mut self, data: &[f32], channels: u16) {
        if self.failure.is_some() {
            return;
        }
        if let Err(e) = self.write_frames(data, channels) {
            error!("Writing staged audio failed: {}", e);
            self.failure = Some(e.to_string());
        }
    }

    fn write_frames(&mut self, data: &[f32], channels: u16) -> Result<(), hound::Error> {
        for sample in downmix(data, channels) {
            let clamped = sample.clamp(-1.0, 1.0);
            self.writer.write_sample((clamped * i16::MAX as f32) as i16)?;
            self.written += 1;
            self.unflushed += 1;
        }
        if self.unflushed >= self.flush_every {
            self.writer.flush()?;
            self.unflushed = 0;
        }
        Ok(())
    }

    fn finalize(self) -> Result<u64, DeviceError> {
        if let Some(reason) = self.failure {
            return Err(DeviceError::Backend(format!("staging write failed: {reason}")));
        }
        let written = self.written;
        self.writer.finalize().map_err(from_hound)?;
        Ok(written)
    }
}

#[derive(Default)]
pub struct CpalCaptureDevice {
    target: Option<Target>,
    capture: Option<CaptureThread>,
}

impl CpalCaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureDevice for CpalCaptureDevice {
    fn supports_source(&self, source: AudioSourceKind) -> bool {
        // Desktop hosts have no access to the call downlink.
        source == AudioSourceKind::Microphone
    }

    fn configure(&mut self, profile: &CaptureProfile, output: &Path) -> Result<(), DeviceError> {
        if self.capture.is_some() {
            return Err(DeviceError::Busy);
        }
        if profile.channels != 1 {
            return Err(DeviceError::Unsupported(format!(
                "{} channels (mono only)",
                profile.channels
            )));
        }
        if profile.sample_rate == 0 {
            return Err(DeviceError::Unsupported("sample rate 0".to_string()));
        }
        if needs_transcode(profile) {
            ffmpeg_path()?;
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.target = Some(Target {
            profile: profile.clone(),
            output: output.to_path_buf(),
            staging: staging_path(output),
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        let staging = match &self.target {
            Some(target) => target.staging.clone(),
            None => return Err(DeviceError::Backend("device not configured".to_string())),
        };
        if self.capture.is_some() {
            return Err(DeviceError::Busy);
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, DeviceError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_staging = staging.clone();
        let handle = std::thread::Builder::new()
            .name("callvault-capture".to_string())
            .spawn(move || {
                let sink: SharedWriter = Arc::new(Mutex::new(None));
                let stream = match open_input_stream(&thread_staging, sink.clone()) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(0);
                    }
                };
                // Blocks until stop() or until the sender is dropped.
                let _ = stop_rx.recv();
                drop(stream);

                let writer = sink.lock().unwrap_or_else(|e| e.into_inner()).take();
                match writer {
                    Some(writer) => writer.finalize(),
                    None => Ok(0),
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                info!("Capture stream running at {} Hz into {:?}", sample_rate, staging);
                self.capture = Some(CaptureThread { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                remove_if_exists(&staging);
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                remove_if_exists(&staging);
                Err(DeviceError::Backend("capture thread exited early".to_string()))
            }
        }
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        let capture = self
            .capture
            .take()
            .ok_or_else(|| DeviceError::Backend("device not recording".to_string()))?;
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| DeviceError::Backend("device not configured".to_string()))?;

        let written = match finish_capture(capture) {
            Ok(written) => written,
            Err(e) => {
                remove_if_exists(&target.staging);
                return Err(e);
            }
        };
        if written == 0 {
            remove_if_exists(&target.staging);
            return Err(DeviceError::Backend("no audio captured".to_string()));
        }
        debug!("Captured {} samples into {:?}", written, target.staging);

        encode_staging(&target.staging, &target.output, &target.profile)
    }

    fn release(&mut self) {
        let Some(capture) = self.capture.take() else {
            self.target = None;
            return;
        };

        debug!("Releasing running capture stream");
        let written = finish_capture(capture).unwrap_or_else(|e| {
            warn!("Capture ended with an error: {}", e);
            0
        });
        if let Some(target) = self.target.take() {
            if written > 0 {
                warn!(
                    "Capture interrupted, keeping {:?} for recovery",
                    target.staging
                );
            } else {
                remove_if_exists(&target.staging);
            }
        }
    }

    fn recover(&mut self, profile: &CaptureProfile, output: &Path) -> Result<bool, DeviceError> {
        let staging = staging_path(output);
        if output.exists() || !staging.is_file() {
            return Ok(false);
        }

        let samples = WavReader::open(&staging).map_err(from_hound)?.len();
        if samples == 0 {
            remove_if_exists(&staging);
            return Ok(false);
        }

        info!(
            "Recovering {} staged samples from {:?} into {:?}",
            samples, staging, output
        );
        encode_staging(&staging, output, profile)?;
        Ok(true)
    }
}

impl Drop for CpalCaptureDevice {
    fn drop(&mut self) {
        self.release();
    }
}

fn staging_path(output: &Path) -> PathBuf {
    output.with_extension("capture.wav")
}

fn finish_capture(capture: CaptureThread) -> Result<u64, DeviceError> {
    let _ = capture.stop_tx.send(());
    match capture.handle.join() {
        Ok(result) => result,
        Err(_) => Err(DeviceError::Backend("capture thread panicked".to_string())),
    }
}

fn open_input_stream(
    staging: &Path,
    sink: SharedWriter,
) -> Result<(cpal::Stream, u32), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| DeviceError::Backend("no input device available".to_string()))?;

    info!(
        "Capture device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let supported = device
        .default_input_config()
        .map_err(|e| DeviceError::Backend(e.to_string()))?;
    let channels = supported.channels().max(1);
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.config();
    let err_fn = |err| error!("Capture stream error: {}", err);

    *sink.lock().unwrap_or_else(|e| e.into_inner()) =
        Some(StagingWriter::create(staging, sample_rate)?);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                push_to(&sink, data, channels);
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let converted: Vec<f32> =
                    data.iter().map(|s| *s as f32 / i16::MAX as f32).collect();
                push_to(&sink, &converted, channels);
            },
            err_fn,
            None,
        ),
        other => {
            return Err(DeviceError::Unsupported(format!("sample format {other:?}")));
        }
    }
    .map_err(|e| DeviceError::Backend(e.to_string()))?;

    stream
        .play()
        .map_err(|e| DeviceError::Backend(e.to_string()))?;

    Ok((stream, sample_rate))
}

fn push_to(sink: &Mutex<Option<StagingWriter>>, data: &[f32], channels: u16) {
    if let Ok(mut guard) = sink.lock() {
        if let Some(writer) = guard.as_mut() {
            writer.push(data, channels);
        }
    }
}

fn downmix(data: &[f32], channels: u16) -> impl Iterator<Item = f32> + '_ {
    let channels = usize::from(channels.max(1));
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
}

fn from_hound(e: hound::Error) -> DeviceError {
    match e {
        hound::Error::IoError(io) => DeviceError::Io(io),
        other => DeviceError::Backend(other.to_string()),
    }
}

fn remove_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

/// Moves or transcodes the staging WAV into `output`.
///
/// The staging file is kept when transcoding fails so a later recovery can
/// retry.
fn encode_staging(
    staging: &Path,
    output: &Path,
    profile: &CaptureProfile,
) -> Result<(), DeviceError> {
    if needs_transcode(profile) {
        transcode(staging, output, profile)?;
        remove_if_exists(staging);
        Ok(())
    } else {
        std::fs::rename(staging, output)?;
        Ok(())
    }
}

fn needs_transcode(profile: &CaptureProfile) -> bool {
    !(profile.container == Container::Wav && profile.codec == Codec::Pcm16)
}

fn ffmpeg_path() -> Result<PathBuf, DeviceError> {
    which::which("ffmpeg").map_err(|_| {
        DeviceError::Unsupported("ffmpeg is required for compressed recordings".to_string())
    })
}

fn ffmpeg_args(input: &Path, output: &Path, profile: &CaptureProfile) -> Vec<String> {
    let codec = match profile.codec {
        Codec::AmrNb => "libopencore_amrnb",
        Codec::Aac => "aac",
        Codec::Opus => "libopus",
        Codec::Pcm16 => "pcm_s16le",
    };
    let format = match profile.container {
        Container::ThreeGpp => "3gp",
        Container::Mpeg4 => "ipod",
        Container::Ogg => "ogg",
        Container::Wav => "wav",
    };

    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        profile.sample_rate.to_string(),
        "-codec:a".to_string(),
        codec.to_string(),
    ];
    if profile.codec != Codec::Pcm16 {
        args.push("-b:a".to_string());
        args.push(profile.bitrate.to_string());
    }
    args.extend([
        "-f".to_string(),
        format.to_string(),
        "-y".to_string(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

fn transcode(input: &Path, output: &Path, profile: &CaptureProfile) -> Result<(), DeviceError> {
    let ffmpeg = ffmpeg_path()?;
    let result = Command::new(ffmpeg)
        .args(ffmpeg_args(input, output, profile))
        .output()?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(DeviceError::Backend(format!(
            "ffmpeg encoding failed: {}",
            stderr.trim()
        )));
    }
    if !output.exists() {
        return Err(DeviceError::Backend(
            "ffmpeg did not produce output file".to_string(),
        ));
    }
    Ok(())
}
