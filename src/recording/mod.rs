//! Call recording: capture device boundary and the recording session.

pub mod clock;
pub mod cpal_device;
pub mod device;
pub mod session;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use cpal_device::CpalCaptureDevice;
pub use device::{AudioSourceKind, CaptureDevice, CaptureProfile, Codec, Container};
pub use session::{ActiveRecording, RecordingHandle, RecordingSession, SessionStatus};
pub use storage::{DirectoryStorage, StorageLocationProvider};
