mod init;
pub mod recordings;

pub use init::{init_db, migrate, open_at};
pub use recordings::{RecordingRecord, RecordingRepository};
