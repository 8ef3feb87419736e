//! Retrying upload of finished recordings to the object and metadata stores.

pub mod http_store;
pub mod job;
pub mod local_store;
pub mod pipeline;
pub mod sqlite_store;
pub mod store;

pub use http_store::{HttpMetadataStore, HttpObjectStore};
pub use job::{RetryPolicy, UploadJob, UploadPhase};
pub use local_store::LocalObjectStore;
pub use pipeline::{UploadOutcome, UploadPipeline};
pub use sqlite_store::SqliteMetadataStore;
pub use store::{MetadataStore, ObjectStore, RecordingMetadata, RemoteRef};
