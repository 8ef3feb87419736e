use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::store::{MetadataStore, RecordingMetadata};
use crate::db::{self, RecordingRepository};

/// Metadata store backed by the local sqlite database.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataStore {
    pub fn open_default() -> Result<Self> {
        Ok(Self::from_connection(db::init_db()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn record_metadata(&self, record: &RecordingMetadata) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let id = RecordingRepository::upsert(&conn, record)?;
        debug!("Recorded metadata for {} as row {}", record.filename, id);
        Ok(())
    }
}
