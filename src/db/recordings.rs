//! Uploaded recording records.
//!
//! Raw SQL with rusqlite, no ORM. One row per filename: re-uploading a
//! recording overwrites its row, the same way the object store overwrites
//! the stored bytes.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};

use crate::upload::RecordingMetadata;

/// An uploaded recording as stored in the database.
#[derive(Debug, Clone)]
pub struct RecordingRecord {
    pub id: i64,
    pub metadata: RecordingMetadata,
    pub created_at: String,
}

pub struct RecordingRepository;

const COLUMNS: &str =
    "id, filename, remote_url, uploaded_at, file_size, retry_count, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RecordingRecord> {
    let file_size: i64 = row.get(4)?;
    let retry_count: i64 = row.get(5)?;
    Ok(RecordingRecord {
        id: row.get(0)?,
        metadata: RecordingMetadata {
            filename: row.get(1)?,
            remote_url: row.get(2)?,
            uploaded_at_epoch_millis: row.get(3)?,
            file_size_bytes: file_size.max(0) as u64,
            retry_count: retry_count.max(0) as u32,
        },
        created_at: row.get(6)?,
    })
}

impl RecordingRepository {
    /// Insert or overwrite the record for `metadata.filename`.
    /// Returns the row id.
    pub fn upsert(conn: &Connection, metadata: &RecordingMetadata) -> Result<i64> {
        conn.execute(
            "INSERT INTO recordings (filename, remote_url, uploaded_at, file_size, retry_count) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(filename) DO UPDATE SET remote_url = excluded.remote_url, \
             uploaded_at = excluded.uploaded_at, file_size = excluded.file_size, \
             retry_count = excluded.retry_count",
            params![
                metadata.filename,
                metadata.remote_url,
                metadata.uploaded_at_epoch_millis,
                metadata.file_size_bytes as i64,
                metadata.retry_count as i64,
            ],
        )
        .context("Failed to insert recording metadata")?;

        let id = conn
            .query_row(
                "SELECT id FROM recordings WHERE filename = ?1",
                params![metadata.filename],
                |row| row.get(0),
            )
            .context("Failed to read recording id")?;
        Ok(id)
    }

    pub fn get_by_filename(conn: &Connection, filename: &str) -> Result<Option<RecordingRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM recordings WHERE filename = ?1"
            ))
            .context("Failed to prepare recording query")?;

        let mut rows = stmt
            .query_map(params![filename], from_row)
            .context("Failed to query recording")?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// List recordings, most recently uploaded first.
    pub fn list(conn: &Connection, limit: usize) -> Result<Vec<RecordingRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM recordings ORDER BY uploaded_at DESC, id DESC LIMIT ?1"
            ))
            .context("Failed to prepare recordings list query")?;

        let rows = stmt
            .query_map(params![limit as i64], from_row)
            .context("Failed to list recordings")?;

        let mut recordings = Vec::new();
        for row in rows {
            recordings.push(row?);
        }

        Ok(recordings)
    }

    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM recordings", [], |row| row.get(0))
            .context("Failed to count recordings")?;

        Ok(count)
    }
}
