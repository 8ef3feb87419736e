//! Upload history: the recordings whose metadata reached the local database.
//!
//! Used by the `history` CLI command.

use crate::db::{self, RecordingRecord, RecordingRepository};
use anyhow::Result;
use chrono::{DateTime, Local};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// A single uploaded recording with display-ready fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub filename: String,
    pub url: String,
    pub uploaded_at: String,
    pub file_size: u64,
    pub retry_count: u32,
}

impl From<RecordingRecord> for HistoryEntry {
    fn from(record: RecordingRecord) -> Self {
        let uploaded_at = DateTime::from_timestamp_millis(record.metadata.uploaded_at_epoch_millis)
            .map(|ts| {
                ts.with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "Unknown".to_string());
        Self {
            id: record.id,
            filename: record.metadata.filename,
            url: record.metadata.remote_url,
            uploaded_at,
            file_size: record.metadata.file_size_bytes,
            retry_count: record.metadata.retry_count,
        }
    }
}

/// The newest entries plus the number of recordings on record.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total: i64,
}

/// Get recently uploaded recordings.
pub fn get_recent(limit: usize) -> Result<HistoryPage> {
    let conn = db::init_db()?;
    recent_from(&conn, limit)
}

pub fn recent_from(conn: &Connection, limit: usize) -> Result<HistoryPage> {
    let records = RecordingRepository::list(conn, limit)?;
    Ok(HistoryPage {
        entries: records.into_iter().map(HistoryEntry::from).collect(),
        total: RecordingRepository::count(conn)?,
    })
}

/// Human-readable size, e.g. `12.3 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::RecordingMetadata;

    #[test]
    fn test_recent_from_maps_entries() {
        let conn = Connection::open_in_memory().unwrap();
        db::migrate(&conn).unwrap();
        RecordingRepository::upsert(
            &conn,
            &RecordingMetadata {
                filename: "call_recording_20260101_101010.3gp".to_string(),
                remote_url: "https://store.example/a".to_string(),
                uploaded_at_epoch_millis: 1_767_262_210_000,
                file_size_bytes: 2048,
                retry_count: 1,
            },
        )
        .unwrap();

        let page = recent_from(&conn, 10).unwrap();
        assert_eq!(page.total, 1);
        let entries = page.entries;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].filename, "call_recording_20260101_101010.3gp");
        assert_eq!(entries[0].retry_count, 1);
        assert_ne!(entries[0].uploaded_at, "Unknown");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_total_counts_beyond_limit() {
        let conn = Connection::open_in_memory().unwrap();
        db::migrate(&conn).unwrap();
        for i in 0..3 {
            RecordingRepository::upsert(
                &conn,
                &RecordingMetadata {
                    filename: format!("call_recording_{i}.3gp"),
                    remote_url: format!("https://store.example/{i}"),
                    uploaded_at_epoch_millis: 1_767_262_210_000 + i,
                    file_size_bytes: 100,
                    retry_count: 0,
                },
            )
            .unwrap();
        }

        let page = recent_from(&conn, 2).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.total, 3);
        assert_eq!(page.entries[0].filename, "call_recording_2.3gp");
    }
}
