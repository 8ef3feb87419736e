use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

pub fn init_db() -> Result<Connection> {
    let db_path = crate::global::db_file()?;
    open_at(&db_path)
}

pub fn open_at(db_path: &Path) -> Result<Connection> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let conn = Connection::open(db_path).context("Failed to open database connection")?;

    migrate(&conn)?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS recordings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL UNIQUE,
            remote_url TEXT NOT NULL,
            uploaded_at INTEGER NOT NULL,
            file_size INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create recordings table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_recordings_uploaded_at ON recordings(uploaded_at DESC)",
        [],
    )
    .context("Failed to create index on uploaded_at")?;

    Ok(())
}
