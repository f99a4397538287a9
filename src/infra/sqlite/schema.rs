use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open db: {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign key enforcement")?;
    Ok(conn)
}

/// Creates the database file and its tables if they do not exist yet.
///
/// Cell values are stored as JSON text; `row_idx` is the row's position in
/// the dataset and drives paging.
pub fn init_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }

    let conn = open_connection(db_path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS dataset (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            source_path TEXT NOT NULL,
            row_count   INTEGER NOT NULL,
            imported_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS column_def (
            dataset_id  INTEGER NOT NULL,
            col_idx     INTEGER NOT NULL,
            key         TEXT NOT NULL,
            definition  TEXT NOT NULL,
            PRIMARY KEY (dataset_id, col_idx),
            UNIQUE (dataset_id, key),
            FOREIGN KEY (dataset_id) REFERENCES dataset(id)
        );

        CREATE TABLE IF NOT EXISTS dataset_row (
            dataset_id  INTEGER NOT NULL,
            row_idx     INTEGER NOT NULL,
            row_id      TEXT NOT NULL,
            PRIMARY KEY (dataset_id, row_idx),
            UNIQUE (dataset_id, row_id),
            FOREIGN KEY (dataset_id) REFERENCES dataset(id)
        );

        CREATE TABLE IF NOT EXISTS cell (
            dataset_id  INTEGER NOT NULL,
            row_idx     INTEGER NOT NULL,
            col_idx     INTEGER NOT NULL,
            value       TEXT NOT NULL,
            PRIMARY KEY (dataset_id, row_idx, col_idx),
            FOREIGN KEY (dataset_id) REFERENCES dataset(id)
        );

        CREATE INDEX IF NOT EXISTS idx_cell_dataset_row
            ON cell(dataset_id, row_idx);
        ",
    )
    .context("failed to initialize schema")?;

    Ok(())
}
