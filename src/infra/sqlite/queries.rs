use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::domain::entities::cell::CellValue;
use crate::domain::entities::column::{ColumnDefinition, ColumnSet};
use crate::domain::entities::dataset::{DatasetId, DatasetMeta, Page, PageQuery, Row, ROW_ID_KEY};
use crate::domain::entities::edit::DirtyChange;
use crate::infra::sqlite::schema::{init_db, open_connection};

pub fn insert_columns(
    tx: &rusqlite::Transaction<'_>,
    dataset_id: i64,
    columns: &ColumnSet,
) -> Result<()> {
    let mut insert_column = tx
        .prepare("INSERT INTO column_def(dataset_id, col_idx, key, definition) VALUES (?1, ?2, ?3, ?4)")
        .context("failed to prepare column insert")?;

    for (col_idx, column) in columns.iter().enumerate() {
        let definition =
            serde_json::to_string(column).context("failed to encode column definition")?;
        insert_column
            .execute(params![dataset_id, col_idx as i64, column.key, definition])
            .with_context(|| format!("failed to insert column {}", column.key))?;
    }

    Ok(())
}

/// Inserts `rows` in order, returning how many were written.
pub fn insert_rows(
    tx: &rusqlite::Transaction<'_>,
    dataset_id: i64,
    columns: &ColumnSet,
    rows: &[Row],
) -> Result<i64> {
    let col_positions: HashMap<&str, i64> = columns
        .keys()
        .enumerate()
        .map(|(idx, key)| (key, idx as i64))
        .collect();

    let mut insert_row = tx
        .prepare("INSERT INTO dataset_row(dataset_id, row_idx, row_id) VALUES (?1, ?2, ?3)")
        .context("failed to prepare row insert")?;
    let mut insert_cell = tx
        .prepare("INSERT INTO cell(dataset_id, row_idx, col_idx, value) VALUES (?1, ?2, ?3, ?4)")
        .context("failed to prepare cell insert")?;

    let mut row_count = 0_i64;
    for row in rows {
        insert_row
            .execute(params![dataset_id, row_count, row.id])
            .with_context(|| format!("failed to insert row {} (duplicate id?)", row.id))?;

        for (key, value) in &row.cells {
            let Some(&col_idx) = col_positions.get(key.as_str()) else {
                anyhow::bail!("row {} has a value for unknown column {key}", row.id)
            };
            let encoded = serde_json::to_string(value).context("failed to encode cell value")?;
            insert_cell
                .execute(params![dataset_id, row_count, col_idx, encoded])
                .context("failed to insert cell")?;
        }
        row_count += 1;
    }

    Ok(row_count)
}

pub fn create_dataset(
    db_path: &Path,
    name: &str,
    source_path: &str,
    columns: &ColumnSet,
    rows: &[Row],
) -> Result<DatasetId> {
    init_db(db_path)?;
    let mut conn = open_connection(db_path)?;
    let tx = conn.transaction().context("failed to start transaction")?;

    tx.execute(
        "INSERT INTO dataset(name, source_path, row_count) VALUES (?1, ?2, 0)",
        params![name, source_path],
    )
    .context("failed to insert dataset")?;
    let dataset_id = tx.last_insert_rowid();

    insert_columns(&tx, dataset_id, columns)?;
    let row_count = insert_rows(&tx, dataset_id, columns, rows)?;

    tx.execute(
        "UPDATE dataset SET row_count = ?1 WHERE id = ?2",
        params![row_count, dataset_id],
    )
    .context("failed to update dataset row_count")?;

    tx.commit().context("failed to commit dataset transaction")?;
    Ok(DatasetId(dataset_id))
}

pub fn list_datasets(db_path: &Path) -> Result<Vec<DatasetMeta>> {
    init_db(db_path)?;
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, row_count, source_path, imported_at
             FROM dataset
             ORDER BY id DESC",
        )
        .context("failed to prepare datasets query")?;

    let datasets = stmt
        .query_map([], |row| {
            Ok(DatasetMeta {
                id: row.get::<_, i64>(0)?.into(),
                name: row.get(1)?,
                row_count: row.get(2)?,
                source_path: row.get(3)?,
                imported_at: row.get(4)?,
            })
        })
        .context("failed to query datasets")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect datasets")?;

    Ok(datasets)
}

pub fn load_columns(db_path: &Path, dataset_id: i64) -> Result<ColumnSet> {
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare(
            "SELECT definition
             FROM column_def
             WHERE dataset_id = ?1
             ORDER BY col_idx ASC",
        )
        .context("failed to prepare columns query")?;
    let definitions = stmt
        .query_map([dataset_id], |row| row.get::<_, String>(0))
        .context("failed to query columns")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect columns")?;

    if definitions.is_empty() {
        anyhow::bail!("dataset #{dataset_id} not found")
    }

    let columns = definitions
        .iter()
        .map(|definition| {
            serde_json::from_str::<ColumnDefinition>(definition)
                .context("failed to decode column definition")
        })
        .collect::<Result<Vec<_>>>()?;
    ColumnSet::new(columns).context("stored column configuration is invalid")
}

pub fn query_page(db_path: &Path, dataset_id: i64, query: PageQuery) -> Result<Page> {
    if query.page_size == 0 {
        anyhow::bail!("page_size must be greater than zero")
    }

    let conn = open_connection(db_path)?;

    let total: i64 = conn
        .query_row(
            "SELECT row_count FROM dataset WHERE id = ?1",
            [dataset_id],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query dataset row_count")?
        .with_context(|| format!("dataset #{dataset_id} not found"))?;

    let start = i64::try_from(query.offset()).context("page offset out of range")?;
    let end = start.saturating_add(i64::try_from(query.page_size).context("page_size out of range")?);

    let mut row_stmt = conn
        .prepare(
            "SELECT row_idx, row_id
             FROM dataset_row
             WHERE dataset_id = ?1 AND row_idx >= ?2 AND row_idx < ?3
             ORDER BY row_idx ASC",
        )
        .context("failed to prepare page rows query")?;
    let page_rows = row_stmt
        .query_map(params![dataset_id, start, end], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .context("failed to query page rows")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect page rows")?;
    drop(row_stmt);

    let row_pos: HashMap<i64, usize> = page_rows
        .iter()
        .enumerate()
        .map(|(pos, (row_idx, _))| (*row_idx, pos))
        .collect();
    let mut data: Vec<Row> = page_rows.into_iter().map(|(_, id)| Row::new(id)).collect();

    if !data.is_empty() {
        let mut hydrate_stmt = conn
            .prepare(
                "SELECT cell.row_idx, column_def.key, cell.value
                 FROM cell
                 JOIN column_def
                   ON column_def.dataset_id = cell.dataset_id
                  AND column_def.col_idx = cell.col_idx
                 WHERE cell.dataset_id = ?1 AND cell.row_idx >= ?2 AND cell.row_idx < ?3",
            )
            .context("failed to prepare row hydration query")?;
        let mut hydrate_rows = hydrate_stmt
            .query(params![dataset_id, start, end])
            .context("failed to run row hydration query")?;

        while let Some(row) = hydrate_rows.next().context("failed to read hydrated row")? {
            let row_idx: i64 = row.get(0).context("failed to read row_idx")?;
            let key: String = row.get(1).context("failed to read column key")?;
            let raw: String = row.get(2).context("failed to read value")?;
            let value: CellValue = serde_json::from_str(&raw)
                .with_context(|| format!("failed to decode cell value at row {row_idx}, column {key}"))?;

            if let Some(dest) = row_pos.get(&row_idx).and_then(|&pos| data.get_mut(pos)) {
                dest.cells.insert(key, value);
            }
        }
    }

    Ok(Page {
        data,
        has_more: end < total,
        total: total.max(0) as u64,
    })
}

/// Writes every change in one transaction; any unknown row or column
/// aborts the whole batch.
pub fn apply_changes(db_path: &Path, dataset_id: i64, changes: &[DirtyChange]) -> Result<()> {
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction()
        .context("failed to start save transaction")?;

    {
        let mut find_row = tx
            .prepare("SELECT row_idx FROM dataset_row WHERE dataset_id = ?1 AND row_id = ?2")
            .context("failed to prepare row lookup")?;
        let mut find_column = tx
            .prepare("SELECT col_idx FROM column_def WHERE dataset_id = ?1 AND key = ?2")
            .context("failed to prepare column lookup")?;
        let mut upsert_cell = tx
            .prepare(
                "INSERT INTO cell(dataset_id, row_idx, col_idx, value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(dataset_id, row_idx, col_idx) DO UPDATE SET value = excluded.value",
            )
            .context("failed to prepare cell upsert")?;

        for change in changes {
            if change.column_key == ROW_ID_KEY {
                anyhow::bail!("row {}: the {ROW_ID_KEY} column is read-only", change.row_id)
            }
            let row_idx: i64 = find_row
                .query_row(params![dataset_id, change.row_id], |row| row.get(0))
                .optional()
                .context("failed to look up row")?
                .with_context(|| format!("unknown row {}", change.row_id))?;
            let col_idx: i64 = find_column
                .query_row(params![dataset_id, change.column_key], |row| row.get(0))
                .optional()
                .context("failed to look up column")?
                .with_context(|| format!("unknown column {}", change.column_key))?;

            let encoded =
                serde_json::to_string(&change.value).context("failed to encode cell value")?;
            upsert_cell
                .execute(params![dataset_id, row_idx, col_idx, encoded])
                .with_context(|| format!("failed to write cell {}", change.cell_key()))?;
        }
    }

    tx.commit().context("failed to commit save transaction")?;
    Ok(())
}
