use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::domain::entities::cell::CellValue;
use crate::domain::entities::column::{ColumnDefinition, ColumnSet, ColumnType};
use crate::domain::entities::dataset::{DatasetId, Row, ROW_ID_KEY};
use crate::domain::validation::{parse_object_text, validate};
use crate::infra::sqlite::queries::create_dataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportResult {
    pub dataset_id: DatasetId,
    pub row_count: i64,
}

/// Imports a CSV file as a new dataset.
///
/// Headers found in `configured` are typed by their definition; any other
/// header becomes a plain string column.
pub fn import_csv_to_sqlite(
    db_path: &Path,
    csv_path: &Path,
    configured: &ColumnSet,
) -> Result<ImportResult> {
    let (columns, rows) = read_csv_rows(csv_path, configured)?;

    let source_path = csv_path.to_string_lossy().into_owned();
    let dataset_name = csv_path
        .file_stem()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("dataset")
        .to_string();

    let dataset_id = create_dataset(db_path, &dataset_name, &source_path, &columns, &rows)?;
    let row_count = rows.len() as i64;
    info!(dataset = dataset_id.0, row_count, path = %csv_path.display(), "imported csv");

    Ok(ImportResult {
        dataset_id,
        row_count,
    })
}

pub fn read_csv_rows(csv_path: &Path, configured: &ColumnSet) -> Result<(ColumnSet, Vec<Row>)> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open csv: {}", csv_path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read headers from csv: {}", csv_path.display()))?
        .clone();

    if headers.is_empty() {
        anyhow::bail!("csv header is required")
    }
    let Some(id_idx) = headers.iter().position(|name| name.trim() == ROW_ID_KEY) else {
        anyhow::bail!("csv header `{ROW_ID_KEY}` is required")
    };

    let definitions: Vec<ColumnDefinition> = headers
        .iter()
        .map(|name| {
            let name = name.trim();
            configured
                .get(name)
                .cloned()
                .unwrap_or_else(|| ColumnDefinition::new(name, name, ColumnType::String))
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to parse csv record")?;
        let line = record.position().map_or(0, |position| position.line());

        let id = record.get(id_idx).unwrap_or("").trim();
        if id.is_empty() {
            anyhow::bail!("line {line}: empty `{ROW_ID_KEY}`")
        }

        let mut row = Row::new(id);
        for (col_idx, column) in definitions.iter().enumerate() {
            if col_idx == id_idx {
                continue;
            }
            let raw = record.get(col_idx).unwrap_or("");
            let value = parse_field(column, raw)
                .with_context(|| format!("line {line}, column {}", column.key))?;
            row.set(&column.key, value);
        }
        rows.push(row);
    }

    let columns = ColumnSet::new(definitions).context("csv headers do not form a valid column set")?;
    Ok((columns, rows))
}

/// Types one raw CSV field by its column. Blank fields are null.
pub fn parse_field(column: &ColumnDefinition, raw: &str) -> Result<CellValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(CellValue::Null);
    }

    match column.kind {
        ColumnType::Number => {
            validate(column, CellValue::text(trimmed)).with_context(|| format!("invalid number {trimmed:?}"))
        }
        ColumnType::Array if trimmed.starts_with('[') => {
            let tags: Vec<String> =
                serde_json::from_str(trimmed).context("array cells must hold a JSON array of strings")?;
            Ok(CellValue::Tags(tags))
        }
        ColumnType::Array => Ok(CellValue::tags(
            trimmed
                .split(';')
                .map(str::trim)
                .filter(|tag| !tag.is_empty()),
        )),
        ColumnType::Object => {
            let parsed = parse_object_text(trimmed)?;
            if !parsed.duplicate_keys.is_empty() {
                warn!(column = %column.key, keys = ?parsed.duplicate_keys, "duplicate object keys, last value kept");
            }
            Ok(CellValue::Object(parsed.value))
        }
        ColumnType::String | ColumnType::Enum | ColumnType::Timestamp => Ok(CellValue::text(raw)),
    }
}
