use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::entities::cell::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetId(pub i64);

impl From<i64> for DatasetId {
    fn from(value: i64) -> Self {
        DatasetId(value)
    }
}

impl From<DatasetId> for i64 {
    fn from(value: DatasetId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMeta {
    pub id: DatasetId,
    pub name: String,
    pub row_count: i64,
    pub source_path: String,
    pub imported_at: String,
}

/// Key of the row-identifier column.
pub const ROW_ID_KEY: &str = "id";

/// One table row: a mandatory unique `id` plus its cells by column key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    #[serde(flatten)]
    pub cells: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column_key: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.cells.insert(column_key.into(), value.into());
        self
    }

    pub fn get(&self, column_key: &str) -> Option<&CellValue> {
        self.cells.get(column_key)
    }

    pub fn has_column(&self, column_key: &str) -> bool {
        self.cells.contains_key(column_key)
    }

    /// Value of a cell, treating a missing cell as null.
    pub fn value_or_null(&self, column_key: &str) -> CellValue {
        self.get(column_key).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, column_key: &str, value: CellValue) {
        self.cells.insert(column_key.to_string(), value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageQuery {
    pub page: usize,
    pub page_size: usize,
}

impl PageQuery {
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.page_size)
    }
}

/// One fetched page, as returned by the data service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub data: Vec<Row>,
    pub has_more: bool,
    pub total: u64,
}

impl Page {
    /// Cuts page `query.page` out of a complete row list.
    pub fn slice(rows: &[Row], query: PageQuery) -> Self {
        let start = query.offset().min(rows.len());
        let end = start.saturating_add(query.page_size).min(rows.len());
        Self {
            data: rows[start..end].to_vec(),
            has_more: end < rows.len(),
            total: rows.len() as u64,
        }
    }
}
