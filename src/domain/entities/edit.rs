use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::entities::cell::CellValue;

pub const CELL_KEY_SEPARATOR: char = '-';

/// Stable key of one cell: `row id + '-' + column key`.
///
/// Decoding splits on the last separator, so a row id may contain `-` but
/// must not end in `-<column key>` of a real column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellKey(String);

impl CellKey {
    pub fn new(row_id: &str, column_key: &str) -> Self {
        CellKey(format!("{row_id}{CELL_KEY_SEPARATOR}{column_key}"))
    }

    /// Wraps an already encoded key, e.g. one read back from storage.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        CellKey(encoded.into())
    }

    /// Splits the key back into `(row_id, column_key)`.
    ///
    /// Returns `None` when there is no separator or either side is empty;
    /// callers discard such keys.
    pub fn decode(&self) -> Option<(&str, &str)> {
        self.0
            .rsplit_once(CELL_KEY_SEPARATOR)
            .filter(|(row_id, column_key)| !row_id.is_empty() && !column_key.is_empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One pending change, rebuilt on demand from baselines and live rows.
///
/// On the wire the column is called `cellKey` to match the save endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyChange {
    pub row_id: String,
    #[serde(rename = "cellKey")]
    pub column_key: String,
    pub value: CellValue,
}

impl DirtyChange {
    pub fn new(row_id: impl Into<String>, column_key: impl Into<String>, value: CellValue) -> Self {
        Self {
            row_id: row_id.into(),
            column_key: column_key.into(),
            value,
        }
    }

    pub fn cell_key(&self) -> CellKey {
        CellKey::new(&self.row_id, &self.column_key)
    }
}
