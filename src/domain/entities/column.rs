use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::entities::dataset::ROW_ID_KEY;
use crate::domain::entities::edit::CELL_KEY_SEPARATOR;
use crate::error::ColumnConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Enum,
    Timestamp,
    Array,
    Object,
}

impl ColumnType {
    /// Array and object editors stay open inline and save through
    /// `direct_commit` instead of the begin/commit cycle.
    pub fn opens_inline(self) -> bool {
        matches!(self, ColumnType::Array | ColumnType::Object)
    }
}

fn default_editable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    #[serde(default = "default_editable")]
    pub editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default)]
    pub is_integer: bool,
}

impl ColumnDefinition {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            editable: true,
            enum_options: None,
            precision: None,
            is_integer: false,
        }
    }

    pub fn enumeration<I, S>(key: impl Into<String>, label: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enum_options: Some(options.into_iter().map(Into::into).collect()),
            ..Self::new(key, label, ColumnType::Enum)
        }
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn integer(mut self) -> Self {
        self.is_integer = true;
        self
    }
}

/// Immutable column configuration of one table instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSet {
    columns: Vec<ColumnDefinition>,
}

impl ColumnSet {
    pub fn new(columns: Vec<ColumnDefinition>) -> Result<Self, ColumnConfigError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.key.is_empty() {
                return Err(ColumnConfigError::EmptyKey);
            }
            // Cell keys split on the last separator, so it must not occur
            // inside a column key.
            if column.key.contains(CELL_KEY_SEPARATOR) {
                return Err(ColumnConfigError::SeparatorInKey(column.key.clone()));
            }
            if !seen.insert(column.key.as_str()) {
                return Err(ColumnConfigError::DuplicateKey(column.key.clone()));
            }

            let has_options = column
                .enum_options
                .as_ref()
                .is_some_and(|options| !options.is_empty());
            match column.kind {
                ColumnType::Enum if !has_options => {
                    return Err(ColumnConfigError::MissingEnumOptions(column.key.clone()));
                }
                ColumnType::Enum => {}
                _ if column.enum_options.is_some() => {
                    return Err(ColumnConfigError::UnexpectedEnumOptions(column.key.clone()));
                }
                _ => {}
            }

            if column.kind != ColumnType::Number
                && (column.precision.is_some() || column.is_integer)
            {
                return Err(ColumnConfigError::NumericOptionsOnNonNumber(
                    column.key.clone(),
                ));
            }
        }

        Ok(Self { columns })
    }

    /// Columns of the demo table the tool ships with.
    pub fn demo() -> Self {
        Self {
            columns: vec![
                ColumnDefinition::new(ROW_ID_KEY, "ID", ColumnType::String).read_only(),
                ColumnDefinition::new("name", "Name", ColumnType::String),
                ColumnDefinition::enumeration("status", "Status", ["active", "inactive", "draft"]),
                ColumnDefinition::new("count", "Count", ColumnType::Number).integer(),
                ColumnDefinition::new("price", "Price", ColumnType::Number).with_precision(2),
                ColumnDefinition::new("created_at", "Created", ColumnType::Timestamp),
                ColumnDefinition::new("updated_at", "Updated", ColumnType::Timestamp),
                ColumnDefinition::new("tags", "Tags", ColumnType::Array),
                ColumnDefinition::new("metadata", "Metadata", ColumnType::Object),
            ],
        }
    }

    pub fn get(&self, key: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.key == key)
    }

    /// The row-identifier column is never editable, whatever its flag says.
    pub fn is_editable(&self, key: &str) -> bool {
        key != ROW_ID_KEY && self.get(key).is_some_and(|column| column.editable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
