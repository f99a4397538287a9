use thiserror::Error;

use crate::domain::entities::edit::CellKey;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColumnConfigError {
    #[error("column key must not be empty")]
    EmptyKey,
    #[error("column key {0} contains the cell key separator `-`")]
    SeparatorInKey(String),
    #[error("duplicate column key: {0}")]
    DuplicateKey(String),
    #[error("enum column {0} requires enum options")]
    MissingEnumOptions(String),
    #[error("column {0} is not an enum but declares enum options")]
    UnexpectedEnumOptions(String),
    #[error("column {0} is not numeric but declares precision or is_integer")]
    NumericOptionsOnNonNumber(String),
}

/// Object-valued input that is not a well formed object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("value must be an object, got {found}")]
    NotAnObject { found: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("value must be a number")]
    NotANumber,
    #[error(transparent)]
    Structural(#[from] StructuralError),
}

/// Failure reported by a data service implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid page request: {0}")]
    InvalidPage(String),
    #[error("data service lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("no cell is being edited")]
    NotEditing,
    #[error("cell {0} is not editable")]
    NotEditable(CellKey),
    #[error("row {0} is not loaded")]
    UnknownRow(String),
    #[error("cell {0} is open in the edit session")]
    CellBusy(CellKey),
    #[error("cell {key} rejected: {source}")]
    Rejected {
        key: CellKey,
        #[source]
        source: ValidationError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveError {
    #[error("nothing to save")]
    Empty,
    #[error("a batch save is already in flight")]
    InFlight,
    #[error("batch {0} is not the batch in flight")]
    UnknownBatch(u64),
    #[error("batch save failed, {changes} change(s) rolled back: {source}")]
    RolledBack {
        changes: usize,
        #[source]
        source: ServiceError,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("page_size must be greater than zero")]
    ZeroPageSize,
    #[error(transparent)]
    Columns(#[from] ColumnConfigError),
    #[error("unable to resolve data directory")]
    NoDataDir,
}
