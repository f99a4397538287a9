use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::domain::entities::column::ColumnSet;
use crate::domain::entities::dataset::DatasetMeta;
use crate::infra::import::csv::{import_csv_to_sqlite, ImportResult};
use crate::infra::sqlite::queries::list_datasets;

/// Brings files into the SQLite store and lists what is there.
pub struct ImportService {
    db_path: PathBuf,
    columns: ColumnSet,
}

impl ImportService {
    pub fn new(db_path: PathBuf, columns: ColumnSet) -> Self {
        Self { db_path, columns }
    }

    pub fn import_csv(&self, path: &Path) -> Result<ImportResult> {
        import_csv_to_sqlite(&self.db_path, path, &self.columns)
    }

    pub fn list_datasets(&self) -> Result<Vec<DatasetMeta>> {
        list_datasets(&self.db_path)
    }
}
