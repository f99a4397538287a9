use std::path::PathBuf;

use crate::domain::entities::column::ColumnSet;
use crate::domain::entities::dataset::{DatasetId, Page, PageQuery};
use crate::domain::entities::edit::DirtyChange;
use crate::error::ServiceError;
use crate::infra::sqlite::queries::{apply_changes, load_columns, query_page};
use crate::infra::sqlite::schema::init_db;
use crate::usecase::ports::data_service::DataService;

/// Serves one stored dataset.
pub struct SqliteTableService {
    db_path: PathBuf,
    dataset_id: DatasetId,
}

impl SqliteTableService {
    pub fn new(db_path: impl Into<PathBuf>, dataset_id: DatasetId) -> Self {
        Self {
            db_path: db_path.into(),
            dataset_id,
        }
    }

    pub fn init(&self) -> Result<(), ServiceError> {
        init_db(&self.db_path).map_err(storage_error)
    }

    pub fn dataset_id(&self) -> DatasetId {
        self.dataset_id
    }

    pub fn columns(&self) -> Result<ColumnSet, ServiceError> {
        load_columns(&self.db_path, self.dataset_id.0).map_err(storage_error)
    }
}

impl DataService for SqliteTableService {
    fn fetch_page(&self, query: PageQuery) -> Result<Page, ServiceError> {
        if query.page_size == 0 {
            return Err(ServiceError::InvalidPage("page_size must be greater than zero".into()));
        }
        query_page(&self.db_path, self.dataset_id.0, query).map_err(storage_error)
    }

    fn save_batch(&self, changes: &[DirtyChange]) -> Result<(), ServiceError> {
        apply_changes(&self.db_path, self.dataset_id.0, changes).map_err(storage_error)
    }
}

fn storage_error(err: anyhow::Error) -> ServiceError {
    ServiceError::Storage(format!("{err:#}"))
}
