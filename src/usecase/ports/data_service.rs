use crate::domain::entities::dataset::{Page, PageQuery};
use crate::domain::entities::edit::DirtyChange;
use crate::error::ServiceError;

/// Remote side of a table: pages rows out and accepts batches of changes.
pub trait DataService: Send + Sync {
    fn fetch_page(&self, query: PageQuery) -> Result<Page, ServiceError>;

    /// Applies every change or none of them. Never called with an empty
    /// batch.
    fn save_batch(&self, changes: &[DirtyChange]) -> Result<(), ServiceError>;
}
