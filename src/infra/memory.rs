use std::sync::{Mutex, RwLock};

use tracing::debug;

use crate::domain::entities::dataset::{Page, PageQuery, Row};
use crate::domain::entities::edit::DirtyChange;
use crate::error::ServiceError;
use crate::usecase::ports::data_service::DataService;

#[derive(Debug, Default)]
struct Failures {
    fetch: Option<ServiceError>,
    save: Option<ServiceError>,
}

/// Data service over a row list held in memory.
///
/// Accepted batches are applied to the rows and recorded. Either call can be
/// told to fail once, which is how rollback paths are exercised.
#[derive(Debug, Default)]
pub struct InMemoryTableService {
    rows: RwLock<Vec<Row>>,
    saved: Mutex<Vec<Vec<DirtyChange>>>,
    failures: Mutex<Failures>,
}

impl InMemoryTableService {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: RwLock::new(rows),
            ..Self::default()
        }
    }

    pub fn fail_next_fetch(&self, err: ServiceError) -> Result<(), ServiceError> {
        self.failures
            .lock()
            .map_err(|_| ServiceError::LockPoisoned("fail_next_fetch"))?
            .fetch = Some(err);
        Ok(())
    }

    pub fn fail_next_save(&self, err: ServiceError) -> Result<(), ServiceError> {
        self.failures
            .lock()
            .map_err(|_| ServiceError::LockPoisoned("fail_next_save"))?
            .save = Some(err);
        Ok(())
    }

    pub fn rows(&self) -> Result<Vec<Row>, ServiceError> {
        Ok(self
            .rows
            .read()
            .map_err(|_| ServiceError::LockPoisoned("rows"))?
            .clone())
    }

    /// Every batch accepted so far, oldest first.
    pub fn saved_batches(&self) -> Result<Vec<Vec<DirtyChange>>, ServiceError> {
        Ok(self
            .saved
            .lock()
            .map_err(|_| ServiceError::LockPoisoned("saved_batches"))?
            .clone())
    }
}

impl DataService for InMemoryTableService {
    fn fetch_page(&self, query: PageQuery) -> Result<Page, ServiceError> {
        if query.page_size == 0 {
            return Err(ServiceError::InvalidPage("page_size must be greater than zero".into()));
        }
        if let Some(err) = self
            .failures
            .lock()
            .map_err(|_| ServiceError::LockPoisoned("fetch_page"))?
            .fetch
            .take()
        {
            return Err(err);
        }

        let rows = self
            .rows
            .read()
            .map_err(|_| ServiceError::LockPoisoned("fetch_page"))?;
        let page = Page::slice(&rows, query);
        debug!(page = query.page, rows = page.data.len(), "served page");
        Ok(page)
    }

    fn save_batch(&self, changes: &[DirtyChange]) -> Result<(), ServiceError> {
        if let Some(err) = self
            .failures
            .lock()
            .map_err(|_| ServiceError::LockPoisoned("save_batch"))?
            .save
            .take()
        {
            return Err(err);
        }

        let mut rows = self
            .rows
            .write()
            .map_err(|_| ServiceError::LockPoisoned("save_batch"))?;
        if let Some(missing) = changes
            .iter()
            .find(|change| !rows.iter().any(|row| row.id == change.row_id))
        {
            return Err(ServiceError::Storage(format!("unknown row {}", missing.row_id)));
        }
        for change in changes {
            if let Some(row) = rows.iter_mut().find(|row| row.id == change.row_id) {
                row.set(&change.column_key, change.value.clone());
            }
        }
        drop(rows);

        self.saved
            .lock()
            .map_err(|_| ServiceError::LockPoisoned("save_batch"))?
            .push(changes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::cell::CellValue;

    fn service() -> InMemoryTableService {
        InMemoryTableService::new(
            (1..=5)
                .map(|idx| Row::new(idx.to_string()).with("count", idx as i64))
                .collect(),
        )
    }

    #[test]
    fn pages_through_rows() {
        let service = service();
        let page = service
            .fetch_page(PageQuery { page: 2, page_size: 2 })
            .unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(!page.has_more);
        assert_eq!(page.total, 5);

        assert!(matches!(
            service.fetch_page(PageQuery { page: 0, page_size: 0 }),
            Err(ServiceError::InvalidPage(_))
        ));
    }

    #[test]
    fn injected_failures_fire_once() {
        let service = service();
        service
            .fail_next_save(ServiceError::Transport("down".into()))
            .unwrap();
        let batch = vec![DirtyChange::new("1", "count", CellValue::Number(9.0))];

        assert!(service.save_batch(&batch).is_err());
        assert!(service.saved_batches().unwrap().is_empty());

        service.save_batch(&batch).unwrap();
        assert_eq!(service.saved_batches().unwrap(), vec![batch]);
        assert_eq!(
            service.rows().unwrap()[0].value_or_null("count"),
            CellValue::Number(9.0)
        );
    }

    #[test]
    fn unknown_rows_fail_the_whole_batch() {
        let service = service();
        let batch = vec![
            DirtyChange::new("1", "count", CellValue::Number(9.0)),
            DirtyChange::new("99", "count", CellValue::Number(1.0)),
        ];
        assert!(matches!(service.save_batch(&batch), Err(ServiceError::Storage(_))));
        assert_eq!(
            service.rows().unwrap()[0].value_or_null("count"),
            CellValue::Number(1.0)
        );
    }
}
