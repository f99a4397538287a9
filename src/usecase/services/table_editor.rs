//! The editing engine for one table instance.
//!
//! `TableEditor` owns the cache, baselines, edit session, save coordinator
//! and page loader, and is built with everything it talks to: the column
//! configuration, the change listener and the error reporter.

use tracing::{debug, info, warn};

use crate::domain::baseline::BaselineTracker;
use crate::domain::cache::{MutationOrigin, PaginatedCache, TableCache};
use crate::domain::entities::cell::CellValue;
use crate::domain::entities::column::ColumnSet;
use crate::domain::entities::dataset::{Page, PageQuery, Row};
use crate::domain::entities::edit::{CellKey, DirtyChange};
use crate::domain::session::{CommitOutcome, EditContext, EditSession};
use crate::error::{EditError, SaveError, ServiceError, ValidationError};
use crate::usecase::ports::data_service::DataService;
use crate::usecase::ports::notify::{
    ChangeListener, ErrorReporter, FailureContext, TracingErrorReporter,
};
use crate::usecase::services::batch_save::{BatchSaveCoordinator, PendingBatch};
use crate::usecase::services::page_loader::PageLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorConfig {
    pub page_size: usize,
    pub lazy_loading: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            lazy_loading: true,
        }
    }
}

pub struct TableEditor {
    columns: ColumnSet,
    config: EditorConfig,
    cache: TableCache,
    baselines: BaselineTracker,
    session: EditSession,
    saver: BatchSaveCoordinator,
    loader: PageLoader,
    listener: Option<Box<dyn ChangeListener>>,
    reporter: Box<dyn ErrorReporter>,
}

impl TableEditor {
    /// Lazy tables seed page 0 from `initial_rows` when any are given and
    /// otherwise start empty, waiting for the first fetch.
    pub fn new(columns: ColumnSet, config: EditorConfig, initial_rows: Vec<Row>) -> Self {
        let cache = if config.lazy_loading {
            if initial_rows.is_empty() {
                TableCache::lazy(PaginatedCache::new())
            } else {
                TableCache::lazy(PaginatedCache::from_initial(&initial_rows, config.page_size))
            }
        } else {
            TableCache::eager(initial_rows)
        };

        Self {
            columns,
            config,
            cache,
            baselines: BaselineTracker::new(),
            session: EditSession::new(),
            saver: BatchSaveCoordinator::new(),
            loader: PageLoader::new(config.page_size),
            listener: None,
            reporter: Box::new(TracingErrorReporter),
        }
    }

    pub fn with_listener(mut self, listener: impl ChangeListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn with_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn config(&self) -> EditorConfig {
        self.config
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.cache.rows()
    }

    pub fn row(&self, id: &str) -> Option<&Row> {
        self.cache.row(id)
    }

    pub fn baselines(&self) -> &BaselineTracker {
        &self.baselines
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn is_saving(&self) -> bool {
        self.saver.is_saving()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn has_more(&self) -> bool {
        self.cache.paged().is_some_and(PaginatedCache::has_more)
    }

    pub fn begin_edit(&mut self, row_id: &str, column_key: &str) -> bool {
        let (ctx, session) = self.split();
        session.begin_edit(ctx, row_id, column_key)
    }

    pub fn update_temp(&mut self, value: CellValue) -> Result<bool, EditError> {
        self.session.update_temp(&self.baselines, value)
    }

    pub fn commit(&mut self, explicit: Option<CellValue>) -> Result<CommitOutcome, EditError> {
        let (ctx, session) = self.split();
        session.commit(ctx, explicit)
    }

    pub fn cancel(&mut self) -> Result<CellKey, EditError> {
        self.session.cancel(&self.cache, &mut self.baselines)
    }

    pub fn direct_commit(
        &mut self,
        row_id: &str,
        column_key: &str,
        value: CellValue,
    ) -> Result<CommitOutcome, EditError> {
        let (ctx, session) = self.split();
        session.direct_commit(ctx, row_id, column_key, value)
    }

    /// Routes a value to the right commit path for its column: inline
    /// editors save directly, everything else goes through the session. A
    /// rejected value leaves the session open on that cell.
    pub fn set_cell(
        &mut self,
        row_id: &str,
        column_key: &str,
        value: CellValue,
    ) -> Result<CommitOutcome, EditError> {
        let inline = self
            .columns
            .get(column_key)
            .is_some_and(|column| column.kind.opens_inline());
        if inline {
            return self.direct_commit(row_id, column_key, value);
        }
        if !self.begin_edit(row_id, column_key) {
            let key = CellKey::new(row_id, column_key);
            return Err(if self.columns.is_editable(column_key) {
                EditError::UnknownRow(row_id.to_string())
            } else {
                EditError::NotEditable(key)
            });
        }
        self.commit(Some(value))
    }

    pub fn is_cell_dirty(&self, row_id: &str, column_key: &str) -> bool {
        self.session
            .is_cell_dirty(&self.cache, &self.baselines, row_id, column_key)
    }

    pub fn cell_error(&self, row_id: &str, column_key: &str) -> Option<&ValidationError> {
        self.session.error(&CellKey::new(row_id, column_key))
    }

    pub fn dirty_changes(&self) -> Vec<DirtyChange> {
        self.baselines.collect_dirty(self.cache.rows())
    }

    pub fn has_changes(&self) -> bool {
        !self.dirty_changes().is_empty()
    }

    /// Writes every baseline back into the cache and forgets the change set.
    pub fn revert_all(&mut self) -> usize {
        if self.session.active().is_some() {
            let _ = self.session.cancel(&self.cache, &mut self.baselines);
        }
        let restores: Vec<(String, String, CellValue)> = self
            .baselines
            .entries()
            .filter_map(|(key, value)| {
                let (row_id, column_key) = key.decode()?;
                Some((row_id.to_string(), column_key.to_string(), value.clone()))
            })
            .collect();

        let mut reverted = 0;
        for (row_id, column_key, value) in restores {
            if self
                .cache
                .write_cell(MutationOrigin::UserEdit, &row_id, &column_key, value)
            {
                reverted += 1;
            }
        }
        self.baselines.clear_all();
        debug!(reverted, "reverted all changes");
        reverted
    }

    /// Collects the dirty set and applies it optimistically.
    pub fn begin_save(&mut self) -> Result<PendingBatch, SaveError> {
        let changes = self.dirty_changes();
        self.saver.begin(&mut self.cache, changes)
    }

    /// Settles a batch; on success the listener sees every saved change, on
    /// failure the reporter gets the batch that was rolled back.
    pub fn finish_save(
        &mut self,
        pending: PendingBatch,
        result: Result<(), ServiceError>,
    ) -> Result<usize, SaveError> {
        let failed = result
            .as_ref()
            .err()
            .map(|err| (pending.changes().to_vec(), err.clone()));

        let saved = match self.saver.finish(
            &mut self.cache,
            &mut self.baselines,
            &self.session,
            pending,
            result,
        ) {
            Ok(saved) => saved,
            Err(err) => {
                // Only a batch that was actually in flight is reported.
                if let (SaveError::RolledBack { .. }, Some((changes, source))) = (&err, &failed) {
                    self.reporter.report(FailureContext::Save { changes }, source);
                }
                return Err(err);
            }
        };

        if let Some(listener) = &self.listener {
            for change in &saved {
                if let Err(err) = listener.on_change(change) {
                    warn!(key = %change.cell_key(), error = %err, "change listener failed");
                }
            }
        }
        Ok(saved.len())
    }

    /// Saves the current dirty set through `service` in one batch.
    pub fn save_all(&mut self, service: &dyn DataService) -> Result<usize, SaveError> {
        let pending = self.begin_save()?;
        let result = service.save_batch(pending.changes());
        self.finish_save(pending, result)
    }

    pub fn begin_fetch(&mut self) -> Option<PageQuery> {
        self.loader.begin_fetch(&self.cache)
    }

    pub fn finish_fetch(
        &mut self,
        query: PageQuery,
        result: Result<Page, ServiceError>,
    ) -> Result<usize, ServiceError> {
        if let Err(err) = &result {
            self.reporter.report(FailureContext::Load { query }, err);
        }
        self.loader.finish_fetch(&mut self.cache, query, result)
    }

    /// Fetches the next page, if one may be fetched. Returns the number of
    /// rows added.
    pub fn load_more(&mut self, service: &dyn DataService) -> Result<usize, ServiceError> {
        let Some(query) = self.begin_fetch() else {
            return Ok(0);
        };
        let result = service.fetch_page(query);
        let added = self.finish_fetch(query, result)?;
        info!(page = query.page, added, "loaded page");
        Ok(added)
    }

    fn split(&mut self) -> (EditContext<'_>, &mut EditSession) {
        (
            EditContext {
                columns: &self.columns,
                cache: &mut self.cache,
                baselines: &mut self.baselines,
            },
            &mut self.session,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::column::{ColumnDefinition, ColumnType};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn columns() -> ColumnSet {
        ColumnSet::new(vec![
            ColumnDefinition::new("id", "ID", ColumnType::String).read_only(),
            ColumnDefinition::new("count", "Count", ColumnType::Number),
            ColumnDefinition::new("tags", "Tags", ColumnType::Array),
        ])
        .unwrap()
    }

    fn rows() -> Vec<Row> {
        vec![
            Row::new("1").with("count", 5_i64),
            Row::new("2").with("count", 7_i64),
        ]
    }

    struct RejectingService;

    impl DataService for RejectingService {
        fn fetch_page(&self, _query: PageQuery) -> Result<Page, ServiceError> {
            Err(ServiceError::Transport("offline".into()))
        }

        fn save_batch(&self, _changes: &[DirtyChange]) -> Result<(), ServiceError> {
            Err(ServiceError::Transport("offline".into()))
        }
    }

    #[derive(Clone, Default)]
    struct Reports(Rc<RefCell<Vec<(&'static str, usize)>>>);

    impl ErrorReporter for Reports {
        fn report(&self, context: FailureContext<'_>, _error: &ServiceError) {
            let count = match context {
                FailureContext::Save { changes } => changes.len(),
                FailureContext::Load { .. } => 0,
            };
            self.0.borrow_mut().push((context.operation(), count));
        }
    }

    #[test]
    fn set_cell_routes_by_column_type() {
        let mut editor = TableEditor::new(columns(), EditorConfig::default(), rows());
        editor
            .set_cell("1", "tags", CellValue::tags(["x"]))
            .unwrap();
        editor.set_cell("1", "count", CellValue::text("6")).unwrap();
        assert!(editor.session().active().is_none());
        assert_eq!(editor.dirty_changes().len(), 2);

        let err = editor.set_cell("2", "count", CellValue::text("abc")).unwrap_err();
        assert!(matches!(err, EditError::Rejected { .. }));
        assert!(editor.session().is_editing(&CellKey::new("2", "count")));
        assert_eq!(editor.cell_error("2", "count"), Some(&ValidationError::NotANumber));

        assert_eq!(
            editor.set_cell("1", "id", CellValue::text("x")),
            Err(EditError::NotEditable(CellKey::new("1", "id")))
        );
        assert_eq!(
            editor.set_cell("9", "count", CellValue::Number(1.0)),
            Err(EditError::UnknownRow("9".into()))
        );
    }

    #[test]
    fn failed_save_is_reported_and_rolled_back() {
        let reports = Reports::default();
        let mut editor = TableEditor::new(columns(), EditorConfig::default(), rows())
            .with_reporter(reports.clone());
        editor.set_cell("1", "count", CellValue::Number(10.0)).unwrap();

        let err = editor.save_all(&RejectingService).unwrap_err();
        assert!(matches!(err, SaveError::RolledBack { changes: 1, .. }));
        assert_eq!(reports.0.borrow().as_slice(), &[("save_batch", 1)]);
        assert!(editor.has_changes());
    }

    #[test]
    fn foreign_batches_are_not_reported() {
        let reports = Reports::default();
        let mut owner = TableEditor::new(columns(), EditorConfig::default(), rows());
        let mut other = TableEditor::new(columns(), EditorConfig::default(), rows())
            .with_reporter(reports.clone());
        owner.set_cell("1", "count", CellValue::Number(10.0)).unwrap();
        let pending = owner.begin_save().unwrap();

        let result = other.finish_save(pending, Err(ServiceError::Transport("offline".into())));
        assert_eq!(result, Err(SaveError::UnknownBatch(0)));
        assert!(reports.0.borrow().is_empty());
        assert_eq!(other.row("1").unwrap().value_or_null("count"), CellValue::Number(5.0));
    }

    #[test]
    fn failed_fetch_is_reported() {
        let reports = Reports::default();
        let mut editor = TableEditor::new(columns(), EditorConfig::default(), Vec::new())
            .with_reporter(reports.clone());

        assert!(editor.load_more(&RejectingService).is_err());
        assert_eq!(reports.0.borrow().as_slice(), &[("fetch_page", 0)]);
        assert!(editor.has_more());
        assert!(!editor.is_loading());
    }

    #[test]
    fn listener_failures_do_not_undo_save() {
        struct AcceptingService;
        impl DataService for AcceptingService {
            fn fetch_page(&self, query: PageQuery) -> Result<Page, ServiceError> {
                Ok(Page::slice(&[], query))
            }
            fn save_batch(&self, _changes: &[DirtyChange]) -> Result<(), ServiceError> {
                Ok(())
            }
        }

        let mut editor = TableEditor::new(columns(), EditorConfig::default(), rows())
            .with_listener(|_change: &DirtyChange| -> anyhow::Result<()> {
                anyhow::bail!("listener down")
            });
        editor.set_cell("1", "count", CellValue::Number(10.0)).unwrap();
        assert_eq!(editor.save_all(&AcceptingService), Ok(1));
        assert!(!editor.has_changes());
        assert!(editor.baselines().is_empty());
    }

    #[test]
    fn revert_all_restores_baselines() {
        let mut editor = TableEditor::new(
            columns(),
            EditorConfig {
                page_size: 1,
                lazy_loading: false,
            },
            rows(),
        );
        editor.set_cell("1", "count", CellValue::Number(10.0)).unwrap();
        editor.set_cell("2", "count", CellValue::Number(70.0)).unwrap();
        editor.begin_edit("1", "count");

        assert_eq!(editor.revert_all(), 2);
        assert!(editor.baselines().is_empty());
        assert!(editor.session().active().is_none());
        assert_eq!(editor.row("1").unwrap().value_or_null("count"), CellValue::Number(5.0));
        assert_eq!(editor.row("2").unwrap().value_or_null("count"), CellValue::Number(7.0));
    }
}
