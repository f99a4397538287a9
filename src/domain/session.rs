//! Single-cell edit session.
//!
//! At most one cell is open at a time. Its in-progress value lives in the
//! session and only reaches the row cache on commit. Validation errors are
//! kept per cell and survive moving to another cell.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::baseline::BaselineTracker;
use crate::domain::cache::{MutationOrigin, TableCache};
use crate::domain::entities::cell::CellValue;
use crate::domain::entities::column::ColumnSet;
use crate::domain::entities::edit::CellKey;
use crate::domain::validation::{validate_with_warnings, Validated};
use crate::error::{EditError, ValidationError};

/// Borrowed view of the table state an edit operation works on.
pub struct EditContext<'a> {
    pub columns: &'a ColumnSet,
    pub cache: &'a mut TableCache,
    pub baselines: &'a mut BaselineTracker,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEdit {
    pub row_id: String,
    pub column_key: String,
    pub key: CellKey,
    pub temp: CellValue,
    pub dirty: bool,
    /// Whether this session created the cell's baseline entry.
    captured: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum EditState {
    #[default]
    Idle,
    Editing(ActiveEdit),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub key: CellKey,
    pub value: CellValue,
    pub dirty: bool,
    /// Keys repeated in object text; the last occurrence was stored.
    pub duplicate_keys: Vec<String>,
}

#[derive(Debug, Default)]
pub struct EditSession {
    state: EditState,
    errors: HashMap<CellKey, ValidationError>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn active(&self) -> Option<&ActiveEdit> {
        match &self.state {
            EditState::Editing(active) => Some(active),
            EditState::Idle => None,
        }
    }

    pub fn is_editing(&self, key: &CellKey) -> bool {
        self.active().is_some_and(|active| &active.key == key)
    }

    pub fn temp_value(&self) -> Option<&CellValue> {
        self.active().map(|active| &active.temp)
    }

    pub fn error(&self, key: &CellKey) -> Option<&ValidationError> {
        self.errors.get(key)
    }

    pub fn errors(&self) -> &HashMap<CellKey, ValidationError> {
        &self.errors
    }

    /// Opens `row_id`/`column_key` for editing.
    ///
    /// Returns `false` without touching any state when the column is not
    /// editable or the row is not loaded. Opening a different cell abandons
    /// the previous one without committing it.
    pub fn begin_edit(&mut self, ctx: EditContext<'_>, row_id: &str, column_key: &str) -> bool {
        if !ctx.columns.is_editable(column_key) {
            debug!(row_id, column_key, "begin edit ignored: column not editable");
            return false;
        }
        let Some(row) = ctx.cache.row(row_id) else {
            debug!(row_id, column_key, "begin edit ignored: row not loaded");
            return false;
        };

        let key = CellKey::new(row_id, column_key);
        let current = row.value_or_null(column_key);

        let mut reopened = false;
        match std::mem::take(&mut self.state) {
            EditState::Editing(previous) if previous.key == key => reopened = previous.captured,
            EditState::Editing(previous) => abandon(previous, ctx.cache, ctx.baselines),
            EditState::Idle => {}
        }

        let captured = ctx.baselines.capture_if_absent(row_id, column_key, &current) || reopened;
        self.errors.remove(&key);
        let dirty = ctx.baselines.is_key_changed(&key, &current);

        debug!(%key, captured, "begin edit");
        self.state = EditState::Editing(ActiveEdit {
            row_id: row_id.to_string(),
            column_key: column_key.to_string(),
            key,
            temp: current,
            dirty,
            captured,
        });
        true
    }

    /// Replaces the in-progress value and returns the refreshed dirty flag.
    pub fn update_temp(&mut self, baselines: &BaselineTracker, value: CellValue) -> Result<bool, EditError> {
        let EditState::Editing(active) = &mut self.state else {
            return Err(EditError::NotEditing);
        };
        active.dirty = baselines.is_key_changed(&active.key, &value);
        active.temp = value;
        Ok(active.dirty)
    }

    /// Commits `explicit`, or the in-progress value when `None`.
    ///
    /// A rejected value keeps the session open: the temp value is reset to
    /// the baseline and the error is recorded against the cell.
    pub fn commit(
        &mut self,
        ctx: EditContext<'_>,
        explicit: Option<CellValue>,
    ) -> Result<CommitOutcome, EditError> {
        let EditState::Editing(active) = &mut self.state else {
            return Err(EditError::NotEditing);
        };
        let column = ctx
            .columns
            .get(&active.column_key)
            .ok_or_else(|| EditError::NotEditable(active.key.clone()))?;
        let candidate = explicit.unwrap_or_else(|| active.temp.clone());

        let validated = match validate_with_warnings(column, candidate) {
            Ok(validated) => validated,
            Err(source) => {
                if let Some(baseline) = ctx.baselines.get_key(&active.key) {
                    active.temp = baseline.clone();
                }
                active.dirty = false;
                warn!(key = %active.key, error = %source, "commit rejected");
                self.errors.insert(active.key.clone(), source.clone());
                return Err(EditError::Rejected {
                    key: active.key.clone(),
                    source,
                });
            }
        };

        let EditState::Editing(active) = std::mem::take(&mut self.state) else {
            return Err(EditError::NotEditing);
        };
        self.errors.remove(&active.key);
        let Validated {
            value,
            duplicate_keys,
        } = validated;
        warn_duplicates(&active.key, &duplicate_keys);
        let dirty = write_and_prune(ctx, &active.row_id, &active.column_key, &active.key, &value);
        debug!(key = %active.key, dirty, "commit");

        Ok(CommitOutcome {
            key: active.key,
            value,
            dirty,
            duplicate_keys,
        })
    }

    /// Closes the session without writing anything.
    ///
    /// The baseline is dropped when this session captured it or when the
    /// live value already equals it, so an earlier committed change to the
    /// same cell stays dirty.
    pub fn cancel(&mut self, cache: &TableCache, baselines: &mut BaselineTracker) -> Result<CellKey, EditError> {
        let EditState::Editing(active) = std::mem::take(&mut self.state) else {
            return Err(EditError::NotEditing);
        };
        self.errors.remove(&active.key);
        if active.captured || is_untouched(&active, cache, baselines) {
            baselines.remove_key(&active.key);
        }
        debug!(key = %active.key, "cancel edit");
        Ok(active.key)
    }

    /// Validates and writes a value for an inline editor, bypassing the
    /// session. Rejected with `CellBusy` when that cell is currently open.
    pub fn direct_commit(
        &mut self,
        ctx: EditContext<'_>,
        row_id: &str,
        column_key: &str,
        value: CellValue,
    ) -> Result<CommitOutcome, EditError> {
        let key = CellKey::new(row_id, column_key);
        if self.is_editing(&key) {
            return Err(EditError::CellBusy(key));
        }
        let column = match ctx.columns.get(column_key) {
            Some(column) if ctx.columns.is_editable(column_key) => column,
            _ => return Err(EditError::NotEditable(key)),
        };
        let current = ctx
            .cache
            .row(row_id)
            .map(|row| row.value_or_null(column_key))
            .ok_or_else(|| EditError::UnknownRow(row_id.to_string()))?;

        let captured = ctx.baselines.capture_if_absent(row_id, column_key, &current);
        let Validated {
            value,
            duplicate_keys,
        } = match validate_with_warnings(column, value) {
            Ok(validated) => validated,
            Err(source) => {
                if captured {
                    ctx.baselines.remove_key(&key);
                }
                warn!(%key, error = %source, "direct commit rejected");
                self.errors.insert(key.clone(), source.clone());
                return Err(EditError::Rejected { key, source });
            }
        };

        self.errors.remove(&key);
        warn_duplicates(&key, &duplicate_keys);
        let dirty = write_and_prune(ctx, row_id, column_key, &key, &value);
        debug!(%key, dirty, "direct commit");
        Ok(CommitOutcome {
            key,
            value,
            dirty,
            duplicate_keys,
        })
    }

    /// While a cell is open its dirty flag tracks the temp value; any other
    /// cell compares its live value with its baseline.
    pub fn is_cell_dirty(
        &self,
        cache: &TableCache,
        baselines: &BaselineTracker,
        row_id: &str,
        column_key: &str,
    ) -> bool {
        let key = CellKey::new(row_id, column_key);
        if let Some(active) = self.active().filter(|active| active.key == key) {
            return active.dirty;
        }
        cache
            .row(row_id)
            .and_then(|row| row.get(column_key))
            .is_some_and(|current| baselines.is_key_changed(&key, current))
    }
}

fn write_and_prune(
    ctx: EditContext<'_>,
    row_id: &str,
    column_key: &str,
    key: &CellKey,
    value: &CellValue,
) -> bool {
    ctx.cache
        .write_cell(MutationOrigin::UserEdit, row_id, column_key, value.clone());
    let dirty = ctx.baselines.is_key_changed(key, value);
    if !dirty {
        ctx.baselines.remove_key(key);
    }
    dirty
}

fn warn_duplicates(key: &CellKey, duplicate_keys: &[String]) {
    if !duplicate_keys.is_empty() {
        warn!(%key, keys = ?duplicate_keys, "object text repeats keys, last value kept");
    }
}

/// True when the live value of the edited cell equals its baseline, or the
/// row is no longer loaded.
fn is_untouched(edit: &ActiveEdit, cache: &TableCache, baselines: &BaselineTracker) -> bool {
    cache
        .row(&edit.row_id)
        .map(|row| !baselines.is_key_changed(&edit.key, &row.value_or_null(&edit.column_key)))
        .unwrap_or(true)
}

fn abandon(previous: ActiveEdit, cache: &TableCache, baselines: &mut BaselineTracker) {
    if is_untouched(&previous, cache, baselines) {
        baselines.remove_key(&previous.key);
    }
    debug!(key = %previous.key, "abandoned edit");
}
