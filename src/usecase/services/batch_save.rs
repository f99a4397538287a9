//! Optimistic batch save with snapshot rollback.
//!
//! Saving is split in two halves so the caller can run the service call
//! wherever it likes: `begin` snapshots and applies the batch to the cache,
//! `finish` either settles the baselines or rolls the cache back.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::domain::baseline::BaselineTracker;
use crate::domain::cache::{CacheSnapshot, MutationOrigin, TableCache};
use crate::domain::entities::cell::{values_equal, CellValue};
use crate::domain::entities::edit::DirtyChange;
use crate::domain::session::EditSession;
use crate::error::{SaveError, ServiceError};

/// A batch that has been applied optimistically and waits for the service.
#[derive(Debug)]
pub struct PendingBatch {
    id: u64,
    changes: Vec<DirtyChange>,
}

impl PendingBatch {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn changes(&self) -> &[DirtyChange] {
        &self.changes
    }
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    snapshot: CacheSnapshot,
}

#[derive(Debug, Default)]
pub struct BatchSaveCoordinator {
    next_id: u64,
    in_flight: Option<InFlight>,
}

impl BatchSaveCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Snapshots the cache, then writes every change into it.
    pub fn begin(
        &mut self,
        cache: &mut TableCache,
        changes: Vec<DirtyChange>,
    ) -> Result<PendingBatch, SaveError> {
        if changes.is_empty() {
            return Err(SaveError::Empty);
        }
        if self.in_flight.is_some() {
            return Err(SaveError::InFlight);
        }

        let id = self.next_id;
        self.next_id += 1;

        let snapshot = cache.snapshot();
        cache.start_journal();
        apply_optimistic(cache, &changes);
        debug!(batch = id, changes = changes.len(), "applied batch optimistically");

        self.in_flight = Some(InFlight { id, snapshot });
        Ok(PendingBatch { id, changes })
    }

    /// Settles `pending` with the service's answer.
    ///
    /// On success each saved cell either leaves the change set or, when it
    /// was edited again meanwhile, keeps a baseline equal to the saved value.
    /// On failure the cache returns to its pre-batch state with edits made
    /// during the round-trip replayed on top; baselines are left alone so
    /// the batch can be retried.
    pub fn finish(
        &mut self,
        cache: &mut TableCache,
        baselines: &mut BaselineTracker,
        session: &EditSession,
        pending: PendingBatch,
        result: Result<(), ServiceError>,
    ) -> Result<Vec<DirtyChange>, SaveError> {
        match &self.in_flight {
            Some(in_flight) if in_flight.id == pending.id => {}
            _ => return Err(SaveError::UnknownBatch(pending.id)),
        }
        let Some(in_flight) = self.in_flight.take() else {
            return Err(SaveError::UnknownBatch(pending.id));
        };
        let journal = cache.take_journal();

        match result {
            Ok(()) => {
                for change in &pending.changes {
                    let key = change.cell_key();
                    let settled = !session.is_editing(&key)
                        && cache
                            .row(&change.row_id)
                            .and_then(|row| row.get(&change.column_key))
                            .is_some_and(|live| values_equal(live, &change.value));
                    if settled {
                        baselines.remove_key(&key);
                    } else {
                        baselines.rebase(&key, change.value.clone());
                    }
                }
                info!(batch = pending.id, changes = pending.changes.len(), "batch saved");
                Ok(pending.changes)
            }
            Err(source) => {
                let replayed = journal.len();
                cache.restore(in_flight.snapshot);
                cache.replay(journal);
                warn!(batch = pending.id, replayed, error = %source, "batch save rolled back");
                Err(SaveError::RolledBack {
                    changes: pending.changes.len(),
                    source,
                })
            }
        }
    }
}

/// Folds all changes of a row together, later entries winning, and writes
/// them in one pass over the cache.
fn apply_optimistic(cache: &mut TableCache, changes: &[DirtyChange]) {
    let mut by_row: HashMap<&str, Vec<(&str, &CellValue)>> = HashMap::new();
    for change in changes {
        by_row
            .entry(change.row_id.as_str())
            .or_default()
            .push((change.column_key.as_str(), &change.value));
    }

    cache.map_rows(MutationOrigin::Optimistic, |row| {
        if let Some(updates) = by_row.get(row.id.as_str()) {
            for (column_key, value) in updates {
                row.set(column_key, (*value).clone());
            }
        }
    });
}
