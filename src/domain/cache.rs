//! Row cache shared by the editor and the batch save coordinator.
//!
//! Rows live either in one flat list (eager tables) or in the pages they
//! were fetched with (lazy tables). Every mutation is tagged with its
//! origin; while a batch save is in flight, user edits and page loads are
//! journaled so they can be replayed on top of a rollback.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::entities::cell::CellValue;
use crate::domain::entities::dataset::{Page, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOrigin {
    /// A commit from the edit session or a direct commit.
    UserEdit,
    /// A page fetched from the data service.
    PageLoad,
    /// The batch save applying its changes before the service confirms.
    Optimistic,
    /// Re-applying journaled mutations after a rollback.
    Replay,
}

impl MutationOrigin {
    fn is_journaled(self) -> bool {
        matches!(self, MutationOrigin::UserEdit | MutationOrigin::PageLoad)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    CellWrite {
        row_id: String,
        column_key: String,
        value: CellValue,
    },
    PageAppended(Page),
}

/// Pages in fetch order. Concatenating their rows gives every loaded row,
/// each id exactly once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaginatedCache {
    pages: Vec<Page>,
    index: HashMap<String, (usize, usize)>,
}

impl PaginatedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds page 0 from rows that are already in memory.
    pub fn from_initial(rows: &[Row], page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let mut cache = Self::new();
        cache.append_page(Page {
            data: rows.iter().take(page_size).cloned().collect(),
            has_more: rows.len() > page_size,
            total: rows.len() as u64,
        });
        cache
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// True until a page says otherwise; an empty cache can always load.
    pub fn has_more(&self) -> bool {
        self.pages.last().map_or(true, |page| page.has_more)
    }

    pub fn total(&self) -> u64 {
        self.pages.last().map_or(0, |page| page.total)
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.pages.iter().flat_map(|page| page.data.iter())
    }

    pub fn row_count(&self) -> usize {
        self.index.len()
    }

    pub fn row(&self, id: &str) -> Option<&Row> {
        let &(page_idx, row_idx) = self.index.get(id)?;
        self.pages.get(page_idx)?.data.get(row_idx)
    }

    /// Appends `page`, dropping rows whose id an earlier page already holds.
    ///
    /// Returns how many rows were added.
    pub fn append_page(&mut self, mut page: Page) -> usize {
        let page_idx = self.pages.len();
        let before = page.data.len();
        let mut seen = std::collections::HashSet::new();
        page.data.retain(|row| !self.index.contains_key(&row.id) && seen.insert(row.id.clone()));

        let dropped = before - page.data.len();
        if dropped > 0 {
            warn!(page = page_idx, dropped, "dropped rows already present in the cache");
        }

        for (row_idx, row) in page.data.iter().enumerate() {
            self.index.insert(row.id.clone(), (page_idx, row_idx));
        }
        let added = page.data.len();
        self.pages.push(page);
        added
    }

    /// Applies `updater` to every row in place.
    ///
    /// Page boundaries, membership, order and `has_more` never change; every
    /// page's `total` is refreshed from the most recent page.
    pub fn map_rows<F>(&mut self, mut updater: F)
    where
        F: FnMut(&mut Row),
    {
        let total = self.total();
        for page in &mut self.pages {
            for row in &mut page.data {
                updater(row);
            }
            page.total = total;
        }
    }

    pub fn update_row<F>(&mut self, id: &str, updater: F) -> bool
    where
        F: FnOnce(&mut Row),
    {
        let Some(&(page_idx, row_idx)) = self.index.get(id) else {
            return false;
        };
        match self
            .pages
            .get_mut(page_idx)
            .and_then(|page| page.data.get_mut(row_idx))
        {
            Some(row) => {
                updater(row);
                true
            }
            None => false,
        }
    }
}

/// Copy of both representations taken before an optimistic update.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    flat: Vec<Row>,
    paged: Option<PaginatedCache>,
}

#[derive(Debug, Clone, Default)]
pub struct TableCache {
    flat: Vec<Row>,
    paged: Option<PaginatedCache>,
    journal: Option<Vec<JournalEntry>>,
}

impl TableCache {
    pub fn eager(rows: Vec<Row>) -> Self {
        Self {
            flat: rows,
            paged: None,
            journal: None,
        }
    }

    pub fn lazy(pages: PaginatedCache) -> Self {
        Self {
            flat: Vec::new(),
            paged: Some(pages),
            journal: None,
        }
    }

    pub fn is_lazy(&self) -> bool {
        self.paged.is_some()
    }

    pub fn paged(&self) -> Option<&PaginatedCache> {
        self.paged.as_ref()
    }

    /// All loaded rows in display order.
    pub fn rows(&self) -> Box<dyn Iterator<Item = &Row> + '_> {
        match &self.paged {
            Some(paged) => Box::new(paged.rows()),
            None => Box::new(self.flat.iter()),
        }
    }

    pub fn row(&self, id: &str) -> Option<&Row> {
        match &self.paged {
            Some(paged) => paged.row(id),
            None => self.flat.iter().find(|row| row.id == id),
        }
    }

    pub fn row_count(&self) -> usize {
        match &self.paged {
            Some(paged) => paged.row_count(),
            None => self.flat.len(),
        }
    }

    /// Writes one cell into every representation holding the row.
    pub fn write_cell(
        &mut self,
        origin: MutationOrigin,
        row_id: &str,
        column_key: &str,
        value: CellValue,
    ) -> bool {
        let mut written = false;
        if let Some(row) = self.flat.iter_mut().find(|row| row.id == row_id) {
            row.set(column_key, value.clone());
            written = true;
        }
        if let Some(paged) = &mut self.paged {
            written |= paged.update_row(row_id, |row| row.set(column_key, value.clone()));
        }

        if written {
            self.record(origin, || JournalEntry::CellWrite {
                row_id: row_id.to_string(),
                column_key: column_key.to_string(),
                value,
            });
        }
        written
    }

    /// Appends a fetched page, switching the cache to paged mode if needed.
    pub fn append_page(&mut self, origin: MutationOrigin, page: Page) -> usize {
        self.record(origin, || JournalEntry::PageAppended(page.clone()));
        let added = self
            .paged
            .get_or_insert_with(PaginatedCache::new)
            .append_page(page);
        debug!(?origin, added, "appended page");
        added
    }

    pub fn map_rows<F>(&mut self, origin: MutationOrigin, mut updater: F)
    where
        F: FnMut(&mut Row),
    {
        debug!(?origin, "mapping cached rows");
        self.flat.iter_mut().for_each(&mut updater);
        if let Some(paged) = &mut self.paged {
            paged.map_rows(&mut updater);
        }
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            flat: self.flat.clone(),
            paged: self.paged.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        self.flat = snapshot.flat;
        self.paged = snapshot.paged;
    }

    /// Starts recording journaled mutations, discarding any older journal.
    pub fn start_journal(&mut self) {
        self.journal = Some(Vec::new());
    }

    pub fn take_journal(&mut self) -> Vec<JournalEntry> {
        self.journal.take().unwrap_or_default()
    }

    pub fn replay(&mut self, entries: Vec<JournalEntry>) {
        for entry in entries {
            match entry {
                JournalEntry::CellWrite {
                    row_id,
                    column_key,
                    value,
                } => {
                    self.write_cell(MutationOrigin::Replay, &row_id, &column_key, value);
                }
                JournalEntry::PageAppended(page) => {
                    self.append_page(MutationOrigin::Replay, page);
                }
            }
        }
    }

    fn record<F>(&mut self, origin: MutationOrigin, entry: F)
    where
        F: FnOnce() -> JournalEntry,
    {
        if !origin.is_journaled() {
            return;
        }
        if let Some(journal) = &mut self.journal {
            journal.push(entry());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(id: &str, count: i64) -> Row {
        Row::new(id).with("count", count)
    }

    fn two_pages() -> PaginatedCache {
        let mut cache = PaginatedCache::new();
        cache.append_page(Page {
            data: vec![row("1", 1), row("2", 2)],
            has_more: true,
            total: 5,
        });
        cache.append_page(Page {
            data: vec![row("3", 3)],
            has_more: true,
            total: 5,
        });
        cache
    }

    #[test]
    fn map_rows_updates_in_place() {
        let mut cache = two_pages();
        cache.map_rows(|row| {
            if row.id == "2" {
                row.set("count", CellValue::Number(20.0));
            }
        });

        assert_eq!(
            cache.pages()[0].data,
            vec![row("1", 1), row("2", 20)]
        );
        assert_eq!(cache.pages()[1].data, vec![row("3", 3)]);
        assert!(cache.pages().iter().all(|page| page.total == 5 && page.has_more));
    }

    #[test]
    fn map_rows_refreshes_total_from_last_page() {
        let mut cache = PaginatedCache::new();
        cache.append_page(Page {
            data: vec![row("1", 1)],
            has_more: true,
            total: 3,
        });
        cache.append_page(Page {
            data: vec![row("2", 2)],
            has_more: false,
            total: 2,
        });
        cache.map_rows(|_| {});
        assert_eq!(cache.pages()[0].total, 2);
        assert!(cache.pages()[0].has_more);
        assert!(!cache.has_more());
    }

    #[test]
    fn append_drops_duplicate_ids() {
        let mut cache = two_pages();
        let added = cache.append_page(Page {
            data: vec![row("2", 99), row("4", 4), row("4", 5)],
            has_more: false,
            total: 5,
        });

        assert_eq!(added, 1);
        let ids: Vec<&str> = cache.rows().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(cache.row("2"), Some(&row("2", 2)));
        assert_eq!(cache.row("4"), Some(&row("4", 4)));
    }

    #[test]
    fn from_initial_seeds_first_page() {
        let rows: Vec<Row> = (1..=3).map(|idx| row(&idx.to_string(), idx)).collect();
        let cache = PaginatedCache::from_initial(&rows, 2);
        assert_eq!(cache.page_count(), 1);
        assert_eq!(cache.pages()[0].data.len(), 2);
        assert!(cache.has_more());
        assert_eq!(cache.total(), 3);

        let all = PaginatedCache::from_initial(&rows, 10);
        assert!(!all.has_more());
    }

    #[test]
    fn write_cell_reaches_both_representations() {
        let mut cache = TableCache::eager(vec![row("1", 1)]);
        assert!(cache.write_cell(MutationOrigin::UserEdit, "1", "count", CellValue::Number(3.0)));
        assert_eq!(cache.row("1"), Some(&row("1", 3)));
        assert!(!cache.write_cell(MutationOrigin::UserEdit, "9", "count", CellValue::Null));

        let mut lazy = TableCache::lazy(two_pages());
        assert!(lazy.write_cell(MutationOrigin::UserEdit, "3", "count", CellValue::Number(30.0)));
        assert_eq!(lazy.row("3"), Some(&row("3", 30)));
    }

    #[test]
    fn snapshot_restore_round_trips_pages() {
        let mut cache = TableCache::lazy(two_pages());
        let snapshot = cache.snapshot();
        cache.map_rows(MutationOrigin::Optimistic, |row| row.set("count", CellValue::Null));
        cache.restore(snapshot.clone());
        assert_eq!(cache.snapshot(), snapshot);
    }

    #[test]
    fn journal_records_only_user_edits_and_page_loads() {
        let mut cache = TableCache::lazy(two_pages());
        cache.write_cell(MutationOrigin::UserEdit, "1", "count", CellValue::Number(7.0));
        assert!(cache.take_journal().is_empty());

        cache.start_journal();
        cache.map_rows(MutationOrigin::Optimistic, |_| {});
        cache.write_cell(MutationOrigin::UserEdit, "1", "count", CellValue::Number(8.0));
        cache.append_page(
            MutationOrigin::PageLoad,
            Page {
                data: vec![row("4", 4)],
                has_more: false,
                total: 4,
            },
        );

        let journal = cache.take_journal();
        assert_eq!(journal.len(), 2);
        assert!(matches!(journal[0], JournalEntry::CellWrite { .. }));
        assert!(matches!(journal[1], JournalEntry::PageAppended(_)));
    }

    #[test]
    fn replay_reapplies_journal_after_restore() {
        let mut cache = TableCache::lazy(two_pages());
        let snapshot = cache.snapshot();
        cache.start_journal();
        cache.write_cell(MutationOrigin::Optimistic, "1", "count", CellValue::Number(100.0));
        cache.write_cell(MutationOrigin::UserEdit, "3", "count", CellValue::Number(33.0));

        let journal = cache.take_journal();
        cache.restore(snapshot);
        cache.replay(journal);

        assert_eq!(cache.row("1"), Some(&row("1", 1)));
        assert_eq!(cache.row("3"), Some(&row("3", 33)));
    }
}
