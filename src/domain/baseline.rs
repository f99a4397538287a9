//! Pre-edit values of every cell in the current change set.
//!
//! An entry exists iff its cell is part of the working change set. Dirty
//! cells are derived from these entries and the live rows on demand and
//! never stored separately.

use std::collections::HashMap;

use crate::domain::entities::cell::{values_equal, CellValue};
use crate::domain::entities::dataset::Row;
use crate::domain::entities::edit::{CellKey, DirtyChange};

#[derive(Debug, Clone)]
struct BaselineEntry {
    value: CellValue,
    seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BaselineTracker {
    entries: HashMap<CellKey, BaselineEntry>,
    next_seq: u64,
}

impl BaselineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a copy of `current` unless the cell already has a baseline.
    ///
    /// Returns `true` when this call created the entry.
    pub fn capture_if_absent(&mut self, row_id: &str, column_key: &str, current: &CellValue) -> bool {
        let key = CellKey::new(row_id, column_key);
        if self.entries.contains_key(&key) {
            return false;
        }
        let seq = self.bump_seq();
        self.entries.insert(
            key,
            BaselineEntry {
                value: current.clone(),
                seq,
            },
        );
        true
    }

    pub fn get(&self, row_id: &str, column_key: &str) -> Option<&CellValue> {
        self.get_key(&CellKey::new(row_id, column_key))
    }

    pub fn get_key(&self, key: &CellKey) -> Option<&CellValue> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, row_id: &str, column_key: &str) -> Option<CellValue> {
        self.remove_key(&CellKey::new(row_id, column_key))
    }

    pub fn remove_key(&mut self, key: &CellKey) -> Option<CellValue> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Replaces the baseline of `key`, keeping its position in the change set.
    pub fn rebase(&mut self, key: &CellKey, value: CellValue) {
        match self.entries.get_mut(key) {
            Some(entry) => entry.value = value,
            None => {
                let seq = self.bump_seq();
                self.entries.insert(key.clone(), BaselineEntry { value, seq });
            }
        }
    }

    /// A cell without a baseline is never changed.
    pub fn is_changed(&self, row_id: &str, column_key: &str, current: &CellValue) -> bool {
        self.is_key_changed(&CellKey::new(row_id, column_key), current)
    }

    pub fn is_key_changed(&self, key: &CellKey, current: &CellValue) -> bool {
        self.get_key(key)
            .is_some_and(|baseline| !values_equal(current, baseline))
    }

    /// Rebuilds the dirty set against `rows`.
    ///
    /// Entries whose row or column is gone are skipped. Changes come out in
    /// the order their baselines were captured, not in row order.
    pub fn collect_dirty<'r, I>(&self, rows: I) -> Vec<DirtyChange>
    where
        I: IntoIterator<Item = &'r Row>,
    {
        let by_id: HashMap<&str, &Row> = rows.into_iter().map(|row| (row.id.as_str(), row)).collect();

        let mut ordered: Vec<(&CellKey, &BaselineEntry)> = self.entries.iter().collect();
        ordered.sort_by_key(|(_, entry)| entry.seq);

        ordered
            .into_iter()
            .filter_map(|(key, entry)| {
                let (row_id, column_key) = key.decode()?;
                let row = by_id.get(row_id)?;
                let current = row.get(column_key)?;
                (!values_equal(current, &entry.value))
                    .then(|| DirtyChange::new(row_id, column_key, current.clone()))
            })
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&CellKey, &CellValue)> {
        self.entries.iter().map(|(key, entry)| (key, &entry.value))
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Row> {
        vec![
            Row::new("1").with("count", 5_i64).with("name", "bolt"),
            Row::new("2").with("count", 7_i64),
        ]
    }

    #[test]
    fn capture_is_once_per_cycle() {
        let mut baselines = BaselineTracker::new();
        assert!(baselines.capture_if_absent("1", "count", &CellValue::Number(5.0)));
        assert!(!baselines.capture_if_absent("1", "count", &CellValue::Number(10.0)));
        assert_eq!(baselines.get("1", "count"), Some(&CellValue::Number(5.0)));
    }

    #[test]
    fn cells_without_baseline_are_not_changed() {
        let baselines = BaselineTracker::new();
        assert!(!baselines.is_changed("1", "count", &CellValue::Number(99.0)));
    }

    #[test]
    fn is_changed_uses_deep_equality() {
        let mut baselines = BaselineTracker::new();
        baselines.capture_if_absent("1", "count", &CellValue::Number(0.0));
        assert!(!baselines.is_changed("1", "count", &CellValue::Number(-0.0)));
        assert!(baselines.is_changed("1", "count", &CellValue::Number(1.0)));
    }

    #[test]
    fn collect_dirty_skips_unchanged_and_missing() {
        let mut data = rows();
        let mut baselines = BaselineTracker::new();
        baselines.capture_if_absent("2", "count", &CellValue::Number(7.0));
        baselines.capture_if_absent("1", "count", &CellValue::Number(5.0));
        baselines.capture_if_absent("1", "name", &CellValue::text("bolt"));
        baselines.capture_if_absent("9", "count", &CellValue::Number(1.0));
        baselines.capture_if_absent("1", "gone", &CellValue::Null);

        data[0].set("count", CellValue::Number(10.0));
        data[1].set("count", CellValue::Number(8.0));

        let dirty = baselines.collect_dirty(&data);
        assert_eq!(
            dirty,
            vec![
                DirtyChange::new("2", "count", CellValue::Number(8.0)),
                DirtyChange::new("1", "count", CellValue::Number(10.0)),
            ]
        );
    }

    #[test]
    fn rebase_keeps_capture_order() {
        let mut data = rows();
        let mut baselines = BaselineTracker::new();
        baselines.capture_if_absent("1", "count", &CellValue::Number(5.0));
        baselines.capture_if_absent("2", "count", &CellValue::Number(7.0));
        baselines.rebase(&CellKey::new("1", "count"), CellValue::Number(6.0));

        data[0].set("count", CellValue::Number(10.0));
        data[1].set("count", CellValue::Number(11.0));

        let keys: Vec<String> = baselines
            .collect_dirty(&data)
            .into_iter()
            .map(|change| change.row_id)
            .collect();
        assert_eq!(keys, vec!["1", "2"]);
        assert_eq!(baselines.get("1", "count"), Some(&CellValue::Number(6.0)));
    }

    #[test]
    fn remove_and_clear() {
        let mut baselines = BaselineTracker::new();
        baselines.capture_if_absent("1", "count", &CellValue::Number(5.0));
        baselines.capture_if_absent("2", "count", &CellValue::Number(7.0));

        assert_eq!(baselines.remove("1", "count"), Some(CellValue::Number(5.0)));
        assert_eq!(baselines.len(), 1);

        baselines.clear_all();
        assert!(baselines.is_empty());
    }
}
