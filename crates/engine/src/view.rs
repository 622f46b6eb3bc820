//! Grid view: the filtered and sorted window a rendering surface draws from.
//!
//! The view holds record ids only, never copies of records. Surfaces ask for
//! the row count and then for ranges of rows; nothing is materialized for
//! rows outside the requested range.
//!
//! Key invariants:
//! - `rows` is a permutation-subset of the store's live ids
//! - `row_count()` reflects a rebuild immediately
//! - every rebuild or content change bumps `revision`, and a
//!   `ViewportCache` drops its rows as soon as it sees a new revision
//! - column widths are measured once, on first population

use std::collections::BTreeMap;
use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::record::{RecordId, RecordStore};
use crate::value::format_header;

/// One materialized row
#[derive(Debug, Clone, PartialEq)]
pub struct RowSlice {
    /// View row index
    pub row: usize,
    pub id: RecordId,
    /// Display text per displayed column
    pub cells: Vec<String>,
}

/// Limits for one-time column measurement
#[derive(Debug, Clone, Copy)]
pub struct AutoSize {
    /// Rows scanned (0 = all)
    pub scan_rows: usize,
    pub min_width: usize,
    pub max_width: usize,
}

impl Default for AutoSize {
    fn default() -> Self {
        Self {
            scan_rows: 200,
            min_width: 3,
            max_width: 40,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GridView {
    rows: Vec<RecordId>,
    columns: Vec<String>,
    revision: u64,
    /// Measured once per session, keyed by column name
    widths: Option<FxHashMap<String, usize>>,
}

impl GridView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the visible rows and columns
    pub fn rebuild(&mut self, rows: Vec<RecordId>, columns: Vec<String>) {
        self.rows = rows;
        self.columns = columns;
        self.revision += 1;
    }

    /// Content changed in place (cell edit); row set unchanged
    pub fn mark_dirty(&mut self) {
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[RecordId] {
        &self.rows
    }

    /// Displayed column names, in display order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, col: usize) -> Option<&str> {
        self.columns.get(col).map(String::as_str)
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Formatted header text for each displayed column
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| format_header(c)).collect()
    }

    /// Record id at a view row
    pub fn record_at(&self, row: usize) -> Option<RecordId> {
        self.rows.get(row).copied()
    }

    /// View row of a record, if currently visible
    pub fn position_of(&self, id: RecordId) -> Option<usize> {
        self.rows.iter().position(|&r| r == id)
    }

    pub fn cell_text(&self, store: &RecordStore, row: usize, col: usize) -> Option<String> {
        let id = self.record_at(row)?;
        let column = self.columns.get(col)?;
        store.get(id).map(|r| r.text(column))
    }

    /// Materialize only the requested rows; the range is clamped to the view
    pub fn fetch(&self, store: &RecordStore, range: Range<usize>) -> Vec<RowSlice> {
        let end = range.end.min(self.rows.len());
        let start = range.start.min(end);
        (start..end)
            .filter_map(|row| {
                let id = self.rows[row];
                let record = store.get(id)?;
                Some(RowSlice {
                    row,
                    id,
                    cells: self.columns.iter().map(|c| record.text(c)).collect(),
                })
            })
            .collect()
    }

    /// Measure column widths if this is the first population.
    /// Returns true when widths were measured by this call.
    pub fn ensure_column_widths(&mut self, store: &RecordStore, columns: &[String], limits: AutoSize) -> bool {
        if self.widths.is_some() {
            return false;
        }
        let scan = if limits.scan_rows == 0 {
            self.rows.len()
        } else {
            limits.scan_rows.min(self.rows.len())
        };
        let widths = columns
            .iter()
            .map(|column| {
                let header = format_header(column).chars().count();
                let widest = self.rows[..scan]
                    .iter()
                    .filter_map(|&id| store.get(id))
                    .map(|r| r.text(column).chars().count())
                    .max()
                    .unwrap_or(0);
                (column.clone(), header.max(widest).clamp(limits.min_width, limits.max_width))
            })
            .collect();
        self.widths = Some(widths);
        true
    }

    pub fn column_width(&self, column: &str) -> Option<usize> {
        self.widths.as_ref().and_then(|w| w.get(column).copied())
    }

    /// Headers and display text of every visible row, in view order
    pub fn export_rows(&self, store: &RecordStore) -> (Vec<String>, Vec<Vec<String>>) {
        let rows = self
            .fetch(store, 0..self.rows.len())
            .into_iter()
            .map(|slice| slice.cells)
            .collect();
        (self.headers(), rows)
    }
}

/// Row cache kept by a rendering surface between frames.
///
/// Stale entries can never be served: every access first compares the
/// cached revision with the view's.
#[derive(Debug, Clone, Default)]
pub struct ViewportCache {
    revision: Option<u64>,
    rows: BTreeMap<usize, RowSlice>,
}

impl ViewportCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn sync(&mut self, view: &GridView) {
        if self.revision != Some(view.revision()) {
            self.rows.clear();
            self.revision = Some(view.revision());
        }
    }

    /// Rows `start..start+len`, fetching only the ones not cached
    pub fn window(&mut self, view: &GridView, store: &RecordStore, start: usize, len: usize) -> Vec<&RowSlice> {
        self.sync(view);
        let end = start.saturating_add(len).min(view.row_count());
        let missing: Vec<usize> = (start.min(end)..end).filter(|r| !self.rows.contains_key(r)).collect();
        if let (Some(&first), Some(&last)) = (missing.first(), missing.last()) {
            for slice in view.fetch(store, first..last + 1) {
                self.rows.entry(slice.row).or_insert(slice);
            }
        }
        self.rows.range(start.min(end)..end).map(|(_, slice)| slice).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop cached rows far from the current window
    pub fn retain_near(&mut self, start: usize, len: usize) {
        let lo = start.saturating_sub(len);
        let hi = start.saturating_add(len * 2);
        self.rows.retain(|&row, _| row >= lo && row < hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    fn fixture(n: usize) -> (RecordStore, GridView) {
        let store = RecordStore::from_records(
            (0..n)
                .map(|i| Record::new().with("Name", format!("Item {}", i)).with("Layer", "0"))
                .collect(),
        );
        let mut view = GridView::new();
        view.rebuild(store.ids().to_vec(), vec!["Name".into(), "Layer".into()]);
        (store, view)
    }

    #[test]
    fn test_fetch_range_clamped() {
        let (store, view) = fixture(10);
        let rows = view.fetch(&store, 8..20);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 8);
        assert_eq!(rows[0].cells, vec!["Item 8", "0"]);
        assert!(view.fetch(&store, 30..40).is_empty());
    }

    #[test]
    fn test_rebuild_reports_new_count_immediately() {
        let (store, mut view) = fixture(10);
        let mut cache = ViewportCache::new();
        assert_eq!(cache.window(&view, &store, 5, 5).len(), 5);
        view.rebuild(store.ids()[..3].to_vec(), vec!["Name".into()]);
        assert_eq!(view.row_count(), 3);
        assert!(cache.window(&view, &store, 5, 5).is_empty());
        let rows = cache.window(&view, &store, 0, 5);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].cells, vec!["Item 0"]);
    }

    #[test]
    fn test_cache_refreshes_after_edit() {
        let (mut store, mut view) = fixture(3);
        let mut cache = ViewportCache::new();
        cache.window(&view, &store, 0, 3);
        let id = view.record_at(1).unwrap();
        store.get_mut(id).unwrap().set("Name", "Edited".into());
        view.mark_dirty();
        let rows = cache.window(&view, &store, 0, 3);
        assert_eq!(rows[1].cells[0], "Edited");
    }

    #[test]
    fn test_widths_measured_once() {
        let (mut store, mut view) = fixture(3);
        let columns = vec!["Name".to_string(), "Layer".to_string()];
        assert!(view.ensure_column_widths(&store, &columns, AutoSize::default()));
        assert_eq!(view.column_width("Name"), Some(6));
        assert_eq!(view.column_width("Layer"), Some(5));
        let id = view.record_at(0).unwrap();
        store.get_mut(id).unwrap().set("Name", "a much longer name".into());
        assert!(!view.ensure_column_widths(&store, &columns, AutoSize::default()));
        assert_eq!(view.column_width("Name"), Some(6));
    }

    #[test]
    fn test_export_rows_in_view_order() {
        let (store, mut view) = fixture(3);
        let mut ids = store.ids().to_vec();
        ids.reverse();
        view.rebuild(ids, vec!["Name".into()]);
        let (headers, rows) = view.export_rows(&store);
        assert_eq!(headers, vec!["Name"]);
        assert_eq!(rows, vec![vec!["Item 2"], vec!["Item 1"], vec!["Item 0"]]);
    }
}
