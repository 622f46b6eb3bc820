//! Lowercase search index.
//!
//! Built once per session (and after structural changes such as deletes) so
//! that filtering on every keystroke never re-lowercases cell text. Edits do
//! not refresh the index; matching against an edited cell can lag until the
//! next rebuild, display always reads the live record.

use rustc_hash::FxHashMap;

use crate::record::{RecordId, RecordStore};

/// Separator between cells in the whole-row text.
/// Not printable, so a substring never spans two cells by accident.
const ROW_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Default)]
struct IndexEntry {
    /// Lowercase display text per indexed column
    cells: Vec<String>,
    /// All cells joined with ROW_SEPARATOR
    row: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    columns: Vec<String>,
    entries: FxHashMap<RecordId, IndexEntry>,
}

impl SearchIndex {
    /// Build for every live record over the given columns
    pub fn build(store: &RecordStore, columns: &[String]) -> Self {
        let mut entries = FxHashMap::default();
        entries.reserve(store.len());
        for (id, record) in store.iter() {
            let cells: Vec<String> = columns
                .iter()
                .map(|c| record.text(c).to_lowercase())
                .collect();
            let mut row = String::new();
            for (i, cell) in cells.iter().enumerate() {
                if i > 0 {
                    row.push(ROW_SEPARATOR);
                }
                row.push_str(cell);
            }
            entries.insert(id, IndexEntry { cells, row });
        }
        log::debug!("search index built: {} records x {} columns", entries.len(), columns.len());
        Self {
            columns: columns.to_vec(),
            entries,
        }
    }

    /// Indexed column names, in index order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Lowercase text of one indexed column
    pub fn cell(&self, id: RecordId, column: usize) -> Option<&str> {
        self.entries
            .get(&id)
            .and_then(|e| e.cells.get(column))
            .map(String::as_str)
    }

    /// Lowercase text of every indexed column
    pub fn cells(&self, id: RecordId) -> &[String] {
        self.entries.get(&id).map(|e| e.cells.as_slice()).unwrap_or(&[])
    }

    /// Concatenated lowercase row text
    pub fn row(&self, id: RecordId) -> &str {
        self.entries.get(&id).map(|e| e.row.as_str()).unwrap_or("")
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
