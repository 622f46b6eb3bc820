//! Edit mode and pending cell edits.
//!
//! Two modes: Normal (row selection, read-only) and Edit (cell selection,
//! mutation allowed). Pending edits are keyed by (record id, column), never
//! by view row: the view can be re-filtered or re-sorted between keystrokes
//! and an edit must stay attached to the record it was made on.
//!
//! Editing a cell writes the new value into the record immediately so every
//! view sees it; the host objects are only touched by `commit`.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashSet;

use crate::commit::{self, CommitReport};
use crate::error::EngineError;
use crate::handlers::HandlerTable;
use crate::record::{RecordId, RecordStore};
use crate::target::DocumentHost;
use crate::transform::BulkTransform;
use crate::value::Value;
use crate::view::GridView;

/// Column family for dynamic block attributes (`attr:TAG`)
pub const ATTRIBUTE_PREFIX: &str = "attr:";

/// Columns users may edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditablePolicy {
    /// Lowercase exact names
    columns: FxHashSet<String>,
    /// Lowercase prefixes
    prefixes: Vec<String>,
}

impl Default for EditablePolicy {
    fn default() -> Self {
        Self::new(
            [
                "Name", "Layer", "Color", "Linetype", "Rotation", "CenterX", "CenterY", "Radius", "Contents",
                "Height", "Scale", "Description",
            ],
            [ATTRIBUTE_PREFIX],
        )
    }
}

impl EditablePolicy {
    pub fn new<C, P>(columns: C, prefixes: P) -> Self
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        Self {
            columns: columns.into_iter().map(|c| c.as_ref().to_lowercase()).collect(),
            prefixes: prefixes.into_iter().map(|p| p.as_ref().to_lowercase()).collect(),
        }
    }

    /// Nothing editable
    pub fn none() -> Self {
        Self {
            columns: FxHashSet::default(),
            prefixes: Vec::new(),
        }
    }

    pub fn is_editable(&self, column: &str) -> bool {
        let lower = column.to_lowercase();
        self.columns.contains(&lower) || self.prefixes.iter().any(|p| lower.starts_with(p.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GridMode {
    /// Row selection, read-only
    #[default]
    Normal,
    /// Cell selection, edits allowed
    Edit,
}

/// Cell position in view coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

impl CellPos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Edit-mode cell selection (cursor, anchor, multi-cell set)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellSelection {
    cursor: Option<CellPos>,
    anchor: Option<CellPos>,
    cells: BTreeSet<CellPos>,
}

impl CellSelection {
    pub fn cursor(&self) -> Option<CellPos> {
        self.cursor
    }

    pub fn anchor(&self) -> Option<CellPos> {
        self.anchor
    }

    /// Selected cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = CellPos> + '_ {
        self.cells.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, pos: CellPos) -> bool {
        self.cells.contains(&pos)
    }

    /// Top-left of the selection, or the cursor when nothing is selected
    pub fn top_left(&self) -> Option<CellPos> {
        if self.cells.is_empty() {
            return self.cursor;
        }
        let row = self.cells.iter().map(|c| c.row).min()?;
        let col = self.cells.iter().map(|c| c.col).min()?;
        Some(CellPos::new(row, col))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Single-cell selection at `pos`
    pub fn set_cursor(&mut self, pos: CellPos) {
        self.cursor = Some(pos);
        self.anchor = Some(pos);
        self.cells.clear();
        self.cells.insert(pos);
    }

    /// Add or remove one cell, keeping the anchor
    pub fn toggle(&mut self, pos: CellPos) {
        if !self.cells.remove(&pos) {
            self.cells.insert(pos);
        }
        self.cursor = Some(pos);
        if self.anchor.is_none() {
            self.anchor = Some(pos);
        }
    }

    /// Select the rectangle between the anchor and `pos`
    pub fn extend_to(&mut self, pos: CellPos) {
        let anchor = self.anchor.unwrap_or(pos);
        self.cells.clear();
        for row in anchor.row.min(pos.row)..=anchor.row.max(pos.row) {
            for col in anchor.col.min(pos.col)..=anchor.col.max(pos.col) {
                self.cells.insert(CellPos::new(row, col));
            }
        }
        self.anchor = Some(anchor);
        self.cursor = Some(pos);
    }

    /// Move the cursor by a delta, clamped to the view; `extend` grows the
    /// rectangle from the anchor instead of starting a new selection
    pub fn move_by(&mut self, drow: isize, dcol: isize, extend: bool, rows: usize, cols: usize) {
        if rows == 0 || cols == 0 {
            return;
        }
        let from = self.cursor.unwrap_or(CellPos::new(0, 0));
        let row = from.row.saturating_add_signed(drow).min(rows - 1);
        let col = from.col.saturating_add_signed(dcol).min(cols - 1);
        let to = CellPos::new(row, col);
        if extend {
            self.extend_to(to);
        } else {
            self.set_cursor(to);
        }
    }

    /// Keep the cursor inside the new view; multi-selection is dropped
    fn fit_to(&mut self, rows: usize, cols: usize) {
        let cursor = self.cursor;
        self.clear();
        if let Some(c) = cursor {
            if rows > 0 && cols > 0 {
                self.set_cursor(CellPos::new(c.row.min(rows - 1), c.col.min(cols - 1)));
            }
        }
    }
}

/// Identity key of a pending edit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EditKey {
    pub id: RecordId,
    pub column: String,
}

/// Mode, selection, and pending edits for one session
#[derive(Debug, Clone, Default)]
pub struct EditTracker {
    mode: GridMode,
    policy: EditablePolicy,
    selection: CellSelection,
    pending: BTreeMap<EditKey, String>,
    touched: BTreeSet<RecordId>,
    edits_applied: bool,
}

impl EditTracker {
    pub fn new(policy: EditablePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> GridMode {
        self.mode
    }

    pub fn is_editing(&self) -> bool {
        self.mode == GridMode::Edit
    }

    pub fn policy(&self) -> &EditablePolicy {
        &self.policy
    }

    pub fn is_editable(&self, column: &str) -> bool {
        self.policy.is_editable(column)
    }

    /// Normal -> Edit. Returns false if already editing.
    pub fn enter_edit_mode(&mut self) -> bool {
        if self.mode == GridMode::Edit {
            return false;
        }
        self.mode = GridMode::Edit;
        self.selection.clear();
        log::debug!("edit mode on");
        true
    }

    /// Edit -> Normal. Pending edits are kept until commit or close.
    pub fn exit_edit_mode(&mut self) -> bool {
        if self.mode == GridMode::Normal {
            return false;
        }
        self.mode = GridMode::Normal;
        self.selection.clear();
        log::debug!("edit mode off ({} pending)", self.pending.len());
        true
    }

    pub fn selection(&self) -> &CellSelection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut CellSelection {
        &mut self.selection
    }

    /// Called after every view rebuild
    pub fn on_view_rebuilt(&mut self, rows: usize, cols: usize) {
        self.selection.fit_to(rows, cols);
    }

    /// Select every editable cell in the rows of the current selection
    pub fn select_rows_of_selection(&mut self, view: &GridView) {
        let rows: BTreeSet<usize> = self.selection.cells().map(|c| c.row).collect();
        for row in rows {
            for (col, name) in view.columns().iter().enumerate() {
                if self.policy.is_editable(name) {
                    self.selection.cells.insert(CellPos::new(row, col));
                }
            }
        }
    }

    /// Select every row of the columns in the current selection
    pub fn select_columns_of_selection(&mut self, view: &GridView) {
        let cols: BTreeSet<usize> = self
            .selection
            .cells()
            .map(|c| c.col)
            .filter(|&c| view.column(c).is_some_and(|name| self.policy.is_editable(name)))
            .collect();
        for col in cols {
            for row in 0..view.row_count() {
                self.selection.cells.insert(CellPos::new(row, col));
            }
        }
    }

    /// Edit the cell at a view position
    pub fn set_cell(
        &mut self,
        view: &GridView,
        store: &mut RecordStore,
        pos: CellPos,
        value: &str,
    ) -> Result<EditKey, EngineError> {
        if self.mode != GridMode::Edit {
            return Err(EngineError::NotInEditMode);
        }
        let column = view.column(pos.col).ok_or(EngineError::ColumnOutOfRange {
            col: pos.col,
            count: view.column_count(),
        })?;
        let id = view.record_at(pos.row).ok_or(EngineError::RowOutOfRange {
            row: pos.row,
            count: view.row_count(),
        })?;
        self.set_value(store, id, column, value)
    }

    /// Edit a cell by record identity
    pub fn set_value(
        &mut self,
        store: &mut RecordStore,
        id: RecordId,
        column: &str,
        value: &str,
    ) -> Result<EditKey, EngineError> {
        if self.mode != GridMode::Edit {
            return Err(EngineError::NotInEditMode);
        }
        if !self.policy.is_editable(column) {
            return Err(EngineError::ReadOnlyColumn(column.to_string()));
        }
        let record = store.get_mut(id).ok_or(EngineError::UnknownRecord(id))?;
        let next = Value::parse_like(record.get(column), value);
        record.set(column, next);

        let key = EditKey {
            id,
            column: column.to_string(),
        };
        self.pending.insert(key.clone(), value.to_string());
        self.touched.insert(id);
        Ok(key)
    }

    /// Write one value into every selected editable cell
    pub fn broadcast(&mut self, view: &GridView, store: &mut RecordStore, value: &str) -> usize {
        let cells: Vec<CellPos> = self.selection.cells().collect();
        cells
            .into_iter()
            .filter(|pos| self.set_cell(view, store, *pos, value).is_ok())
            .count()
    }

    /// Transform each selected editable cell; cells the transform leaves
    /// unchanged produce no edit
    pub fn transform_selected(&mut self, view: &GridView, store: &mut RecordStore, transform: &BulkTransform) -> usize {
        let cells: Vec<CellPos> = self.selection.cells().collect();
        let mut changed = 0;
        for pos in cells {
            let (Some(id), Some(column)) = (view.record_at(pos.row), view.column(pos.col)) else {
                continue;
            };
            if !self.policy.is_editable(column) {
                continue;
            }
            let Some(record) = store.get(id) else { continue };
            let current = record.text(column);
            let next = transform.apply(&current, record);
            if next == current {
                continue;
            }
            if self.set_value(store, id, column, &next).is_ok() {
                changed += 1;
            }
        }
        changed
    }

    pub fn pending(&self) -> &BTreeMap<EditKey, String> {
        &self.pending
    }

    pub fn pending_value(&self, id: RecordId, column: &str) -> Option<&str> {
        self.pending
            .get(&EditKey {
                id,
                column: column.to_string(),
            })
            .map(String::as_str)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Records edited this session, in id order
    pub fn touched(&self) -> &BTreeSet<RecordId> {
        &self.touched
    }

    /// True once any commit applied at least one edit
    pub fn edits_applied(&self) -> bool {
        self.edits_applied
    }

    /// Drop pending edits and touched state for removed records
    pub fn forget(&mut self, ids: &[RecordId]) {
        self.pending.retain(|key, _| !ids.contains(&key.id));
        self.touched.retain(|id| !ids.contains(id));
    }

    /// Drop pending edits without applying them
    pub fn discard(&mut self) {
        if !self.pending.is_empty() {
            log::info!("discarding {} pending edit(s)", self.pending.len());
        }
        self.pending.clear();
    }

    /// Apply all pending edits through the host. The pending set is empty
    /// afterwards whatever the outcome.
    pub fn commit(
        &mut self,
        store: &RecordStore,
        host: &mut dyn DocumentHost,
        handlers: &HandlerTable,
    ) -> CommitReport {
        let pending = std::mem::take(&mut self.pending);
        let report = commit::run(pending, store, host, handlers);
        if report.succeeded > 0 {
            self.edits_applied = true;
        }
        report
    }
}
