//! One modal grid session.
//!
//! A `Session` owns the record store for its lifetime and recomputes the
//! view whenever the query or sort changes:
//!
//! ```text
//! store ids -> query filter -> sort -> column layout -> GridView
//! ```
//!
//! The search index is built once when the session starts and again only
//! after records are deleted. Edits update records in place and are not
//! re-indexed.

use std::collections::BTreeSet;
use std::ops::Range;
use std::time::Instant;

use crate::clipboard::{self, PasteOutcome};
use crate::commit::CommitReport;
use crate::debounce::{Debouncer, Refilter};
use crate::edit::{CellPos, EditKey, EditTracker, EditablePolicy, GridMode};
use crate::error::EngineError;
use crate::handlers::HandlerTable;
use crate::index::SearchIndex;
use crate::query::Query;
use crate::record::{Record, RecordId, RecordStore};
use crate::sort::{SortCriterion, SortState, MAX_SORT_KEYS};
use crate::target::DocumentHost;
use crate::transform::BulkTransform;
use crate::view::{AutoSize, GridView, RowSlice};

/// Column of the synthetic record returned by create-from-search
pub const SEARCH_TEXT_FIELD: &str = "SearchText";

/// Host callback for deleting records. Return false to veto.
pub type DeleteCallback = Box<dyn FnMut(&[Record]) -> bool>;

pub struct SessionOptions {
    pub span_all_screens: bool,
    /// Indices into the loaded records
    pub initial_selection: Vec<usize>,
    pub allow_create_from_search: bool,
    pub on_delete: Option<DeleteCallback>,
    pub editable: EditablePolicy,
    pub debounce: Debouncer,
    pub autosize: AutoSize,
    pub handlers: HandlerTable,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            span_all_screens: false,
            initial_selection: Vec::new(),
            allow_create_from_search: false,
            on_delete: None,
            editable: EditablePolicy::default(),
            debounce: Debouncer::default(),
            autosize: AutoSize::default(),
            handlers: HandlerTable::with_defaults(),
        }
    }
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("span_all_screens", &self.span_all_screens)
            .field("initial_selection", &self.initial_selection)
            .field("allow_create_from_search", &self.allow_create_from_search)
            .field("on_delete", &self.on_delete.is_some())
            .field("editable", &self.editable)
            .field("debounce", &self.debounce)
            .field("autosize", &self.autosize)
            .finish()
    }
}

/// What a session hands back to its host
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Closed without a result
    Cancelled,
    /// Selected rows, in view order
    Selected(Vec<Record>),
    /// Edits were committed; every touched record
    Modified(Vec<Record>),
    /// Confirmed with nothing selected; carries the raw search text
    Created(Record),
}

impl SessionOutcome {
    pub fn records(&self) -> Vec<Record> {
        match self {
            Self::Cancelled => Vec::new(),
            Self::Selected(records) | Self::Modified(records) => records.clone(),
            Self::Created(record) => vec![record.clone()],
        }
    }
}

pub struct Session {
    store: RecordStore,
    columns: Vec<String>,
    index: SearchIndex,
    query_text: String,
    query: Query,
    sort: SortState,
    view: GridView,
    tracker: EditTracker,
    handlers: HandlerTable,
    debouncer: Debouncer,
    autosize: AutoSize,
    span_all_screens: bool,
    allow_create_from_search: bool,
    on_delete: Option<DeleteCallback>,
    /// Normal-mode row selection, by identity
    selected: BTreeSet<RecordId>,
    row_anchor: Option<RecordId>,
}

impl Session {
    /// Start a session over `records`, displaying `columns`
    pub fn new(records: Vec<Record>, columns: Vec<String>, options: SessionOptions) -> Self {
        let store = RecordStore::from_records(records);
        let index = SearchIndex::build(&store, &columns);
        let selected: BTreeSet<RecordId> = options
            .initial_selection
            .iter()
            .filter_map(|&i| store.ids().get(i).copied())
            .collect();
        let row_anchor = selected.iter().next().copied();

        let mut session = Self {
            store,
            query: Query::parse("", &columns),
            columns,
            index,
            query_text: String::new(),
            sort: SortState::new(),
            view: GridView::new(),
            tracker: EditTracker::new(options.editable),
            handlers: options.handlers,
            debouncer: options.debounce,
            autosize: options.autosize,
            span_all_screens: options.span_all_screens,
            allow_create_from_search: options.allow_create_from_search,
            on_delete: options.on_delete,
            selected,
            row_anchor,
        };
        session.refresh();
        log::debug!(
            "session started: {} record(s), {} column(s)",
            session.store.len(),
            session.columns.len()
        );
        session
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn view(&self) -> &GridView {
        &self.view
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    /// Host column list, before directives
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Text typed so far; may be ahead of `query()` while debouncing
    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn sort(&self) -> &SortState {
        &self.sort
    }

    pub fn tracker(&self) -> &EditTracker {
        &self.tracker
    }

    pub fn mode(&self) -> GridMode {
        self.tracker.mode()
    }

    pub fn span_all_screens(&self) -> bool {
        self.span_all_screens
    }

    pub fn is_editable(&self, column: &str) -> bool {
        self.tracker.is_editable(column)
    }

    pub fn fetch(&self, range: Range<usize>) -> Vec<RowSlice> {
        self.view.fetch(&self.store, range)
    }

    pub fn column_width(&self, column: &str) -> Option<usize> {
        self.view.column_width(column)
    }

    pub fn export_rows(&self) -> (Vec<String>, Vec<Vec<String>>) {
        self.view.export_rows(&self.store)
    }

    // ------------------------------------------------------------------
    // Query and sort
    // ------------------------------------------------------------------

    /// Recompute the view from the store
    pub fn refresh(&mut self) {
        let mut ids = self.query.apply(self.store.ids(), &self.index);
        self.sort.sort(&mut ids, &self.store);
        let columns = self.query.directives().apply(&self.columns);
        let (rows, cols) = (ids.len(), columns.len());
        self.view.rebuild(ids, columns);
        self.tracker.on_view_rebuilt(rows, cols);
        if self.view.ensure_column_widths(&self.store, &self.columns, self.autosize) {
            log::debug!("column widths measured over {} row(s)", rows);
        }
        log::debug!("view rebuilt: {} of {} row(s), {} column(s)", rows, self.store.len(), cols);
    }

    /// Apply a query now, bypassing the debounce
    pub fn set_query(&mut self, text: &str) {
        self.debouncer.cancel();
        self.query_text = text.to_string();
        self.query = Query::parse(text, &self.columns);
        self.refresh();
    }

    /// Query text changed by a keystroke. Returns true when the view was
    /// recomputed immediately.
    pub fn type_query(&mut self, text: &str, now: Instant) -> bool {
        self.query_text = text.to_string();
        match self.debouncer.keystroke(self.store.len(), now) {
            Refilter::Immediate => {
                self.query = Query::parse(text, &self.columns);
                self.refresh();
                true
            }
            Refilter::Deferred => false,
        }
    }

    /// Timer tick. Returns true when a deferred re-filter ran.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.debouncer.poll(now) {
            return false;
        }
        self.query = Query::parse(&self.query_text, &self.columns);
        self.refresh();
        true
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Header click: cycle this column's sort, or remove it with shift
    pub fn click_header(&mut self, column: &str, shift: bool) -> bool {
        let changed = self.sort.click(column, shift);
        if changed {
            self.refresh();
        }
        changed
    }

    /// Header click by display position
    pub fn click_header_at(&mut self, col: usize, shift: bool) -> bool {
        match self.view.column(col).map(str::to_string) {
            Some(column) => self.click_header(&column, shift),
            None => false,
        }
    }

    pub fn clear_sort(&mut self) {
        if !self.sort.is_empty() {
            self.sort.clear();
            self.refresh();
        }
    }

    /// Replace the sort keys, primary first. Keys past the third are dropped.
    pub fn set_sort(&mut self, criteria: &[SortCriterion]) {
        self.sort.clear();
        for criterion in criteria.iter().take(MAX_SORT_KEYS).rev() {
            self.sort.push_front(&criterion.column, criterion.direction);
        }
        self.refresh();
    }

    /// Rebuild the search index from current record values
    pub fn reindex(&mut self) {
        self.index = SearchIndex::build(&self.store, &self.columns);
        self.refresh();
    }

    // ------------------------------------------------------------------
    // Normal-mode row selection
    // ------------------------------------------------------------------

    pub fn selected_ids(&self) -> &BTreeSet<RecordId> {
        &self.selected
    }

    pub fn is_row_selected(&self, row: usize) -> bool {
        self.view.record_at(row).is_some_and(|id| self.selected.contains(&id))
    }

    pub fn select_row(&mut self, row: usize) {
        if let Some(id) = self.view.record_at(row) {
            self.selected.clear();
            self.selected.insert(id);
            self.row_anchor = Some(id);
        }
    }

    pub fn toggle_row(&mut self, row: usize) {
        if let Some(id) = self.view.record_at(row) {
            if !self.selected.remove(&id) {
                self.selected.insert(id);
            }
            self.row_anchor = Some(id);
        }
    }

    /// Select the visible rows between the anchor and `row`
    pub fn extend_rows_to(&mut self, row: usize) {
        let Some(target) = self.view.record_at(row) else {
            return;
        };
        let from = self
            .row_anchor
            .and_then(|id| self.view.position_of(id))
            .unwrap_or(row);
        self.selected.clear();
        for r in from.min(row)..=from.max(row) {
            if let Some(id) = self.view.record_at(r) {
                self.selected.insert(id);
            }
        }
        if self.row_anchor.is_none() {
            self.row_anchor = Some(target);
        }
    }

    pub fn select_all_rows(&mut self) {
        self.selected = self.view.rows().iter().copied().collect();
    }

    pub fn clear_row_selection(&mut self) {
        self.selected.clear();
        self.row_anchor = None;
    }

    /// Selected records that are visible, in view order
    pub fn selected_records(&self) -> Vec<Record> {
        self.view
            .rows()
            .iter()
            .filter(|id| self.selected.contains(id))
            .filter_map(|&id| self.store.get(id).cloned())
            .collect()
    }

    // ------------------------------------------------------------------
    // Edit mode
    // ------------------------------------------------------------------

    pub fn toggle_edit_mode(&mut self) -> GridMode {
        if self.tracker.is_editing() {
            self.tracker.exit_edit_mode();
        } else {
            self.tracker.enter_edit_mode();
        }
        self.tracker.mode()
    }

    pub fn cell_selection(&self) -> &crate::edit::CellSelection {
        self.tracker.selection()
    }

    pub fn select_cell(&mut self, pos: CellPos) {
        if self.tracker.is_editing() && pos.row < self.view.row_count() && pos.col < self.view.column_count() {
            self.tracker.selection_mut().set_cursor(pos);
        }
    }

    pub fn toggle_cell(&mut self, pos: CellPos) {
        if self.tracker.is_editing() && pos.row < self.view.row_count() && pos.col < self.view.column_count() {
            self.tracker.selection_mut().toggle(pos);
        }
    }

    pub fn extend_cells_to(&mut self, pos: CellPos) {
        if self.tracker.is_editing() && pos.row < self.view.row_count() && pos.col < self.view.column_count() {
            self.tracker.selection_mut().extend_to(pos);
        }
    }

    /// Arrow-key movement; `extend` is the shift modifier
    pub fn move_cursor(&mut self, drow: isize, dcol: isize, extend: bool) {
        if self.tracker.is_editing() {
            let (rows, cols) = (self.view.row_count(), self.view.column_count());
            self.tracker.selection_mut().move_by(drow, dcol, extend, rows, cols);
        }
    }

    pub fn select_rows_of_selection(&mut self) {
        if self.tracker.is_editing() {
            self.tracker.select_rows_of_selection(&self.view);
        }
    }

    pub fn select_columns_of_selection(&mut self) {
        if self.tracker.is_editing() {
            self.tracker.select_columns_of_selection(&self.view);
        }
    }

    pub fn set_cell(&mut self, pos: CellPos, value: &str) -> Result<EditKey, EngineError> {
        let key = self.tracker.set_cell(&self.view, &mut self.store, pos, value)?;
        self.view.mark_dirty();
        Ok(key)
    }

    pub fn broadcast(&mut self, value: &str) -> Result<usize, EngineError> {
        if !self.tracker.is_editing() {
            return Err(EngineError::NotInEditMode);
        }
        let n = self.tracker.broadcast(&self.view, &mut self.store, value);
        self.view.mark_dirty();
        Ok(n)
    }

    pub fn transform_selected(&mut self, transform: &BulkTransform) -> Result<usize, EngineError> {
        if !self.tracker.is_editing() {
            return Err(EngineError::NotInEditMode);
        }
        let n = self.tracker.transform_selected(&self.view, &mut self.store, transform);
        self.view.mark_dirty();
        Ok(n)
    }

    pub fn paste(&mut self, text: &str) -> Result<PasteOutcome, EngineError> {
        let outcome = clipboard::paste(&mut self.tracker, &self.view, &mut self.store, text)?;
        self.view.mark_dirty();
        Ok(outcome)
    }

    pub fn copy_selection(&self) -> String {
        clipboard::copy_selection(&self.tracker, &self.view, &self.store)
    }

    pub fn edits_applied(&self) -> bool {
        self.tracker.edits_applied()
    }

    /// Apply pending edits through the host. Pending edits are cleared
    /// whatever the outcome.
    pub fn commit(&mut self, host: &mut dyn DocumentHost) -> CommitReport {
        let report = self.tracker.commit(&self.store, host, &self.handlers);
        self.view.mark_dirty();
        report
    }

    // ------------------------------------------------------------------
    // Delete and close
    // ------------------------------------------------------------------

    /// Ask the host to delete the selected rows. Returns the number removed.
    pub fn delete_selected(&mut self) -> Result<usize, EngineError> {
        let Some(callback) = self.on_delete.as_mut() else {
            return Ok(0);
        };
        let ids: Vec<RecordId> = self
            .view
            .rows()
            .iter()
            .copied()
            .filter(|id| self.selected.contains(id))
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let records: Vec<Record> = ids.iter().filter_map(|&id| self.store.get(id).cloned()).collect();
        if !callback(&records) {
            log::debug!("delete of {} record(s) vetoed", records.len());
            return Err(EngineError::DeleteRejected);
        }
        for &id in &ids {
            self.store.remove(id);
        }
        self.tracker.forget(&ids);
        self.clear_row_selection();
        self.index = SearchIndex::build(&self.store, &self.columns);
        self.refresh();
        log::info!("deleted {} record(s)", ids.len());
        Ok(ids.len())
    }

    fn touched_records(&self) -> Vec<Record> {
        self.tracker
            .touched()
            .iter()
            .filter_map(|&id| self.store.get(id).cloned())
            .collect()
    }

    /// Confirm the session (Enter). Uncommitted edits are discarded.
    pub fn confirm(&mut self) -> SessionOutcome {
        self.tracker.discard();
        if self.tracker.edits_applied() {
            return SessionOutcome::Modified(self.touched_records());
        }
        let selected = self.selected_records();
        if !selected.is_empty() {
            return SessionOutcome::Selected(selected);
        }
        let text = self.query_text.trim();
        if self.allow_create_from_search && !text.is_empty() {
            return SessionOutcome::Created(Record::new().with(SEARCH_TEXT_FIELD, text));
        }
        SessionOutcome::Cancelled
    }

    /// Close without confirming. Uncommitted edits are discarded; committed
    /// ones are still reported.
    pub fn cancel(&mut self) -> SessionOutcome {
        self.tracker.discard();
        if self.tracker.edits_applied() {
            SessionOutcome::Modified(self.touched_records())
        } else {
            SessionOutcome::Cancelled
        }
    }

    /// Escape leaves edit mode first; outside edit mode it closes the session
    pub fn escape(&mut self) -> Option<SessionOutcome> {
        if self.tracker.is_editing() {
            self.tracker.exit_edit_mode();
            return None;
        }
        Some(self.cancel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn records() -> Vec<Record> {
        vec![
            Record::new().with("Name", "Wall 1").with("Layer", "A-WALL").with("Length", 10.0),
            Record::new().with("Name", "Door 1").with("Layer", "A-DOOR").with("Length", 3.0),
            Record::new().with("Name", "Wall 2").with("Layer", "A-WALL").with("Length", 25.0),
        ]
    }

    fn columns() -> Vec<String> {
        vec!["Name".into(), "Layer".into(), "Length".into()]
    }

    fn session(options: SessionOptions) -> Session {
        Session::new(records(), columns(), options)
    }

    fn names(s: &Session) -> Vec<String> {
        s.fetch(0..s.view().row_count()).into_iter().map(|r| r.cells[0].clone()).collect()
    }

    #[test]
    fn test_query_filters_and_directives() {
        let mut s = session(SessionOptions::default());
        s.set_query("layer:wall length>5 =name =len");
        assert_eq!(names(&s), vec!["Wall 1", "Wall 2"]);
        assert_eq!(s.view().columns(), &["Name".to_string(), "Length".to_string()]);
        s.set_query("");
        assert_eq!(s.view().row_count(), 3);
        assert_eq!(s.view().column_count(), 3);
    }

    #[test]
    fn test_header_click_sorts() {
        let mut s = session(SessionOptions::default());
        s.click_header("Length", false);
        assert_eq!(names(&s), vec!["Door 1", "Wall 1", "Wall 2"]);
        s.click_header("Length", false);
        assert_eq!(names(&s), vec!["Wall 2", "Wall 1", "Door 1"]);
        s.click_header("Length", true);
        assert_eq!(names(&s), vec!["Wall 1", "Door 1", "Wall 2"]);
    }

    #[test]
    fn test_set_sort_keeps_order_and_cap() {
        use crate::sort::SortDirection;
        let mut s = session(SessionOptions::default());
        let key = |column: &str, direction| SortCriterion {
            column: column.to_string(),
            direction,
        };
        s.set_sort(&[
            key("Layer", SortDirection::Ascending),
            key("Length", SortDirection::Descending),
            key("Name", SortDirection::Ascending),
            key("Handle", SortDirection::Ascending),
        ]);
        let keys: Vec<&str> = s.sort().criteria().iter().map(|c| c.column.as_str()).collect();
        assert_eq!(keys, vec!["Layer", "Length", "Name"]);
        assert_eq!(names(&s), vec!["Door 1", "Wall 2", "Wall 1"]);
    }

    #[test]
    fn test_debounced_typing() {
        let options = SessionOptions {
            debounce: Debouncer::new(1, Duration::from_millis(50)),
            ..SessionOptions::default()
        };
        let mut s = session(options);
        let t0 = Instant::now();
        assert!(!s.type_query("door", t0));
        assert_eq!(s.view().row_count(), 3);
        assert_eq!(s.query_text(), "door");
        assert!(!s.poll(t0 + Duration::from_millis(10)));
        assert!(s.poll(t0 + Duration::from_millis(60)));
        assert_eq!(names(&s), vec!["Door 1"]);
    }

    #[test]
    fn test_initial_selection_and_confirm() {
        let options = SessionOptions {
            initial_selection: vec![2, 0, 7],
            ..SessionOptions::default()
        };
        let mut s = session(options);
        s.click_header("Name", false);
        let SessionOutcome::Selected(rows) = s.confirm() else {
            panic!("expected selection");
        };
        let got: Vec<String> = rows.iter().map(|r| r.text("Name")).collect();
        assert_eq!(got, vec!["Wall 1", "Wall 2"]);
    }

    #[test]
    fn test_row_selection_survives_refilter() {
        let mut s = session(SessionOptions::default());
        s.select_row(1);
        s.set_query("wall");
        assert!(s.selected_records().is_empty());
        s.set_query("");
        assert_eq!(s.selected_records()[0].text("Name"), "Door 1");
        s.extend_rows_to(2);
        assert_eq!(s.selected_ids().len(), 2);
        s.select_all_rows();
        assert_eq!(s.selected_ids().len(), 3);
    }

    #[test]
    fn test_create_from_search() {
        let options = SessionOptions {
            allow_create_from_search: true,
            ..SessionOptions::default()
        };
        let mut s = session(options);
        s.set_query("  New block ");
        assert_eq!(
            s.confirm(),
            SessionOutcome::Created(Record::new().with(SEARCH_TEXT_FIELD, "New block"))
        );
        let mut plain = session(SessionOptions::default());
        plain.set_query("New block");
        assert_eq!(plain.confirm(), SessionOutcome::Cancelled);
    }

    #[test]
    fn test_delete_selected_rebuilds_index() {
        let deleted = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&deleted);
        let options = SessionOptions {
            on_delete: Some(Box::new(move |rows: &[Record]| {
                sink.borrow_mut().extend(rows.iter().map(|r| r.text("Name")));
                true
            })),
            ..SessionOptions::default()
        };
        let mut s = session(options);
        s.set_query("door");
        s.select_row(0);
        assert_eq!(s.delete_selected(), Ok(1));
        assert_eq!(*deleted.borrow(), vec!["Door 1".to_string()]);
        assert_eq!(s.view().row_count(), 0);
        s.set_query("");
        assert_eq!(s.store().len(), 2);
        assert_eq!(s.index().len(), 2);
    }

    #[test]
    fn test_delete_vetoed() {
        let options = SessionOptions {
            on_delete: Some(Box::new(|_: &[Record]| false)),
            ..SessionOptions::default()
        };
        let mut s = session(options);
        s.select_row(0);
        assert_eq!(s.delete_selected(), Err(EngineError::DeleteRejected));
        assert_eq!(s.store().len(), 3);
    }

    #[test]
    fn test_escape_leaves_edit_mode_then_closes() {
        let mut s = session(SessionOptions::default());
        s.toggle_edit_mode();
        s.select_cell(CellPos::new(0, 0));
        s.set_cell(CellPos::new(0, 0), "Changed").unwrap();
        assert_eq!(s.escape(), None);
        assert_eq!(s.mode(), GridMode::Normal);
        assert_eq!(s.escape(), Some(SessionOutcome::Cancelled));
        assert_eq!(s.tracker().pending_len(), 0);
    }

    #[test]
    fn test_widths_measured_on_first_population_only() {
        let mut s = session(SessionOptions::default());
        assert_eq!(s.column_width("Name"), Some(6));
        s.set_query("door");
        assert_eq!(s.column_width("Name"), Some(6));
    }
}
