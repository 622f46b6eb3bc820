//! Terminal grid for `gsift browse`.
//!
//! The app owns one engine `Session` plus the drawing it was opened from.
//! Keys map onto session operations; the grid is drawn from a
//! `ViewportCache` so only the rows on screen are materialized.

use std::cell::RefCell;
use std::io::stdout;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame, Terminal,
};

use gridsift_cli::util;
use gridsift_engine::edit::{CellPos, GridMode};
use gridsift_engine::sort::SortDirection;
use gridsift_engine::target::MemoryDocuments;
use gridsift_engine::transform::{BulkTransform, FindReplace, ValueOp};
use gridsift_engine::value::format_header;
use gridsift_engine::view::{RowSlice, ViewportCache};
use gridsift_engine::{Record, Session, SessionOptions, SessionOutcome};

const TICK: Duration = Duration::from_millis(100);
const PAGE: usize = 20;
/// Title, query line, header, status
const CHROME_ROWS: u16 = 4;
const GUTTER: usize = 7;
/// Shift+1..9 on a US layout
const SHIFTED_DIGITS: [char; 9] = ['!', '@', '#', '$', '%', '^', '&', '*', '('];

pub struct BrowseOptions {
    pub drawing_path: PathBuf,
    /// Text for Ctrl+V until something is copied inside the grid
    pub paste_text: Option<String>,
    pub export_path: PathBuf,
    pub export_delimiter: u8,
    pub export_headers: bool,
    pub allow_delete: bool,
}

pub struct BrowseResult {
    pub outcome: SessionOutcome,
    /// Session column order, for printing the records
    pub columns: Vec<String>,
    /// Failed edits in the last commit
    pub failed_edits: usize,
    pub saved: bool,
}

enum Prompt {
    Query,
    Cell(String),
    Transform(String),
}

struct BrowseApp {
    session: Session,
    documents: MemoryDocuments,
    options: BrowseOptions,
    /// Filled by the session's delete callback, drained into `documents`
    deleted: Rc<RefCell<Vec<Record>>>,
    cache: ViewportCache,
    cursor_row: usize,
    cursor_col: usize,
    scroll_row: usize,
    scroll_col: usize,
    prompt: Option<Prompt>,
    query_buffer: String,
    clipboard: Option<String>,
    status: String,
    show_help: bool,
    /// Deletions not yet saved
    documents_dirty: bool,
    failed_edits: usize,
    saved: bool,
    outcome: Option<SessionOutcome>,
}

/// Parse the transform prompt: an operation (`+5`, `*2`, `upper`), a
/// find/replace (`old=>new`, `re:pattern=>new`), or a pattern (`* (copy)`)
fn parse_transform(input: &str) -> Option<BulkTransform> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(op) = ValueOp::parse(input) {
        return Some(BulkTransform::new().with_op(op));
    }
    if let Some((find, replace)) = input.split_once("=>") {
        let fr = match find.strip_prefix("re:") {
            Some(pattern) => FindReplace::regex(pattern, replace),
            None => FindReplace::literal(find, replace),
        };
        return Some(BulkTransform::new().with_find_replace(fr));
    }
    Some(BulkTransform::new().with_pattern(input))
}

/// Digit keys sort by visible column; shifted digits remove that column's sort
fn sort_key(c: char, shift: bool) -> Option<(usize, bool)> {
    if let Some(d) = c.to_digit(10).filter(|&d| d >= 1) {
        return Some((d as usize - 1, shift));
    }
    SHIFTED_DIGITS.iter().position(|&s| s == c).map(|i| (i, true))
}

impl BrowseApp {
    fn open(documents: MemoryDocuments, options: BrowseOptions, mut session_options: SessionOptions, query: Option<&str>) -> Self {
        let deleted = Rc::new(RefCell::new(Vec::new()));
        if options.allow_delete {
            let sink = Rc::clone(&deleted);
            session_options.on_delete = Some(Box::new(move |records: &[Record]| {
                sink.borrow_mut().extend_from_slice(records);
                true
            }));
        }

        let table = gridsift_io::drawing::record_table(&documents);
        let mut session = Session::new(table.records, table.columns, session_options);
        if let Some(query) = query {
            session.set_query(query);
        }

        Self {
            query_buffer: session.query_text().to_string(),
            session,
            documents,
            options,
            deleted,
            cache: ViewportCache::new(),
            cursor_row: 0,
            cursor_col: 0,
            scroll_row: 0,
            scroll_col: 0,
            prompt: None,
            clipboard: None,
            status: String::new(),
            show_help: false,
            documents_dirty: false,
            failed_edits: 0,
            saved: false,
            outcome: None,
        }
    }

    fn finish(self) -> BrowseResult {
        BrowseResult {
            outcome: self.outcome.unwrap_or(SessionOutcome::Cancelled),
            columns: self.session.columns().to_vec(),
            failed_edits: self.failed_edits,
            saved: self.saved,
        }
    }

    fn file_name(&self) -> String {
        self.options
            .drawing_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.options.drawing_path.display().to_string())
    }

    fn editing(&self) -> bool {
        self.session.mode() == GridMode::Edit
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.show_help {
            // Any key dismisses help
            self.show_help = false;
            return;
        }
        if self.prompt.is_some() {
            self.handle_prompt_key(key);
            self.sync_cursor();
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        match key.code {
            KeyCode::Char('s') if ctrl => self.commit(),
            KeyCode::Char('v') if ctrl => self.paste(),
            KeyCode::Char('c') if ctrl => self.copy(),
            KeyCode::Char('a') if ctrl => self.select_all(),
            KeyCode::F(2) => self.toggle_edit_mode(),
            KeyCode::Esc => self.escape(),
            KeyCode::Char('?') => self.show_help = true,
            code if self.editing() => self.handle_edit_key(code, shift),
            code => self.handle_normal_key(code, shift),
        }
        self.sync_cursor();
    }

    fn handle_normal_key(&mut self, code: KeyCode, shift: bool) {
        match code {
            KeyCode::Char('q') => self.escape(),
            KeyCode::Char('/') => self.prompt = Some(Prompt::Query),
            KeyCode::Char('e') => self.toggle_edit_mode(),
            KeyCode::Up | KeyCode::Char('k') => self.move_row(-1, shift),
            KeyCode::Down | KeyCode::Char('j') => self.move_row(1, shift),
            KeyCode::PageUp => self.move_row(-(PAGE as isize), shift),
            KeyCode::PageDown => self.move_row(PAGE as isize, shift),
            KeyCode::Home | KeyCode::Char('g') => self.cursor_row = 0,
            KeyCode::End | KeyCode::Char('G') => {
                self.cursor_row = self.session.view().row_count().saturating_sub(1);
            }
            KeyCode::Left | KeyCode::Char('h') => self.cursor_col = self.cursor_col.saturating_sub(1),
            KeyCode::Right | KeyCode::Char('l') => self.cursor_col += 1,
            KeyCode::Char(' ') => self.session.toggle_row(self.cursor_row),
            KeyCode::Enter => self.confirm(),
            KeyCode::Delete => self.delete(),
            KeyCode::Char('x') => self.export(),
            KeyCode::Char('s') => {
                self.session.click_header_at(self.cursor_col, false);
            }
            KeyCode::Char('S') => {
                self.session.click_header_at(self.cursor_col, true);
            }
            KeyCode::Char('0') => self.session.clear_sort(),
            KeyCode::Char(c) => {
                if let Some((idx, remove)) = sort_key(c, shift) {
                    self.session.click_header_at(self.scroll_col + idx, remove);
                }
            }
            _ => {}
        }
    }

    fn handle_edit_key(&mut self, code: KeyCode, shift: bool) {
        match code {
            KeyCode::Up => self.session.move_cursor(-1, 0, shift),
            KeyCode::Down => self.session.move_cursor(1, 0, shift),
            KeyCode::Left => self.session.move_cursor(0, -1, shift),
            KeyCode::Right | KeyCode::Tab => self.session.move_cursor(0, 1, shift),
            KeyCode::BackTab => self.session.move_cursor(0, -1, false),
            KeyCode::PageUp => self.session.move_cursor(-(PAGE as isize), 0, shift),
            KeyCode::PageDown => self.session.move_cursor(PAGE as isize, 0, shift),
            KeyCode::Char(' ') => {
                let pos = CellPos::new(self.cursor_row, self.cursor_col);
                self.session.toggle_cell(pos);
            }
            KeyCode::Enter => self.start_cell_edit(),
            KeyCode::Delete => self.clear_cells(),
            KeyCode::Char('e') => self.toggle_edit_mode(),
            KeyCode::Char('r') => self.session.select_rows_of_selection(),
            KeyCode::Char('c') => self.session.select_columns_of_selection(),
            KeyCode::Char('t') => self.prompt = Some(Prompt::Transform(String::new())),
            KeyCode::Char('x') => self.export(),
            _ => {}
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        let Some(mut prompt) = self.prompt.take() else {
            return;
        };
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let keep = match (&mut prompt, key.code) {
            (Prompt::Query, KeyCode::Enter | KeyCode::Esc | KeyCode::Down) => {
                if self.session.debounce_deadline().is_some() {
                    self.session.set_query(&self.query_buffer);
                }
                false
            }
            (Prompt::Query, KeyCode::Char('u')) if ctrl => {
                self.query_buffer.clear();
                self.session.type_query(&self.query_buffer, Instant::now());
                true
            }
            (Prompt::Query, KeyCode::Char(c)) => {
                self.query_buffer.push(c);
                self.session.type_query(&self.query_buffer, Instant::now());
                true
            }
            (Prompt::Query, KeyCode::Backspace) => {
                self.query_buffer.pop();
                self.session.type_query(&self.query_buffer, Instant::now());
                true
            }
            (Prompt::Cell(_) | Prompt::Transform(_), KeyCode::Esc) => false,
            (Prompt::Cell(buffer), KeyCode::Enter) => {
                let value = std::mem::take(buffer);
                self.apply_cell_edit(&value);
                false
            }
            (Prompt::Transform(buffer), KeyCode::Enter) => {
                let text = std::mem::take(buffer);
                self.apply_transform(&text);
                false
            }
            (Prompt::Cell(buffer) | Prompt::Transform(buffer), KeyCode::Char(c)) => {
                buffer.push(c);
                true
            }
            (Prompt::Cell(buffer) | Prompt::Transform(buffer), KeyCode::Backspace) => {
                buffer.pop();
                true
            }
            _ => true,
        };
        if keep {
            self.prompt = Some(prompt);
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn move_row(&mut self, delta: isize, extend: bool) {
        let rows = self.session.view().row_count();
        if rows == 0 {
            return;
        }
        self.cursor_row = self.cursor_row.saturating_add_signed(delta).min(rows - 1);
        if extend {
            self.session.extend_rows_to(self.cursor_row);
        }
    }

    fn toggle_edit_mode(&mut self) {
        let mode = self.session.toggle_edit_mode();
        if mode == GridMode::Edit && self.session.view().row_count() > 0 {
            self.session.select_cell(CellPos::new(self.cursor_row, self.cursor_col));
        }
        self.status = match mode {
            GridMode::Edit => "edit mode: Enter edits a cell, Ctrl+S commits".to_string(),
            GridMode::Normal => format!("{} pending edit(s)", self.session.tracker().pending_len()),
        };
    }

    fn escape(&mut self) {
        match self.session.escape() {
            Some(outcome) => self.outcome = Some(outcome),
            None => self.status = "edit mode off".to_string(),
        }
    }

    fn confirm(&mut self) {
        if self.session.selected_ids().is_empty() && self.session.view().row_count() > 0 {
            self.session.select_row(self.cursor_row);
        }
        self.outcome = Some(self.session.confirm());
    }

    fn select_all(&mut self) {
        if self.editing() {
            let rows = self.session.view().row_count();
            let cols = self.session.view().column_count();
            if rows > 0 && cols > 0 {
                self.session.select_cell(CellPos::new(0, 0));
                self.session.extend_cells_to(CellPos::new(rows - 1, cols - 1));
            }
        } else {
            self.session.select_all_rows();
        }
    }

    fn start_cell_edit(&mut self) {
        let Some(column) = self.session.view().column(self.cursor_col).map(str::to_string) else {
            return;
        };
        if !self.session.is_editable(&column) {
            self.status = format!("{} is read-only", format_header(&column));
            return;
        }
        let current = self
            .session
            .view()
            .cell_text(self.session.store(), self.cursor_row, self.cursor_col)
            .unwrap_or_default();
        self.prompt = Some(Prompt::Cell(current));
    }

    /// Enter on a multi-cell selection writes the value to every selected cell
    fn apply_cell_edit(&mut self, value: &str) {
        let result = if self.session.cell_selection().len() > 1 {
            self.session.broadcast(value)
        } else {
            self.session
                .set_cell(CellPos::new(self.cursor_row, self.cursor_col), value)
                .map(|_| 1)
        };
        self.status = match result {
            Ok(n) => format!("{} cell(s) edited, {} pending", n, self.session.tracker().pending_len()),
            Err(e) => e.to_string(),
        };
    }

    fn clear_cells(&mut self) {
        self.status = match self.session.broadcast("") {
            Ok(n) => format!("{} cell(s) cleared", n),
            Err(e) => e.to_string(),
        };
    }

    fn apply_transform(&mut self, text: &str) {
        let Some(transform) = parse_transform(text) else {
            return;
        };
        self.status = match self.session.transform_selected(&transform) {
            Ok(n) => format!("{} cell(s) changed", n),
            Err(e) => e.to_string(),
        };
    }

    fn paste(&mut self) {
        let Some(text) = self.clipboard.clone().or_else(|| self.options.paste_text.clone()) else {
            self.status = "nothing to paste (start with --paste FILE or copy with Ctrl+C)".to_string();
            return;
        };
        self.status = match self.session.paste(&text) {
            Ok(outcome) => format!("pasted {} cell(s), {} skipped", outcome.placed, outcome.skipped),
            Err(e) => e.to_string(),
        };
    }

    fn copy(&mut self) {
        let text = self.session.copy_selection();
        if text.is_empty() {
            self.status = "nothing selected".to_string();
            return;
        }
        let cells = self.session.cell_selection().len();
        self.clipboard = Some(text);
        self.status = format!("copied {} cell(s)", cells);
    }

    fn delete(&mut self) {
        match self.session.delete_selected() {
            Ok(0) if !self.options.allow_delete => {
                self.status = "delete is disabled (start with --allow-delete)".to_string();
            }
            Ok(0) => self.status = "no rows selected".to_string(),
            Ok(n) => {
                let removed = self
                    .deleted
                    .borrow_mut()
                    .drain(..)
                    .filter(|record| self.documents.remove_record(record))
                    .count();
                self.documents_dirty = removed > 0;
                self.status = format!("deleted {} record(s); Ctrl+S saves", n);
            }
            Err(e) => self.status = e.to_string(),
        }
    }

    /// Commit pending edits into the drawing and save it
    fn commit(&mut self) {
        let report = self.session.commit(&mut self.documents);
        self.failed_edits = report.failed();
        let mut status = if report.attempted == 0 {
            "nothing to commit".to_string()
        } else {
            report.summary()
        };
        if let Some(first) = report.failures.first() {
            status.push_str(&format!("; {}", first));
        }
        if report.succeeded > 0 || self.documents_dirty {
            match gridsift_io::drawing::save(&self.options.drawing_path, &self.documents) {
                Ok(()) => {
                    self.documents_dirty = false;
                    self.saved = true;
                    status.push_str("; saved");
                }
                Err(e) => status.push_str(&format!("; save failed: {}", e)),
            }
        }
        self.status = status;
    }

    fn export(&mut self) {
        let (headers, rows) = self.session.export_rows();
        let path = &self.options.export_path;
        self.status = match gridsift_io::csv::export(
            path,
            &headers,
            &rows,
            self.options.export_delimiter,
            self.options.export_headers,
        ) {
            Ok(()) => format!("exported {} row(s) to {}", rows.len(), path.display()),
            Err(e) => e.to_string(),
        };
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Follow the edit-mode cell cursor and keep the grid cursor in bounds
    fn sync_cursor(&mut self) {
        if self.editing() {
            if let Some(pos) = self.session.cell_selection().cursor() {
                self.cursor_row = pos.row;
                self.cursor_col = pos.col;
            }
        }
        let view = self.session.view();
        self.cursor_row = self.cursor_row.min(view.row_count().saturating_sub(1));
        self.cursor_col = self.cursor_col.min(view.column_count().saturating_sub(1));
    }

    fn column_widths(&self) -> Vec<usize> {
        let sort = self.session.sort();
        self.session
            .view()
            .columns()
            .iter()
            .map(|c| {
                let measured = self.session.column_width(c).unwrap_or(3);
                let label = util::header_label(&format_header(c), sort_rank(sort.criteria(), c));
                measured.max(util::display_width(&label))
            })
            .collect()
    }

    fn visible_columns(&self, widths: &[usize], start_col: usize, available: usize) -> Vec<usize> {
        let mut cols = Vec::new();
        let mut used = 0usize;
        for (c, &w) in widths.iter().enumerate().skip(start_col) {
            if used + w + 1 > available && !cols.is_empty() {
                break;
            }
            used += w + 1;
            cols.push(c);
        }
        cols
    }

    fn ensure_visible(&mut self, visible_rows: usize, area_width: u16) {
        if self.cursor_row < self.scroll_row {
            self.scroll_row = self.cursor_row;
        }
        if visible_rows > 0 && self.cursor_row >= self.scroll_row + visible_rows {
            self.scroll_row = self.cursor_row - visible_rows + 1;
        }

        let widths = self.column_widths();
        let available = (area_width as usize).saturating_sub(GUTTER + 1);
        if self.cursor_col < self.scroll_col {
            self.scroll_col = self.cursor_col;
        }
        while self.scroll_col < self.cursor_col {
            let cols = self.visible_columns(&widths, self.scroll_col, available);
            if cols.last().is_some_and(|&last| last >= self.cursor_col) {
                break;
            }
            self.scroll_col += 1;
        }
    }

    // ------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(area);

        self.draw_title(frame, chunks[0]);
        self.draw_prompt(frame, chunks[1]);
        self.draw_grid(frame, chunks[2]);
        self.draw_status(frame, chunks[3]);

        if self.show_help {
            self.draw_help(frame, area);
        }
    }

    fn draw_title(&self, frame: &mut Frame, area: Rect) {
        let sort: Vec<String> = self
            .session
            .sort()
            .criteria()
            .iter()
            .map(|c| {
                let arrow = if c.direction == SortDirection::Descending { "v" } else { "^" };
                format!("{}{}", format_header(&c.column), arrow)
            })
            .collect();
        let sort_info = if sort.is_empty() {
            String::new()
        } else {
            format!(" | sort: {}", sort.join(", "))
        };
        let title = format!(
            " gsift: {} | {} of {} records{} ",
            self.file_name(),
            self.session.view().row_count(),
            self.session.store().len(),
            sort_info
        );
        let para = Paragraph::new(Line::from(vec![Span::styled(
            title,
            Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD),
        )]))
        .style(Style::default().bg(Color::Cyan));
        frame.render_widget(para, area);
    }

    fn draw_prompt(&self, frame: &mut Frame, area: Rect) {
        let label_style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
        let line = match &self.prompt {
            Some(Prompt::Query) => Line::from(vec![
                Span::styled(" / ", label_style),
                Span::raw(format!("{}_", self.query_buffer)),
            ]),
            Some(Prompt::Cell(buffer)) => {
                let column = self.session.view().column(self.cursor_col).unwrap_or("");
                Line::from(vec![
                    Span::styled(format!(" {}: ", format_header(column)), label_style),
                    Span::raw(format!("{}_", buffer)),
                ])
            }
            Some(Prompt::Transform(buffer)) => Line::from(vec![
                Span::styled(" transform: ", label_style),
                Span::raw(format!("{}_", buffer)),
                Span::styled("   +5 *2 upper | old=>new | re:pat=>new | * \"Col\"", Style::default().fg(Color::DarkGray)),
            ]),
            None if self.query_buffer.is_empty() => {
                Line::from(Span::styled(" / to search", Style::default().fg(Color::DarkGray)))
            }
            None => Line::from(vec![Span::styled(" / ", label_style), Span::raw(self.query_buffer.clone())]),
        };
        frame.render_widget(Paragraph::new(line), area);
    }

    fn draw_grid(&mut self, frame: &mut Frame, area: Rect) {
        let view = self.session.view();
        if view.row_count() == 0 || view.column_count() == 0 {
            let msg = Paragraph::new("(no matching records)").style(Style::default().fg(Color::DarkGray));
            frame.render_widget(msg, area);
            return;
        }

        let editing = self.editing();
        let mut widths = self.column_widths();
        let available = (area.width as usize).saturating_sub(GUTTER + 1);
        let vis_cols = self.visible_columns(&widths, self.scroll_col, available);
        if self.session.span_all_screens() {
            spread_widths(&mut widths, &vis_cols, available);
        }
        let visible_rows = area.height.saturating_sub(1) as usize;

        let rows: Vec<RowSlice> = self
            .cache
            .window(self.session.view(), self.session.store(), self.scroll_row, visible_rows)
            .into_iter()
            .cloned()
            .collect();
        self.cache.retain_near(self.scroll_row, visible_rows);

        let view = self.session.view();
        let criteria = self.session.sort().criteria();
        let mut header_spans = vec![Span::raw(" ".repeat(GUTTER + 1))];
        for &c in &vis_cols {
            let name = view.column(c).unwrap_or("?");
            let label = util::header_label(&format_header(name), sort_rank(criteria, name));
            let style = if c == self.cursor_col {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if editing && !self.session.is_editable(name) {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
            };
            header_spans.push(Span::styled(format!("{} ", util::pad_right(&label, widths[c])), style));
        }

        let mut lines: Vec<Line> = Vec::with_capacity(rows.len() + 1);
        lines.push(Line::from(header_spans));

        let selection = self.session.cell_selection();
        let tracker = self.session.tracker();
        for slice in &rows {
            let is_cursor_row = slice.row == self.cursor_row;
            let marker = if self.session.is_row_selected(slice.row) { '*' } else { ' ' };
            let gutter_style = if is_cursor_row {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let mut spans = vec![Span::styled(
                format!("{}{:>width$} ", marker, slice.row + 1, width = GUTTER - 1),
                gutter_style,
            )];

            for &c in &vis_cols {
                let value = slice.cells.get(c).map(String::as_str).unwrap_or("");
                let display = util::pad_right(value, widths[c]);
                let pos = CellPos::new(slice.row, c);
                let pending = view
                    .column(c)
                    .is_some_and(|name| tracker.pending_value(slice.id, name).is_some());

                let mut style = if editing && is_cursor_row && c == self.cursor_col {
                    Style::default().fg(Color::Black).bg(Color::White).add_modifier(Modifier::BOLD)
                } else if editing && selection.contains(pos) {
                    Style::default().fg(Color::White).bg(Color::Blue)
                } else if !editing && is_cursor_row {
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
                } else if marker == '*' {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Gray)
                };
                if pending {
                    style = style.fg(Color::Yellow);
                }
                spans.push(Span::styled(format!("{} ", display), style));
            }
            lines.push(Line::from(spans));
        }

        frame.render_widget(Paragraph::new(lines), area);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let mode = if self.editing() { " EDIT " } else { " NORMAL " };
        let tracker = self.session.tracker();
        let mut counts = format!(" {} selected", self.session.selected_ids().len());
        if self.editing() {
            counts = format!(" {} cell(s)", self.session.cell_selection().len());
        }
        if tracker.pending_len() > 0 {
            counts.push_str(&format!("  {} pending", tracker.pending_len()));
        }
        let left = format!("{}{}  {}", mode, counts, self.status);
        let right = format!("Row {}/{}  ?: help ", self.cursor_row + 1, self.session.view().row_count());
        let padding = (area.width as usize).saturating_sub(left.chars().count() + right.chars().count());
        let status = format!("{}{:pad$}{}", left, "", right, pad = padding);

        let para = Paragraph::new(Line::from(vec![Span::styled(
            status,
            Style::default().fg(Color::Black).bg(Color::DarkGray),
        )]))
        .style(Style::default().bg(Color::DarkGray));
        frame.render_widget(para, area);
    }

    fn draw_help(&self, frame: &mut Frame, area: Rect) {
        let help_lines = [
            "",
            "  Grid",
            "  ----",
            "  /                 Search (Enter/Esc to leave)",
            "  arrows / hjkl     Move cursor",
            "  Space             Select row / cell",
            "  Shift+Up/Down     Extend selection",
            "  Ctrl+A            Select all",
            "  1..9              Sort by visible column",
            "  Shift+1..9        Remove that sort",
            "  s / S             Sort / unsort cursor column",
            "  0                 Clear sort",
            "  Enter             Confirm selection",
            "  Del               Delete selected rows",
            "  x                 Export visible rows",
            "",
            "  Edit mode (F2 / e)",
            "  ------------------",
            "  Enter             Edit cell (all selected)",
            "  Del               Clear selected cells",
            "  r / c             Select rows / columns",
            "  t                 Transform selected cells",
            "  Ctrl+C / Ctrl+V   Copy / paste",
            "  Ctrl+S            Commit and save",
            "",
            "  Esc               Leave edit mode / close",
            "  ?                 Toggle this help",
            "",
        ];
        let help_width: u16 = 50;
        let help_height: u16 = help_lines.len() as u16 + 2;

        let x = area.width.saturating_sub(help_width) / 2;
        let y = area.height.saturating_sub(help_height) / 2;
        let popup = Rect::new(area.x + x, area.y + y, help_width.min(area.width), help_height.min(area.height));

        let lines: Vec<Line> = help_lines
            .iter()
            .map(|s| Line::from(Span::styled(*s, Style::default().fg(Color::White))))
            .collect();

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" Keybindings ")
            .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .style(Style::default().bg(Color::Black));

        frame.render_widget(Clear, popup);
        frame.render_widget(Paragraph::new(lines).block(block), popup);
    }
}

/// Hand the width left over to the right of `cols` out evenly between them,
/// so the grid spans the whole terminal
fn spread_widths(widths: &mut [usize], cols: &[usize], available: usize) {
    let used: usize = cols.iter().map(|&c| widths[c] + 1).sum();
    if cols.is_empty() || used >= available {
        return;
    }
    let spare = available - used;
    let share = spare / cols.len();
    for &c in cols {
        widths[c] += share;
    }
    if let Some(&last) = cols.last() {
        widths[last] += spare % cols.len();
    }
}

/// Position and direction of `column` among the sort keys
fn sort_rank(criteria: &[gridsift_engine::sort::SortCriterion], column: &str) -> Option<(usize, bool)> {
    criteria
        .iter()
        .position(|c| c.column == column)
        .map(|i| (i, criteria[i].direction == SortDirection::Descending))
}

/// Run the interactive grid over a drawing until the session closes
pub fn run(
    documents: MemoryDocuments,
    options: BrowseOptions,
    session_options: SessionOptions,
    query: Option<&str>,
) -> Result<BrowseResult, String> {
    let app = BrowseApp::open(documents, options, session_options, query);
    run_app(app).map(BrowseApp::finish)
}

fn run_app(mut app: BrowseApp) -> Result<BrowseApp, String> {
    terminal::enable_raw_mode().map_err(|e| format!("failed to enable raw mode: {}", e))?;
    stdout()
        .execute(EnterAlternateScreen)
        .map_err(|e| format!("failed to enter alternate screen: {}", e))?;

    struct Cleanup;
    impl Drop for Cleanup {
        fn drop(&mut self) {
            let _ = stdout().execute(LeaveAlternateScreen);
            let _ = terminal::disable_raw_mode();
        }
    }
    let _cleanup = Cleanup;

    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend).map_err(|e| format!("failed to create terminal: {}", e))?;

    while app.outcome.is_none() {
        let size = terminal
            .size()
            .map(|s| Rect::new(0, 0, s.width, s.height))
            .unwrap_or_default();
        let visible_rows = size.height.saturating_sub(CHROME_ROWS) as usize;
        app.ensure_visible(visible_rows, size.width);

        terminal
            .draw(|frame| app.draw(frame))
            .map_err(|e| format!("draw error: {}", e))?;

        // Wake early when a debounced re-filter is due
        let timeout = app
            .session
            .debounce_deadline()
            .map_or(TICK, |d| d.saturating_duration_since(Instant::now()).min(TICK));
        if event::poll(timeout).map_err(|e| format!("event poll error: {}", e))? {
            if let Event::Key(key) = event::read().map_err(|e| format!("event read error: {}", e))? {
                app.handle_key(key);
            }
        }
        if app.session.poll(Instant::now()) {
            app.sync_cursor();
        }
    }

    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridsift_engine::target::{Document, DocumentPath, EntityProps, Point, TargetObject, TargetRef};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn block(name: &str, rotation: f64) -> TargetObject {
        TargetObject::BlockReference {
            props: EntityProps::default(),
            block_name: name.to_string(),
            position: Point::new(0.0, 0.0),
            rotation,
            scale: 1.0,
            attributes: BTreeMap::new(),
        }
    }

    fn app(dir: &TempDir, allow_delete: bool) -> BrowseApp {
        let mut current = Document::new(DocumentPath::current());
        current.add(block("Chair", 0.0));
        current.add(block("Desk", 90.0));
        current.add(block("Lamp", 180.0));
        let mut documents = MemoryDocuments::new();
        documents.insert(current);
        let options = BrowseOptions {
            drawing_path: dir.path().join("plan.json"),
            paste_text: Some("7\n8\n".to_string()),
            export_path: dir.path().join("out.csv"),
            export_delimiter: b',',
            export_headers: true,
            allow_delete,
        };
        BrowseApp::open(documents, options, SessionOptions::default(), None)
    }

    fn press(app: &mut BrowseApp, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn ctrl(app: &mut BrowseApp, c: char) {
        app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL));
    }

    fn type_text(app: &mut BrowseApp, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn rotation(app: &BrowseApp, id: u64) -> f64 {
        match app.documents.get(&DocumentPath::current()).and_then(|d| d.find(&TargetRef::Id(id))) {
            Some(TargetObject::BlockReference { rotation, .. }) => *rotation,
            other => panic!("expected block reference, got {:?}", other),
        }
    }

    /// Move the cursor onto a column by name
    fn goto_column(app: &mut BrowseApp, name: &str) {
        let target = app.session.view().column_position(name).unwrap();
        while app.cursor_col < target {
            press(app, KeyCode::Right);
        }
    }

    #[test]
    fn transform_parsing() {
        assert!(parse_transform("  ").is_none());
        let t = parse_transform("*2").unwrap();
        assert_eq!(t.apply("5", &Record::new()), "10");
        let t = parse_transform("A-=>B-").unwrap();
        assert_eq!(t.apply("A-WALL", &Record::new()), "B-WALL");
        let t = parse_transform(r"re:\d+=>#").unwrap();
        assert_eq!(t.apply("Door 12", &Record::new()), "Door #");
        let t = parse_transform("* (copy)").unwrap();
        assert_eq!(t.apply("Desk", &Record::new()), "Desk (copy)");
    }

    #[test]
    fn digit_keys() {
        assert_eq!(sort_key('1', false), Some((0, false)));
        assert_eq!(sort_key('3', true), Some((2, true)));
        assert_eq!(sort_key('@', false), Some((1, true)));
        assert_eq!(sort_key('0', false), None);
        assert_eq!(sort_key('a', false), None);
    }

    #[test]
    fn spread_fills_available_width() {
        let mut widths = vec![4, 6, 5];
        spread_widths(&mut widths, &[1, 2], 20);
        // 7 + 6 used, 7 spare: 3 each, the odd one to the last column
        assert_eq!(widths, vec![4, 9, 9]);

        let mut full = vec![10, 10];
        spread_widths(&mut full, &[0, 1], 15);
        assert_eq!(full, vec![10, 10]);
    }

    #[test]
    fn search_prompt_filters_live() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, false);
        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "desk");
        assert_eq!(app.session.view().row_count(), 1);
        press(&mut app, KeyCode::Enter);
        assert!(app.prompt.is_none());
        // typing "q" inside the prompt did not close the session
        assert!(app.outcome.is_none());
        press(&mut app, KeyCode::Char('/'));
        ctrl(&mut app, 'u');
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.session.view().row_count(), 3);
    }

    #[test]
    fn cursor_column_sort_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, false);
        goto_column(&mut app, "Rotation");
        press(&mut app, KeyCode::Char('s'));
        press(&mut app, KeyCode::Char('s'));
        let criteria = app.session.sort().criteria();
        assert_eq!(criteria[0].column, "Rotation");
        assert_eq!(criteria[0].direction, SortDirection::Descending);
        let rows = app.session.fetch(0..1);
        let name_col = app.session.view().column_position("Name").unwrap();
        assert_eq!(rows[0].cells[name_col], "Lamp");
        app.handle_key(KeyEvent::new(KeyCode::Char('S'), KeyModifiers::SHIFT));
        assert!(app.session.sort().is_empty());
    }

    #[test]
    fn edit_commit_saves_and_reports_modified() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, false);
        press(&mut app, KeyCode::F(2));
        assert!(app.editing());
        goto_column(&mut app, "Rotation");
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        for _ in 0..2 {
            press(&mut app, KeyCode::Backspace);
        }
        type_text(&mut app, "45");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.session.tracker().pending_len(), 1);

        ctrl(&mut app, 's');
        assert_eq!(app.status, "1 of 1 edits applied; saved");
        assert_eq!(rotation(&app, 2), 45.0);
        let saved = gridsift_io::drawing::load(&app.options.drawing_path).unwrap();
        assert_eq!(saved.records(), app.documents.records());

        press(&mut app, KeyCode::Esc);
        assert!(!app.editing());
        assert!(app.outcome.is_none());
        press(&mut app, KeyCode::Esc);
        let result = app.finish();
        assert!(matches!(result.outcome, SessionOutcome::Modified(ref r) if r.len() == 1));
        assert!(result.saved);
    }

    #[test]
    fn read_only_column_refuses_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, false);
        press(&mut app, KeyCode::Char('e'));
        goto_column(&mut app, "Handle");
        press(&mut app, KeyCode::Enter);
        assert!(app.prompt.is_none());
        assert_eq!(app.status, "Handle is read-only");
    }

    #[test]
    fn paste_file_text_into_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, false);
        press(&mut app, KeyCode::Char('e'));
        goto_column(&mut app, "Rotation");
        ctrl(&mut app, 'v');
        assert_eq!(app.status, "pasted 2 cell(s), 0 skipped");
        ctrl(&mut app, 's');
        assert_eq!(rotation(&app, 1), 7.0);
        assert_eq!(rotation(&app, 2), 8.0);
        assert_eq!(rotation(&app, 3), 180.0);
    }

    #[test]
    fn delete_removes_objects_from_drawing() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, true);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Delete);
        assert_eq!(app.session.view().row_count(), 2);
        assert_eq!(app.documents.records().len(), 2);
        ctrl(&mut app, 's');
        assert_eq!(app.status, "nothing to commit; saved");
        let saved = gridsift_io::drawing::load(&app.options.drawing_path).unwrap();
        assert_eq!(saved.records().len(), 2);
    }

    #[test]
    fn enter_confirms_cursor_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, false);
        press(&mut app, KeyCode::End);
        press(&mut app, KeyCode::Enter);
        match app.finish().outcome {
            SessionOutcome::Selected(records) => assert_eq!(records[0].text("Name"), "Lamp"),
            other => panic!("expected selection, got {:?}", other),
        }
    }

    #[test]
    fn export_writes_visible_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&dir, false);
        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "-name:desk");
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('x'));
        let text = std::fs::read_to_string(&app.options.export_path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(!text.contains("Desk"));
    }
}
