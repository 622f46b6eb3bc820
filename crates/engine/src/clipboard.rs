//! Clipboard text for the edit grid.
//!
//! Clipboard content is tab-separated: rows on line breaks, cells on tabs.
//! Pastes become ordinary identity-keyed edits through the tracker.

use crate::edit::{CellPos, EditTracker};
use crate::error::EngineError;
use crate::record::RecordStore;
use crate::view::GridView;

/// Result of one paste
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasteOutcome {
    /// Cells that received an edit
    pub placed: usize,
    /// Source cells that fell outside the view or were rejected
    pub skipped: usize,
}

/// Split clipboard text into rows of cells.
/// `\r\n`, `\n` and `\r` all end a row; one trailing line break is ignored.
pub fn parse_clipboard(text: &str) -> Vec<Vec<String>> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let body = normalized.strip_suffix('\n').unwrap_or(&normalized);
    if body.is_empty() {
        return Vec::new();
    }
    body.split('\n')
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

/// Paste clipboard text at the current cell selection.
///
/// A single source cell over a multi-cell selection is broadcast to every
/// selected editable cell. Anything else is placed as a block from the
/// selection's top-left (or the cursor); read-only columns are stepped over
/// and cells past the last row or column are dropped.
pub fn paste(
    tracker: &mut EditTracker,
    view: &GridView,
    store: &mut RecordStore,
    text: &str,
) -> Result<PasteOutcome, EngineError> {
    if !tracker.is_editing() {
        return Err(EngineError::NotInEditMode);
    }
    let source = parse_clipboard(text);
    let cell_count: usize = source.iter().map(Vec::len).sum();
    if cell_count == 0 {
        return Ok(PasteOutcome::default());
    }

    if cell_count == 1 && tracker.selection().len() > 1 {
        let value = source[0][0].clone();
        let targets: Vec<CellPos> = tracker
            .selection()
            .cells()
            .filter(|pos| view.column(pos.col).is_some_and(|c| tracker.is_editable(c)))
            .collect();
        let placed = tracker.broadcast(view, store, &value);
        log::debug!("broadcast paste to {} cell(s)", placed);
        return Ok(PasteOutcome {
            placed,
            skipped: targets.len() - placed,
        });
    }

    let Some(anchor) = tracker.selection().top_left() else {
        return Ok(PasteOutcome {
            placed: 0,
            skipped: cell_count,
        });
    };
    let editable_cols: Vec<usize> = (anchor.col..view.column_count())
        .filter(|&col| view.column(col).is_some_and(|c| tracker.is_editable(c)))
        .collect();

    let mut outcome = PasteOutcome::default();
    for (i, row) in source.iter().enumerate() {
        let target_row = anchor.row + i;
        for (j, value) in row.iter().enumerate() {
            let target = editable_cols.get(j).copied().filter(|_| target_row < view.row_count());
            let placed = match target {
                Some(col) => tracker.set_cell(view, store, CellPos::new(target_row, col), value).is_ok(),
                None => false,
            };
            if placed {
                outcome.placed += 1;
            } else {
                outcome.skipped += 1;
            }
        }
    }
    log::debug!("block paste: {} placed, {} skipped", outcome.placed, outcome.skipped);
    Ok(outcome)
}

/// Tab-separated text of the selected cells' bounding rectangle
pub fn copy_selection(tracker: &EditTracker, view: &GridView, store: &RecordStore) -> String {
    let selection = tracker.selection();
    let cells: Vec<CellPos> = selection.cells().collect();
    let (Some(top_left), false) = (selection.top_left(), cells.is_empty()) else {
        return String::new();
    };
    let bottom = cells.iter().map(|c| c.row).max().unwrap_or(top_left.row);
    let right = cells.iter().map(|c| c.col).max().unwrap_or(top_left.col);
    (top_left.row..=bottom)
        .map(|row| {
            (top_left.col..=right)
                .map(|col| {
                    if selection.contains(CellPos::new(row, col)) {
                        view.cell_text(store, row, col).unwrap_or_default()
                    } else {
                        String::new()
                    }
                })
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
