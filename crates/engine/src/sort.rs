//! Multi-column natural sort.
//!
//! Up to three criteria, most recently clicked first. Ties fall through to
//! the next criterion and finally to record insertion order, so the result
//! is deterministic for any input order.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::record::{RecordId, RecordStore};
use crate::value::Value;

/// Maximum number of simultaneous sort criteria
pub const MAX_SORT_KEYS: usize = 3;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriterion {
    pub column: String,
    pub direction: SortDirection,
}

/// Active criteria, primary first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortState {
    criteria: Vec<SortCriterion>,
}

impl SortState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criteria(&self) -> &[SortCriterion] {
        &self.criteria
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn direction_of(&self, column: &str) -> Option<SortDirection> {
        self.criteria
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.direction)
    }

    /// Header click.
    ///
    /// Plain click cycles the column ascending, descending, removed, moving it
    /// to the front; shift-click removes it. Returns whether anything changed.
    pub fn click(&mut self, column: &str, shift: bool) -> bool {
        let existing = self.criteria.iter().position(|c| c.column == column);

        if shift {
            return match existing {
                Some(pos) => {
                    self.criteria.remove(pos);
                    true
                }
                None => false,
            };
        }

        let next = match existing.map(|pos| self.criteria.remove(pos).direction) {
            None => Some(SortDirection::Ascending),
            Some(SortDirection::Ascending) => Some(SortDirection::Descending),
            Some(SortDirection::Descending) => None,
        };
        if let Some(direction) = next {
            self.criteria.insert(
                0,
                SortCriterion {
                    column: column.to_string(),
                    direction,
                },
            );
            self.criteria.truncate(MAX_SORT_KEYS);
        }
        true
    }

    /// Set a single criterion, replacing all others
    pub fn set(&mut self, column: &str, direction: SortDirection) {
        self.criteria = vec![SortCriterion {
            column: column.to_string(),
            direction,
        }];
    }

    /// Push a criterion to the front (used when building from CLI arguments)
    pub fn push_front(&mut self, column: &str, direction: SortDirection) {
        self.criteria.retain(|c| c.column != column);
        self.criteria.insert(
            0,
            SortCriterion {
                column: column.to_string(),
                direction,
            },
        );
        self.criteria.truncate(MAX_SORT_KEYS);
    }

    pub fn clear(&mut self) {
        self.criteria.clear();
    }

    /// Re-order ids in place by the live record values
    pub fn sort(&self, ids: &mut [RecordId], store: &RecordStore) {
        if self.criteria.is_empty() {
            ids.sort_unstable();
            return;
        }
        ids.sort_by(|&a, &b| {
            for criterion in &self.criteria {
                let va = store.get(a).and_then(|r| r.get(&criterion.column));
                let vb = store.get(b).and_then(|r| r.get(&criterion.column));
                // blanks stay last whichever way the column is sorted
                let ord = match (is_blank(va), is_blank(vb)) {
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    _ => match criterion.direction {
                        SortDirection::Ascending => compare_values(va, vb),
                        SortDirection::Descending => compare_values(va, vb).reverse(),
                    },
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.cmp(&b)
        });
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    type_rank(value) == 3
}

/// Type rank: Numbers(0) < Text(1) < Bool(2) < Blank(3)
fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Number(_)) => 0,
        Some(Value::Text(s)) if !s.is_empty() => 1,
        Some(Value::Bool(_)) => 2,
        _ => 3,
    }
}

/// Ascending comparison of two cell values
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => OrderedFloat(*x).cmp(&OrderedFloat(*y)),
        (Some(Value::Text(x)), Some(Value::Text(y))) => natural_cmp(x, y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits: Option<bool> = None;
    for (i, ch) in s.char_indices() {
        let is_digit = ch.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != is_digit => {
                out.push(if prev { Chunk::Digits(&s[start..i]) } else { Chunk::Text(&s[start..i]) });
                start = i;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }
    if let Some(prev) = in_digits {
        out.push(if prev { Chunk::Digits(&s[start..]) } else { Chunk::Text(&s[start..]) });
    }
    out
}

/// Compare two digit runs by numeric value without overflow
fn cmp_digits(a: &str, b: &str) -> Ordering {
    let ta = a.trim_start_matches('0');
    let tb = b.trim_start_matches('0');
    ta.len()
        .cmp(&tb.len())
        .then_with(|| ta.cmp(tb))
        .then_with(|| a.len().cmp(&b.len()))
}

fn cmp_text_ci(a: &str, b: &str) -> Ordering {
    let la = a.chars().flat_map(char::to_lowercase);
    let lb = b.chars().flat_map(char::to_lowercase);
    la.cmp(lb)
}

/// Natural (alphanumeric-aware) ordering: `"Item 2" < "Item 10"`.
///
/// Digit runs compare numerically, other runs case-insensitively. A digit
/// run sorts before a text run at the same position. Strings equal under
/// these rules fall back to a plain byte comparison.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let ca = chunks(a);
    let cb = chunks(b);
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Digits(x), Chunk::Digits(y)) => cmp_digits(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => cmp_text_ci(x, y),
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len()).then_with(|| a.cmp(b))
}
