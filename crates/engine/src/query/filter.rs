//! Row predicates produced by the query parser.

use regex::Regex;

use crate::index::SearchIndex;
use crate::record::RecordId;
use crate::value::{format_header, parse_number};

/// How a value operand matches lowercase cell text
#[derive(Debug, Clone)]
pub enum TextMatch {
    Contains(String),
    Exact(String),
    Glob(Regex),
}

impl TextMatch {
    pub fn matches(&self, cell: &str) -> bool {
        match self {
            TextMatch::Contains(needle) => cell.contains(needle.as_str()),
            TextMatch::Exact(expected) => cell == expected,
            TextMatch::Glob(re) => re.is_match(cell),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Greater,
    Less,
}

impl CompareOp {
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Greater => lhs > rhs,
            CompareOp::Less => lhs < rhs,
        }
    }
}

/// Which indexed columns a comparison looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnScope {
    Any,
    Columns(Vec<usize>),
}

/// One AND-term of a filter group
#[derive(Debug, Clone)]
pub enum Filter {
    /// `col:value` / `-col:value`
    Value {
        columns: Vec<usize>,
        matcher: TextMatch,
        negated: bool,
    },
    /// `col>N` / `col<N` / `>N`
    Compare {
        scope: ColumnScope,
        op: CompareOp,
        threshold: f64,
        negated: bool,
    },
    /// Free text against the whole row
    General(TextMatch),
    /// Unusable term (bad number, bad pattern): matches nothing
    Never,
}

impl Filter {
    pub fn matches(&self, id: RecordId, index: &SearchIndex) -> bool {
        match self {
            Filter::Value { columns, matcher, negated } => {
                let hit = columns
                    .iter()
                    .any(|&c| index.cell(id, c).is_some_and(|cell| matcher.matches(cell)));
                hit != *negated
            }
            Filter::Compare { scope, op, threshold, negated } => {
                let satisfied = |cell: &str| {
                    parse_number(cell).is_some_and(|n| op.holds(n, *threshold))
                };
                let hit = match scope {
                    ColumnScope::Any => index.cells(id).iter().any(|cell| satisfied(cell.as_str())),
                    ColumnScope::Columns(columns) => columns
                        .iter()
                        .any(|&c| index.cell(id, c).is_some_and(|cell| satisfied(cell))),
                };
                hit != *negated
            }
            Filter::General(TextMatch::Contains(needle)) => index.row(id).contains(needle.as_str()),
            Filter::General(matcher) => index.cells(id).iter().any(|cell| matcher.matches(cell)),
            Filter::Never => false,
        }
    }
}

/// Lowercase forms of a column name used for fragment matching
#[derive(Debug, Clone)]
pub struct ColumnName {
    raw: String,
    header: String,
    compact: String,
}

impl ColumnName {
    pub fn new(name: &str) -> Self {
        let header = format_header(name).to_lowercase();
        let compact = header.chars().filter(|c| !c.is_whitespace()).collect();
        Self {
            raw: name.to_lowercase(),
            header,
            compact,
        }
    }

    /// `fragment` must already be lowercase
    pub fn matches(&self, fragment: &str, exact: bool) -> bool {
        if exact {
            self.raw == fragment || self.header == fragment || self.compact == fragment
        } else {
            self.raw.contains(fragment) || self.header.contains(fragment) || self.compact.contains(fragment)
        }
    }
}

/// Indices of every column whose name matches the fragment
pub fn resolve_columns(names: &[ColumnName], fragment: &str, exact: bool) -> Vec<usize> {
    names
        .iter()
        .enumerate()
        .filter(|(_, n)| n.matches(fragment, exact))
        .map(|(i, _)| i)
        .collect()
}
