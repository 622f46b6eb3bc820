//! Query language for the record grid.
//!
//! ```text
//! query   := group ("," group)*              groups are ORed
//! group   := term ((" " | ";") term)*        terms are ANDed
//! term    := "=" col                         show only matching columns
//!          | col "@" N                       pin column to position N
//!          | ["-"] col ":" value             column contains / glob / "exact"
//!          | ["-"] [col] (">" | "<") number  numeric comparison
//!          | text                            free text, glob, or "exact"
//! ```
//!
//! Parsing never fails. Terms that cannot be evaluated become
//! `Filter::Never`, unmatched quotes are taken literally.

pub mod filter;
pub mod glob;
pub mod layout;
pub mod lexer;

use crate::index::SearchIndex;
use crate::record::RecordId;
use crate::value::parse_number;

pub use filter::{ColumnScope, CompareOp, Filter, TextMatch};
pub use layout::{ColumnDirectives, OrderDirective, VisibilityDirective};

use filter::{resolve_columns, ColumnName};
use lexer::{find_unquoted, split_groups, unquote};

/// A conjunction of filters
pub type FilterGroup = Vec<Filter>;

/// A parsed query string
#[derive(Debug, Clone, Default)]
pub struct Query {
    raw: String,
    groups: Vec<FilterGroup>,
    directives: ColumnDirectives,
}

impl Query {
    /// Parse against the indexed columns (positions match `SearchIndex::columns`)
    pub fn parse(raw: &str, columns: &[String]) -> Self {
        let names: Vec<ColumnName> = columns.iter().map(|c| ColumnName::new(c)).collect();
        let mut directives = ColumnDirectives::default();
        let groups: Vec<FilterGroup> = split_groups(raw)
            .iter()
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(|token| parse_term(token, &names, &mut directives))
                    .collect()
            })
            .collect();

        log::debug!(
            "parsed query {:?}: {} group(s), {} directive(s)",
            raw,
            groups.len(),
            directives.visibility.len() + directives.ordering.len()
        );

        Self {
            raw: raw.to_string(),
            groups,
            directives,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// True when the query places no constraint on rows
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.is_empty())
    }

    pub fn groups(&self) -> &[FilterGroup] {
        &self.groups
    }

    pub fn directives(&self) -> &ColumnDirectives {
        &self.directives
    }

    /// A record passes when every filter of at least one group passes
    pub fn matches(&self, id: RecordId, index: &SearchIndex) -> bool {
        if self.groups.is_empty() {
            return true;
        }
        self.groups
            .iter()
            .any(|group| group.iter().all(|f| f.matches(id, index)))
    }

    /// Filter ids, preserving their order
    pub fn apply(&self, ids: &[RecordId], index: &SearchIndex) -> Vec<RecordId> {
        if self.is_empty() {
            return ids.to_vec();
        }
        ids.iter().copied().filter(|&id| self.matches(id, index)).collect()
    }
}

/// Parse one token. Directives are recorded and yield no filter.
fn parse_term(token: &str, names: &[ColumnName], directives: &mut ColumnDirectives) -> Option<Filter> {
    if let Some(rest) = token.strip_prefix('=') {
        if !rest.is_empty() {
            let (fragment, exact) = unquote(rest);
            directives.visibility.push(VisibilityDirective {
                fragment: fragment.to_lowercase(),
                exact,
            });
            return None;
        }
    }

    if let Some((at, _)) = find_unquoted(token, &['@']) {
        let (column, position) = (&token[..at], &token[at + 1..]);
        if let Ok(position) = position.trim().parse::<usize>() {
            if !column.is_empty() && position >= 1 {
                let (fragment, exact) = unquote(column);
                directives.ordering.push(OrderDirective {
                    fragment: fragment.to_lowercase(),
                    exact,
                    position,
                });
                return None;
            }
        }
    }

    let (negated, body) = match token.strip_prefix('-') {
        Some(rest) if !rest.is_empty() => (true, rest),
        _ => (false, token),
    };

    if let Some((at, ch)) = find_unquoted(body, &['>', '<']) {
        let (column, operand) = (&body[..at], &body[at + 1..]);
        let op = if ch == '>' { CompareOp::Greater } else { CompareOp::Less };
        let Some(threshold) = parse_number(&unquote(operand).0) else {
            return Some(Filter::Never);
        };
        let scope = if column.is_empty() {
            ColumnScope::Any
        } else {
            let (fragment, exact) = unquote(column);
            ColumnScope::Columns(resolve_columns(names, &fragment.to_lowercase(), exact))
        };
        return Some(Filter::Compare { scope, op, threshold, negated });
    }

    if let Some((colon, _)) = find_unquoted(body, &[':']) {
        let (column, value) = (&body[..colon], &body[colon + 1..]);
        if !column.is_empty() {
            let (fragment, exact) = unquote(column);
            let columns = resolve_columns(names, &fragment.to_lowercase(), exact);
            return Some(match text_matcher(value) {
                Some(matcher) => Filter::Value { columns, matcher, negated },
                None => Filter::Never,
            });
        }
    }

    Some(match text_matcher(token) {
        Some(matcher) => Filter::General(matcher),
        None => Filter::Never,
    })
}

/// Matcher for a value operand; `None` when a glob cannot compile
fn text_matcher(raw: &str) -> Option<TextMatch> {
    let (text, exact) = unquote(raw);
    let text = text.to_lowercase();
    if exact {
        return Some(TextMatch::Exact(text));
    }
    if glob::is_glob(&text) {
        return match glob::compile(&text) {
            Ok(re) => Some(TextMatch::Glob(re)),
            Err(e) => {
                log::debug!("glob {:?} rejected: {}", text, e);
                None
            }
        };
    }
    Some(TextMatch::Contains(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordStore};

    fn columns() -> Vec<String> {
        ["Name", "Layer", "Radius", "CenterX"].iter().map(|s| s.to_string()).collect()
    }

    fn fixture() -> (RecordStore, SearchIndex) {
        let store = RecordStore::from_records(vec![
            Record::new().with("Name", "Door 1").with("Layer", "A-WALL").with("Radius", 2.0).with("CenterX", 10.0),
            Record::new().with("Name", "Window").with("Layer", "A-GLAZ").with("Radius", 8.0).with("CenterX", 0.5),
            Record::new().with("Name", "Door 2").with("Layer", "A-DOOR").with("Radius", "none").with("CenterX", -4.0),
        ]);
        let index = SearchIndex::build(&store, &columns());
        (store, index)
    }

    fn run(query: &str) -> Vec<usize> {
        let (store, index) = fixture();
        let q = Query::parse(query, &columns());
        q.apply(store.ids(), &index).iter().map(|id| id.raw()).collect()
    }

    #[test]
    fn test_empty_query_passes_all() {
        assert_eq!(run(""), vec![0, 1, 2]);
        assert_eq!(run("  ,  "), vec![0, 1, 2]);
        assert!(Query::parse("", &columns()).is_empty());
    }

    #[test]
    fn test_general_substring() {
        assert_eq!(run("door"), vec![0, 2]);
        assert_eq!(run("DOOR"), vec![0, 2]);
    }

    #[test]
    fn test_and_within_group() {
        assert_eq!(run("door wall"), vec![0]);
        assert_eq!(run("door;wall"), vec![0]);
    }

    #[test]
    fn test_or_across_groups() {
        assert_eq!(run("window,wall"), vec![0, 1]);
    }

    #[test]
    fn test_column_value_filter() {
        assert_eq!(run("layer:wall"), vec![0]);
        assert_eq!(run("lay:a-"), vec![0, 1, 2]);
        assert_eq!(run("-layer:wall"), vec![1, 2]);
    }

    #[test]
    fn test_mutually_exclusive_groups_cover_everything() {
        assert_eq!(run("layer:A-WALL,-layer:A-WALL"), vec![0, 1, 2]);
    }

    #[test]
    fn test_glob_and_exact() {
        assert_eq!(run("name:door*"), vec![0, 2]);
        assert_eq!(run("name:*1"), vec![0]);
        assert_eq!(run(r#"name:"door""#), Vec::<usize>::new());
        assert_eq!(run(r#"name:"door 2""#), vec![2]);
        assert_eq!(run(r#""window""#), vec![1]);
        assert_eq!(run("A*"), vec![0, 1, 2]);
    }

    #[test]
    fn test_quoted_column_is_exact() {
        assert_eq!(run(r#""center":10"#), Vec::<usize>::new());
        assert_eq!(run(r#""centerx":10"#), vec![0]);
    }

    #[test]
    fn test_numeric_comparisons() {
        assert_eq!(run("radius>5"), vec![1]);
        assert_eq!(run("radius<5"), vec![0]);
        assert_eq!(run("-radius<5"), vec![1, 2]);
        assert_eq!(run(">9"), vec![0]);
        assert_eq!(run("<-1"), vec![2]);
    }

    #[test]
    fn test_malformed_comparison_never_matches() {
        assert_eq!(run("radius>abc"), Vec::<usize>::new());
        assert_eq!(run("radius>abc,window"), vec![1]);
    }

    #[test]
    fn test_unmatched_quote_is_literal() {
        assert_eq!(run(r#""door"#), vec![0, 2]);
        assert_eq!(run(r#"name:"win"#), vec![1]);
    }

    #[test]
    fn test_directives_do_not_filter_rows() {
        let q = Query::parse("=layer name@1 door", &columns());
        assert_eq!(q.directives().visibility.len(), 1);
        assert_eq!(q.directives().ordering[0].position, 1);
        assert_eq!(q.groups()[0].len(), 1);
        assert_eq!(run("=layer"), vec![0, 1, 2]);
    }

    #[test]
    fn test_directives_collect_across_groups() {
        let q = Query::parse("=name, =layer", &columns());
        assert_eq!(q.directives().apply(&columns()), vec!["Name", "Layer"]);
    }

    #[test]
    fn test_at_without_number_is_text() {
        let q = Query::parse("bob@example", &columns());
        assert!(q.directives().ordering.is_empty());
        assert!(matches!(q.groups()[0][0], Filter::General(_)));
    }

    #[test]
    fn test_leading_dash_text_is_literal() {
        let q = Query::parse("-5", &columns());
        assert!(matches!(&q.groups()[0][0], Filter::General(TextMatch::Contains(t)) if t == "-5"));
    }
}
