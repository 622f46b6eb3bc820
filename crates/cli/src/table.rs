//! Non-interactive sessions.
//!
//! `query` and `export` open a session over a record table, apply the query
//! and sort from the command line, and read the visible view back out.

use std::fmt::Write as _;

use gridsift_engine::sort::{SortCriterion, SortDirection};
use gridsift_engine::value::format_header;
use gridsift_engine::{Record, Session, SessionOptions, Value};
use gridsift_io::RecordTable;

use crate::util;

/// Query, sort and column arguments shared by `query` and `export`
#[derive(Debug, Clone, Default)]
pub struct ViewRequest {
    pub query: Option<String>,
    /// `COL`, `COL:asc` or `COL:desc`, primary first
    pub sort: Vec<String>,
    /// Column subset and order; `None` keeps every column
    pub columns: Option<Vec<String>>,
}

/// Parse one `--sort` argument. Column names may contain `:` (`attr:TAG`),
/// so only a trailing `:asc`/`:desc` is taken as a direction.
pub fn parse_sort_key(arg: &str) -> Result<(String, SortDirection), String> {
    let lower = arg.to_ascii_lowercase();
    let (column, direction) = if lower.ends_with(":desc") {
        (&arg[..arg.len() - 5], SortDirection::Descending)
    } else if lower.ends_with(":asc") {
        (&arg[..arg.len() - 4], SortDirection::Ascending)
    } else {
        (arg, SortDirection::Ascending)
    };
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("empty column name in --sort {:?}", arg));
    }
    Ok((column.to_string(), direction))
}

/// Match a user-typed column name against the table, exact first then
/// ignoring case
pub fn resolve_column<'a>(columns: &'a [String], name: &str) -> Result<&'a str, String> {
    columns
        .iter()
        .find(|c| c.as_str() == name)
        .or_else(|| columns.iter().find(|c| c.eq_ignore_ascii_case(name)))
        .map(String::as_str)
        .ok_or_else(|| format!("unknown column {:?}", name))
}

/// Open a session over `table` with the request applied
pub fn open_session(table: RecordTable, request: &ViewRequest, options: SessionOptions) -> Result<Session, String> {
    let columns = match &request.columns {
        Some(wanted) => wanted
            .iter()
            .map(|name| resolve_column(&table.columns, name.trim()).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?,
        None => table.columns.clone(),
    };

    let sort = request
        .sort
        .iter()
        .map(|arg| {
            let (name, direction) = parse_sort_key(arg)?;
            let column = resolve_column(&table.columns, &name)?.to_string();
            Ok(SortCriterion { column, direction })
        })
        .collect::<Result<Vec<_>, String>>()?;

    let mut session = Session::new(table.records, columns, options);
    if let Some(query) = &request.query {
        session.set_query(query);
    }
    if !sort.is_empty() {
        session.set_sort(&sort);
    }
    Ok(session)
}

/// Width of a displayed column: the measured width, or the header's
fn column_width(session: &Session, column: &str) -> usize {
    session
        .column_width(column)
        .unwrap_or_else(|| util::display_width(&format_header(column)))
}

/// Aligned text table of the visible view. `max_rows` of 0 prints every row.
pub fn render_table(session: &Session, max_rows: usize) -> String {
    let view = session.view();
    let columns = view.columns();
    let widths: Vec<usize> = columns.iter().map(|c| column_width(session, c)).collect();
    let total = view.row_count();
    let limit = if max_rows == 0 { total } else { max_rows.min(total) };

    let mut out = String::new();
    let header: Vec<String> = view
        .headers()
        .iter()
        .zip(&widths)
        .map(|(h, &w)| util::pad_right(h, w))
        .collect();
    let _ = writeln!(out, "{}", header.join(" ").trim_end());
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    let _ = writeln!(out, "{}", rule.join(" "));

    for row in session.fetch(0..limit) {
        let cells: Vec<String> = row
            .cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| util::pad_right(cell, w))
            .collect();
        let _ = writeln!(out, "{}", cells.join(" ").trim_end());
    }

    if limit < total {
        let _ = writeln!(out, "... ({} more rows)", total - limit);
    }
    out
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => serde_json::Value::from(*n as i64),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
    }
}

/// Records as JSON objects, keys in `columns` order first, then any other
/// fields sorted by name
pub fn records_to_json(records: &[Record], columns: &[String]) -> serde_json::Value {
    let objects = records
        .iter()
        .map(|record| {
            let mut object = serde_json::Map::new();
            for column in columns {
                if let Some(value) = record.get(column) {
                    object.insert(column.clone(), json_value(value));
                }
            }
            let mut rest: Vec<&str> = record.columns().filter(|c| !object.contains_key(*c)).collect();
            rest.sort_unstable();
            for column in rest {
                if let Some(value) = record.get(column) {
                    object.insert(column.to_string(), json_value(value));
                }
            }
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::Value::Array(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RecordTable {
        RecordTable {
            columns: vec!["Name".into(), "Layer".into(), "attr:TAG".into()],
            records: vec![
                Record::new().with("Name", "Desk 10").with("Layer", "A-FURN"),
                Record::new().with("Name", "Desk 2").with("Layer", "A-FURN").with("attr:TAG", "T1"),
                Record::new().with("Name", "Wall").with("Layer", "A-WALL"),
            ],
        }
    }

    #[test]
    fn sort_key_directions() {
        assert_eq!(parse_sort_key("Name").unwrap(), ("Name".into(), SortDirection::Ascending));
        assert_eq!(parse_sort_key("Name:DESC").unwrap(), ("Name".into(), SortDirection::Descending));
        assert_eq!(parse_sort_key("attr:TAG").unwrap(), ("attr:TAG".into(), SortDirection::Ascending));
        assert_eq!(parse_sort_key("attr:TAG:asc").unwrap(), ("attr:TAG".into(), SortDirection::Ascending));
        assert!(parse_sort_key(":desc").is_err());
    }

    #[test]
    fn resolve_column_ignores_case() {
        let t = table();
        assert_eq!(resolve_column(&t.columns, "layer").unwrap(), "Layer");
        assert!(resolve_column(&t.columns, "Color").is_err());
    }

    #[test]
    fn open_session_applies_request() {
        let request = ViewRequest {
            query: Some("layer:furn".into()),
            sort: vec!["name".into()],
            columns: Some(vec!["name".into()]),
        };
        let s = open_session(table(), &request, SessionOptions::default()).unwrap();
        assert_eq!(s.view().columns(), &["Name".to_string()]);
        let names: Vec<String> = s.fetch(0..2).into_iter().map(|r| r.cells[0].clone()).collect();
        assert_eq!(names, vec!["Desk 2", "Desk 10"]);
    }

    #[test]
    fn open_session_rejects_unknown_columns() {
        let request = ViewRequest {
            sort: vec!["Color".into()],
            ..ViewRequest::default()
        };
        assert!(open_session(table(), &request, SessionOptions::default()).is_err());
    }

    #[test]
    fn render_truncates_rows() {
        let s = open_session(table(), &ViewRequest::default(), SessionOptions::default()).unwrap();
        let text = render_table(&s, 2);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Name"));
        assert!(lines[0].contains("TAG"));
        assert!(lines[1].starts_with("---"));
        assert!(lines[2].starts_with("Desk 10"));
        assert_eq!(lines[4], "... (1 more rows)");
    }

    #[test]
    fn json_keeps_column_order() {
        let records = vec![Record::new().with("Rotation", 90.0).with("Name", "Desk").with("Count", 2.5)];
        let json = records_to_json(&records, &["Name".to_string(), "Rotation".to_string()]);
        assert_eq!(json.to_string(), r#"[{"Name":"Desk","Rotation":90,"Count":2.5}]"#);
    }
}
