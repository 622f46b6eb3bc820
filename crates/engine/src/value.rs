//! Cell values and header formatting.
//!
//! Records hold loosely typed values: text, numbers, or booleans. Everything the
//! grid displays, indexes, or exports goes through `Value::display()` so that
//! matching and rendering agree on one textual form.

use serde::{Deserialize, Serialize};

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Default for Value {
    fn default() -> Self {
        Value::Text(String::new())
    }
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Display string used for rendering, indexing, and export
    pub fn display(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        }
    }

    /// Numeric interpretation (numbers, or text that parses as a number)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => parse_number(s),
            Value::Bool(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Text(s) if s.is_empty())
    }

    /// Interpret user input against the type of the value it replaces.
    ///
    /// A numeric cell stays numeric when the input parses, a boolean cell stays
    /// boolean for true/false input; anything else becomes text.
    pub fn parse_like(previous: Option<&Value>, input: &str) -> Value {
        match previous {
            Some(Value::Number(_)) => match parse_number(input) {
                Some(n) => Value::Number(n),
                None => Value::Text(input.to_string()),
            },
            Some(Value::Bool(_)) => match input.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Value::Bool(true),
                "false" | "no" | "0" => Value::Bool(false),
                _ => Value::Text(input.to_string()),
            },
            _ => Value::Text(input.to_string()),
        }
    }

    /// Infer a value from raw text (used by delimited imports)
    pub fn infer(raw: &str) -> Value {
        if let Some(n) = parse_number(raw) {
            return Value::Number(n);
        }
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Text(raw.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Parse text as a finite number; surrounding whitespace is ignored
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Integers print without a fractional part; other values keep at most
/// 6 decimals with trailing zeros removed.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let s = format!("{:.6}", n);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Header text shown for a column name.
///
/// `CenterX` becomes `Center X`, `block_name` becomes `Block Name`, and the
/// attribute family `attr:TAG` shows as `TAG`.
pub fn format_header(name: &str) -> String {
    if let Some(tag) = name.strip_prefix(crate::edit::ATTRIBUTE_PREFIX) {
        return tag.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    let mut capitalize = true;
    for ch in name.chars() {
        if ch == '_' || ch == '-' {
            if !out.ends_with(' ') && !out.is_empty() {
                out.push(' ');
            }
            capitalize = true;
            prev = Some(' ');
            continue;
        }
        if let Some(p) = prev {
            // Split lowerUpper and letterDigit boundaries
            let boundary = (p.is_lowercase() && ch.is_uppercase())
                || (p.is_alphabetic() && ch.is_ascii_digit());
            if boundary && !out.ends_with(' ') {
                out.push(' ');
            }
        }
        if capitalize {
            out.extend(ch.to_uppercase());
            capitalize = false;
        } else {
            out.push(ch);
        }
        prev = Some(ch);
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_numbers() {
        assert_eq!(Value::Number(3.0).display(), "3");
        assert_eq!(Value::Number(2.5).display(), "2.5");
        assert_eq!(Value::Number(0.1 + 0.2).display(), "0.3");
        assert_eq!(Value::Bool(true).display(), "True");
    }

    #[test]
    fn test_as_number_from_text() {
        assert_eq!(Value::text(" 12.5 ").as_number(), Some(12.5));
        assert_eq!(Value::text("12 mm").as_number(), None);
        assert_eq!(Value::text("").as_number(), None);
        assert_eq!(Value::text("NaN").as_number(), None);
        assert_eq!(Value::Bool(true).as_number(), None);
    }

    #[test]
    fn test_parse_like_keeps_type() {
        let n = Value::Number(1.0);
        assert_eq!(Value::parse_like(Some(&n), "42"), Value::Number(42.0));
        assert_eq!(Value::parse_like(Some(&n), "abc"), Value::text("abc"));
        let b = Value::Bool(false);
        assert_eq!(Value::parse_like(Some(&b), "TRUE"), Value::Bool(true));
        assert_eq!(Value::parse_like(None, "42"), Value::text("42"));
    }

    #[test]
    fn test_format_header() {
        assert_eq!(format_header("CenterX"), "Center X");
        assert_eq!(format_header("block_name"), "Block Name");
        assert_eq!(format_header("Layer"), "Layer");
        assert_eq!(format_header("attr:PART_NO"), "PART_NO");
        assert_eq!(format_header("DocumentPath"), "Document Path");
    }

    #[test]
    fn test_untagged_json() {
        let v: Vec<Value> = serde_json::from_str(r#"[true, 1.5, "x"]"#).unwrap();
        assert_eq!(v, vec![Value::Bool(true), Value::Number(1.5), Value::text("x")]);
    }
}
