//! Bulk value transforms for selected cells.
//!
//! Steps run in a fixed order: find/replace, then pattern, then value op.
//! Any step may be absent.

use regex::Regex;

use crate::record::Record;
use crate::value::{format_number, parse_number};

/// Literal or regex replacement
#[derive(Debug, Clone)]
pub struct FindReplace {
    find: String,
    replace: String,
    regex: Option<Regex>,
}

impl FindReplace {
    pub fn literal(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
            regex: None,
        }
    }

    /// Regex replacement with `$1`-style captures. A pattern that does not
    /// compile is used as a literal.
    pub fn regex(find: impl Into<String>, replace: impl Into<String>) -> Self {
        let find = find.into();
        let regex = match Regex::new(&find) {
            Ok(re) => Some(re),
            Err(e) => {
                log::warn!("invalid find pattern '{}', using literal match: {}", find, e);
                None
            }
        };
        Self {
            find,
            replace: replace.into(),
            regex,
        }
    }

    pub fn is_regex(&self) -> bool {
        self.regex.is_some()
    }

    pub fn apply(&self, value: &str) -> String {
        match &self.regex {
            Some(re) => re.replace_all(value, self.replace.as_str()).into_owned(),
            None if self.find.is_empty() => value.to_string(),
            None => value.replace(&self.find, &self.replace),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Operation applied after find/replace and pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueOp {
    /// Applied to every number embedded in the value
    Arith(ArithOp, f64),
    Upper,
    Lower,
    Title,
}

impl ValueOp {
    /// `+5`, `-2.5`, `*2`, `x2`, `/4`, `upper`, `lower`, `title`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "upper" | "uppercase" => return Some(Self::Upper),
            "lower" | "lowercase" => return Some(Self::Lower),
            "title" | "titlecase" => return Some(Self::Title),
            _ => {}
        }
        let mut chars = s.chars();
        let op = match chars.next()? {
            '+' => ArithOp::Add,
            '-' => ArithOp::Sub,
            '*' | 'x' | 'X' => ArithOp::Mul,
            '/' => ArithOp::Div,
            _ => return None,
        };
        let operand = parse_number(chars.as_str())?;
        Some(Self::Arith(op, operand))
    }

    pub fn apply(&self, value: &str) -> String {
        match *self {
            Self::Upper => value.to_uppercase(),
            Self::Lower => value.to_lowercase(),
            Self::Title => title_case(value),
            Self::Arith(op, operand) => {
                let mut out = String::with_capacity(value.len());
                let mut last = 0;
                for (start, end) in number_spans(value) {
                    let text = &value[start..end];
                    out.push_str(&value[last..start]);
                    match parse_number(text).and_then(|n| arith(op, n, operand)) {
                        Some(n) => out.push_str(&format_number(n)),
                        None => out.push_str(text),
                    }
                    last = end;
                }
                out.push_str(&value[last..]);
                out
            }
        }
    }
}

/// Byte spans of the numbers embedded in `value`: digits with an optional
/// fraction. A `-` is a sign only at the start or after whitespace, so the
/// hyphen in `D-2` stays text.
fn number_spans(value: &str) -> Vec<(usize, usize)> {
    let bytes = value.as_bytes();
    let digits_from = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        i
    };
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let signed = bytes[i] == b'-'
            && (i == 0 || bytes[i - 1].is_ascii_whitespace())
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
        if !signed && !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = digits_from(if signed { i + 1 } else { i });
        if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
            end = digits_from(end + 1);
        }
        spans.push((start, end));
        i = end;
    }
    spans
}

fn arith(op: ArithOp, n: f64, operand: f64) -> Option<f64> {
    let result = match op {
        ArithOp::Add => n + operand,
        ArithOp::Sub => n - operand,
        ArithOp::Mul => n * operand,
        ArithOp::Div if operand == 0.0 => return None,
        ArithOp::Div => n / operand,
    };
    result.is_finite().then_some(result)
}

fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut start = true;
    for c in value.chars() {
        if c.is_whitespace() {
            start = true;
            out.push(c);
        } else if start {
            out.extend(c.to_uppercase());
            start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Substitute a pattern: `*` is the current value, `"Column"` is the
/// value of that column on the same record. Unknown columns stay literal.
pub fn expand_pattern(pattern: &str, current: &str, record: &Record) -> String {
    let mut out = String::with_capacity(pattern.len() + current.len());
    let mut rest = pattern;
    while let Some(c) = rest.chars().next() {
        match c {
            '*' => {
                out.push_str(current);
                rest = &rest[1..];
            }
            '"' => {
                let body = &rest[1..];
                match body.find('"') {
                    Some(end) => {
                        let name = &body[..end];
                        match sibling(record, name) {
                            Some(text) => out.push_str(&text),
                            None => out.push_str(&rest[..end + 2]),
                        }
                        rest = &body[end + 1..];
                    }
                    None => {
                        out.push_str(rest);
                        rest = "";
                    }
                }
            }
            _ => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

fn sibling(record: &Record, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    if record.contains(name) {
        return Some(record.text(name));
    }
    let column = record.columns().find(|c| c.eq_ignore_ascii_case(name))?.to_string();
    Some(record.text(&column))
}

#[derive(Debug, Clone, Default)]
pub struct BulkTransform {
    pub find_replace: Option<FindReplace>,
    pub pattern: Option<String>,
    pub op: Option<ValueOp>,
}

impl BulkTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_find_replace(mut self, fr: FindReplace) -> Self {
        self.find_replace = Some(fr);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_op(mut self, op: ValueOp) -> Self {
        self.op = Some(op);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.find_replace.is_none() && self.pattern.is_none() && self.op.is_none()
    }

    /// New text for one cell of `record`
    pub fn apply(&self, current: &str, record: &Record) -> String {
        let mut value = current.to_string();
        if let Some(fr) = &self.find_replace {
            value = fr.apply(&value);
        }
        if let Some(pattern) = &self.pattern {
            value = expand_pattern(pattern, &value, record);
        }
        if let Some(op) = &self.op {
            value = op.apply(&value);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new().with("Name", "Door").with("Layer", "A-DOOR").with("Width", 900.0)
    }

    #[test]
    fn test_literal_replace() {
        let fr = FindReplace::literal("A-", "X-");
        assert_eq!(fr.apply("A-WALL A-DOOR"), "X-WALL X-DOOR");
        assert_eq!(FindReplace::literal("", "z").apply("abc"), "abc");
    }

    #[test]
    fn test_regex_replace_with_captures() {
        let fr = FindReplace::regex(r"^(\w)-(\w+)$", "$2-$1");
        assert!(fr.is_regex());
        assert_eq!(fr.apply("A-WALL"), "WALL-A");
    }

    #[test]
    fn test_invalid_regex_falls_back_to_literal() {
        let fr = FindReplace::regex("(a", "b");
        assert!(!fr.is_regex());
        assert_eq!(fr.apply("x(ay"), "xby");
    }

    #[test]
    fn test_pattern_substitution() {
        let r = record();
        assert_eq!(expand_pattern("*-old", "Door", &r), "Door-old");
        assert_eq!(expand_pattern("\"Layer\"_*", "Door", &r), "A-DOOR_Door");
        assert_eq!(expand_pattern("\"layer\"", "", &r), "A-DOOR");
        assert_eq!(expand_pattern("\"Missing\"", "x", &r), "\"Missing\"");
        assert_eq!(expand_pattern("\"open", "x", &r), "\"open");
        assert_eq!(expand_pattern("W=\"Width\"", "", &r), "W=900");
    }

    #[test]
    fn test_value_op_parse() {
        assert_eq!(ValueOp::parse("+5"), Some(ValueOp::Arith(ArithOp::Add, 5.0)));
        assert_eq!(ValueOp::parse("-2.5"), Some(ValueOp::Arith(ArithOp::Sub, 2.5)));
        assert_eq!(ValueOp::parse("x2"), Some(ValueOp::Arith(ArithOp::Mul, 2.0)));
        assert_eq!(ValueOp::parse("UPPER"), Some(ValueOp::Upper));
        assert_eq!(ValueOp::parse("+abc"), None);
        assert_eq!(ValueOp::parse("?"), None);
    }

    #[test]
    fn test_arith_on_embedded_numbers() {
        let op = ValueOp::Arith(ArithOp::Add, 10.0);
        assert_eq!(op.apply("D1 rev 2"), "D11 rev 12");
        assert_eq!(ValueOp::Arith(ArithOp::Mul, 2.0).apply("1.25"), "2.5");
        assert_eq!(ValueOp::Arith(ArithOp::Div, 0.0).apply("4"), "4");
        assert_eq!(op.apply("none"), "none");
    }

    #[test]
    fn test_arith_keeps_hyphenated_codes() {
        let op = ValueOp::Arith(ArithOp::Add, 10.0);
        assert_eq!(op.apply("D-2"), "D-12");
        assert_eq!(op.apply("A-10 x"), "A-20 x");
        assert_eq!(op.apply("-5"), "5");
        assert_eq!(op.apply("offset -3"), "offset 7");
        assert_eq!(op.apply("1.5.2"), "11.5.12");
    }

    #[test]
    fn test_case_ops() {
        assert_eq!(ValueOp::Title.apply("hello WORLD"), "Hello World");
        assert_eq!(ValueOp::Lower.apply("ABC"), "abc");
    }

    #[test]
    fn test_steps_run_in_order() {
        let t = BulkTransform::new()
            .with_find_replace(FindReplace::literal("Door", "Gate"))
            .with_pattern("*_\"Layer\"")
            .with_op(ValueOp::Upper);
        assert_eq!(t.apply("Door", &record()), "GATE_A-DOOR");
        assert!(BulkTransform::new().is_empty());
        assert_eq!(BulkTransform::new().apply("same", &record()), "same");
    }
}
