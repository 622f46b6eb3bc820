//! Query string tokenizer.
//!
//! Two levels: commas split OR-groups, whitespace or `;` split AND-tokens.
//! Double quotes protect separators. An unclosed quote runs to the end of
//! the input; the token keeps its quote character and `unquote` strips it.

/// Split a raw query into OR-groups of raw tokens. Empty groups are dropped.
pub fn split_groups(raw: &str) -> Vec<Vec<String>> {
    split_outside_quotes(raw, |c| c == ',')
        .into_iter()
        .map(|group| split_outside_quotes(&group, |c| c.is_whitespace() || c == ';'))
        .filter(|tokens| !tokens.is_empty())
        .collect()
}

fn split_outside_quotes(input: &str, is_separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        if ch == '"' {
            in_quotes = !in_quotes;
            current.push(ch);
        } else if !in_quotes && is_separator(ch) {
            if !current.trim().is_empty() {
                parts.push(current.trim().to_string());
            }
            current.clear();
        } else {
            current.push(ch);
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Remove quoting from a token part.
///
/// Returns the literal text and whether it was fully quoted (exact match).
/// A lone leading or trailing quote is stripped and the rest taken literally.
pub fn unquote(part: &str) -> (String, bool) {
    let quoted = part.len() >= 2 && part.starts_with('"') && part.ends_with('"');
    if quoted {
        return (part[1..part.len() - 1].to_string(), true);
    }
    if let Some(rest) = part.strip_prefix('"') {
        return (rest.to_string(), false);
    }
    if let Some(rest) = part.strip_suffix('"') {
        return (rest.to_string(), false);
    }
    (part.to_string(), false)
}

/// Find the first occurrence of any of `targets` outside quotes
pub fn find_unquoted(token: &str, targets: &[char]) -> Option<(usize, char)> {
    let mut in_quotes = false;
    for (i, ch) in token.char_indices() {
        if ch == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes && targets.contains(&ch) {
            return Some((i, ch));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_and_tokens() {
        let groups = split_groups("layer:wall door; window, -name:x");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec!["layer:wall", "door", "window"]);
        assert_eq!(groups[1], vec!["-name:x"]);
    }

    #[test]
    fn test_quotes_protect_separators() {
        let groups = split_groups(r#"name:"a, b c" x"#);
        assert_eq!(groups, vec![vec![r#"name:"a, b c""#.to_string(), "x".to_string()]]);
    }

    #[test]
    fn test_empty_groups_dropped() {
        assert!(split_groups("").is_empty());
        assert!(split_groups(" , ,, ").is_empty());
        assert_eq!(split_groups(",a,").len(), 1);
    }

    #[test]
    fn test_unclosed_quote_runs_to_end() {
        let groups = split_groups(r#"name:"foo bar, baz"#);
        assert_eq!(groups, vec![vec![r#"name:"foo bar, baz"#.to_string()]]);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r#""Layer""#), ("Layer".to_string(), true));
        assert_eq!(unquote(r#""Layer"#), ("Layer".to_string(), false));
        assert_eq!(unquote(r#"Layer""#), ("Layer".to_string(), false));
        assert_eq!(unquote("Layer"), ("Layer".to_string(), false));
        assert_eq!(unquote(r#"""#), ("".to_string(), false));
    }

    #[test]
    fn test_find_unquoted() {
        assert_eq!(find_unquoted("a:b", &[':']), Some((1, ':')));
        assert_eq!(find_unquoted(r#""a:b""#, &[':']), None);
        assert_eq!(find_unquoted("r>5", &['>', '<']), Some((1, '>')));
    }
}
