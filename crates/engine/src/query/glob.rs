//! `*` wildcards translated to anchored regular expressions.

use regex::Regex;

pub fn is_glob(pattern: &str) -> bool {
    pattern.contains('*')
}

/// Compile a glob into a case-insensitive, fully anchored regex.
/// Every character except `*` is literal.
pub fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?is)^{}$", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchored() {
        let re = compile("A*").unwrap();
        assert!(re.is_match("a-wall"));
        assert!(re.is_match("A"));
        assert!(!re.is_match("wall-a"));
    }

    #[test]
    fn test_inner_wildcard() {
        let re = compile("a*wall").unwrap();
        assert!(re.is_match("a-wall"));
        assert!(re.is_match("awall"));
        assert!(!re.is_match("a-walls"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let re = compile("1.5*").unwrap();
        assert!(re.is_match("1.50"));
        assert!(!re.is_match("1x50"));
        let re = compile("(x)*").unwrap();
        assert!(re.is_match("(x) door"));
    }
}
