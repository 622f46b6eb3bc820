use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Display width of a string, accounting for CJK double-width, emoji, etc.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

/// Longest prefix of `s` that fits in `budget` display columns
fn prefix_within(s: &str, budget: usize) -> &str {
    let mut used = 0;
    for (i, ch) in s.char_indices() {
        used += char_width(ch);
        if used > budget {
            return &s[..i];
        }
    }
    s
}

/// Cut `s` to `width` display columns, marking the cut with "..".
/// Below three columns there is no room for the marker.
pub fn truncate_display(s: &str, width: usize) -> String {
    if display_width(s) <= width {
        return s.to_string();
    }
    if width < 3 {
        return prefix_within(s, width).to_string();
    }
    format!("{}..", prefix_within(s, width - 2))
}

/// Exactly `width` display columns: truncated, or right-padded with spaces
pub fn pad_right(s: &str, width: usize) -> String {
    let cut = truncate_display(s, width);
    let pad = width.saturating_sub(display_width(&cut));
    format!("{}{}", cut, " ".repeat(pad))
}

/// Header label with its sort marker: `^1` ascending primary, `v2` descending secondary
pub fn header_label(name: &str, sort_rank: Option<(usize, bool)>) -> String {
    match sort_rank {
        Some((rank, descending)) => {
            format!("{} {}{}", name, if descending { 'v' } else { '^' }, rank + 1)
        }
        None => name.to_string(),
    }
}
