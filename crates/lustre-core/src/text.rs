//! Bounded text helpers used by context and prompt rendering.
//! Cuts prefer a word boundary; fall back to a hard character cut.

/// Appended to any text shortened by [`truncate`].
pub const TRUNCATION_MARKER: &str = "...";

/// Trims `text` and cuts it to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was removed.
///
/// Counts characters, not bytes, so multi-byte text is never split mid-codepoint.
/// Output is at most `max_chars + TRUNCATION_MARKER.len()` characters long.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let (head, rest) = text.split_at(byte_offset(text, max_chars));
    let head = if rest.starts_with(char::is_whitespace) {
        head.trim_end()
    } else {
        cut_at_boundary(head)
    };
    format!("{head}{TRUNCATION_MARKER}")
}

/// Collapses every whitespace run (including newlines) into a single space.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte offset of the `n`th character, or the full length if shorter.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices().nth(n).map_or(text.len(), |(i, _)| i)
}

/// Prefer the last whitespace, as long as that keeps at least half of `head`.
fn cut_at_boundary(head: &str) -> &str {
    match head.rfind(char::is_whitespace) {
        Some(pos) if pos * 2 >= head.len() => head[..pos].trim_end(),
        _ => head.trim_end(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_unchanged() {
        assert_eq!(truncate("  Gold ring  ", 20), "Gold ring");
    }

    #[test]
    fn long_text_is_cut_with_marker() {
        let long = "a".repeat(300);
        let out = truncate(&long, 150);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), 150 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn cut_prefers_word_boundary() {
        let out = truncate("classic wedding band in eighteen karat gold", 20);
        assert_eq!(out, "classic wedding band...");
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundary() {
        let out = truncate("Nhẫn cưới vàng trắng sang trọng", 6);
        assert!(out.starts_with("Nhẫn"));
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn single_line_collapses_whitespace() {
        assert_eq!(single_line("a\n\n b\t c "), "a b c");
    }
}
