//! Text helpers: word wrapping and the AI summary marker block.

use unicode_width::UnicodeWidthStr;

/// Start marker around a posted summary.
pub const SUMMARY_START_MARKER: &str = "=== AI SUMMARY START ===";
/// End marker around a posted summary.
pub const SUMMARY_END_MARKER: &str = "=== AI SUMMARY END ===";

/// Word-wrap `text` to `width` visible columns, prefixing every line with
/// `indent`.
///
/// Runs of whitespace (newlines included) collapse to one space. A word wider
/// than the line gets a line of its own rather than being split.
#[must_use]
pub fn fill(text: &str, width: usize, indent: &str) -> String {
    let indent_width = UnicodeWidthStr::width(indent);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_width = 0;

    for word in text.split_whitespace() {
        let word_width = UnicodeWidthStr::width(word);
        if !line.is_empty() && line_width + 1 + word_width <= width {
            line.push(' ');
            line.push_str(word);
            line_width += 1 + word_width;
            continue;
        }
        if !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        line.push_str(indent);
        line.push_str(word);
        line_width = indent_width + word_width;
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines.join("\n")
}

/// A start/end marker pair delimiting generated content inside a larger text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryMarkers {
    start: String,
    end: String,
}

impl Default for SummaryMarkers {
    fn default() -> Self {
        Self::new(SUMMARY_START_MARKER, SUMMARY_END_MARKER)
    }
}

impl SummaryMarkers {
    #[must_use]
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Byte range of the whole block, markers included.
    fn span(&self, text: &str) -> Option<(usize, usize)> {
        let start = text.find(&self.start)?;
        let after_start = start + self.start.len();
        let end = text[after_start..].find(&self.end)? + after_start;
        Some((start, end + self.end.len()))
    }

    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.span(text).is_some()
    }

    /// Content between the markers, trimmed.
    #[must_use]
    pub fn get<'a>(&self, text: &'a str) -> Option<&'a str> {
        let (start, end) = self.span(text)?;
        Some(text[start + self.start.len()..end - self.end.len()].trim())
    }

    /// Text with the marker block cut out.
    #[must_use]
    pub fn remove(&self, text: &str) -> String {
        match self.span(text) {
            Some((start, end)) => format!("{}{}", &text[..start], text[end..].trim_start()),
            None => text.to_string(),
        }
    }

    /// Replace the block's content, or append a new block.
    #[must_use]
    pub fn upsert(&self, text: &str, content: &str) -> String {
        let block = self.block(content);
        match self.span(text) {
            Some((start, end)) => format!("{}{}{}", &text[..start], block, &text[end..]),
            None if text.is_empty() => block,
            None => format!("{text}\n{block}"),
        }
    }

    /// A fresh block with `content` word-wrapped to `width`.
    #[must_use]
    pub fn wrap(&self, content: &str, width: usize) -> String {
        self.block(&fill(content, width, ""))
    }

    fn block(&self, content: &str) -> String {
        format!("{}\n{}\n{}", self.start, content, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers() -> SummaryMarkers {
        SummaryMarkers::new("=== START ===", "=== END ===")
    }

    const WRAPPED: &str = "This is some\n=== START ===\nwrapped\n=== END ===\ncontent";

    #[test]
    fn test_fill_wraps_at_width() {
        let text = "the quick brown fox jumps over the lazy dog";
        assert_eq!(fill(text, 10, ""), "the quick\nbrown fox\njumps over\nthe lazy\ndog");
    }

    #[test]
    fn test_fill_indent_and_collapse() {
        assert_eq!(fill("a  b\n\nc", 80, "  "), "  a b c");
        assert_eq!(fill("aaa bbb", 5, "  "), "  aaa\n  bbb");
        assert_eq!(fill("", 10, "  "), "");
    }

    #[test]
    fn test_fill_wide_characters() {
        // Each CJK character is two columns wide.
        assert_eq!(fill("日本 日本 日本", 9, ""), "日本 日本\n日本");
    }

    #[test]
    fn test_fill_long_word_gets_own_line() {
        assert_eq!(fill("a supercalifragilistic b", 6, ""), "a\nsupercalifragilistic\nb");
    }

    #[test]
    fn test_contains_and_get() {
        assert!(markers().contains(WRAPPED));
        assert_eq!(markers().get(WRAPPED), Some("wrapped"));
        assert!(!markers().contains("This is some\nunwrapped\ncontent"));
        assert_eq!(markers().get("no markers here"), None);
        assert_eq!(markers().get("=== END === before === START ==="), None);
    }

    #[test]
    fn test_remove() {
        assert_eq!(markers().remove(WRAPPED), "This is some\ncontent");
        assert_eq!(markers().remove("plain"), "plain");
    }

    #[test]
    fn test_upsert() {
        assert_eq!(
            markers().upsert(WRAPPED, "new"),
            "This is some\n=== START ===\nnew\n=== END ===\ncontent"
        );
        assert_eq!(
            markers().upsert("This is some\nunwrapped\ncontent", "new"),
            "This is some\nunwrapped\ncontent\n=== START ===\nnew\n=== END ==="
        );
        assert_eq!(markers().upsert("", "new"), "=== START ===\nnew\n=== END ===");
    }

    #[test]
    fn test_wrap_round_trips_through_get() {
        let m = SummaryMarkers::default();
        let block = m.wrap("one two three four five", 9);
        assert_eq!(m.get(&block), Some("one two\nthree\nfour five"));
    }
}
