//! Literal-marker text extraction.
//!
//! The scraped pages are never parsed as HTML. Each value is located by the
//! literal strings that surround it, so a markup change upstream shows up as
//! a miss (`None`) and never as an error.

/// An opening and closing marker around one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPair {
    pub open: String,
    pub close: String,
}

impl MarkerPair {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    /// Section starting at the first `open`, up to and including the first
    /// `close` after it. Runs to the end of `text` when `close` is missing.
    pub fn section<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = text.find(&self.open)?;
        let rest = &text[start..];
        match rest[self.open.len()..].find(&self.close) {
            Some(end) => Some(&rest[..self.open.len() + end + self.close.len()]),
            None => Some(rest),
        }
    }

    /// Text strictly between the first `open` and the next `close`.
    pub fn inner<'a>(&self, text: &'a str) -> Option<&'a str> {
        let start = text.find(&self.open)? + self.open.len();
        let end = text[start..].find(&self.close)?;
        Some(&text[start..start + end])
    }
}

/// Up to `chars` characters following the first occurrence of `marker`.
pub fn window_after<'a>(text: &'a str, marker: &str, chars: usize) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = rest
        .char_indices()
        .nth(chars)
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Last `n` characters of `text` (all of it when shorter).
pub fn last_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - n)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_includes_close_marker() {
        let table = MarkerPair::new("<table>", "</table>");
        let body = "x<table><h5>A</h5></table>tail";
        assert_eq!(table.section(body), Some("<table><h5>A</h5></table>"));
    }

    #[test]
    fn test_section_without_close_runs_to_end() {
        let table = MarkerPair::new("<table>", "</table>");
        assert_eq!(table.section("ab<table><tr>"), Some("<table><tr>"));
        assert_eq!(table.section("no markers"), None);
    }

    #[test]
    fn test_inner_requires_both_markers() {
        let heading = MarkerPair::new("<h5>", "</h5>");
        assert_eq!(heading.inner("<h5> 12 MAIN ST </h5>"), Some(" 12 MAIN ST "));
        assert_eq!(heading.inner("<h5>dangling"), None);
        assert_eq!(heading.inner("</h5>before<h5>"), None);
    }

    #[test]
    fn test_window_after_counts_chars_not_bytes() {
        assert_eq!(window_after("key:ééééé", "key:", 3), Some("ééé"));
        assert_eq!(window_after("key:ab", "key:", 10), Some("ab"));
        assert_eq!(window_after("nothing", "key:", 3), None);
    }

    #[test]
    fn test_last_chars() {
        assert_eq!(last_chars("Rockford, IL 61101", 5), "61101");
        assert_eq!(last_chars("123", 5), "123");
        assert_eq!(last_chars("Zürich 8001", 4), "8001");
    }
}
