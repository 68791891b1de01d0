pub mod source_map;
pub use source_map::SourceMap;

/// Byte range within an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }
}

/// Default cap on the length of an error snippet.
pub const SNIPPET_LEN: usize = 64;

/// Text of `span` cut to at most `max` characters; long fragments end with `...`.
pub fn snippet(text: &str, span: Span, max: usize) -> String {
    let end = span.end.min(text.len());
    let start = span.start.min(end);
    let fragment = String::from_utf8_lossy(&text.as_bytes()[start..end]);
    let fragment = fragment.trim();
    if fragment.chars().count() <= max {
        return fragment.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = fragment.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_spans() {
        let a = Span::new(3, 5);
        let b = Span::new(1, 4);
        assert_eq!(a.merge(b), Span::new(1, 5));
    }

    #[test]
    fn short_snippet_is_verbatim() {
        let text = "a+b*c";
        assert_eq!(snippet(text, Span::new(2, 5), 64), "b*c");
    }

    #[test]
    fn long_snippet_is_bounded() {
        let text = "1+".repeat(100);
        let s = snippet(&text, Span::new(0, text.len()), 16);
        assert_eq!(s.chars().count(), 16);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn snippet_clamps_out_of_range_span() {
        assert_eq!(snippet("abc", Span::new(1, 99), 64), "bc");
    }
}
