use super::Span;

/// Where a span lands in a formula: one line of text and a caret range on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location<'a> {
    /// 1-based line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub col: usize,
    /// Carets to draw; at least 1, never past the end of the line.
    pub width: usize,
    pub text: &'a str,
}

/// Line index over a formula. Formulas read with `--file` may span several lines, and string
/// literals may hold non-ASCII text, so columns count characters rather than bytes.
pub struct SourceMap<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceMap<'a> {
    pub fn new(source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        SourceMap { source, line_starts }
    }

    fn line_index(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset).saturating_sub(1)
    }

    fn line_bounds(&self, index: usize) -> (usize, usize) {
        let start = self.line_starts[index];
        let end = self.line_starts.get(index + 1).map_or(self.source.len(), |&next| next - 1);
        let text = &self.source[start..end];
        (start, start + text.trim_end_matches('\r').len())
    }

    /// Characters from the line start up to `offset`.
    fn chars_between(&self, start: usize, offset: usize) -> usize {
        let mut offset = offset.min(self.source.len());
        while !self.source.is_char_boundary(offset) {
            offset -= 1;
        }
        self.source[start..offset.max(start)].chars().count()
    }

    /// 1-based (line, column) of a byte offset.
    pub fn lookup(&self, offset: usize) -> (usize, usize) {
        let index = self.line_index(offset);
        let (start, _) = self.line_bounds(index);
        (index + 1, self.chars_between(start, offset) + 1)
    }

    /// Line and caret range of a span; a span running past its first line is cut at the line end.
    pub fn locate(&self, span: Span) -> Location<'a> {
        let index = self.line_index(span.start);
        let (start, end) = self.line_bounds(index);
        let col = self.chars_between(start, span.start);
        let last = self.chars_between(start, span.end.min(end));
        Location {
            line: index + 1,
            col: col + 1,
            width: last.saturating_sub(col).max(1),
            text: &self.source[start..end],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_columns() {
        let map = SourceMap::new("a=1;a*2+x");
        assert_eq!(map.lookup(0), (1, 1));
        assert_eq!(map.lookup(2), (1, 3));
        assert_eq!(map.lookup(9), (1, 10));
    }

    #[test]
    fn formulas_from_files_span_lines() {
        let map = SourceMap::new("begin(k=2)\nx+k;\r\ny*k+1.5");
        assert_eq!(map.lookup(10), (1, 11));
        assert_eq!(map.lookup(11), (2, 1));
        let loc = map.locate(Span::new(17, 18));
        assert_eq!((loc.line, loc.col, loc.width, loc.text), (3, 1, 1, "y*k+1.5"));
        assert_eq!(map.locate(Span::new(11, 14)).text, "x+k;");
    }

    #[test]
    fn columns_count_characters_in_strings() {
        let src = "echo('é→x', q)";
        let map = SourceMap::new(src);
        let q = src.find('q').unwrap();
        let loc = map.locate(Span::new(q, q + 1));
        assert_eq!((loc.col, loc.width), (13, 1));
        let s = map.locate(Span::new(5, q - 2));
        assert_eq!((s.col, s.width), (6, 5));
    }

    #[test]
    fn carets_stop_at_the_line_end() {
        let map = SourceMap::new("f(v)=v+\nq;f(1)");
        let loc = map.locate(Span::new(5, 9));
        assert_eq!((loc.line, loc.col, loc.width), (1, 6, 2));
        assert_eq!(loc.text, "f(v)=v+");
    }

    #[test]
    fn empty_spans_and_sources_get_one_caret() {
        let loc = SourceMap::new("1+").locate(Span::new(2, 2));
        assert_eq!((loc.col, loc.width), (3, 1));
        let loc = SourceMap::new("").locate(Span::new(0, 4));
        assert_eq!((loc.line, loc.col, loc.width, loc.text), (1, 1, 1, ""));
    }
}
