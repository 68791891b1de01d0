//! Nesting-level annotation of a formula.
//!
//! Every byte gets the bracket depth it sits at. Opening and closing brackets carry the depth
//! outside them; string contents sit one level deeper than their quotes so that operator scans at a
//! given depth never see into a string literal.

use crate::compiler::CompileError;
use crate::source::{SNIPPET_LEN, Span};

const NONE: usize = usize::MAX;

pub fn is_blank(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// An expression plus its per-byte annotations.
#[derive(Debug, Clone)]
pub struct Annotated {
    text: String,
    level: Vec<u32>,
    prev: Vec<usize>,
    partner: Vec<usize>,
}

impl Annotated {
    pub fn new(text: &str) -> Result<Annotated, CompileError> {
        let bytes = text.as_bytes();
        let n = bytes.len();
        let mut level = vec![0u32; n];
        let mut partner = vec![NONE; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut depth = 0u32;
        let mut i = 0;
        while i < n {
            let b = bytes[i];
            match b {
                b'\'' => {
                    let mut j = i + 1;
                    while j < n && bytes[j] != b'\'' {
                        j += if bytes[j] == b'\\' { 2 } else { 1 };
                    }
                    if j >= n {
                        return Err(CompileError::new("PXF-S001", "string literal", "unterminated string literal")
                            .at(text, Span::new(i, n), SNIPPET_LEN));
                    }
                    level[i] = depth;
                    level[i + 1..j].fill(depth + 1);
                    level[j] = depth;
                    partner[i] = j;
                    partner[j] = i;
                    i = j + 1;
                    continue;
                }
                b'(' | b'[' => {
                    level[i] = depth;
                    stack.push(i);
                    depth += 1;
                }
                b')' | b']' => {
                    let open = match stack.pop() {
                        Some(open) if bytes[open] == if b == b')' { b'(' } else { b'[' } => open,
                        _ => {
                            return Err(CompileError::new(
                                "PXF-S002",
                                format!("bracket '{}'", b as char),
                                "unbalanced brackets",
                            )
                            .at(text, Span::new(i, i + 1), SNIPPET_LEN));
                        }
                    };
                    depth -= 1;
                    level[i] = depth;
                    partner[open] = i;
                    partner[i] = open;
                }
                _ => level[i] = depth,
            }
            i += 1;
        }
        if let Some(&open) = stack.last() {
            return Err(CompileError::new(
                "PXF-S002",
                format!("bracket '{}'", bytes[open] as char),
                "unbalanced brackets",
            )
            .at(text, Span::new(open, n), SNIPPET_LEN));
        }

        let mut prev = vec![NONE; n];
        let mut last = NONE;
        for (k, &b) in bytes.iter().enumerate() {
            prev[k] = last;
            if !is_blank(b) {
                last = k;
            }
        }

        Ok(Annotated { text: text.to_string(), level, prev, partner })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Byte at `i`, or 0 past either end.
    pub fn byte(&self, i: usize) -> u8 {
        self.text.as_bytes().get(i).copied().unwrap_or(0)
    }

    pub fn str(&self, start: usize, end: usize) -> &str {
        self.text.get(start..end).unwrap_or("")
    }

    pub fn level(&self, i: usize) -> u32 {
        self.level.get(i).copied().unwrap_or(0)
    }

    /// Index of the nearest non-blank byte before `i`.
    pub fn prev_nonblank(&self, i: usize) -> Option<usize> {
        self.prev.get(i).copied().filter(|&p| p != NONE)
    }

    /// Matching bracket or quote of the one at `i`.
    pub fn partner(&self, i: usize) -> Option<usize> {
        self.partner.get(i).copied().filter(|&p| p != NONE)
    }

    /// Strip blanks and `;` at both ends, then any parentheses wrapping the whole range.
    pub fn trim(&self, mut start: usize, mut end: usize) -> (usize, usize) {
        let bytes = self.bytes();
        loop {
            while start < end && (is_blank(bytes[start]) || bytes[start] == b';') {
                start += 1;
            }
            while end > start && (is_blank(bytes[end - 1]) || bytes[end - 1] == b';') {
                end -= 1;
            }
            if end - start >= 2 && bytes[start] == b'(' && self.partner(start) == Some(end - 1) {
                start += 1;
                end -= 1;
                continue;
            }
            return (start, end);
        }
    }

    /// Strip blanks only.
    pub fn trim_blanks(&self, mut start: usize, mut end: usize) -> (usize, usize) {
        let bytes = self.bytes();
        while start < end && is_blank(bytes[start]) {
            start += 1;
        }
        while end > start && is_blank(bytes[end - 1]) {
            end -= 1;
        }
        (start, end)
    }

    /// Split `[start, end)` on `sep` bytes sitting at depth `depth`.
    pub fn split(&self, start: usize, end: usize, sep: u8, depth: u32) -> Vec<(usize, usize)> {
        let bytes = self.bytes();
        let mut parts = Vec::new();
        let mut from = start;
        for i in start..end {
            if bytes[i] == sep && self.level[i] == depth {
                parts.push((from, i));
                from = i + 1;
            }
        }
        parts.push((from, end));
        parts
    }

    /// Comma-separated arguments between the bracket at `open` and its partner.
    /// An all-blank interior yields no arguments.
    pub fn arguments(&self, open: usize) -> Vec<(usize, usize)> {
        let Some(close) = self.partner(open) else {
            return Vec::new();
        };
        let (s, e) = self.trim_blanks(open + 1, close);
        if s == e {
            return Vec::new();
        }
        self.split(open + 1, close, b',', self.level(open) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ErrorKind;

    #[test]
    fn nesting_depths() {
        let a = Annotated::new("(a+[b])").unwrap();
        let levels: Vec<u32> = (0..a.len()).map(|i| a.level(i)).collect();
        assert_eq!(levels, vec![0, 1, 1, 1, 2, 1, 0]);
        assert_eq!(a.partner(0), Some(6));
        assert_eq!(a.partner(3), Some(5));
    }

    #[test]
    fn strings_are_masked() {
        let a = Annotated::new("['a)\\'b']+1").unwrap();
        assert_eq!(a.level(1), 1);
        assert_eq!(a.level(3), 2);
        assert_eq!(a.partner(1), Some(7));
        assert_eq!(a.level(9), 0);
    }

    #[test]
    fn previous_non_blank() {
        let a = Annotated::new("a -  -b").unwrap();
        assert_eq!(a.prev_nonblank(5), Some(2));
        assert_eq!(a.prev_nonblank(0), None);
    }

    #[test]
    fn trim_strips_outer_parentheses_only_when_matched() {
        let a = Annotated::new(" ((1+2)) ;").unwrap();
        assert_eq!(a.trim(0, a.len()), (3, 6));
        let b = Annotated::new("(1+2)*(3+4)").unwrap();
        assert_eq!(b.trim(0, b.len()), (0, b.len()));
    }

    #[test]
    fn arguments_split_at_top_level() {
        let a = Annotated::new("f(1,(2,3),'a,b')").unwrap();
        let args: Vec<&str> = a.arguments(1).iter().map(|&(s, e)| a.str(s, e)).collect();
        assert_eq!(args, vec!["1", "(2,3)", "'a,b'"]);
        let empty = Annotated::new("f( )").unwrap();
        assert!(empty.arguments(1).is_empty());
    }

    #[test]
    fn unbalanced_brackets_are_syntax_errors() {
        for text in ["(1+2", "1+2)", "[1,2)"] {
            let e = Annotated::new(text).unwrap_err();
            assert_eq!(e.kind, ErrorKind::Syntax, "{text}");
            assert_eq!(e.code, "PXF-S002");
        }
    }

    #[test]
    fn unterminated_string() {
        let e = Annotated::new("'abc\\'").unwrap_err();
        assert_eq!(e.code, "PXF-S001");
    }
}
