use std::fmt;

use serde::Serialize;

use crate::source::{self, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Syntax,
    Type,
    Reference,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Syntax => "syntax",
            ErrorKind::Type => "type",
            ErrorKind::Reference => "reference",
        })
    }
}

/// A compile-time failure. No partial program is ever produced alongside one.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{kind} error in {context}: {message} (in '{snippet}')")]
pub struct CompileError {
    pub code: &'static str,
    pub kind: ErrorKind,
    pub context: String,
    pub message: String,
    pub span: Span,
    pub snippet: String,
    pub notes: Vec<String>,
}

impl CompileError {
    /// The kind is read off the code: `PXF-S…` syntax, `PXF-T…` type, `PXF-R…` reference.
    pub fn new(code: &'static str, context: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = match code.as_bytes().get(4) {
            Some(b'T') => ErrorKind::Type,
            Some(b'R') => ErrorKind::Reference,
            _ => ErrorKind::Syntax,
        };
        CompileError {
            code,
            kind,
            context: context.into(),
            message: message.into(),
            span: Span::UNKNOWN,
            snippet: String::new(),
            notes: Vec::new(),
        }
    }

    /// Anchor the error on `span` of `text`, keeping a bounded snippet.
    pub fn at(mut self, text: &str, span: Span, max: usize) -> Self {
        self.span = span;
        self.snippet = source::snippet(text, span, max);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_code() {
        assert_eq!(CompileError::new("PXF-S003", "x", "y").kind, ErrorKind::Syntax);
        assert_eq!(CompileError::new("PXF-T001", "x", "y").kind, ErrorKind::Type);
        assert_eq!(CompileError::new("PXF-R001", "x", "y").kind, ErrorKind::Reference);
    }

    #[test]
    fn display_names_context_and_snippet() {
        let e = CompileError::new("PXF-R001", "variable 'foo'", "undefined variable")
            .at("1+foo", Span::new(2, 5), 64);
        assert_eq!(e.to_string(), "reference error in variable 'foo': undefined variable (in 'foo')");
    }
}
