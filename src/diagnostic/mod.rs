pub mod ansi;
pub mod json;
pub mod registry;

use crate::compiler::CompileError;
use crate::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: true });
        self
    }

    pub fn with_secondary_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: false });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A one-line hint for the codes where the fix is usually the same.
fn suggestion(code: &str) -> Option<&'static str> {
    Some(match code {
        "PXF-S002" => "check that every '(' and '[' has a partner",
        "PXF-S007" => "a conditional reads 'cond ? a : b'",
        "PXF-T001" => "reduce the vector first, e.g. with norm(), sum() or V[0]",
        "PXF-T004" => "use a literal or a name declared with 'const'",
        "PXF-R001" => "assign the variable before reading it, e.g. 'v = 0; ...'",
        "PXF-R003" => "pick another name; reserved names and constants are read-only",
        _ => return None,
    })
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        let mut d = Diagnostic::error(format!("{} error in {}: {}", e.kind, e.context, e.message))
            .with_code(e.code)
            .with_span(e.span, "here");
        for note in &e.notes {
            d = d.with_note(note.clone());
        }
        if let Some(hint) = suggestion(e.code) {
            d = d.with_suggestion(hint);
        }
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ErrorKind;

    #[test]
    fn diagnostic_error_builder() {
        let d = Diagnostic::error("something went wrong");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.message, "something went wrong");
        assert!(d.code.is_none());
        assert!(d.labels.is_empty());
        assert!(d.notes.is_empty());
        assert!(d.suggestion.is_none());
    }

    #[test]
    fn diagnostic_with_span() {
        let d = Diagnostic::error("bad operand").with_span(Span::new(5, 8), "here");
        assert_eq!(d.labels.len(), 1);
        assert_eq!(d.labels[0].span, Span::new(5, 8));
        assert!(d.labels[0].is_primary);
    }

    #[test]
    fn from_compile_error() {
        let text = "1+foo";
        let e = CompileError::new("PXF-R001", "variable 'foo'", "undefined variable").at(text, Span::new(2, 5), 64);
        assert_eq!(e.kind, ErrorKind::Reference);
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("PXF-R001"));
        assert_eq!(d.message, "reference error in variable 'foo': undefined variable");
        assert_eq!(d.labels[0].span, Span::new(2, 5));
        assert!(d.suggestion.is_some());
    }

    #[test]
    fn macro_notes_are_carried() {
        let e = CompileError::new("PXF-T002", "operator '+'", "operands have different sizes")
            .with_note("in macro 'f'");
        let d = Diagnostic::from(&e);
        assert_eq!(d.notes, vec!["in macro 'f'"]);
        assert!(d.suggestion.is_none());
    }

    #[test]
    fn every_suggested_code_is_registered() {
        for code in ["PXF-S002", "PXF-S007", "PXF-T001", "PXF-T004", "PXF-R001", "PXF-R003"] {
            assert!(suggestion(code).is_some(), "{code}");
            assert!(registry::lookup(code).is_some(), "{code}");
        }
    }
}
