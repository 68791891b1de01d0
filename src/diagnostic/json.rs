use super::{Diagnostic, Severity};
use crate::source::SourceMap;

pub fn render(d: &Diagnostic) -> String {
    let severity = match d.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };

    let source_map = d.source.as_deref().map(SourceMap::new);

    let labels: Vec<serde_json::Value> = d.labels.iter().map(|l| {
        let mut obj = serde_json::json!({
            "start": l.span.start,
            "end": l.span.end,
            "message": l.message,
            "primary": l.is_primary,
        });
        if let Some(map) = &source_map {
            let (line, col) = map.lookup(l.span.start);
            obj["line"] = serde_json::Value::from(line);
            obj["col"] = serde_json::Value::from(col);
        }
        obj
    }).collect();

    let mut obj = serde_json::json!({
        "severity": severity,
        "message": d.message,
        "labels": labels,
        "notes": d.notes,
    });

    if let Some(code) = d.code {
        obj["code"] = serde_json::Value::String(code.to_string());
    }

    if let Some(s) = &d.suggestion {
        obj["suggestion"] = serde_json::Value::String(s.clone());
    }

    serde_json::to_string(&obj).unwrap_or_else(|_| r#"{"severity":"error","message":"internal error serializing diagnostic"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileError;
    use crate::source::Span;

    fn parse_json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn render_basic_error() {
        let v = parse_json(&render(&Diagnostic::error("empty expression")));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["message"], "empty expression");
        assert!(v["labels"].as_array().unwrap().is_empty());
        assert!(v.get("code").is_none());
        assert!(v.get("suggestion").is_none());
    }

    #[test]
    fn render_compile_error_with_source() {
        let text = "a = 1;\nb + 1";
        let e = CompileError::new("PXF-R001", "variable 'b'", "undefined variable").at(text, Span::new(7, 8), 64);
        let v = parse_json(&render(&Diagnostic::from(&e).with_source(text)));
        assert_eq!(v["code"], "PXF-R001");
        let label = &v["labels"][0];
        assert_eq!(label["start"], 7);
        assert_eq!(label["end"], 8);
        assert_eq!(label["primary"], true);
        assert_eq!(label["line"], 2);
        assert_eq!(label["col"], 1);
        assert!(v["suggestion"].is_string());
    }

    #[test]
    fn labels_without_source_have_no_position() {
        let d = Diagnostic::error("bad").with_span(Span::new(5, 8), "here");
        let v = parse_json(&render(&d));
        assert!(v["labels"][0].get("line").is_none());
    }

    #[test]
    fn notes_and_secondary_labels() {
        let d = Diagnostic::error("bad")
            .with_span(Span::new(0, 5), "primary")
            .with_secondary_span(Span::new(10, 12), "secondary")
            .with_note("in macro 'f'")
            .with_note("in macro 'g'");
        let v = parse_json(&render(&d));
        assert_eq!(v["notes"].as_array().unwrap().len(), 2);
        assert_eq!(v["labels"][1]["primary"], false);
    }

    #[test]
    fn warning_severity() {
        let mut d = Diagnostic::error("unused macro");
        d.severity = Severity::Warning;
        assert_eq!(parse_json(&render(&d))["severity"], "warning");
    }
}
