//! User macros: `name(a, b) = body`, expanded textually at each call.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{Compiler, Result, builtins, is_identifier};
use crate::arena::{Slot, reserved};
use crate::levels::Annotated;
use crate::source::Span;

static HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\(([^()]*)\)$").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Param(usize),
}

/// A macro body with its parameter uses located.
#[derive(Debug, Clone)]
pub(super) struct Macro {
    arity: usize,
    body: Vec<Piece>,
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

impl Macro {
    pub(super) fn new(params: &[&str], body: &str) -> Macro {
        let bytes = body.as_bytes();
        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut k = 0;
        while k < bytes.len() {
            let b = bytes[k];
            if b == b'\'' {
                let mut end = k + 1;
                while end < bytes.len() && bytes[end] != b'\'' {
                    end += if bytes[end] == b'\\' { 2 } else { 1 };
                }
                let end = (end + 1).min(bytes.len());
                text.push_str(&body[k..end]);
                k = end;
                continue;
            }
            let numbered = |i: usize| bytes[i] == b'#' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
            if !is_word(b) && !numbered(k) {
                let start = k;
                k += 1;
                while k < bytes.len() && !is_word(bytes[k]) && bytes[k] != b'\'' && !numbered(k) {
                    k += 1;
                }
                text.push_str(&body[start..k]);
                continue;
            }
            let start = k;
            k += 1;
            while k < bytes.len() && is_word(bytes[k]) {
                k += 1;
            }
            let word = &body[start..k];
            match params.iter().position(|p| *p == word) {
                Some(index) if !bytes[start].is_ascii_digit() => {
                    if !text.is_empty() {
                        pieces.push(Piece::Text(std::mem::take(&mut text)));
                    }
                    pieces.push(Piece::Param(index));
                }
                _ => text.push_str(word),
            }
        }
        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Macro { arity: params.len(), body: pieces }
    }

    pub(super) fn arity(&self) -> usize {
        self.arity
    }

    /// The body with each parameter replaced by its parenthesized argument.
    pub(super) fn expand(&self, args: &[&str]) -> String {
        let mut out = String::new();
        for piece in &self.body {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Param(k) => {
                    out.push('(');
                    out.push_str(args[*k]);
                    out.push(')');
                }
            }
        }
        out
    }
}

#[derive(Debug, Default)]
pub(super) struct MacroTable {
    macros: HashMap<String, Macro>,
}

impl MacroTable {
    /// Define or redefine `name`; a redefinition must keep the arity.
    pub(super) fn define(&mut self, name: &str, m: Macro) -> std::result::Result<(), usize> {
        match self.macros.get(name) {
            Some(existing) if existing.arity != m.arity => Err(existing.arity),
            _ => {
                self.macros.insert(name.to_string(), m);
                Ok(())
            }
        }
    }

    pub(super) fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }
}

fn is_param(p: &str) -> bool {
    is_identifier(p) || (p.len() > 1 && p.starts_with('#') && p[1..].bytes().all(|b| b.is_ascii_digit()))
}

impl Compiler<'_> {
    /// Register a macro when the left-hand side of `=` reads `name(params)`.
    pub(super) fn macro_definition(
        &mut self,
        src: &Annotated,
        (ls, le): (usize, usize),
        (bs, be): (usize, usize),
    ) -> Result<Option<Slot>> {
        let lhs = src.str(ls, le);
        let Some(caps) = HEADER.as_ref().and_then(|re| re.captures(lhs)) else {
            return Ok(None);
        };
        let name = caps.get(1).map_or("", |m| m.as_str());
        if matches!(name, "i" | "j" | "I" | "J") {
            return Ok(None);
        }
        let list = caps.get(2).map_or("", |m| m.as_str()).trim();
        let params: Vec<&str> = if list.is_empty() { Vec::new() } else { list.split(',').map(str::trim).collect() };
        if !params.iter().all(|p| is_param(p)) {
            return Ok(None);
        }
        if builtins::is_builtin(name) {
            return Err(self.error(
                src,
                ls,
                le,
                "PXF-R005",
                format!("macro '{name}'"),
                "cannot redefine a built-in function",
            ));
        }
        let (bs, be) = src.trim_blanks(bs, be);
        let m = Macro::new(&params, src.str(bs, be));
        if let Err(arity) = self.macros.define(name, m) {
            return Err(self.error(
                src,
                ls,
                le,
                "PXF-R005",
                format!("macro '{name}'"),
                format!("already defined with {arity} arguments, redefined with {}", params.len()),
            ));
        }
        log::trace!("macro '{name}' defined with {} arguments", params.len());
        Ok(Some(reserved::NAN))
    }

    /// Compile a call to a user macro; errors inside the expansion point at the call.
    pub(super) fn expand_macro(
        &mut self,
        src: &Annotated,
        (ss, se): (usize, usize),
        name: &str,
        args: &[(usize, usize)],
        depth: usize,
    ) -> Result<Option<Slot>> {
        let Some(m) = self.macros.get(name) else {
            return Ok(None);
        };
        if m.arity() != args.len() {
            let arity = m.arity();
            return Err(self.error(
                src,
                ss,
                se,
                "PXF-R005",
                format!("macro '{name}'"),
                format!("expects {arity} arguments, got {}", args.len()),
            ));
        }
        let texts: Vec<&str> = args.iter().map(|&(s, e)| src.str(s, e)).collect();
        let text = m.expand(&texts);
        log::trace!("expand {name}({}) -> {text}", texts.join(","));
        let snippet_len = self.settings.snippet_len;
        let reanchor = |e: super::CompileError| {
            e.at(src.text(), Span::new(ss, se), snippet_len).with_note(format!("in macro '{name}'"))
        };
        let inner = Annotated::new(&text).map_err(reanchor)?;
        let slot = self.expr(&inner, 0, inner.len(), depth + 1).map_err(reanchor)?;
        Ok(Some(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_are_substituted_whole_words_only() {
        let m = Macro::new(&["x"], "x*x + xx + 2x");
        assert_eq!(m.expand(&["a+1"]), "(a+1)*(a+1) + xx + 2x");
    }

    #[test]
    fn strings_are_left_alone() {
        let m = Macro::new(&["a"], "print('a') + a");
        assert_eq!(m.expand(&["3"]), "print('a') + (3)");
    }

    #[test]
    fn numbered_parameters() {
        let m = Macro::new(&["#0", "#1"], "#0-#1");
        assert_eq!(m.arity(), 2);
        assert_eq!(m.expand(&["5", "2"]), "(5)-(2)");
    }

    #[test]
    fn redefinition_keeps_arity() {
        let mut table = MacroTable::default();
        assert!(table.define("f", Macro::new(&["x"], "x")).is_ok());
        assert!(table.define("f", Macro::new(&["y"], "y+1")).is_ok());
        assert_eq!(table.define("f", Macro::new(&["a", "b"], "a")), Err(1));
    }
}
