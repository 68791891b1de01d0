//! Precedence compiler.
//!
//! There is no token stream or syntax tree: every step looks at a substring `[ss, se)` of the
//! annotated formula, finds the lowest-precedence operator sitting at the substring's own nesting
//! level, compiles both sides recursively and emits the instruction combining them. Each call
//! returns the arena slot holding its value.

mod access;
mod builtins;
mod error;
mod fold;
mod macros;
mod target;

pub use error::{CompileError, ErrorKind, Result};

use std::collections::HashMap;

use parking_lot::ReentrantMutex;

use crate::arena::{Arena, Mutable, Slot, reserved};
use crate::config::Settings;
use crate::image::{Image, Images, Stats};
use crate::levels::Annotated;
use crate::literal;
use crate::source::Span;
use crate::vm::{Binary, CompiledProgram, Complex, Instr, Part, Program, Unary};
use macros::MacroTable;

#[derive(Debug, Clone, Copy)]
struct Variable {
    slot: Slot,
    constant: bool,
}

/// A binary operator as written: real, or the doubled complex form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Real(Binary),
    Complex(Complex),
}

impl Op {
    fn symbol(self) -> &'static str {
        match self {
            Op::Real(op) => op.symbol(),
            Op::Complex(op) => op.symbol(),
        }
    }
}

/// What is being compiled, for error reports.
#[derive(Clone, Copy)]
struct Site<'s> {
    src: &'s Annotated,
    start: usize,
    end: usize,
    context: &'s str,
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

struct Compiler<'c> {
    arena: Arena,
    code: Vec<Instr>,
    begin: Vec<Instr>,
    end: Vec<Instr>,
    /// Instructions below this index belong to closed regions and are never rewritten.
    fence: usize,
    variables: HashMap<String, Variable>,
    macros: MacroTable,
    image: Option<&'c Image>,
    lists: Vec<[usize; 4]>,
    stats: Option<Stats>,
    settings: &'c Settings,
    parallel: bool,
}

/// Compile `expression` against the metadata of `images`.
pub fn compile(expression: &str, images: &Images<'_>, settings: &Settings) -> Result<CompiledProgram> {
    let src = Annotated::new(expression).map_err(|e| {
        let span = e.span;
        e.at(expression, span, settings.snippet_len)
    })?;
    let image = images.reader();
    let lists = (0..images.list_len())
        .filter_map(|k| images.list_reader(k as f64).map(Image::dims))
        .collect();
    let mut compiler = Compiler::new(image, lists, settings);
    let result = compiler.expr(&src, 0, src.len(), 0)?;
    Ok(compiler.finish(result))
}

impl<'c> Compiler<'c> {
    fn new(image: Option<&'c Image>, lists: Vec<[usize; 4]>, settings: &'c Settings) -> Compiler<'c> {
        let mut arena = Arena::new(image.map_or([0; 4], Image::dims));
        let values = arena.values_mut();
        values[reserved::INTERPOLATION as usize] = settings.interpolation.code();
        values[reserved::BOUNDARY as usize] = settings.boundary.code();
        Compiler {
            arena,
            code: Vec::new(),
            begin: Vec::new(),
            end: Vec::new(),
            fence: 0,
            variables: HashMap::new(),
            macros: MacroTable::default(),
            image,
            lists,
            stats: None,
            settings,
            parallel: true,
        }
    }

    fn finish(self, result: Slot) -> CompiledProgram {
        log::debug!(
            "compiled: begin={} main={} end={} instructions, arena={} slots, parallel={}",
            self.begin.len(),
            self.code.len(),
            self.end.len(),
            self.arena.len(),
            self.parallel
        );
        let program = Program {
            result,
            result_len: self.arena.len_of(result),
            result_kind: self.arena.kind(result),
            begin: self.begin,
            main: self.code,
            end: self.end,
            template: self.arena.into_values(),
            parallel: self.parallel,
            critical: ReentrantMutex::new(()),
        };
        CompiledProgram::new(program, self.settings.seed)
    }

    // ---- errors ----

    fn error(
        &self,
        src: &Annotated,
        start: usize,
        end: usize,
        code: &'static str,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> CompileError {
        CompileError::new(code, context, message).at(src.text(), Span::new(start, end), self.settings.snippet_len)
    }

    fn site_error(&self, site: &Site<'_>, code: &'static str, message: impl Into<String>) -> CompileError {
        self.error(site.src, site.start, site.end, code, site.context, message)
    }

    fn expect_scalar(&self, slot: Slot, site: &Site<'_>) -> Result<()> {
        match self.arena.len_of(slot) {
            0 => Ok(()),
            n => Err(self.site_error(site, "PXF-T001", format!("expected a scalar, found a vector of size {n}"))),
        }
    }

    fn expect_vector(&self, slot: Slot, site: &Site<'_>) -> Result<u32> {
        match self.arena.len_of(slot) {
            0 => Err(self.site_error(site, "PXF-T001", "expected a vector, found a scalar")),
            n => Ok(n),
        }
    }

    fn expect_const(&self, slot: Slot, site: &Site<'_>) -> Result<f64> {
        if self.arena.is_const(slot) && !self.arena.is_vector(slot) {
            Ok(self.arena.value(slot))
        } else {
            Err(self.site_error(site, "PXF-T004", "expected a constant scalar"))
        }
    }

    /// Check a vector length derived from constants against `max_vector_len`.
    fn capped(&self, len: Option<u64>, site: &Site<'_>) -> Result<u32> {
        let max = self.settings.max_vector_len;
        match len {
            Some(n) if n <= u64::from(max) => Ok(n as u32),
            Some(n) => Err(self.site_error(site, "PXF-T004", format!("vector size {n} exceeds the limit of {max}"))),
            None => Err(self.site_error(site, "PXF-T004", format!("vector size exceeds the limit of {max}"))),
        }
    }

    // ---- emission ----

    /// Emit an instruction without folding.
    fn push(&mut self, instr: Instr) {
        self.code.push(instr);
    }

    /// Emit a placeholder for a forward skip, jump or critical region; closed by [`Self::close`].
    fn open(&mut self, instr: Instr) -> usize {
        self.code.push(instr);
        self.code.len() - 1
    }

    /// Set the length of the region opened at `pos` to everything emitted since.
    fn close(&mut self, pos: usize) {
        let count = (self.code.len() - pos - 1) as u32;
        self.code[pos] = match self.code[pos] {
            Instr::Skip { cond, when, .. } => Instr::Skip { cond, when, count },
            Instr::Jump { .. } => Instr::Jump { count },
            Instr::Critical { .. } => Instr::Critical { count },
            ref other => other.clone(),
        };
        self.fence = self.code.len();
    }

    /// Copy a value of any shape into `dst`.
    fn copy_into(&mut self, dst: Mutable, src: Slot) {
        let dst = dst.slot();
        if dst == src {
            return;
        }
        match self.arena.len_of(src) {
            0 => self.push(Instr::Copy { dst, src }),
            len => self.push(Instr::CopyVec { dst, src, len }),
        }
    }

    fn serial(&mut self, reason: &str) {
        if self.parallel {
            log::debug!("program is not parallelizable: {reason}");
        }
        self.parallel = false;
    }

    fn stats(&mut self) -> Stats {
        *self.stats.get_or_insert_with(|| self.image.map_or_else(Stats::empty, Image::stats))
    }

    /// Compile `body` into another segment; the value in place is NaN.
    fn segment(&mut self, which: Segment, src: &Annotated, ss: usize, se: usize, depth: usize) -> Result<Slot> {
        let target = match which {
            Segment::Begin => &mut self.begin,
            Segment::End => &mut self.end,
        };
        let saved = std::mem::replace(&mut self.code, std::mem::take(target));
        let saved_fence = std::mem::replace(&mut self.fence, self.code.len());
        let result = self.expr(src, ss, se, depth);
        let compiled = std::mem::replace(&mut self.code, saved);
        self.fence = saved_fence;
        match which {
            Segment::Begin => self.begin = compiled,
            Segment::End => self.end = compiled,
        }
        result?;
        Ok(reserved::NAN)
    }

    // ---- the recursive procedure ----

    fn expr(&mut self, src: &Annotated, ss: usize, se: usize, depth: usize) -> Result<Slot> {
        let (ss, se) = src.trim(ss, se);
        if depth > self.settings.max_depth {
            return Err(self.error(
                src,
                ss,
                se,
                "PXF-S005",
                "expression",
                format!("nesting exceeds the limit of {}", self.settings.max_depth),
            ));
        }
        if ss >= se {
            return Err(self.error(src, ss, ss, "PXF-S003", "expression", "empty expression"));
        }
        let depth = depth + 1;
        let text = src.str(ss, se);
        if let Some(v) = literal::parse(text) {
            return Ok(self.arena.constant(v));
        }
        if is_identifier(text) {
            return self.name(src, ss, se, text);
        }

        let level = src.level(ss);
        let statements = src.split(ss, se, b';', level);
        if statements.len() > 1 {
            let mut last = reserved::NAN;
            for (s, e) in statements {
                let (s, e) = src.trim(s, e);
                if s < e {
                    last = self.expr(src, s, e, depth)?;
                }
            }
            return Ok(last);
        }

        if let Some(rest) = text.strip_prefix("const") {
            if rest.starts_with(|c: char| c.is_ascii_whitespace()) {
                return self.const_declaration(src, ss + "const".len(), se, depth);
            }
        }
        if let Some((op_start, eq, op)) = target::find_assignment(src, ss, se, level) {
            return self.assign(src, ss, op_start, eq, se, op, depth);
        }
        self.operators(src, ss, se, level, depth)
    }

    fn name(&mut self, src: &Annotated, ss: usize, se: usize, name: &str) -> Result<Slot> {
        if let Some(r) = access::reserved(name) {
            return self.reserved(r, src, ss, se);
        }
        match self.variables.get(name) {
            Some(var) => Ok(var.slot),
            None => Err(self.error(src, ss, se, "PXF-R001", format!("variable '{name}'"), "undefined variable")),
        }
    }

    fn operators(&mut self, src: &Annotated, ss: usize, se: usize, level: u32, depth: usize) -> Result<Slot> {
        let at = |i: usize| src.byte(i);
        let top = |s: usize| src.level(s) == level;

        // ternary: first '?' and its matching ':'
        if let Some(q) = (ss + 1..se).find(|&s| at(s) == b'?' && top(s)) {
            let mut nested = 0;
            let colon = (q + 1..se).filter(|&s| top(s)).find(|&s| match at(s) {
                b'?' => {
                    nested += 1;
                    false
                }
                b':' if nested == 0 => true,
                b':' => {
                    nested -= 1;
                    false
                }
                _ => false,
            });
            let Some(colon) = colon else {
                return Err(self.error(src, ss, se, "PXF-S007", "operator '?:'", "missing ':' in conditional"));
            };
            return self.conditional(src, (ss, q), (q + 1, colon), (colon + 1, se), depth);
        }

        if let Some((os, oe)) = rfind(src, ss, se, level, |s| (at(s) == b'|' && at(s - 1) == b'|').then_some((s - 1, s + 1)))
        {
            return self.logical(src, (ss, os), (oe, se), false, depth);
        }
        if let Some((os, oe)) = rfind(src, ss, se, level, |s| (at(s) == b'&' && at(s - 1) == b'&').then_some((s - 1, s + 1)))
        {
            return self.logical(src, (ss, os), (oe, se), true, depth);
        }
        for (byte, op) in [(b'|', Binary::BitOr), (b'&', Binary::BitAnd)] {
            let found = rfind(src, ss, se, level, |s| {
                (at(s) == byte && at(s - 1) != byte && at(s + 1) != byte).then_some((s, s + 1))
            });
            if let Some((os, oe)) = found {
                return self.binary_split(src, (ss, os), (oe, se), Op::Real(op), depth);
            }
        }

        let equality = rfind(src, ss, se, level, |s| match (at(s - 1), at(s)) {
            (b'=', b'=') => Some((s - 1, s + 1, Binary::Eq)),
            (b'!', b'=') => Some((s - 1, s + 1, Binary::Ne)),
            _ => None,
        });
        if let Some((os, oe, op)) = equality {
            return self.binary_split(src, (ss, os), (oe, se), Op::Real(op), depth);
        }

        let relational = rfind(src, ss, se, level, |s| {
            let (p, b) = (at(s - 1), at(s));
            match b {
                b'=' if matches!(p, b'<' | b'>') && at(s.wrapping_sub(2)) != p => {
                    Some((s - 1, s + 1, if p == b'<' { Binary::Le } else { Binary::Ge }))
                }
                b'<' | b'>' if at(s + 1) != b'=' && at(s + 1) != b && p != b => {
                    Some((s, s + 1, if b == b'<' { Binary::Lt } else { Binary::Gt }))
                }
                _ => None,
            }
        });
        if let Some((os, oe, op)) = relational {
            return self.binary_split(src, (ss, os), (oe, se), Op::Real(op), depth);
        }

        let shift = rfind(src, ss, se, level, |s| {
            let b = at(s);
            (matches!(b, b'<' | b'>') && at(s - 1) == b && at(s.wrapping_sub(2)) != b)
                .then(|| (s - 1, s + 1, if b == b'<' { Binary::Shl } else { Binary::Shr }))
        });
        if let Some((os, oe, op)) = shift {
            return self.binary_split(src, (ss, os), (oe, se), Op::Real(op), depth);
        }

        let additive = rfind(src, ss, se, level, |s| {
            let b = at(s);
            if !matches!(b, b'+' | b'-') || at(s + 1) == b || at(s - 1) == b {
                return None;
            }
            let p = src.prev_nonblank(s).filter(|&p| p >= ss)?;
            if !ends_operand(src, ss, p) || is_exponent(src, ss, s) {
                return None;
            }
            Some((s, s + 1, if b == b'+' { Binary::Add } else { Binary::Sub }))
        });
        if let Some((os, oe, op)) = additive {
            return self.binary_split(src, (ss, os), (oe, se), Op::Real(op), depth);
        }

        let multiplicative = rfind(src, ss, se, level, |s| match at(s) {
            b'*' if at(s - 1) == b'*' => Some((s - 1, s + 1, Op::Complex(Complex::Mul))),
            b'/' if at(s - 1) == b'/' => Some((s - 1, s + 1, Op::Complex(Complex::Div))),
            b'*' if at(s + 1) != b'*' => Some((s, s + 1, Op::Real(Binary::Mul))),
            b'/' if at(s + 1) != b'/' => Some((s, s + 1, Op::Real(Binary::Div))),
            b'%' => {
                let (rest, end) = src.trim_blanks(s + 1, se);
                (rest < end).then_some((s, s + 1, Op::Real(Binary::Mod)))
            }
            _ => None,
        });
        if let Some((os, oe, op)) = multiplicative {
            return self.binary_split(src, (ss, os), (oe, se), op, depth);
        }

        // prefix and postfix operators
        let first = at(ss);
        if matches!(first, b'+' | b'-') && at(ss + 1) == first {
            let op = if first == b'+' { Binary::Add } else { Binary::Sub };
            return self.increment(src, (ss, se), (ss + 2, se), op, false, depth);
        }
        if se - ss > 2 && matches!(at(se - 1), b'+' | b'-') && at(se - 2) == at(se - 1) {
            let op = if at(se - 1) == b'+' { Binary::Add } else { Binary::Sub };
            return self.increment(src, (ss, se), (ss, se - 2), op, true, depth);
        }
        if matches!(first, b'+' | b'-' | b'!' | b'~') {
            let a = self.expr(src, ss + 1, se, depth)?;
            let context = format!("operator '{}'", first as char);
            let site = Site { src, start: ss, end: se, context: &context };
            return match first {
                b'+' => Ok(a),
                b'-' => Ok(self.unary(Unary::Neg, a)),
                b'!' => {
                    self.expect_scalar(a, &site)?;
                    Ok(self.unary(Unary::Not, a))
                }
                _ => Ok(self.unary(Unary::BitNot, a)),
            };
        }

        // power: leftmost, so right associative
        if let Some(s) = (ss + 1..se).find(|&s| at(s) == b'^' && top(s)) {
            let (oe, op) = if at(s + 1) == b'^' {
                (s + 2, Op::Complex(Complex::Pow))
            } else {
                (s + 1, Op::Real(Binary::Pow))
            };
            return self.binary_split(src, (ss, s), (oe, se), op, depth);
        }

        self.primary(src, ss, se, depth)
    }

    fn primary(&mut self, src: &Annotated, ss: usize, se: usize, depth: usize) -> Result<Slot> {
        let last = src.byte(se - 1);
        if last == b'%' {
            let a = self.expr(src, ss, se - 1, depth)?;
            let hundred = self.arena.constant(100.0);
            let site = Site { src, start: ss, end: se, context: "percentage" };
            return self.binary(Binary::Div, a, hundred, &site);
        }
        if last == b']' {
            if let Some(open) = src.partner(se - 1) {
                if open == ss {
                    return self.vector_literal(src, ss, se, depth);
                }
                let (ps, pe) = src.trim_blanks(ss, open);
                let prefix = src.str(ps, pe);
                if access::accessor(prefix).is_some() {
                    return self.read_pixel(src, (ss, se), prefix, open, depth);
                }
                return self.subscript(src, (ss, se), (ps, pe), open, depth);
            }
        }
        if last == b')' {
            if let Some(open) = src.partner(se - 1) {
                let (ps, pe) = src.trim_blanks(ss, open);
                let name = src.str(ps, pe);
                if is_identifier(name) {
                    return self.call(src, (ss, se), name, open, depth);
                }
            }
        }
        if src.byte(ss) == b'\'' && src.partner(ss) == Some(se - 1) {
            return self.string_literal(src, ss, se);
        }
        Err(self.error(src, ss, se, "PXF-S004", "expression", "invalid expression"))
    }

    fn binary_split(
        &mut self,
        src: &Annotated,
        (ls, le): (usize, usize),
        (rs, re): (usize, usize),
        op: Op,
        depth: usize,
    ) -> Result<Slot> {
        let a = self.expr(src, ls, le, depth)?;
        let b = self.expr(src, rs, re, depth)?;
        let context = format!("operator '{}'", op.symbol());
        let site = Site { src, start: ls, end: re, context: &context };
        self.operator(op, a, b, &site)
    }

    fn operator(&mut self, op: Op, a: Slot, b: Slot, site: &Site<'_>) -> Result<Slot> {
        match op {
            Op::Real(op) => self.binary(op, a, b, site),
            Op::Complex(op) => self.complex(op, a, b, site),
        }
    }

    fn logical(
        &mut self,
        src: &Annotated,
        (ls, le): (usize, usize),
        (rs, re): (usize, usize),
        and: bool,
        depth: usize,
    ) -> Result<Slot> {
        let context = if and { "operator '&&'" } else { "operator '||'" };
        let site = Site { src, start: ls, end: re, context };
        let a = self.expr(src, ls, le, depth)?;
        self.expect_scalar(a, &site)?;
        if self.arena.is_const(a) {
            let truthy = self.arena.value(a) != 0.0;
            if truthy != and {
                return Ok(self.arena.constant(truthy as u8 as f64));
            }
            let b = self.expr(src, rs, re, depth)?;
            self.expect_scalar(b, &site)?;
            return Ok(self.unary(Unary::Bool, b));
        }
        let dst = self.arena.scalar();
        self.push(Instr::Unary { op: Unary::Bool, dst: dst.slot(), a });
        let skip = self.open(Instr::Skip { cond: dst.slot(), when: !and, count: 0 });
        let b = self.expr(src, rs, re, depth)?;
        self.expect_scalar(b, &site)?;
        self.push(Instr::Unary { op: Unary::Bool, dst: dst.slot(), a: b });
        self.close(skip);
        Ok(dst.slot())
    }

    /// `cond ? a : b`, also reached through `if(cond, a, b)`.
    fn conditional(
        &mut self,
        src: &Annotated,
        (cs, ce): (usize, usize),
        (ts, te): (usize, usize),
        (es, ee): (usize, usize),
        depth: usize,
    ) -> Result<Slot> {
        let site = Site { src, start: cs, end: ee, context: "operator '?:'" };
        let cond = self.expr(src, cs, ce, depth)?;
        self.expect_scalar(cond, &site)?;
        if self.arena.is_const(cond) {
            return if self.arena.value(cond) != 0.0 {
                self.expr(src, ts, te, depth)
            } else {
                self.expr(src, es, ee, depth)
            };
        }
        let skip = self.open(Instr::Skip { cond, when: false, count: 0 });
        let then = self.expr(src, ts, te, depth)?;
        let len = self.arena.len_of(then);
        let dst = self.arena.temp(len);
        self.copy_into(dst, then);
        let jump = self.open(Instr::Jump { count: 0 });
        self.close(skip);
        let other = self.expr(src, es, ee, depth)?;
        if self.arena.len_of(other) != len {
            return Err(self.site_error(
                &site,
                "PXF-T002",
                format!(
                    "branches have different shapes ({} and {})",
                    shape_name(len),
                    shape_name(self.arena.len_of(other))
                ),
            ));
        }
        self.copy_into(dst, other);
        self.close(jump);
        Ok(dst.slot())
    }

    fn vector_literal(&mut self, src: &Annotated, ss: usize, se: usize, depth: usize) -> Result<Slot> {
        let args = src.arguments(ss);
        if args.is_empty() {
            return Err(self.error(src, ss, se, "PXF-S003", "vector literal", "empty vector"));
        }
        let mut parts = Vec::with_capacity(args.len());
        for (s, e) in args {
            let slot = self.expr(src, s, e, depth)?;
            parts.push(Part { slot, len: self.arena.len_of(slot) });
        }
        Ok(self.concat(&parts))
    }

    /// Concatenate scalars and vectors into a new vector.
    fn concat(&mut self, parts: &[Part]) -> Slot {
        if parts.iter().all(|p| self.arena.is_const(p.slot)) {
            let mut values = Vec::new();
            for p in parts {
                if p.len == 0 {
                    values.push(self.arena.value(p.slot));
                } else {
                    values.extend_from_slice(self.arena.components(p.slot));
                }
            }
            return self.arena.constant_vector(&values);
        }
        let total = parts.iter().map(|p| p.len.max(1)).sum();
        let dst = self.arena.vector(total);
        self.compute(Instr::Concat { dst: dst.slot(), parts: parts.iter().copied().collect() })
    }

    fn string_literal(&mut self, src: &Annotated, ss: usize, se: usize) -> Result<Slot> {
        let bytes = unescape(&src.bytes()[ss + 1..se - 1]);
        match bytes.len() {
            0 => Err(self.error(src, ss, se, "PXF-S003", "string literal", "empty string")),
            1 => Ok(self.arena.constant(bytes[0] as f64)),
            _ => {
                let values: Vec<f64> = bytes.iter().map(|&b| b as f64).collect();
                Ok(self.arena.constant_vector(&values))
            }
        }
    }

    /// `V[k]` or `V[start, length, step]` on a vector-valued expression.
    fn subscript(
        &mut self,
        src: &Annotated,
        (ss, se): (usize, usize),
        (ps, pe): (usize, usize),
        open: usize,
        depth: usize,
    ) -> Result<Slot> {
        let site = Site { src, start: ss, end: se, context: "operator '[]'" };
        let base = self.expr(src, ps, pe, depth)?;
        let len = self.expect_vector(base, &site)?;
        let args = src.arguments(open);
        match args.len() {
            1 => {
                let index = self.expr(src, args[0].0, args[0].1, depth)?;
                self.expect_scalar(index, &site)?;
                if self.arena.is_const(index) {
                    let k = self.const_index(index, len, &site)?;
                    if self.arena.is_const(base) {
                        let v = self.arena.components(base)[k as usize];
                        return Ok(self.arena.constant(v));
                    }
                    return Ok(base + 1 + k);
                }
                let dst = self.arena.scalar();
                Ok(self.compute(Instr::Index { dst: dst.slot(), base, len, index }))
            }
            2 | 3 => {
                let start = self.expr(src, args[0].0, args[0].1, depth)?;
                self.expect_scalar(start, &site)?;
                let count = self.expr(src, args[1].0, args[1].1, depth)?;
                let count = self.expect_const(count, &site)?;
                if !(count >= 1.0) {
                    return Err(self.site_error(&site, "PXF-T004", "slice length must be at least 1"));
                }
                let step = match args.get(2) {
                    Some(&(s, e)) => self.expr(src, s, e, depth)?,
                    None => reserved::ONE,
                };
                self.expect_scalar(step, &site)?;
                let count = self.capped(Some(count as u64), &site)?;
                let dst = self.arena.vector(count);
                Ok(self.compute(Instr::Slice { dst: dst.slot(), base, len, start, step, count }))
            }
            n => Err(self.site_error(&site, "PXF-S006", format!("expected 1 to 3 subscripts, got {n}"))),
        }
    }

    /// Bounds-checked value of a constant vector index.
    fn const_index(&self, index: Slot, len: u32, site: &Site<'_>) -> Result<u32> {
        let k = self.arena.value(index).trunc();
        if k >= 0.0 && k < len as f64 {
            Ok(k as u32)
        } else {
            Err(self.site_error(site, "PXF-R004", format!("index {k} is out of bounds for a vector of size {len}")))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Segment {
    Begin,
    End,
}

fn shape_name(len: u32) -> String {
    if len == 0 { "scalar".to_string() } else { format!("vector of size {len}") }
}

fn rfind<T>(
    src: &Annotated,
    ss: usize,
    se: usize,
    level: u32,
    matcher: impl FnMut(usize) -> Option<T>,
) -> Option<T> {
    (ss + 1..se).rev().filter(|&s| src.level(s) == level).find_map(matcher)
}

/// Whether the byte at `p` can end an operand, making a following `+`/`-` binary.
fn ends_operand(src: &Annotated, ss: usize, p: usize) -> bool {
    let b = src.byte(p);
    match b {
        b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'_' | b')' | b']' | b'\'' | b'.' => true,
        b'%' => p > ss && matches!(src.byte(p - 1), b'0'..=b'9' | b'.'),
        b'+' | b'-' => p > ss && src.byte(p - 1) == b,
        _ => false,
    }
}

/// Whether the sign at `s` belongs to the exponent of a literal such as `1e-3`.
fn is_exponent(src: &Annotated, ss: usize, s: usize) -> bool {
    if s < ss + 2 || !matches!(src.byte(s - 1), b'e' | b'E') {
        return false;
    }
    let mut k = s - 1;
    let mut digits = 0;
    while k > ss && matches!(src.byte(k - 1), b'0'..=b'9' | b'.') {
        k -= 1;
        digits += src.byte(k).is_ascii_digit() as usize;
    }
    digits > 0 && (k == ss || !matches!(src.byte(k - 1), b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'0'..=b'9'))
}

fn unescape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(&b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b't') => out.push(b'\t'),
            Some(&other) => out.push(other),
            None => out.push(b'\\'),
        }
    }
    out
}
