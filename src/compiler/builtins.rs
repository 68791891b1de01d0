//! Built-in function catalog.

use std::ops::RangeInclusive;

use super::{Compiler, Result, Segment, Site, access};
use crate::arena::{Slot, reserved};
use crate::levels::Annotated;
use crate::vm::{Binary, ComplexUnary, Dist, ImageRef, Instr, Matrix, Part, Reduce, Ternary, Unary};

const FUNCTIONS: &[&str] = &[
    "atan2", "hypot", "pow", "fmod", "gauss", "cut", "lerp", "if", "size", "dot", "cross", "norm", "normalize",
    "reverse", "det", "inv", "trace", "diag", "eye", "transpose", "mul", "u", "g", "srand", "date", "print",
    "echo", "debug", "begin", "end", "break", "continue", "critical", "crop",
];

/// `vectorN` names carry their size.
fn vector_size(name: &str) -> Option<u32> {
    name.strip_prefix("vector")?.parse().ok().filter(|&n| n > 0)
}

pub(super) fn is_builtin(name: &str) -> bool {
    FUNCTIONS.contains(&name)
        || Unary::from_name(name).is_some()
        || Reduce::from_name(name).is_some()
        || ComplexUnary::from_name(name).is_some()
        || vector_size(name).is_some()
}

fn square_side(len: u32) -> Option<u32> {
    let n = (len as f64).sqrt().round() as u32;
    (n > 0 && n * n == len).then_some(n)
}

impl Compiler<'_> {
    fn arity(&self, site: &Site<'_>, got: usize, expected: RangeInclusive<usize>) -> Result<()> {
        if expected.contains(&got) {
            return Ok(());
        }
        let (lo, hi) = (*expected.start(), *expected.end());
        let wanted = match (lo, hi) {
            _ if lo == hi => format!("{lo}"),
            (_, usize::MAX) => format!("at least {lo}"),
            _ => format!("{lo} to {hi}"),
        };
        Err(self.site_error(site, "PXF-S006", format!("expected {wanted} arguments, got {got}")))
    }

    fn matrix(&mut self, op: Matrix, a: Slot, b: Slot) -> Slot {
        let dst = self.arena.temp(op.output_len());
        self.compute(Instr::Matrix { op, dst: dst.slot(), a, b })
    }

    /// `name(args)`: accessors, user macros, then the built-ins.
    pub(super) fn call(
        &mut self,
        src: &Annotated,
        (ss, se): (usize, usize),
        name: &str,
        open: usize,
        depth: usize,
    ) -> Result<Slot> {
        if access::accessor(name).is_some() {
            return self.read_pixel(src, (ss, se), name, open, depth);
        }
        let args = src.arguments(open);
        if let Some(slot) = self.expand_macro(src, (ss, se), name, &args, depth)? {
            return Ok(slot);
        }
        let context = format!("function '{name}()'");
        let site = Site { src, start: ss, end: se, context: &context };

        // forms that compile their arguments themselves
        match name {
            "if" => {
                self.arity(&site, args.len(), 3..=3)?;
                return self.conditional(src, args[0], args[1], args[2], depth);
            }
            "begin" | "end" => {
                self.arity(&site, args.len(), 1..=1)?;
                let which = if name == "begin" { Segment::Begin } else { Segment::End };
                return self.segment(which, src, args[0].0, args[0].1, depth);
            }
            "critical" => {
                self.arity(&site, args.len(), 1..=1)?;
                let region = self.open(Instr::Critical { count: 0 });
                let value = self.expr(src, args[0].0, args[0].1, depth)?;
                self.close(region);
                return Ok(value);
            }
            "break" | "continue" => {
                self.arity(&site, args.len(), 0..=0)?;
                self.push(if name == "break" { Instr::Break } else { Instr::Continue });
                return Ok(reserved::NAN);
            }
            "crop" => return self.crop(src, &args, depth, &site),
            _ => {}
        }

        let mut values = Vec::with_capacity(args.len());
        for &(s, e) in &args {
            values.push(self.expr(src, s, e, depth)?);
        }

        if let Some(op) = Unary::from_name(name) {
            self.arity(&site, values.len(), 1..=1)?;
            return Ok(self.unary(op, values[0]));
        }
        if let Some(op) = Reduce::from_name(name) {
            self.arity(&site, values.len(), 1..=usize::MAX)?;
            return Ok(self.reduce(op, &values));
        }
        if let Some(op) = ComplexUnary::from_name(name) {
            self.arity(&site, values.len(), 1..=1)?;
            let a = self.complex_operand(values[0], &site)?;
            let dst = self.arena.temp(if op.is_pair() { 2 } else { 0 });
            return Ok(self.compute(Instr::ComplexUnary { op, dst: dst.slot(), a }));
        }
        if let Some(n) = vector_size(name) {
            let n = self.capped(Some(u64::from(n)), &site)?;
            return Ok(self.cyclic_vector(n, &values));
        }

        match name {
            "atan2" | "hypot" | "pow" | "fmod" | "gauss" => {
                self.arity(&site, values.len(), 2..=2)?;
                let op = match name {
                    "atan2" => Binary::Atan2,
                    "hypot" => Binary::Hypot,
                    "pow" => Binary::Pow,
                    "fmod" => Binary::Fmod,
                    _ => Binary::Gauss,
                };
                self.binary(op, values[0], values[1], &site)
            }
            "cut" | "lerp" => {
                self.arity(&site, values.len(), 3..=3)?;
                for &v in &values {
                    self.expect_scalar(v, &site)?;
                }
                let op = if name == "cut" { Ternary::Cut } else { Ternary::Lerp };
                let dst = self.arena.scalar();
                Ok(self.compute(Instr::Ternary { op, dst: dst.slot(), a: values[0], b: values[1], c: values[2] }))
            }
            "size" => {
                self.arity(&site, values.len(), 1..=1)?;
                let len = self.arena.len_of(values[0]);
                Ok(self.arena.constant(len as f64))
            }
            "dot" => {
                self.arity(&site, values.len(), 2..=2)?;
                let n = self.expect_vector(values[0], &site)?;
                if self.arena.len_of(values[1]) != n {
                    return Err(self.site_error(&site, "PXF-T002", "dot() needs two vectors of the same size"));
                }
                Ok(self.matrix(Matrix::Dot { n }, values[0], values[1]))
            }
            "cross" => {
                self.arity(&site, values.len(), 2..=2)?;
                if self.arena.len_of(values[0]) != 3 || self.arena.len_of(values[1]) != 3 {
                    return Err(self.site_error(&site, "PXF-T002", "cross() needs two vectors of size 3"));
                }
                Ok(self.matrix(Matrix::Cross, values[0], values[1]))
            }
            "norm" => {
                self.arity(&site, values.len(), 1..=1)?;
                match self.arena.len_of(values[0]) {
                    0 => Ok(self.unary(Unary::Abs, values[0])),
                    n => Ok(self.matrix(Matrix::Norm { n }, values[0], reserved::ZERO)),
                }
            }
            "normalize" | "reverse" | "diag" => {
                self.arity(&site, values.len(), 1..=1)?;
                let n = self.expect_vector(values[0], &site)?;
                let op = match name {
                    "normalize" => Matrix::Normalize { n },
                    "reverse" => Matrix::Reverse { n },
                    _ => Matrix::Diag { n },
                };
                Ok(self.matrix(op, values[0], reserved::ZERO))
            }
            "det" | "inv" | "trace" => {
                self.arity(&site, values.len(), 1..=1)?;
                let len = self.expect_vector(values[0], &site)?;
                let Some(n) = square_side(len) else {
                    return Err(self.site_error(&site, "PXF-T002", format!("a vector of size {len} is not a square matrix")));
                };
                let op = match name {
                    "det" => Matrix::Det { n },
                    "inv" => Matrix::Inv { n },
                    _ => Matrix::Trace { n },
                };
                Ok(self.matrix(op, values[0], reserved::ZERO))
            }
            "eye" => {
                self.arity(&site, values.len(), 1..=1)?;
                let n = self.expect_const(values[0], &site)?;
                if !(n >= 1.0) {
                    return Err(self.site_error(&site, "PXF-T004", "eye() needs a size of at least 1"));
                }
                let side = n as u64;
                self.capped(side.checked_mul(side), &site)?;
                let n = side as usize;
                let mut identity = vec![0.0; n * n];
                for k in 0..n {
                    identity[k * n + k] = 1.0;
                }
                Ok(self.arena.constant_vector(&identity))
            }
            "transpose" => {
                self.arity(&site, values.len(), 2..=2)?;
                let len = self.expect_vector(values[0], &site)?;
                let cols = self.expect_const(values[1], &site)?;
                let cols = cols as u32;
                if cols == 0 || len % cols != 0 {
                    return Err(self.site_error(&site, "PXF-T002", format!("{cols} columns do not divide a vector of size {len}")));
                }
                Ok(self.matrix(Matrix::Transpose { rows: len / cols, cols }, values[0], reserved::ZERO))
            }
            "mul" => {
                self.arity(&site, values.len(), 2..=3)?;
                let la = self.expect_vector(values[0], &site)?;
                let lb = self.expect_vector(values[1], &site)?;
                let k = match values.get(2) {
                    Some(&cols) => self.expect_const(cols, &site)? as u32,
                    None => match square_side(la) {
                        Some(n) if lb % n == 0 => lb / n,
                        _ => 1,
                    },
                };
                let shape = (k > 0 && lb % k == 0).then(|| lb / k).filter(|&n| n > 0 && la % n == 0);
                let Some(n) = shape else {
                    return Err(self.site_error(
                        &site,
                        "PXF-T002",
                        format!("cannot multiply matrices of sizes {la} and {lb} with {k} columns"),
                    ));
                };
                Ok(self.matrix(Matrix::Mul { m: la / n, n, k }, values[0], values[1]))
            }
            "u" | "g" => {
                let (dist, range) = if name == "u" { (Dist::Uniform, 0..=2) } else { (Dist::Gauss, 0..=0) };
                self.arity(&site, values.len(), range)?;
                for &v in &values {
                    self.expect_scalar(v, &site)?;
                }
                let (lo, hi) = match values[..] {
                    [hi] => (reserved::ZERO, hi),
                    [lo, hi] => (lo, hi),
                    _ => (reserved::ZERO, reserved::ONE),
                };
                let dst = self.arena.scalar();
                self.push(Instr::Random { dist, dst: dst.slot(), lo, hi });
                Ok(dst.slot())
            }
            "srand" => {
                self.arity(&site, values.len(), 1..=1)?;
                self.expect_scalar(values[0], &site)?;
                self.push(Instr::Srand { src: values[0] });
                Ok(values[0])
            }
            "date" => {
                self.arity(&site, values.len(), 0..=1)?;
                if let Some(&attr) = values.first() {
                    self.expect_scalar(attr, &site)?;
                    let dst = self.arena.scalar();
                    self.push(Instr::Date { dst: dst.slot(), attr });
                    return Ok(dst.slot());
                }
                let dst = self.arena.vector(8);
                for k in 0..8 {
                    let attr = self.arena.constant(k as f64);
                    self.push(Instr::Date { dst: dst.slot() + 1 + k, attr });
                }
                Ok(dst.slot())
            }
            "print" | "debug" => {
                self.arity(&site, values.len(), 1..=1)?;
                let (s, e) = src.trim_blanks(args[0].0, args[0].1);
                let label: Box<str> = src.str(s, e).into();
                let (value, len) = (values[0], self.arena.len_of(values[0]));
                self.push(if name == "print" {
                    Instr::Print { label, src: value, len }
                } else {
                    Instr::Debug { label, src: value, len }
                });
                Ok(value)
            }
            "echo" => {
                self.arity(&site, values.len(), 1..=usize::MAX)?;
                let parts = values.iter().map(|&slot| Part { slot, len: self.arena.len_of(slot) }).collect();
                self.push(Instr::Echo { parts });
                Ok(reserved::NAN)
            }
            _ => Err(self.site_error(&site, "PXF-R002", format!("unknown function '{name}'"))),
        }
    }

    /// `vectorN(...)`: the flattened arguments repeated until `n` components are filled.
    fn cyclic_vector(&mut self, n: u32, values: &[Slot]) -> Slot {
        if values.iter().all(|&v| self.arena.is_const(v)) {
            let mut flat = Vec::new();
            for &v in values {
                match self.arena.len_of(v) {
                    0 => flat.push(self.arena.value(v)),
                    _ => flat.extend_from_slice(self.arena.components(v)),
                }
            }
            if flat.is_empty() {
                flat.push(0.0);
            }
            let components: Vec<f64> = flat.iter().copied().cycle().take(n as usize).collect();
            return self.arena.constant_vector(&components);
        }
        let mut scalars = Vec::new();
        for &v in values {
            match self.arena.len_of(v) {
                0 => scalars.push(Part { slot: v, len: 0 }),
                len => scalars.extend((0..len).map(|k| Part { slot: v + 1 + k, len: 0 })),
            }
        }
        let parts: Vec<Part> = scalars.iter().copied().cycle().take(n as usize).collect();
        self.concat(&parts)
    }

    /// `crop()` or `crop([#k,] x, y, z, c, dx, dy, dz, dc [, boundary])`.
    fn crop(&mut self, src: &Annotated, args: &[(usize, usize)], depth: usize, site: &Site<'_>) -> Result<Slot> {
        let mut args = args;
        let image = match args.first() {
            Some(&(s, e)) if src.byte(src.trim_blanks(s, e).0) == b'#' => {
                let (s, e) = src.trim_blanks(s, e);
                let k = self.expr(src, s + 1, e, depth)?;
                self.expect_scalar(k, site)?;
                args = &args[1..];
                ImageRef::List(k)
            }
            _ => ImageRef::Main,
        };
        let (origin, size, boundary) = match args.len() {
            0 => {
                let dims = self.dims(image, site)?;
                let mut size = [0u32; 4];
                for (dim, v) in size.iter_mut().zip(dims) {
                    *dim = self.capped(Some(v as u64), site)?;
                }
                ([reserved::ZERO; 4], size, reserved::BOUNDARY)
            }
            8 | 9 => {
                let mut values = Vec::with_capacity(args.len());
                for &(s, e) in args {
                    let v = self.expr(src, s, e, depth)?;
                    self.expect_scalar(v, site)?;
                    values.push(v);
                }
                let origin = [values[0], values[1], values[2], values[3]];
                let mut size = [0u32; 4];
                for (k, dim) in size.iter_mut().enumerate() {
                    let v = self.expect_const(values[4 + k], site)?;
                    if !(v >= 1.0) {
                        return Err(self.site_error(site, "PXF-T004", "crop sizes must be constants of at least 1"));
                    }
                    *dim = self.capped(Some(v as u64), site)?;
                }
                (origin, size, values.get(8).copied().unwrap_or(reserved::BOUNDARY))
            }
            n => return Err(self.site_error(site, "PXF-S006", format!("expected 0, 8 or 9 arguments, got {n}"))),
        };
        let len = size.iter().try_fold(1u64, |n, &d| n.checked_mul(u64::from(d)));
        if len == Some(0) {
            return Err(self.site_error(site, "PXF-T005", "crop of an empty image"));
        }
        let len = self.capped(len, site)?;
        let dst = self.arena.vector(len);
        self.push(Instr::Crop { dst: dst.slot(), image, origin, size, boundary });
        Ok(dst.slot())
    }
}
