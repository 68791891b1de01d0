//! Assignment: locating the operator, resolving what is written, and storing into it.

use super::{Compiler, Op, Result, Site, Variable, access, is_identifier, shape_name};
use crate::arena::{Slot, reserved};
use crate::levels::Annotated;
use crate::vm::{Binary, Complex, Instr, Pixel};

/// Something a value can be stored into.
#[derive(Debug, Clone)]
pub(super) enum Target {
    Variable { slot: Slot, len: u32 },
    /// A name seen for the first time.
    New { name: String },
    /// `interpolation` or `boundary`.
    Global { slot: Slot },
    Element { base: Slot, len: u32, index: Slot },
    Pixel { at: Pixel },
    PixelVector { at: Pixel, len: u32 },
}

/// First assignment operator at `level`: `(operator start, '=' position, compound operator)`.
///
/// `==`, `!=`, `<=` and `>=` are comparisons; `<<=` and `>>=` are compound shifts.
pub(super) fn find_assignment(src: &Annotated, ss: usize, se: usize, level: u32) -> Option<(usize, usize, Option<Op>)> {
    let at = |i: usize| src.byte(i);
    let mut s = ss + 1;
    while s < se {
        if src.level(s) != level || at(s) != b'=' {
            s += 1;
            continue;
        }
        if at(s + 1) == b'=' {
            s += 2;
            continue;
        }
        let prev = at(s - 1);
        let doubled = s >= ss + 2 && at(s - 2) == prev;
        let found = match prev {
            b'=' | b'!' => None,
            b'<' | b'>' if doubled => {
                Some((s - 2, Some(Op::Real(if prev == b'<' { Binary::Shl } else { Binary::Shr }))))
            }
            b'<' | b'>' => None,
            b'*' if doubled => Some((s - 2, Some(Op::Complex(Complex::Mul)))),
            b'/' if doubled => Some((s - 2, Some(Op::Complex(Complex::Div)))),
            b'^' if doubled => Some((s - 2, Some(Op::Complex(Complex::Pow)))),
            b'*' => Some((s - 1, Some(Op::Real(Binary::Mul)))),
            b'/' => Some((s - 1, Some(Op::Real(Binary::Div)))),
            b'^' => Some((s - 1, Some(Op::Real(Binary::Pow)))),
            b'+' => Some((s - 1, Some(Op::Real(Binary::Add)))),
            b'-' => Some((s - 1, Some(Op::Real(Binary::Sub)))),
            b'%' => Some((s - 1, Some(Op::Real(Binary::Mod)))),
            b'&' => Some((s - 1, Some(Op::Real(Binary::BitAnd)))),
            b'|' => Some((s - 1, Some(Op::Real(Binary::BitOr)))),
            _ => Some((s, None)),
        };
        if let Some((start, op)) = found {
            return Some((start, s, op));
        }
        s += 1;
    }
    None
}

impl Compiler<'_> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn assign(
        &mut self,
        src: &Annotated,
        ss: usize,
        op_start: usize,
        eq: usize,
        se: usize,
        op: Option<Op>,
        depth: usize,
    ) -> Result<Slot> {
        let (ls, le) = src.trim(ss, op_start);
        if op.is_none() {
            if let Some(slot) = self.macro_definition(src, (ls, le), (eq + 1, se))? {
                return Ok(slot);
            }
        }
        let context = format!("operator '{}='", op.map_or("", Op::symbol));
        let site = Site { src, start: ss, end: se, context: &context };
        let target = self.target(src, (ls, le), depth, &site)?;
        let value = match op {
            None => self.expr(src, eq + 1, se, depth)?,
            Some(op) => {
                let current = self.load(&target, src, (ls, le))?;
                let rhs = self.expr(src, eq + 1, se, depth)?;
                self.operator(op, current, rhs, &site)?
            }
        };
        self.store(target, value, &site)
    }

    /// Resolve the left-hand side of an assignment.
    pub(super) fn target(
        &mut self,
        src: &Annotated,
        (ls, le): (usize, usize),
        depth: usize,
        site: &Site<'_>,
    ) -> Result<Target> {
        if ls >= le {
            return Err(self.site_error(site, "PXF-S004", "missing assignment target"));
        }
        let text = src.str(ls, le);
        if is_identifier(text) {
            if let Some(var) = self.variables.get(text) {
                if var.constant {
                    return Err(self.error(src, ls, le, "PXF-R003", site.context, format!("cannot assign to constant '{text}'")));
                }
                return Ok(Target::Variable { slot: var.slot, len: self.arena.len_of(var.slot) });
            }
            return match text {
                "interpolation" => Ok(Target::Global { slot: reserved::INTERPOLATION }),
                "boundary" => Ok(Target::Global { slot: reserved::BOUNDARY }),
                _ if access::reserved(text).is_some() => Err(self.error(
                    src,
                    ls,
                    le,
                    "PXF-R003",
                    site.context,
                    format!("cannot assign to reserved name '{text}'"),
                )),
                _ => Ok(Target::New { name: text.to_string() }),
            };
        }

        let last = src.byte(le - 1);
        if let Some(open) = src.partner(le - 1).filter(|_| matches!(last, b']' | b')')) {
            let (ps, pe) = src.trim_blanks(ls, open);
            let prefix = src.str(ps, pe);
            if access::accessor(prefix).is_some() {
                return self.pixel_target(src, (ls, le), prefix, open, depth);
            }
            if last == b']' && is_identifier(prefix) {
                let var = self.variables.get(prefix).copied();
                let element_site = Site { src, start: ls, end: le, context: site.context };
                return match var {
                    None => Err(self.error(src, ps, pe, "PXF-R001", format!("variable '{prefix}'"), "undefined variable")),
                    Some(Variable { constant: true, .. }) => Err(self.error(
                        src,
                        ps,
                        pe,
                        "PXF-R003",
                        site.context,
                        format!("cannot assign to constant '{prefix}'"),
                    )),
                    Some(Variable { slot: base, .. }) => {
                        let len = self.expect_vector(base, &element_site)?;
                        let args = src.arguments(open);
                        if args.len() != 1 {
                            return Err(self.site_error(&element_site, "PXF-S006", "element assignment takes one index"));
                        }
                        let index = self.expr(src, args[0].0, args[0].1, depth)?;
                        self.expect_scalar(index, &element_site)?;
                        if self.arena.is_const(index) {
                            self.const_index(index, len, &element_site)?;
                        }
                        Ok(Target::Element { base, len, index })
                    }
                };
            }
        }
        Err(self.error(src, ls, le, "PXF-T003", site.context, "expression is not assignable"))
    }

    /// Current value of a target, for compound operators and increments.
    fn load(&mut self, target: &Target, src: &Annotated, (ls, le): (usize, usize)) -> Result<Slot> {
        Ok(match *target {
            Target::New { ref name } => {
                return Err(self.error(src, ls, le, "PXF-R001", format!("variable '{name}'"), "undefined variable"));
            }
            Target::Variable { slot, .. } | Target::Global { slot } => slot,
            Target::Element { base, len, index } => {
                if self.arena.is_const(index) {
                    base + 1 + self.arena.value(index).trunc() as Slot
                } else {
                    let dst = self.arena.scalar();
                    self.push(Instr::Index { dst: dst.slot(), base, len, index });
                    dst.slot()
                }
            }
            Target::Pixel { at } => {
                let dst = self.arena.scalar();
                self.push(Instr::ReadPixel { dst: dst.slot(), at });
                dst.slot()
            }
            Target::PixelVector { at, len } => {
                let dst = self.arena.vector(len);
                self.push(Instr::ReadVector { dst: dst.slot(), len, at });
                dst.slot()
            }
        })
    }

    /// Store `value` into `target`; the assignment evaluates to the stored value.
    pub(super) fn store(&mut self, target: Target, value: Slot, site: &Site<'_>) -> Result<Slot> {
        let len = self.arena.len_of(value);
        match target {
            Target::New { name } => {
                let slot = match self.arena.reusable(value) {
                    Some(temp) => {
                        self.arena.declare(temp);
                        value
                    }
                    None => {
                        let var = self.arena.temp(len);
                        self.copy_into(var, value);
                        self.arena.declare(var);
                        var.slot()
                    }
                };
                log::trace!("variable '{name}' -> slot {slot} ({})", shape_name(len));
                self.variables.insert(name, Variable { slot, constant: false });
                Ok(slot)
            }
            Target::Variable { slot, len: expected } => {
                if len != expected {
                    return Err(self.site_error(
                        site,
                        if len == 0 || expected == 0 { "PXF-T001" } else { "PXF-T002" },
                        format!("cannot assign a {} to a {}", shape_name(len), shape_name(expected)),
                    ));
                }
                if !self.retarget(value, slot) {
                    if let Some(var) = self.arena.variable(slot) {
                        self.copy_into(var, value);
                    }
                }
                Ok(slot)
            }
            Target::Global { slot } => {
                self.expect_scalar(value, site)?;
                if let Some(global) = self.arena.global(slot) {
                    self.copy_into(global, value);
                }
                self.serial("assignment to a global mode");
                Ok(slot)
            }
            Target::Element { base, len: vlen, index } => {
                self.expect_scalar(value, site)?;
                match self.arena.variable(base) {
                    Some(var) if self.arena.is_const(index) => {
                        let k = self.arena.value(index).trunc() as u32;
                        let component = self.arena.component(var, k);
                        self.copy_into(component, value);
                    }
                    _ => self.push(Instr::SetIndex { base, len: vlen, index, src: value }),
                }
                Ok(value)
            }
            Target::Pixel { at } => {
                self.expect_scalar(value, site)?;
                self.push(Instr::WritePixel { at, src: value });
                self.serial("pixel write");
                Ok(value)
            }
            Target::PixelVector { at, len: expected } => {
                let src = match len {
                    0 => {
                        let spread = self.arena.vector(expected);
                        self.push(Instr::Fill { dst: spread.slot(), src: value, len: expected });
                        spread.slot()
                    }
                    n if n == expected => value,
                    n => {
                        return Err(self.site_error(
                            site,
                            "PXF-T002",
                            format!("cannot write a vector of size {n} to a pixel with {expected} channels"),
                        ));
                    }
                };
                self.push(Instr::WriteVector { at, src, len: expected });
                self.serial("pixel write");
                Ok(value)
            }
        }
    }

    /// `++t`, `--t`, `t++`, `t--`; the postfix forms evaluate to the old value.
    pub(super) fn increment(
        &mut self,
        src: &Annotated,
        (ss, se): (usize, usize),
        (ts, te): (usize, usize),
        op: Binary,
        post: bool,
        depth: usize,
    ) -> Result<Slot> {
        let context = format!("operator '{}'", if op == Binary::Add { "++" } else { "--" });
        let site = Site { src, start: ss, end: se, context: &context };
        let (ts, te) = src.trim(ts, te);
        let target = self.target(src, (ts, te), depth, &site)?;
        let current = self.load(&target, src, (ts, te))?;
        let old = if post {
            let copy = self.arena.temp(self.arena.len_of(current));
            self.copy_into(copy, current);
            Some(copy.slot())
        } else {
            None
        };
        let value = self.binary(op, current, reserved::ONE, &site)?;
        let stored = self.store(target, value, &site)?;
        Ok(old.unwrap_or(stored))
    }

    /// `const name = value`: the name is bound to the constant slot itself.
    pub(super) fn const_declaration(&mut self, src: &Annotated, ss: usize, se: usize, depth: usize) -> Result<Slot> {
        let (ss, se) = src.trim_blanks(ss, se);
        let site = Site { src, start: ss, end: se, context: "const declaration" };
        let Some((op_start, eq, None)) = find_assignment(src, ss, se, src.level(ss)) else {
            return Err(self.site_error(&site, "PXF-S004", "expected 'const name = value'"));
        };
        let (ns, ne) = src.trim_blanks(ss, op_start);
        let name = src.str(ns, ne);
        if !is_identifier(name) {
            return Err(self.site_error(&site, "PXF-S004", format!("'{name}' is not a valid constant name")));
        }
        if access::reserved(name).is_some() || self.variables.contains_key(name) {
            return Err(self.error(src, ns, ne, "PXF-R003", "const declaration", format!("'{name}' is already defined")));
        }
        let value = self.expr(src, eq + 1, se, depth)?;
        if !self.arena.is_const(value) {
            return Err(self.site_error(&site, "PXF-T004", format!("value of '{name}' is not a compile-time constant")));
        }
        log::trace!("constant '{name}' -> slot {value}");
        self.variables.insert(name.to_string(), Variable { slot: value, constant: true });
        Ok(value)
    }
}
