//! Emission with constant folding, identity elimination, linear fusion and temporary reuse.

use smallvec::SmallVec;

use super::{Compiler, Result, Site, shape_name};
use crate::arena::{Mutable, Slot};
use crate::vm::{self, Binary, Complex, Cx, Instr, Linear, Shape, Unary};

impl Compiler<'_> {
    /// Emit a value-producing instruction writing a fresh temporary, or evaluate it right away when
    /// every input is a compile-time constant.
    pub(super) fn compute(&mut self, instr: Instr) -> Slot {
        let Some(dst) = instr.output() else {
            debug_assert!(false, "compute() needs a value-producing instruction");
            self.code.push(instr);
            return crate::arena::reserved::NAN;
        };
        let foldable = instr
            .pure_inputs()
            .is_some_and(|inputs| inputs.iter().all(|&s| self.arena.is_const(s)));
        if foldable && vm::apply(&instr, self.arena.values_mut()) {
            self.arena.freeze(dst);
        } else {
            self.code.push(instr);
        }
        dst
    }

    /// A temporary among `operands` shaped like `len` that the result may overwrite.
    fn reuse(&self, operands: &[Slot], len: u32) -> Option<Mutable> {
        operands
            .iter()
            .copied()
            .filter(|&s| self.arena.len_of(s) == len)
            .find_map(|s| self.arena.reusable(s))
    }

    pub(super) fn unary(&mut self, op: Unary, a: Slot) -> Slot {
        match self.arena.len_of(a) {
            0 => {
                let dst = self.reuse(&[a], 0).unwrap_or_else(|| self.arena.scalar());
                self.compute(Instr::Unary { op, dst: dst.slot(), a })
            }
            len => {
                let dst = self.reuse(&[a], len).unwrap_or_else(|| self.arena.vector(len));
                self.compute(Instr::VecUnary { op, dst: dst.slot(), a, len })
            }
        }
    }

    /// Real binary operator; vectors combine component-wise and scalars broadcast.
    pub(super) fn binary(&mut self, op: Binary, a: Slot, b: Slot, site: &Site<'_>) -> Result<Slot> {
        let (la, lb) = (self.arena.len_of(a), self.arena.len_of(b));
        if la > 0 && lb > 0 {
            if matches!(op, Binary::Eq | Binary::Ne) {
                let negate = op == Binary::Ne;
                if la != lb {
                    return Ok(self.arena.constant(negate as u8 as f64));
                }
                let dst = self.arena.scalar();
                return Ok(self.compute(Instr::VecEq { dst: dst.slot(), a, b, len: la, negate }));
            }
            if la != lb {
                return Err(self.site_error(
                    site,
                    "PXF-T002",
                    format!("operands have different sizes ({} and {})", shape_name(la), shape_name(lb)),
                ));
            }
        }
        if let Some(slot) = self.identity(op, a, b) {
            return Ok(slot);
        }
        if la == 0 && lb == 0 {
            if let Some(slot) = self.fuse(op, a, b) {
                return Ok(slot);
            }
            let dst = self.reuse(&[a, b], 0).unwrap_or_else(|| self.arena.scalar());
            return Ok(self.compute(Instr::Binary { op, dst: dst.slot(), a, b }));
        }
        let (shape, len) = match (la, lb) {
            (n, 0) => (Shape::VS, n),
            (0, n) => (Shape::SV, n),
            (n, _) => (Shape::VV, n),
        };
        let scalar = match shape {
            Shape::VS => Some(b),
            Shape::SV => Some(a),
            Shape::VV => None,
        };
        let dst = self
            .reuse(&[a, b], len)
            .filter(|m| !scalar.is_some_and(|s| s > m.slot() && s <= m.slot() + len))
            .unwrap_or_else(|| self.arena.vector(len));
        Ok(self.compute(Instr::VecBinary { op, shape, dst: dst.slot(), a, b, len }))
    }

    /// Complex operator on `(re, im)` pairs; real scalars count as `(x, 0)`.
    pub(super) fn complex(&mut self, op: Complex, a: Slot, b: Slot, site: &Site<'_>) -> Result<Slot> {
        let (la, lb) = (self.arena.len_of(a), self.arena.len_of(b));
        if la == 0 && lb == 0 {
            return self.binary(op.real(), a, b, site);
        }
        let a = self.complex_operand(a, site)?;
        let b = self.complex_operand(b, site)?;
        let dst = self.reuse(&[a.slot, b.slot], 2).unwrap_or_else(|| self.arena.vector(2));
        Ok(self.compute(Instr::Complex { op, dst: dst.slot(), a, b }))
    }

    pub(super) fn complex_operand(&self, slot: Slot, site: &Site<'_>) -> Result<Cx> {
        match self.arena.len_of(slot) {
            0 => Ok(Cx { slot, pair: false }),
            2 => Ok(Cx { slot, pair: true }),
            n => Err(self.site_error(
                site,
                "PXF-T001",
                format!("complex operands are scalars or vectors of size 2, found a vector of size {n}"),
            )),
        }
    }

    fn scalar_const(&self, slot: Slot) -> Option<f64> {
        (self.arena.is_const(slot) && !self.arena.is_vector(slot)).then(|| self.arena.value(slot))
    }

    /// `x+0`, `0+x`, `x-0`, `x*1`, `1*x` and `x/1` are `x`.
    fn identity(&self, op: Binary, a: Slot, b: Slot) -> Option<Slot> {
        let (ka, kb) = (self.scalar_const(a), self.scalar_const(b));
        match op {
            Binary::Add if kb == Some(0.0) => Some(a),
            Binary::Add if ka == Some(0.0) => Some(b),
            Binary::Sub if kb == Some(0.0) => Some(a),
            Binary::Mul if kb == Some(1.0) => Some(a),
            Binary::Mul if ka == Some(1.0) => Some(b),
            Binary::Div if kb == Some(1.0) => Some(a),
            _ => None,
        }
    }

    /// Fold a product emitted as the previous instruction into `+`/`-`.
    fn fuse(&mut self, op: Binary, a: Slot, b: Slot) -> Option<Slot> {
        let (left, right) = match op {
            Binary::Add => (Linear::MulAdd, Linear::MulAdd),
            Binary::Sub => (Linear::MulSub, Linear::SubMul),
            _ => return None,
        };
        if let Some((x, y)) = self.take_product(a) {
            return Some(self.compute(Instr::Linear { form: left, dst: a, a: x, b: y, c: b }));
        }
        if let Some((x, y)) = self.take_product(b) {
            return Some(self.compute(Instr::Linear { form: right, dst: b, a: x, b: y, c: a }));
        }
        None
    }

    fn take_product(&mut self, slot: Slot) -> Option<(Slot, Slot)> {
        if self.code.len() <= self.fence || !self.arena.is_temp(slot) {
            return None;
        }
        match self.code.last() {
            Some(&Instr::Binary { op: Binary::Mul, dst, a, b }) if dst == slot => {
                self.code.pop();
                Some((a, b))
            }
            _ => None,
        }
    }

    /// Make the previous instruction write `dst` directly instead of the temporary `value`.
    pub(super) fn retarget(&mut self, value: Slot, dst: Slot) -> bool {
        if self.code.len() <= self.fence || !self.arena.is_temp(value) {
            return false;
        }
        let len = self.arena.len_of(dst);
        let Some(last) = self.code.last_mut() else {
            return false;
        };
        // a broadcast scalar read from a component of `dst` would change mid-loop
        if let Instr::VecBinary { shape, a, b, .. } = *last {
            let scalar = match shape {
                Shape::VS => Some(b),
                Shape::SV => Some(a),
                Shape::VV => None,
            };
            if scalar.is_some_and(|s| s > dst && s <= dst + len) {
                return false;
            }
        }
        let slot = match last {
            Instr::Unary { dst, .. }
            | Instr::Binary { dst, .. }
            | Instr::Ternary { dst, .. }
            | Instr::Linear { dst, .. }
            | Instr::VecUnary { dst, .. }
            | Instr::VecBinary { dst, .. } => dst,
            _ => return false,
        };
        if *slot != value {
            return false;
        }
        *slot = dst;
        true
    }

    /// Reduction over any mix of scalars and vectors.
    pub(super) fn reduce(&mut self, op: vm::Reduce, operands: &[Slot]) -> Slot {
        let parts: SmallVec<[vm::Part; 4]> =
            operands.iter().map(|&slot| vm::Part { slot, len: self.arena.len_of(slot) }).collect();
        let dst = self.arena.scalar();
        self.compute(Instr::Reduce { op, dst: dst.slot(), parts })
    }
}
