//! Register arena: one flat array of f64 slots plus a kind tag per slot.
//!
//! A vector of length `n` occupies `n + 1` consecutive slots: a base slot (its handle) followed by
//! the components at `base + 1 ..= base + n`.

use std::collections::HashMap;

pub type Slot = u32;

/// Fixed slots present in every arena.
pub mod reserved {
    use super::Slot;

    pub const SCRATCH: Slot = 0;
    pub const NAN: Slot = 1;
    pub const X: Slot = 2;
    pub const Y: Slot = 3;
    pub const Z: Slot = 4;
    pub const C: Slot = 5;
    pub const T: Slot = 6;
    pub const INTERPOLATION: Slot = 7;
    pub const BOUNDARY: Slot = 8;
    pub const PI: Slot = 9;
    pub const E: Slot = 10;
    pub const W: Slot = 11;
    pub const H: Slot = 12;
    pub const D: Slot = 13;
    pub const S: Slot = 14;
    pub const WH: Slot = 15;
    pub const WHD: Slot = 16;
    pub const WHDS: Slot = 17;
    pub const ZERO: Slot = 18;
    pub const ONE: Slot = 19;
    pub const END: Slot = 20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Computed,
    Constant,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Compiler temporary; may be overwritten in place by the instruction consuming it.
    Computed,
    Constant,
    Variable,
    /// Engine-owned: coordinates, thread id, scratch, interpolation and boundary modes.
    Reserved,
    Vector { len: u32, access: Access },
    /// Component of a vector run; follows the access of its base.
    Component,
}

/// Proof that a slot may be written. Only the arena hands these out, and never for constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutable(Slot);

impl Mutable {
    pub fn slot(self) -> Slot {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Arena {
    values: Vec<f64>,
    kinds: Vec<SlotKind>,
    constants: HashMap<u64, Slot>,
}

impl Arena {
    /// Arena seeded with the reserved slots for an image of the given dimensions.
    pub fn new(dims: [usize; 4]) -> Arena {
        use reserved::*;
        let [w, h, d, s] = dims.map(|v| v as f64);
        let mut values = vec![0.0; END as usize];
        let mut kinds = vec![SlotKind::Reserved; END as usize];
        let fixed = [
            (ZERO, 0.0),
            (ONE, 1.0),
            (NAN, f64::NAN),
            (PI, std::f64::consts::PI),
            (E, std::f64::consts::E),
            (W, w),
            (H, h),
            (D, d),
            (S, s),
            (WH, w * h),
            (WHD, w * h * d),
            (WHDS, w * h * d * s),
        ];
        let mut constants = HashMap::new();
        for (slot, v) in fixed {
            values[slot as usize] = v;
            kinds[slot as usize] = SlotKind::Constant;
            constants.entry(v.to_bits()).or_insert(slot);
        }
        Arena { values, kinds, constants }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn value(&self, slot: Slot) -> f64 {
        self.values[slot as usize]
    }

    pub fn kind(&self, slot: Slot) -> SlotKind {
        self.kinds[slot as usize]
    }

    /// Vector length of the value at `slot`, 0 for scalars.
    pub fn len_of(&self, slot: Slot) -> u32 {
        match self.kind(slot) {
            SlotKind::Vector { len, .. } => len,
            _ => 0,
        }
    }

    pub fn is_vector(&self, slot: Slot) -> bool {
        self.len_of(slot) > 0
    }

    pub fn is_const(&self, slot: Slot) -> bool {
        matches!(
            self.kind(slot),
            SlotKind::Constant | SlotKind::Vector { access: Access::Constant, .. }
        )
    }

    /// Components of a vector slot.
    pub fn components(&self, slot: Slot) -> &[f64] {
        let base = slot as usize + 1;
        &self.values[base..base + self.len_of(slot) as usize]
    }

    fn push(&mut self, value: f64, kind: SlotKind) -> Slot {
        let slot = self.values.len() as Slot;
        self.values.push(value);
        self.kinds.push(kind);
        slot
    }

    pub fn scalar(&mut self) -> Mutable {
        Mutable(self.push(f64::NAN, SlotKind::Computed))
    }

    pub fn vector(&mut self, len: u32) -> Mutable {
        debug_assert!(len > 0);
        let base = self.push(f64::NAN, SlotKind::Vector { len, access: Access::Computed });
        for _ in 0..len {
            self.push(f64::NAN, SlotKind::Component);
        }
        Mutable(base)
    }

    /// Temporary shaped like `len` (0 = scalar).
    pub fn temp(&mut self, len: u32) -> Mutable {
        if len == 0 { self.scalar() } else { self.vector(len) }
    }

    /// De-duplicated scalar constant.
    pub fn constant(&mut self, value: f64) -> Slot {
        if let Some(&slot) = self.constants.get(&value.to_bits()) {
            return slot;
        }
        let slot = self.push(value, SlotKind::Constant);
        self.constants.insert(value.to_bits(), slot);
        slot
    }

    pub fn constant_vector(&mut self, values: &[f64]) -> Slot {
        let Mutable(base) = self.vector(values.len() as u32);
        self.values[base as usize + 1..=base as usize + values.len()].copy_from_slice(values);
        self.freeze(base);
        base
    }

    /// Write handle for a temporary that a consuming instruction may overwrite.
    pub fn reusable(&self, slot: Slot) -> Option<Mutable> {
        match self.kind(slot) {
            SlotKind::Computed | SlotKind::Vector { access: Access::Computed, .. } => Some(Mutable(slot)),
            _ => None,
        }
    }

    pub fn is_temp(&self, slot: Slot) -> bool {
        self.reusable(slot).is_some()
    }

    /// Write handle for a variable.
    pub fn variable(&self, slot: Slot) -> Option<Mutable> {
        match self.kind(slot) {
            SlotKind::Variable | SlotKind::Vector { access: Access::Variable, .. } => Some(Mutable(slot)),
            _ => None,
        }
    }

    /// Write handle for an engine-owned slot the formula may set (`interpolation`, `boundary`).
    pub fn global(&self, slot: Slot) -> Option<Mutable> {
        match self.kind(slot) {
            SlotKind::Reserved => Some(Mutable(slot)),
            _ => None,
        }
    }

    /// Component `index` of a vector reached through an existing write handle.
    pub fn component(&self, base: Mutable, index: u32) -> Mutable {
        debug_assert!(index < self.len_of(base.0));
        Mutable(base.0 + 1 + index)
    }

    /// A temporary becomes a named variable in place.
    pub fn declare(&mut self, slot: Mutable) {
        let kind = &mut self.kinds[slot.0 as usize];
        *kind = match *kind {
            SlotKind::Vector { len, .. } => SlotKind::Vector { len, access: Access::Variable },
            _ => SlotKind::Variable,
        };
    }

    /// A slot whose value was computed at compile time becomes a constant.
    pub fn freeze(&mut self, slot: Slot) {
        let kind = &mut self.kinds[slot as usize];
        *kind = match *kind {
            SlotKind::Vector { len, .. } => SlotKind::Vector { len, access: Access::Constant },
            _ => SlotKind::Constant,
        };
    }

    pub fn set(&mut self, slot: Mutable, value: f64) {
        self.values[slot.0 as usize] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_layout() {
        let a = Arena::new([4, 3, 1, 2]);
        assert_eq!(a.len(), reserved::END as usize);
        assert_eq!(a.value(reserved::WH), 12.0);
        assert_eq!(a.value(reserved::WHDS), 24.0);
        assert!(a.is_const(reserved::PI));
        assert!(!a.is_const(reserved::X));
        assert_eq!(a.kind(reserved::T), SlotKind::Reserved);
    }

    #[test]
    fn constants_are_deduplicated() {
        let mut a = Arena::new([0; 4]);
        let one = a.constant(1.0);
        assert_eq!(one, reserved::ONE);
        let k = a.constant(2.5);
        assert_eq!(a.constant(2.5), k);
        assert_ne!(a.constant(-2.5), k);
    }

    #[test]
    fn vector_runs_are_contiguous() {
        let mut a = Arena::new([0; 4]);
        let v = a.constant_vector(&[1.0, 2.0, 3.0]);
        assert_eq!(a.len_of(v), 3);
        assert_eq!(a.components(v), &[1.0, 2.0, 3.0]);
        assert_eq!(a.kind(v + 1), SlotKind::Component);
        assert!(a.is_const(v));
        assert!(a.reusable(v).is_none());
    }

    #[test]
    fn constants_never_yield_write_handles() {
        let mut a = Arena::new([0; 4]);
        let k = a.constant(7.0);
        assert!(a.reusable(k).is_none());
        assert!(a.variable(k).is_none());
        assert!(a.global(k).is_none());
        let t = a.scalar();
        a.declare(t);
        assert_eq!(a.kind(t.slot()), SlotKind::Variable);
        assert!(a.variable(t.slot()).is_some());
        assert!(a.reusable(t.slot()).is_none());
    }
}
