//! Reserved names and pixel accessors (`i`, `j`, `I`, `J`).

use std::collections::HashMap;
use std::sync::LazyLock;

use super::target::Target;
use super::{Compiler, Result, Site};
use crate::arena::{Slot, reserved};
use crate::levels::Annotated;
use crate::vm::{ImageRef, Instr, Pixel, Pos};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Stat {
    Min,
    Max,
    Mean,
    Variance,
    Sum,
    Product,
    Median,
    Norm,
    ArgMin(usize),
    ArgMax(usize),
}

/// Meaning of a reserved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Reserved {
    Slot(Slot),
    /// `i`: value at the current position.
    Pixel,
    /// `I`: all channels at the current position.
    Channels,
    /// `R`, `G`, `B`, `A`, `i0`..`i9`.
    Channel(u8),
    /// Image statistic, fixed at compile time.
    Stat(Stat),
}

static RESERVED: LazyLock<HashMap<&'static str, Reserved>> = LazyLock::new(|| {
    use reserved::*;
    let mut names = HashMap::new();
    let slots = [
        ("x", X),
        ("y", Y),
        ("z", Z),
        ("c", C),
        ("t", T),
        ("w", W),
        ("h", H),
        ("d", D),
        ("s", S),
        ("wh", WH),
        ("whd", WHD),
        ("whds", WHDS),
        ("pi", PI),
        ("e", E),
        ("interpolation", INTERPOLATION),
        ("boundary", BOUNDARY),
    ];
    for (name, slot) in slots {
        names.insert(name, Reserved::Slot(slot));
    }
    names.insert("i", Reserved::Pixel);
    names.insert("I", Reserved::Channels);
    for (k, name) in ["R", "G", "B", "A"].into_iter().enumerate() {
        names.insert(name, Reserved::Channel(k as u8));
    }
    let channels = ["i0", "i1", "i2", "i3", "i4", "i5", "i6", "i7", "i8", "i9"];
    for (k, name) in channels.into_iter().enumerate() {
        names.insert(name, Reserved::Channel(k as u8));
    }
    let stats = [
        ("im", Stat::Min),
        ("iM", Stat::Max),
        ("ia", Stat::Mean),
        ("iv", Stat::Variance),
        ("is", Stat::Sum),
        ("ip", Stat::Product),
        ("ic", Stat::Median),
        ("in", Stat::Norm),
    ];
    for (name, stat) in stats {
        names.insert(name, Reserved::Stat(stat));
    }
    for (k, (min, max)) in [("xm", "xM"), ("ym", "yM"), ("zm", "zM"), ("cm", "cM")].into_iter().enumerate() {
        names.insert(min, Reserved::Stat(Stat::ArgMin(k)));
        names.insert(max, Reserved::Stat(Stat::ArgMax(k)));
    }
    names
});

pub(super) fn reserved(name: &str) -> Option<Reserved> {
    RESERVED.get(name).copied()
}

/// `(relative, vector)` for the accessor names.
pub(super) fn accessor(name: &str) -> Option<(bool, bool)> {
    match name {
        "i" => Some((false, false)),
        "j" => Some((true, false)),
        "I" => Some((false, true)),
        "J" => Some((true, true)),
        _ => None,
    }
}

impl Compiler<'_> {
    pub(super) fn reserved(&mut self, r: Reserved, src: &Annotated, ss: usize, se: usize) -> Result<Slot> {
        let here = Pos::Coords([reserved::X, reserved::Y, reserved::Z, reserved::C]);
        match r {
            Reserved::Slot(slot) => Ok(slot),
            Reserved::Pixel => Ok(self.read_scalar(self.at(ImageRef::Main, here, false))),
            Reserved::Channel(k) => {
                let channel = self.arena.constant(k as f64);
                let pos = Pos::Coords([reserved::X, reserved::Y, reserved::Z, channel]);
                Ok(self.read_scalar(self.at(ImageRef::Main, pos, false)))
            }
            Reserved::Channels => {
                let site = Site { src, start: ss, end: se, context: "accessor 'I'" };
                let len = self.spectrum(ImageRef::Main, &site)?;
                Ok(self.read_vector(self.at(ImageRef::Main, here, false), len))
            }
            Reserved::Stat(stat) => {
                let stats = self.stats();
                let value = match stat {
                    Stat::Min => stats.min,
                    Stat::Max => stats.max,
                    Stat::Mean => stats.mean,
                    Stat::Variance => stats.variance,
                    Stat::Sum => stats.sum,
                    Stat::Product => stats.product,
                    Stat::Median => stats.median,
                    Stat::Norm => stats.norm,
                    Stat::ArgMin(k) => stats.argmin[k] as f64,
                    Stat::ArgMax(k) => stats.argmax[k] as f64,
                };
                Ok(self.arena.constant(value))
            }
        }
    }

    fn at(&self, image: ImageRef, pos: Pos, relative: bool) -> Pixel {
        Pixel { image, pos, relative, interpolation: reserved::INTERPOLATION, boundary: reserved::BOUNDARY }
    }

    fn read_scalar(&mut self, at: Pixel) -> Slot {
        let dst = self.arena.scalar();
        self.push(Instr::ReadPixel { dst: dst.slot(), at });
        dst.slot()
    }

    fn read_vector(&mut self, at: Pixel, len: u32) -> Slot {
        let dst = self.arena.vector(len);
        self.push(Instr::ReadVector { dst: dst.slot(), len, at });
        dst.slot()
    }

    /// Channel count of an image known at compile time.
    pub(super) fn spectrum(&self, image: ImageRef, site: &Site<'_>) -> Result<u32> {
        let dims = self.dims(image, site)?;
        match dims[3] {
            0 => Err(self.site_error(site, "PXF-T005", "vector access needs an image with at least one channel")),
            s => Ok(s as u32),
        }
    }

    pub(super) fn dims(&self, image: ImageRef, site: &Site<'_>) -> Result<[usize; 4]> {
        match image {
            ImageRef::Main => match self.image {
                Some(img) if !img.is_empty() => Ok(img.dims()),
                _ => Err(self.site_error(site, "PXF-T005", "no image is bound")),
            },
            ImageRef::List(k) => {
                let k = self.expect_const(k, site)?;
                if self.lists.is_empty() || !k.is_finite() {
                    return Err(self.site_error(site, "PXF-T005", "no list image is bound"));
                }
                let idx = (k.round() as i64).rem_euclid(self.lists.len() as i64) as usize;
                Ok(self.lists[idx])
            }
        }
    }

    /// Parse accessor arguments: an optional `#k` list selector, then positions and modes.
    fn pixel(
        &mut self,
        src: &Annotated,
        name: &str,
        open: usize,
        depth: usize,
        site: &Site<'_>,
    ) -> Result<(Pixel, bool)> {
        let Some((relative, vector)) = accessor(name) else {
            return Err(self.site_error(site, "PXF-R002", format!("'{name}' is not an accessor")));
        };
        let offset_form = src.byte(open) == b'[';
        let mut args = src.arguments(open);
        let first = args.first().copied();
        let image = match first {
            Some((s, e)) => {
                let (s, e) = src.trim_blanks(s, e);
                if src.byte(s) == b'#' {
                    let k = self.expr(src, s + 1, e, depth)?;
                    self.expect_scalar(k, site)?;
                    args.remove(0);
                    ImageRef::List(k)
                } else {
                    ImageRef::Main
                }
            }
            None => ImageRef::Main,
        };
        let mut values = Vec::with_capacity(args.len());
        for &(s, e) in &args {
            let v = self.expr(src, s, e, depth)?;
            self.expect_scalar(v, site)?;
            values.push(v);
        }
        let at = if offset_form {
            if values.len() > 2 || (values.is_empty() && !relative) {
                return Err(self.site_error(site, "PXF-S006", format!("'{name}[]' takes an offset and an optional boundary")));
            }
            Pixel {
                image,
                pos: Pos::Offset(values.first().copied().unwrap_or(reserved::ZERO)),
                relative,
                interpolation: reserved::INTERPOLATION,
                boundary: values.get(1).copied().unwrap_or(reserved::BOUNDARY),
            }
        } else {
            let coords = if vector { 3 } else { 4 };
            if values.len() > coords + 2 {
                return Err(self.site_error(
                    site,
                    "PXF-S006",
                    format!("'{name}()' takes at most {} arguments, got {}", coords + 2, values.len()),
                ));
            }
            let here = [reserved::X, reserved::Y, reserved::Z, reserved::C];
            let mut pos = [0; 4];
            for (k, p) in pos.iter_mut().enumerate() {
                *p = match values.get(k).filter(|_| k < coords) {
                    Some(&v) => v,
                    None if relative => reserved::ZERO,
                    None => here[k],
                };
            }
            Pixel {
                image,
                pos: Pos::Coords(pos),
                relative,
                interpolation: values.get(coords).copied().unwrap_or(reserved::INTERPOLATION),
                boundary: values.get(coords + 1).copied().unwrap_or(reserved::BOUNDARY),
            }
        };
        Ok((at, vector))
    }

    /// `i(...)`, `j[...]`, `I(...)`, `J[...]` as values.
    pub(super) fn read_pixel(
        &mut self,
        src: &Annotated,
        (ss, se): (usize, usize),
        name: &str,
        open: usize,
        depth: usize,
    ) -> Result<Slot> {
        let context = format!("accessor '{name}'");
        let site = Site { src, start: ss, end: se, context: &context };
        let (at, vector) = self.pixel(src, name, open, depth, &site)?;
        if vector {
            let len = self.spectrum(at.image, &site)?;
            Ok(self.read_vector(at, len))
        } else {
            Ok(self.read_scalar(at))
        }
    }

    /// Accessor on the left of an assignment.
    pub(super) fn pixel_target(
        &mut self,
        src: &Annotated,
        (ss, se): (usize, usize),
        name: &str,
        open: usize,
        depth: usize,
    ) -> Result<Target> {
        let context = format!("accessor '{name}'");
        let site = Site { src, start: ss, end: se, context: &context };
        let (at, vector) = self.pixel(src, name, open, depth, &site)?;
        if vector {
            let len = self.spectrum(at.image, &site)?;
            Ok(Target::PixelVector { at, len })
        } else {
            Ok(Target::Pixel { at })
        }
    }
}
