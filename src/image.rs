//! Images the formulas read and write, and how out-of-range coordinates resolve.
//!
//! An [`Image`] is a dense 4-D buffer; [`Images`] bundles the input, output and list images a
//! program is compiled against and evaluated with.

use serde::{Deserialize, Serialize};

/// Planar f64 image: `x` varies fastest, then `y`, `z`, and channel `c`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    depth: usize,
    spectrum: usize,
    data: Vec<f64>,
}

/// Out-of-range access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Reads outside the image return 0.
    #[default]
    Dirichlet,
    /// Nearest valid pixel.
    Neumann,
    Periodic,
    Mirror,
}

impl Boundary {
    pub fn code(self) -> f64 {
        match self {
            Boundary::Dirichlet => 0.0,
            Boundary::Neumann => 1.0,
            Boundary::Periodic => 2.0,
            Boundary::Mirror => 3.0,
        }
    }

    /// Decode the value held by a `boundary` slot. Unknown codes fall back to Dirichlet.
    pub fn from_code(v: f64) -> Boundary {
        match v.round() as i64 {
            1 => Boundary::Neumann,
            2 => Boundary::Periodic,
            3 => Boundary::Mirror,
            _ => Boundary::Dirichlet,
        }
    }

    /// Map a possibly out-of-range index onto `0..n`, or `None` when the read falls outside.
    fn resolve(self, i: i64, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        let n = n as i64;
        let idx = match self {
            Boundary::Dirichlet => {
                if i < 0 || i >= n {
                    return None;
                }
                i
            }
            Boundary::Neumann => i.clamp(0, n - 1),
            Boundary::Periodic => i.rem_euclid(n),
            Boundary::Mirror => {
                let m = i.rem_euclid(2 * n);
                if m >= n { 2 * n - 1 - m } else { m }
            }
        };
        Some(idx as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Nearest,
    Linear,
}

impl Interpolation {
    pub fn code(self) -> f64 {
        match self {
            Interpolation::Nearest => 0.0,
            Interpolation::Linear => 1.0,
        }
    }

    pub fn from_code(v: f64) -> Interpolation {
        if v.round() as i64 == 1 { Interpolation::Linear } else { Interpolation::Nearest }
    }
}

/// Aggregate statistics of an image, computed once per compiled program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub variance: f64,
    pub sum: f64,
    pub product: f64,
    pub median: f64,
    pub norm: f64,
    pub argmin: [usize; 4],
    pub argmax: [usize; 4],
}

impl Stats {
    pub fn empty() -> Stats {
        Stats {
            min: f64::NAN,
            max: f64::NAN,
            mean: f64::NAN,
            variance: f64::NAN,
            sum: 0.0,
            product: 1.0,
            median: f64::NAN,
            norm: 0.0,
            argmin: [0; 4],
            argmax: [0; 4],
        }
    }
}

impl Image {
    pub fn new(width: usize, height: usize, depth: usize, spectrum: usize) -> Image {
        let len = width * height * depth * spectrum;
        Image { width, height, depth, spectrum, data: vec![0.0; len] }
    }

    /// Wrap existing planar data; `None` when the length does not match the dimensions.
    pub fn with_data(width: usize, height: usize, depth: usize, spectrum: usize, data: Vec<f64>) -> Option<Image> {
        if data.len() != width * height * depth * spectrum {
            return None;
        }
        Some(Image { width, height, depth, spectrum, data })
    }

    /// One-row, single-channel image.
    pub fn from_row(values: Vec<f64>) -> Image {
        Image { width: values.len(), height: 1, depth: 1, spectrum: 1, data: values }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn spectrum(&self) -> usize {
        self.spectrum
    }

    pub fn dims(&self) -> [usize; 4] {
        [self.width, self.height, self.depth, self.spectrum]
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Number of pixels per channel plane.
    pub fn plane(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub fn offset(&self, x: usize, y: usize, z: usize, c: usize) -> usize {
        x + self.width * (y + self.height * (z + self.depth * c))
    }

    pub fn get(&self, x: usize, y: usize, z: usize, c: usize) -> f64 {
        if x >= self.width || y >= self.height || z >= self.depth || c >= self.spectrum {
            return 0.0;
        }
        self.data[self.offset(x, y, z, c)]
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, c: usize, value: f64) {
        if x < self.width && y < self.height && z < self.depth && c < self.spectrum {
            let off = self.offset(x, y, z, c);
            self.data[off] = value;
        }
    }

    fn at(&self, x: i64, y: i64, z: i64, c: i64, boundary: Boundary) -> f64 {
        let resolved = (
            boundary.resolve(x, self.width),
            boundary.resolve(y, self.height),
            boundary.resolve(z, self.depth),
            boundary.resolve(c, self.spectrum),
        );
        match resolved {
            (Some(x), Some(y), Some(z), Some(c)) => self.data[self.offset(x, y, z, c)],
            _ => 0.0,
        }
    }

    /// Read at real-valued coordinates.
    pub fn read(&self, x: f64, y: f64, z: f64, c: f64, interpolation: Interpolation, boundary: Boundary) -> f64 {
        if self.is_empty() || !(x.is_finite() && y.is_finite() && z.is_finite() && c.is_finite()) {
            return 0.0;
        }
        let c = c.round() as i64;
        match interpolation {
            Interpolation::Nearest => {
                self.at(x.round() as i64, y.round() as i64, z.round() as i64, c, boundary)
            }
            Interpolation::Linear => {
                let (x0, y0, z0) = (x.floor(), y.floor(), z.floor());
                let (dx, dy, dz) = (x - x0, y - y0, z - z0);
                let (x0, y0, z0) = (x0 as i64, y0 as i64, z0 as i64);
                let mut acc = 0.0;
                for (kz, wz) in [(0, 1.0 - dz), (1, dz)] {
                    if wz == 0.0 {
                        continue;
                    }
                    for (ky, wy) in [(0, 1.0 - dy), (1, dy)] {
                        if wy == 0.0 {
                            continue;
                        }
                        for (kx, wx) in [(0, 1.0 - dx), (1, dx)] {
                            if wx == 0.0 {
                                continue;
                            }
                            acc += wx * wy * wz * self.at(x0 + kx, y0 + ky, z0 + kz, c, boundary);
                        }
                    }
                }
                acc
            }
        }
    }

    /// Read at a linear offset into the whole buffer.
    pub fn read_offset(&self, offset: f64, boundary: Boundary) -> f64 {
        if !offset.is_finite() {
            return 0.0;
        }
        match boundary.resolve(offset.round() as i64, self.data.len()) {
            Some(off) => self.data[off],
            None => 0.0,
        }
    }

    /// All channels at a spatial offset (over `width*height*depth`).
    pub fn read_spatial(&self, offset: f64, boundary: Boundary, out: &mut [f64]) {
        let plane = self.plane();
        let resolved = if offset.is_finite() { boundary.resolve(offset.round() as i64, plane) } else { None };
        for (c, v) in out.iter_mut().enumerate() {
            *v = match resolved {
                Some(off) if c < self.spectrum => self.data[off + c * plane],
                _ => 0.0,
            };
        }
    }

    /// Write at rounded coordinates; out-of-range writes are dropped.
    pub fn write(&mut self, x: f64, y: f64, z: f64, c: f64, value: f64) {
        if let Some(off) = self.checked_offset(x, y, z, c) {
            self.data[off] = value;
        }
    }

    pub fn write_offset(&mut self, offset: f64, value: f64) {
        if offset.is_finite() {
            let off = offset.round();
            if off >= 0.0 && (off as usize) < self.data.len() {
                self.data[off as usize] = value;
            }
        }
    }

    /// Write channel values at a spatial offset.
    pub fn write_spatial(&mut self, offset: f64, values: &[f64]) {
        let plane = self.plane();
        if !offset.is_finite() || offset.round() < 0.0 || offset.round() as usize >= plane {
            return;
        }
        let off = offset.round() as usize;
        for (c, v) in values.iter().take(self.spectrum).enumerate() {
            self.data[off + c * plane] = *v;
        }
    }

    fn checked_offset(&self, x: f64, y: f64, z: f64, c: f64) -> Option<usize> {
        let coords = [x, y, z, c].map(f64::round);
        if coords.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        let [x, y, z, c] = coords.map(|v| v as usize);
        if x >= self.width || y >= self.height || z >= self.depth || c >= self.spectrum {
            return None;
        }
        Some(self.offset(x, y, z, c))
    }

    fn coords_of(&self, off: usize) -> [usize; 4] {
        let x = off % self.width;
        let rest = off / self.width;
        let y = rest % self.height;
        let rest = rest / self.height;
        let z = rest % self.depth;
        let c = rest / self.depth;
        [x, y, z, c]
    }

    pub fn stats(&self) -> Stats {
        if self.data.is_empty() {
            return Stats::empty();
        }
        let n = self.data.len() as f64;
        let (mut imin, mut imax) = (0, 0);
        let (mut sum, mut sum2, mut product) = (0.0, 0.0, 1.0);
        for (k, &v) in self.data.iter().enumerate() {
            if v < self.data[imin] {
                imin = k;
            }
            if v > self.data[imax] {
                imax = k;
            }
            sum += v;
            sum2 += v * v;
            product *= v;
        }
        let variance = if self.data.len() > 1 { (sum2 - sum * sum / n) / (n - 1.0) } else { 0.0 };
        let mut sorted = self.data.clone();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 { 0.5 * (sorted[mid - 1] + sorted[mid]) } else { sorted[mid] };
        Stats {
            min: self.data[imin],
            max: self.data[imax],
            mean: sum / n,
            variance: variance.max(0.0),
            sum,
            product,
            median,
            norm: sum2.sqrt(),
            argmin: self.coords_of(imin),
            argmax: self.coords_of(imax),
        }
    }
}

/// The four collaborators a formula can read from and write to.
///
/// Reads go to `input`, falling back to `output` when no input is bound; list reads go to
/// `list_in`, falling back to `list_out`. Writes always target `output` / `list_out`.
#[derive(Debug, Default)]
pub struct Images<'a> {
    pub input: Option<&'a Image>,
    pub output: Option<&'a mut Image>,
    pub list_in: &'a [Image],
    pub list_out: Option<&'a mut [Image]>,
}

impl<'a> Images<'a> {
    pub fn none() -> Images<'a> {
        Images::default()
    }

    pub fn input(image: &'a Image) -> Images<'a> {
        Images { input: Some(image), ..Images::default() }
    }

    pub fn output(image: &'a mut Image) -> Images<'a> {
        Images { output: Some(image), ..Images::default() }
    }

    pub fn reader(&self) -> Option<&Image> {
        self.input.or(self.output.as_deref())
    }

    pub fn writer(&mut self) -> Option<&mut Image> {
        self.output.as_deref_mut()
    }

    pub fn list_len(&self) -> usize {
        if !self.list_in.is_empty() {
            self.list_in.len()
        } else {
            self.list_out.as_deref().map_or(0, <[Image]>::len)
        }
    }

    /// Resolve a list index: values wrap modulo the list length.
    fn list_index(len: usize, k: f64) -> Option<usize> {
        if len == 0 || !k.is_finite() {
            return None;
        }
        Some((k.round() as i64).rem_euclid(len as i64) as usize)
    }

    pub fn list_reader(&self, k: f64) -> Option<&Image> {
        let idx = Self::list_index(self.list_len(), k)?;
        if !self.list_in.is_empty() {
            self.list_in.get(idx)
        } else {
            self.list_out.as_deref().and_then(|l| l.get(idx))
        }
    }

    pub fn list_writer(&mut self, k: f64) -> Option<&mut Image> {
        let list = self.list_out.as_deref_mut()?;
        let idx = Self::list_index(list.len(), k)?;
        list.get_mut(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Image {
        Image::from_row(vec![1.0, 2.0, 3.0, 4.0, 5.0])
    }

    #[test]
    fn boundary_policies() {
        let img = ramp();
        let n = Interpolation::Nearest;
        assert_eq!(img.read(-1.0, 0.0, 0.0, 0.0, n, Boundary::Dirichlet), 0.0);
        assert_eq!(img.read(-1.0, 0.0, 0.0, 0.0, n, Boundary::Neumann), 1.0);
        assert_eq!(img.read(-1.0, 0.0, 0.0, 0.0, n, Boundary::Periodic), 5.0);
        assert_eq!(img.read(-1.0, 0.0, 0.0, 0.0, n, Boundary::Mirror), 1.0);
        assert_eq!(img.read(6.0, 0.0, 0.0, 0.0, n, Boundary::Mirror), 4.0);
    }

    #[test]
    fn linear_interpolation_between_pixels() {
        let img = ramp();
        let v = img.read(1.25, 0.0, 0.0, 0.0, Interpolation::Linear, Boundary::Neumann);
        assert!((v - 2.25).abs() < 1e-12);
    }

    #[test]
    fn out_of_range_writes_are_dropped() {
        let mut img = ramp();
        img.write(7.0, 0.0, 0.0, 0.0, 9.0);
        img.write(-1.0, 0.0, 0.0, 0.0, 9.0);
        img.write_offset(2.0, 9.0);
        assert_eq!(img.data(), &[1.0, 2.0, 9.0, 4.0, 5.0]);
    }

    #[test]
    fn planar_offsets() {
        let img = Image::with_data(2, 1, 1, 3, vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0]).unwrap();
        let mut out = [0.0; 3];
        img.read_spatial(1.0, Boundary::Dirichlet, &mut out);
        assert_eq!(out, [1.0, 11.0, 21.0]);
        assert_eq!(img.get(0, 0, 0, 2), 20.0);
    }

    #[test]
    fn stats_of_ramp() {
        let s = ramp().stats();
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 5.0);
        assert_eq!(s.mean, 3.0);
        assert_eq!(s.median, 3.0);
        assert_eq!(s.sum, 15.0);
        assert_eq!(s.product, 120.0);
        assert!((s.variance - 2.5).abs() < 1e-12);
        assert_eq!(s.argmax, [4, 0, 0, 0]);
    }

    #[test]
    fn list_index_wraps() {
        let list = vec![ramp(), Image::from_row(vec![7.0])];
        let images = Images { list_in: &list, ..Images::default() };
        assert_eq!(images.list_reader(3.0).map(Image::width), Some(1));
        assert_eq!(images.list_reader(-2.0).map(Image::width), Some(5));
    }
}
