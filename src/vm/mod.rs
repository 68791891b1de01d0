//! Bytecode program and the interpreter that runs it.
//!
//! A [`Program`] is immutable once compiled and shared behind an `Arc`; every
//! [`CompiledProgram`] owns a private copy of the register memory and an RNG, so one program can
//! be evaluated from many threads at once.

pub mod linalg;
pub mod ops;

use std::sync::Arc;

use chrono::{Datelike, Timelike};
use parking_lot::ReentrantMutex;
use serde::Serialize;
use smallvec::SmallVec;

use crate::arena::{Slot, SlotKind, reserved};
use crate::image::{Boundary, Image, Images, Interpolation};
pub use linalg::Matrix;
pub use ops::{Binary, Complex, ComplexUnary, Linear, Reduce, Ternary, Unary};

/// Operand layout of a component-wise vector operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// vector, vector
    VV,
    /// vector, scalar
    VS,
    /// scalar, vector
    SV,
}

/// Piece of a concatenation, reduction or echo: a scalar (`len == 0`) or a vector run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub slot: Slot,
    pub len: u32,
}

/// Complex operand: a `(re, im)` vector or a real scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cx {
    pub slot: Slot,
    pub pair: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRef {
    Main,
    /// List image whose index is held in the slot.
    List(Slot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pos {
    Offset(Slot),
    Coords([Slot; 4]),
}

/// Where a pixel access lands and how out-of-range reads resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub image: ImageRef,
    pub pos: Pos,
    pub relative: bool,
    pub interpolation: Slot,
    pub boundary: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dist {
    Uniform,
    Gauss,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Copy { dst: Slot, src: Slot },
    CopyVec { dst: Slot, src: Slot, len: u32 },
    /// Broadcast a scalar into every component.
    Fill { dst: Slot, src: Slot, len: u32 },
    Unary { op: Unary, dst: Slot, a: Slot },
    Binary { op: Binary, dst: Slot, a: Slot, b: Slot },
    Ternary { op: Ternary, dst: Slot, a: Slot, b: Slot, c: Slot },
    Linear { form: Linear, dst: Slot, a: Slot, b: Slot, c: Slot },
    VecUnary { op: Unary, dst: Slot, a: Slot, len: u32 },
    VecBinary { op: Binary, shape: Shape, dst: Slot, a: Slot, b: Slot, len: u32 },
    VecEq { dst: Slot, a: Slot, b: Slot, len: u32, negate: bool },
    Concat { dst: Slot, parts: SmallVec<[Part; 4]> },
    Index { dst: Slot, base: Slot, len: u32, index: Slot },
    SetIndex { base: Slot, len: u32, index: Slot, src: Slot },
    Slice { dst: Slot, base: Slot, len: u32, start: Slot, step: Slot, count: u32 },
    Complex { op: Complex, dst: Slot, a: Cx, b: Cx },
    ComplexUnary { op: ComplexUnary, dst: Slot, a: Cx },
    Reduce { op: Reduce, dst: Slot, parts: SmallVec<[Part; 4]> },
    Matrix { op: Matrix, dst: Slot, a: Slot, b: Slot },
    ReadPixel { dst: Slot, at: Pixel },
    ReadVector { dst: Slot, len: u32, at: Pixel },
    WritePixel { at: Pixel, src: Slot },
    WriteVector { at: Pixel, src: Slot, len: u32 },
    Crop { dst: Slot, image: ImageRef, origin: [Slot; 4], size: [u32; 4], boundary: Slot },
    Random { dist: Dist, dst: Slot, lo: Slot, hi: Slot },
    Srand { src: Slot },
    Date { dst: Slot, attr: Slot },
    Print { label: Box<str>, src: Slot, len: u32 },
    Echo { parts: SmallVec<[Part; 4]> },
    Debug { label: Box<str>, src: Slot, len: u32 },
    /// Skip the next `count` instructions when `(cond != 0) == when`.
    Skip { cond: Slot, when: bool, count: u32 },
    Jump { count: u32 },
    /// Run the next `count` instructions while holding the program-wide lock.
    Critical { count: u32 },
    Break,
    Continue,
}

impl Instr {
    /// Inputs of an instruction that is a pure function of them, `None` otherwise.
    pub fn pure_inputs(&self) -> Option<SmallVec<[Slot; 4]>> {
        let mut v = SmallVec::new();
        match *self {
            Instr::Copy { src, .. } | Instr::CopyVec { src, .. } | Instr::Fill { src, .. } => v.push(src),
            Instr::Unary { a, .. } | Instr::VecUnary { a, .. } => v.push(a),
            Instr::Binary { a, b, .. } | Instr::VecBinary { a, b, .. } | Instr::VecEq { a, b, .. } => {
                v.extend([a, b])
            }
            Instr::Matrix { a, b, .. } => v.extend([a, b]),
            Instr::Ternary { a, b, c, .. } | Instr::Linear { a, b, c, .. } => v.extend([a, b, c]),
            Instr::Concat { ref parts, .. } | Instr::Reduce { ref parts, .. } => {
                v.extend(parts.iter().map(|p| p.slot))
            }
            Instr::Index { base, index, .. } => v.extend([base, index]),
            Instr::Slice { base, start, step, .. } => v.extend([base, start, step]),
            Instr::Complex { a, b, .. } => v.extend([a.slot, b.slot]),
            Instr::ComplexUnary { a, .. } => v.push(a.slot),
            _ => return None,
        }
        Some(v)
    }

    /// Destination of a value-producing instruction.
    pub fn output(&self) -> Option<Slot> {
        match *self {
            Instr::Copy { dst, .. }
            | Instr::CopyVec { dst, .. }
            | Instr::Fill { dst, .. }
            | Instr::Unary { dst, .. }
            | Instr::Binary { dst, .. }
            | Instr::Ternary { dst, .. }
            | Instr::Linear { dst, .. }
            | Instr::VecUnary { dst, .. }
            | Instr::VecBinary { dst, .. }
            | Instr::VecEq { dst, .. }
            | Instr::Concat { dst, .. }
            | Instr::Index { dst, .. }
            | Instr::Slice { dst, .. }
            | Instr::Complex { dst, .. }
            | Instr::ComplexUnary { dst, .. }
            | Instr::Reduce { dst, .. }
            | Instr::Matrix { dst, .. }
            | Instr::ReadPixel { dst, .. }
            | Instr::ReadVector { dst, .. }
            | Instr::Crop { dst, .. }
            | Instr::Random { dst, .. }
            | Instr::Date { dst, .. } => Some(dst),
            _ => None,
        }
    }
}

fn gather(mem: &[f64], parts: &[Part], out: &mut SmallVec<[f64; 16]>) {
    for p in parts {
        let s = p.slot as usize;
        if p.len == 0 {
            out.push(mem[s]);
        } else {
            out.extend_from_slice(&mem[s + 1..=s + p.len as usize]);
        }
    }
}

fn complex(mem: &[f64], x: Cx) -> (f64, f64) {
    let s = x.slot as usize;
    if x.pair { (mem[s + 1], mem[s + 2]) } else { (mem[s], 0.0) }
}

fn vector_index(mem: &[f64], index: Slot, len: u32) -> Option<usize> {
    let k = mem[index as usize];
    if k.is_finite() && k >= 0.0 && (k.trunc() as u64) < len as u64 {
        Some(k.trunc() as usize)
    } else {
        None
    }
}

/// Execute an instruction that only touches register memory.
///
/// Returns `false`, leaving memory untouched, for instructions with effects outside it. The
/// compiler runs the same function on its own arena to fold constant expressions.
pub(crate) fn apply(instr: &Instr, mem: &mut [f64]) -> bool {
    match *instr {
        Instr::Copy { dst, src } => mem[dst as usize] = mem[src as usize],
        Instr::CopyVec { dst, src, len } => {
            let s = src as usize + 1;
            mem.copy_within(s..s + len as usize, dst as usize + 1);
        }
        Instr::Fill { dst, src, len } => {
            let v = mem[src as usize];
            let d = dst as usize + 1;
            mem[d..d + len as usize].fill(v);
        }
        Instr::Unary { op, dst, a } => mem[dst as usize] = op.apply(mem[a as usize]),
        Instr::Binary { op, dst, a, b } => mem[dst as usize] = op.apply(mem[a as usize], mem[b as usize]),
        Instr::Ternary { op, dst, a, b, c } => {
            mem[dst as usize] = op.apply(mem[a as usize], mem[b as usize], mem[c as usize])
        }
        Instr::Linear { form, dst, a, b, c } => {
            mem[dst as usize] = form.apply(mem[a as usize], mem[b as usize], mem[c as usize])
        }
        Instr::VecUnary { op, dst, a, len } => {
            for k in 1..=len as usize {
                mem[dst as usize + k] = op.apply(mem[a as usize + k]);
            }
        }
        Instr::VecBinary { op, shape, dst, a, b, len } => {
            let (d, a, b) = (dst as usize, a as usize, b as usize);
            for k in 1..=len as usize {
                mem[d + k] = match shape {
                    Shape::VV => op.apply(mem[a + k], mem[b + k]),
                    Shape::VS => op.apply(mem[a + k], mem[b]),
                    Shape::SV => op.apply(mem[a], mem[b + k]),
                };
            }
        }
        Instr::VecEq { dst, a, b, len, negate } => {
            let (a, b, n) = (a as usize + 1, b as usize + 1, len as usize);
            let equal = mem[a..a + n] == mem[b..b + n];
            mem[dst as usize] = (equal != negate) as u8 as f64;
        }
        Instr::Concat { dst, ref parts } => {
            let mut values = SmallVec::new();
            gather(mem, parts, &mut values);
            let d = dst as usize + 1;
            mem[d..d + values.len()].copy_from_slice(&values);
        }
        Instr::Index { dst, base, len, index } => {
            mem[dst as usize] = match vector_index(mem, index, len) {
                Some(k) => mem[base as usize + 1 + k],
                None => f64::NAN,
            };
        }
        Instr::SetIndex { base, len, index, src } => {
            if let Some(k) = vector_index(mem, index, len) {
                mem[base as usize + 1 + k] = mem[src as usize];
            }
        }
        Instr::Slice { dst, base, len, start, step, count } => {
            let (start, step) = (mem[start as usize].trunc(), mem[step as usize].trunc());
            for j in 0..count as usize {
                let k = start + step * j as f64;
                mem[dst as usize + 1 + j] = if k >= 0.0 && k < len as f64 {
                    mem[base as usize + 1 + k as usize]
                } else {
                    f64::NAN
                };
            }
        }
        Instr::Complex { op, dst, a, b } => {
            let (re, im) = op.apply(complex(mem, a), complex(mem, b));
            mem[dst as usize + 1] = re;
            mem[dst as usize + 2] = im;
        }
        Instr::ComplexUnary { op, dst, a } => {
            let (re, im) = op.apply(complex(mem, a));
            if op.is_pair() {
                mem[dst as usize + 1] = re;
                mem[dst as usize + 2] = im;
            } else {
                mem[dst as usize] = re;
            }
        }
        Instr::Reduce { op, dst, ref parts } => {
            let mut values = SmallVec::new();
            gather(mem, parts, &mut values);
            mem[dst as usize] = op.apply(&values);
        }
        Instr::Matrix { op, dst, a, b } => {
            let (la, lb) = op.input_lens();
            let (a, b) = (a as usize + 1, b as usize + 1);
            let av: SmallVec<[f64; 16]> = SmallVec::from_slice(&mem[a..a + la]);
            let bv: SmallVec<[f64; 16]> = SmallVec::from_slice(&mem[b..b + lb]);
            let n = op.output_len() as usize;
            let mut out: SmallVec<[f64; 16]> = SmallVec::from_elem(0.0, n.max(1));
            op.apply(&av, &bv, &mut out);
            if n == 0 {
                mem[dst as usize] = out[0];
            } else {
                let d = dst as usize + 1;
                mem[d..d + n].copy_from_slice(&out);
            }
        }
        _ => return false,
    }
    true
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum EvalResult {
    Scalar(f64),
    Vector(Vec<f64>),
    Break,
    Continue,
}

impl EvalResult {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            EvalResult::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            EvalResult::Vector(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Done,
    Break,
    Continue,
}

/// Compiled, immutable form of a formula.
#[derive(Debug)]
pub struct Program {
    pub(crate) begin: Vec<Instr>,
    pub(crate) main: Vec<Instr>,
    pub(crate) end: Vec<Instr>,
    /// Initial register memory, constant pool included.
    pub(crate) template: Vec<f64>,
    pub(crate) result: Slot,
    pub(crate) result_len: u32,
    pub(crate) result_kind: SlotKind,
    pub(crate) parallel: bool,
    pub(crate) critical: ReentrantMutex<()>,
}

impl Program {
    pub fn instructions(&self) -> &[Instr] {
        &self.main
    }

    pub fn begin_instructions(&self) -> &[Instr] {
        &self.begin
    }

    pub fn end_instructions(&self) -> &[Instr] {
        &self.end
    }

    pub fn is_parallelizable(&self) -> bool {
        self.parallel
    }

    pub fn result_len(&self) -> u32 {
        self.result_len
    }

    pub fn result_kind(&self) -> SlotKind {
        self.result_kind
    }

    /// Compile-time value of the result slot.
    pub fn result_value(&self) -> f64 {
        self.template[self.result as usize]
    }

    pub fn arena_len(&self) -> usize {
        self.template.len()
    }
}

/// A program plus the private state one worker needs to evaluate it.
#[derive(Debug)]
pub struct CompiledProgram {
    program: Arc<Program>,
    mem: Vec<f64>,
    rng: fastrand::Rng,
    begun: bool,
}

#[derive(Debug, Clone, Copy)]
enum Segment {
    Begin,
    Main,
    End,
}

impl CompiledProgram {
    pub(crate) fn new(program: Program, seed: Option<u64>) -> CompiledProgram {
        let mem = program.template.clone();
        let rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        CompiledProgram { program: Arc::new(program), mem, rng, begun: false }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn is_parallelizable(&self) -> bool {
        self.program.parallel
    }

    /// Size of the result vector, 0 for a scalar formula. [`Self::evaluate`] returns
    /// [`EvalResult::Vector`] of exactly this size when it is non-zero and
    /// [`EvalResult::Scalar`] otherwise, unless the formula breaks or continues.
    pub fn result_len(&self) -> u32 {
        self.program.result_len
    }

    pub fn set_position(&mut self, x: f64, y: f64, z: f64, c: f64) {
        self.mem[reserved::X as usize] = x;
        self.mem[reserved::Y as usize] = y;
        self.mem[reserved::Z as usize] = z;
        self.mem[reserved::C as usize] = c;
    }

    pub fn position(&self) -> [f64; 4] {
        [reserved::X, reserved::Y, reserved::Z, reserved::C].map(|s| self.mem[s as usize])
    }

    /// Value currently held by a slot.
    pub fn slot_value(&self, slot: Slot) -> f64 {
        self.mem[slot as usize]
    }

    /// Run the begin segment; later calls do nothing.
    pub fn run_begin(&mut self, images: &mut Images<'_>) {
        if !self.begun {
            self.begun = true;
            self.run(Segment::Begin, images);
        }
    }

    pub fn run_end(&mut self, images: &mut Images<'_>) {
        self.run(Segment::End, images);
    }

    /// Evaluate the main segment at the current position.
    pub fn evaluate(&mut self, images: &mut Images<'_>) -> EvalResult {
        self.run_begin(images);
        match self.run(Segment::Main, images) {
            Flow::Break => return EvalResult::Break,
            Flow::Continue => return EvalResult::Continue,
            Flow::Done => {}
        }
        let slot = self.program.result as usize;
        match self.program.result_len as usize {
            0 => EvalResult::Scalar(self.mem[slot]),
            n => EvalResult::Vector(self.mem[slot + 1..=slot + n].to_vec()),
        }
    }

    pub fn evaluate_at(&mut self, position: [f64; 4], images: &mut Images<'_>) -> EvalResult {
        let [x, y, z, c] = position;
        self.set_position(x, y, z, c);
        self.evaluate(images)
    }

    /// Clone for a worker thread: shares the program, copies memory, and perturbs the RNG by `thread`.
    pub fn fork(&self, thread: usize) -> CompiledProgram {
        self.fork_stream(thread, thread as u64)
    }

    /// Like [`Self::fork`], with the RNG perturbed by `stream` instead of the thread id.
    pub(crate) fn fork_stream(&self, thread: usize, stream: u64) -> CompiledProgram {
        let mut mem = self.mem.clone();
        mem[reserved::T as usize] = thread as f64;
        let seed = self.rng.get_seed() ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        CompiledProgram {
            program: Arc::clone(&self.program),
            mem,
            rng: fastrand::Rng::with_seed(seed),
            begun: self.begun,
        }
    }

    fn run(&mut self, segment: Segment, images: &mut Images<'_>) -> Flow {
        let program = &*self.program;
        let code = match segment {
            Segment::Begin => &program.begin,
            Segment::Main => &program.main,
            Segment::End => &program.end,
        };
        let mut machine = Machine {
            mem: &mut self.mem,
            rng: &mut self.rng,
            images,
            critical: &program.critical,
        };
        machine.run(code)
    }
}

struct Machine<'m, 'a> {
    mem: &'m mut [f64],
    rng: &'m mut fastrand::Rng,
    images: &'m mut Images<'a>,
    critical: &'m ReentrantMutex<()>,
}

fn source<'i>(images: &'i Images<'_>, mem: &[f64], image: ImageRef) -> Option<&'i Image> {
    match image {
        ImageRef::Main => images.reader(),
        ImageRef::List(k) => images.list_reader(mem[k as usize]),
    }
}

fn target<'i>(images: &'i mut Images<'_>, mem: &[f64], image: ImageRef) -> Option<&'i mut Image> {
    match image {
        ImageRef::Main => images.writer(),
        ImageRef::List(k) => images.list_writer(mem[k as usize]),
    }
}

fn coords(mem: &[f64], pos: [Slot; 4], relative: bool) -> [f64; 4] {
    let mut p = pos.map(|s| mem[s as usize]);
    if relative {
        p[0] += mem[reserved::X as usize];
        p[1] += mem[reserved::Y as usize];
        p[2] += mem[reserved::Z as usize];
        p[3] += mem[reserved::C as usize];
    }
    p
}

/// Linear offset of an offset-form access; `spatial` ignores the channel of the current position.
fn offset(mem: &[f64], img: &Image, slot: Slot, relative: bool, spatial: bool) -> f64 {
    let off = mem[slot as usize];
    if !relative {
        return off;
    }
    let [w, h, d, _] = img.dims().map(|v| v as f64);
    let [x, y, z, c] = [reserved::X, reserved::Y, reserved::Z, reserved::C].map(|s| mem[s as usize]);
    let c = if spatial { 0.0 } else { c };
    off + x + w * (y + h * (z + d * c))
}

fn render(values: &[f64]) -> String {
    let items: Vec<String> = values.iter().map(f64::to_string).collect();
    format!("[{}]", items.join(","))
}

fn text(values: &[f64]) -> String {
    values.iter().map(|&v| char::from(v.clamp(0.0, 255.0) as u8)).collect()
}

impl Machine<'_, '_> {
    fn run(&mut self, code: &[Instr]) -> Flow {
        let mut ip = 0;
        while ip < code.len() {
            let instr = &code[ip];
            ip += 1;
            match *instr {
                Instr::Skip { cond, when, count } => {
                    if (self.mem[cond as usize] != 0.0) == when {
                        ip += count as usize;
                    }
                }
                Instr::Jump { count } => ip += count as usize,
                Instr::Critical { count } => {
                    let end = ip + count as usize;
                    let critical = self.critical;
                    let flow = {
                        let _guard = critical.lock();
                        self.run(&code[ip..end])
                    };
                    if flow != Flow::Done {
                        return flow;
                    }
                    ip = end;
                }
                Instr::Break => return Flow::Break,
                Instr::Continue => return Flow::Continue,
                _ => {
                    if !apply(instr, self.mem) {
                        self.effect(instr);
                    }
                }
            }
        }
        Flow::Done
    }

    fn modes(&self, at: &Pixel) -> (Interpolation, Boundary) {
        (
            Interpolation::from_code(self.mem[at.interpolation as usize]),
            Boundary::from_code(self.mem[at.boundary as usize]),
        )
    }

    fn effect(&mut self, instr: &Instr) {
        match *instr {
            Instr::ReadPixel { dst, ref at } => {
                let (interpolation, boundary) = self.modes(at);
                let mem = &*self.mem;
                let value = match source(self.images, mem, at.image) {
                    None => 0.0,
                    Some(img) => match at.pos {
                        Pos::Coords(pos) => {
                            let [x, y, z, c] = coords(mem, pos, at.relative);
                            img.read(x, y, z, c, interpolation, boundary)
                        }
                        Pos::Offset(slot) => img.read_offset(offset(mem, img, slot, at.relative, false), boundary),
                    },
                };
                self.mem[dst as usize] = value;
            }
            Instr::ReadVector { dst, len, ref at } => {
                let (interpolation, boundary) = self.modes(at);
                let mut out: SmallVec<[f64; 16]> = SmallVec::from_elem(0.0, len as usize);
                let mem = &*self.mem;
                if let Some(img) = source(self.images, mem, at.image) {
                    match at.pos {
                        Pos::Coords(pos) => {
                            let [x, y, z, _] = coords(mem, pos, at.relative);
                            for (c, v) in out.iter_mut().enumerate() {
                                *v = img.read(x, y, z, c as f64, interpolation, boundary);
                            }
                        }
                        Pos::Offset(slot) => {
                            img.read_spatial(offset(mem, img, slot, at.relative, true), boundary, &mut out)
                        }
                    }
                }
                let d = dst as usize + 1;
                self.mem[d..d + out.len()].copy_from_slice(&out);
            }
            Instr::WritePixel { ref at, src } => {
                let mem = &*self.mem;
                if let Some(img) = target(self.images, mem, at.image) {
                    let value = mem[src as usize];
                    match at.pos {
                        Pos::Coords(pos) => {
                            let [x, y, z, c] = coords(mem, pos, at.relative);
                            img.write(x, y, z, c, value);
                        }
                        Pos::Offset(slot) => {
                            let off = offset(mem, img, slot, at.relative, false);
                            img.write_offset(off, value);
                        }
                    }
                }
            }
            Instr::WriteVector { ref at, src, len } => {
                let mem = &*self.mem;
                if let Some(img) = target(self.images, mem, at.image) {
                    let values = &mem[src as usize + 1..=src as usize + len as usize];
                    match at.pos {
                        Pos::Coords(pos) => {
                            let [x, y, z, _] = coords(mem, pos, at.relative);
                            for (c, &v) in values.iter().enumerate() {
                                img.write(x, y, z, c as f64, v);
                            }
                        }
                        Pos::Offset(slot) => {
                            let off = offset(mem, img, slot, at.relative, true);
                            img.write_spatial(off, values);
                        }
                    }
                }
            }
            Instr::Crop { dst, image, origin, size, boundary } => {
                let boundary = Boundary::from_code(self.mem[boundary as usize]);
                let [ox, oy, oz, oc] = origin.map(|s| self.mem[s as usize]);
                let [dx, dy, dz, dc] = size;
                let Some(n) = size.iter().try_fold(1usize, |n, &d| n.checked_mul(d as usize)) else {
                    return;
                };
                let mut out: Vec<f64> = vec![0.0; n];
                if let Some(img) = source(self.images, self.mem, image) {
                    let mut k = 0;
                    for c in 0..dc {
                        for z in 0..dz {
                            for y in 0..dy {
                                for x in 0..dx {
                                    out[k] = img.read(
                                        ox + x as f64,
                                        oy + y as f64,
                                        oz + z as f64,
                                        oc + c as f64,
                                        Interpolation::Nearest,
                                        boundary,
                                    );
                                    k += 1;
                                }
                            }
                        }
                    }
                }
                let d = dst as usize + 1;
                self.mem[d..d + n].copy_from_slice(&out);
            }
            Instr::Random { dist, dst, lo, hi } => {
                let (lo, hi) = (self.mem[lo as usize], self.mem[hi as usize]);
                self.mem[dst as usize] = match dist {
                    Dist::Uniform => lo + (hi - lo) * self.rng.f64(),
                    Dist::Gauss => {
                        let u1 = 1.0 - self.rng.f64();
                        let u2 = self.rng.f64();
                        lo + hi * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
                    }
                };
            }
            Instr::Srand { src } => {
                *self.rng = fastrand::Rng::with_seed(self.mem[src as usize] as i64 as u64);
            }
            Instr::Date { dst, attr } => {
                let now = chrono::Local::now();
                self.mem[dst as usize] = match self.mem[attr as usize].round() as i64 {
                    0 => now.year() as f64,
                    1 => now.month() as f64,
                    2 => now.day() as f64,
                    3 => now.weekday().num_days_from_monday() as f64,
                    4 => now.hour() as f64,
                    5 => now.minute() as f64,
                    6 => now.second() as f64,
                    7 => now.timestamp_subsec_millis() as f64,
                    _ => f64::NAN,
                };
            }
            Instr::Print { ref label, src, len } => {
                let value = self.show(src, len);
                eprintln!("{label} = {value}");
            }
            Instr::Debug { ref label, src, len } => {
                log::debug!("{label} = {}", self.show(src, len));
            }
            Instr::Echo { ref parts } => {
                let line: String = parts
                    .iter()
                    .map(|p| {
                        if p.len == 0 {
                            self.mem[p.slot as usize].to_string()
                        } else {
                            let s = p.slot as usize;
                            text(&self.mem[s + 1..=s + p.len as usize])
                        }
                    })
                    .collect();
                eprintln!("{line}");
            }
            _ => unreachable!("pure or control instruction reached the effect handler: {instr:?}"),
        }
    }

    fn show(&self, src: Slot, len: u32) -> String {
        let s = src as usize;
        if len == 0 { self.mem[s].to_string() } else { render(&self.mem[s + 1..=s + len as usize]) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn memory(values: &[f64]) -> Vec<f64> {
        values.to_vec()
    }

    #[test]
    fn pure_instructions_write_their_destination() {
        let mut mem = memory(&[0.0, 2.0, 3.0, 0.0]);
        assert!(apply(&Instr::Binary { op: Binary::Mul, dst: 3, a: 1, b: 2 }, &mut mem));
        assert_eq!(mem[3], 6.0);
        assert!(apply(&Instr::Linear { form: Linear::MulSub, dst: 0, a: 1, b: 2, c: 3 }, &mut mem));
        assert_eq!(mem[0], 0.0);
    }

    #[test]
    fn broadcast_shapes() {
        // slot 0: scalar 10; slots 1..=3: vector [1,2]; slots 4..=6: destination
        let mut mem = memory(&[10.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0]);
        apply(&Instr::VecBinary { op: Binary::Sub, shape: Shape::SV, dst: 4, a: 0, b: 1, len: 2 }, &mut mem);
        assert_eq!(&mem[5..7], &[9.0, 8.0]);
        apply(&Instr::VecBinary { op: Binary::Sub, shape: Shape::VS, dst: 4, a: 1, b: 0, len: 2 }, &mut mem);
        assert_eq!(&mem[5..7], &[-9.0, -8.0]);
    }

    #[test]
    fn index_out_of_range_reads_nan() {
        let mut mem = memory(&[0.0, 5.0, 6.0, 7.0, 0.0]);
        apply(&Instr::Index { dst: 0, base: 1, len: 2, index: 2 }, &mut mem);
        assert!(mem[0].is_nan());
        mem[4] = 1.0;
        apply(&Instr::Index { dst: 0, base: 1, len: 2, index: 4 }, &mut mem);
        assert_eq!(mem[0], 6.0);
    }

    #[test]
    fn concat_and_reduce() {
        let mut mem = memory(&[4.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let parts: SmallVec<[Part; 4]> = smallvec![Part { slot: 1, len: 2 }, Part { slot: 0, len: 0 }];
        apply(&Instr::Concat { dst: 4, parts: parts.clone() }, &mut mem);
        assert_eq!(&mem[5..8], &[1.0, 2.0, 4.0]);
        apply(&Instr::Reduce { op: Reduce::Sum, dst: 8, parts }, &mut mem);
        assert_eq!(mem[8], 7.0);
    }

    #[test]
    fn critical_waits_for_the_shared_lock() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::time::Duration;

        let program = crate::compile("critical(x+1)", &Images::none()).unwrap();
        let done = AtomicBool::new(false);
        std::thread::scope(|scope| {
            let held = program.program().critical.lock();
            let mut worker = program.fork(1);
            let done = &done;
            let handle = scope.spawn(move || {
                let result = worker.evaluate_at([1.0, 0.0, 0.0, 0.0], &mut Images::none());
                done.store(true, Ordering::SeqCst);
                result
            });
            std::thread::sleep(Duration::from_millis(100));
            assert!(!done.load(Ordering::SeqCst), "critical body ran while another thread held the lock");
            drop(held);
            assert_eq!(handle.join().unwrap(), EvalResult::Scalar(2.0));
        });
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn effects_are_not_applied() {
        let mut mem = memory(&[1.0, 2.0]);
        assert!(!apply(&Instr::Srand { src: 0 }, &mut mem));
        assert!(!apply(&Instr::Break, &mut mem));
        assert_eq!(mem, vec![1.0, 2.0]);
    }
}
