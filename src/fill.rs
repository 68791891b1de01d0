//! Whole-image evaluation: run a formula at every pixel and store what it returns.
//!
//! Programs that never write pixels or global modes are evaluated row by row (`y`, `z`) against
//! the unmodified image, in parallel when the `parallel` feature is on; the results are stored once
//! every row is done. Other programs run in place, so reads observe earlier writes.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;

use crate::compiler::{self, CompileError};
use crate::config::Settings;
use crate::image::{Image, Images};
use crate::vm::{CompiledProgram, EvalResult};

/// What a fill did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FillStats {
    /// Evaluations that stored a value.
    pub pixels: usize,
    pub breaks: usize,
    pub continues: usize,
    /// Whether rows were evaluated on the thread pool.
    pub parallel: bool,
}

impl FillStats {
    fn merge(&mut self, other: FillStats) {
        self.pixels += other.pixels;
        self.breaks += other.breaks;
        self.continues += other.continues;
    }
}

/// Fill `image` with `expression` using default settings.
pub fn fill(image: &mut Image, expression: &str, list: &mut [Image]) -> Result<FillStats, CompileError> {
    fill_with(image, expression, list, &Settings::default())
}

pub fn fill_with(
    image: &mut Image,
    expression: &str,
    list: &mut [Image],
    settings: &Settings,
) -> Result<FillStats, CompileError> {
    let mut program = {
        let images = Images { input: Some(&*image), list_in: &*list, ..Images::default() };
        compiler::compile(expression, &images, settings)?
    };
    let stats = if program.is_parallelizable() {
        log::debug!("fill: {} rows against the unmodified image", image.height() * image.depth());
        by_rows(&mut program, image, list)
    } else {
        log::debug!("fill: sequential, in place");
        in_place(&mut program, image, list)
    };
    log::debug!(
        "fill: {} pixels, {} breaks, {} continues",
        stats.pixels,
        stats.breaks,
        stats.continues
    );
    Ok(stats)
}

/// Evaluate the pixel `(x, y, z)`, handing each value to `store` with its channel.
/// Returns `false` when the formula asked to stop.
fn visit(
    program: &mut CompiledProgram,
    images: &mut Images<'_>,
    [x, y, z]: [usize; 3],
    spectrum: usize,
    stats: &mut FillStats,
    mut store: impl FnMut(&mut Images<'_>, usize, f64),
) -> bool {
    // a vector result covers every channel in one evaluation
    let evaluations = if program.result_len() > 0 { 1 } else { spectrum };
    for c in 0..evaluations {
        match program.evaluate_at([x as f64, y as f64, z as f64, c as f64], images) {
            EvalResult::Scalar(v) => store(images, c, v),
            EvalResult::Vector(values) => {
                for (k, v) in values.into_iter().take(spectrum - c).enumerate() {
                    store(images, c + k, v);
                }
            }
            EvalResult::Continue => {
                stats.continues += 1;
                continue;
            }
            EvalResult::Break => {
                stats.breaks += 1;
                return false;
            }
        }
        stats.pixels += 1;
    }
    true
}

fn in_place(program: &mut CompiledProgram, image: &mut Image, list: &mut [Image]) -> FillStats {
    let [w, h, d, s] = image.dims();
    let mut images = Images { output: Some(image), list_out: Some(list), ..Images::default() };
    program.run_begin(&mut images);
    let mut stats = FillStats::default();
    'fill: for z in 0..d {
        for y in 0..h {
            for x in 0..w {
                let store = |images: &mut Images<'_>, c: usize, v: f64| {
                    if let Some(img) = images.writer() {
                        img.set(x, y, z, c, v);
                    }
                };
                if !visit(program, &mut images, [x, y, z], s, &mut stats, store) {
                    break 'fill;
                }
            }
        }
    }
    program.run_end(&mut images);
    stats
}

fn by_rows(program: &mut CompiledProgram, image: &mut Image, list: &[Image]) -> FillStats {
    let [w, h, d, s] = image.dims();
    let source = &*image;
    program.run_begin(&mut Images { input: Some(source), list_in: list, ..Images::default() });

    let shared = &*program;
    let row = |row: usize| -> (Vec<f64>, FillStats) {
        let (y, z) = (row % h, row / h);
        let thread = current_thread();
        let mut worker = shared.fork_stream(thread, row as u64);
        let mut images = Images { input: Some(source), list_in: list, ..Images::default() };
        // channel-major copy of the row; pixels the formula skips keep their value
        let mut values: Vec<f64> = (0..s).flat_map(|c| (0..w).map(move |x| source.get(x, y, z, c))).collect();
        let mut stats = FillStats::default();
        for x in 0..w {
            let store = |_: &mut Images<'_>, c: usize, v: f64| values[c * w + x] = v;
            if !visit(&mut worker, &mut images, [x, y, z], s, &mut stats, store) {
                break;
            }
        }
        (values, stats)
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<(Vec<f64>, FillStats)> = (0..h * d).into_par_iter().map(row).collect();
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<(Vec<f64>, FillStats)> = (0..h * d).map(row).collect();

    let mut stats = FillStats { parallel: cfg!(feature = "parallel"), ..FillStats::default() };
    for (k, (values, row_stats)) in rows.into_iter().enumerate() {
        let (y, z) = (k % h, k / h);
        for c in 0..s {
            for x in 0..w {
                image.set(x, y, z, c, values[c * w + x]);
            }
        }
        stats.merge(row_stats);
    }
    program.run_end(&mut Images { input: Some(&*image), list_in: list, ..Images::default() });
    stats
}

#[cfg(feature = "parallel")]
fn current_thread() -> usize {
    rayon::current_thread_index().unwrap_or(0)
}

#[cfg(not(feature = "parallel"))]
fn current_thread() -> usize {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: usize, h: usize) -> Image {
        let data = (0..w * h).map(|k| k as f64).collect();
        Image::with_data(w, h, 1, 1, data).unwrap()
    }

    #[test]
    fn scalar_formula_fills_every_pixel() {
        let mut img = Image::new(3, 2, 1, 1);
        let stats = fill(&mut img, "x+10*y", &mut []).unwrap();
        assert_eq!(img.data(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(stats.pixels, 6);
        assert_eq!(stats.parallel, cfg!(feature = "parallel"));
    }

    #[test]
    fn vector_results_fill_all_channels() {
        let mut img = Image::new(2, 1, 1, 3);
        fill(&mut img, "[x,1,2]", &mut []).unwrap();
        assert_eq!(img.get(1, 0, 0, 0), 1.0);
        assert_eq!(img.get(1, 0, 0, 1), 1.0);
        assert_eq!(img.get(0, 0, 0, 2), 2.0);
    }

    #[test]
    fn scalar_formulas_run_once_per_channel() {
        let mut img = Image::new(2, 1, 1, 3);
        let stats = fill(&mut img, "10*c+x", &mut []).unwrap();
        assert_eq!(img.data(), &[0.0, 1.0, 10.0, 11.0, 20.0, 21.0]);
        assert_eq!(stats.pixels, 6);

        let mut img = Image::new(2, 1, 1, 3);
        let stats = fill(&mut img, "c==1?continue():c", &mut []).unwrap();
        assert_eq!(img.data(), &[0.0, 0.0, 0.0, 0.0, 2.0, 2.0]);
        assert_eq!((stats.pixels, stats.continues), (4, 2));
    }

    #[test]
    fn short_vectors_leave_the_remaining_channels() {
        let mut img = Image::with_data(1, 1, 1, 3, vec![7.0, 8.0, 9.0]).unwrap();
        let stats = fill(&mut img, "[x+1,5]", &mut []).unwrap();
        assert_eq!(img.data(), &[1.0, 5.0, 9.0]);
        assert_eq!(stats.pixels, 1);
    }

    #[test]
    fn parallel_programs_read_the_unmodified_image() {
        let mut img = ramp(4, 1);
        fill(&mut img, "j(-1)", &mut []).unwrap();
        assert_eq!(img.data(), &[0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn serial_programs_observe_their_writes() {
        let mut img = ramp(4, 1);
        let stats = fill(&mut img, "boundary=1;j(-1)", &mut []).unwrap();
        assert!(!stats.parallel);
        assert_eq!(img.data(), &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn break_stops_and_continue_skips() {
        let mut img = ramp(4, 2);
        let stats = fill(&mut img, "x==1?continue():x==2?break():-1", &mut []).unwrap();
        assert_eq!(img.data(), &[-1.0, 1.0, 2.0, 3.0, -1.0, 5.0, 6.0, 7.0]);
        assert_eq!((stats.pixels, stats.continues, stats.breaks), (2, 2, 2));

        let mut img = ramp(4, 2);
        let stats = fill(&mut img, "boundary=0;x==2?break():-1", &mut []).unwrap();
        assert_eq!(img.data(), &[-1.0, -1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(stats.breaks, 1);
    }

    #[test]
    fn begin_runs_before_the_first_pixel() {
        let mut img = Image::new(3, 1, 1, 1);
        fill(&mut img, "begin(k=5);k+x", &mut []).unwrap();
        assert_eq!(img.data(), &[5.0, 6.0, 7.0]);
    }

    #[test]
    fn list_images_are_readable_and_writable() {
        let mut img = Image::new(2, 1, 1, 1);
        let mut list = [Image::from_row(vec![3.0, 4.0])];
        fill(&mut img, "i(#0)*2", &mut list).unwrap();
        assert_eq!(img.data(), &[6.0, 8.0]);

        fill(&mut img, "i(#0)=x+1;0", &mut list).unwrap();
        assert_eq!(list[0].data(), &[1.0, 2.0]);
    }

    #[test]
    fn compile_errors_leave_the_image_untouched() {
        let mut img = ramp(2, 1);
        let e = fill(&mut img, "foo", &mut []).unwrap_err();
        assert_eq!(e.code, "PXF-R001");
        assert_eq!(img.data(), &[0.0, 1.0]);
    }
}
