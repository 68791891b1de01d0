//! pixform: per-pixel formulas compiled to a register bytecode and evaluated many times.
//!
//! ```no_run
//! use pixform::{Image, Images};
//!
//! let img = Image::from_row(vec![1.0, 2.0, 3.0]);
//! let mut images = Images::input(&img);
//! let mut program = pixform::compile("i*2 + x", &images)?;
//! program.set_position(1.0, 0.0, 0.0, 0.0);
//! let value = program.evaluate(&mut images);
//! # Ok::<(), pixform::CompileError>(())
//! ```

pub mod arena;
pub mod compiler;
pub mod config;
pub mod diagnostic;
pub mod fill;
pub mod image;
pub mod levels;
pub mod literal;
pub mod source;
pub mod vm;

pub use compiler::{CompileError, ErrorKind};
pub use config::{ConfigError, Settings};
pub use fill::{FillStats, fill, fill_with};
pub use image::{Boundary, Image, Images, Interpolation};
pub use vm::{CompiledProgram, EvalResult, Program};

/// Compile `expression` against the metadata of `images` with default settings.
pub fn compile(expression: &str, images: &Images<'_>) -> Result<CompiledProgram, CompileError> {
    compiler::compile(expression, images, &Settings::default())
}

pub fn compile_with(expression: &str, images: &Images<'_>, settings: &Settings) -> Result<CompiledProgram, CompileError> {
    compiler::compile(expression, images, settings)
}
