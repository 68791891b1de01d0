use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pixform::diagnostic::{Diagnostic, ansi::AnsiRenderer, json, registry};
use pixform::{CompileError, EvalResult, Image, Images, Settings};

/// Compile a per-pixel formula and evaluate it at one position or over a whole image.
#[derive(Parser, Debug)]
#[command(name = "pixform", version, about)]
struct Cli {
    /// The formula, e.g. 'i*2 + x'.
    expr: Option<String>,

    /// Read the formula from a file instead.
    #[arg(long, value_name = "PATH", conflicts_with = "expr")]
    file: Option<PathBuf>,

    /// One-row input image, comma separated.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    values: Option<Vec<f64>>,

    /// Image dimensions; missing trailing dimensions are 1.
    #[arg(long, value_name = "WxHxDxS")]
    size: Option<String>,

    /// Position to evaluate at (missing coordinates are 0).
    #[arg(long, value_name = "X,Y,Z,C", value_delimiter = ',', allow_hyphen_values = true)]
    at: Vec<f64>,

    /// Fill every pixel of the image and print the result.
    #[arg(long)]
    fill: bool,

    /// JSON output and diagnostics.
    #[arg(long)]
    json: bool,

    /// Settings file (JSON).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// RNG seed, overriding the settings file.
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads for --fill (0 = one per core).
    #[arg(long, default_value = "0")]
    threads: usize,

    /// Print the explanation of an error code and exit.
    #[arg(long, value_name = "CODE")]
    explain: Option<String>,

    /// -v for debug logging, -vv for trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("warning: logger unavailable: {e}");
    }

    if let Some(code) = &cli.explain {
        return match registry::lookup(code) {
            Some(entry) => {
                print!("{}", entry.long);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("error: unknown error code '{code}'");
                ExitCode::FAILURE
            }
        };
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Compile { error, expression }) => {
            let d = Diagnostic::from(&error).with_source(expression);
            if cli.json {
                eprintln!("{}", json::render(&d));
            } else {
                let use_color = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
                eprint!("{}", AnsiRenderer { use_color }.render(&d));
            }
            ExitCode::FAILURE
        }
        Err(Failure::Usage(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
    }
}

enum Failure {
    Compile { error: CompileError, expression: String },
    Usage(String),
}

fn run(cli: &Cli) -> Result<(), Failure> {
    let expression = match (&cli.expr, &cli.file) {
        (Some(expr), _) => expr.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| Failure::Usage(format!("cannot read '{}': {e}", path.display())))?,
        (None, None) => return Err(Failure::Usage("expected a formula or --file PATH".to_string())),
    };

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path).map_err(|e| Failure::Usage(e.to_string()))?,
        None => Settings::default(),
    };
    if cli.seed.is_some() {
        settings.seed = cli.seed;
    }

    let image = input_image(cli)?;
    let compile_error = |error| Failure::Compile { error, expression: expression.clone() };

    if cli.fill {
        let Some(mut image) = image else {
            return Err(Failure::Usage("--fill needs --values or --size".to_string()));
        };
        #[cfg(feature = "parallel")]
        if cli.threads > 0 {
            rayon::ThreadPoolBuilder::new().num_threads(cli.threads).build_global().ok();
        }
        let stats = pixform::fill_with(&mut image, &expression, &mut [], &settings).map_err(compile_error)?;
        if cli.json {
            let out = serde_json::json!({
                "dims": image.dims(),
                "data": image.data(),
                "stats": stats,
            });
            println!("{out}");
        } else {
            print_image(&image);
        }
        return Ok(());
    }

    let mut images = match &image {
        Some(img) => Images::input(img),
        None => Images::none(),
    };
    let mut program = pixform::compile_with(&expression, &images, &settings).map_err(compile_error)?;
    let mut at = [0.0; 4];
    for (slot, v) in at.iter_mut().zip(&cli.at) {
        *slot = *v;
    }
    let result = program.evaluate_at(at, &mut images);
    program.run_end(&mut images);

    if cli.json {
        let out = serde_json::to_string(&result).map_err(|e| Failure::Usage(e.to_string()))?;
        println!("{out}");
    } else {
        println!("{}", format_result(&result));
    }
    Ok(())
}

fn input_image(cli: &Cli) -> Result<Option<Image>, Failure> {
    let dims = cli.size.as_deref().map(parse_size).transpose()?;
    match (dims, &cli.values) {
        (None, None) => Ok(None),
        (None, Some(values)) => Ok(Some(Image::from_row(values.clone()))),
        (Some([w, h, d, s]), None) => Ok(Some(Image::new(w, h, d, s))),
        (Some([w, h, d, s]), Some(values)) => Image::with_data(w, h, d, s, values.clone())
            .map(Some)
            .ok_or_else(|| Failure::Usage(format!("{} values do not fill a {w}x{h}x{d}x{s} image", values.len()))),
    }
}

fn parse_size(text: &str) -> Result<[usize; 4], Failure> {
    let parts: Vec<&str> = text.split(['x', 'X']).collect();
    if parts.is_empty() || parts.len() > 4 {
        return Err(Failure::Usage(format!("invalid size '{text}', expected WxHxDxS")));
    }
    let mut dims = [1; 4];
    for (dim, part) in dims.iter_mut().zip(&parts) {
        *dim = part
            .trim()
            .parse()
            .map_err(|_| Failure::Usage(format!("invalid size '{text}', expected WxHxDxS")))?;
    }
    Ok(dims)
}

fn format_result(result: &EvalResult) -> String {
    match result {
        EvalResult::Scalar(v) => v.to_string(),
        EvalResult::Vector(values) => {
            let parts: Vec<String> = values.iter().map(f64::to_string).collect();
            format!("[{}]", parts.join(","))
        }
        EvalResult::Break => "break".to_string(),
        EvalResult::Continue => "continue".to_string(),
    }
}

/// One line per row, channels one after another.
fn print_image(image: &Image) {
    let [w, h, d, s] = image.dims();
    for c in 0..s {
        for z in 0..d {
            for y in 0..h {
                let row: Vec<String> = (0..w).map(|x| image.get(x, y, z, c).to_string()).collect();
                println!("{}", row.join(" "));
            }
        }
    }
}
