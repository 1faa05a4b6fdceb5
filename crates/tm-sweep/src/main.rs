//! tm-sweep
//!
//! Times the `tiled-matmul` binary across tile sizes with both tile
//! strategies and records every repetition to a CSV file. With `--build`
//! it also rebuilds the binary per cell and records the build times.

mod error;
mod record;
mod sweep;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use crate::error::Result;
use crate::record::RecordWriter;
use crate::sweep::{BuildCommand, Sweep};

#[derive(Debug, Parser)]
#[command(name = "tm-sweep")]
#[command(version, about = "Time tiled-matmul across tile sizes and strategies")]
struct Args {
    /// Path to the tiled-matmul binary (default: next to this executable)
    #[arg(long, value_name = "PATH")]
    bin: Option<PathBuf>,

    /// Matrix dimension passed to every run
    #[arg(long, default_value_t = 1024)]
    n: usize,

    /// Tile sizes to sweep
    #[arg(long, value_delimiter = ',', default_values_t = [2, 4, 8, 10])]
    tiles: Vec<usize>,

    /// Runs per (strategy, tile)
    #[arg(long, default_value_t = 10)]
    repetitions: usize,

    /// Output CSV file
    #[arg(long, default_value = "runtime.csv")]
    out: PathBuf,

    /// Rebuild tiled-matmul before each cell's runs and record build times
    #[arg(long)]
    build: bool,

    /// Cargo executable used by --build
    #[arg(long, env = "CARGO", default_value = "cargo")]
    cargo: PathBuf,

    /// Output CSV file for build times
    #[arg(long, default_value = "compile_times.csv")]
    compile_out: PathBuf,

    /// Device forwarded to tiled-matmul (auto, accelerator, host)
    #[arg(long)]
    device: Option<String>,

    /// Increase log verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let bin = match args.bin {
        Some(bin) => bin,
        None => sibling_binary()?,
    };
    let sweep = Sweep {
        bin,
        n: args.n,
        tiles: args.tiles,
        repetitions: args.repetitions,
        device: args.device,
        build: args.build.then(|| BuildCommand::cargo_release(args.cargo)),
    };

    let mut runs = RecordWriter::create(&args.out)?;
    let mut compiles = if args.build {
        Some(RecordWriter::create(&args.compile_out)?)
    } else {
        None
    };
    let summary = sweep.run(&mut runs, compiles.as_mut())?;
    info!(
        recorded = summary.recorded,
        compiled = summary.compiled,
        failed = summary.failed,
        out = %args.out.display(),
        "sweep complete"
    );
    Ok(())
}

fn sibling_binary() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(format!("tiled-matmul{}", std::env::consts::EXE_SUFFIX)))
}
