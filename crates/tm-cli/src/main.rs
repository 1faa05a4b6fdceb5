//! tiled-matmul CLI
//!
//! Runs one N x N tiled multiplication on the selected device and reports
//! the device and, with `--verify`, the reference check. The exit status
//! tells allocation, verification, device and configuration failures apart.

mod cli;
mod error;
mod status;

use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use tm_kernel::{select_device, Verification};
use tracing::error;

use crate::cli::Cli;
use crate::error::Result;
use crate::status::RunStatus;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return RunStatus::InvalidConfig.into();
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(status) => status.into(),
        Err(e) => {
            error!("{e}");
            e.status().into()
        }
    }
}

fn run(cli: &Cli) -> Result<RunStatus> {
    let config = cli.run_config();
    let mut out = io::stdout().lock();

    writeln!(out, "N={} TILE={}", config.n, config.kernel.tile)?;

    let device = select_device(cli.device.into(), &cli.device_options())?;
    writeln!(out, "Running on: {}", device.name())?;
    out.flush()?;

    let report = tm_kernel::run(device.as_ref(), &config)?;
    match report.verification {
        Verification::Passed => writeln!(out, "Verification PASSED")?,
        Verification::Failed(_) => writeln!(out, "Verification FAILED")?,
        Verification::Skipped => {}
    }
    out.flush()?;
    report.verification.into_result()?;
    Ok(RunStatus::Ok)
}
