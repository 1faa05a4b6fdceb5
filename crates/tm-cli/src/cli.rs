use clap::{ArgAction, Parser, ValueEnum};
use tm_kernel::{
    DeviceOptions, DevicePreference, KernelConfig, RemainderConvention, RunConfig, TileStrategy,
    DEFAULT_N, DEFAULT_TILE, DEFAULT_TOLERANCE,
};

/// Multiply two deterministic N x N f32 matrices with a shared-memory tiled
/// kernel.
#[derive(Debug, Parser)]
#[command(name = "tiled-matmul")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Matrix dimension N
    #[arg(value_name = "N", default_value_t = DEFAULT_N)]
    pub n: usize,

    /// Tile side length; each work-group is TILE x TILE work-items
    #[arg(short, long, env = "TM_TILE", default_value_t = DEFAULT_TILE)]
    pub tile: usize,

    /// How TILE is bound to the kernel [default: specialized when TILE has a
    /// compiled variant, runtime otherwise]
    #[arg(long, env = "TM_STRATEGY", value_enum)]
    pub strategy: Option<Strategy>,

    /// Which device to run on
    #[arg(long, env = "TM_DEVICE", value_enum, default_value_t = DeviceArg::Auto)]
    pub device: DeviceArg,

    /// Check C against a sequential reference multiplication
    #[arg(long, env = "TM_VERIFY")]
    pub verify: bool,

    /// Absolute tolerance of the reference check
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f32,

    /// Remainder convention used for B = (i - j) mod 5
    #[arg(long, value_enum, default_value_t = Remainder::Euclid)]
    pub remainder: Remainder,

    /// Cap on the device's shared memory, in bytes
    #[arg(long, value_name = "BYTES")]
    pub memory_limit: Option<u64>,

    /// Number of host compute units (work-groups in flight)
    #[arg(long, value_name = "K")]
    pub compute_units: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Kernel variant compiled for this exact tile
    Specialized,
    /// Tile read when the kernel is launched
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceArg {
    /// Accelerator if one is available, else the host
    Auto,
    Accelerator,
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Remainder {
    /// Non-negative remainder, 0..5
    Euclid,
    /// Sign follows the dividend, -4..5
    Truncate,
    /// Difference taken in unsigned 64-bit arithmetic
    Wrapping,
}

impl From<Strategy> for TileStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Specialized => TileStrategy::Specialized,
            Strategy::Runtime => TileStrategy::Runtime,
        }
    }
}

impl From<DeviceArg> for DevicePreference {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Auto => DevicePreference::Auto,
            DeviceArg::Accelerator => DevicePreference::Accelerator,
            DeviceArg::Host => DevicePreference::Host,
        }
    }
}

impl From<Remainder> for RemainderConvention {
    fn from(r: Remainder) -> Self {
        match r {
            Remainder::Euclid => RemainderConvention::Euclid,
            Remainder::Truncate => RemainderConvention::Truncate,
            Remainder::Wrapping => RemainderConvention::Wrapping,
        }
    }
}

impl Cli {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            n: self.n,
            kernel: match self.strategy {
                Some(strategy) => KernelConfig::new(self.tile, strategy.into()),
                None => KernelConfig::for_tile(self.tile),
            },
            remainder: self.remainder.into(),
            verify: self.verify,
            tolerance: self.tolerance,
        }
    }

    pub fn device_options(&self) -> DeviceOptions {
        DeviceOptions {
            memory_limit: self.memory_limit,
            compute_units: self.compute_units,
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
