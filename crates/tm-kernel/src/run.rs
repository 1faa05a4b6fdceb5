use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::buffers::MatrixBuffers;
use crate::config::{KernelConfig, TileStrategy, DEFAULT_N, DEFAULT_TOLERANCE};
use crate::device::Device;
use crate::error::{KernelError, Result};
use crate::init::{initialize, RemainderConvention};
use crate::verify::{verify_reference, Mismatch};

/// Parameters of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Matrix dimension N.
    pub n: usize,
    pub kernel: KernelConfig,
    /// Convention for the negative remainders in B.
    pub remainder: RemainderConvention,
    /// Check C against the sequential reference after the dispatch.
    pub verify: bool,
    /// Absolute tolerance of the check.
    pub tolerance: f32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n: DEFAULT_N,
            kernel: KernelConfig::default(),
            remainder: RemainderConvention::default(),
            verify: false,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Outcome of the optional reference check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verification {
    Skipped,
    Passed,
    Failed(Mismatch),
}

impl Verification {
    /// Turn a failed check into `VerificationMismatch`, for callers that
    /// opted in and treat disagreement as fatal.
    ///
    /// # Errors
    /// `VerificationMismatch` carrying the first mismatching element.
    pub fn into_result(self) -> Result<()> {
        match self {
            Verification::Failed(mismatch) => Err(KernelError::VerificationMismatch(mismatch)),
            Verification::Passed | Verification::Skipped => Ok(()),
        }
    }
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub n: usize,
    pub tile: usize,
    pub strategy: TileStrategy,
    pub device: String,
    /// Wall time of the synchronous dispatch alone.
    pub dispatch_time: Duration,
    pub verification: Verification,
}

/// Allocate, initialize, multiply, optionally verify, release.
///
/// The buffers are released when this returns, whether it succeeds or not.
/// A failed verification is not an error: it is reported in
/// [`RunReport::verification`] and the caller decides what it means.
///
/// # Errors
/// `AllocationFailure` if the buffers cannot be obtained, configuration
/// errors from the kernel, and `Dispatch` if the device fails.
pub fn run(device: &dyn Device, config: &RunConfig) -> Result<RunReport> {
    let mut bufs = MatrixBuffers::allocate(device, config.n)?;
    initialize(&mut bufs, config.remainder);
    debug!(n = config.n, remainder = %config.remainder, "matrices initialized");

    let start = Instant::now();
    device.matmul(&config.kernel, &mut bufs)?;
    let dispatch_time = start.elapsed();
    info!(
        n = config.n,
        tile = config.kernel.tile,
        strategy = %config.kernel.strategy,
        elapsed_ms = dispatch_time.as_secs_f64() * 1e3,
        "dispatch complete"
    );

    let verification = if config.verify {
        match verify_reference(bufs.a(), bufs.b(), bufs.c(), config.n, config.tolerance) {
            Ok(()) => Verification::Passed,
            Err(mismatch) => Verification::Failed(mismatch),
        }
    } else {
        Verification::Skipped
    };

    Ok(RunReport {
        n: config.n,
        tile: config.kernel.tile,
        strategy: config.kernel.strategy,
        device: device.name().to_string(),
        dispatch_time,
        verification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceOptions;
    use crate::host::HostDevice;

    fn device(memory_limit: Option<u64>) -> HostDevice {
        HostDevice::new(&DeviceOptions {
            memory_limit,
            compute_units: Some(2),
        })
        .unwrap()
    }

    fn config(n: usize, tile: usize, verify: bool) -> RunConfig {
        RunConfig {
            n,
            kernel: KernelConfig::new(tile, TileStrategy::Specialized),
            verify,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.n, 256);
        assert!(!cfg.verify);
        assert_eq!(cfg.tolerance, 1e-4);
        assert_eq!(cfg.remainder, RemainderConvention::Euclid);
    }

    #[test]
    fn test_run_verified() {
        let dev = device(None);
        let report = run(&dev, &config(10, 4, true)).unwrap();
        assert_eq!(report.verification, Verification::Passed);
        assert_eq!(report.n, 10);
        assert_eq!(report.tile, 4);
        assert_eq!(report.device, dev.name());
        assert_eq!(dev.memory().in_use(), 0);
    }

    #[test]
    fn test_run_unverified() {
        let dev = device(None);
        let report = run(&dev, &config(5, 2, false)).unwrap();
        assert_eq!(report.verification, Verification::Skipped);
    }

    #[test]
    fn test_run_allocation_failure() {
        let dev = device(Some(100));
        let err = run(&dev, &config(8, 4, true)).unwrap_err();
        assert!(matches!(err, KernelError::AllocationFailure { .. }));
        assert_eq!(dev.memory().in_use(), 0);
        assert_eq!(dev.memory().live_buffers(), 0);
    }

    #[test]
    fn test_run_config_error_releases_buffers() {
        let dev = device(None);
        let tile = crate::config::unspecialized_tile();
        let err = run(&dev, &config(8, tile, false)).unwrap_err();
        assert!(matches!(err, KernelError::UnspecializedTile { .. }));
        assert_eq!(dev.memory().live_buffers(), 0);
    }

    #[test]
    fn test_failed_verification_is_an_error() {
        let mismatch = Mismatch {
            row: 2,
            col: 0,
            kernel: 1.0,
            reference: 3.0,
        };
        assert!(Verification::Passed.into_result().is_ok());
        assert!(Verification::Skipped.into_result().is_ok());
        let err = Verification::Failed(mismatch).into_result().unwrap_err();
        assert!(matches!(err, KernelError::VerificationMismatch(m) if m == mismatch));
        assert_eq!(err.to_string(), "verification failed: mismatch at (2, 0): C=1 ref=3");
    }

    #[test]
    fn test_run_empty() {
        let dev = device(Some(0));
        let report = run(&dev, &config(0, 16, true)).unwrap();
        assert_eq!(report.verification, Verification::Passed);
    }
}
