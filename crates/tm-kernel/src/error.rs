use thiserror::Error;

use crate::verify::Mismatch;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("no compute device available: {0}")]
    DeviceUnavailable(String),
    #[error(
        "shared allocation failed: requested {requested_bytes} bytes, {available_bytes} available"
    )]
    AllocationFailure {
        requested_bytes: u64,
        available_bytes: u64,
    },
    #[error("verification failed: {0}")]
    VerificationMismatch(#[from] Mismatch),
    #[error("invalid tile size {0}: must be at least 1")]
    InvalidTile(usize),
    #[error("work-group of {tile}x{tile} items exceeds device limit of {limit} items")]
    WorkGroupTooLarge { tile: usize, limit: usize },
    #[error("no specialized kernel for tile {tile} (built: {available:?})")]
    UnspecializedTile {
        tile: usize,
        available: &'static [usize],
    },
    #[error("buffer holds {got} elements but N={n} needs {expected}")]
    BufferSizeMismatch { n: usize, expected: usize, got: usize },
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;
