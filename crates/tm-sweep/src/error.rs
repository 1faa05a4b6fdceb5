use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("kernel binary not found: {0}")]
    MissingBinary(PathBuf),
    #[error("tile list is empty")]
    NoTiles,
}

pub type Result<T> = std::result::Result<T, SweepError>;
