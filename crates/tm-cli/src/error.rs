use thiserror::Error;

use crate::status::RunStatus;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Kernel(#[from] tm_kernel::KernelError),
}

impl CliError {
    pub fn status(&self) -> RunStatus {
        match self {
            // stdout went away; nothing was dispatched wrongly
            CliError::Io(_) => RunStatus::DispatchFailure,
            CliError::Kernel(e) => RunStatus::from(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
