use std::process::ExitCode;

use tm_kernel::KernelError;

/// Process exit status of `tiled-matmul`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunStatus {
    Ok = 0,
    AllocationFailure = 1,
    VerificationFailed = 2,
    DeviceUnavailable = 3,
    InvalidConfig = 4,
    DispatchFailure = 5,
}

impl RunStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<&KernelError> for RunStatus {
    fn from(e: &KernelError) -> Self {
        match e {
            KernelError::AllocationFailure { .. } => RunStatus::AllocationFailure,
            KernelError::VerificationMismatch(_) => RunStatus::VerificationFailed,
            KernelError::DeviceUnavailable(_) => RunStatus::DeviceUnavailable,
            KernelError::InvalidTile(_)
            | KernelError::WorkGroupTooLarge { .. }
            | KernelError::UnspecializedTile { .. }
            | KernelError::BufferSizeMismatch { .. } => RunStatus::InvalidConfig,
            KernelError::Dispatch(_) => RunStatus::DispatchFailure,
        }
    }
}

impl From<RunStatus> for ExitCode {
    fn from(s: RunStatus) -> Self {
        ExitCode::from(s.code())
    }
}
