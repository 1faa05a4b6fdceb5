use std::fmt::{self, Debug};
use std::sync::Arc;

use tracing::{info, warn};

use crate::buffers::MatrixBuffers;
use crate::config::KernelConfig;
use crate::error::Result;
use crate::host::HostDevice;
use crate::memory::MemoryPool;

/// Broad class of a compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// A GPU or other accelerator.
    Accelerator,
    /// The host CPU, emulating work-groups with thread teams.
    Host,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Accelerator => f.write_str("accelerator"),
            DeviceKind::Host => f.write_str("host"),
        }
    }
}

/// Which device the caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Accelerator if one exists, otherwise the host (with a warning).
    #[default]
    Auto,
    /// Accelerator or nothing.
    Accelerator,
    /// The host device.
    Host,
}

/// Constraints applied when a device is brought up.
#[derive(Debug, Clone, Default)]
pub struct DeviceOptions {
    /// Upper bound on shared memory in bytes. `None` means the device's own limit.
    pub memory_limit: Option<u64>,
    /// Number of host compute units. `None` means available parallelism.
    pub compute_units: Option<usize>,
}

/// Hardware limits relevant to a tiled dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum work-items per work-group.
    pub max_work_group_size: usize,
    /// Maximum work-groups along one dispatch dimension.
    pub max_groups_per_dim: usize,
}

/// Trait for devices that can run the tiled matmul kernel.
///
/// A dispatch is synchronous: `matmul` returns only once every work-group
/// has finished and C is visible to the host.
pub trait Device: Send + Sync + Debug {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Whether this is an accelerator or the host.
    fn kind(&self) -> DeviceKind;

    fn limits(&self) -> DeviceLimits;

    /// Pool that backs the device's shared buffers.
    fn memory(&self) -> &Arc<MemoryPool>;

    /// Tiled matrix multiplication: C = A @ B on the N×N matrices in `bufs`.
    ///
    /// # Errors
    /// Configuration errors (`InvalidTile`, `WorkGroupTooLarge`,
    /// `UnspecializedTile`) are reported before anything runs; `Dispatch`
    /// covers failures of the device itself.
    fn matmul(&self, kernel: &KernelConfig, bufs: &mut MatrixBuffers) -> Result<()>;
}

/// Acquire a device according to `preference`.
///
/// With `Auto`, failing to acquire an accelerator is not an error: a warning
/// is logged and the host device is returned instead.
///
/// # Errors
/// `DeviceUnavailable` if no device matching the preference can be brought up.
pub fn select_device(
    preference: DevicePreference,
    options: &DeviceOptions,
) -> Result<Box<dyn Device>> {
    let device = match preference {
        DevicePreference::Host => host(options)?,
        DevicePreference::Accelerator => accelerator(options)?,
        DevicePreference::Auto => match accelerator(options) {
            Ok(dev) => dev,
            Err(e) => {
                warn!("no accelerator found; falling back to default device: {e}");
                host(options)?
            }
        },
    };
    info!(device = device.name(), kind = %device.kind(), "device selected");
    Ok(device)
}

fn host(options: &DeviceOptions) -> Result<Box<dyn Device>> {
    Ok(Box::new(HostDevice::new(options)?))
}

#[cfg(feature = "wgpu")]
fn accelerator(options: &DeviceOptions) -> Result<Box<dyn Device>> {
    Ok(Box::new(crate::gpu::GpuDevice::new(options)?))
}

#[cfg(not(feature = "wgpu"))]
fn accelerator(_options: &DeviceOptions) -> Result<Box<dyn Device>> {
    Err(crate::error::KernelError::DeviceUnavailable(
        "built without accelerator support (enable the `wgpu` feature)".to_string(),
    ))
}
