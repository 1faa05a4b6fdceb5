//! `tm-kernel` - Shared-memory tiled matrix multiplication.
//!
//! This crate provides:
//! - A `Device` trait with device selection that prefers an accelerator and
//!   falls back to the host
//! - A `HostDevice` that emulates work-groups with thread teams sharing a
//!   barrier and local memory
//! - An optional wgpu accelerator (`wgpu` feature)
//! - Shared buffers with per-device memory accounting
//! - The deterministic matrix initializer and a sequential reference verifier
//! - `run`, which ties the steps of one multiplication together

pub mod buffers;
pub mod config;
pub mod device;
pub mod error;
#[cfg(feature = "wgpu")]
pub mod gpu;
pub mod host;
pub mod init;
pub mod launch;
pub mod memory;
pub mod run;
pub mod verify;

// Re-export primary types at the crate root for convenience.
pub use buffers::MatrixBuffers;
pub use config::{KernelConfig, TileStrategy, DEFAULT_N, DEFAULT_TILE, DEFAULT_TOLERANCE};
pub use device::{select_device, Device, DeviceKind, DeviceLimits, DeviceOptions, DevicePreference};
pub use error::{KernelError, Result};
pub use host::HostDevice;
pub use init::RemainderConvention;
pub use launch::NdRange;
pub use memory::{MemoryPool, SharedBuffer};
pub use run::{run, RunConfig, RunReport, Verification};
pub use verify::{reference_multiply, verify_reference, Mismatch};
