use tracing::debug;

use crate::device::Device;
use crate::error::{KernelError, Result};
use crate::memory::SharedBuffer;

/// The three N×N matrices of one run: inputs A and B, output C.
///
/// All three live in the selected device's shared memory and are released
/// together when this value is dropped, on success and on every early
/// return alike.
#[derive(Debug)]
pub struct MatrixBuffers {
    n: usize,
    a: SharedBuffer,
    b: SharedBuffer,
    c: SharedBuffer,
}

impl MatrixBuffers {
    /// Allocate zero-filled A, B and C of N² elements each.
    ///
    /// # Errors
    /// Returns `AllocationFailure` if N² overflows or any of the three
    /// allocations fails. Buffers obtained before the failing one are
    /// released before the error is returned.
    pub fn allocate(device: &dyn Device, n: usize) -> Result<Self> {
        let pool = device.memory();
        let len = n.checked_mul(n).ok_or(KernelError::AllocationFailure {
            requested_bytes: u64::MAX,
            available_bytes: pool.available(),
        })?;

        let a = pool.alloc_shared(len)?;
        let b = pool.alloc_shared(len)?;
        let c = pool.alloc_shared(len)?;

        debug!(
            n,
            bytes_per_matrix = a.byte_len(),
            in_use = pool.in_use(),
            "allocated shared matrices"
        );
        Ok(MatrixBuffers { n, a, b, c })
    }

    /// Allocate buffers and copy caller-provided inputs into A and B.
    ///
    /// # Errors
    /// `BufferSizeMismatch` if either input is not N² long, otherwise the
    /// errors of [`MatrixBuffers::allocate`].
    pub fn from_slices(device: &dyn Device, n: usize, a: &[f32], b: &[f32]) -> Result<Self> {
        let expected = n.checked_mul(n).ok_or(KernelError::AllocationFailure {
            requested_bytes: u64::MAX,
            available_bytes: device.memory().available(),
        })?;
        for input in [a, b] {
            if input.len() != expected {
                return Err(KernelError::BufferSizeMismatch {
                    n,
                    expected,
                    got: input.len(),
                });
            }
        }

        let mut bufs = Self::allocate(device, n)?;
        bufs.a.as_mut_slice().copy_from_slice(a);
        bufs.b.as_mut_slice().copy_from_slice(b);
        Ok(bufs)
    }

    /// Matrix dimension.
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn a(&self) -> &[f32] {
        self.a.as_slice()
    }

    pub fn b(&self) -> &[f32] {
        self.b.as_slice()
    }

    pub fn c(&self) -> &[f32] {
        self.c.as_slice()
    }

    /// Host-side mutable access to all three matrices, for initialization.
    pub fn host_mut(&mut self) -> (&mut [f32], &mut [f32], &mut [f32]) {
        (
            self.a.as_mut_slice(),
            self.b.as_mut_slice(),
            self.c.as_mut_slice(),
        )
    }

    /// Read-only inputs and writable output, as handed to a dispatch.
    pub fn dispatch_view(&mut self) -> (&[f32], &[f32], &mut [f32]) {
        (self.a.as_slice(), self.b.as_slice(), self.c.as_mut_slice())
    }
}
