use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{KernelError, Result};

const ELEMENT_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Byte accounting for the shared memory of one device.
///
/// Every `SharedBuffer` reserves its size here on allocation and returns it
/// on drop, so `in_use()` is zero whenever no buffer is alive.
#[derive(Debug)]
pub struct MemoryPool {
    capacity: u64,
    max_buffer: u64,
    in_use: AtomicU64,
    live: AtomicUsize,
}

impl MemoryPool {
    /// Create a pool that can hand out at most `capacity` bytes at once.
    pub fn new(capacity: u64) -> Arc<Self> {
        Self::with_buffer_limit(capacity, u64::MAX)
    }

    /// Create a pool that also caps the size of any single buffer.
    pub fn with_buffer_limit(capacity: u64, max_buffer: u64) -> Arc<Self> {
        Arc::new(MemoryPool {
            capacity,
            max_buffer,
            in_use: AtomicU64::new(0),
            live: AtomicUsize::new(0),
        })
    }

    /// Pool limited only by what the host allocator can satisfy.
    pub fn unbounded() -> Arc<Self> {
        Self::new(u64::MAX)
    }

    /// Maximum number of bytes that may be allocated at once.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes currently held by live buffers.
    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::Acquire)
    }

    /// Bytes that can still be reserved.
    pub fn available(&self) -> u64 {
        self.capacity.saturating_sub(self.in_use())
    }

    /// Number of buffers that have not been dropped yet.
    pub fn live_buffers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Allocate a zero-filled buffer of `len` f32 elements.
    ///
    /// # Errors
    /// Returns `AllocationFailure` if the byte size overflows, the pool is
    /// exhausted, or the host allocator refuses the reservation. Nothing is
    /// left reserved on failure.
    pub fn alloc_shared(self: &Arc<Self>, len: usize) -> Result<SharedBuffer> {
        let bytes = u64::try_from(len)
            .ok()
            .and_then(|l| l.checked_mul(ELEMENT_BYTES))
            .ok_or(KernelError::AllocationFailure {
                requested_bytes: u64::MAX,
                available_bytes: self.available(),
            })?;

        if bytes > self.max_buffer {
            return Err(KernelError::AllocationFailure {
                requested_bytes: bytes,
                available_bytes: self.max_buffer.min(self.available()),
            });
        }
        self.reserve(bytes)?;

        let mut data = Vec::new();
        if data.try_reserve_exact(len).is_err() {
            self.release(bytes);
            return Err(KernelError::AllocationFailure {
                requested_bytes: bytes,
                available_bytes: self.available(),
            });
        }
        data.resize(len, 0.0f32);

        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(SharedBuffer {
            data,
            bytes,
            pool: Arc::clone(self),
        })
    }

    fn reserve(&self, bytes: u64) -> Result<()> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= self.capacity)
            })
            .map(|_| ())
            .map_err(|used| KernelError::AllocationFailure {
                requested_bytes: bytes,
                available_bytes: self.capacity.saturating_sub(used),
            })
    }

    fn release(&self, bytes: u64) {
        self.in_use.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// A host-and-device addressable f32 buffer drawn from a `MemoryPool`.
///
/// The host writes it through `as_mut_slice` before a dispatch and reads it
/// through `as_slice` after the dispatch returns; the device works on the
/// same storage without a user-visible copy.
#[derive(Debug)]
pub struct SharedBuffer {
    data: Vec<f32>,
    bytes: u64,
    pool: Arc<MemoryPool>,
}

impl SharedBuffer {
    /// Number of f32 elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size in bytes as accounted by the pool.
    pub fn byte_len(&self) -> u64 {
        self.bytes
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

impl Drop for SharedBuffer {
    fn drop(&mut self) {
        self.pool.release(self.bytes);
        self.pool.live.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_zero_filled() {
        let pool = MemoryPool::unbounded();
        let buf = pool.alloc_shared(5).unwrap();
        assert_eq!(buf.len(), 5);
        assert!(!buf.is_empty());
        assert_eq!(buf.as_slice(), &[0.0; 5]);
        assert_eq!(buf.byte_len(), 20);
        assert_eq!(pool.in_use(), 20);
        assert_eq!(pool.live_buffers(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let pool = MemoryPool::new(64);
        {
            let _a = pool.alloc_shared(4).unwrap();
            let _b = pool.alloc_shared(4).unwrap();
            assert_eq!(pool.in_use(), 32);
            assert_eq!(pool.available(), 32);
        }
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.live_buffers(), 0);
    }

    #[test]
    fn test_capacity_exhausted() {
        let pool = MemoryPool::new(40);
        let _a = pool.alloc_shared(8).unwrap();
        let err = pool.alloc_shared(3).unwrap_err();
        match err {
            KernelError::AllocationFailure {
                requested_bytes,
                available_bytes,
            } => {
                assert_eq!(requested_bytes, 12);
                assert_eq!(available_bytes, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The failed request reserved nothing.
        assert_eq!(pool.in_use(), 32);
        assert_eq!(pool.live_buffers(), 1);
    }

    #[test]
    fn test_buffer_limit() {
        let pool = MemoryPool::with_buffer_limit(1024, 16);
        assert!(pool.alloc_shared(4).is_ok());
        let err = pool.alloc_shared(5).unwrap_err();
        assert!(matches!(
            err,
            KernelError::AllocationFailure {
                requested_bytes: 20,
                available_bytes: 16
            }
        ));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_byte_overflow() {
        let pool = MemoryPool::unbounded();
        assert!(matches!(
            pool.alloc_shared(usize::MAX),
            Err(KernelError::AllocationFailure { .. })
        ));
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_empty_buffer() {
        let pool = MemoryPool::new(0);
        let buf = pool.alloc_shared(0).unwrap();
        assert!(buf.is_empty());
        assert_eq!(pool.live_buffers(), 1);
        drop(buf);
        assert_eq!(pool.live_buffers(), 0);
    }

    #[test]
    fn test_mut_slice() {
        let pool = MemoryPool::unbounded();
        let mut buf = pool.alloc_shared(2).unwrap();
        buf.as_mut_slice()[0] = 42.0;
        assert_eq!(buf.as_slice()[0], 42.0);
    }
}
