// Work-group emulation primitives for the host device.
//
// A compute unit is a team of TILE² threads. They share one barrier and one
// pair of local tiles, and execute work-groups one after another.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Barrier;

const _: () = assert!(std::mem::size_of::<AtomicU32>() == std::mem::size_of::<f32>());
const _: () = assert!(std::mem::align_of::<AtomicU32>() == std::mem::align_of::<f32>());

/// Local memory of one compute unit: a TILE×TILE tile per operand.
///
/// Cells are f32 bit patterns in relaxed atomics; the unit's barrier orders
/// the staging stores before the compute loads.
pub(crate) struct LocalTiles {
    a: Box<[AtomicU32]>,
    b: Box<[AtomicU32]>,
}

impl LocalTiles {
    fn new(tile: usize) -> Self {
        let cells = || -> Box<[AtomicU32]> {
            (0..tile * tile).map(|_| AtomicU32::new(0)).collect()
        };
        LocalTiles {
            a: cells(),
            b: cells(),
        }
    }

    #[inline(always)]
    pub fn store_a(&self, slot: usize, value: f32) {
        self.a[slot].store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn store_b(&self, slot: usize, value: f32) {
        self.b[slot].store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn load_a(&self, slot: usize) -> f32 {
        f32::from_bits(self.a[slot].load(Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn load_b(&self, slot: usize) -> f32 {
        f32::from_bits(self.b[slot].load(Ordering::Relaxed))
    }
}

/// A team of TILE² threads that executes work-groups.
pub(crate) struct ComputeUnit {
    barrier: Barrier,
    tiles: LocalTiles,
}

impl ComputeUnit {
    pub fn new(tile: usize) -> Self {
        ComputeUnit {
            barrier: Barrier::new(tile * tile),
            tiles: LocalTiles::new(tile),
        }
    }

    /// Group-wide barrier: returns once every work-item of the unit arrived.
    #[inline]
    pub fn barrier(&self) {
        self.barrier.wait();
    }

    #[inline(always)]
    pub fn tiles(&self) -> &LocalTiles {
        &self.tiles
    }
}

/// Coordinates of one work-item: local (ly, lx) inside its group and
/// global (gy, gx) in the padded output grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkItem {
    pub ly: usize,
    pub lx: usize,
    pub gy: usize,
    pub gx: usize,
}

impl WorkItem {
    pub fn new(group: (usize, usize), local: (usize, usize), tile: usize) -> Self {
        WorkItem {
            ly: local.0,
            lx: local.1,
            gy: group.0 * tile + local.0,
            gx: group.1 * tile + local.1,
        }
    }
}

/// The output matrix as seen by a dispatch: disjoint elements written
/// concurrently by work-items of any group.
pub(crate) struct GlobalOut<'a> {
    cells: &'a [AtomicU32],
}

impl<'a> GlobalOut<'a> {
    pub fn new(out: &'a mut [f32]) -> Self {
        // SAFETY: `AtomicU32` has the size and alignment of `f32` (checked
        // above) and every bit pattern is valid for both. The exclusive
        // borrow of `out` is held for `'a`, so no other access can observe
        // the cells while they are shared as atomics.
        let cells =
            unsafe { std::slice::from_raw_parts(out.as_mut_ptr().cast::<AtomicU32>(), out.len()) };
        GlobalOut { cells }
    }

    #[inline(always)]
    pub fn store(&self, index: usize, value: f32) {
        self.cells[index].store(value.to_bits(), Ordering::Relaxed);
    }
}
