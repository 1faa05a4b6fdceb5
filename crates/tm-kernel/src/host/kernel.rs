// Tiled matmul kernel body for the host device.
//
// One body serves both tile-binding strategies: it is generic over
// `TileWidth`, so `Fixed<T>` monomorphizes a variant with the tile as a
// constant and `Dynamic` reads it at run time.

use crate::launch::NdRange;

use super::group::{ComputeUnit, GlobalOut, WorkItem};

/// Source of the tile side length.
pub(crate) trait TileWidth: Copy + Send + Sync {
    fn get(self) -> usize;
}

/// Tile fixed at compile time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fixed<const T: usize>;

impl<const T: usize> TileWidth for Fixed<T> {
    #[inline(always)]
    fn get(self) -> usize {
        T
    }
}

/// Tile supplied at dispatch time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dynamic(pub usize);

impl TileWidth for Dynamic {
    #[inline(always)]
    fn get(self) -> usize {
        self.0
    }
}

/// Global memory of one dispatch.
pub(crate) struct Operands<'a> {
    pub a: &'a [f32],
    pub b: &'a [f32],
    pub c: GlobalOut<'a>,
    pub n: usize,
}

/// Computes C[gy, gx] for one work-item.
///
/// Every work-item of the group must call this with the same `width` and
/// `ops`: each phase contains two barriers and all TILE² items have to
/// reach them.
#[inline(always)]
pub(crate) fn tiled_work_item<W: TileWidth>(
    width: W,
    item: WorkItem,
    unit: &ComputeUnit,
    ops: &Operands<'_>,
) {
    let tile = width.get();
    let n = ops.n;
    let tiles = unit.tiles();
    let slot = item.ly * tile + item.lx;

    let mut acc = 0.0f32;
    for p in 0..n.div_ceil(tile) {
        let a_col = p * tile + item.lx;
        let b_row = p * tile + item.ly;

        // Stage one element of each operand, zero outside [0, N).
        let a_val = if item.gy < n && a_col < n {
            ops.a[item.gy * n + a_col]
        } else {
            0.0
        };
        let b_val = if b_row < n && item.gx < n {
            ops.b[b_row * n + item.gx]
        } else {
            0.0
        };
        tiles.store_a(slot, a_val);
        tiles.store_b(slot, b_val);

        unit.barrier();

        for k in 0..tile {
            acc += tiles.load_a(item.ly * tile + k) * tiles.load_b(k * tile + item.lx);
        }

        // The next phase overwrites the tiles.
        unit.barrier();
    }

    if item.gy < n && item.gx < n {
        ops.c.store(item.gy * n + item.gx, acc);
    }
}

/// Thread body of one work-item slot of a compute unit.
///
/// Groups are dealt round-robin: unit `u` of `units` runs groups
/// `u, u + units, u + 2*units, ...`, so all threads of a unit walk the same
/// sequence and meet at the same barriers.
pub(crate) fn run_work_item_slot<W: TileWidth>(
    width: W,
    range: &NdRange,
    unit: &ComputeUnit,
    unit_index: usize,
    units: usize,
    local_index: usize,
    ops: &Operands<'_>,
) {
    let tile = width.get();
    let local = (local_index / tile, local_index % tile);
    for group in (unit_index..range.group_count()).step_by(units) {
        let item = WorkItem::new(range.group_coords(group), local, tile);
        tiled_work_item(width, item, unit, ops);
    }
}
