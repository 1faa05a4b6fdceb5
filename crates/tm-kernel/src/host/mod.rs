pub(crate) mod group;
pub(crate) mod kernel;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rayon::ThreadPool;
use tracing::debug;

use crate::buffers::MatrixBuffers;
use crate::config::{KernelConfig, TileStrategy, SPECIALIZED_TILES};
use crate::device::{Device, DeviceKind, DeviceLimits, DeviceOptions};
use crate::error::{KernelError, Result};
use crate::launch::NdRange;
use crate::memory::MemoryPool;

use group::{ComputeUnit, GlobalOut};
use kernel::{run_work_item_slot, Dynamic, Fixed, Operands, TileWidth};

/// Largest work-group the host emulates (a 32x32 tile).
pub const HOST_MAX_WORK_GROUP: usize = 1024;

/// Upper bound on work-item threads alive during one dispatch.
const HOST_THREAD_BUDGET: usize = 1024;

// `with_fixed_width!($tile, width => body)`: one match arm per entry of
// `SPECIALIZED_TILES`, generated by build.rs.
include!(concat!(env!("OUT_DIR"), "/fixed_width.rs"));

/// Host CPU device emulating work-groups with thread teams.
///
/// Each compute unit is a team of TILE² threads in a rayon pool that share
/// a barrier and local tiles. This is the default device whenever no
/// accelerator is available.
#[derive(Debug)]
pub struct HostDevice {
    name: String,
    compute_units: usize,
    memory: Arc<MemoryPool>,
    /// Thread pools by (units, work-items per unit), reused across
    /// dispatches. The lock is held for a whole dispatch.
    pools: Mutex<HashMap<(usize, usize), Arc<ThreadPool>>>,
}

impl HostDevice {
    /// Bring up the host device.
    ///
    /// # Errors
    /// `DeviceUnavailable` if zero compute units are requested.
    pub fn new(options: &DeviceOptions) -> Result<Self> {
        let compute_units = match options.compute_units {
            Some(0) => {
                return Err(KernelError::DeviceUnavailable(
                    "host device needs at least one compute unit".to_string(),
                ))
            }
            Some(units) => units,
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        };
        let memory = options
            .memory_limit
            .map_or_else(MemoryPool::unbounded, MemoryPool::new);

        Ok(HostDevice {
            name: format!(
                "host work-group emulator ({}-{}, {} compute units)",
                std::env::consts::ARCH,
                std::env::consts::OS,
                compute_units
            ),
            compute_units,
            memory,
            pools: Mutex::new(HashMap::new()),
        })
    }

    fn units_for(&self, range: &NdRange) -> usize {
        let by_budget = (HOST_THREAD_BUDGET / range.local_items()).max(1);
        self.compute_units
            .min(by_budget)
            .min(range.group_count())
            .max(1)
    }

    fn launch<W: TileWidth>(
        &self,
        width: W,
        range: NdRange,
        a: &[f32],
        b: &[f32],
        c: &mut [f32],
    ) -> Result<()> {
        let items = range.local_items();
        let units = self.units_for(&range);

        // Dispatches on one device are serialized: two broadcasts interleaved
        // on the same workers could meet at each other's barriers.
        let mut pools = self.pools.lock().map_err(|_| {
            KernelError::Dispatch("host thread pool cache poisoned".to_string())
        })?;
        let pool = match pools.get(&(units, items)) {
            Some(pool) => Arc::clone(pool),
            None => {
                let pool = Arc::new(build_pool(units, items)?);
                pools.insert((units, items), Arc::clone(&pool));
                pool
            }
        };

        let compute_units: Vec<ComputeUnit> =
            (0..units).map(|_| ComputeUnit::new(range.tile())).collect();
        let ops = Operands {
            a,
            b,
            c: GlobalOut::new(c),
            n: range.n(),
        };

        debug!(units, threads = units * items, "launching work-groups");
        pool.broadcast(|ctx| {
            let unit_index = ctx.index() / items;
            let local_index = ctx.index() % items;
            run_work_item_slot(
                width,
                &range,
                &compute_units[unit_index],
                unit_index,
                units,
                local_index,
                &ops,
            );
        });
        Ok(())
    }
}

fn build_pool(units: usize, items: usize) -> Result<ThreadPool> {
    let threads = units * items;
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("tm-cu{}-wi{}", i / items, i % items))
        .build()
        .map_err(|e| {
            KernelError::Dispatch(format!("cannot start {threads} work-item threads: {e}"))
        })
}

impl Device for HostDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Host
    }

    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            max_work_group_size: HOST_MAX_WORK_GROUP,
            max_groups_per_dim: usize::MAX,
        }
    }

    fn memory(&self) -> &Arc<MemoryPool> {
        &self.memory
    }

    fn matmul(&self, kernel: &KernelConfig, bufs: &mut MatrixBuffers) -> Result<()> {
        kernel.validate(self.limits().max_work_group_size)?;

        let range = NdRange::square(bufs.n(), kernel.tile);
        if range.is_empty() {
            debug!("N=0, nothing to dispatch");
            return Ok(());
        }
        debug!(%range, strategy = %kernel.strategy, "dispatching tiled matmul");

        let (a, b, c) = bufs.dispatch_view();
        match kernel.strategy {
            TileStrategy::Runtime => self.launch(Dynamic(kernel.tile), range, a, b, c),
            TileStrategy::Specialized => {
                with_fixed_width!(kernel.tile, width => self.launch(width, range, a, b, c))
            }
        }
    }
}
