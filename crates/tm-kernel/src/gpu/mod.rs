//! wgpu accelerator device.
//!
//! Work-groups, workgroup memory and `workgroupBarrier()` are native here,
//! so the kernel is the WGSL in [`shader`]. Shared buffers are mirrored into
//! device storage buffers for the dispatch and C is read back before
//! `matmul` returns.

pub(crate) mod shader;

use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};

use tracing::debug;
use wgpu::util::DeviceExt;

use crate::buffers::MatrixBuffers;
use crate::config::{KernelConfig, TileStrategy};
use crate::device::{Device, DeviceKind, DeviceLimits, DeviceOptions};
use crate::error::{KernelError, Result};
use crate::launch::NdRange;
use crate::memory::MemoryPool;

#[derive(Debug)]
struct TilePipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

/// GPU device wrapping a wgpu `Device` and `Queue`.
#[derive(Debug)]
pub struct GpuDevice {
    name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    limits: DeviceLimits,
    max_tile: usize,
    memory: Arc<MemoryPool>,
    pipelines: Mutex<HashMap<(TileStrategy, usize), Arc<TilePipeline>>>,
}

impl GpuDevice {
    /// Acquire the highest-performance hardware adapter.
    ///
    /// # Errors
    /// `DeviceUnavailable` if there is no adapter, the only adapter is a
    /// software (CPU) implementation, or the device request fails.
    pub fn new(options: &DeviceOptions) -> Result<Self> {
        pollster::block_on(Self::request(options))
    }

    async fn request(options: &DeviceOptions) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| KernelError::DeviceUnavailable("no GPU adapter found".to_string()))?;

        let info = adapter.get_info();
        if info.device_type == wgpu::DeviceType::Cpu {
            return Err(KernelError::DeviceUnavailable(format!(
                "adapter '{}' is a software implementation",
                info.name
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tm-kernel"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| {
                KernelError::DeviceUnavailable(format!("GPU device request failed: {e}"))
            })?;

        let hw = device.limits();
        let max_tile = hw
            .max_compute_workgroup_size_x
            .min(hw.max_compute_workgroup_size_y) as usize;
        let limits = DeviceLimits {
            max_work_group_size: hw.max_compute_invocations_per_workgroup as usize,
            max_groups_per_dim: hw.max_compute_workgroups_per_dimension as usize,
        };
        let per_buffer = u64::from(hw.max_storage_buffer_binding_size).min(hw.max_buffer_size);
        let memory = MemoryPool::with_buffer_limit(
            options.memory_limit.unwrap_or(u64::MAX),
            per_buffer,
        );

        Ok(GpuDevice {
            name: format!("{} ({:?})", info.name, info.backend),
            device,
            queue,
            limits,
            max_tile,
            memory,
            pipelines: Mutex::new(HashMap::new()),
        })
    }

    fn pipeline(&self, kernel: &KernelConfig) -> Result<Arc<TilePipeline>> {
        let key = (kernel.strategy, kernel.tile);
        let mut cache = self
            .pipelines
            .lock()
            .map_err(|_| KernelError::Dispatch("pipeline cache poisoned".to_string()))?;
        if let Some(p) = cache.get(&key) {
            return Ok(Arc::clone(p));
        }
        let compiled = Arc::new(self.compile(kernel)?);
        cache.insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    fn compile(&self, kernel: &KernelConfig) -> Result<TilePipeline> {
        let wgsl = shader::matmul_wgsl(kernel.strategy, kernel.tile, self.max_tile_area());

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("tiled matmul"),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("tiled matmul bgl"),
                    entries: &[
                        storage_entry(0, true),
                        storage_entry(1, true),
                        storage_entry(2, false),
                        wgpu::BindGroupLayoutEntry {
                            binding: 3,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("tiled matmul pipeline layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let mut constants = HashMap::new();
        if kernel.strategy == TileStrategy::Runtime {
            constants.insert("TILE".to_string(), kernel.tile as f64);
        }

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("tiled matmul pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: &constants,
                    ..Default::default()
                },
                cache: None,
            });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(KernelError::Dispatch(format!(
                "pipeline for tile {} ({}) rejected: {err}",
                kernel.tile, kernel.strategy
            )));
        }
        debug!(tile = kernel.tile, strategy = %kernel.strategy, "compiled matmul pipeline");

        Ok(TilePipeline {
            pipeline,
            bind_group_layout,
        })
    }

    fn max_tile_area(&self) -> usize {
        self.limits.max_work_group_size
    }
}

impl Device for GpuDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Accelerator
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn memory(&self) -> &Arc<MemoryPool> {
        &self.memory
    }

    fn matmul(&self, kernel: &KernelConfig, bufs: &mut MatrixBuffers) -> Result<()> {
        kernel.validate(self.limits.max_work_group_size)?;
        if kernel.tile > self.max_tile {
            return Err(KernelError::WorkGroupTooLarge {
                tile: kernel.tile,
                limit: self.max_tile * self.max_tile,
            });
        }

        let range = NdRange::square(bufs.n(), kernel.tile);
        if range.is_empty() {
            debug!("N=0, nothing to dispatch");
            return Ok(());
        }
        let groups = range.groups_per_dim();
        if groups > self.limits.max_groups_per_dim {
            return Err(KernelError::Dispatch(format!(
                "{groups} work-groups per dimension exceed the device limit of {}",
                self.limits.max_groups_per_dim
            )));
        }
        let n = u32::try_from(range.n())
            .map_err(|_| KernelError::Dispatch(format!("N={} does not fit in u32", range.n())))?;

        let pipeline = self.pipeline(kernel)?;
        debug!(%range, strategy = %kernel.strategy, "dispatching tiled matmul");

        let (a, b, c) = bufs.dispatch_view();
        let byte_size = std::mem::size_of_val(c) as u64;

        let a_buf = self.storage_from(a, "tm A");
        let b_buf = self.storage_from(b, "tm B");
        let c_buf = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tm C"),
            size: byte_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let dims: [u32; 4] = [n, 0, 0, 0];
        let dims_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tm dims"),
                contents: bytemuck::cast_slice(&dims),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tm C staging"),
            size: byte_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tiled matmul bind group"),
            layout: &pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: a_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: b_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: c_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: dims_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tiled matmul dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("tiled matmul"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups as u32, groups as u32, 1);
        }
        encoder.copy_buffer_to_buffer(&c_buf, 0, &staging, 0, byte_size);
        self.queue.submit(std::iter::once(encoder.finish()));

        // Block until the dispatch and the copy have completed.
        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| KernelError::Dispatch(format!("readback channel closed: {e}")))?
            .map_err(|e| KernelError::Dispatch(format!("readback failed: {e}")))?;

        {
            let mapped = slice.get_mapped_range();
            c.copy_from_slice(bytemuck::cast_slice(&mapped[..]));
        }
        staging.unmap();
        Ok(())
    }
}

impl GpuDevice {
    fn storage_from(&self, data: &[f32], label: &str) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE,
            })
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::{initialize, RemainderConvention};
    use crate::verify::verify_reference;

    // Machines without a GPU skip these.
    fn gpu() -> Option<GpuDevice> {
        GpuDevice::new(&DeviceOptions::default()).ok()
    }

    #[test]
    fn test_gpu_matches_reference() {
        let Some(dev) = gpu() else { return };
        for strategy in [TileStrategy::Specialized, TileStrategy::Runtime] {
            for (n, tile) in [(4, 4), (5, 4), (17, 8), (33, 16)] {
                let mut bufs = MatrixBuffers::allocate(&dev, n).unwrap();
                initialize(&mut bufs, RemainderConvention::Euclid);
                dev.matmul(&KernelConfig::new(tile, strategy), &mut bufs).unwrap();
                assert!(verify_reference(bufs.a(), bufs.b(), bufs.c(), n, 1e-4).is_ok());
            }
        }
    }

    #[test]
    fn test_gpu_kind() {
        let Some(dev) = gpu() else { return };
        assert_eq!(dev.kind(), DeviceKind::Accelerator);
        assert!(dev.limits().max_work_group_size >= 1);
    }
}
