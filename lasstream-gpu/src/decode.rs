//! Compute pipeline that decodes staged LAS records on the device.
//!
//! One `DecodeSlotBuffers` exists per transfer slot: a storage buffer holding
//! the slot's staged record bytes and a uniform with the batch parameters.
//! A slot is only ever driven by one batch at a time, so its buffers are
//! never written while a previous dispatch on them is still pending.

use crate::attributes::{AttributeBuffers, COLOR_STRIDE, POSITION_STRIDE};
use crate::builder::{BufferBuildError, BufferUsage};
use crate::resource::Handle;
use crate::resource_registry::ResourceRegistry;
use crate::{Renderer, shaders};
use lasstream_data::{Quantization, RecordLayout};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Threads per workgroup, must match `@workgroup_size` in `las_decode.wgsl`.
pub const WORKGROUP_SIZE: u32 = 64;

const NO_RGB: u32 = u32::MAX;

/// Uniform block read by the decode kernel. Layout matches `DecodeParams`.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DecodeUniforms {
    pub point_offset: u32,
    pub point_count: u32,
    pub record_length: u32,
    pub rgb_offset: u32,
    pub position_window: u32,
    pub color_window: u32,
    pub _padding: [u32; 2],
    pub scale: [f32; 4],
    pub offset: [f32; 4],
}

/// One batch worth of decode work.
#[derive(Debug, Clone, Copy)]
pub struct DecodeDispatch<'a> {
    /// Absolute index of the batch's first point.
    pub point_offset: u32,
    pub point_count: u32,
    /// Staged record bytes; length is a multiple of four.
    pub staged: &'a [u8],
    pub layout: &'a RecordLayout,
    pub quantization: &'a Quantization,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeSubmitError {
    #[error("Resource not found in registry: {0}")]
    MissingResource(&'static str),
    #[error("Staged length {len} is not word aligned or exceeds slot capacity {capacity}")]
    StagedLength { len: usize, capacity: u64 },
    #[error("Points [{start}, {end}) exceed attribute capacity {capacity}")]
    OutOfRange { start: u64, end: u64, capacity: u64 },
    #[error("Attribute window of {size} bytes exceeds the storage binding limit {max}")]
    BindingTooLarge { size: u64, max: u64 },
    #[error("Timed out after {0:?} waiting for the device")]
    Timeout(Duration),
    #[error("Buffer creation failed: {0}")]
    Build(#[from] BufferBuildError),
    #[error("Buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
}

/// Per-slot device buffers.
#[derive(Debug, Clone, Copy)]
pub struct DecodeSlotBuffers {
    pub params: Handle<wgpu::Buffer>,
    pub records: Handle<wgpu::Buffer>,
    pub capacity: u64,
}

impl DecodeSlotBuffers {
    pub fn create(
        renderer: &Renderer,
        registry: &mut ResourceRegistry,
        slot: usize,
        capacity: u64,
    ) -> Result<Self, BufferBuildError> {
        let params = renderer
            .create_buffer()
            .label(format!("Decode Params {slot}"))
            .with_pod_data(&[<DecodeUniforms as bytemuck::Zeroable>::zeroed()])
            .usage(BufferUsage::Uniform)
            .build(registry)?;
        let records = renderer
            .create_buffer()
            .label(format!("Staged Records {slot}"))
            .size(capacity)
            .usage(BufferUsage::Staging)
            .build(registry)?;
        Ok(Self {
            params,
            records,
            capacity,
        })
    }
}

/// Byte window of an attribute buffer bound for one batch.
struct Window {
    offset: u64,
    size: u64,
}

impl Window {
    fn new(first_point: u64, count: u64, stride: u64, alignment: u64) -> Self {
        let start = first_point * stride;
        let offset = start / alignment * alignment;
        Self {
            offset,
            size: start + count * stride - offset,
        }
    }

    fn binding<'a>(&self, buffer: &'a wgpu::Buffer) -> wgpu::BindingResource<'a> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer,
            offset: self.offset,
            size: wgpu::BufferSize::new(self.size),
        })
    }
}

/// The decode compute pipeline and its bind group layout.
pub struct DecodePipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl DecodePipeline {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("las_decode"),
            source: wgpu::ShaderSource::Wgsl(shaders::LAS_DECODE.into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Decode Bind Group Layout"),
            entries: &[
                storage(0, true),
                storage(1, false),
                storage(2, false),
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Decode Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Decode Compute Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("cs_main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }

    /// Upload the staged bytes and parameters into `slot`, then dispatch one
    /// invocation per record. Returns once the work is submitted.
    #[tracing::instrument(skip_all, fields(offset = dispatch.point_offset, count = dispatch.point_count))]
    pub fn submit(
        &self,
        renderer: &Renderer,
        registry: &ResourceRegistry,
        slot: &DecodeSlotBuffers,
        attributes: &AttributeBuffers,
        dispatch: &DecodeDispatch<'_>,
    ) -> Result<wgpu::SubmissionIndex, DecodeSubmitError> {
        let device = renderer.device();
        let queue = renderer.queue();
        let limits = device.limits();

        let staged_len = dispatch.staged.len();
        if staged_len % 4 != 0 || staged_len as u64 > slot.capacity || staged_len == 0 {
            return Err(DecodeSubmitError::StagedLength {
                len: staged_len,
                capacity: slot.capacity,
            });
        }
        let start = dispatch.point_offset as u64;
        let end = start + dispatch.point_count as u64;
        if end > attributes.num_points {
            return Err(DecodeSubmitError::OutOfRange {
                start,
                end,
                capacity: attributes.num_points,
            });
        }

        let alignment = limits.min_storage_buffer_offset_alignment as u64;
        let count = dispatch.point_count as u64;
        let positions_window = Window::new(start, count, POSITION_STRIDE, alignment);
        let colors_window = Window::new(start, count, COLOR_STRIDE, alignment);
        let max_binding = limits.max_storage_buffer_binding_size as u64;
        for size in [positions_window.size, colors_window.size, staged_len as u64] {
            if size > max_binding {
                return Err(DecodeSubmitError::BindingTooLarge {
                    size,
                    max: max_binding,
                });
            }
        }

        let params_buffer = registry
            .get(slot.params)
            .ok_or(DecodeSubmitError::MissingResource("decode params"))?;
        let records_buffer = registry
            .get(slot.records)
            .ok_or(DecodeSubmitError::MissingResource("staged records"))?;
        let positions = registry
            .get(attributes.positions)
            .ok_or(DecodeSubmitError::MissingResource("positions"))?;
        let colors = registry
            .get(attributes.colors)
            .ok_or(DecodeSubmitError::MissingResource("colors"))?;

        let q = dispatch.quantization;
        let uniforms = DecodeUniforms {
            point_offset: dispatch.point_offset,
            point_count: dispatch.point_count,
            record_length: dispatch.layout.record_length,
            rgb_offset: dispatch.layout.rgb_offset.unwrap_or(NO_RGB),
            position_window: (positions_window.offset / 4) as u32,
            color_window: (colors_window.offset / COLOR_STRIDE) as u32,
            _padding: [0; 2],
            scale: [q.scale.x as f32, q.scale.y as f32, q.scale.z as f32, 0.0],
            offset: [q.offset.x as f32, q.offset.y as f32, q.offset.z as f32, 0.0],
        };
        queue.write_buffer(params_buffer, 0, bytemuck::bytes_of(&uniforms));
        queue.write_buffer(records_buffer, 0, dispatch.staged);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Decode Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: records_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(staged_len as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: positions_window.binding(positions),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: colors_window.binding(colors),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let (groups_x, groups_y) = workgroup_grid(
            dispatch.point_count,
            limits.max_compute_workgroups_per_dimension,
        );
        trace!("Dispatching {}x{} decode workgroups", groups_x, groups_y);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Decode Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Decode Compute Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        Ok(queue.submit(Some(encoder.finish())))
    }

    /// `submit`, then block until the device reports the queue drained.
    pub fn submit_and_wait(
        &self,
        renderer: &Renderer,
        registry: &ResourceRegistry,
        slot: &DecodeSlotBuffers,
        attributes: &AttributeBuffers,
        dispatch: &DecodeDispatch<'_>,
        timeout: Duration,
    ) -> Result<(), DecodeSubmitError> {
        self.submit(renderer, registry, slot, attributes, dispatch)?;
        wait_for_queue(renderer, timeout)?;
        debug!(
            "Decoded points [{}, {})",
            dispatch.point_offset,
            dispatch.point_offset as u64 + dispatch.point_count as u64
        );
        Ok(())
    }
}

/// Split `count` invocations into a 2D grid that respects the per-dimension limit.
fn workgroup_grid(count: u32, max_per_dimension: u32) -> (u32, u32) {
    let groups = count.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(max_per_dimension.max(1));
    (x, groups.div_ceil(x))
}

/// Poll the device until everything submitted so far has completed.
pub(crate) fn wait_for_queue(
    renderer: &Renderer,
    timeout: Duration,
) -> Result<(), DecodeSubmitError> {
    let (sender, receiver) = mpsc::channel();
    renderer.queue().on_submitted_work_done(move || {
        let _ = sender.send(());
    });

    // On native platforms callbacks only fire from inside `poll`.
    let start = Instant::now();
    loop {
        let _ = renderer.device().poll(wgpu::PollType::Poll);
        if receiver.try_recv().is_ok() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            return Err(DecodeSubmitError::Timeout(timeout));
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout_matches_wgsl() {
        // 8 x u32 followed by two vec4<f32>.
        assert_eq!(std::mem::size_of::<DecodeUniforms>(), 64);
    }

    #[test]
    fn test_workgroup_grid_single_row() {
        assert_eq!(workgroup_grid(500_000, 65_535), (7813, 1));
        assert_eq!(workgroup_grid(1, 65_535), (1, 1));
    }

    #[test]
    fn test_workgroup_grid_wraps_rows() {
        let (x, y) = workgroup_grid(10_000_000, 65_535);
        assert_eq!(x, 65_535);
        assert_eq!(y, 3);
        assert!(x as u64 * y as u64 * WORKGROUP_SIZE as u64 >= 10_000_000);
    }

    #[test]
    fn test_window_alignment() {
        // Point 1000 at 12 bytes/point starts at byte 12000; aligned down to 256.
        let w = Window::new(1000, 10, POSITION_STRIDE, 256);
        assert_eq!(w.offset, 11_776);
        assert_eq!(w.size, 12_000 + 120 - 11_776);
        assert_eq!(w.offset % 4, 0);

        let c = Window::new(1000, 10, COLOR_STRIDE, 256);
        assert_eq!(c.offset % COLOR_STRIDE, 0);
        assert_eq!(c.offset + c.size, 16_160);
    }
}
