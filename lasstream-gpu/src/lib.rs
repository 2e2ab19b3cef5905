//! lasstream GPU Crate
//!
//! Headless wgpu device setup plus everything the decode stage needs on the
//! device: typed buffer handles, the two attribute buffers the renderer draws
//! from, and the compute pipeline that turns staged LAS records into
//! positions and colors.

mod attributes;
mod builder;
mod decode;
mod readback;
mod resource;
mod resource_registry;
pub mod shaders;
mod type_map;

pub use attributes::{AttributeBuffers, COLOR_STRIDE, POSITION_STRIDE};
pub use builder::{BufferBuildError, BufferBuilder, BufferUsage};
pub use decode::{
    DecodeDispatch, DecodePipeline, DecodeSlotBuffers, DecodeSubmitError, DecodeUniforms,
    WORKGROUP_SIZE,
};
pub use readback::read_buffer;
pub use resource::{Handle, ResourceType, next_handle_id};
pub use resource_registry::ResourceRegistry;
pub use wgpu;

use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("Request Adapter Error: {0}")]
    RequestAdapterError(#[from] wgpu::RequestAdapterError),
    #[error("Request Device Error: {0}")]
    RequestDeviceError(#[from] wgpu::RequestDeviceError),
}

/// Owns the device and queue. No surface: the decode path runs headless and
/// the rendering collaborator shares the device through `device()`/`queue()`.
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
}

impl Renderer {
    pub async fn new() -> Result<Self, RendererError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await?;
        let adapter_info = adapter.get_info();

        // Attribute buffers for large clouds need the adapter's full limits,
        // not the conservative defaults.
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lasstream"),
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await?;

        info!(
            "Using adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Start building a buffer on this device
    pub fn create_buffer(&self) -> BufferBuilder<'_> {
        BufferBuilder::new(&self.device)
    }
}
