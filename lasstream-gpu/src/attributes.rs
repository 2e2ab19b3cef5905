//! Position/color attribute buffers shared with the renderer.

use crate::builder::{BufferBuildError, BufferUsage};
use crate::resource::Handle;
use crate::resource_registry::ResourceRegistry;
use crate::Renderer;
use tracing::debug;

/// Bytes per point in the position buffer (3 x f32).
pub const POSITION_STRIDE: u64 = 12;

/// Bytes per point in the color buffer (4 x f32).
pub const COLOR_STRIDE: u64 = 16;

/// The two vertex buffers, preallocated for every point in the file.
///
/// Decode batches write disjoint point ranges, so concurrent dispatches never
/// touch the same bytes and the buffers need no synchronization of their own.
/// Only the first `points_loaded` points (see the ingest progress handle) hold
/// valid data.
#[derive(Debug, Clone, Copy)]
pub struct AttributeBuffers {
    pub positions: Handle<wgpu::Buffer>,
    pub colors: Handle<wgpu::Buffer>,
    pub num_points: u64,
}

impl AttributeBuffers {
    pub fn create(
        renderer: &Renderer,
        registry: &mut ResourceRegistry,
        num_points: u64,
    ) -> Result<Self, BufferBuildError> {
        debug!(
            "Allocating attribute buffers for {} points ({} + {} bytes)",
            num_points,
            num_points * POSITION_STRIDE,
            num_points * COLOR_STRIDE
        );
        let positions = renderer
            .create_buffer()
            .label("Point Positions")
            .size(num_points * POSITION_STRIDE)
            .usage(BufferUsage::Attribute)
            .build(registry)?;
        let colors = renderer
            .create_buffer()
            .label("Point Colors")
            .size(num_points * COLOR_STRIDE)
            .usage(BufferUsage::Attribute)
            .build(registry)?;
        Ok(Self {
            positions,
            colors,
            num_points,
        })
    }

    /// Vertex buffer layouts matching these buffers (location 0: position, 1: color).
    pub fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
        const POSITION: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
        const COLOR: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x4];
        [
            wgpu::VertexBufferLayout {
                array_stride: POSITION_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &POSITION,
            },
            wgpu::VertexBufferLayout {
                array_stride: COLOR_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &COLOR,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layouts_match_strides() {
        let [positions, colors] = AttributeBuffers::vertex_layouts();
        assert_eq!(positions.array_stride, POSITION_STRIDE);
        assert_eq!(colors.array_stride, COLOR_STRIDE);
        assert_eq!(positions.attributes[0].shader_location, 0);
        assert_eq!(positions.attributes[0].format, wgpu::VertexFormat::Float32x3);
        assert_eq!(colors.attributes[0].shader_location, 1);
        assert_eq!(colors.attributes[0].format, wgpu::VertexFormat::Float32x4);
        assert_eq!(positions.attributes[0].format.size(), POSITION_STRIDE);
        assert_eq!(colors.attributes[0].format.size(), COLOR_STRIDE);
    }
}
