//! Decoding on the device through the compute pipeline.

use crate::decoder::{DecodeJob, RecordDecoder};
use crate::session::IngestSession;
use crate::source::ByteSource;
use lasstream_data::{Quantization, RecordLayout};
use lasstream_gpu::{
    AttributeBuffers, DecodeDispatch, DecodePipeline, DecodeSlotBuffers, DecodeSubmitError,
    Handle, Renderer, ResourceRegistry, wgpu,
};
use std::time::Duration;
use tracing::debug;

/// How long one batch may take on the device before it is reported failed.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `RecordDecoder` that uploads each staged batch and decodes it with the
/// `las_decode` compute shader into shared attribute buffers.
///
/// Holds one set of device buffers per transfer slot; the pool never hands a
/// slot to two batches at once, so a slot's buffers are never rewritten while
/// a dispatch reading them is pending.
pub struct GpuDecoder<'r> {
    renderer: &'r Renderer,
    registry: ResourceRegistry,
    pipeline: DecodePipeline,
    slots: Vec<DecodeSlotBuffers>,
    attributes: AttributeBuffers,
    layout: RecordLayout,
    quantization: Quantization,
    timeout: Duration,
}

impl<'r> GpuDecoder<'r> {
    /// Allocate the attribute buffers for every point in `session` and the
    /// per-slot upload buffers.
    pub fn new<S: ByteSource>(
        renderer: &'r Renderer,
        session: &IngestSession<S>,
    ) -> Result<Self, DecodeSubmitError> {
        let num_points = session.header().num_points;
        // Shader parameters carry point indices as u32.
        if num_points > u32::MAX as u64 {
            return Err(DecodeSubmitError::OutOfRange {
                start: 0,
                end: num_points,
                capacity: u32::MAX as u64,
            });
        }

        let mut registry = ResourceRegistry::new();
        let attributes = AttributeBuffers::create(renderer, &mut registry, num_points)?;

        let pool = session.pool();
        let upload_capacity = ((pool.slot_capacity().div_ceil(4) + 1) * 4) as u64;
        let slots = (0..pool.capacity())
            .map(|slot| DecodeSlotBuffers::create(renderer, &mut registry, slot, upload_capacity))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "Created {} decode slots of {} bytes",
            slots.len(),
            upload_capacity
        );

        Ok(Self {
            renderer,
            registry,
            pipeline: DecodePipeline::new(renderer.device()),
            slots,
            attributes,
            layout: session.layout(),
            quantization: session.quantization(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn attributes(&self) -> &AttributeBuffers {
        &self.attributes
    }

    pub fn buffer(&self, handle: Handle<wgpu::Buffer>) -> Option<&wgpu::Buffer> {
        self.registry.get(handle)
    }
}

impl RecordDecoder for GpuDecoder<'_> {
    type Error = DecodeSubmitError;

    fn decode(&self, job: &DecodeJob<'_>) -> Result<(), DecodeSubmitError> {
        let slot = self
            .slots
            .get(job.slot)
            .ok_or(DecodeSubmitError::MissingResource("decode slot"))?;
        let point_offset =
            u32::try_from(job.point_offset).map_err(|_| DecodeSubmitError::OutOfRange {
                start: job.point_offset,
                end: job.point_offset + job.point_count as u64,
                capacity: self.attributes.num_points,
            })?;

        self.pipeline.submit_and_wait(
            self.renderer,
            &self.registry,
            slot,
            &self.attributes,
            &DecodeDispatch {
                point_offset,
                point_count: job.point_count,
                staged: job.padded_bytes(),
                layout: &self.layout,
                quantization: &self.quantization,
            },
            self.timeout,
        )
    }
}
