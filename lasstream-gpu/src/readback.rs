//! Copy a device buffer into host memory.

use crate::Renderer;
use crate::builder::BufferUsage;
use crate::decode::DecodeSubmitError;
use crate::resource_registry::ResourceRegistry;
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Read `size` bytes starting at `offset` from `source` back to the host.
///
/// Blocks while polling the device. Intended for tests and tooling, not for
/// the ingest hot path.
pub fn read_buffer(
    renderer: &Renderer,
    source: &wgpu::Buffer,
    offset: u64,
    size: u64,
    timeout: Duration,
) -> Result<Vec<u8>, DecodeSubmitError> {
    let device = renderer.device();

    let mut scratch = ResourceRegistry::new();
    let handle = renderer
        .create_buffer()
        .label("Readback")
        .size(size)
        .usage(BufferUsage::Readback)
        .build(&mut scratch)?;
    let staging = scratch
        .get(handle)
        .ok_or(DecodeSubmitError::MissingResource("readback buffer"))?;

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(source, offset, staging, 0, size);
    renderer.queue().submit(Some(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let start = Instant::now();
    loop {
        let _ = device.poll(wgpu::PollType::Poll);
        if let Ok(result) = receiver.try_recv() {
            result?;
            break;
        }
        if start.elapsed() > timeout {
            return Err(DecodeSubmitError::Timeout(timeout));
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AttributeBuffers, DecodeDispatch, DecodePipeline, DecodeSlotBuffers};
    use lasstream_data::{PointFormat, Quantization, RecordLayout};
    use pollster::FutureExt;

    fn record(x: i32, y: i32, z: i32, rgb: [u16; 3]) -> Vec<u8> {
        let mut r = Vec::with_capacity(26);
        r.extend_from_slice(&x.to_le_bytes());
        r.extend_from_slice(&y.to_le_bytes());
        r.extend_from_slice(&z.to_le_bytes());
        r.extend_from_slice(&[0u8; 8]);
        for c in rgb {
            r.extend_from_slice(&c.to_le_bytes());
        }
        r
    }

    fn as_floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_decode_matches_cpu_layout() {
        let renderer = Renderer::new().block_on().expect("adapter");
        let mut registry = ResourceRegistry::new();
        let pipeline = DecodePipeline::new(renderer.device());

        let points = [
            record(12345, -6789, 0, [65535, 0, 32768]),
            record(-1, 1, 100, [0, 65535, 0]),
            record(7, 8, 9, [1, 2, 3]),
        ];
        let mut staged: Vec<u8> = points.concat();
        while staged.len() % 4 != 0 {
            staged.push(0);
        }
        staged.extend_from_slice(&[0; 4]);

        let attributes = AttributeBuffers::create(&renderer, &mut registry, 3).expect("attributes");
        let slot = DecodeSlotBuffers::create(&renderer, &mut registry, 0, 256).expect("slot");
        let layout = RecordLayout::new(PointFormat::from_raw(2).expect("format"), 26).expect("layout");
        let quantization = Quantization::fixed(100.0);

        pipeline
            .submit_and_wait(
                &renderer,
                &registry,
                &slot,
                &attributes,
                &DecodeDispatch {
                    point_offset: 0,
                    point_count: 3,
                    staged: &staged,
                    layout: &layout,
                    quantization: &quantization,
                },
                Duration::from_secs(5),
            )
            .expect("decode");

        let positions = registry.get(attributes.positions).expect("positions");
        let bytes = read_buffer(&renderer, positions, 0, 36, Duration::from_secs(5)).expect("read");
        let floats = as_floats(&bytes);
        assert!((floats[0] - 123.45).abs() < 1e-4);
        assert!((floats[1] + 67.89).abs() < 1e-4);
        assert_eq!(floats[2], 0.0);
        assert!((floats[5] - 1.0).abs() < 1e-6);

        let colors = registry.get(attributes.colors).expect("colors");
        let bytes = read_buffer(&renderer, colors, 0, 48, Duration::from_secs(5)).expect("read");
        let floats = as_floats(&bytes);
        assert_eq!(&floats[0..2], &[1.0, 0.0]);
        assert_eq!(floats[3], 1.0);
        assert_eq!(floats[5], 1.0);
    }
}
