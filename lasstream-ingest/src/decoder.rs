//! The decode stage: turning one staged batch into attribute writes.

use glam::{Vec3, Vec4};
use lasstream_data::{DecodeError, DecodedPoint, Quantization, RecordLayout, WordView, decode_record};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::trace;

/// One staged batch handed to a decoder.
#[derive(Debug, Clone, Copy)]
pub struct DecodeJob<'a> {
    /// Transfer slot the bytes are staged in. Decoders that keep per-slot
    /// device resources index them with this.
    pub slot: usize,
    /// Absolute index of the batch's first point.
    pub point_offset: u64,
    pub point_count: u32,
    /// Staged records, zero padded to a word boundary plus one extra word.
    pub words: &'a [u32],
    /// Length of the staged record data, excluding padding.
    pub byte_len: usize,
}

impl<'a> DecodeJob<'a> {
    pub fn view(&self) -> WordView<'a> {
        WordView::new(self.words)
    }

    /// Staged bytes including the padding.
    pub fn padded_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.words)
    }
}

/// Writes decoded positions and colors for `job.point_count` records to the
/// absolute indices `job.point_offset..job.point_offset + job.point_count`.
///
/// Called concurrently from every worker. Two jobs never share an index.
pub trait RecordDecoder: Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode(&self, job: &DecodeJob<'_>) -> Result<(), Self::Error>;
}

/// Host-side attribute buffers, same layout as the device ones.
///
/// Floats are stored as bit patterns in atomics so batches can write their
/// disjoint ranges from different threads through a shared reference.
pub struct CpuAttributeStore {
    positions: Box<[AtomicU32]>,
    colors: Box<[AtomicU32]>,
}

impl CpuAttributeStore {
    pub fn new(num_points: usize) -> Self {
        let zeroed = |n: usize| -> Box<[AtomicU32]> { (0..n).map(|_| AtomicU32::new(0)).collect() };
        Self {
            positions: zeroed(num_points * 3),
            colors: zeroed(num_points * 4),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn write(&self, index: usize, point: &DecodedPoint) {
        for (slot, value) in self.positions[index * 3..index * 3 + 3]
            .iter()
            .zip(point.position.to_array())
        {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
        for (slot, value) in self.colors[index * 4..index * 4 + 4]
            .iter()
            .zip(point.color.to_array())
        {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn position(&self, index: usize) -> Vec3 {
        let p = &self.positions[index * 3..index * 3 + 3];
        Vec3::new(load(&p[0]), load(&p[1]), load(&p[2]))
    }

    pub fn color(&self, index: usize) -> Vec4 {
        let c = &self.colors[index * 4..index * 4 + 4];
        Vec4::new(load(&c[0]), load(&c[1]), load(&c[2]), load(&c[3]))
    }

    /// Copy out the position buffer as packed `f32`s (12 bytes per point).
    pub fn positions(&self) -> Vec<f32> {
        self.positions.iter().map(load).collect()
    }

    /// Copy out the color buffer as packed `f32`s (16 bytes per point).
    pub fn colors(&self) -> Vec<f32> {
        self.colors.iter().map(load).collect()
    }
}

fn load(value: &AtomicU32) -> f32 {
    f32::from_bits(value.load(Ordering::Relaxed))
}

/// Reference decoder running on the worker thread itself.
pub struct CpuDecoder<'a> {
    store: &'a CpuAttributeStore,
    layout: RecordLayout,
    quantization: Quantization,
}

impl<'a> CpuDecoder<'a> {
    pub fn new(store: &'a CpuAttributeStore, layout: RecordLayout, quantization: Quantization) -> Self {
        Self {
            store,
            layout,
            quantization,
        }
    }
}

impl RecordDecoder for CpuDecoder<'_> {
    type Error = DecodeError;

    fn decode(&self, job: &DecodeJob<'_>) -> Result<(), DecodeError> {
        let end = job.point_offset as usize + job.point_count as usize;
        if end > self.store.len() {
            return Err(DecodeError::AttributeOverflow {
                end: end as u64,
                capacity: self.store.len() as u64,
            });
        }
        let view = job.view();
        for local in 0..job.point_count {
            let point = decode_record(&view, local, &self.layout, &self.quantization)?;
            self.store.write(job.point_offset as usize + local as usize, &point);
        }
        trace!(
            "CPU decoded {} points at {}",
            job.point_count, job.point_offset
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasstream_data::PointFormat;

    fn staged(records: &[[u8; 26]]) -> Vec<u32> {
        let mut bytes: Vec<u8> = records.concat();
        let words = bytes.len().div_ceil(4) + 1;
        bytes.resize(words * 4, 0);
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn record(xyz: [i32; 3], rgb: [u16; 3]) -> [u8; 26] {
        let mut r = [0u8; 26];
        for (i, v) in xyz.iter().enumerate() {
            r[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        for (i, v) in rgb.iter().enumerate() {
            r[20 + i * 2..22 + i * 2].copy_from_slice(&v.to_le_bytes());
        }
        r
    }

    #[test]
    fn test_cpu_decoder_writes_absolute_indices() {
        let store = CpuAttributeStore::new(10);
        let layout = RecordLayout::new(PointFormat::from_raw(2).unwrap(), 26).unwrap();
        let decoder = CpuDecoder::new(&store, layout, Quantization::fixed(100.0));

        let words = staged(&[
            record([12345, -6789, 0], [65535, 0, 0]),
            record([100, 200, 300], [0, 65535, 0]),
        ]);
        decoder
            .decode(&DecodeJob {
                slot: 0,
                point_offset: 7,
                point_count: 2,
                words: &words,
                byte_len: 52,
            })
            .unwrap();

        let p = store.position(7);
        assert!((p.x - 123.45).abs() < 1e-4);
        assert!((p.y + 67.89).abs() < 1e-4);
        assert_eq!(p.z, 0.0);
        assert_eq!(store.color(7), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(store.position(8), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(store.color(8), Vec4::new(0.0, 1.0, 0.0, 1.0));
        // Untouched indices stay zero.
        assert_eq!(store.position(6), Vec3::ZERO);
        assert_eq!(store.color(9), Vec4::ZERO);
    }

    #[test]
    fn test_cpu_decoder_rejects_range_past_store() {
        let store = CpuAttributeStore::new(1);
        let layout = RecordLayout::new(PointFormat::from_raw(2).unwrap(), 26).unwrap();
        let decoder = CpuDecoder::new(&store, layout, Quantization::fixed(100.0));
        let words = staged(&[record([0; 3], [0; 3]), record([0; 3], [0; 3])]);
        let result = decoder.decode(&DecodeJob {
            slot: 0,
            point_offset: 0,
            point_count: 2,
            words: &words,
            byte_len: 52,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_padded_bytes() {
        let words = [0x0403_0201u32, 0];
        let job = DecodeJob {
            slot: 0,
            point_offset: 0,
            point_count: 0,
            words: &words,
            byte_len: 3,
        };
        assert_eq!(&job.padded_bytes()[..4], &[1, 2, 3, 4]);
        assert_eq!(job.padded_bytes().len(), 8);
    }
}
