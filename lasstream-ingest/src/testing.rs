//! Synthetic LAS files for tests.

use glam::DVec3;
use lasstream_data::{FileHeader, PointFormat};

pub fn synthetic_header(num_points: u64, format: u8, record_length: u32) -> FileHeader {
    FileHeader {
        version: (1, 2),
        header_size: 227,
        num_points,
        offset_to_point_data: 227,
        point_format: PointFormat::from_raw(format).unwrap(),
        point_record_length: record_length,
        scale: DVec3::splat(0.01),
        offset: DVec3::new(500.0, 0.0, 0.0),
        bounding_min: DVec3::ZERO,
        bounding_max: DVec3::new(10.0, 10.0, 10.0),
    }
}

/// Raw fields of point `i`: x = i, y = -i, z = i % 1000, rgb derived from i.
pub fn point_fields(i: u64) -> ([i32; 3], [u16; 3]) {
    let v = i as i32;
    let c = (i % 65_536) as u16;
    ([v, -v, v % 1000], [c, c.wrapping_mul(3), 65_535 - c])
}

/// Header followed by `num_points` records laid out per `header`.
pub fn synthetic_file(header: &FileHeader) -> Vec<u8> {
    let mut bytes = header.encode();
    bytes.resize(header.offset_to_point_data as usize, 0);
    let rgb_offset = header.point_format.rgb_offset();
    let mut record = vec![0u8; header.point_record_length as usize];
    for i in 0..header.num_points {
        record.fill(0);
        let (xyz, rgb) = point_fields(i);
        for (axis, value) in xyz.iter().enumerate() {
            record[axis * 4..axis * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        if let Some(offset) = rgb_offset {
            for (channel, value) in rgb.iter().enumerate() {
                let at = offset as usize + channel * 2;
                record[at..at + 2].copy_from_slice(&value.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&record);
    }
    bytes
}
