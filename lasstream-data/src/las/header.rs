//! LAS public header block parsing.
//!
//! Only the fields needed to locate point records and place them in space
//! are read. Layout (little-endian, offsets in bytes):
//!
//!   0   : [u8;4]  "LASF"
//!   24  : u8      version major
//!   25  : u8      version minor
//!   94  : u16     header size
//!   96  : u32     offset to point data
//!   104 : u8      point data format id
//!   105 : u16     point data record length
//!   107 : u32     legacy number of point records
//!   131 : f64[3]  x/y/z scale factor
//!   155 : f64[3]  x/y/z offset
//!   179 : f64[6]  max x, min x, max y, min y, max z, min z
//!   247 : u64     number of point records (1.4+)

use crate::error::FormatError;
use crate::las::record::{PointFormat, RecordLayout};
use glam::DVec3;
use tracing::debug;

/// Size of the LAS 1.0-1.2 header; every version carries at least this much.
pub const LEGACY_HEADER_LEN: usize = 227;

/// Size of the LAS 1.4 header. Reading this many bytes (or the whole file,
/// if shorter) is always enough to parse any supported version.
pub const HEADER_PROBE_LEN: usize = 375;

const OFFSET_TO_POINT_DATA: usize = 96;
const POINT_FORMAT: usize = 104;
const RECORD_LENGTH: usize = 105;
const LEGACY_POINT_COUNT: usize = 107;
const SCALE: usize = 131;
const OFFSET: usize = 155;
const BOUNDS: usize = 179;
const POINT_COUNT_64: usize = 247;

/// Typed view of the public header block. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub version: (u8, u8),
    pub header_size: u16,
    pub num_points: u64,
    pub offset_to_point_data: u64,
    pub point_format: PointFormat,
    pub point_record_length: u32,
    pub scale: DVec3,
    pub offset: DVec3,
    pub bounding_min: DVec3,
    pub bounding_max: DVec3,
}

impl FileHeader {
    /// Length of the bounding box diagonal, used by callers as a view distance.
    pub fn diagonal(&self) -> f64 {
        (self.bounding_max - self.bounding_min).length()
    }

    /// Total size in bytes of the point data region, `None` if it does not fit a u64.
    pub fn point_data_len(&self) -> Option<u64> {
        self.num_points.checked_mul(self.point_record_length as u64)
    }

    /// Byte offset one past the last point record.
    pub fn point_data_end(&self) -> Option<u64> {
        self.point_data_len()?.checked_add(self.offset_to_point_data)
    }

    /// Check that every point record lies inside a source of `len` bytes.
    pub fn check_point_data(&self, len: u64) -> Result<(), FormatError> {
        let end = self.point_data_end().ok_or(FormatError::PointDataOverflow {
            num_points: self.num_points,
            record_length: self.point_record_length,
        })?;
        if end > len {
            return Err(FormatError::PointDataPastEnd { end, len });
        }
        Ok(())
    }

    /// Record layout derived from the format id and the declared record length.
    pub fn layout(&self) -> RecordLayout {
        // Both inputs were validated by `parse_header`.
        RecordLayout {
            record_length: self.point_record_length,
            position_offsets: [0, 4, 8],
            rgb_offset: self.point_format.rgb_offset(),
        }
    }

    /// Serialize into a minimal header block (no VLRs).
    ///
    /// Writes a 375-byte 1.4 header when `version >= (1, 4)`, otherwise a
    /// 227-byte legacy header. Used to build synthetic files.
    pub fn encode(&self) -> Vec<u8> {
        let is_14 = self.version >= (1, 4);
        let len = if is_14 { HEADER_PROBE_LEN } else { LEGACY_HEADER_LEN };
        let mut out = vec![0u8; len];
        out[0..4].copy_from_slice(b"LASF");
        out[24] = self.version.0;
        out[25] = self.version.1;
        out[94..96].copy_from_slice(&(len as u16).to_le_bytes());
        out[OFFSET_TO_POINT_DATA..OFFSET_TO_POINT_DATA + 4]
            .copy_from_slice(&(self.offset_to_point_data as u32).to_le_bytes());
        out[POINT_FORMAT] = self.point_format.id();
        out[RECORD_LENGTH..RECORD_LENGTH + 2]
            .copy_from_slice(&(self.point_record_length as u16).to_le_bytes());
        let legacy = u32::try_from(self.num_points).unwrap_or(0);
        out[LEGACY_POINT_COUNT..LEGACY_POINT_COUNT + 4].copy_from_slice(&legacy.to_le_bytes());
        put_dvec3(&mut out, SCALE, self.scale);
        put_dvec3(&mut out, OFFSET, self.offset);
        let bounds = [
            self.bounding_max.x,
            self.bounding_min.x,
            self.bounding_max.y,
            self.bounding_min.y,
            self.bounding_max.z,
            self.bounding_min.z,
        ];
        for (i, v) in bounds.iter().enumerate() {
            let at = BOUNDS + i * 8;
            out[at..at + 8].copy_from_slice(&v.to_le_bytes());
        }
        if is_14 {
            out[POINT_COUNT_64..POINT_COUNT_64 + 8].copy_from_slice(&self.num_points.to_le_bytes());
        }
        out
    }
}

/// Parse the public header from the file's leading bytes.
///
/// `bytes` should hold the first `HEADER_PROBE_LEN` bytes of the file (or the
/// whole file when it is shorter).
#[tracing::instrument(skip_all, fields(len = bytes.len()))]
pub fn parse_header(bytes: &[u8]) -> Result<FileHeader, FormatError> {
    if bytes.len() < LEGACY_HEADER_LEN {
        return Err(FormatError::Truncated {
            needed: LEGACY_HEADER_LEN,
            actual: bytes.len(),
        });
    }

    if &bytes[0..4] != b"LASF" {
        return Err(FormatError::BadSignature);
    }

    let version = (bytes[24], bytes[25]);
    let header_size = u16::from_le_bytes(array_at(bytes, 94));
    let offset_to_point_data = u32::from_le_bytes(array_at(bytes, OFFSET_TO_POINT_DATA)) as u64;
    let point_format = PointFormat::from_raw(bytes[POINT_FORMAT])?;
    let point_record_length = u16::from_le_bytes(array_at(bytes, RECORD_LENGTH)) as u32;
    RecordLayout::new(point_format, point_record_length)?;

    let legacy_count = u32::from_le_bytes(array_at(bytes, LEGACY_POINT_COUNT)) as u64;
    let num_points = if version >= (1, 4) && header_size as usize >= HEADER_PROBE_LEN {
        if bytes.len() < HEADER_PROBE_LEN {
            return Err(FormatError::Truncated {
                needed: HEADER_PROBE_LEN,
                actual: bytes.len(),
            });
        }
        match u64::from_le_bytes(array_at(bytes, POINT_COUNT_64)) {
            0 => legacy_count,
            n => n,
        }
    } else {
        legacy_count
    };
    if num_points == 0 {
        return Err(FormatError::ZeroPoints);
    }

    let bound = |i: usize| f64::from_le_bytes(array_at(bytes, BOUNDS + i * 8));
    let header = FileHeader {
        version,
        header_size,
        num_points,
        offset_to_point_data,
        point_format,
        point_record_length,
        scale: dvec3_at(bytes, SCALE),
        offset: dvec3_at(bytes, OFFSET),
        bounding_min: DVec3::new(bound(1), bound(3), bound(5)),
        bounding_max: DVec3::new(bound(0), bound(2), bound(4)),
    };
    // Any header that gets past here can be planned without overflow.
    if header.point_data_end().is_none() {
        return Err(FormatError::PointDataOverflow {
            num_points,
            record_length: point_record_length,
        });
    }

    debug!(
        "LAS {}.{}: {} points, format {}, {} bytes/record, data at {}",
        version.0,
        version.1,
        header.num_points,
        point_format.id(),
        point_record_length,
        offset_to_point_data
    );
    Ok(header)
}

// Callers check the slice length before reading fixed offsets.
fn array_at<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

fn dvec3_at(bytes: &[u8], offset: usize) -> DVec3 {
    DVec3::new(
        f64::from_le_bytes(array_at(bytes, offset)),
        f64::from_le_bytes(array_at(bytes, offset + 8)),
        f64::from_le_bytes(array_at(bytes, offset + 16)),
    )
}

fn put_dvec3(out: &mut [u8], offset: usize, v: DVec3) {
    for (i, c) in v.to_array().iter().enumerate() {
        let at = offset + i * 8;
        out[at..at + 8].copy_from_slice(&c.to_le_bytes());
    }
}
