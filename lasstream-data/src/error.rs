//! Error types for header parsing and record decoding.

use thiserror::Error;

/// Errors raised while parsing the LAS public header block.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("header truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("missing LASF file signature")]
    BadSignature,

    #[error("header declares zero point records")]
    ZeroPoints,

    #[error("{num_points} records of {record_length} bytes overflow the file offset range")]
    PointDataOverflow { num_points: u64, record_length: u32 },

    #[error("point data ends at byte {end} but the source holds {len} bytes")]
    PointDataPastEnd { end: u64, len: u64 },

    #[error("unsupported point data format {0}")]
    UnsupportedPointFormat(u8),

    #[error("point data format {0:#04x} is compressed (LAZ)")]
    CompressedPointData(u8),

    #[error("record length {length} is shorter than the {minimum} bytes format {format} requires")]
    RecordTooShort { format: u8, length: u32, minimum: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding staged point records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("field at byte {byte_offset} reads past the staged {len} bytes")]
    OutOfBounds { byte_offset: usize, len: usize },

    #[error("points up to {end} exceed the attribute capacity of {capacity}")]
    AttributeOverflow { end: u64, capacity: u64 },
}
