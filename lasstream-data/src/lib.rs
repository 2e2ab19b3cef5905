//! lasstream Data Crate
//!
//! LAS header parsing and point record decoding. This crate is GPU-agnostic:
//! it knows the byte layout of the file and the arithmetic that turns a raw
//! record into a position/color pair, nothing about devices or scheduling.

pub mod decode;
pub mod error;
pub mod las;
pub mod types;

pub use decode::{CoordinateFrame, Quantization, WordView, decode_record};
pub use error::{DecodeError, FormatError};
pub use las::{FileHeader, PointFormat, RecordLayout, parse_header, HEADER_PROBE_LEN};
pub use types::DecodedPoint;
