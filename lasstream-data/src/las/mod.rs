//! LAS public header block and point record layouts

mod header;
mod record;

pub use header::{FileHeader, HEADER_PROBE_LEN, LEGACY_HEADER_LEN, parse_header};
pub use record::{PointFormat, RecordLayout};
