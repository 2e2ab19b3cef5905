//! Point data record formats and the field offsets the decoder needs.

use crate::error::FormatError;

/// LAS point data record format (0..=10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointFormat(u8);

impl PointFormat {
    /// Interpret the raw format byte from the header.
    ///
    /// The two high bits are set by LAZ writers to flag compressed data,
    /// which this crate does not decompress.
    pub fn from_raw(raw: u8) -> Result<Self, FormatError> {
        if raw & 0xC0 != 0 {
            return Err(FormatError::CompressedPointData(raw));
        }
        if raw > 10 {
            return Err(FormatError::UnsupportedPointFormat(raw));
        }
        Ok(Self(raw))
    }

    pub fn id(self) -> u8 {
        self.0
    }

    /// Size of the standard fields; records may carry extra bytes after them.
    pub fn min_record_length(self) -> u32 {
        match self.0 {
            0 => 20,
            1 => 28,
            2 => 26,
            3 => 34,
            4 => 57,
            5 => 63,
            6 => 30,
            7 => 36,
            8 => 38,
            9 => 59,
            _ => 67,
        }
    }

    /// Byte offset of the red/green/blue u16 triple, if the format has one.
    pub fn rgb_offset(self) -> Option<u32> {
        match self.0 {
            2 => Some(20),
            3 | 5 => Some(28),
            7 | 8 | 10 => Some(30),
            _ => None,
        }
    }
}

/// Where the decoder finds each field inside one fixed-length record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Stride between consecutive records, taken from the header.
    pub record_length: u32,
    /// Offsets of the X, Y, Z i32 fields.
    pub position_offsets: [u32; 3],
    pub rgb_offset: Option<u32>,
}

impl RecordLayout {
    pub fn new(format: PointFormat, record_length: u32) -> Result<Self, FormatError> {
        let minimum = format.min_record_length();
        if record_length < minimum {
            return Err(FormatError::RecordTooShort {
                format: format.id(),
                length: record_length,
                minimum,
            });
        }
        Ok(Self {
            record_length,
            position_offsets: [0, 4, 8],
            rgb_offset: format.rgb_offset(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_flag_rejected() {
        assert!(matches!(
            PointFormat::from_raw(0x82),
            Err(FormatError::CompressedPointData(0x82))
        ));
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(matches!(
            PointFormat::from_raw(11),
            Err(FormatError::UnsupportedPointFormat(11))
        ));
    }

    #[test]
    fn test_format_2_layout() {
        let layout = RecordLayout::new(PointFormat::from_raw(2).unwrap(), 26).unwrap();
        assert_eq!(layout.rgb_offset, Some(20));
        assert_eq!(layout.position_offsets, [0, 4, 8]);
    }

    #[test]
    fn test_extra_bytes_allowed() {
        let layout = RecordLayout::new(PointFormat::from_raw(0).unwrap(), 24).unwrap();
        assert_eq!(layout.record_length, 24);
        assert_eq!(layout.rgb_offset, None);
    }

    #[test]
    fn test_short_record_rejected() {
        let result = RecordLayout::new(PointFormat::from_raw(7).unwrap(), 30);
        assert!(matches!(
            result,
            Err(FormatError::RecordTooShort { format: 7, length: 30, minimum: 36 })
        ));
    }
}
