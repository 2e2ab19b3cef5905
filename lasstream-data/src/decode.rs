//! Point record decoding over word-addressed storage.
//!
//! Staged record bytes are held as little-endian `u32` words, the same way a
//! compute shader sees a `array<u32>` storage binding. Records are not 4-byte
//! aligned (a format 2 record is 26 bytes), so a field starting at byte
//! offset `o` with `o % 4 != 0` straddles two words and has to be rebuilt
//! from both. The WGSL decode kernel in `lasstream-gpu` mirrors `read_u32`.

use crate::error::DecodeError;
use crate::las::{FileHeader, RecordLayout};
use crate::types::DecodedPoint;
use glam::{DVec3, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Read-only view of staged bytes as little-endian words.
#[derive(Debug, Clone, Copy)]
pub struct WordView<'a> {
    words: &'a [u32],
}

impl<'a> WordView<'a> {
    pub fn new(words: &'a [u32]) -> Self {
        Self { words }
    }

    /// Number of addressable bytes.
    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }

    fn word(&self, index: usize, byte_offset: usize) -> Result<u32, DecodeError> {
        self.words
            .get(index)
            .map(|w| u32::from_le(*w))
            .ok_or(DecodeError::OutOfBounds {
                byte_offset,
                len: self.byte_len(),
            })
    }

    /// Little-endian u32 starting at any byte offset.
    ///
    /// With `k = byte_offset % 4`, the low `4 - k` bytes of the result come
    /// from the top of word `i` and the remaining `k` bytes from the bottom of
    /// word `i + 1`.
    pub fn read_u32(&self, byte_offset: usize) -> Result<u32, DecodeError> {
        let index = byte_offset / 4;
        let shift = (byte_offset % 4) as u32 * 8;
        let lo = self.word(index, byte_offset)?;
        if shift == 0 {
            return Ok(lo);
        }
        let hi = self.word(index + 1, byte_offset)?;
        Ok((lo >> shift) | (hi << (32 - shift)))
    }

    pub fn read_i32(&self, byte_offset: usize) -> Result<i32, DecodeError> {
        self.read_u32(byte_offset).map(|v| v as i32)
    }

    /// Little-endian u16; only touches the next word when the field crosses it.
    pub fn read_u16(&self, byte_offset: usize) -> Result<u16, DecodeError> {
        let index = byte_offset / 4;
        let shift = (byte_offset % 4) as u32 * 8;
        if shift <= 16 {
            let lo = self.word(index, byte_offset)?;
            return Ok((lo >> shift) as u16);
        }
        self.read_u32(byte_offset).map(|v| v as u16)
    }
}

/// Which coordinate frame decoded positions are expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinateFrame {
    /// Header scale only; positions stay near the origin so f32 keeps precision.
    #[default]
    Local,
    /// Header scale and offset; georeferenced coordinates.
    World,
}

/// Integer-to-float transform: `position = raw * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
    pub scale: DVec3,
    pub offset: DVec3,
}

impl Quantization {
    /// Fixed divisor on every axis with no offset (`fixed(100.0)` maps 12345 to 123.45).
    pub fn fixed(divisor: f64) -> Self {
        Self {
            scale: DVec3::splat(1.0 / divisor),
            offset: DVec3::ZERO,
        }
    }

    pub fn from_header(header: &FileHeader, frame: CoordinateFrame) -> Self {
        let offset = match frame {
            CoordinateFrame::Local => DVec3::ZERO,
            CoordinateFrame::World => header.offset,
        };
        Self {
            scale: header.scale,
            offset,
        }
    }

    pub fn apply(&self, raw: [i32; 3]) -> Vec3 {
        let raw = DVec3::new(raw[0] as f64, raw[1] as f64, raw[2] as f64);
        (raw * self.scale + self.offset).as_vec3()
    }
}

/// Decode the record at `local_index` within a staged batch.
pub fn decode_record(
    view: &WordView<'_>,
    local_index: u32,
    layout: &RecordLayout,
    quantization: &Quantization,
) -> Result<DecodedPoint, DecodeError> {
    let base = local_index as usize * layout.record_length as usize;
    let [ox, oy, oz] = layout.position_offsets;
    let raw = [
        view.read_i32(base + ox as usize)?,
        view.read_i32(base + oy as usize)?,
        view.read_i32(base + oz as usize)?,
    ];
    let position = quantization.apply(raw);

    let Some(rgb) = layout.rgb_offset else {
        return Ok(DecodedPoint::white(position));
    };
    let channel = |i: usize| -> Result<f32, DecodeError> {
        Ok(view.read_u16(base + rgb as usize + i * 2)? as f32 / 65535.0)
    };
    let color = Vec4::new(channel(0)?, channel(1)?, channel(2)?, 1.0);
    Ok(DecodedPoint::new(position, color))
}
