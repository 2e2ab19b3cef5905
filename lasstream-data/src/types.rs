//! Core decoded point type shared by the CPU and GPU decode paths.

use glam::{Vec3, Vec4};

/// One decoded point: the pair of attributes written per record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedPoint {
    /// Position after applying the quantization scale/offset.
    pub position: Vec3,
    /// RGBA color, 0-1 range.
    pub color: Vec4,
}

impl DecodedPoint {
    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self { position, color }
    }

    /// Opaque white point, used when the record format carries no color.
    pub fn white(position: Vec3) -> Self {
        Self {
            position,
            color: Vec4::ONE,
        }
    }
}

impl Default for DecodedPoint {
    fn default() -> Self {
        Self::white(Vec3::ZERO)
    }
}
