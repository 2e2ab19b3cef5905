//! Shader source code embedded at compile time.

/// LAS record decode compute shader - staged records to position/color attributes.
pub const LAS_DECODE: &str = include_str!("../shaders/las_decode.wgsl");
