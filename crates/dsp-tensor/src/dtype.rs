use std::fmt;
use std::mem::size_of;

use half::f16;

/// Element types a tensor descriptor can carry.
///
/// Only `F32` is computed on; `F16` buffers can be described and stored but
/// every kernel rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
}

impl DType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => size_of::<f32>(),
            DType::F16 => size_of::<f16>(),
        }
    }

    /// Converts a ggml type ID to a `DType`.
    ///
    /// ggml type IDs:
    /// - 0 => F32
    /// - 1 => F16
    pub fn from_ggml_type(id: i32) -> Option<DType> {
        match id {
            0 => Some(DType::F32),
            1 => Some(DType::F16),
            _ => None,
        }
    }

    /// Returns the ggml type ID for this `DType`.
    pub fn to_ggml_type(&self) -> i32 {
        match self {
            DType::F32 => 0,
            DType::F16 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
        }
    }
}
