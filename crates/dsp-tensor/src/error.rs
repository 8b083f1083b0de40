use thiserror::Error;

use crate::dtype::DType;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("{op}: shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: [usize; 4],
        got: [usize; 4],
    },
    #[error("cannot broadcast {src:?} into {dst:?}")]
    UnsupportedBroadcast { src: [usize; 4], dst: [usize; 4] },
    #[error("unsupported dtype: {0}")]
    UnsupportedType(DType),
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("buffer too small: layout spans {required} elements, buffer holds {available}")]
    BufferTooSmall { required: usize, available: usize },
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
