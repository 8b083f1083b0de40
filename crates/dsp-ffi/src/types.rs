use dsp_tensor::TensorError;

/// Status codes returned by all FFI functions. `Ok` is zero.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DspStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorShapeMismatch = 2,
    ErrorUnsupportedBroadcast = 3,
    ErrorUnsupportedType = 4,
    ErrorInvalidLayout = 5,
    ErrorInternal = 6,
}

impl From<&TensorError> for DspStatus {
    fn from(e: &TensorError) -> Self {
        match e {
            TensorError::ShapeMismatch { .. } => DspStatus::ErrorShapeMismatch,
            TensorError::UnsupportedBroadcast { .. } => DspStatus::ErrorUnsupportedBroadcast,
            TensorError::UnsupportedType(_) => DspStatus::ErrorUnsupportedType,
            TensorError::InvalidLayout(_) | TensorError::BufferTooSmall { .. } => {
                DspStatus::ErrorInvalidLayout
            }
            TensorError::Other(_) => DspStatus::ErrorInvalidArgument,
        }
    }
}

/// Tensor descriptor as laid out by the host-side graph executor.
///
/// `ne` are element counts and `nb` byte strides, innermost first. `data`
/// points to `data_len` elements of the type named by `type_` (ggml type id).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DspTensor {
    pub type_: i32,
    pub ne: [i64; 4],
    pub nb: [u64; 4],
    pub data: *mut std::os::raw::c_void,
    pub data_len: u64,
}

/// Parameters of `dsp_setclocks`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DspClockParams {
    pub power_level: u32,
    pub latency_us: u32,
    pub dcvs_enabled: bool,
    pub thread_counts: u32,
}

impl Default for DspClockParams {
    fn default() -> Self {
        Self {
            power_level: 0,
            latency_us: 100,
            dcvs_enabled: false,
            thread_counts: 1,
        }
    }
}
