//! `dsp-tensor` - strided f32 tensor kernels for DSP offload.
//!
//! This crate provides:
//! - ggml-style tensor descriptors (`Layout`: `ne` extents, `nb` byte strides)
//! - Owned `Tensor`s on 128-byte aligned storage and borrowed `TensorView`s
//! - A `ComputeBackend` trait with a reference `CpuBackend`
//! - Broadcast-aware elementwise add and chunked, block-tiled mat-mul
//! - A `DspSession` that carries per-connection configuration

pub mod backend;
pub mod config;
pub mod cpu;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod session;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use backend::ComputeBackend;
pub use config::{FailurePolicy, KernelConfig, PowerConfig};
pub use cpu::CpuBackend;
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use layout::{Layout, MAX_DIMS};
pub use session::DspSession;
pub use storage::{CpuStorage, StorageMut, StorageRef};
pub use tensor::{Tensor, TensorView, TensorViewMut};
