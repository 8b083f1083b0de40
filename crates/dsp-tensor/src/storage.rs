use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Width of one HVX vector register in bytes.
pub const VECTOR_BYTES: usize = 128;

/// Number of f32 lanes in one HVX vector.
pub const VECTOR_LANES: usize = VECTOR_BYTES / size_of::<f32>();

/// One vector-register-sized, vector-aligned block of f32 lanes.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, align(128))]
pub struct VectorBlock([f32; VECTOR_LANES]);

/// f32 buffer whose first element sits on a [`VECTOR_BYTES`] boundary.
#[derive(Debug, Clone)]
pub struct AlignedF32 {
    blocks: Vec<VectorBlock>,
    len: usize,
}

impl AlignedF32 {
    pub fn zeros(len: usize) -> Self {
        AlignedF32 {
            blocks: vec![VectorBlock::zeroed(); len.div_ceil(VECTOR_LANES)],
            len,
        }
    }

    pub fn from_slice(data: &[f32]) -> Self {
        let mut buf = AlignedF32::zeros(data.len());
        buf.as_mut_slice().copy_from_slice(data);
        buf
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[f32] {
        let lanes: &[f32] = bytemuck::cast_slice(&self.blocks);
        &lanes[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        let lanes: &mut [f32] = bytemuck::cast_slice_mut(&mut self.blocks);
        &mut lanes[..self.len]
    }
}

/// CPU-side tensor storage.
#[derive(Debug, Clone)]
pub enum CpuStorage {
    /// 32-bit floating point storage, vector aligned.
    F32(AlignedF32),
    /// 16-bit floating point storage. Kernels do not accept it.
    F16(Vec<f16>),
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F16(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the data as an f32 slice.
    ///
    /// # Errors
    /// Returns an error if the storage is not F32.
    pub fn as_f32_slice(&self) -> Result<&[f32]> {
        self.view().as_f32()
    }

    /// Returns the data as a mutable f32 slice.
    ///
    /// # Errors
    /// Returns an error if the storage is not F32.
    pub fn as_f32_slice_mut(&mut self) -> Result<&mut [f32]> {
        self.view_mut().into_f32()
    }

    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::F32 => CpuStorage::F32(AlignedF32::zeros(n)),
            DType::F16 => CpuStorage::F16(vec![f16::ZERO; n]),
        }
    }

    /// Create aligned storage from f32 values.
    pub fn from_f32_slice(data: &[f32]) -> Self {
        CpuStorage::F32(AlignedF32::from_slice(data))
    }

    pub fn from_f16_vec(data: Vec<f16>) -> Self {
        CpuStorage::F16(data)
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F16(_) => DType::F16,
        }
    }

    pub fn view(&self) -> StorageRef<'_> {
        match self {
            CpuStorage::F32(v) => StorageRef::F32(v.as_slice()),
            CpuStorage::F16(v) => StorageRef::F16(v.as_slice()),
        }
    }

    pub fn view_mut(&mut self) -> StorageMut<'_> {
        match self {
            CpuStorage::F32(v) => StorageMut::F32(v.as_mut_slice()),
            CpuStorage::F16(v) => StorageMut::F16(v.as_mut_slice()),
        }
    }
}

/// Borrowed element buffer, owned by whoever allocated it.
#[derive(Debug, Clone, Copy)]
pub enum StorageRef<'a> {
    F32(&'a [f32]),
    F16(&'a [f16]),
}

impl<'a> StorageRef<'a> {
    pub fn dtype(&self) -> DType {
        match self {
            StorageRef::F32(_) => DType::F32,
            StorageRef::F16(_) => DType::F16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StorageRef::F32(v) => v.len(),
            StorageRef::F16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Result<&'a [f32]> {
        match *self {
            StorageRef::F32(v) => Ok(v),
            StorageRef::F16(_) => Err(TensorError::UnsupportedType(DType::F16)),
        }
    }
}

/// Mutably borrowed element buffer.
#[derive(Debug)]
pub enum StorageMut<'a> {
    F32(&'a mut [f32]),
    F16(&'a mut [f16]),
}

impl<'a> StorageMut<'a> {
    pub fn dtype(&self) -> DType {
        match self {
            StorageMut::F32(_) => DType::F32,
            StorageMut::F16(_) => DType::F16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StorageMut::F32(v) => v.len(),
            StorageMut::F16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32_mut(&mut self) -> Result<&mut [f32]> {
        match self {
            StorageMut::F32(v) => Ok(&mut v[..]),
            StorageMut::F16(_) => Err(TensorError::UnsupportedType(DType::F16)),
        }
    }

    pub fn into_f32(self) -> Result<&'a mut [f32]> {
        match self {
            StorageMut::F32(v) => Ok(v),
            StorageMut::F16(_) => Err(TensorError::UnsupportedType(DType::F16)),
        }
    }
}
