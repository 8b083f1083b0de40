use half::f16;
use log::debug;

use crate::backend::ComputeBackend;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::layout::{Layout, MAX_DIMS};
use crate::storage::{CpuStorage, StorageMut, StorageRef};

/// Number of leading values printed by [`Tensor::dump`].
const DUMP_VALUES: usize = 16;

/// A read-only tensor descriptor over memory owned elsewhere.
///
/// Construction checks that the layout only addresses memory inside `data`,
/// so kernels can index it without further bounds reasoning.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    layout: Layout,
    data: StorageRef<'a>,
}

impl<'a> TensorView<'a> {
    pub fn new(layout: Layout, data: StorageRef<'a>) -> Result<Self> {
        check_span(&layout, data.dtype(), data.len())?;
        Ok(TensorView { layout, data })
    }

    /// Convenience constructor for an f32 slice.
    pub fn from_f32(layout: Layout, data: &'a [f32]) -> Result<Self> {
        TensorView::new(layout, StorageRef::F32(data))
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// The backing buffer as f32.
    ///
    /// # Errors
    /// Returns `UnsupportedType` for any other element type.
    pub fn f32_data(&self) -> Result<&'a [f32]> {
        self.data.as_f32()
    }
}

/// Output tensor descriptor: pre-allocated memory plus the shape metadata a
/// kernel fills in.
#[derive(Debug)]
pub struct TensorViewMut<'a> {
    layout: &'a mut Layout,
    data: StorageMut<'a>,
}

impl<'a> TensorViewMut<'a> {
    pub fn new(layout: &'a mut Layout, data: StorageMut<'a>) -> Result<Self> {
        check_span(layout, data.dtype(), data.len())?;
        Ok(TensorViewMut { layout, data })
    }

    pub fn from_f32(layout: &'a mut Layout, data: &'a mut [f32]) -> Result<Self> {
        TensorViewMut::new(layout, StorageMut::F32(data))
    }

    pub fn layout(&self) -> &Layout {
        &*self.layout
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Number of elements the backing buffer can hold.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Replace the shape metadata, provided the buffer can back it.
    pub fn set_layout(&mut self, layout: Layout) -> Result<()> {
        check_span(&layout, self.data.dtype(), self.data.len())?;
        *self.layout = layout;
        Ok(())
    }

    pub fn f32_data_mut(&mut self) -> Result<&mut [f32]> {
        self.data.as_f32_mut()
    }
}

fn check_span(layout: &Layout, dtype: DType, available: usize) -> Result<()> {
    layout.validate(dtype)?;
    let required = layout.required_elements(dtype)?;
    if required > available {
        return Err(TensorError::BufferTooSmall {
            required,
            available,
        });
    }
    Ok(())
}

/// A tensor backed by CPU storage.
///
/// Storage is owned; the layout may be strided (for example after
/// [`Tensor::transpose`]). Computation goes through a `ComputeBackend` on
/// borrowed views.
#[derive(Debug, Clone)]
pub struct Tensor {
    storage: CpuStorage,
    layout: Layout,
}

impl Tensor {
    /// Create a contiguous f32 tensor. `dims` lists extents innermost first.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the element count of `dims`, or
    /// if more than four dimensions are given.
    pub fn new(data: &[f32], dims: &[usize]) -> Self {
        let layout = contiguous_layout(DType::F32, dims);
        assert_eq!(
            data.len(),
            layout.nelements(),
            "data length {} does not match {}",
            data.len(),
            layout
        );
        Tensor {
            storage: CpuStorage::from_f32_slice(data),
            layout,
        }
    }

    /// Create a contiguous f16 tensor.
    ///
    /// # Panics
    /// Same conditions as [`Tensor::new`].
    pub fn from_f16(data: Vec<f16>, dims: &[usize]) -> Self {
        let layout = contiguous_layout(DType::F16, dims);
        assert_eq!(data.len(), layout.nelements());
        Tensor {
            storage: CpuStorage::from_f16_vec(data),
            layout,
        }
    }

    /// Create a zero-filled f32 tensor.
    pub fn zeros(dims: &[usize]) -> Self {
        let layout = contiguous_layout(DType::F32, dims);
        Tensor {
            storage: CpuStorage::zeros(DType::F32, layout.nelements()),
            layout,
        }
    }

    /// Create an f32 tensor filled with ones.
    pub fn ones(dims: &[usize]) -> Self {
        let n: usize = dims.iter().product();
        Tensor::new(&vec![1.0; n], dims)
    }

    /// Wrap `data` with arbitrary extents and byte strides.
    pub fn strided(data: &[f32], ne: [usize; MAX_DIMS], nb: [usize; MAX_DIMS]) -> Result<Self> {
        let layout = Layout::strided(ne, nb);
        check_span(&layout, DType::F32, data.len())?;
        Ok(Tensor {
            storage: CpuStorage::from_f32_slice(data),
            layout,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Element counts per dimension.
    pub fn shape(&self) -> [usize; MAX_DIMS] {
        self.layout.ne()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Returns the raw backing buffer as f32, in storage order.
    pub fn data_f32(&self) -> Result<&[f32]> {
        self.storage.as_f32_slice()
    }

    /// Reads a single element by multi-index.
    pub fn get(&self, idx: [usize; MAX_DIMS]) -> Result<f32> {
        let ne = self.layout.ne();
        if (0..MAX_DIMS).any(|i| idx[i] >= ne[i]) {
            return Err(TensorError::Other(format!(
                "index {:?} out of bounds for {}",
                idx, self.layout
            )));
        }
        let data = self.data_f32()?;
        let offset = self.layout.byte_offset(idx) / DType::F32.size_in_bytes();
        Ok(data[offset])
    }

    /// Gathers all elements in logical order (dimension 0 fastest),
    /// whatever the strides are.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        let data = self.data_f32()?;
        let [ne0, ne1, ne2, ne3] = self.layout.ne();
        let s = self.layout.element_strides(DType::F32);
        let mut out = Vec::with_capacity(self.layout.nelements());
        for i3 in 0..ne3 {
            for i2 in 0..ne2 {
                for i1 in 0..ne1 {
                    let row = i1 * s[1] + i2 * s[2] + i3 * s[3];
                    out.extend((0..ne0).map(|i0| data[row + i0 * s[0]]));
                }
            }
        }
        Ok(out)
    }

    /// Swap dimensions 0 and 1 without moving data.
    pub fn transpose(&self) -> Tensor {
        Tensor {
            storage: self.storage.clone(),
            layout: self.layout.transposed(),
        }
    }

    /// Reshape a contiguous tensor, keeping its data.
    ///
    /// The total number of elements must remain the same.
    pub fn reshape(&self, dims: &[usize]) -> Result<Tensor> {
        let dtype = self.dtype();
        let new_layout = Layout::from_dims(dtype, dims)?;
        if self.layout.nelements() != new_layout.nelements() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                expected: self.layout.ne(),
                got: new_layout.ne(),
            });
        }
        if !self.layout.is_contiguous(dtype) {
            return Err(TensorError::InvalidLayout(format!(
                "cannot reshape non-contiguous tensor {}",
                self.layout
            )));
        }
        Ok(Tensor {
            storage: self.storage.clone(),
            layout: new_layout,
        })
    }

    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            layout: self.layout,
            data: self.storage.view(),
        }
    }

    pub fn view_mut(&mut self) -> TensorViewMut<'_> {
        TensorViewMut {
            layout: &mut self.layout,
            data: self.storage.view_mut(),
        }
    }

    /// Broadcast addition `self + other` using the given backend.
    pub fn add(&self, other: &Tensor, backend: &dyn ComputeBackend) -> Result<Tensor> {
        let mut out = Tensor::zeros(&[self.layout.nelements()]);
        backend.add(&self.view(), &other.view(), &mut out.view_mut())?;
        Ok(out)
    }

    /// Matrix multiplication using the given backend.
    ///
    /// `self` is `[K, M, ..]`, `other` is `[K, N, ..]`, the result is
    /// `[M, N, ..]`.
    pub fn mul_mat(&self, other: &Tensor, backend: &dyn ComputeBackend) -> Result<Tensor> {
        let [_, m, _, _] = self.layout.ne();
        let [_, n, ne12, ne13] = other.layout.ne();
        let mut out = Tensor::zeros(&[m * n * ne12 * ne13]);
        backend.mul_mat(&self.view(), &other.view(), &mut out.view_mut())?;
        Ok(out)
    }

    /// Log the descriptor and the leading values at debug level.
    pub fn dump(&self, name: &str) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let head = match self.to_vec() {
            Ok(values) => format!("{:?}", &values[..values.len().min(DUMP_VALUES)]),
            Err(e) => e.to_string(),
        };
        debug!("{}: {} {} {}", name, self.dtype(), self.layout, head);
    }
}

fn contiguous_layout(dtype: DType, dims: &[usize]) -> Layout {
    match Layout::from_dims(dtype, dims) {
        Ok(layout) => layout,
        Err(e) => panic!("{}", e),
    }
}
