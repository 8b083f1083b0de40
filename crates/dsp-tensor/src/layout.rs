use std::fmt;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Maximum tensor rank.
pub const MAX_DIMS: usize = 4;

/// Shape and stride metadata of a tensor, ggml style.
///
/// `ne[i]` is the number of elements along dimension `i` and `nb[i]` the
/// distance in bytes between consecutive elements of that dimension.
/// Dimension 0 is the innermost one. Lower-rank shapes are padded with 1s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    ne: [usize; MAX_DIMS],
    nb: [usize; MAX_DIMS],
}

impl Layout {
    /// Densely packed layout for `ne` elements of `dtype`.
    pub fn contiguous(dtype: DType, ne: [usize; MAX_DIMS]) -> Self {
        let mut nb = [0usize; MAX_DIMS];
        nb[0] = dtype.size_in_bytes();
        for i in 1..MAX_DIMS {
            nb[i] = nb[i - 1] * ne[i - 1];
        }
        Layout { ne, nb }
    }

    /// Densely packed layout from up to four extents, innermost first.
    pub fn from_dims(dtype: DType, dims: &[usize]) -> Result<Self> {
        if dims.len() > MAX_DIMS {
            return Err(TensorError::InvalidLayout(format!(
                "rank {} exceeds the maximum of {}",
                dims.len(),
                MAX_DIMS
            )));
        }
        let mut ne = [1usize; MAX_DIMS];
        ne[..dims.len()].copy_from_slice(dims);
        Ok(Layout::contiguous(dtype, ne))
    }

    /// Layout with explicit byte strides. Use [`Layout::validate`] before
    /// indexing memory through it.
    pub fn strided(ne: [usize; MAX_DIMS], nb: [usize; MAX_DIMS]) -> Self {
        Layout { ne, nb }
    }

    pub fn ne(&self) -> [usize; MAX_DIMS] {
        self.ne
    }

    pub fn nb(&self) -> [usize; MAX_DIMS] {
        self.nb
    }

    /// Total number of elements.
    pub fn nelements(&self) -> usize {
        self.ne.iter().product()
    }

    /// Number of rows, i.e. everything above dimension 0 flattened.
    pub fn nrows(&self) -> usize {
        self.ne[1] * self.ne[2] * self.ne[3]
    }

    /// True if any dimension has zero extent.
    pub fn is_empty(&self) -> bool {
        self.ne.iter().any(|&n| n == 0)
    }

    /// Densely packed layout, failing with `InvalidLayout` when the strides
    /// or the element count do not fit in `usize`.
    pub fn try_contiguous(dtype: DType, ne: [usize; MAX_DIMS]) -> Result<Self> {
        let mut nb = [0usize; MAX_DIMS];
        nb[0] = dtype.size_in_bytes();
        for i in 1..MAX_DIMS {
            let Some(stride) = nb[i - 1].checked_mul(ne[i - 1]) else {
                return Err(overflow(&ne, &nb));
            };
            nb[i] = stride;
        }
        if nb[MAX_DIMS - 1].checked_mul(ne[MAX_DIMS - 1]).is_none() {
            return Err(overflow(&ne, &nb));
        }
        Ok(Layout { ne, nb })
    }

    /// Number of bytes between the first and one past the last addressed byte.
    ///
    /// # Errors
    /// Returns `InvalidLayout` if the span does not fit in `usize`.
    pub fn nbytes(&self, dtype: DType) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        (0..MAX_DIMS)
            .try_fold(dtype.size_in_bytes(), |acc, i| {
                (self.ne[i] - 1)
                    .checked_mul(self.nb[i])
                    .and_then(|extent| acc.checked_add(extent))
            })
            .ok_or_else(|| overflow(&self.ne, &self.nb))
    }

    /// Number of elements of `dtype` a buffer must hold to back this layout.
    pub fn required_elements(&self, dtype: DType) -> Result<usize> {
        Ok(self.nbytes(dtype)?.div_ceil(dtype.size_in_bytes()))
    }

    pub fn is_contiguous(&self, dtype: DType) -> bool {
        Layout::try_contiguous(dtype, self.ne).is_ok_and(|l| l.nb == self.nb)
    }

    pub fn is_transposed(&self) -> bool {
        self.nb[0] > self.nb[1]
    }

    pub fn same_shape(&self, other: &Layout) -> bool {
        self.ne == other.ne
    }

    /// Whether `self` can be tiled into `target` by repetition along every
    /// dimension.
    pub fn can_repeat_into(&self, target: &Layout) -> bool {
        if self.is_empty() {
            return target.is_empty();
        }
        (0..MAX_DIMS).all(|i| target.ne[i] % self.ne[i] == 0)
    }

    /// Strides in elements of `dtype` rather than bytes.
    pub fn element_strides(&self, dtype: DType) -> [usize; MAX_DIMS] {
        let size = dtype.size_in_bytes();
        self.nb.map(|b| b / size)
    }

    /// Splits a flattened row index into `(i1, i2, i3)`.
    ///
    /// Only meaningful for `ir < nrows()`.
    pub fn row_coords(&self, ir: usize) -> (usize, usize, usize) {
        let plane = self.ne[2] * self.ne[1];
        let i3 = ir / plane;
        let i2 = (ir - i3 * plane) / self.ne[1];
        let i1 = ir - i3 * plane - i2 * self.ne[1];
        (i1, i2, i3)
    }

    /// Byte offset of the element at `idx`.
    ///
    /// Cannot overflow for in-bounds `idx` once `nbytes` has succeeded.
    pub fn byte_offset(&self, idx: [usize; MAX_DIMS]) -> usize {
        (0..MAX_DIMS).map(|i| idx[i] * self.nb[i]).sum()
    }

    /// Same memory viewed with dimensions 0 and 1 swapped.
    pub fn transposed(&self) -> Layout {
        let mut ne = self.ne;
        let mut nb = self.nb;
        ne.swap(0, 1);
        nb.swap(0, 1);
        Layout { ne, nb }
    }

    /// Checks that every stride addresses whole elements of `dtype`.
    pub fn validate(&self, dtype: DType) -> Result<()> {
        let size = dtype.size_in_bytes();
        if let Some(i) = (0..MAX_DIMS).find(|&i| self.nb[i] % size != 0) {
            return Err(TensorError::InvalidLayout(format!(
                "nb[{}]={} is not a multiple of the {} element size {}",
                i, self.nb[i], dtype, size
            )));
        }
        Ok(())
    }
}

fn overflow(ne: &[usize; MAX_DIMS], nb: &[usize; MAX_DIMS]) -> TensorError {
    TensorError::InvalidLayout(format!(
        "span of ne={:?} nb={:?} overflows the address space",
        ne, nb
    ))
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ne={:?} nb={:?}", self.ne, self.nb)
    }
}
