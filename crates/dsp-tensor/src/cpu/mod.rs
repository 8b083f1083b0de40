pub mod add;
pub mod matmul;
pub mod vec;

use crate::backend::ComputeBackend;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::tensor::{TensorView, TensorViewMut};

/// Pure-Rust CPU compute backend.
///
/// Runs the same kernels the DSP plugin runs, single-threaded, with the
/// 128-byte vector path emulated on aligned buffers.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn add(
        &self,
        a: &TensorView<'_>,
        b: &TensorView<'_>,
        out: &mut TensorViewMut<'_>,
    ) -> Result<()> {
        add::add_f32(a, b, out)
    }

    fn mul_mat(
        &self,
        a: &TensorView<'_>,
        b: &TensorView<'_>,
        out: &mut TensorViewMut<'_>,
    ) -> Result<()> {
        matmul::mul_mat_f32(a, b, out)
    }
}

/// Fails with the first non-f32 dtype.
pub(crate) fn ensure_f32(dtypes: &[DType]) -> Result<()> {
    match dtypes.iter().find(|&&d| d != DType::F32) {
        Some(&d) => Err(TensorError::UnsupportedType(d)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;
    use crate::tensor::Tensor;
    use half::f16;

    fn backend() -> CpuBackend {
        CpuBackend::new()
    }

    #[test]
    fn test_name() {
        assert_eq!(backend().name(), "cpu");
    }

    #[test]
    fn test_add_through_trait() {
        let b = backend();
        let x = Tensor::new(&[1.0, 2.0], &[2]);
        let y = Tensor::new(&[3.0, 4.0], &[2]);
        let r = x.add(&y, &b).unwrap();
        assert_eq!(r.data_f32().unwrap(), &[4.0, 6.0]);
    }

    #[test]
    fn test_mul_mat_identity() {
        let b = backend();
        let eye = Tensor::new(&[1.0, 0.0, 0.0, 1.0], &[2, 2]);
        let x = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let r = eye.mul_mat(&x, &b).unwrap();
        assert_eq!(r.data_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_f16_output_rejected() {
        let b = backend();
        let x = Tensor::ones(&[2]);
        let mut out_layout = Layout::contiguous(DType::F16, [2, 1, 1, 1]);
        let mut out_data = vec![f16::ZERO; 2];
        let mut out = TensorViewMut::new(
            &mut out_layout,
            crate::storage::StorageMut::F16(&mut out_data),
        )
        .unwrap();
        assert_eq!(
            b.add(&x.view(), &x.view(), &mut out).unwrap_err(),
            TensorError::UnsupportedType(DType::F16)
        );
    }

    #[test]
    fn test_multithread_is_a_no_op() {
        let b = backend();
        let x = Tensor::ones(&[2, 2]);
        let mut out = Tensor::new(&[-1.0; 4], &[4]);
        b.mul_mat_multithread(&x.view(), &x.view(), &mut out.view_mut(), 4)
            .unwrap();
        // known gap: nothing is computed, nothing is written
        assert_eq!(out.shape(), [4, 1, 1, 1]);
        assert_eq!(out.data_f32().unwrap(), &[-1.0; 4]);
    }

    #[test]
    fn test_ensure_f32() {
        assert!(ensure_f32(&[DType::F32, DType::F32]).is_ok());
        assert_eq!(
            ensure_f32(&[DType::F32, DType::F16]),
            Err(TensorError::UnsupportedType(DType::F16))
        );
    }
}
