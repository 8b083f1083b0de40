//! Broadcast-aware elementwise addition.

use log::trace;

use super::vec::vec_add_f32;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::layout::Layout;
use crate::tensor::{TensorView, TensorViewMut};

/// `out = a + repeat(b)` over f32 tensors with arbitrary strides.
pub fn add_f32(a: &TensorView<'_>, b: &TensorView<'_>, out: &mut TensorViewMut<'_>) -> Result<()> {
    super::ensure_f32(&[a.dtype(), b.dtype(), out.dtype()])?;
    let la = *a.layout();
    let lb = *b.layout();
    if !lb.can_repeat_into(&la) {
        return Err(TensorError::UnsupportedBroadcast {
            src: lb.ne(),
            dst: la.ne(),
        });
    }

    let src0 = a.f32_data()?;
    let src1 = b.f32_data()?;
    let ld = Layout::try_contiguous(DType::F32, la.ne())?;
    out.set_layout(ld)?;
    let dst = out.f32_data_mut()?;
    trace!("add: a {} b {} -> {}", la, lb, ld);

    if la.is_empty() {
        return Ok(());
    }

    if la.is_contiguous(DType::F32) && lb.is_contiguous(DType::F32) && la.same_shape(&lb) {
        let n = la.nelements();
        vec_add_f32(&mut dst[..n], &src0[..n], &src1[..n]);
        return Ok(());
    }

    let [ne00, _, _, _] = la.ne();
    let [ne10, ne11, ne12, ne13] = lb.ne();
    let sa = la.element_strides(DType::F32);
    let sb = lb.element_strides(DType::F32);
    let sd = ld.element_strides(DType::F32);
    let runs_contiguous = sa[0] == 1 && sb[0] == 1;

    for ir in 0..la.nrows() {
        let (i1, i2, i3) = la.row_coords(ir);
        let (i11, i12, i13) = (i1 % ne11, i2 % ne12, i3 % ne13);

        let a_row = i1 * sa[1] + i2 * sa[2] + i3 * sa[3];
        let b_row = i11 * sb[1] + i12 * sb[2] + i13 * sb[3];
        let d_row = i1 * sd[1] + i2 * sd[2] + i3 * sd[3];

        if runs_contiguous {
            let src1_run = &src1[b_row..b_row + ne10];
            for r in 0..ne00 / ne10 {
                let off = r * ne10;
                vec_add_f32(
                    &mut dst[d_row + off..d_row + off + ne10],
                    &src0[a_row + off..a_row + off + ne10],
                    src1_run,
                );
            }
        } else {
            for i0 in 0..ne00 {
                let i10 = i0 % ne10;
                dst[d_row + i0] = src0[a_row + i0 * sa[0]] + src1[b_row + i10 * sb[0]];
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Tensor;

    fn run(a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let mut out = Tensor::zeros(&[a.layout().nelements()]);
        add_f32(&a.view(), &b.view(), &mut out.view_mut())?;
        Ok(out)
    }

    fn seq(n: usize) -> Vec<f32> {
        (0..n).map(|v| v as f32).collect()
    }

    #[test]
    fn test_same_shape_linear() {
        let a = Tensor::new(&seq(100), &[100]);
        let b = Tensor::ones(&[100]);
        let out = run(&a, &b).unwrap();
        let expected: Vec<f32> = (0..100).map(|v| v as f32 + 1.0).collect();
        assert_eq!(out.data_f32().unwrap(), expected.as_slice());
    }

    #[test]
    fn test_broadcast_row_vector() {
        // b is one row repeated across the 3 rows of a
        let a = Tensor::new(&seq(12), &[4, 3]);
        let b = Tensor::new(&[100.0, 200.0, 300.0, 400.0], &[4]);
        let out = run(&a, &b).unwrap();
        assert_eq!(out.shape(), [4, 3, 1, 1]);
        assert_eq!(
            out.data_f32().unwrap(),
            &[100.0, 201.0, 302.0, 403.0, 104.0, 205.0, 306.0, 407.0, 108.0, 209.0, 310.0, 411.0]
        );
    }

    #[test]
    fn test_broadcast_inner_repeat() {
        // ne00 = 6 is three runs of ne10 = 2
        let a = Tensor::zeros(&[6, 2]);
        let b = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let out = run(&a, &b).unwrap();
        assert_eq!(
            out.data_f32().unwrap(),
            &[1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 4.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_broadcast_outer_dims() {
        let a = Tensor::zeros(&[2, 2, 2, 2]);
        let b = Tensor::new(&[1.0, 2.0, 10.0, 20.0], &[1, 1, 2, 2]);
        let out = run(&a, &b).unwrap();
        let data = out.data_f32().unwrap();
        // each (i2, i3) plane of 4 elements gets one value of b
        assert_eq!(&data[0..4], &[1.0; 4]);
        assert_eq!(&data[4..8], &[2.0; 4]);
        assert_eq!(&data[8..12], &[10.0; 4]);
        assert_eq!(&data[12..16], &[20.0; 4]);
    }

    #[test]
    fn test_non_contiguous_second_operand() {
        // b transposed: logical rows [1,3] and [2,4]
        let a = Tensor::zeros(&[2, 2]);
        let b = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]).transpose();
        let out = run(&a, &b).unwrap();
        assert_eq!(out.data_f32().unwrap(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_non_contiguous_first_operand() {
        let a = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[3, 2]).transpose();
        let b = Tensor::new(&[0.5, 0.25], &[2]);
        let out = run(&a, &b).unwrap();
        assert_eq!(out.shape(), [2, 3, 1, 1]);
        assert_eq!(out.data_f32().unwrap(), &[1.5, 4.25, 2.5, 5.25, 3.5, 6.25]);
    }

    #[test]
    fn test_rejects_non_divisible_broadcast() {
        let a = Tensor::zeros(&[5, 2]);
        let b = Tensor::zeros(&[2, 2]);
        assert_eq!(
            run(&a, &b).unwrap_err(),
            TensorError::UnsupportedBroadcast {
                src: [2, 2, 1, 1],
                dst: [5, 2, 1, 1]
            }
        );
    }

    #[test]
    fn test_output_too_small() {
        let a = Tensor::zeros(&[8]);
        let b = Tensor::zeros(&[8]);
        let mut out = Tensor::zeros(&[4]);
        let err = add_f32(&a.view(), &b.view(), &mut out.view_mut()).unwrap_err();
        assert!(matches!(err, TensorError::BufferTooSmall { .. }));
        // metadata untouched on failure
        assert_eq!(out.shape(), [4, 1, 1, 1]);
    }

    #[test]
    fn test_output_extent_overflow_rejected() {
        // zero strides keep the input span tiny while the dense output
        // would not fit in memory
        let la = Layout::strided([usize::MAX / 2, 4, 1, 1], [0, 0, 0, 0]);
        let lb = Layout::contiguous(DType::F32, [1, 1, 1, 1]);
        let a = TensorView::from_f32(la, &[1.0]).unwrap();
        let b = TensorView::from_f32(lb, &[2.0]).unwrap();
        let mut out_layout = Layout::contiguous(DType::F32, [1, 1, 1, 1]);
        let mut data = [0.0f32];
        let mut out = TensorViewMut::from_f32(&mut out_layout, &mut data).unwrap();
        let err = add_f32(&a, &b, &mut out).unwrap_err();
        assert!(matches!(err, TensorError::InvalidLayout(_)));
        assert_eq!(data, [0.0]);
    }

    #[test]
    fn test_empty() {
        let a = Tensor::zeros(&[0, 3]);
        let b = Tensor::zeros(&[0, 3]);
        let out = run(&a, &b).unwrap();
        assert_eq!(out.shape(), [0, 3, 1, 1]);
    }
}
