//! Contiguous vector primitives shared by the add and mat-mul kernels.

use crate::storage::{VECTOR_BYTES, VECTOR_LANES};

/// True if `ptr` sits on a vector register boundary.
#[inline]
pub fn is_vector_aligned<T>(ptr: *const T) -> bool {
    ptr as usize % VECTOR_BYTES == 0
}

/// `z[i] = x[i] + y[i]`.
///
/// Takes the vector path when all three buffers start on a vector boundary,
/// otherwise adds element by element. Both paths produce identical results.
#[inline]
pub fn vec_add_f32(z: &mut [f32], x: &[f32], y: &[f32]) {
    debug_assert_eq!(z.len(), x.len());
    debug_assert_eq!(z.len(), y.len());
    if is_vector_aligned(z.as_ptr()) && is_vector_aligned(x.as_ptr()) && is_vector_aligned(y.as_ptr())
    {
        add_f32_vectorized(z, x, y);
    } else {
        add_f32_scalar(z, x, y);
    }
}

#[inline]
pub(crate) fn add_f32_scalar(z: &mut [f32], x: &[f32], y: &[f32]) {
    for ((zv, &xv), &yv) in z.iter_mut().zip(x).zip(y) {
        *zv = xv + yv;
    }
}

/// Whole vectors first, scalar tail after.
pub(crate) fn add_f32_vectorized(z: &mut [f32], x: &[f32], y: &[f32]) {
    let body = z.len() - z.len() % VECTOR_LANES;
    let (z_head, z_tail) = z.split_at_mut(body);
    let (x_head, x_tail) = x.split_at(body);
    let (y_head, y_tail) = y.split_at(body);

    for ((zv, xv), yv) in z_head
        .chunks_exact_mut(VECTOR_LANES)
        .zip(x_head.chunks_exact(VECTOR_LANES))
        .zip(y_head.chunks_exact(VECTOR_LANES))
    {
        prefetch(xv.as_ptr().wrapping_add(VECTOR_LANES));
        prefetch(yv.as_ptr().wrapping_add(VECTOR_LANES));
        for lane in 0..VECTOR_LANES {
            zv[lane] = xv[lane] + yv[lane];
        }
    }

    add_f32_scalar(z_tail, x_tail, y_tail);
}

/// Dot product accumulated in double precision.
#[inline]
pub fn vec_dot_f32(x: &[f32], y: &[f32]) -> f32 {
    debug_assert_eq!(x.len(), y.len());
    let sum: f64 = x
        .iter()
        .zip(y)
        .map(|(&a, &b)| f64::from(a * b))
        .sum();
    sum as f32
}

/// Hint that the next vector will be read soon. Never dereferences `ptr`.
#[inline(always)]
fn prefetch(ptr: *const f32) {
    #[cfg(target_arch = "x86_64")]
    #[allow(unused_unsafe)]
    unsafe {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch::<_MM_HINT_T0>(ptr as *const i8);
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = ptr;
}
