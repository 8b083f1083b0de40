use std::fmt::Debug;

use log::warn;

use crate::error::Result;
use crate::tensor::{TensorView, TensorViewMut};

/// Trait for compute backends that execute the offloaded ops.
///
/// Inputs are borrowed descriptors over caller-owned memory. The output is a
/// pre-allocated buffer; a backend writes both its data and its shape/stride
/// metadata, and never allocates on the caller's behalf.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu").
    fn name(&self) -> &str;

    /// Broadcast addition: `out[i] = a[i] + b[i mod shape(b)]`.
    ///
    /// - `b` must repeat into `a` (each extent of `a` a multiple of `b`'s)
    /// - `out` receives a contiguous layout with `a`'s extents
    fn add(&self, a: &TensorView<'_>, b: &TensorView<'_>, out: &mut TensorViewMut<'_>)
        -> Result<()>;

    /// Matrix multiplication in ggml convention.
    ///
    /// - `a`: `[K, M, ne02, ne03]`
    /// - `b`: `[K, N, ne12, ne13]`, with `ne12`/`ne13` multiples of `ne02`/`ne03`
    /// - `out`: `[M, N, ne12, ne13]` with `out[m, n] = Σ_k a[k, m] * b[k, n]`
    fn mul_mat(
        &self,
        a: &TensorView<'_>,
        b: &TensorView<'_>,
        out: &mut TensorViewMut<'_>,
    ) -> Result<()>;

    /// Multi-threaded matrix multiplication entry point.
    ///
    /// Not implemented: performs no work and leaves `out` untouched.
    fn mul_mat_multithread(
        &self,
        _a: &TensorView<'_>,
        _b: &TensorView<'_>,
        _out: &mut TensorViewMut<'_>,
        n_threads: usize,
    ) -> Result<()> {
        warn!(
            "{}: mul_mat_multithread({} threads) is not implemented, output left unchanged",
            self.name(),
            n_threads
        );
        Ok(())
    }
}
