//! Chunked, block-tiled matrix multiplication.
//!
//! The output is split into two iteration spaces: `nr0` output rows (the
//! `M` extent) and `nr1` flattened output columns (`N * ne2 * ne3`). A
//! [`ChunkPlan`] tiles both spaces into chunks sized for work distribution,
//! and every chunk is then walked in 16x16 register blocks where each output
//! value is one dot product over `K`.

use std::ops::Range;

use log::debug;

use super::vec::vec_dot_f32;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::layout::Layout;
use crate::tensor::{TensorView, TensorViewMut};

/// Chunk edge when both iteration spaces are larger than one.
pub const CHUNK_SIZE: usize = 16;
/// Chunk edge when either iteration space is a single row or column.
pub const DEGENERATE_CHUNK_SIZE: usize = 64;
/// Below this many chunks per thread the plan falls back to one chunk per thread.
pub const MIN_CHUNKS_PER_THREAD: usize = 4;
/// Register block over output rows.
pub const BLOCK_ROWS: usize = 16;
/// Register block over output columns.
pub const BLOCK_COLS: usize = 16;

/// Partition of the `nr0 x nr1` output space into rectangular chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub nr0: usize,
    pub nr1: usize,
    pub nchunk0: usize,
    pub nchunk1: usize,
    /// Rows per chunk.
    pub dr0: usize,
    /// Columns per chunk.
    pub dr1: usize,
}

/// Sub-rectangle of the output handled by one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRange {
    pub ir0: Range<usize>,
    pub ir1: Range<usize>,
}

impl ChunkPlan {
    pub fn new(nr0: usize, nr1: usize, n_threads: usize) -> Self {
        let n_threads = n_threads.max(1);
        let chunk_size = if nr0 == 1 || nr1 == 1 {
            DEGENERATE_CHUNK_SIZE
        } else {
            CHUNK_SIZE
        };

        let mut nchunk0 = nr0.div_ceil(chunk_size);
        let mut nchunk1 = nr1.div_ceil(chunk_size);

        // too few chunks to be worth tiling: one chunk per thread along the
        // longer side
        if nchunk0 * nchunk1 < n_threads * MIN_CHUNKS_PER_THREAD {
            if nr0 > nr1 {
                nchunk0 = n_threads;
                nchunk1 = 1;
            } else {
                nchunk0 = 1;
                nchunk1 = n_threads;
            }
        }

        ChunkPlan {
            nr0,
            nr1,
            nchunk0,
            nchunk1,
            dr0: nr0.div_ceil(nchunk0),
            dr1: nr1.div_ceil(nchunk1),
        }
    }

    /// Total number of chunks.
    pub fn len(&self) -> usize {
        self.nchunk0 * self.nchunk1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounds of chunk `index`, chunks ordered along `nr0` first.
    pub fn chunk(&self, index: usize) -> ChunkRange {
        let ith0 = index % self.nchunk0;
        let ith1 = index / self.nchunk0;

        let ir0_start = (self.dr0 * ith0).min(self.nr0);
        let ir0_end = (ir0_start + self.dr0).min(self.nr0);
        let ir1_start = (self.dr1 * ith1).min(self.nr1);
        let ir1_end = (ir1_start + self.dr1).min(self.nr1);

        ChunkRange {
            ir0: ir0_start..ir0_end,
            ir1: ir1_start..ir1_end,
        }
    }

    pub fn chunks(&self) -> impl Iterator<Item = ChunkRange> + '_ {
        (0..self.len()).map(|i| self.chunk(i))
    }
}

/// Operands of one multiplication, validated and resolved to element strides.
struct MulMatArgs<'a> {
    src0: &'a [f32],
    src1: &'a [f32],
    k: usize,
    /// Output extents `[M, N, ne2, ne3]`.
    ne: [usize; 4],
    s0: [usize; 4],
    s1: [usize; 4],
    sd: [usize; 4],
    r2: usize,
    r3: usize,
}

/// Single-threaded `out = a^T b` in ggml convention, see
/// [`ComputeBackend::mul_mat`](crate::ComputeBackend::mul_mat).
pub fn mul_mat_f32(a: &TensorView<'_>, b: &TensorView<'_>, out: &mut TensorViewMut<'_>) -> Result<()> {
    super::ensure_f32(&[a.dtype(), b.dtype(), out.dtype()])?;
    let l0 = *a.layout();
    let l1 = *b.layout();
    let [ne00, ne01, ne02, ne03] = l0.ne();
    let [ne10, ne11, ne12, ne13] = l1.ne();

    if ne00 != ne10 {
        return Err(TensorError::ShapeMismatch {
            op: "mul_mat",
            expected: l0.ne(),
            got: l1.ne(),
        });
    }
    if ne02 == 0 || ne03 == 0 || ne12 % ne02 != 0 || ne13 % ne03 != 0 {
        return Err(TensorError::UnsupportedBroadcast {
            src: l0.ne(),
            dst: l1.ne(),
        });
    }
    let elem = DType::F32.size_in_bytes();
    if l0.nb()[0] != elem || l1.nb()[0] != elem {
        return Err(TensorError::InvalidLayout(format!(
            "mul_mat needs rows contiguous along K, got a {} b {}",
            l0, l1
        )));
    }

    let src0 = a.f32_data()?;
    let src1 = b.f32_data()?;
    let ld = Layout::try_contiguous(DType::F32, [ne01, ne11, ne12, ne13])?;
    out.set_layout(ld)?;
    let dst = out.f32_data_mut()?;

    if ld.is_empty() {
        return Ok(());
    }

    let plan = ChunkPlan::new(ne01, ne11 * ne12 * ne13, 1);
    debug!(
        "mul_mat: a {} b {} -> {}, {}x{} chunks of {}x{}",
        l0, l1, ld, plan.nchunk0, plan.nchunk1, plan.dr0, plan.dr1
    );

    let args = MulMatArgs {
        src0,
        src1,
        k: ne00,
        ne: ld.ne(),
        s0: l0.element_strides(DType::F32),
        s1: l1.element_strides(DType::F32),
        sd: ld.element_strides(DType::F32),
        r2: ne12 / ne02,
        r3: ne13 / ne03,
    };

    // single thread: walk every chunk in order
    for chunk in plan.chunks() {
        mul_mat_one_chunk(&args, dst, &chunk);
    }

    Ok(())
}

fn mul_mat_one_chunk(args: &MulMatArgs<'_>, dst: &mut [f32], chunk: &ChunkRange) {
    if chunk.ir0.is_empty() || chunk.ir1.is_empty() {
        return;
    }

    let [_, ne1, ne2, _] = args.ne;
    let k = args.k;
    let mut tmp = [0.0f32; BLOCK_ROWS];

    for iir1 in chunk.ir1.clone().step_by(BLOCK_COLS) {
        let ir1_end = (iir1 + BLOCK_COLS).min(chunk.ir1.end);
        for iir0 in chunk.ir0.clone().step_by(BLOCK_ROWS) {
            let ir0_end = (iir0 + BLOCK_ROWS).min(chunk.ir0.end);
            for ir1 in iir1..ir1_end {
                let i13 = ir1 / (ne2 * ne1);
                let i12 = (ir1 - i13 * ne2 * ne1) / ne1;
                let i11 = ir1 - i13 * ne2 * ne1 - i12 * ne1;

                // broadcast a over the outer dimensions of b
                let i03 = i13 / args.r3;
                let i02 = i12 / args.r2;

                let a_plane = i02 * args.s0[2] + i03 * args.s0[3];
                let b_off = i11 * args.s1[1] + i12 * args.s1[2] + i13 * args.s1[3];
                let b_col = &args.src1[b_off..b_off + k];
                let d_col = i11 * args.sd[1] + i12 * args.sd[2] + i13 * args.sd[3];

                for ir0 in iir0..ir0_end {
                    let a_off = a_plane + ir0 * args.s0[1];
                    tmp[ir0 - iir0] = vec_dot_f32(&args.src0[a_off..a_off + k], b_col);
                }
                dst[d_col + iir0..d_col + ir0_end].copy_from_slice(&tmp[..ir0_end - iir0]);
            }
        }
    }
}
