mod context;
mod error;
mod types;

pub use context::*;
pub use error::*;
pub use types::*;

use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::panic::AssertUnwindSafe;

use dsp_tensor::{
    DType, DspSession, Layout, PowerConfig, TensorError, TensorView, TensorViewMut, MAX_DIMS,
};

/// Execute a closure that returns a `DspStatus`, catching any panics
/// and converting them into `DspStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> DspStatus>(f: F) -> DspStatus {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            DspStatus::ErrorInternal
        }
    }
}

fn status_of(result: dsp_tensor::Result<()>) -> DspStatus {
    match result {
        Ok(()) => DspStatus::Ok,
        Err(e) => fail(&e),
    }
}

/// Open a kernel session.
///
/// `thread_counts` of zero is treated as one. On success, writes a
/// heap-allocated handle into `*handle_out`; release it with `dsp_close`.
#[no_mangle]
pub extern "C" fn dsp_open(thread_counts: u32, handle_out: *mut *mut DspContext) -> DspStatus {
    catch_panic(|| {
        if handle_out.is_null() {
            set_last_error("handle_out is null".to_string());
            return DspStatus::ErrorInvalidArgument;
        }
        let ctx = match DspContext::new(thread_counts.max(1) as usize) {
            Ok(ctx) => Box::new(ctx),
            Err(e) => return fail(&e),
        };
        unsafe {
            *handle_out = Box::into_raw(ctx);
        }
        DspStatus::Ok
    })
}

/// Close a session previously opened by `dsp_open`.
///
/// Passing a null pointer is a no-op and returns `DspStatus::Ok`.
#[no_mangle]
pub unsafe extern "C" fn dsp_close(handle: *mut DspContext) -> DspStatus {
    if handle.is_null() {
        return DspStatus::Ok;
    }
    drop(Box::from_raw(handle));
    DspStatus::Ok
}

/// Record clock votes and the session thread count.
#[no_mangle]
pub unsafe extern "C" fn dsp_setclocks(handle: *mut DspContext, params: DspClockParams) -> DspStatus {
    catch_panic(|| {
        if handle.is_null() {
            set_last_error("null handle".to_string());
            return DspStatus::ErrorInvalidArgument;
        }
        let ctx = unsafe { &mut *handle };
        let power = PowerConfig {
            power_level: params.power_level,
            latency_us: params.latency_us,
            dcvs_enabled: params.dcvs_enabled,
        };
        status_of(ctx.session.set_clocks(power, params.thread_counts as usize))
    })
}

/// Report the thread count configured for the session.
#[no_mangle]
pub unsafe extern "C" fn dsp_get_thread_counts(handle: *const DspContext, out: *mut u32) -> DspStatus {
    if handle.is_null() || out.is_null() {
        set_last_error("null argument".to_string());
        return DspStatus::ErrorInvalidArgument;
    }
    let threads = (*handle).session.config().thread_counts;
    *out = u32::try_from(threads).unwrap_or(u32::MAX);
    DspStatus::Ok
}

/// Broadcast addition `out = a + repeat(b)`.
///
/// On success `out->ne`/`out->nb` describe the written result.
#[no_mangle]
pub unsafe extern "C" fn dsp_add(
    handle: *mut DspContext,
    a: *const DspTensor,
    b: *const DspTensor,
    out: *mut DspTensor,
) -> DspStatus {
    catch_panic(|| status_of(unsafe { run_binary(handle, a, b, out, DspSession::add) }))
}

/// Matrix multiplication, `out[m, n] = Σ_k a[k, m] * b[k, n]`.
///
/// On success `out->ne`/`out->nb` describe the written result. Sessions opened
/// with more than one thread go through the multi-threaded entry point, which
/// does not compute anything yet.
#[no_mangle]
pub unsafe extern "C" fn dsp_mulmat(
    handle: *mut DspContext,
    a: *const DspTensor,
    b: *const DspTensor,
    out: *mut DspTensor,
) -> DspStatus {
    catch_panic(|| status_of(unsafe { run_binary(handle, a, b, out, DspSession::mul_mat) }))
}

/// Retrieve the last error message.
///
/// Returns a pointer to a C string describing the most recent error on this
/// thread, or null if there is none. Free it with `dsp_free_string`.
#[no_mangle]
pub extern "C" fn dsp_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `dsp_last_error`.
#[no_mangle]
pub unsafe extern "C" fn dsp_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

type BinaryOp = fn(
    &DspSession,
    &TensorView<'_>,
    &TensorView<'_>,
    &mut TensorViewMut<'_>,
) -> dsp_tensor::Result<()>;

/// A descriptor with its metadata checked, memory not yet touched.
struct RawTensor {
    layout: Layout,
    data: *mut c_void,
    len: usize,
}

impl RawTensor {
    fn decode(t: &DspTensor) -> dsp_tensor::Result<Self> {
        let dtype = DType::from_ggml_type(t.type_)
            .ok_or_else(|| TensorError::Other(format!("unknown tensor type id {}", t.type_)))?;
        if dtype != DType::F32 {
            return Err(TensorError::UnsupportedType(dtype));
        }
        let mut ne = [0usize; MAX_DIMS];
        let mut nb = [0usize; MAX_DIMS];
        for i in 0..MAX_DIMS {
            ne[i] = usize::try_from(t.ne[i]).map_err(|_| {
                TensorError::InvalidLayout(format!("ne[{}]={} is negative", i, t.ne[i]))
            })?;
            nb[i] = usize::try_from(t.nb[i]).map_err(|_| {
                TensorError::InvalidLayout(format!("nb[{}]={} does not fit", i, t.nb[i]))
            })?;
        }
        let len = usize::try_from(t.data_len)
            .map_err(|_| TensorError::Other(format!("data_len {} does not fit", t.data_len)))?;
        if t.data.is_null() && len > 0 {
            return Err(TensorError::Other("null data with non-zero length".to_string()));
        }
        if len > 0 && (t.data as usize) % std::mem::align_of::<f32>() != 0 {
            return Err(TensorError::InvalidLayout(format!(
                "data pointer {:p} is not aligned for f32",
                t.data
            )));
        }
        len.checked_mul(std::mem::size_of::<f32>())
            .and_then(|bytes| (t.data as usize).checked_add(bytes))
            .ok_or_else(|| {
                TensorError::Other(format!("data_len {} exceeds the address space", len))
            })?;
        Ok(RawTensor {
            layout: Layout::strided(ne, nb),
            data: t.data,
            len,
        })
    }

    fn byte_range(&self) -> (usize, usize) {
        let start = self.data as usize;
        (start, start + self.len * std::mem::size_of::<f32>())
    }

    fn overlaps(&self, other: &RawTensor) -> bool {
        let (s0, e0) = self.byte_range();
        let (s1, e1) = other.byte_range();
        s0 < e1 && s1 < e0
    }

    /// # Safety
    /// `data` must be valid for reads of `len` f32 values for `'a`.
    unsafe fn as_f32<'a>(&self) -> &'a [f32] {
        if self.len == 0 {
            return &[];
        }
        std::slice::from_raw_parts(self.data as *const f32, self.len)
    }

    /// # Safety
    /// `data` must be valid for writes of `len` f32 values for `'a` and not
    /// aliased by any other live reference.
    unsafe fn as_f32_mut<'a>(&self) -> &'a mut [f32] {
        if self.len == 0 {
            return &mut [];
        }
        std::slice::from_raw_parts_mut(self.data as *mut f32, self.len)
    }
}

unsafe fn run_binary(
    handle: *mut DspContext,
    a: *const DspTensor,
    b: *const DspTensor,
    out: *mut DspTensor,
    op: BinaryOp,
) -> dsp_tensor::Result<()> {
    if handle.is_null() || a.is_null() || b.is_null() || out.is_null() {
        return Err(TensorError::Other("null argument".to_string()));
    }
    let ctx = &*handle;
    let ra = RawTensor::decode(&*a)?;
    let rb = RawTensor::decode(&*b)?;
    let rout = RawTensor::decode(&*out)?;
    if rout.overlaps(&ra) || rout.overlaps(&rb) {
        return Err(TensorError::Other(
            "output buffer overlaps an input".to_string(),
        ));
    }

    let a_view = TensorView::from_f32(ra.layout, ra.as_f32())?;
    let b_view = TensorView::from_f32(rb.layout, rb.as_f32())?;
    let mut out_layout = rout.layout;
    {
        let mut out_view = TensorViewMut::from_f32(&mut out_layout, rout.as_f32_mut())?;
        op(&ctx.session, &a_view, &b_view, &mut out_view)?;
    }

    let out = &mut *out;
    for i in 0..MAX_DIMS {
        out.ne[i] = out_layout.ne()[i] as i64;
        out.nb[i] = out_layout.nb()[i] as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::ptr;

    fn descriptor(data: &mut [f32], dims: [usize; 4]) -> DspTensor {
        let layout = Layout::contiguous(DType::F32, dims);
        DspTensor {
            type_: 0,
            ne: layout.ne().map(|v| v as i64),
            nb: layout.nb().map(|v| v as u64),
            data: data.as_mut_ptr() as *mut c_void,
            data_len: data.len() as u64,
        }
    }

    fn open(threads: u32) -> *mut DspContext {
        let mut handle = ptr::null_mut();
        assert_eq!(dsp_open(threads, &mut handle), DspStatus::Ok);
        assert!(!handle.is_null());
        handle
    }

    fn last_error() -> String {
        let p = dsp_last_error();
        assert!(!p.is_null());
        let msg = unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned();
        unsafe { dsp_free_string(p as *mut c_char) };
        msg
    }

    #[test]
    fn test_open_close() {
        let handle = open(0);
        let mut threads = 0u32;
        unsafe {
            assert_eq!(dsp_get_thread_counts(handle, &mut threads), DspStatus::Ok);
            assert_eq!(threads, 1);
            assert_eq!(dsp_close(handle), DspStatus::Ok);
            assert_eq!(dsp_close(ptr::null_mut()), DspStatus::Ok);
        }
        assert_eq!(dsp_open(1, ptr::null_mut()), DspStatus::ErrorInvalidArgument);
    }

    #[test]
    fn test_add_broadcast_writes_layout() {
        let handle = open(1);
        let mut a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut b = vec![10.0f32, 20.0, 30.0];
        let mut out = vec![0.0f32; 8];
        let da = descriptor(&mut a, [3, 2, 1, 1]);
        let db = descriptor(&mut b, [3, 1, 1, 1]);
        let mut dout = descriptor(&mut out, [8, 1, 1, 1]);
        unsafe {
            assert_eq!(dsp_add(handle, &da, &db, &mut dout), DspStatus::Ok);
            dsp_close(handle);
        }
        assert_eq!(dout.ne, [3, 2, 1, 1]);
        assert_eq!(dout.nb, [4, 12, 24, 24]);
        assert_eq!(&out[..6], &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    }

    #[test]
    fn test_mulmat() {
        let handle = open(1);
        let mut a = vec![1.0f32, 2.0, 3.0, 4.0];
        let mut b = vec![5.0f32, 6.0, 7.0, 8.0];
        let mut out = vec![0.0f32; 4];
        let da = descriptor(&mut a, [2, 2, 1, 1]);
        let db = descriptor(&mut b, [2, 2, 1, 1]);
        let mut dout = descriptor(&mut out, [4, 1, 1, 1]);
        unsafe {
            assert_eq!(dsp_mulmat(handle, &da, &db, &mut dout), DspStatus::Ok);
            dsp_close(handle);
        }
        assert_eq!(dout.ne, [2, 2, 1, 1]);
        assert_eq!(out, vec![17.0, 39.0, 23.0, 53.0]);
    }

    #[test]
    fn test_mulmat_multithread_leaves_output() {
        let handle = open(4);
        let mut a = vec![1.0f32; 4];
        let mut b = vec![1.0f32; 4];
        let mut out = vec![-3.0f32; 4];
        let da = descriptor(&mut a, [2, 2, 1, 1]);
        let db = descriptor(&mut b, [2, 2, 1, 1]);
        let mut dout = descriptor(&mut out, [4, 1, 1, 1]);
        unsafe {
            assert_eq!(dsp_mulmat(handle, &da, &db, &mut dout), DspStatus::Ok);
            dsp_close(handle);
        }
        assert_eq!(dout.ne, [4, 1, 1, 1]);
        assert_eq!(out, vec![-3.0; 4]);
    }

    #[test]
    fn test_bad_broadcast_status_and_message() {
        let handle = open(1);
        let mut a = vec![0.0f32; 5];
        let mut b = vec![0.0f32; 2];
        let mut out = vec![0.0f32; 5];
        let da = descriptor(&mut a, [5, 1, 1, 1]);
        let db = descriptor(&mut b, [2, 1, 1, 1]);
        let mut dout = descriptor(&mut out, [5, 1, 1, 1]);
        unsafe {
            assert_eq!(
                dsp_add(handle, &da, &db, &mut dout),
                DspStatus::ErrorUnsupportedBroadcast
            );
            dsp_close(handle);
        }
        assert!(last_error().contains("cannot broadcast"));
    }

    #[test]
    fn test_rejects_aliased_output() {
        let handle = open(1);
        let mut a = vec![1.0f32; 4];
        let mut b = vec![1.0f32; 4];
        let da = descriptor(&mut a, [4, 1, 1, 1]);
        let db = descriptor(&mut b, [4, 1, 1, 1]);
        let mut dout = da;
        unsafe {
            assert_eq!(
                dsp_add(handle, &da, &db, &mut dout),
                DspStatus::ErrorInvalidArgument
            );
            dsp_close(handle);
        }
        assert_eq!(a, vec![1.0; 4]);
    }

    #[test]
    fn test_rejects_bad_descriptors() {
        let handle = open(1);
        let mut a = vec![1.0f32; 4];
        let mut b = vec![1.0f32; 4];
        let mut out = vec![0.0f32; 4];
        let da = descriptor(&mut a, [4, 1, 1, 1]);
        let db = descriptor(&mut b, [4, 1, 1, 1]);
        let mut dout = descriptor(&mut out, [4, 1, 1, 1]);

        let mut negative = da;
        negative.ne[1] = -1;
        let mut half = da;
        half.type_ = 1;
        let mut short = da;
        short.data_len = 2;

        unsafe {
            assert_eq!(
                dsp_add(handle, &negative, &db, &mut dout),
                DspStatus::ErrorInvalidLayout
            );
            assert_eq!(
                dsp_add(handle, &half, &db, &mut dout),
                DspStatus::ErrorUnsupportedType
            );
            assert_eq!(
                dsp_add(handle, &short, &db, &mut dout),
                DspStatus::ErrorInvalidLayout
            );
            assert_eq!(
                dsp_add(handle, &da, ptr::null(), &mut dout),
                DspStatus::ErrorInvalidArgument
            );
            dsp_close(handle);
        }
    }

    #[test]
    fn test_rejects_misaligned_data() {
        let handle = open(1);
        let mut raw = vec![0u8; 4 * std::mem::size_of::<f32>() + 1];
        let mut b = vec![1.0f32; 4];
        let mut out = vec![0.0f32; 4];
        let mut da = descriptor(&mut b, [4, 1, 1, 1]);
        da.data = unsafe { raw.as_mut_ptr().add(1) } as *mut c_void;
        let db = descriptor(&mut b, [4, 1, 1, 1]);
        let mut dout = descriptor(&mut out, [4, 1, 1, 1]);
        unsafe {
            assert_eq!(
                dsp_add(handle, &da, &db, &mut dout),
                DspStatus::ErrorInvalidLayout
            );
            assert_eq!(
                dsp_mulmat(handle, &db, &da, &mut dout),
                DspStatus::ErrorInvalidLayout
            );
            dsp_close(handle);
        }
        assert!(last_error().contains("not aligned"));
        assert_eq!(out, vec![0.0; 4]);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_rejects_overflowing_strides() {
        let handle = open(1);
        let mut a = vec![1.0f32; 4];
        let mut b = vec![1.0f32; 4];
        let mut out = vec![0.0f32; 36];
        let mut da = descriptor(&mut a, [4, 3, 3, 1]);
        da.nb = [4, 1 << 62, 1 << 62, 1 << 62];
        let db = descriptor(&mut b, [4, 1, 1, 1]);
        let mut dout = descriptor(&mut out, [36, 1, 1, 1]);
        unsafe {
            assert_eq!(
                dsp_add(handle, &da, &db, &mut dout),
                DspStatus::ErrorInvalidLayout
            );
            dsp_close(handle);
        }
        assert!(last_error().contains("overflow"));
    }

    #[test]
    fn test_setclocks_updates_threads() {
        let handle = open(1);
        let params = DspClockParams {
            power_level: 5,
            latency_us: 20,
            dcvs_enabled: true,
            thread_counts: 3,
        };
        let mut threads = 0u32;
        unsafe {
            assert_eq!(dsp_setclocks(handle, params), DspStatus::Ok);
            assert_eq!(dsp_get_thread_counts(handle, &mut threads), DspStatus::Ok);
            assert_eq!(threads, 3);
            assert_eq!((*handle).session.config().power.latency_us, 20);

            let invalid = DspClockParams {
                thread_counts: 0,
                ..DspClockParams::default()
            };
            assert_eq!(
                dsp_setclocks(handle, invalid),
                DspStatus::ErrorInvalidArgument
            );
            dsp_close(handle);
        }
    }

    #[test]
    fn test_last_error_taken_once() {
        set_last_error("boom".to_string());
        assert_eq!(last_error(), "boom");
        assert!(dsp_last_error().is_null());
    }
}
