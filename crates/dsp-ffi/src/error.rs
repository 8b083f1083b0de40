use std::cell::RefCell;
use std::ffi::CString;

use log::debug;

use crate::types::DspStatus;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Store an error message for later retrieval via `dsp_last_error`.
pub fn set_last_error(msg: String) {
    debug!("ffi error: {}", msg);
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Take the last error message, leaving `None` in its place.
pub fn take_last_error() -> Option<CString> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

/// Record `e` and translate it into a status code.
pub fn fail(e: &dsp_tensor::TensorError) -> DspStatus {
    set_last_error(e.to_string());
    DspStatus::from(e)
}
