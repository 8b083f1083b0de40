use dsp_tensor::{DspSession, KernelConfig, Result};

/// Opaque handle owning one kernel session.
pub struct DspContext {
    pub session: DspSession,
}

impl DspContext {
    pub fn new(thread_counts: usize) -> Result<Self> {
        let config = KernelConfig::default().with_thread_counts(thread_counts);
        Ok(Self {
            session: DspSession::new(config)?,
        })
    }
}
