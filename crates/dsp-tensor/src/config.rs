use crate::error::{Result, TensorError};

/// What a session does when a kernel precondition fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Return the error to the caller.
    #[default]
    Propagate,
    /// Log the error and abort the process, as the on-device plugin does.
    Abort,
}

/// Clock voting parameters recorded from `setclocks`.
///
/// The values are kept for reporting only; no power management happens on
/// this side of the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerConfig {
    /// Requested performance level, opaque to the kernels.
    pub power_level: u32,
    /// Wake-up latency budget in microseconds.
    pub latency_us: u32,
    /// Dynamic clock and voltage scaling.
    pub dcvs_enabled: bool,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            power_level: 0,
            latency_us: 100,
            dcvs_enabled: false,
        }
    }
}

/// Per-session kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Worker thread count reported for the session. Values above one select
    /// the multi-threaded mat-mul entry point.
    pub thread_counts: usize,
    pub failure_policy: FailurePolicy,
    pub power: PowerConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            thread_counts: 1,
            failure_policy: FailurePolicy::default(),
            power: PowerConfig::default(),
        }
    }
}

impl KernelConfig {
    pub fn with_thread_counts(mut self, thread_counts: usize) -> Self {
        self.thread_counts = thread_counts;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_power(mut self, power: PowerConfig) -> Self {
        self.power = power;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_counts == 0 {
            return Err(TensorError::Other(
                "thread_counts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
