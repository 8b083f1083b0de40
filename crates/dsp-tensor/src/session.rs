use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};

use crate::backend::ComputeBackend;
use crate::config::{FailurePolicy, KernelConfig, PowerConfig};
use crate::cpu::CpuBackend;
use crate::error::Result;
use crate::tensor::{TensorView, TensorViewMut};

/// One open connection to the kernels: a backend plus the configuration the
/// caller negotiated for it.
#[derive(Debug, Clone)]
pub struct DspSession {
    backend: Arc<dyn ComputeBackend>,
    config: KernelConfig,
}

impl DspSession {
    /// Open a session on the CPU backend.
    pub fn new(config: KernelConfig) -> Result<Self> {
        Self::with_backend(Arc::new(CpuBackend::new()), config)
    }

    pub fn with_backend(backend: Arc<dyn ComputeBackend>, config: KernelConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "session open: backend={} threads={}",
            backend.name(),
            config.thread_counts
        );
        Ok(Self { backend, config })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    /// Record new clock votes and thread count.
    pub fn set_clocks(&mut self, power: PowerConfig, thread_counts: usize) -> Result<()> {
        let config = self
            .config
            .clone()
            .with_power(power)
            .with_thread_counts(thread_counts);
        config.validate()?;
        info!(
            "setclocks: power_level={} latency={}us dcvs={} threads={}",
            power.power_level, power.latency_us, power.dcvs_enabled, thread_counts
        );
        self.config = config;
        Ok(())
    }

    /// Broadcast addition, see [`ComputeBackend::add`].
    pub fn add(
        &self,
        a: &TensorView<'_>,
        b: &TensorView<'_>,
        out: &mut TensorViewMut<'_>,
    ) -> Result<()> {
        let started = Instant::now();
        let result = self.backend.add(a, b, out);
        self.settle("add", started, result)
    }

    /// Matrix multiplication, see [`ComputeBackend::mul_mat`].
    ///
    /// With more than one configured thread this goes to the multi-threaded
    /// entry point, which currently computes nothing.
    pub fn mul_mat(
        &self,
        a: &TensorView<'_>,
        b: &TensorView<'_>,
        out: &mut TensorViewMut<'_>,
    ) -> Result<()> {
        let started = Instant::now();
        let result = if self.config.thread_counts > 1 {
            self.backend
                .mul_mat_multithread(a, b, out, self.config.thread_counts)
        } else {
            self.backend.mul_mat(a, b, out)
        };
        self.settle("mul_mat", started, result)
    }

    fn settle(&self, op: &str, started: Instant, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                debug!("{} done in {}us", op, started.elapsed().as_micros());
                Ok(())
            }
            Err(e) => match self.config.failure_policy {
                FailurePolicy::Propagate => Err(e),
                FailurePolicy::Abort => {
                    error!("{} failed: {}", op, e);
                    std::process::abort();
                }
            },
        }
    }
}
