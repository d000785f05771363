//! Harness session orchestration.

use crate::config::{ExecutionMode, HarnessConfig};
use crate::env::ExecutionEnv;
use crate::report::RunReport;
use crate::runner::CaseRunner;
use crate::sweep::{register_all, SweepRegistry};
use anyhow::{ensure, Result};
use kernelcheck_kernels::registry::KernelRegistry;
use std::sync::Arc;
use tracing::info;

pub struct HarnessSession {
    config: HarnessConfig,
    kernels: KernelRegistry,
    env: Arc<ExecutionEnv>,
}

impl HarnessSession {
    pub fn new(config: HarnessConfig, kernels: KernelRegistry) -> Result<Self> {
        let known = kernels.names();
        ensure!(
            known.contains(&config.kernel.as_str()),
            "unknown kernel library {:?}, available: {}",
            config.kernel,
            known.join(", ")
        );
        let env = Arc::new(ExecutionEnv::new(config.threads)?);
        Ok(Self {
            config,
            kernels,
            env,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn env(&self) -> &ExecutionEnv {
        &self.env
    }

    /// Populates a fresh sweep registry and drains the configured catalog
    /// into a runner.
    pub fn prepare(&self) -> Result<CaseRunner> {
        let mut registry = SweepRegistry::new();
        register_all(&mut registry, &self.kernels, &self.config, &self.env)?;

        let mut runner = CaseRunner::new()
            .with_filter(self.config.filter.clone())
            .with_progress(self.config.mode == ExecutionMode::Exhaustive);
        let registered = registry.drain(self.config.mode, &mut runner)?;
        info!(
            mode = %self.config.mode,
            kernel = %self.config.kernel,
            threads = self.env.threads(),
            cases = registered,
            "cases registered"
        );
        Ok(runner)
    }

    /// Runs every selected case and writes the report if a path is configured.
    pub fn run(&self) -> Result<RunReport> {
        let summary = self.prepare()?.run();
        let report = RunReport::new(&self.config, self.env.threads(), summary);
        if let Some(path) = &self.config.report {
            report.save(path)?;
            info!(path = %path.display(), "report written");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernelcheck_kernels::config::DataType;

    #[test]
    fn unknown_kernel_is_rejected() {
        let config = HarnessConfig {
            kernel: "mkl".into(),
            ..HarnessConfig::default()
        };
        let err = HarnessSession::new(config, KernelRegistry::with_default_kernels())
            .err()
            .expect("unknown kernel");
        assert!(err.to_string().contains("blocked"));
    }

    #[test]
    fn prepare_registers_both_threadings() {
        let config = HarnessConfig {
            dtypes: vec![DataType::F64],
            filter: Some("DgemmNoPack_Quick.Threaded/A/B/M:3xN:3xK:3/".into()),
            ..HarnessConfig::default()
        };
        let session = HarnessSession::new(config, KernelRegistry::with_default_kernels())
            .expect("session");
        let runner = session.prepare().expect("prepare");
        assert_eq!(runner.case_names().len(), 1);
        assert!(runner.len() > runner.case_names().len());
    }
}
