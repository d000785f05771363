//! JSON report of a finished run.

use crate::config::{ExecutionMode, HarnessConfig};
use crate::runner::{CaseRecord, RunSummary};
use kernelcheck_kernels::config::DataType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: ExecutionMode,
    pub kernel: String,
    pub threads: usize,
    pub dtypes: Vec<DataType>,
    pub generated_at_unix_ms: u128,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(config: &HarnessConfig, threads: usize, summary: RunSummary) -> Self {
        let generated_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_millis();
        Self {
            mode: config.mode,
            kernel: config.kernel.clone(),
            threads,
            dtypes: config.dtypes.clone(),
            generated_at_unix_ms,
            summary,
        }
    }

    pub fn success(&self) -> bool {
        self.summary.success()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseRecord> {
        self.summary.failures()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let report = serde_json::from_str(&json)?;
        Ok(report)
    }
}
