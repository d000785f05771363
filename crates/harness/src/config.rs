//! Run configuration.

use kernelcheck_kernels::config::DataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which catalog of sweep generators a run drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    Quick,
    Exhaustive,
}

impl ExecutionMode {
    pub const ALL: [ExecutionMode; 2] = [ExecutionMode::Quick, ExecutionMode::Exhaustive];

    /// Suffix used in suite names.
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionMode::Quick => "Quick",
            ExecutionMode::Exhaustive => "Exhaustive",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Quick => "quick",
            ExecutionMode::Exhaustive => "exhaustive",
        })
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub mode: ExecutionMode,
    /// Worker count of the shared pool; `0` runs every case without one.
    pub threads: usize,
    /// Kernel library looked up in the registry.
    pub kernel: String,
    /// Only cases whose `suite.name` contains this string run.
    pub filter: Option<String>,
    pub list_only: bool,
    pub report: Option<PathBuf>,
    /// Element types GEMM is checked with. Conv2D runs when `F32` is present.
    pub dtypes: Vec<DataType>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Quick,
            threads: 2,
            kernel: "blocked".to_string(),
            filter: None,
            list_only: false,
            report: None,
            dtypes: vec![DataType::F32, DataType::F64],
        }
    }
}

impl HarnessConfig {
    pub fn checks_conv2d(&self) -> bool {
        self.dtypes.contains(&DataType::F32)
    }
}
