//! Command line wiring for the kernelcheck harness.

use crate::config::{ExecutionMode, HarnessConfig};
use crate::runner::CaseRecord;
use crate::session::HarnessSession;
use anyhow::Result;
use clap::Parser;
use kernelcheck_kernels::config::DataType;
use kernelcheck_kernels::registry::KernelRegistry;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "kernelcheck", about = "Correctness harness for GEMM and Conv2D kernels")]
pub struct Cli {
    /// Run the exhaustive catalog instead of the quick one.
    #[arg(long, visible_alias = "exhaustive", default_value_t = false)]
    pub long: bool,

    /// Worker threads for the threaded variants; 0 disables them.
    #[arg(long, default_value_t = 2)]
    pub threads: usize,

    #[arg(long, default_value = "blocked")]
    pub kernel: String,

    /// Only run cases whose `suite.name` contains this string.
    #[arg(long)]
    pub filter: Option<String>,

    /// Print the selected case names and exit.
    #[arg(long, default_value_t = false)]
    pub list: bool,

    /// Write a JSON report of the run.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Element types checked by GEMM. Conv2D runs when `f32` is selected.
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [DtypeArg::F32, DtypeArg::F64]
    )]
    pub dtype: Vec<DtypeArg>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DtypeArg {
    F32,
    F64,
}

impl From<DtypeArg> for DataType {
    fn from(value: DtypeArg) -> DataType {
        match value {
            DtypeArg::F32 => DataType::F32,
            DtypeArg::F64 => DataType::F64,
        }
    }
}

impl From<Cli> for HarnessConfig {
    fn from(cli: Cli) -> HarnessConfig {
        let mut dtypes: Vec<DataType> = cli.dtype.into_iter().map(DataType::from).collect();
        dtypes.sort();
        dtypes.dedup();
        HarnessConfig {
            mode: if cli.long {
                ExecutionMode::Exhaustive
            } else {
                ExecutionMode::Quick
            },
            threads: cli.threads,
            kernel: cli.kernel,
            filter: cli.filter,
            list_only: cli.list,
            report: cli.report,
            dtypes,
        }
    }
}

pub fn run_cli(cli: Cli) -> Result<ExitCode> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let config = HarnessConfig::from(cli);
    let session = HarnessSession::new(config, KernelRegistry::with_default_kernels())?;

    if session.config().list_only {
        for name in session.prepare()?.case_names() {
            println!("{name}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = session.run()?;
    let summary = &report.summary;
    println!(
        "{} mode, kernel {}: {} passed, {} skipped, {} failed, {} errored",
        report.mode,
        report.kernel,
        summary.passed,
        summary.skipped,
        summary.failed,
        summary.errored
    );
    for record in report.failures() {
        print_failure(record);
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_failure(record: &CaseRecord) {
    match &record.detail {
        Some(detail) => println!("FAILED {}: {detail}", record.full_name()),
        None => println!("FAILED {}", record.full_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_quick_mode() {
        let cli = Cli::parse_from(["kernelcheck"]);
        let config = HarnessConfig::from(cli);
        assert_eq!(config.mode, ExecutionMode::Quick);
        assert_eq!(config.threads, 2);
        assert_eq!(config.kernel, "blocked");
        assert_eq!(config.dtypes, vec![DataType::F32, DataType::F64]);
        assert!(!config.list_only);
    }

    #[test]
    fn exhaustive_alias_and_dtype_list() {
        let cli = Cli::parse_from([
            "kernelcheck",
            "--exhaustive",
            "--dtype",
            "f64,f64",
            "--threads",
            "0",
            "--filter",
            "Dgemm",
        ]);
        let config = HarnessConfig::from(cli);
        assert_eq!(config.mode, ExecutionMode::Exhaustive);
        assert_eq!(config.threads, 0);
        assert_eq!(config.dtypes, vec![DataType::F64]);
        assert!(!config.checks_conv2d());
        assert_eq!(config.filter.as_deref(), Some("Dgemm"));
    }
}
