//! Verification harness executable for kernelcheck.

use anyhow::Result;
use clap::Parser;
use kernelcheck_harness::cli::{run_cli, Cli};
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    run_cli(cli)
}
