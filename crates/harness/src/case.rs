//! Host-framework interface and per-case outcomes.

use crate::verifier::Mismatch;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Result of one executed case. An `Err` from the body is reported separately
/// as an infrastructure error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum CaseOutcome {
    Passed,
    Skipped { reason: String },
    Failed(Mismatch),
}

impl CaseOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        CaseOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CaseOutcome::Failed(_))
    }
}

pub type CaseBody = Box<dyn FnOnce() -> Result<CaseOutcome> + Send>;

/// The test-execution framework cases are registered with.
pub trait TestHost {
    /// Registers one independently executable case. Failure to register
    /// (for example a duplicate name) is an error for the whole run.
    fn register_case(&mut self, suite: &str, name: &str, body: CaseBody) -> Result<()>;
}

/// Checks every parameter set of a segment in order, stopping at the first
/// mismatch. A segment where nothing applied is skipped as a whole.
pub fn run_segment<P, I, F>(problems: I, mut check: F) -> Result<CaseOutcome>
where
    I: IntoIterator<Item = P>,
    F: FnMut(&P) -> Result<CaseOutcome>,
{
    let mut checked = 0usize;
    for problem in problems {
        match check(&problem)? {
            CaseOutcome::Passed => checked += 1,
            CaseOutcome::Skipped { .. } => {}
            failed @ CaseOutcome::Failed(_) => return Ok(failed),
        }
    }
    Ok(if checked == 0 {
        CaseOutcome::skipped("no parameter set in this segment applies")
    } else {
        CaseOutcome::Passed
    })
}
