//! Built-in host that collects registered cases and runs them in order.

use crate::case::{CaseBody, CaseOutcome, TestHost};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    Passed,
    Skipped,
    Failed,
    /// The kernel or the harness returned an error instead of an output.
    Errored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub suite: String,
    pub name: String,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CaseRecord {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.suite, self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub passed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errored: usize,
    pub records: Vec<CaseRecord>,
}

impl RunSummary {
    pub fn executed(&self) -> usize {
        self.records.len()
    }

    /// True when no executed case failed or errored.
    pub fn success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.status, CaseStatus::Failed | CaseStatus::Errored))
    }

    fn record(&mut self, record: CaseRecord) {
        match record.status {
            CaseStatus::Passed => self.passed += 1,
            CaseStatus::Skipped => self.skipped += 1,
            CaseStatus::Failed => self.failed += 1,
            CaseStatus::Errored => self.errored += 1,
        }
        self.records.push(record);
    }
}

struct RegisteredCase {
    suite: String,
    name: String,
    body: CaseBody,
}

#[derive(Default)]
pub struct CaseRunner {
    cases: Vec<RegisteredCase>,
    seen: HashSet<(String, String)>,
    filter: Option<String>,
    progress: bool,
}

impl TestHost for CaseRunner {
    fn register_case(&mut self, suite: &str, name: &str, body: CaseBody) -> Result<()> {
        ensure!(
            self.seen.insert((suite.to_string(), name.to_string())),
            "duplicate case {suite}.{name}"
        );
        self.cases.push(RegisteredCase {
            suite: suite.to_string(),
            name: name.to_string(),
            body,
        });
        Ok(())
    }
}

impl CaseRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs only cases whose `suite.name` contains `filter`.
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    /// Prints a line per finished case to stdout.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Registered cases, filtered or not.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// `suite.name` of every case the filter selects, in registration order.
    pub fn case_names(&self) -> Vec<String> {
        self.cases
            .iter()
            .filter(|case| selected_by(self.filter.as_deref(), &case.suite, &case.name))
            .map(|case| format!("{}.{}", case.suite, case.name))
            .collect()
    }

    /// Executes the selected cases one after another. A failing or erroring
    /// case is recorded and the run moves on.
    pub fn run(self) -> RunSummary {
        let Self {
            cases,
            filter,
            progress,
            ..
        } = self;
        let selected: Vec<RegisteredCase> = cases
            .into_iter()
            .filter(|case| selected_by(filter.as_deref(), &case.suite, &case.name))
            .collect();
        let total = selected.len();
        info!(cases = total, "running cases");

        let mut summary = RunSummary::default();
        for (position, RegisteredCase { suite, name, body }) in selected.into_iter().enumerate() {
            debug!(suite = %suite, case = %name, "case started");
            let (status, detail) = match body() {
                Ok(CaseOutcome::Passed) => (CaseStatus::Passed, None),
                Ok(CaseOutcome::Skipped { reason }) => (CaseStatus::Skipped, Some(reason)),
                Ok(CaseOutcome::Failed(mismatch)) => {
                    warn!(suite = %suite, case = %name, %mismatch, "case failed");
                    (CaseStatus::Failed, Some(mismatch.to_string()))
                }
                Err(err) => {
                    warn!(suite = %suite, case = %name, error = %err, "case errored");
                    (CaseStatus::Errored, Some(format!("{err:#}")))
                }
            };
            if progress {
                println!("[{}/{total}] {suite}.{name} {status:?}", position + 1);
            }
            summary.record(CaseRecord {
                suite,
                name,
                status,
                detail,
            });
        }
        info!(
            passed = summary.passed,
            skipped = summary.skipped,
            failed = summary.failed,
            errored = summary.errored,
            "run finished"
        );
        summary
    }
}

fn selected_by(filter: Option<&str>, suite: &str, name: &str) -> bool {
    filter.map_or(true, |filter| format!("{suite}.{name}").contains(filter))
}
