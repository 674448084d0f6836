//! Detailed information about grading one submission.
use serde::{Deserialize, Serialize};

/// How a grading run ended.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// Every case was executed; the score is meaningful.
    Completed,
    /// A case exceeded the wall-clock limit; remaining cases were skipped.
    TimedOut,
    /// The submission wrote to stderr; remaining cases were skipped.
    RuntimeError,
}

/// Result of running the submission on a single case.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaseOutcome {
    /// Position of the case in the suite
    pub case: u32,
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock time from launch to exit (or to the kill, on timeout)
    pub time_millis: u64,
    pub timed_out: bool,
}

/// Structured result of running a submission against the full suite.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GradingReport {
    pub verdict: Verdict,
    /// Outcomes of the cases that were actually executed, in suite order
    pub cases: Vec<CaseOutcome>,
    pub passed: u32,
    /// Size of the suite, including any skipped cases
    pub total: u32,
    /// floor(100 * passed / total); zero for aborted runs
    pub score: u32,
}

impl GradingReport {
    pub fn summary(&self) -> String {
        format!("{}/{} tests passed", self.passed, self.total)
    }
}
