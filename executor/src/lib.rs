//! Runs untrusted submissions in an isolated process with a bounded
//! wall-clock time.

mod process;

pub use process::{ProcessSandbox, ProcessSandboxConfig};

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One program execution: the submitted source, the invocation stub that
/// is appended to it, the input line and the time limit.
#[derive(Debug, Clone)]
pub struct ExecJob {
    pub source: String,
    pub entry_stub: String,
    pub stdin: String,
    pub time_limit: Duration,
}

/// What a finished (or killed) execution produced.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock time from spawn to exit, or to the kill on timeout
    pub elapsed: Duration,
    pub timed_out: bool,
}

/// Environment-level failures. None of these are attributable to the
/// submission itself.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("failed to create scratch artifact")]
    Artifact(#[source] std::io::Error),
    #[error("failed to spawn interpreter `{interpreter}`")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write program input")]
    Stdin(#[source] std::io::Error),
    #[error("failed to capture program output")]
    Capture(#[source] std::io::Error),
    #[error("execution was cancelled")]
    Cancelled,
}

/// Isolation capability the grading engine runs submissions through.
///
/// [`ProcessSandbox`] is a plain child process with a wall-clock bound and
/// nothing else; a backend with real filesystem/network isolation can be
/// swapped in behind this trait without touching the engine.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn run(&self, job: ExecJob, cancel: CancellationToken) -> Result<ExecOutcome, ExecError>;
}
