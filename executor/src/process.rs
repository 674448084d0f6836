use crate::{ExecError, ExecJob, ExecOutcome, Sandbox};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ProcessSandboxConfig {
    /// Interpreter invoked with the scratch artifact as its only argument
    pub interpreter: PathBuf,
    /// Directory scratch artifacts are created in
    pub scratch_dir: PathBuf,
}

/// Sandbox backend that runs the composed program as a plain child
/// process. Isolation is limited to a separate process and the wall-clock
/// bound.
pub struct ProcessSandbox {
    config: ProcessSandboxConfig,
}

impl ProcessSandbox {
    pub fn new(config: ProcessSandboxConfig) -> Self {
        ProcessSandbox { config }
    }
}

/// Uniquely named program file, removed on drop so every exit path
/// (success, crash, timeout, setup failure) cleans up.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    async fn create(dir: &Path, contents: &str) -> Result<Self, std::io::Error> {
        let path = dir.join(format!("run-{}.py", Uuid::new_v4()));
        tokio::fs::write(&path, contents).await?;
        Ok(ScratchFile { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                "failed to remove scratch artifact {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

fn compose(source: &str, entry_stub: &str) -> String {
    let mut program = String::with_capacity(source.len() + entry_stub.len() + 1);
    program.push_str(source);
    if !program.ends_with('\n') {
        program.push('\n');
    }
    program.push_str(entry_stub);
    program
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    #[tracing::instrument(skip(self, job, cancel), fields(time_limit = ?job.time_limit))]
    async fn run(&self, job: ExecJob, cancel: CancellationToken) -> Result<ExecOutcome, ExecError> {
        let program = compose(&job.source, &job.entry_stub);
        let scratch = ScratchFile::create(&self.config.scratch_dir, &program)
            .await
            .map_err(ExecError::Artifact)?;

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg(scratch.path());
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            interpreter: self.config.interpreter.display().to_string(),
            source,
        })?;

        let mut stdin = child.stdin.take().unwrap();
        stdin
            .write_all(job.stdin.as_bytes())
            .await
            .map_err(ExecError::Stdin)?;
        stdin.shutdown().await.map_err(ExecError::Stdin)?;
        // closes the pipe so the child sees EOF
        drop(stdin);

        let mut stdout = child.stdout.take().unwrap();
        let mut stderr = child.stderr.take().unwrap();
        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let start = Instant::now();
        let res = {
            let drain = async {
                tokio::try_join!(
                    tokio::io::copy(&mut stdout, &mut stdout_buf),
                    tokio::io::copy(&mut stderr, &mut stderr_buf),
                    child.wait(),
                )
            };
            tokio::pin!(drain);
            tokio::select! {
                _ = cancel.cancelled() => None,
                res = tokio::time::timeout(job.time_limit, &mut drain) => Some(res),
            }
        };
        let elapsed = start.elapsed();

        match res {
            None => {
                if let Err(err) = child.kill().await {
                    tracing::warn!("failed to kill cancelled process: {}", err);
                }
                Err(ExecError::Cancelled)
            }
            // deadline expired: kill the child instead of letting it run on
            Some(Err(_elapsed)) => {
                if let Err(err) = child.kill().await {
                    tracing::warn!("failed to kill timed out process: {}", err);
                }
                Ok(ExecOutcome {
                    stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
                    elapsed,
                    timed_out: true,
                })
            }
            Some(Ok(Err(err))) => Err(ExecError::Capture(err)),
            Some(Ok(Ok((_, _, _status)))) => Ok(ExecOutcome {
                stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
                elapsed,
                timed_out: false,
            }),
        }
    }
}
