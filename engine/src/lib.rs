//! Engine is the part of the grader that deals with a single submission
//! (and it doesn't care where it came from).

pub mod suite;

use anyhow::Context;
use executor::{ExecJob, ExecOutcome, Sandbox};
use grader_apis::report::{CaseOutcome, GradingReport, Verdict};
use score_store::ScoreStore;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Single grading request.
pub struct Request {
    /// Identity the score is stored under. The caller validates it before
    /// handing it to the engine.
    pub user_id: String,
    /// Submission source
    pub run_source: Vec<u8>,
}

/// Part of response stream
pub enum Event {
    /// The grading report has been produced. Sent at most once.
    ReportReady(GradingReport),
    /// Live status update: submission is being run on given case.
    LiveCase(u32),
    /// Live status update: submission has reached given score.
    LiveScore(u32),
}

/// Overall response state
#[derive(Debug)]
pub enum GradeOutcome {
    /// Submission was graded; the report sent earlier is final and the
    /// stored score was updated accordingly.
    Success,
    /// Grading or persistence failed because of an internal error.
    /// A report may have been emitted, but the stored score was not
    /// changed by this run.
    Fault { error: anyhow::Error },
}

/// What to do with the remaining cases once a case faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPolicy {
    /// A timeout or runtime error aborts the run: remaining cases are
    /// skipped, the score is zero and the stored best may be reset.
    AbortOnFault,
    /// Faulting cases merely count as failed; every case still runs and
    /// the score is computed normally.
    RunAllCases,
}

/// Contains the sandbox the submissions run in and the score store.
#[derive(Clone)]
pub struct Deps {
    pub sandbox: Arc<dyn Sandbox>,
    pub scores: Arc<dyn ScoreStore>,
}

/// Settings are global rather than coming from a request.
#[derive(Clone)]
pub struct Settings {
    /// Wall-clock limit per case
    pub case_timeout: Duration,
    pub fault_policy: FaultPolicy,
    /// Whether an aborted run resets the stored best score to zero
    pub reset_score_on_abort: bool,
    /// ${report_dump_dir}/${job_id} will contain the grading report
    pub report_dump_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            case_timeout: Duration::from_secs(2),
            fault_policy: FaultPolicy::AbortOnFault,
            reset_score_on_abort: true,
            report_dump_dir: None,
        }
    }
}

/// The main function, which grades a single submission.
#[tracing::instrument(skip(req, deps, settings, cancel))]
pub fn grade(req: Request, deps: Deps, settings: Settings, cancel: CancellationToken) -> JobProgress {
    let (done_tx, done_rx) = oneshot::channel();
    let (events_tx, events_rx) = mpsc::channel(1);
    tokio::task::spawn(
        async move {
            let res = do_grade(req, events_tx, deps, settings, cancel).await;
            if let Err(err) = &res {
                tracing::warn!(err = %format_args!("{:#}", err), "grading failed, responding with grader fault");
            }
            done_tx.send(res).ok();
        }
        .in_current_span(),
    );
    JobProgress { events_rx, done_rx }
}

/// Can be used to view grading progress
pub struct JobProgress {
    events_rx: mpsc::Receiver<Event>,
    done_rx: oneshot::Receiver<anyhow::Result<()>>,
}

impl JobProgress {
    /// Wait for completion. All pending events will be dropped.
    pub async fn wait(self) -> GradeOutcome {
        let res = self
            .done_rx
            .await
            .unwrap_or_else(|_| Err(anyhow::Error::msg("background task stopped unexpectedly")));
        match res {
            Ok(()) => GradeOutcome::Success,
            Err(error) => GradeOutcome::Fault { error },
        }
    }

    /// Returns next event.
    pub async fn event(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }
}

async fn do_grade(
    req: Request,
    tx: mpsc::Sender<Event>,
    deps: Deps,
    settings: Settings,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!("looking up user");
    let prior_best = deps
        .scores
        .best_score(&req.user_id)
        .await
        .context("failed to look up user")?;

    let source =
        String::from_utf8(req.run_source).context("submission source is not valid utf-8")?;

    let cases = suite::cases();
    let total = cases.len() as u32;
    let mut outcomes: Vec<CaseOutcome> = Vec::new();
    let mut passed = 0u32;
    let mut abort: Option<Verdict> = None;

    tracing::info!("running tests");
    for (idx, case) in cases.iter().enumerate() {
        let idx = idx as u32;
        tx.send(Event::LiveCase(idx)).await.ok();

        let job = ExecJob {
            source: source.clone(),
            entry_stub: suite::PYTHON_ENTRY_STUB.to_string(),
            stdin: case.stdin_line(),
            time_limit: settings.case_timeout,
        };
        let exec = deps
            .sandbox
            .run(job, cancel.clone())
            .await
            .with_context(|| format!("failed to execute submission on case {}", idx))?;

        if exec.timed_out {
            tracing::info!(case = idx, "submission timed out");
            outcomes.push(case_outcome(idx, false, &exec));
            if settings.fault_policy == FaultPolicy::AbortOnFault {
                abort = Some(Verdict::TimedOut);
                break;
            }
        } else if !exec.stderr.trim().is_empty() {
            // treated as a failure of the submission as a whole, not of
            // this particular case
            tracing::info!(case = idx, "submission wrote to stderr");
            outcomes.push(case_outcome(idx, false, &exec));
            if settings.fault_policy == FaultPolicy::AbortOnFault {
                abort = Some(Verdict::RuntimeError);
                break;
            }
        } else {
            let ok = exec.stdout.trim() == case.answer;
            if ok {
                passed += 1;
            }
            outcomes.push(case_outcome(idx, ok, &exec));
            tx.send(Event::LiveScore(100 * passed / total)).await.ok();
        }
    }

    let (verdict, score) = match abort {
        Some(v) => (v, 0),
        None => (Verdict::Completed, 100 * passed / total),
    };
    let report = GradingReport {
        verdict,
        cases: outcomes,
        passed,
        total,
        score,
    };
    tx.send(Event::ReportReady(report.clone())).await.ok();
    if let Some(dest) = &settings.report_dump_dir {
        if let Err(err) = try_dump_report(&report, dest).await {
            tracing::warn!("failed to save debug dump of the report: {:#}", err);
        }
    }

    tracing::info!(score, prior_best, verdict = ?report.verdict, "persisting score");
    match abort {
        Some(_) if settings.reset_score_on_abort => {
            deps.scores
                .force_best(&req.user_id, 0)
                .await
                .context("failed to reset best score")?;
        }
        Some(_) => {}
        None => {
            let updated = deps
                .scores
                .set_best_if_greater(&req.user_id, score)
                .await
                .context("failed to update best score")?;
            if updated {
                tracing::info!(score, "stored new best score");
            }
        }
    }

    Ok(())
}

fn case_outcome(idx: u32, passed: bool, exec: &ExecOutcome) -> CaseOutcome {
    CaseOutcome {
        case: idx,
        passed,
        stdout: exec.stdout.clone(),
        stderr: exec.stderr.clone(),
        time_millis: exec.elapsed.as_millis() as u64,
        timed_out: exec.timed_out,
    }
}

async fn try_dump_report(report: &GradingReport, dest: &Path) -> anyhow::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("failed to create dump directory")?;
    }
    let data = serde_json::to_vec_pretty(report).context("failed to serialize report")?;
    tokio::fs::write(dest, data)
        .await
        .with_context(|| format!("failed to write report to {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use executor::{ExecError, ExecJob, ExecOutcome};
    use score_store::{MemoryStore, StoreError};
    use std::sync::atomic::{AtomicU32, Ordering};

    const USER: &str = "ann@example.edu";

    /// Sandbox whose behavior is a closure over the job; counts calls so
    /// tests can assert that aborted runs skip the remaining cases.
    struct ScriptedSandbox {
        respond: Box<dyn Fn(&ExecJob) -> Result<ExecOutcome, ExecError> + Send + Sync>,
        calls: AtomicU32,
    }

    impl ScriptedSandbox {
        fn new(
            respond: impl Fn(&ExecJob) -> Result<ExecOutcome, ExecError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(ScriptedSandbox {
                respond: Box::new(respond),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Sandbox for ScriptedSandbox {
        async fn run(
            &self,
            job: ExecJob,
            _cancel: CancellationToken,
        ) -> Result<ExecOutcome, ExecError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.respond)(&job)
        }
    }

    fn outcome(stdout: &str, stderr: &str, timed_out: bool) -> ExecOutcome {
        ExecOutcome {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            elapsed: Duration::from_millis(12),
            timed_out,
        }
    }

    /// Behaves like a correct solution: answers each case with its
    /// expected output.
    fn correct_answer(job: &ExecJob) -> Result<ExecOutcome, ExecError> {
        let case = suite::cases()
            .iter()
            .find(|c| c.stdin_line() == job.stdin)
            .expect("unknown stdin line");
        Ok(outcome(&format!("{}\n", case.answer), "", false))
    }

    fn deps(sandbox: Arc<ScriptedSandbox>, scores: Arc<dyn ScoreStore>) -> Deps {
        Deps { sandbox, scores }
    }

    async fn run_to_end(deps: Deps, settings: Settings) -> (GradeOutcome, Option<GradingReport>) {
        let req = Request {
            user_id: USER.to_string(),
            run_source: b"def knight_attack(n, kr, kc, pr, pc):\n    return 0\n".to_vec(),
        };
        let mut progress = grade(req, deps, settings, CancellationToken::new());
        let mut report = None;
        while let Some(ev) = progress.event().await {
            if let Event::ReportReady(r) = ev {
                report = Some(r);
            }
        }
        (progress.wait().await, report)
    }

    #[tokio::test]
    async fn perfect_submission_scores_100_and_raises_best() {
        let sandbox = ScriptedSandbox::new(correct_answer);
        let scores = Arc::new(MemoryStore::with_users(vec![(USER, 40)]));
        let (out, report) =
            run_to_end(deps(sandbox.clone(), scores.clone()), Settings::default()).await;
        assert!(matches!(out, GradeOutcome::Success));
        let report = report.unwrap();
        assert_eq!(report.verdict, Verdict::Completed);
        assert_eq!(report.passed, 8);
        assert_eq!(report.total, 8);
        assert_eq!(report.score, 100);
        assert_eq!(sandbox.calls(), 8);
        assert_eq!(scores.best_score(USER).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn wrong_answers_do_not_lower_the_stored_best() {
        let sandbox = ScriptedSandbox::new(|_| Ok(outcome("0\n", "", false)));
        let scores = Arc::new(MemoryStore::with_users(vec![(USER, 40)]));
        let (out, report) =
            run_to_end(deps(sandbox, scores.clone()), Settings::default()).await;
        assert!(matches!(out, GradeOutcome::Success));
        let report = report.unwrap();
        assert_eq!(report.verdict, Verdict::Completed);
        assert_eq!(report.passed, 0);
        assert_eq!(report.score, 0);
        assert_eq!(scores.best_score(USER).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn score_is_the_floor_of_the_pass_ratio() {
        let last = suite::cases().last().unwrap().stdin_line();
        let sandbox = ScriptedSandbox::new(move |job: &ExecJob| {
            if job.stdin == last {
                Ok(outcome("wrong\n", "", false))
            } else {
                correct_answer(job)
            }
        });
        let scores = Arc::new(MemoryStore::with_users(vec![(USER, 0)]));
        let (_, report) = run_to_end(deps(sandbox, scores.clone()), Settings::default()).await;
        let report = report.unwrap();
        assert_eq!(report.passed, 7);
        // 7/8 is 87.5, floored
        assert_eq!(report.score, 87);
        assert_eq!(scores.best_score(USER).await.unwrap(), 87);
    }

    #[tokio::test]
    async fn timeout_aborts_and_resets_the_best_score() {
        let third = suite::cases()[2].stdin_line();
        let sandbox = ScriptedSandbox::new(move |job: &ExecJob| {
            if job.stdin == third {
                Ok(outcome("", "", true))
            } else {
                correct_answer(job)
            }
        });
        let scores = Arc::new(MemoryStore::with_users(vec![(USER, 40)]));
        let (out, report) =
            run_to_end(deps(sandbox.clone(), scores.clone()), Settings::default()).await;
        assert!(matches!(out, GradeOutcome::Success));
        let report = report.unwrap();
        assert_eq!(report.verdict, Verdict::TimedOut);
        assert_eq!(report.cases.len(), 3);
        assert_eq!(report.score, 0);
        // remaining cases were not run
        assert_eq!(sandbox.calls(), 3);
        assert_eq!(scores.best_score(USER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stderr_aborts_on_the_first_case() {
        let sandbox =
            ScriptedSandbox::new(|_| Ok(outcome("", "Traceback (most recent call last)\n", false)));
        let scores = Arc::new(MemoryStore::with_users(vec![(USER, 40)]));
        let (_, report) = run_to_end(deps(sandbox.clone(), scores.clone()), Settings::default()).await;
        let report = report.unwrap();
        assert_eq!(report.verdict, Verdict::RuntimeError);
        assert_eq!(report.cases.len(), 1);
        assert_eq!(sandbox.calls(), 1);
        assert_eq!(scores.best_score(USER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn abort_can_leave_the_stored_best_untouched() {
        let sandbox = ScriptedSandbox::new(|_| Ok(outcome("", "", true)));
        let scores = Arc::new(MemoryStore::with_users(vec![(USER, 40)]));
        let settings = Settings {
            reset_score_on_abort: false,
            ..Settings::default()
        };
        let (out, _) = run_to_end(deps(sandbox, scores.clone()), settings).await;
        assert!(matches!(out, GradeOutcome::Success));
        assert_eq!(scores.best_score(USER).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn run_all_cases_policy_scores_past_a_fault() {
        let first = suite::cases()[0].stdin_line();
        let sandbox = ScriptedSandbox::new(move |job: &ExecJob| {
            if job.stdin == first {
                Ok(outcome("", "", true))
            } else {
                correct_answer(job)
            }
        });
        let scores = Arc::new(MemoryStore::with_users(vec![(USER, 40)]));
        let settings = Settings {
            fault_policy: FaultPolicy::RunAllCases,
            ..Settings::default()
        };
        let (out, report) = run_to_end(deps(sandbox.clone(), scores.clone()), settings).await;
        assert!(matches!(out, GradeOutcome::Success));
        let report = report.unwrap();
        assert_eq!(report.verdict, Verdict::Completed);
        assert_eq!(report.cases.len(), 8);
        assert_eq!(report.passed, 7);
        assert_eq!(report.score, 87);
        assert_eq!(sandbox.calls(), 8);
        assert_eq!(scores.best_score(USER).await.unwrap(), 87);
    }

    #[tokio::test]
    async fn unknown_user_is_a_fault_and_nothing_runs() {
        let sandbox = ScriptedSandbox::new(correct_answer);
        let scores = Arc::new(MemoryStore::new());
        let (out, report) = run_to_end(deps(sandbox.clone(), scores), Settings::default()).await;
        assert!(matches!(out, GradeOutcome::Fault { .. }));
        assert!(report.is_none());
        assert_eq!(sandbox.calls(), 0);
    }

    /// Store whose updates always fail, to check that the report is
    /// still delivered when persistence is down.
    struct BrokenUpdates {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ScoreStore for BrokenUpdates {
        async fn best_score(&self, user_id: &str) -> Result<u32, StoreError> {
            self.inner.best_score(user_id).await
        }

        async fn set_best_if_greater(&self, _: &str, _: u32) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable(std::io::Error::new(
                std::io::ErrorKind::Other,
                "store is down",
            )))
        }

        async fn force_best(&self, _: &str, _: u32) -> Result<(), StoreError> {
            Err(StoreError::Unavailable(std::io::Error::new(
                std::io::ErrorKind::Other,
                "store is down",
            )))
        }
    }

    #[tokio::test]
    async fn persistence_failure_still_delivers_the_report() {
        let sandbox = ScriptedSandbox::new(correct_answer);
        let scores = Arc::new(BrokenUpdates {
            inner: MemoryStore::with_users(vec![(USER, 40)]),
        });
        let (out, report) = run_to_end(deps(sandbox, scores), Settings::default()).await;
        let report = report.unwrap();
        assert_eq!(report.score, 100);
        match out {
            GradeOutcome::Fault { error } => {
                assert!(format!("{:#}", error).contains("failed to update best score"));
            }
            GradeOutcome::Success => panic!("expected a fault"),
        }
    }
}
