mod api;
mod rest;

use anyhow::Context;
use clap::Clap;
use score_store::ScoreStore;
use std::{path::PathBuf, sync::Arc, time::Duration};

#[derive(Clap)]
struct Args {
    /// Port that grader should listen
    #[clap(long, default_value = "1789")]
    port: u16,
    /// Interpreter used to run submitted programs
    #[clap(long, default_value = "python3")]
    interpreter: PathBuf,
    /// Directory for per-run scratch artifacts
    #[clap(long, default_value = "/tmp/grader-scratch")]
    scratch_dir: PathBuf,
    /// JSON file holding per-user best scores; in-memory when omitted
    #[clap(long)]
    scores: Option<PathBuf>,
    /// Only accept user ids that are emails under this domain
    #[clap(long)]
    allowed_email_domain: Option<String>,
    /// Wall-clock limit per test case, in milliseconds
    #[clap(long, default_value = "2000")]
    case_timeout_ms: u64,
    /// Keep running the remaining cases after a timeout or runtime error
    #[clap(long)]
    run_all_cases: bool,
    /// Leave the stored best score untouched when a run aborts
    #[clap(long)]
    keep_score_on_abort: bool,
    /// Directory grading reports are dumped into, one file per job
    #[clap(long)]
    report_dumps: Option<PathBuf>,
}

async fn create_deps(args: &Args) -> anyhow::Result<engine::Deps> {
    tokio::fs::create_dir_all(&args.scratch_dir)
        .await
        .context("failed to create scratch directory")?;
    let sandbox = executor::ProcessSandbox::new(executor::ProcessSandboxConfig {
        interpreter: args.interpreter.clone(),
        scratch_dir: args.scratch_dir.clone(),
    });
    let scores: Arc<dyn ScoreStore> = match &args.scores {
        Some(path) => Arc::new(
            score_store::FsStore::open(path)
                .await
                .context("failed to open score store")?,
        ),
        None => Arc::new(score_store::MemoryStore::new()),
    };
    Ok(engine::Deps {
        sandbox: Arc::new(sandbox),
        scores,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args: Args = Clap::parse();
    let deps = create_deps(&args)
        .await
        .context("failed to initialize dependencies")?;
    let settings = engine::Settings {
        case_timeout: Duration::from_millis(args.case_timeout_ms),
        fault_policy: if args.run_all_cases {
            engine::FaultPolicy::RunAllCases
        } else {
            engine::FaultPolicy::AbortOnFault
        },
        reset_score_on_abort: !args.keep_score_on_abort,
        report_dump_dir: args.report_dumps.clone(),
    };
    tracing::info!("Running REST API");
    let cfg = rest::RestConfig {
        port: args.port,
        allowed_email_domain: args.allowed_email_domain.clone(),
    };
    rest::serve(cfg, deps, settings).await?;
    Ok(())
}
