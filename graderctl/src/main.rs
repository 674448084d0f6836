use std::{collections::HashMap, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Clap;
use grader_apis::{
    live::LiveStatus,
    report::GradingReport,
    rest::{ByteString, SubmitRequest, Submission},
};

/// Command-line grader client
#[derive(Clap)]
struct Args {
    /// Email the submission is graded for
    #[clap(long, short = 'u')]
    user: String,
    /// Path to the submission source file
    #[clap(long, short = 's')]
    source: PathBuf,
    /// Grader API endpoint, e.g. http://localhost:1789
    #[clap(long, short = 'g')]
    grader_api: String,
    /// Where the grading report is saved
    #[clap(long, default_value = "report.json")]
    report_out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Clap::parse();
    let annotations = {
        let mut a = HashMap::new();
        a.insert("grader/created-by".to_string(), "graderctl".to_string());
        a
    };
    let source = tokio::fs::read(&args.source)
        .await
        .context("failed to read submission source")?;
    let req = SubmitRequest {
        annotations,
        user_id: args.user.clone(),
        run_source: ByteString(source),
    };
    let client = reqwest::Client::new();
    let created: Submission = client
        .post(format!("{}/submissions", args.grader_api))
        .json(&req)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("Submitted, id: {}", created.id.to_hyphenated());
    let mut printer = ProgressPrinter::new();
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let job: Submission = client
            .get(format!(
                "{}/submissions/{}",
                args.grader_api,
                created.id.to_hyphenated()
            ))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        printer.add(&job.live);
        if job.completed {
            println!("Completed");
            if job.report_ready {
                let report: GradingReport = client
                    .get(format!(
                        "{}/submissions/{}/report",
                        args.grader_api,
                        job.id.to_hyphenated()
                    ))
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                print_report(&report);
                let data = serde_json::to_vec_pretty(&report)?;
                tokio::fs::write(&args.report_out, data)
                    .await
                    .context("failed to write report")?;
                println!("Report saved to {}", args.report_out.display());
            }
            if let Some(msg) = job.error {
                anyhow::bail!("grading was not successful: {}", msg);
            }
            break;
        }
    }
    Ok(())
}

fn print_report(report: &GradingReport) {
    for case in &report.cases {
        let status = if case.passed {
            "passed"
        } else if case.timed_out {
            "timed out"
        } else {
            "failed"
        };
        println!("case {}: {} ({} ms)", case.case, status, case.time_millis);
    }
    println!("{}", report.summary());
    println!("Score: {}", report.score);
}

struct ProgressPrinter {
    last_case: Option<u32>,
    last_score: Option<u32>,
}

impl ProgressPrinter {
    fn new() -> Self {
        ProgressPrinter {
            last_case: None,
            last_score: None,
        }
    }

    fn add(&mut self, live_status: &LiveStatus) {
        if let Some(c) = live_status.case {
            if Some(c) != self.last_case {
                self.last_case = Some(c);
                println!("Running on case {}", c);
            }
        }
        if let Some(s) = live_status.score {
            if Some(s) != self.last_score {
                self.last_score = Some(s);
                println!("Current score: {}", s);
            }
        }
    }
}
