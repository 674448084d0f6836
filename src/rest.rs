//! Grader REST api

use crate::api::{self, ApiError, ErrorKind};
use anyhow::Context;
use futures::future::TryFutureExt;
use grader_apis::{live::LiveStatus, report::GradingReport, rest};
use std::{collections::HashMap, convert::Infallible, sync::Arc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use warp::Filter;

pub struct RestConfig {
    pub port: u16,
    pub allowed_email_domain: Option<String>,
}

/// Contains information about a single submission
struct SubmissionJob {
    id: Uuid,
    live_case: Option<u32>,
    live_score: Option<u32>,
    report: Option<GradingReport>,
    annotations: HashMap<String, String>,
    outcome: Option<engine::GradeOutcome>,
}

impl SubmissionJob {
    fn as_rest(&self) -> rest::Submission {
        let error = match &self.outcome {
            Some(engine::GradeOutcome::Fault { error }) => Some(format!("{:#}", error)),
            _ => None,
        };
        rest::Submission {
            id: self.id,
            annotations: self.annotations.clone(),
            completed: self.outcome.is_some(),
            report_ready: self.report.is_some(),
            live: LiveStatus {
                case: self.live_case,
                score: self.live_score,
            },
            error,
        }
    }
}

struct State {
    submissions: RwLock<HashMap<Uuid, Arc<Mutex<SubmissionJob>>>>,
    deps: engine::Deps,
    settings: engine::Settings,
    allowed_email_domain: Option<String>,
}

/// The engine trusts the user id, so the shape check happens here, driven
/// by explicit configuration instead of ambient process state.
fn user_id_is_allowed(user_id: &str, allowed_domain: Option<&str>) -> bool {
    let mut parts = user_id.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = match parts.next() {
        Some(d) => d,
        None => return false,
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match allowed_domain {
        Some(allowed) => domain.eq_ignore_ascii_case(allowed),
        None => true,
    }
}

async fn start_job(state: Arc<State>, req: rest::SubmitRequest) -> anyhow::Result<rest::Submission> {
    if !user_id_is_allowed(&req.user_id, state.allowed_email_domain.as_deref()) {
        return Err(anyhow::Error::new(ApiError::new(
            ErrorKind::BadRequest,
            "InvalidUserId",
        )));
    }
    let engine_req = engine::Request {
        user_id: req.user_id,
        run_source: req.run_source.0,
    };
    let job_id = Uuid::new_v4();
    let mut settings = state.settings.clone();
    {
        let mut job_id_s = Uuid::encode_buffer();
        let job_id_s = job_id.to_hyphenated().encode_lower(&mut job_id_s);
        if let Some(p) = &mut settings.report_dump_dir {
            p.push(&*job_id_s);
        }
    }
    let mut progress = engine::grade(
        engine_req,
        state.deps.clone(),
        settings,
        CancellationToken::new(),
    );
    let job = SubmissionJob {
        id: job_id,
        live_case: None,
        live_score: None,
        report: None,
        annotations: req.annotations,
        outcome: None,
    };

    let resp = job.as_rest();

    let job = Arc::new(Mutex::new(job));
    let prev = state.submissions.write().await.insert(job_id, job.clone());
    assert!(prev.is_none());
    tokio::task::spawn(async move {
        while let Some(ev) = progress.event().await {
            let mut job = job.lock().await;
            match ev {
                engine::Event::LiveCase(case) => {
                    job.live_case = Some(case);
                }
                engine::Event::LiveScore(score) => {
                    job.live_score = Some(score);
                }
                engine::Event::ReportReady(report) => {
                    job.report = Some(report);
                }
            }
        }
        tracing::info!("event stream finished, retrieving outcome");
        let outcome = progress.wait().await;

        let mut job = job.lock().await;
        job.outcome = Some(outcome);
    });

    Ok(resp)
}

async fn find_job(state: &State, id: Uuid) -> anyhow::Result<Arc<Mutex<SubmissionJob>>> {
    let jobs = state.submissions.read().await;
    match jobs.get(&id) {
        Some(job) => Ok(job.clone()),
        None => Err(anyhow::Error::new(ApiError::new(
            ErrorKind::NotFound,
            "SubmissionNotFound",
        ))),
    }
}

async fn get_job(state: Arc<State>, id: Uuid) -> anyhow::Result<rest::Submission> {
    let job = find_job(&state, id).await?;
    let job = job.lock().await;
    Ok(job.as_rest())
}

async fn get_job_report(state: Arc<State>, id: Uuid) -> anyhow::Result<GradingReport> {
    let job = find_job(&state, id).await?;
    let job = job.lock().await;
    match &job.report {
        Some(report) => Ok(report.clone()),
        None => Err(anyhow::Error::new(ApiError::new(
            ErrorKind::NotFound,
            "ReportNotReady",
        ))),
    }
}

/// Serves api
#[tracing::instrument(skip(cfg, deps, settings))]
pub async fn serve(
    cfg: RestConfig,
    deps: engine::Deps,
    settings: engine::Settings,
) -> anyhow::Result<()> {
    let state = Arc::new(State {
        submissions: RwLock::new(HashMap::new()),
        deps,
        settings,
        allowed_email_domain: cfg.allowed_email_domain,
    });
    let state2 = state.clone();
    let route_create_job = warp::post()
        .and(warp::path("submissions"))
        .and(warp::path::end())
        .and(warp::filters::body::json())
        .and_then(move |req| {
            start_job(state2.clone(), req)
                .map_err(|err| warp::reject::custom(api::AnyhowRejection(err)))
        })
        .map(|resp| warp::reply::json(&resp))
        .recover(api::recover)
        .boxed();

    let state2 = state.clone();

    let route_get_job = warp::get()
        .and(warp::path("submissions"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and_then(move |id| {
            get_job(state2.clone(), id)
                .map_err(|err| warp::reject::custom(api::AnyhowRejection(err)))
        })
        .map(|resp| warp::reply::json(&resp))
        .recover(api::recover)
        .boxed();

    let route_get_report = warp::get()
        .and(warp::path("submissions"))
        .and(warp::path::param::<Uuid>())
        .and(warp::path("report"))
        .and(warp::path::end())
        .and_then(move |id| {
            get_job_report(state.clone(), id)
                .map_err(|err| warp::reject::custom(api::AnyhowRejection(err)))
        })
        .map(|resp| warp::reply::json(&resp))
        .recover(api::recover)
        .boxed();

    let routes = route_create_job.or(route_get_job).or(route_get_report);

    let server = warp::serve(routes.with(warp::filters::trace::request()));

    let srv = server
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], cfg.port), futures::future::pending())
        .context("failed to bind")?
        .1;
    srv.await;
    Ok(())
}
