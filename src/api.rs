//! Error surface of the REST layer: typed api errors and the
//! rejection-to-JSON recovery used by every route.

use std::{convert::Infallible, fmt};
use warp::http::StatusCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
}

impl ErrorKind {
    fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

/// An error with a machine-readable code, rendered with the status code
/// matching its kind.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub code: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, code: &str) -> Self {
        ApiError {
            kind,
            code: code.to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "api error: {}", self.code)
    }
}

impl std::error::Error for ApiError {}

/// Carries an `anyhow::Error` through warp's rejection machinery.
#[derive(Debug)]
pub struct AnyhowRejection(pub anyhow::Error);

impl warp::reject::Reject for AnyhowRejection {}

#[derive(serde::Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

pub async fn recover(rej: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
    let (status, body) = if let Some(AnyhowRejection(err)) = rej.find::<AnyhowRejection>() {
        match err.downcast_ref::<ApiError>() {
            Some(api_err) => (
                api_err.kind.status(),
                ErrorBody {
                    code: api_err.code.clone(),
                    message: api_err.to_string(),
                },
            ),
            None => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "InternalError".to_string(),
                    message: format!("{:#}", err),
                },
            ),
        }
    } else if rej.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            ErrorBody {
                code: "NotFound".to_string(),
                message: "resource does not exist".to_string(),
            },
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                code: "BadRequest".to_string(),
                message: format!("{:?}", rej),
            },
        )
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
