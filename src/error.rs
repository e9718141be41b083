// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponseBody {
    pub error: String,
}

/// Failures reported by a DNS server API.
#[derive(Debug, Error)]
pub enum DnsApiError {
    /// Server unreachable, timed out or refused our credentials.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("zone {0} not found on server")]
    ZoneMissing(String),

    /// The server processed the request and refused it.
    #[error("rejected with {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl DnsApiError {
    /// Transport and missing-zone failures abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DnsApiError::Transport(_) | DnsApiError::ZoneMissing(_))
    }
}

impl From<reqwest::Error> for DnsApiError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => DnsApiError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => DnsApiError::Transport(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("zone {0} not found")]
    ZoneNotFound(i64),

    #[error("job {0} not found")]
    JobNotFound(i64),

    #[error("job {0} already finished")]
    JobFinished(i64),

    #[error("job {job}: invalid transition {from} -> {to}")]
    InvalidTransition {
        job: i64,
        from: crate::jobs::JobStatus,
        to: crate::jobs::JobStatus,
    },

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl SyncError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        SyncError::Configuration(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn internal<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Configuration(msg) => AppError::BadRequest(msg),
            SyncError::ZoneNotFound(_) | SyncError::JobNotFound(_) => AppError::NotFound,
            SyncError::JobFinished(id) => AppError::Conflict(format!("job {id} already finished")),
            other => AppError::internal(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found".into()),
            AppError::Internal(err) => {
                tracing::error!("internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".into(),
                )
            }
        };

        let body = Json(ErrorResponseBody { error: msg });
        (status, body).into_response()
    }
}
