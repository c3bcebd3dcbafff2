//! HTTP mapping for core errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use repobox_core::Error;
use serde::Serialize;

/// Uniform error body returned by every route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable error kind.
    pub error: &'static str,

    /// Human-readable description.
    pub detail: String,

    /// When the error was produced.
    pub timestamp: DateTime<Utc>,
}

/// Wrapper giving core errors an HTTP representation.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

/// HTTP status for each error kind.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) | Error::Provision(_) | Error::PathTraversal(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidState { .. } | Error::Conflict(_) => StatusCode::CONFLICT,
        Error::SizeExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::Infrastructure(_) => StatusCode::BAD_GATEWAY,
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let body = ErrorBody {
            error: self.0.kind(),
            detail: self.0.to_string(),
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}
