//! Structured errors for the settings API.
//!
//! Core and GitHub errors map onto HTTP statuses here; the body always
//! carries a stable `code` next to the human-readable message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use skillmeat_client::GitHubError;
use skillmeat_core::Error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("INVALID_INPUT: {0}")]
    BadRequest(String),

    /// GitHub rejected the token.
    #[error("UNAUTHORIZED: {0}")]
    Unauthorized(String),

    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    #[error("CONFLICT: {0}")]
    Conflict(String),

    #[error("RATE_LIMITED: {0}")]
    RateLimited(String),

    /// GitHub failed in a way that is not the caller's fault.
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),

    #[error("INTERNAL_ERROR: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }
        (status, Json(ErrorBody { code, error: message.to_string() })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<GitHubError> for ApiError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::AuthError => ApiError::Unauthorized(err.to_string()),
            GitHubError::RateLimited => ApiError::RateLimited(err.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}
