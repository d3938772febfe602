//! GitHub API client error types.

use std::sync::Arc;

/// Errors from the GitHub REST client.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// Token rejected (401) or lacking access (403).
    #[error("authentication failed: token rejected by GitHub")]
    AuthError,

    /// Rate limited by GitHub.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// Any other non-success status.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { GitHubError::Timeout } else { GitHubError::Network(Arc::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert!(GitHubError::AuthError.to_string().contains("authentication"));
        assert_eq!(GitHubError::HttpError { status: 502 }.to_string(), "HTTP error: 502");
    }
}
