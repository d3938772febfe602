//! GitHub REST API client.
//!
//! Only token verification is needed: `GET /user` with a bearer token tells
//! us whether the token works, whose it is, which scopes it carries and how
//! much of the rate limit is left.

pub mod error;

pub use error::GitHubError;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};

/// Default base URL for the GitHub REST API.
const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_USER_AGENT: &str = "skillmeat/0.1";

/// GitHub client configuration.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// GitHub rejects requests without a User-Agent.
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Identity behind a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitHubUser {
    pub login: String,
    /// From `x-oauth-scopes`; empty for fine-grained tokens.
    pub scopes: Vec<String>,
    pub rate_limit_remaining: Option<u64>,
}

#[derive(Deserialize)]
struct UserBody {
    login: String,
}

/// Seam for checking a token against GitHub.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<GitHubUser, GitHubError>;
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Fetch the authenticated user for `token`.
    pub async fn get_user(&self, token: &str) -> Result<GitHubUser, GitHubError> {
        let url = format!("{}/user", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header(header::USER_AGENT, &self.config.user_agent)
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "GitHub /user response");

        if status == 401 || status == 403 {
            return Err(GitHubError::AuthError);
        }
        if status == 429 {
            return Err(GitHubError::RateLimited);
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(GitHubError::HttpError { status: status.as_u16() });
        }

        let headers = response.headers();
        let scopes = headers
            .get("x-oauth-scopes")
            .and_then(|v| v.to_str().ok())
            .map(parse_scopes)
            .unwrap_or_default();
        let rate_limit_remaining = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());

        let body: UserBody = response.json().await.map_err(|e| GitHubError::Parse(e.to_string()))?;
        Ok(GitHubUser { login: body.login, scopes, rate_limit_remaining })
    }
}

#[async_trait]
impl TokenVerifier for GitHubClient {
    async fn verify(&self, token: &str) -> Result<GitHubUser, GitHubError> {
        self.get_user(token).await
    }
}

fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and return the base URL.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}")
    }

    fn client(base_url: String) -> GitHubClient {
        GitHubClient::new(GitHubConfig { base_url, ..Default::default() }).unwrap()
    }

    #[test]
    fn test_parse_scopes() {
        assert_eq!(parse_scopes("repo, read:org"), vec!["repo", "read:org"]);
        assert!(parse_scopes("").is_empty());
    }

    #[tokio::test]
    async fn test_get_user_reads_headers() {
        let body = r#"{"login":"octocat","id":1}"#;
        let response: &'static str = Box::leak(
            format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\nx-oauth-scopes: repo, gist\r\nx-ratelimit-remaining: 4999\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            )
            .into_boxed_str(),
        );
        let base = serve_once(response).await;

        let user = client(base).get_user("ghp_test").await.unwrap();
        assert_eq!(user.login, "octocat");
        assert_eq!(user.scopes, vec!["repo", "gist"]);
        assert_eq!(user.rate_limit_remaining, Some(4999));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let base = serve_once("HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        assert!(matches!(client(base).get_user("ghp_bad").await, Err(GitHubError::AuthError)));

        let base = serve_once("HTTP/1.1 403 Forbidden\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        assert!(matches!(client(base).verify("ghp_bad").await, Err(GitHubError::AuthError)));

        let base = serve_once("HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        assert!(matches!(client(base).get_user("ghp_x").await, Err(GitHubError::RateLimited)));

        let base = serve_once("HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        assert!(matches!(client(base).get_user("ghp_x").await, Err(GitHubError::HttpError { status: 502 })));
    }
}
