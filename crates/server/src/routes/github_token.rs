//! GitHub token settings endpoints.
//!
//! The token is format-checked locally before any request reaches GitHub,
//! and only stored once GitHub accepts it.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use skillmeat_client::GitHubError;
use skillmeat_core::settings::{mask_token, validate_token_format};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenStatus {
    pub is_set: bool,
    pub masked_token: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetTokenResponse {
    pub success: bool,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    pub username: Option<String>,
    pub scopes: Vec<String>,
    pub rate_limit_remaining: Option<u64>,
}

/// `GET /settings/github-token/status`
///
/// The username is looked up live; a stored token GitHub no longer accepts
/// reports `is_set: true` with no username.
pub async fn status(State(state): State<AppState>) -> Result<Json<TokenStatus>, ApiError> {
    let Some(token) = state.settings.github_token()? else {
        return Ok(Json(TokenStatus { is_set: false, masked_token: None, username: None }));
    };

    let username = match state.verifier.verify(&token).await {
        Ok(user) => Some(user.login),
        Err(e) => {
            tracing::warn!(error = %e, "stored github token did not verify");
            None
        }
    };
    Ok(Json(TokenStatus { is_set: true, masked_token: Some(mask_token(&token)), username }))
}

/// `POST /settings/github-token`
pub async fn set(
    State(state): State<AppState>, Json(req): Json<TokenRequest>,
) -> Result<Json<SetTokenResponse>, ApiError> {
    let token = req.token.trim();
    validate_token_format(token)?;
    let user = state.verifier.verify(token).await?;
    state.settings.set_github_token(token)?;
    tracing::info!(username = %user.login, "github token saved");
    Ok(Json(SetTokenResponse { success: true, username: user.login }))
}

/// `POST /settings/github-token/validate`
///
/// Never stores anything. A token GitHub rejects is reported as
/// `valid: false` rather than as an error.
pub async fn validate(
    State(state): State<AppState>, Json(req): Json<TokenRequest>,
) -> Result<Json<ValidateTokenResponse>, ApiError> {
    let token = req.token.trim();
    validate_token_format(token)?;
    match state.verifier.verify(token).await {
        Ok(user) => Ok(Json(ValidateTokenResponse {
            valid: true,
            username: Some(user.login),
            scopes: user.scopes,
            rate_limit_remaining: user.rate_limit_remaining,
        })),
        Err(GitHubError::AuthError) => Ok(Json(ValidateTokenResponse {
            valid: false,
            username: None,
            scopes: Vec::new(),
            rate_limit_remaining: None,
        })),
        Err(e) => Err(e.into()),
    }
}

/// `DELETE /settings/github-token`
pub async fn clear(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let removed = state.settings.clear_github_token()?;
    tracing::debug!(removed, "github token cleared");
    Ok(StatusCode::NO_CONTENT)
}
