//! HTTP routes of the settings API.

pub mod github_token;
pub mod icon_packs;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use serde_json::{Value, json};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/settings/github-token/status", get(github_token::status))
        .route("/settings/github-token", post(github_token::set).delete(github_token::clear))
        .route("/settings/github-token/validate", post(github_token::validate))
        .route("/settings/icon-packs", get(icon_packs::list).patch(icon_packs::update))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
