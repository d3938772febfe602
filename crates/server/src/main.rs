//! SkillMeat settings API entry point.
//!
//! Serves the settings routes over HTTP. Logs are JSON on stderr.

use std::sync::Arc;

use anyhow::Result;
use skillmeat_client::{GitHubClient, GitHubConfig};
use skillmeat_core::AppConfig;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod error;
mod routes;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;

    let github = GitHubClient::new(GitHubConfig {
        base_url: config.github_api_url.clone(),
        timeout: config.timeout(),
        user_agent: config.user_agent.clone(),
    })?;
    let state = state::AppState::new(&config, Arc::new(github));

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = routes::router(state).layer(cors).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind((config.server_host.as_str(), config.server_port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "settings API listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("settings API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
