//! Icon pack settings endpoints.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use skillmeat_core::settings::{IconPack, IconPackUpdate};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdatePacksRequest {
    pub packs: Vec<IconPackUpdate>,
}

/// `GET /settings/icon-packs`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<IconPack>>, ApiError> {
    Ok(Json(state.icon_packs.list()?))
}

/// `PATCH /settings/icon-packs`
pub async fn update(
    State(state): State<AppState>, Json(req): Json<UpdatePacksRequest>,
) -> Result<Json<Vec<IconPack>>, ApiError> {
    if req.packs.is_empty() {
        return Err(ApiError::BadRequest("packs must not be empty".into()));
    }
    Ok(Json(state.icon_packs.set_enabled(&req.packs)?))
}
