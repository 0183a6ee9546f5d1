use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{ApiError, ApiResponse};
use crate::auth::Identity;
use crate::models::{LeaderboardResponse, PopResponse};
use crate::pop::{LeaderboardService, PopService};

pub struct AppState {
    pub pops: Arc<PopService>,
    pub leaderboard: Arc<LeaderboardService>,
}

#[derive(Debug, Deserialize)]
pub struct PopParams {
    pub count: Option<String>,
}

impl PopParams {
    fn requested_count(&self) -> Result<i64, ApiError> {
        let raw = self
            .count
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| ApiError::field("count", "must be provided"))?;

        raw.parse::<i64>()
            .map_err(|_| ApiError::field("count", "must be an integer"))
    }
}

/// Apply pops for the authenticated visitor
pub async fn add_pops(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    params: Result<Query<PopParams>, QueryRejection>,
) -> Result<ApiResponse<PopResponse>, ApiError> {
    let Query(params) =
        params.map_err(|rejection| ApiError::field("count", rejection.body_text()))?;
    let requested = params.requested_count()?;

    info!("Add pops with count {}", requested);
    let response = state
        .pops
        .apply_pop(&identity.client_ip, &identity.region_code, requested)
        .await?;

    Ok(ApiResponse::success(response))
}

/// Region ranking; no token required
pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
) -> Result<ApiResponse<LeaderboardResponse>, ApiError> {
    info!("Get leaderboard");
    let board = state.leaderboard.get_leaderboard().await?;
    Ok(ApiResponse::success(board))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}
