use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{require_token, TokenGateway};
use crate::pop::{LeaderboardService, PopService};

use super::handlers::{add_pops, get_leaderboard, health_check, AppState};

pub fn create_api_router(
    pops: Arc<PopService>,
    leaderboard: Arc<LeaderboardService>,
    gateway: Arc<TokenGateway>,
) -> Router {
    let state = Arc::new(AppState { pops, leaderboard });

    // Only these routes go through the token gateway.
    let protected_routes = Router::new()
        .route("/api/v1/pop", post(add_pops))
        .route_layer(middleware::from_fn_with_state(gateway, require_token))
        .with_state(Arc::clone(&state));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/leaderboard", get(get_leaderboard))
        .with_state(state)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
