pub mod envelope;
pub mod error;
pub mod handlers;
pub mod routes;

pub use envelope::{ApiResponse, ErrorBody};
pub use error::ApiError;
pub use routes::create_api_router;

use axum::Router;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{TokenCodec, TokenGateway};
use crate::config::Config;
use crate::geo::RegionResolver;
use crate::pop::{LeaderboardService, PopService};
use crate::storage::Storage;

/// Wire the token codec, services and gateway into the HTTP router
pub fn build_app(
    config: &Config,
    codec: Arc<TokenCodec>,
    storage: Arc<dyn Storage>,
    regions: Arc<dyn RegionResolver>,
) -> Router {
    let storage_timeout = Duration::from_millis(config.database.timeout_ms);

    let pops = Arc::new(PopService::new(
        Arc::clone(&storage),
        Arc::clone(&codec),
        config.pop.max_per_request,
        storage_timeout,
    ));
    let leaderboard = Arc::new(LeaderboardService::new(storage, storage_timeout));
    let gateway = Arc::new(TokenGateway::new(
        codec,
        regions,
        Duration::from_millis(config.geoip.lookup_timeout_ms),
    ));

    create_api_router(pops, leaderboard, gateway)
}
