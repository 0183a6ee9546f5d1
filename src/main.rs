use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use popcat::api;
use popcat::auth::TokenCodec;
use popcat::config::Config;
use popcat::geo;
use popcat::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    info!("Initializing database...");
    let storage = storage::connect(&config.database).await?;
    info!("Database initialized successfully");

    // Region lookup
    let regions = geo::region_resolver(&config.geoip)?;

    let codec = Arc::new(TokenCodec::new(&config.token)?);
    info!(
        "🔐 Issuing tokens as {} (ttl {}s, clock skew {}s, region pinning {})",
        codec.issuer(),
        config.token.ttl_secs,
        config.token.clock_skew_secs,
        if config.token.pin_region { "on" } else { "off" }
    );
    info!(
        "🐱 Accepting at most {} pops per request",
        config.pop.max_per_request
    );

    let router = api::build_app(&config, codec, storage, regions);

    // Start API server
    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);
    info!("   - Pop endpoint at http://{}/api/v1/pop", api_addr);
    info!("   - Leaderboard at http://{}/api/v1/leaderboard", api_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
