//! Client address and region resolution
//!
//! A region code is required to mint a token, so every issuance goes
//! through a [`RegionResolver`]. Production uses the MaxMind-backed
//! [`GeoIpService`] behind a [`CachedRegionResolver`]; tests and
//! database-less development use [`StaticRegionResolver`].

pub mod cached;
pub mod geoip;
pub mod ip_extractor;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::GeoIpConfig;

pub use cached::CachedRegionResolver;
pub use geoip::GeoIpService;
pub use ip_extractor::resolve_client_ip;

#[derive(Debug, Clone, Error)]
pub enum GeoError {
    #[error("Failed to initialize GeoIP database: {path}: {reason}")]
    DatabaseInit { path: String, reason: String },
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),
    #[error("Failed to lookup IP address: {ip}: {reason}")]
    LookupFailed { ip: String, reason: String },
    #[error("Failed to lookup IP address: {ip}: timed out")]
    LookupTimeout { ip: String },
}

/// Maps a textual client address to a region code
#[async_trait]
pub trait RegionResolver: Send + Sync {
    async fn resolve_region(&self, ip: &str) -> Result<String, GeoError>;
}

/// Run a lookup with an upper bound on how long it may stall
pub async fn resolve_region_within(
    resolver: &dyn RegionResolver,
    ip: &str,
    timeout: Duration,
) -> Result<String, GeoError> {
    match tokio::time::timeout(timeout, resolver.resolve_region(ip)).await {
        Ok(result) => result,
        Err(_) => Err(GeoError::LookupTimeout { ip: ip.to_string() }),
    }
}

/// Build the resolver chain described by `config`
///
/// Without a database path every address maps to the default region.
/// A configured path that cannot be opened is an error.
pub fn region_resolver(config: &GeoIpConfig) -> Result<Arc<dyn RegionResolver>, GeoError> {
    let inner: Arc<dyn RegionResolver> = match config.db_path.as_deref() {
        Some(path) => {
            info!("Using GeoIP database: {}", path);
            Arc::new(GeoIpService::open(path, config.default_region.as_str())?)
        }
        None => {
            warn!(
                "GEOIP_DB_PATH not set; every client resolves to region {}",
                config.default_region
            );
            Arc::new(StaticRegionResolver::new(config.default_region.as_str()))
        }
    };

    Ok(Arc::new(CachedRegionResolver::new(
        inner,
        config.cache_max_entries,
        Duration::from_secs(config.cache_ttl_secs),
    )))
}

/// Fixed IP → region table with a fallback region
#[derive(Debug, Clone)]
pub struct StaticRegionResolver {
    regions: HashMap<String, String>,
    default_region: String,
}

impl StaticRegionResolver {
    pub fn new(default_region: impl Into<String>) -> Self {
        Self {
            regions: HashMap::new(),
            default_region: default_region.into(),
        }
    }

    pub fn with_region(mut self, ip: impl Into<String>, region: impl Into<String>) -> Self {
        self.regions.insert(ip.into(), region.into());
        self
    }
}

#[async_trait]
impl RegionResolver for StaticRegionResolver {
    async fn resolve_region(&self, ip: &str) -> Result<String, GeoError> {
        if ip.parse::<std::net::IpAddr>().is_err() {
            return Err(GeoError::InvalidIpAddress(ip.to_string()));
        }

        Ok(self
            .regions
            .get(ip)
            .cloned()
            .unwrap_or_else(|| self.default_region.clone()))
    }
}
