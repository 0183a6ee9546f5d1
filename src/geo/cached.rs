use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use super::{GeoError, RegionResolver};

/// Read-through cache of IP → region answers
///
/// Failures are never cached; the next request retries the lookup.
pub struct CachedRegionResolver {
    inner: Arc<dyn RegionResolver>,
    cache: Cache<String, String>,
}

impl CachedRegionResolver {
    pub fn new(inner: Arc<dyn RegionResolver>, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { inner, cache }
    }
}

#[async_trait]
impl RegionResolver for CachedRegionResolver {
    async fn resolve_region(&self, ip: &str) -> Result<String, GeoError> {
        if let Some(region) = self.cache.get(ip).await {
            return Ok(region);
        }

        let region = self.inner.resolve_region(ip).await?;
        self.cache.insert(ip.to_string(), region.clone()).await;
        Ok(region)
    }
}
