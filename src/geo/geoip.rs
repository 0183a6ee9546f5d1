//! Region lookup using a MaxMind GeoLite2/GeoIP2 MMDB
//!
//! The database is memory-mapped once at startup and shared read-only.
//! Both Country and City editions work: the country block is decoded
//! from either.

use async_trait::async_trait;
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use super::{GeoError, RegionResolver};

#[derive(Clone)]
pub struct GeoIpService {
    reader: Arc<Reader<Mmap>>,
    default_region: String,
}

impl GeoIpService {
    /// Open the MMDB at `path`
    ///
    /// `default_region` is returned for addresses the database has no
    /// country for (private ranges, unassigned space).
    pub fn open(path: &str, default_region: impl Into<String>) -> Result<Self, GeoError> {
        // SAFETY: the file is opened read-only and is not modified while mapped.
        let reader = unsafe { Reader::open_mmap(path) }.map_err(|e| GeoError::DatabaseInit {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            reader: Arc::new(reader),
            default_region: default_region.into(),
        })
    }

    /// ISO country code for `ip`, or None when the database has no entry
    pub fn lookup_country(&self, ip: IpAddr) -> Result<Option<String>, GeoError> {
        let result = self.reader.lookup(ip).map_err(|e| lookup_failed(ip, e))?;
        let country = result
            .decode::<geoip2::Country>()
            .map_err(|e| lookup_failed(ip, e))?;

        Ok(country.and_then(|c| c.country.iso_code.map(|s| s.to_string())))
    }
}

fn lookup_failed(ip: IpAddr, err: impl std::fmt::Display) -> GeoError {
    GeoError::LookupFailed {
        ip: ip.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl RegionResolver for GeoIpService {
    async fn resolve_region(&self, ip: &str) -> Result<String, GeoError> {
        let addr = ip
            .parse::<IpAddr>()
            .map_err(|_| GeoError::InvalidIpAddress(ip.to_string()))?;

        Ok(self
            .lookup_country(addr)?
            .unwrap_or_else(|| self.default_region.clone()))
    }
}
