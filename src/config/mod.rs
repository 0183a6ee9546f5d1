use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Minimum HMAC secret length in bytes (256 bits).
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub token: TokenConfig,
    pub pop: PopConfig,
    pub geoip: GeoIpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
    /// Upper bound on any single persistence call
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    /// Feeds the issuer derivation together with the secret
    pub server_address: String,
    pub ttl_secs: u64,
    pub clock_skew_secs: u64,
    /// Reject tokens whose region no longer matches a fresh lookup
    pub pin_region: bool,
}

// Hand-written so the secret never ends up in logs.
impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("server_address", &self.server_address)
            .field("ttl_secs", &self.ttl_secs)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .field("pin_region", &self.pin_region)
            .finish()
    }
}

impl TokenConfig {
    pub const fn default_ttl_secs() -> u64 {
        3600
    }

    pub const fn default_clock_skew_secs() -> u64 {
        60
    }

    /// One year
    pub const MAX_TTL_SECS: u64 = 365 * 24 * 3600;
    pub const MAX_CLOCK_SKEW_SECS: u64 = 3600;

    /// Reject lifetimes that are empty or too large for epoch arithmetic
    pub fn check_lifetimes(&self) -> anyhow::Result<()> {
        if self.ttl_secs == 0 {
            bail!("TOKEN_TTL_SECS must be greater than zero");
        }
        if self.ttl_secs > Self::MAX_TTL_SECS {
            bail!(
                "TOKEN_TTL_SECS must be at most {} (got {})",
                Self::MAX_TTL_SECS,
                self.ttl_secs
            );
        }
        if self.clock_skew_secs > Self::MAX_CLOCK_SKEW_SECS {
            bail!(
                "TOKEN_CLOCK_SKEW_SECS must be at most {} (got {})",
                Self::MAX_CLOCK_SKEW_SECS,
                self.clock_skew_secs
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopConfig {
    pub max_per_request: u64,
}

impl PopConfig {
    pub const fn default_max_per_request() -> u64 {
        800
    }
}

impl Default for PopConfig {
    fn default() -> Self {
        Self {
            max_per_request: Self::default_max_per_request(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// Path to a MaxMind Country or City .mmdb file
    /// If None, every address resolves to `default_region`
    pub db_path: Option<String>,
    pub default_region: String,
    pub lookup_timeout_ms: u64,
    pub cache_max_entries: u64,
    pub cache_ttl_secs: u64,
}

impl GeoIpConfig {
    pub const UNKNOWN_REGION: &'static str = "UNKNOWN";
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            default_region: Self::UNKNOWN_REGION.to_string(),
            lookup_timeout_ms: 500,
            cache_max_entries: 10_000,
            cache_ttl_secs: 300,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            "memory" => DatabaseBackend::Memory,
            "sqlite" => DatabaseBackend::Sqlite,
            other => {
                tracing::warn!(
                    "Unknown DATABASE_BACKEND '{other}', falling back to 'sqlite'. Supported values: sqlite, postgres, memory"
                );
                DatabaseBackend::Sqlite
            }
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./popcat.db?mode=rwc".to_string());
        let max_connections = env_or("DATABASE_MAX_CONNECTIONS", 10u32)?;
        let storage_timeout_ms = env_or("STORAGE_TIMEOUT_MS", 2000u64)?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = env_or("API_PORT", 8080u16)?;

        let secret = std::env::var("TOKEN_SECRET").context("TOKEN_SECRET must be set")?;
        if secret.len() < MIN_SECRET_LEN {
            bail!("TOKEN_SECRET must be at least {MIN_SECRET_LEN} bytes long");
        }

        let server_address = std::env::var("TOKEN_SERVER_ADDRESS")
            .unwrap_or_else(|_| format!("{api_host}:{api_port}"));

        let token = TokenConfig {
            secret,
            server_address,
            ttl_secs: env_or("TOKEN_TTL_SECS", TokenConfig::default_ttl_secs())?,
            clock_skew_secs: env_or(
                "TOKEN_CLOCK_SKEW_SECS",
                TokenConfig::default_clock_skew_secs(),
            )?,
            pin_region: env_flag("TOKEN_PIN_REGION"),
        };
        token.check_lifetimes()?;

        let max_per_request =
            env_or("POP_MAX_PER_REQUEST", PopConfig::default_max_per_request())?;

        let geo_defaults = GeoIpConfig::default();
        let geoip = GeoIpConfig {
            db_path: std::env::var("GEOIP_DB_PATH").ok().filter(|p| !p.is_empty()),
            default_region: std::env::var("GEOIP_DEFAULT_REGION")
                .unwrap_or(geo_defaults.default_region),
            lookup_timeout_ms: env_or("GEOIP_LOOKUP_TIMEOUT_MS", geo_defaults.lookup_timeout_ms)?,
            cache_max_entries: env_or("GEOIP_CACHE_MAX_ENTRIES", geo_defaults.cache_max_entries)?,
            cache_ttl_secs: env_or("GEOIP_CACHE_TTL_SECS", geo_defaults.cache_ttl_secs)?,
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
                timeout_ms: storage_timeout_ms,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            token,
            pop: PopConfig { max_per_request },
            geoip,
        })
    }
}
