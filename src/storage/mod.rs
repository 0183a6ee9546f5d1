pub mod memory;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{PopTotals, Storage, StorageError, StorageResult};

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{DatabaseBackend, DatabaseConfig};

/// Open the configured backend and make sure its tables exist
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage; counters will not survive a restart");
            Arc::new(MemoryStorage::new())
        }
    };

    storage.init().await?;
    Ok(storage)
}

/// Bound a storage call so a stalled backend cannot hang the request
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| StorageError::Timeout(timeout))?
}
