use crate::models::Pop;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Counter values after a pop was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopTotals {
    pub visitor_count: u64,
    pub region_count: u64,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// Add `amount` to the visitor counter for `(ip_address, region_code)`
    /// and to the region counter for `region_code`
    ///
    /// Both counters change together or not at all. Each row is bumped
    /// with an in-place increment, so concurrent callers never lose pops.
    async fn add_pops(
        &self,
        ip_address: &str,
        region_code: &str,
        amount: u64,
    ) -> StorageResult<PopTotals>;

    /// Get the visitor counter for `(ip_address, region_code)`
    async fn get_visitor_pop(&self, ip_address: &str, region_code: &str)
        -> StorageResult<Option<Pop>>;

    /// Get the region counter for `region_code`
    async fn get_region_pop(&self, region_code: &str) -> StorageResult<Option<Pop>>;

    /// All region counters, highest count first
    async fn list_region_pops(&self) -> StorageResult<Vec<Pop>>;
}

pub(crate) fn amount_as_i64(amount: u64) -> StorageResult<i64> {
    i64::try_from(amount).map_err(|e| StorageError::Other(e.into()))
}

pub(crate) fn stored_total(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}
