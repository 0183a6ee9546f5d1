//! Pop counting
//!
//! [`PopService`] applies an authenticated visitor's pops to the visitor
//! and region counters and hands back a replacement token.
//! [`LeaderboardService`] is the read side.

pub mod leaderboard;

pub use leaderboard::LeaderboardService;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::auth::{TokenCodec, TokenError};
use crate::models::PopResponse;
use crate::storage::{self, Storage, StorageError};

#[derive(Debug, Error)]
pub enum PopError {
    #[error("failed to record pops")]
    Storage(#[from] StorageError),
    #[error("failed to issue replacement token")]
    Token(#[source] TokenError),
}

/// Clamp a requested pop count into `[0, max_per_request]`
///
/// Negative requests count as zero. Oversized ones are capped, never
/// rejected.
pub fn clamp_count(requested: i64, max_per_request: u64) -> u64 {
    u64::try_from(requested).unwrap_or(0).min(max_per_request)
}

pub struct PopService {
    storage: Arc<dyn Storage>,
    codec: Arc<TokenCodec>,
    max_per_request: u64,
    storage_timeout: Duration,
}

impl PopService {
    pub fn new(
        storage: Arc<dyn Storage>,
        codec: Arc<TokenCodec>,
        max_per_request: u64,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            codec,
            max_per_request,
            storage_timeout,
        }
    }

    /// Record `requested` pops for a verified visitor and issue the
    /// token the client should use next.
    pub async fn apply_pop(
        &self,
        client_ip: &str,
        region_code: &str,
        requested: i64,
    ) -> Result<PopResponse, PopError> {
        let applied = clamp_count(requested, self.max_per_request);

        let totals = storage::with_timeout(
            self.storage_timeout,
            self.storage.add_pops(client_ip, region_code, applied),
        )
        .await?;

        info!(
            client_ip,
            region_code,
            requested,
            applied,
            visitor_total = totals.visitor_count,
            region_total = totals.region_count,
            "applied pops"
        );

        let new_token = self
            .codec
            .issue(client_ip, region_code)
            .map_err(PopError::Token)?;

        Ok(PopResponse::processed(applied, new_token))
    }
}
