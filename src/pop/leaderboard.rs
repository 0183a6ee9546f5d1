use std::sync::Arc;
use std::time::Duration;

use crate::models::{LeaderboardResponse, RegionPopResponse};
use crate::storage::{self, Storage, StorageResult};

pub struct LeaderboardService {
    storage: Arc<dyn Storage>,
    storage_timeout: Duration,
}

impl LeaderboardService {
    pub fn new(storage: Arc<dyn Storage>, storage_timeout: Duration) -> Self {
        Self {
            storage,
            storage_timeout,
        }
    }

    /// Region totals ranked by count (ties broken by region code) plus their sum
    pub async fn get_leaderboard(&self) -> StorageResult<LeaderboardResponse> {
        let pops =
            storage::with_timeout(self.storage_timeout, self.storage.list_region_pops()).await?;

        let mut ranking_list: Vec<RegionPopResponse> = pops
            .into_iter()
            .map(|pop| RegionPopResponse {
                region_code: pop.key().region_code().to_string(),
                count: pop.count(),
            })
            .collect();
        ranking_list.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.region_code.cmp(&b.region_code))
        });

        let global_sum = ranking_list
            .iter()
            .fold(0u64, |sum, entry| sum.saturating_add(entry.count));

        Ok(LeaderboardResponse {
            global_sum,
            ranking_list,
        })
    }
}
