use serde::{Deserialize, Serialize};

/// Body of every pop endpoint reply
///
/// `count_append` is null on a token-issuance round-trip, where nothing
/// was counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopResponse {
    pub count_append: Option<u64>,
    pub new_token: String,
    pub is_processed: bool,
}

impl PopResponse {
    pub fn issued(new_token: String) -> Self {
        Self {
            count_append: None,
            new_token,
            is_processed: false,
        }
    }

    pub fn processed(count_append: u64, new_token: String) -> Self {
        Self {
            count_append: Some(count_append),
            new_token,
            is_processed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPopResponse {
    pub region_code: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub global_sum: u64,
    pub ranking_list: Vec<RegionPopResponse>,
}
