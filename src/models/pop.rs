use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What a counter is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PopKey {
    /// One visitor address within one region
    Visitor {
        ip_address: String,
        region_code: String,
    },
    /// Running total for a whole region
    Region { region_code: String },
}

impl PopKey {
    pub fn visitor(ip_address: impl Into<String>, region_code: impl Into<String>) -> Self {
        PopKey::Visitor {
            ip_address: ip_address.into(),
            region_code: region_code.into(),
        }
    }

    pub fn region(region_code: impl Into<String>) -> Self {
        PopKey::Region {
            region_code: region_code.into(),
        }
    }

    pub fn region_code(&self) -> &str {
        match self {
            PopKey::Visitor { region_code, .. } | PopKey::Region { region_code } => region_code,
        }
    }
}

/// A non-negative pop counter value
///
/// Values are immutable: adding pops yields a new `Pop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pop {
    key: PopKey,
    count: u64,
}

impl Pop {
    /// First sighting of a key starts at zero
    pub fn new(key: PopKey) -> Self {
        Self { key, count: 0 }
    }

    pub fn with_count(key: PopKey, count: u64) -> Self {
        Self { key, count }
    }

    pub fn key(&self) -> &PopKey {
        &self.key
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn add_count(&self, additional: u64) -> Pop {
        Pop {
            key: self.key.clone(),
            count: self.count.saturating_add(additional),
        }
    }
}

/// `visitor_pops` table row
#[derive(Debug, Clone, FromRow)]
pub struct VisitorPopRow {
    pub ip_address: String,
    pub region_code: String,
    pub count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// `region_pops` table row
#[derive(Debug, Clone, FromRow)]
pub struct RegionPopRow {
    pub region_code: String,
    pub count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

// Counts are only ever incremented from zero; a negative value can only
// come from a hand-edited row and is read as zero.
fn stored_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

impl From<VisitorPopRow> for Pop {
    fn from(row: VisitorPopRow) -> Self {
        Pop::with_count(
            PopKey::visitor(row.ip_address, row.region_code),
            stored_count(row.count),
        )
    }
}

impl From<RegionPopRow> for Pop {
    fn from(row: RegionPopRow) -> Self {
        Pop::with_count(PopKey::region(row.region_code), stored_count(row.count))
    }
}
