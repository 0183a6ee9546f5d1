pub mod pop;
pub mod response;

pub use pop::{Pop, PopKey, RegionPopRow, VisitorPopRow};
pub use response::{LeaderboardResponse, PopResponse, RegionPopResponse};
