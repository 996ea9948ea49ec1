//! Deployment-wide request, cache, upstream and method statistics.
//!
//! All mutations go through one [`actor`] task, so they are totally ordered
//! and each one is persisted before it is acknowledged.

pub mod actor;
pub mod rate_bucket;
pub mod snapshot;
pub mod storage;

pub use actor::{spawn_stats_actor, storage_from_config, PingReply, StatsHandle};
pub use rate_bucket::{RateBucket, RATE_SLOTS};
pub use snapshot::{
    day_key, CacheLane, StatsEvent, StatsSnapshot, StatsState, TrafficLane, TrafficView,
    UpstreamReport,
};
pub use storage::{FileStatsStorage, MemoryStatsStorage, StatsStorage};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats actor unavailable")]
    Unavailable,

    #[error("stats actor did not answer in time")]
    Timeout,

    #[error("stats storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("stats serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
