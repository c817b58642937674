//! The two reservoirs: in-memory pools of `WAITING`
//! riders. A rider's `home` fixes which reservoir owns it, so no rider is
//! ever double-held.

pub mod depot;
pub mod route;
pub mod stats;

pub use depot::DepotReservoir;
pub use route::RouteReservoir;
pub use stats::{ReservoirStats, ReservoirStatsSnapshot, StatsLogger};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Implemented by both reservoirs so the expiration manager can be written
/// once against this interface instead of duplicating the sweep loop per
/// reservoir.
#[async_trait]
pub trait ExpiringReservoir: Send + Sync {
    /// Transition every rider with `spawned_at + ttl <= now` and still
    /// `WAITING` to `EXPIRED`, remove it, and return the expired ids.
    async fn sweep_expired(&self, now: DateTime<Utc>, ttl_seconds: u64) -> Vec<Uuid>;

    fn stats_snapshot(&self, now: DateTime<Utc>) -> ReservoirStatsSnapshot;
}
