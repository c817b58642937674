//! Depot reservoir: per-`(depot_id, route_id)` FIFO queues of
//! outbound riders waiting at a depot.
//!
//! One mutex per queue — a query holds its queue's mutex for
//! the duration of the filter pass and nothing else, so concurrent queries
//! against different `(depot,route)` pairs never block each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use super::stats::{ReservoirStats, ReservoirStatsSnapshot};
use super::ExpiringReservoir;
use crate::domain::{Rider, RiderHome};
use crate::error::{SimError, SimResult};
use crate::geometry;
use crate::registry::SharedRegistry;

type QueueKey = (String, String);

/// A depot queue plus the side index mapping a rider id back to its key, so
/// `markBoarded`/sweeps can locate a queue from an id alone.
struct Queues {
    by_key: HashMap<QueueKey, Arc<AsyncMutex<VecDeque<Uuid>>>>,
    key_of: HashMap<Uuid, QueueKey>,
}

impl Queues {
    fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            key_of: HashMap::new(),
        }
    }

    fn queue_for(&mut self, key: &QueueKey) -> Arc<AsyncMutex<VecDeque<Uuid>>> {
        self.by_key
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(VecDeque::new())))
            .clone()
    }
}

pub struct DepotReservoir {
    queues: std::sync::Mutex<Queues>,
    registry: SharedRegistry,
    stats: ReservoirStats,
}

impl DepotReservoir {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            queues: std::sync::Mutex::new(Queues::new()),
            registry,
            stats: ReservoirStats::default(),
        }
    }

    /// O(1): appends to the FIFO for `(depot_id, route_id)`. The rider must
    /// have a `Depot` home.
    pub async fn add_rider(&self, rider: Rider) -> SimResult<()> {
        let RiderHome::Depot { depot_id } = &rider.home else {
            return Err(SimError::state("depot reservoir only accepts depot-home riders"));
        };
        let key = (depot_id.clone(), rider.route_id.clone());
        let id = rider.id;

        let queue = {
            let mut queues = self.queues.lock().expect("depot queue map poisoned");
            queues.key_of.insert(id, key.clone());
            queues.queue_for(&key)
        };

        self.registry.lock().await.insert(rider);
        queue.lock().await.push_back(id);
        self.stats.record_spawn();
        Ok(())
    }

    /// FIFO-ordered prefix (up to `max_count`) filtered by walking distance.
    /// Non-matching riders are skipped, not removed.
    pub async fn query_for_vehicle(
        &self,
        depot_id: &str,
        route_id: &str,
        vehicle_loc: crate::domain::Location,
        max_distance_m: f64,
        max_count: usize,
    ) -> Vec<Rider> {
        let key = (depot_id.to_string(), route_id.to_string());
        let queue = {
            let mut queues = self.queues.lock().expect("depot queue map poisoned");
            queues.queue_for(&key)
        };

        let queue = queue.lock().await;
        let registry = self.registry.lock().await;

        let mut matched = Vec::with_capacity(max_count.min(queue.len()));
        for id in queue.iter() {
            if matched.len() >= max_count {
                break;
            }
            let Some(handle) = registry.get(*id) else { continue };
            let rider = handle.lock().await;
            let limit = max_distance_m.min(rider.max_walking_distance_m);
            if geometry::distance_meters(rider.origin.into(), vehicle_loc.into()) <= limit {
                matched.push(rider.clone());
            }
        }
        matched
    }

    /// Atomically `WAITING -> BOARDED` and removes from the FIFO. Unknown ids
    /// are ignored. Idempotent: calling twice with the same ids is a no-op
    /// the second time, since a boarded rider is no longer in the queue.
    pub async fn mark_boarded(
        &self,
        rider_ids: &[Uuid],
        vehicle_id: &str,
        at: DateTime<Utc>,
    ) -> SimResult<Vec<Uuid>> {
        let mut boarded = Vec::new();
        for id in rider_ids {
            let key = {
                let queues = self.queues.lock().expect("depot queue map poisoned");
                queues.key_of.get(id).cloned()
            };
            let Some(key) = key else { continue };

            let queue = {
                let mut queues = self.queues.lock().expect("depot queue map poisoned");
                queues.queue_for(&key)
            };
            let removed = {
                let mut guard = queue.lock().await;
                if let Some(pos) = guard.iter().position(|queued| queued == id) {
                    guard.remove(pos);
                    true
                } else {
                    false
                }
            };
            if !removed {
                continue;
            }

            let registry = self.registry.lock().await;
            if let Some(handle) = registry.get(*id) {
                let mut rider = handle.lock().await;
                rider.board(vehicle_id.to_string(), at)?;
                boarded.push(*id);
            }
            let mut queues = self.queues.lock().expect("depot queue map poisoned");
            queues.key_of.remove(id);
        }
        self.stats.record_boarded(boarded.len() as u64);
        Ok(boarded)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> ReservoirStatsSnapshot {
        self.stats.snapshot(now)
    }

    /// Not an error (`CapacityRejection` per the error taxonomy): candidates
    /// a vehicle's query returned but didn't have a seat for. They stay
    /// `WAITING` and are re-offered next tick; this only updates the
    /// advisory counter.
    pub fn record_rejected(&self, count: u64) {
        self.stats.record_rejected(count);
    }
}

#[async_trait]
impl ExpiringReservoir for DepotReservoir {
    async fn sweep_expired(&self, now: DateTime<Utc>, ttl_seconds: u64) -> Vec<Uuid> {
        let _ = ttl_seconds; // ttl lives on the rider itself (max_wait_time_secs).
        let keys: Vec<QueueKey> = {
            let queues = self.queues.lock().expect("depot queue map poisoned");
            queues.by_key.keys().cloned().collect()
        };

        let mut expired = Vec::new();
        for key in keys {
            let queue = {
                let mut queues = self.queues.lock().expect("depot queue map poisoned");
                queues.queue_for(&key)
            };
            let mut guard = queue.lock().await;
            let mut still_waiting = VecDeque::with_capacity(guard.len());
            while let Some(id) = guard.pop_front() {
                let registry = self.registry.lock().await;
                let Some(handle) = registry.get(id) else { continue };
                let mut rider = handle.lock().await;
                if rider.is_expired(now) {
                    let _ = rider.expire();
                    drop(rider);
                    drop(registry);
                    let mut registry = self.registry.lock().await;
                    registry.remove(id);
                    expired.push(id);
                } else {
                    still_waiting.push_back(id);
                }
            }
            *guard = still_waiting;
        }

        let mut queues = self.queues.lock().expect("depot queue map poisoned");
        for id in &expired {
            queues.key_of.remove(id);
        }
        drop(queues);

        self.stats.record_expired(expired.len() as u64);
        expired
    }

    fn stats_snapshot(&self, now: DateTime<Utc>) -> ReservoirStatsSnapshot {
        self.stats(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, Location};
    use crate::registry::RiderRegistry;

    fn sample_rider(depot_id: &str, route_id: &str) -> Rider {
        Rider::new(
            Location::new(13.3194, -59.6369),
            Location::new(13.2943, -59.6430),
            route_id.into(),
            Direction::Outbound,
            RiderHome::Depot { depot_id: depot_id.into() },
            Utc::now(),
            150.0,
            1800,
        )
    }

    fn registry() -> SharedRegistry {
        Arc::new(AsyncMutex::new(RiderRegistry::new()))
    }

    #[tokio::test]
    async fn query_returns_fifo_order() {
        let reservoir = DepotReservoir::new(registry());
        let mut ids = Vec::new();
        for _ in 0..3 {
            let r = sample_rider("D1", "1A");
            ids.push(r.id);
            reservoir.add_rider(r).await.unwrap();
        }
        let matched = reservoir
            .query_for_vehicle("D1", "1A", Location::new(13.3194, -59.6369), 500.0, 10)
            .await;
        assert_eq!(matched.iter().map(|r| r.id).collect::<Vec<_>>(), ids);
    }

    #[tokio::test]
    async fn query_skips_riders_outside_walking_distance() {
        let reservoir = DepotReservoir::new(registry());
        let mut far = sample_rider("D1", "1A");
        far.max_walking_distance_m = 10.0;
        far.origin = Location::new(13.5, -59.6369);
        reservoir.add_rider(far.clone()).await.unwrap();
        let near = sample_rider("D1", "1A");
        reservoir.add_rider(near.clone()).await.unwrap();

        let matched = reservoir
            .query_for_vehicle("D1", "1A", Location::new(13.3194, -59.6369), 500.0, 10)
            .await;
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, near.id);
    }

    #[tokio::test]
    async fn mark_boarded_is_idempotent() {
        let reservoir = DepotReservoir::new(registry());
        let rider = sample_rider("D1", "1A");
        let id = rider.id;
        reservoir.add_rider(rider).await.unwrap();

        let first = reservoir.mark_boarded(&[id], "veh-1", Utc::now()).await.unwrap();
        assert_eq!(first, vec![id]);
        let second = reservoir.mark_boarded(&[id], "veh-1", Utc::now()).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn mark_boarded_ignores_unknown_ids() {
        let reservoir = DepotReservoir::new(registry());
        let unknown = Uuid::new_v4();
        let result = reservoir.mark_boarded(&[unknown], "veh-1", Utc::now()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn sweep_expired_removes_stale_waiting_riders() {
        let reservoir = DepotReservoir::new(registry());
        let mut rider = sample_rider("D1", "1A");
        rider.spawned_at = Utc::now() - chrono::Duration::seconds(3600);
        rider.max_wait_time_secs = 1800;
        let id = rider.id;
        reservoir.add_rider(rider).await.unwrap();

        let expired = reservoir.sweep_expired(Utc::now(), 1800).await;
        assert_eq!(expired, vec![id]);

        let matched = reservoir
            .query_for_vehicle("D1", "1A", Location::new(13.3194, -59.6369), 500.0, 10)
            .await;
        assert!(matched.is_empty());
    }
}
