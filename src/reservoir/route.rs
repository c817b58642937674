//! Route reservoir: a grid-indexed pool of riders along a
//! route, split by direction.
//!
//! One mutex per `(route_id, direction)` segment — reads and
//! mutations of a segment's index are serialized within that segment only,
//! so a query against `(R, OUTBOUND)` never blocks one against
//! `(R, INBOUND)` or against a different route entirely.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use super::stats::{ReservoirStats, ReservoirStatsSnapshot};
use super::ExpiringReservoir;
use crate::domain::{Direction, Location, Rider, RiderHome};
use crate::error::{SimError, SimResult};
use crate::geometry::{self, GridCell};
use crate::registry::SharedRegistry;

type SegmentKey = (String, Direction);

/// `grid_cell -> rider ids` plus the reverse `rider_id -> grid_cell` map, per
/// O(1) membership moves without scanning every cell.
#[derive(Default)]
struct Segment {
    cells: HashMap<GridCell, HashSet<Uuid>>,
    cell_of: HashMap<Uuid, GridCell>,
}

struct Segments {
    by_key: HashMap<SegmentKey, Arc<AsyncMutex<Segment>>>,
    key_of: HashMap<Uuid, SegmentKey>,
}

impl Segments {
    fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            key_of: HashMap::new(),
        }
    }

    fn segment_for(&mut self, key: &SegmentKey) -> Arc<AsyncMutex<Segment>> {
        self.by_key
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(Segment::default())))
            .clone()
    }
}

pub struct RouteReservoir {
    segments: std::sync::Mutex<Segments>,
    registry: SharedRegistry,
    stats: ReservoirStats,
    grid_cell_degrees: f64,
}

/// Cells whose bounding box intersects the disc of `radius_m` around
/// `center`, sized to a 3x3..5x5 block for typical radii at ~1km cells.
fn candidate_cells(center: Location, radius_m: f64, cell_size_degrees: f64) -> Vec<GridCell> {
    let lat_span_deg = radius_m / 111_200.0;
    let lon_span_deg = radius_m / (111_200.0 * center.lat.to_radians().cos().abs().max(1e-6));
    let lat_cells = (lat_span_deg / cell_size_degrees).ceil().max(1.0) as i64;
    let lon_cells = (lon_span_deg / cell_size_degrees).ceil().max(1.0) as i64;

    let center_cell = geometry::grid_cell_of(center.into(), cell_size_degrees);
    let mut cells = Vec::with_capacity(((2 * lat_cells + 1) * (2 * lon_cells + 1)) as usize);
    for d_lat in -lat_cells..=lat_cells {
        for d_lon in -lon_cells..=lon_cells {
            cells.push((center_cell.0 + d_lat, center_cell.1 + d_lon));
        }
    }
    cells
}

impl RouteReservoir {
    pub fn new(registry: SharedRegistry, grid_cell_degrees: f64) -> Self {
        Self {
            segments: std::sync::Mutex::new(Segments::new()),
            registry,
            stats: ReservoirStats::default(),
            grid_cell_degrees,
        }
    }

    pub async fn add_rider(&self, rider: Rider) -> SimResult<()> {
        if !matches!(rider.home, RiderHome::Route { .. }) {
            return Err(SimError::state("route reservoir only accepts route-home riders"));
        }
        let key = (rider.route_id.clone(), rider.direction);
        let cell = geometry::grid_cell_of(rider.origin.into(), self.grid_cell_degrees);
        let id = rider.id;

        let segment = {
            let mut segments = self.segments.lock().expect("route segment map poisoned");
            segments.key_of.insert(id, key.clone());
            segments.segment_for(&key)
        };

        self.registry.lock().await.insert(rider);
        {
            let mut guard = segment.lock().await;
            guard.cells.entry(cell).or_default().insert(id);
            guard.cell_of.insert(id, cell);
        }
        self.stats.record_spawn();
        Ok(())
    }

    /// Riders in the cells around `vehicle_loc` matching `vehicle_direction`,
    /// filtered by distance, sorted ascending by distance, truncated to
    /// `max_count`.
    pub async fn query_for_vehicle(
        &self,
        route_id: &str,
        vehicle_loc: Location,
        vehicle_direction: Direction,
        radius_m: f64,
        max_count: usize,
    ) -> Vec<Rider> {
        let key = (route_id.to_string(), vehicle_direction);
        let segment = {
            let mut segments = self.segments.lock().expect("route segment map poisoned");
            segments.segment_for(&key)
        };

        let guard = segment.lock().await;
        let registry = self.registry.lock().await;

        let cells = candidate_cells(vehicle_loc, radius_m, self.grid_cell_degrees);
        let mut candidates: Vec<(f64, Rider)> = Vec::new();
        for cell in cells {
            let Some(ids) = guard.cells.get(&cell) else { continue };
            for id in ids {
                let Some(handle) = registry.get(*id) else { continue };
                let rider = handle.lock().await;
                let limit = radius_m.min(rider.max_walking_distance_m);
                let distance = geometry::distance_meters(rider.origin.into(), vehicle_loc.into());
                if distance <= limit {
                    candidates.push((distance, rider.clone()));
                }
            }
        }
        candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        candidates.into_iter().take(max_count).map(|(_, r)| r).collect()
    }

    pub async fn mark_boarded(
        &self,
        rider_ids: &[Uuid],
        vehicle_id: &str,
        at: DateTime<Utc>,
    ) -> SimResult<Vec<Uuid>> {
        let mut boarded = Vec::new();
        for id in rider_ids {
            let key = {
                let segments = self.segments.lock().expect("route segment map poisoned");
                segments.key_of.get(id).cloned()
            };
            let Some(key) = key else { continue };

            let segment = {
                let mut segments = self.segments.lock().expect("route segment map poisoned");
                segments.segment_for(&key)
            };
            let removed = {
                let mut guard = segment.lock().await;
                if let Some(cell) = guard.cell_of.remove(id) {
                    if let Some(set) = guard.cells.get_mut(&cell) {
                        set.remove(id);
                    }
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
            let mut segments = self.segments.lock().expect("route segment map poisoned");
            segments.key_of.remove(id);
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
impl ExpiringReservoir for RouteReservoir {
    async fn sweep_expired(&self, now: DateTime<Utc>, ttl_seconds: u64) -> Vec<Uuid> {
        let _ = ttl_seconds;
        let keys: Vec<SegmentKey> = {
            let segments = self.segments.lock().expect("route segment map poisoned");
            segments.by_key.keys().cloned().collect()
        };

        let mut expired = Vec::new();
        for key in keys {
            let segment = {
                let mut segments = self.segments.lock().expect("route segment map poisoned");
                segments.segment_for(&key)
            };
            let mut guard = segment.lock().await;
            let ids: Vec<Uuid> = guard.cell_of.keys().copied().collect();
            for id in ids {
                let is_expired = {
                    let registry = self.registry.lock().await;
                    match registry.get(id) {
                        Some(handle) => handle.lock().await.is_expired(now),
                        None => false,
                    }
                };
                if !is_expired {
                    continue;
                }
                if let Some(cell) = guard.cell_of.remove(&id) {
                    if let Some(set) = guard.cells.get_mut(&cell) {
                        set.remove(&id);
                    }
                }
                let mut registry = self.registry.lock().await;
                if let Some(handle) = registry.get(id) {
                    let _ = handle.lock().await.expire();
                }
                registry.remove(id);
                expired.push(id);
            }
        }

        let mut segments = self.segments.lock().expect("route segment map poisoned");
        for id in &expired {
            segments.key_of.remove(id);
        }
        drop(segments);

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
    use crate::registry::RiderRegistry;

    fn registry() -> SharedRegistry {
        Arc::new(AsyncMutex::new(RiderRegistry::new()))
    }

    fn rider_at(route_id: &str, direction: Direction, loc: Location) -> Rider {
        Rider::new(
            loc,
            Location::new(loc.lat + 0.01, loc.lon),
            route_id.into(),
            direction,
            RiderHome::Route {
                grid_cell: geometry::grid_cell_of(loc.into(), 0.01),
                route_id: route_id.into(),
                direction,
            },
            Utc::now(),
            150.0,
            1800,
        )
    }

    #[tokio::test]
    async fn query_matches_only_same_direction() {
        let reservoir = RouteReservoir::new(registry(), 0.01);
        let midpoint = Location::new(13.30, -59.64);
        let outbound = rider_at("1A", Direction::Outbound, midpoint);
        let inbound = rider_at("1A", Direction::Inbound, midpoint);
        reservoir.add_rider(outbound.clone()).await.unwrap();
        reservoir.add_rider(inbound).await.unwrap();

        let matched = reservoir
            .query_for_vehicle("1A", midpoint, Direction::Outbound, 1000.0, 10)
            .await;
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, outbound.id);
    }

    #[tokio::test]
    async fn query_sorts_by_ascending_distance() {
        let reservoir = RouteReservoir::new(registry(), 0.01);
        let vehicle_loc = Location::new(13.30, -59.64);
        let near = rider_at("1A", Direction::Outbound, Location::new(13.3001, -59.64));
        let far = rider_at("1A", Direction::Outbound, Location::new(13.305, -59.64));
        reservoir.add_rider(far.clone()).await.unwrap();
        reservoir.add_rider(near.clone()).await.unwrap();

        let matched = reservoir
            .query_for_vehicle("1A", vehicle_loc, Direction::Outbound, 2000.0, 10)
            .await;
        assert_eq!(matched[0].id, near.id);
        assert_eq!(matched[1].id, far.id);
    }

    #[tokio::test]
    async fn mark_boarded_removes_from_index() {
        let reservoir = RouteReservoir::new(registry(), 0.01);
        let rider = rider_at("1A", Direction::Outbound, Location::new(13.30, -59.64));
        let id = rider.id;
        reservoir.add_rider(rider).await.unwrap();

        let boarded = reservoir.mark_boarded(&[id], "veh-1", Utc::now()).await.unwrap();
        assert_eq!(boarded, vec![id]);

        let matched = reservoir
            .query_for_vehicle("1A", Location::new(13.30, -59.64), Direction::Outbound, 1000.0, 10)
            .await;
        assert!(matched.is_empty());
    }
}
