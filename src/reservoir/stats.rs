//! Reservoir statistics: one shared component consumed by both the depot
//! and route reservoirs, rather than duplicating a counter set per
//! reservoir.
//!
//! Counters are plain atomics — snapshots are advisory and never part of a
//! boarding invariant, so a relaxed load racing an increment is acceptable.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirStatsSnapshot {
    pub spawned: u64,
    pub boarded: u64,
    pub expired: u64,
    pub rejected: u64,
    pub uptime_hours: f64,
}

impl ReservoirStatsSnapshot {
    pub fn spawned_per_hour(&self) -> f64 {
        rate(self.spawned, self.uptime_hours)
    }

    pub fn boarded_per_hour(&self) -> f64 {
        rate(self.boarded, self.uptime_hours)
    }

    pub fn expired_per_hour(&self) -> f64 {
        rate(self.expired, self.uptime_hours)
    }
}

fn rate(count: u64, uptime_hours: f64) -> f64 {
    if uptime_hours <= 0.0 {
        0.0
    } else {
        count as f64 / uptime_hours
    }
}

#[derive(Debug)]
pub struct ReservoirStats {
    spawned: AtomicU64,
    boarded: AtomicU64,
    expired: AtomicU64,
    rejected: AtomicU64,
    created_at: DateTime<Utc>,
}

impl ReservoirStats {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            spawned: AtomicU64::new(0),
            boarded: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            created_at,
        }
    }

    pub fn record_spawn(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_boarded(&self, count: u64) {
        self.boarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, count: u64) {
        self.rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ReservoirStatsSnapshot {
        let uptime_hours = (now - self.created_at).num_seconds().max(0) as f64 / 3600.0;
        ReservoirStatsSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            boarded: self.boarded.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            uptime_hours,
        }
    }
}

impl Default for ReservoirStats {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Background task: logs a snapshot of one reservoir's counters every
/// `interval`, one instance per reservoir. Reuses
/// `ExpiringReservoir::stats_snapshot` rather than a bespoke trait, since
/// both reservoirs already implement it for the expiration manager.
pub struct StatsLogger {
    reservoir: std::sync::Arc<dyn super::ExpiringReservoir>,
    label: &'static str,
    interval: std::time::Duration,
}

impl StatsLogger {
    pub fn new(
        reservoir: std::sync::Arc<dyn super::ExpiringReservoir>,
        label: &'static str,
        interval: std::time::Duration,
    ) -> Self {
        Self { reservoir, label, interval }
    }

    /// Run until `shutdown` fires; the in-flight log line is allowed to
    /// finish before the loop exits.
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = self.reservoir.stats_snapshot(Utc::now());
                    log::info!(
                        "{} reservoir: spawned={} boarded={} expired={} rejected={} ({:.1}/h spawned, {:.1}/h boarded)",
                        self.label,
                        snapshot.spawned,
                        snapshot.boarded,
                        snapshot.expired,
                        snapshot.rejected,
                        snapshot.spawned_per_hour(),
                        snapshot.boarded_per_hour(),
                    );
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("{} stats logger shutting down", self.label);
                        break;
                    }
                }
            }
        }
    }
}
