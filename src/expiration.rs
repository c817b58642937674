//! Expiration manager: a background worker that periodically
//! asks each reservoir for stale `WAITING` riders and expires them.
//!
//! Previously duplicated per-reservoir logic in the source material (per the
//! Design Notes); this is the single consolidated sweep, parameterized over
//! any `ExpiringReservoir` rather than hard-coded to one.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::bus::{BusEvent, EventBus};
use crate::reservoir::ExpiringReservoir;

/// One tick of the sweep: ask, expire, emit. Errors in a tick log and
/// continue — the manager never stops on a non-fatal error.
pub struct ExpirationManager {
    reservoir: Arc<dyn ExpiringReservoir>,
    label: &'static str,
    check_interval: StdDuration,
    ttl_seconds: u64,
    bus: Arc<EventBus>,
}

impl ExpirationManager {
    pub fn new(
        reservoir: Arc<dyn ExpiringReservoir>,
        label: &'static str,
        check_interval: StdDuration,
        ttl_seconds: u64,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            reservoir,
            label,
            check_interval,
            ttl_seconds,
            bus,
        }
    }

    /// Run until `shutdown` fires. Sweeps are interrupted on shutdown
    /// between riders, not mid-rider — the in-flight tick is allowed to
    /// finish before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.check_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("{} expiration sweeper shutting down", self.label);
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let now = Utc::now();
        let expired: Vec<Uuid> = self.reservoir.sweep_expired(now, self.ttl_seconds).await;
        if expired.is_empty() {
            return;
        }
        log::debug!("{} expired {} rider(s)", self.label, expired.len());
        for id in expired {
            self.bus.publish(BusEvent::RiderExpired {
                rider_id: id,
                reason: "ttl_elapsed".into(),
            });
        }
    }
}
