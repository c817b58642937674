//! Answers `vehicle:query_passengers` on the event bus: the one place a
//! conductor's pickup query actually gets a `vehicle:passengers_found`
//! response from, rather than the conductor reaching into a reservoir
//! in-process. One task per concern, the same shape as the stats logger and
//! expiration sweeper.

use std::sync::Arc;

use tokio::sync::watch;

use crate::bus::{BusEvent, Channel, EventBus};
use crate::reservoir::{DepotReservoir, RouteReservoir};

/// Subscribes to both the depot and vehicle channels — `BusEvent::channel()`
/// routes a `VehicleQueryPassengers` with a `depot_id` to `Channel::Depot`
/// and one without to `Channel::Vehicle` — and answers each with the
/// matching reservoir's `query_for_vehicle`.
pub struct PassengerQueryResponder {
    depot_reservoir: Arc<DepotReservoir>,
    route_reservoir: Arc<RouteReservoir>,
    bus: Arc<EventBus>,
}

impl PassengerQueryResponder {
    pub fn new(
        depot_reservoir: Arc<DepotReservoir>,
        route_reservoir: Arc<RouteReservoir>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { depot_reservoir, route_reservoir, bus }
    }

    /// Run until `shutdown` fires; an in-flight response is allowed to
    /// finish before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut depot_events = self.bus.subscribe(Channel::Depot);
        let mut vehicle_events = self.bus.subscribe(Channel::Vehicle);
        loop {
            tokio::select! {
                event = depot_events.recv() => {
                    if let Ok(event) = event {
                        self.handle(event).await;
                    }
                }
                event = vehicle_events.recv() => {
                    if let Ok(event) = event {
                        self.handle(event).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("passenger query responder shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn handle(&self, event: BusEvent) {
        let BusEvent::VehicleQueryPassengers {
            correlation_id,
            route_id,
            depot_id,
            vehicle_loc,
            direction,
            radius_m,
            seats_available,
        } = event
        else {
            return;
        };

        // Over-fetch a few multiples of the seat count so the conductor has
        // enough candidates to rank by priority/wait-time/distance locally.
        let max_count = (seats_available as usize).saturating_mul(4).max(1);
        let riders = if let Some(depot_id) = depot_id {
            self.depot_reservoir
                .query_for_vehicle(&depot_id, &route_id, vehicle_loc, radius_m, max_count)
                .await
        } else {
            self.route_reservoir
                .query_for_vehicle(&route_id, vehicle_loc, direction, radius_m, max_count)
                .await
        };

        self.bus.publish(BusEvent::VehiclePassengersFound {
            correlation_id,
            rider_ids: riders.into_iter().map(|r| r.id).collect(),
        });
    }
}
