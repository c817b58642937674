//! A `vehicle:query_passengers` request issued while the bus is
//! disconnected times out and invokes the registered fallback instead of
//! blocking indefinitely.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use transit_sim_core::bus::{BusEvent, EventBus};
use transit_sim_core::domain::{Direction, Location};
use transit_sim_core::error::SimError;

#[tokio::test]
async fn disconnected_bus_times_out_the_request_and_fires_fallback() {
    support::init_logging();
    let bus = Arc::new(EventBus::new(Duration::from_secs(30)));
    bus.set_connected(false);

    let fallback_fired = Arc::new(AtomicBool::new(false));
    let fallback_fired_clone = fallback_fired.clone();
    bus.register_fallback(Box::new(move |event| {
        if matches!(event, BusEvent::VehicleQueryPassengers { .. }) {
            fallback_fired_clone.store(true, Ordering::SeqCst);
        }
    }));

    // A plain publish while disconnected goes straight to the fallback.
    bus.publish(BusEvent::VehicleQueryPassengers {
        correlation_id: Uuid::new_v4(),
        route_id: "1A".into(),
        depot_id: None,
        vehicle_loc: Location::new(13.30, -59.64),
        direction: Direction::Outbound,
        radius_m: 500.0,
        seats_available: 10,
    });
    assert!(fallback_fired.load(Ordering::SeqCst));

    // A request/response call while disconnected also routes through
    // `publish` (so the fallback fires again) and then raises `BusTimeout`
    // once the wait elapses.
    let before = bus.consecutive_failures();
    let result = bus
        .request(
            BusEvent::VehicleQueryPassengers {
                correlation_id: Uuid::new_v4(),
                route_id: "1A".into(),
                depot_id: None,
                vehicle_loc: Location::new(13.30, -59.64),
                direction: Direction::Outbound,
                radius_m: 500.0,
                seats_available: 10,
            },
            Duration::from_millis(30),
        )
        .await;

    assert!(matches!(result, Err(SimError::BusTimeout(_))));
    assert_eq!(bus.consecutive_failures(), before + 1);
}
