//! Two riders share a grid cell but face opposite directions; a vehicle
//! traveling outbound must only see the outbound one.

mod support;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;

use transit_sim_core::domain::{Direction, Location, Rider, RiderHome};
use transit_sim_core::geometry;
use transit_sim_core::registry::RiderRegistry;
use transit_sim_core::reservoir::RouteReservoir;

#[tokio::test]
async fn vehicle_travelling_outbound_only_sees_outbound_riders_in_shared_cell() {
    support::init_logging();
    let registry = Arc::new(AsyncMutex::new(RiderRegistry::new()));
    let reservoir = RouteReservoir::new(registry, 0.01);
    let route = support::route_1a();
    let midpoint = route.shape_points[route.shape_points.len() / 2];

    let outbound = Rider::new(
        midpoint,
        Location::new(midpoint.lat + 0.01, midpoint.lon),
        route.id.clone(),
        Direction::Outbound,
        RiderHome::Route {
            grid_cell: geometry::grid_cell_of(midpoint.into(), 0.01),
            route_id: route.id.clone(),
            direction: Direction::Outbound,
        },
        Utc::now(),
        150.0,
        1800,
    );
    let inbound = Rider::new(
        midpoint,
        Location::new(midpoint.lat - 0.01, midpoint.lon),
        route.id.clone(),
        Direction::Inbound,
        RiderHome::Route {
            grid_cell: geometry::grid_cell_of(midpoint.into(), 0.01),
            route_id: route.id.clone(),
            direction: Direction::Inbound,
        },
        Utc::now(),
        150.0,
        1800,
    );
    let outbound_id = outbound.id;
    reservoir.add_rider(outbound).await.unwrap();
    reservoir.add_rider(inbound).await.unwrap();

    let matched = reservoir
        .query_for_vehicle(&route.id, midpoint, Direction::Outbound, 500.0, 10)
        .await;

    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].id, outbound_id);
}
