//! Route-anchored spawn volume and the distant-depot connectivity filter.

mod support;

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use transit_sim_core::config::Config;
use transit_sim_core::domain::{Direction, SpawnSource};
use transit_sim_core::geometry;
use transit_sim_core::spawner::PoissonSpawner;

#[tokio::test]
async fn route_1a_peak_hour_spawns_land_within_tolerance_and_trip_bound() {
    support::init_logging();
    let route = support::route_1a();
    let depot = support::depot_speightstown();
    let cache = support::cache_with_zone_near(&route).await;

    let config = Config::default();
    let mut rng = StdRng::seed_from_u64(42);
    let mut spawner = PoissonSpawner::new(&config.spawner, &mut rng);

    // hour 17, 10-minute window, per the scenario.
    let now = Utc.with_ymd_and_hms(2026, 7, 29, 17, 0, 0).unwrap();
    let requests = spawner.generate(now, 600, &[route.clone()], &[depot.clone()], &cache);

    assert!(!requests.is_empty(), "expected riders at peak hour");

    let route_length = route.length_m();
    let polyline: Vec<geometry::Location> = route.shape_points.iter().map(|&p| p.into()).collect();

    for request in &requests {
        let origin_snap = geometry::snap_to_polyline(request.origin.into(), &polyline).unwrap();
        let dest_snap = geometry::snap_to_polyline(request.destination.into(), &polyline).unwrap();
        assert!(geometry::distance_meters(origin_snap.point, request.origin.into()) <= 25.0 + 1e-6);
        assert!(geometry::distance_meters(dest_snap.point, request.destination.into()) <= 25.0 + 1e-6);

        let trip_m = geometry::distance_meters(request.origin.into(), request.destination.into());
        assert!(trip_m <= 1.2 * route_length + 1.0, "trip {trip_m} exceeds 1.2x route length");

        if let SpawnSource::Depot(depot_id) = &request.source {
            assert_eq!(depot_id, &depot.id);
            assert!(
                geometry::distance_meters(request.origin.into(), depot.location.into()) <= 500.0
            );
            assert_eq!(request.direction, Direction::Outbound);
        }
    }
}

#[tokio::test]
async fn distant_depot_never_spawns_against_an_unconnected_route() {
    support::init_logging();
    let route = support::route_1a(); // only connected to Speightstown
    let distant_depot = support::depot_constitution();
    let cache = support::cache_with_zone_near(&route).await;

    let config = Config::default();
    let mut rng = StdRng::seed_from_u64(1);
    let mut spawner = PoissonSpawner::new(&config.spawner, &mut rng);

    let now = Utc.with_ymd_and_hms(2026, 7, 29, 8, 0, 0).unwrap();
    let requests = spawner.generate(now, 600, &[route], &[distant_depot], &cache);

    assert!(requests.iter().all(|r| !matches!(&r.source, SpawnSource::Depot(_))));
}
