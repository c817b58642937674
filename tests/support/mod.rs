//! Shared fixtures for the integration/system test files in this directory:
//! one small fixtures module reused across test binaries.

use transit_sim_core::domain::{Depot, Location, Route, Zone, ZoneType};
use transit_sim_core::geo_store::StaticGeoDataStore;
use transit_sim_core::zone_cache::ZoneCache;

/// Surfaces `log::info!`/`log::warn!` output (stats loggers, bus reconnect
/// backoff) under `cargo test -- --nocapture`. Safe to call from every test
/// file that pulls in this module; the second and later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Route 1A, Speightstown to Broomfield.
pub fn route_1a() -> Route {
    let mut route = Route::new(
        "1A".into(),
        "1A".into(),
        vec![
            Location::new(13.3194, -59.6369),
            Location::new(13.3050, -59.6400),
            Location::new(13.2943, -59.6430),
        ],
        1.0,
    );
    route.connected_depot_ids = vec!["Speightstown".into()];
    route
}

pub fn depot_speightstown() -> Depot {
    Depot::new(
        "Speightstown".into(),
        "Speightstown".into(),
        Location::new(13.3194, -59.6369),
        1.0,
    )
}

pub fn depot_constitution() -> Depot {
    Depot::new(
        "Constitution".into(),
        "Constitution".into(),
        Location::new(13.0965, -59.6086),
        1.0,
    )
}

pub fn zone_around(id: &str, lat: f64, lon: f64) -> Zone {
    Zone {
        id: id.into(),
        zone_type: ZoneType::Residential,
        ring: vec![
            Location::new(lat - 0.002, lon - 0.002),
            Location::new(lat - 0.002, lon + 0.002),
            Location::new(lat + 0.002, lon + 0.002),
            Location::new(lat + 0.002, lon - 0.002),
        ],
        centroid: Location::new(lat, lon),
        bbox: (Location::new(lat - 0.002, lon - 0.002), Location::new(lat + 0.002, lon + 0.002)),
        base_weight: 1.0,
        time_multipliers: [1.0; 24],
    }
}

/// A `ZoneCache` reloaded from a `StaticGeoDataStore` seeded with one zone
/// near the midpoint of `route` — enough demand signal for the spawner to
/// draw a non-zero Poisson count.
pub async fn cache_with_zone_near(route: &Route) -> ZoneCache {
    let cache = ZoneCache::new(5.0);
    let mid = route.shape_points[route.shape_points.len() / 2];
    let store = StaticGeoDataStore {
        routes: vec![route.clone()],
        zones: vec![zone_around("Z1", mid.lat, mid.lon)],
        ..Default::default()
    };
    cache.reload(&[route.clone()], &store).await;
    cache
}
