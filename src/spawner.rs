//! The Poisson spawner: turns geography plus time-of-day
//! patterns into `SpawnRequest`s. Pure w.r.t. the zone cache and config,
//! random w.r.t. an injectable, seedable PRNG so tests are deterministic.
//!
//! The literal `Poisson(λ)` draw (`rand_distr::Poisson`) is used here
//! because drawing "n spawns this tick" from a window-based rate needs a
//! count distribution, not just inter-arrival gaps — `rand_distr` is
//! already part of the `rand` ecosystem this crate depends on, not a
//! foreign addition.

use chrono::{DateTime, Timelike, Utc};
use rand::Rng;
use rand_distr::{Distribution, LogNormal, Poisson};

use crate::config::SpawnerConfig;
use crate::domain::{Depot, Direction, Location, Route, SpawnRequest, SpawnSource, Zone};
use crate::geometry;
use crate::zone_cache::ZoneCache;

pub struct PoissonSpawner<'a, R: Rng> {
    config: &'a SpawnerConfig,
    rng: &'a mut R,
}

impl<'a, R: Rng> PoissonSpawner<'a, R> {
    pub fn new(config: &'a SpawnerConfig, rng: &'a mut R) -> Self {
        Self { config, rng }
    }

    /// One spawn tick: draws spawns for every active route, then every
    /// (depot, connected route) pair, and returns the combined batch.
    pub fn generate(
        &mut self,
        now: DateTime<Utc>,
        window_seconds: u64,
        routes: &[Route],
        depots: &[Depot],
        zone_cache: &ZoneCache,
    ) -> Vec<SpawnRequest> {
        if routes.is_empty() {
            return Vec::new();
        }
        let window_hours = window_seconds as f64 / 3600.0;
        let mut out = Vec::new();

        for route in routes {
            out.extend(self.generate_for_route(now, window_hours, route, zone_cache));
        }
        for depot in depots {
            for route in routes {
                if !route.connected_depot_ids.iter().any(|id| id == &depot.id) {
                    continue;
                }
                out.extend(self.generate_for_depot(now, window_hours, depot, route, zone_cache));
            }
        }
        out
    }

    fn generate_for_route(
        &mut self,
        now: DateTime<Utc>,
        window_hours: f64,
        route: &Route,
        zone_cache: &ZoneCache,
    ) -> Vec<SpawnRequest> {
        let route_length = route.length_m();
        if route_length <= 0.0 {
            // Coincident shape points: zero-length run, rate reduced to zero.
            return Vec::new();
        }

        let zones = zone_cache.zones_near(
            route.shape_points[route.shape_points.len() / 2],
            zone_cache_radius_m(),
        );
        if zones.is_empty() {
            return Vec::new();
        }

        let hour = now.hour() as usize;
        let time_mult = sanitized_multiplier(self.config.time_patterns.route[hour % 24]);
        let demand = demand_signal(&zones, hour);
        let lambda = self.config.base_rate_per_hour_per_route * route.activity_level * time_mult * demand;
        let n = self.poisson_draw(lambda * window_hours);

        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(request) = self.spawn_one_route_trip(route, route_length, &zones, now) {
                out.push(request);
            }
        }
        out
    }

    fn spawn_one_route_trip(
        &mut self,
        route: &Route,
        route_length: f64,
        zones: &[Zone],
        now: DateTime<Utc>,
    ) -> Option<SpawnRequest> {
        let zone = weighted_choice(zones, now.hour() as usize, self.rng)?;
        let raw_point = sample_point_in_zone(zone, self.rng)?;
        let origin_snap = geometry::snap_to_polyline(raw_point.into(), &to_geom(&route.shape_points))?;

        let log_normal = LogNormal::new(self.config.trip_length.mu_m, self.config.trip_length.sigma).ok()?;
        let trip_length_m = log_normal.sample(self.rng).max(0.05 * route_length);
        if trip_length_m > 1.2 * route_length {
            // Log-normal tail draw too long for this route: reject the spawn
            // rather than forcing an artificially short trip onto it.
            return None;
        }

        let forward = self.rng.gen_bool(0.5);
        let dest_distance_along = if forward {
            (origin_snap.distance_along_m + trip_length_m).clamp(0.0, route_length)
        } else {
            (origin_snap.distance_along_m - trip_length_m).clamp(0.0, route_length)
        };
        let destination = point_at_distance_along(&route.shape_points, dest_distance_along)?;

        let direction = if dest_distance_along >= origin_snap.distance_along_m {
            Direction::Outbound
        } else {
            Direction::Inbound
        };

        Some(SpawnRequest {
            origin: origin_snap.point.into(),
            destination: destination.into(),
            route_id: route.id.clone(),
            direction,
            source: SpawnSource::Route { zone_id: Some(zone.id.clone()), poi_id: None },
        })
    }

    fn generate_for_depot(
        &mut self,
        now: DateTime<Utc>,
        window_hours: f64,
        depot: &Depot,
        route: &Route,
        zone_cache: &ZoneCache,
    ) -> Vec<SpawnRequest> {
        let route_length = route.length_m();
        if route_length <= 0.0 {
            return Vec::new();
        }

        let zones = zone_cache.zones_near(depot.location, zone_cache_radius_m());
        let hour = now.hour() as usize;
        let time_mult = sanitized_multiplier(self.config.time_patterns.depot[hour % 24]);
        let demand = demand_signal(&zones, hour);
        let lambda = self.config.base_rate_per_hour_per_route * depot.activity_level * time_mult * demand;
        let n = self.poisson_draw(lambda * window_hours);

        let Some(origin_snap) =
            geometry::snap_to_polyline(depot.location.into(), &to_geom(&route.shape_points))
        else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let log_normal = match LogNormal::new(self.config.trip_length.mu_m, self.config.trip_length.sigma) {
                Ok(d) => d,
                Err(_) => continue,
            };
            let trip_length_m = log_normal
                .sample(self.rng)
                .clamp(0.05 * route_length, 1.0 * route_length);
            let dest_distance_along = (origin_snap.distance_along_m + trip_length_m).min(route_length);
            let Some(destination) = point_at_distance_along(&route.shape_points, dest_distance_along) else {
                continue;
            };

            out.push(SpawnRequest {
                origin: origin_snap.point.into(),
                destination: destination.into(),
                route_id: route.id.clone(),
                direction: Direction::Outbound,
                source: SpawnSource::Depot(depot.id.clone()),
            });
        }
        out
    }

    fn poisson_draw(&mut self, lambda: f64) -> usize {
        if lambda <= 0.0 || !lambda.is_finite() {
            return 0;
        }
        match Poisson::new(lambda) {
            Ok(dist) => dist.sample(self.rng) as usize,
            Err(_) => 0,
        }
    }
}

fn zone_cache_radius_m() -> f64 {
    // Zones "near" a route for weighting purposes: the zone cache's own
    // buffer already bounds what's resident in memory, so this is just the
    // radius used to pull candidates out of that snapshot per spawn tick.
    5_000.0
}

fn sanitized_multiplier(raw: f64) -> f64 {
    if raw.is_finite() && raw >= 0.0 {
        raw
    } else {
        log::warn!("invalid time-of-day multiplier {raw}, falling back to 1.0");
        1.0
    }
}

fn demand_signal(zones: &[Zone], hour: usize) -> f64 {
    if zones.is_empty() {
        return 1.0;
    }
    let total: f64 = zones.iter().map(|z| z.base_weight * z.time_multiplier(hour)).sum();
    (total / zones.len() as f64).max(0.0)
}

fn weighted_choice<'a, R: Rng>(zones: &'a [Zone], hour: usize, rng: &mut R) -> Option<&'a Zone> {
    let weights: Vec<f64> = zones
        .iter()
        .map(|z| (z.base_weight * z.time_multiplier(hour)).max(0.0))
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return zones.first();
    }
    let mut target = rng.gen_range(0.0..total);
    for (zone, weight) in zones.iter().zip(weights.iter()) {
        if target < *weight {
            return Some(zone);
        }
        target -= weight;
    }
    zones.last()
}

/// Rejection-sample a point inside the zone's polygon from its bounding box.
/// Degenerate zones were already filtered out by the zone cache, so a
/// bounded number of attempts is enough in practice.
fn sample_point_in_zone<R: Rng>(zone: &Zone, rng: &mut R) -> Option<Location> {
    let (min, max) = zone.bbox;
    for _ in 0..20 {
        let lat = rng.gen_range(min.lat..=max.lat);
        let lon = rng.gen_range(min.lon..=max.lon);
        let candidate = Location::new(lat, lon);
        if zone.contains(candidate) {
            return Some(candidate);
        }
    }
    Some(zone.centroid)
}

fn to_geom(points: &[Location]) -> Vec<geometry::Location> {
    points.iter().map(|&p| p.into()).collect()
}

fn point_at_distance_along(shape_points: &[Location], distance_m: f64) -> Option<Location> {
    geometry::point_at_distance_along(&to_geom(shape_points), distance_m).map(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::ZoneType;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn route_1a() -> Route {
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

    fn zone_around(id: &str, lat: f64, lon: f64) -> Zone {
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

    async fn cache_with_zone(route: &Route) -> ZoneCache {
        let cache = ZoneCache::new(5.0);
        let store = crate::geo_store::StaticGeoDataStore {
            routes: vec![route.clone()],
            zones: vec![zone_around("Z1", 13.305, -59.640)],
            ..Default::default()
        };
        cache.reload(&[route.clone()], &store).await;
        cache
    }

    #[tokio::test]
    async fn route_spawns_land_on_polyline_within_snap_tolerance() {
        let config = Config::default();
        let route = route_1a();
        let cache = cache_with_zone(&route).await;
        let mut rng = StdRng::seed_from_u64(42);
        let mut spawner = PoissonSpawner::new(&config.spawner, &mut rng);

        let requests = spawner.generate(
            Utc::now().with_hour(17).unwrap(),
            600,
            &[route.clone()],
            &[],
            &cache,
        );

        assert!(!requests.is_empty(), "expected at least one spawn at peak hour");
        let polyline = to_geom(&route.shape_points);
        for request in &requests {
            let origin_snap = geometry::snap_to_polyline(request.origin.into(), &polyline).unwrap();
            let dest_snap = geometry::snap_to_polyline(request.destination.into(), &polyline).unwrap();
            assert!(
                geometry::distance_meters(origin_snap.point, request.origin.into()) <= 25.0 + 1e-6
            );
            assert!(
                geometry::distance_meters(dest_snap.point, request.destination.into()) <= 25.0 + 1e-6
            );
        }
    }

    #[tokio::test]
    async fn trip_distance_is_bounded_by_route_length() {
        let config = Config::default();
        let route = route_1a();
        let cache = cache_with_zone(&route).await;
        let mut rng = StdRng::seed_from_u64(7);
        let mut spawner = PoissonSpawner::new(&config.spawner, &mut rng);

        let requests = spawner.generate(
            Utc::now().with_hour(17).unwrap(),
            600,
            &[route.clone()],
            &[],
            &cache,
        );

        let route_length = route.length_m();
        for request in &requests {
            let d = geometry::distance_meters(request.origin.into(), request.destination.into());
            assert!(d <= 1.2 * route_length + 1.0, "trip {d} exceeds bound");
        }
    }

    #[tokio::test]
    async fn depot_spawns_are_always_outbound_and_anchored_at_the_depot() {
        let config = Config::default();
        let route = route_1a();
        let depot = Depot::new(
            "Speightstown".into(),
            "Speightstown".into(),
            Location::new(13.3194, -59.6369),
            1.0,
        );
        let cache = cache_with_zone(&route).await;
        let mut rng = StdRng::seed_from_u64(99);
        let mut spawner = PoissonSpawner::new(&config.spawner, &mut rng);

        let requests = spawner.generate(
            Utc::now().with_hour(8).unwrap(),
            600,
            &[route.clone()],
            &[depot.clone()],
            &cache,
        );

        let depot_requests: Vec<_> = requests
            .iter()
            .filter(|r| matches!(&r.source, SpawnSource::Depot(id) if id == &depot.id))
            .collect();
        assert!(!depot_requests.is_empty());
        for request in depot_requests {
            assert_eq!(request.direction, Direction::Outbound);
            assert!(geometry::distance_meters(request.origin.into(), depot.location.into()) <= 500.0);
        }
    }

    #[tokio::test]
    async fn distant_depot_is_never_spawned_against_an_unconnected_route() {
        let config = Config::default();
        let route = route_1a(); // only connected to "Speightstown"
        let distant_depot = Depot::new(
            "Constitution".into(),
            "Constitution".into(),
            Location::new(13.0965, -59.6086),
            1.0,
        );
        let cache = cache_with_zone(&route).await;
        let mut rng = StdRng::seed_from_u64(1);
        let mut spawner = PoissonSpawner::new(&config.spawner, &mut rng);

        let requests = spawner.generate(
            Utc::now().with_hour(8).unwrap(),
            600,
            &[route],
            &[distant_depot],
            &cache,
        );

        assert!(requests.iter().all(|r| !matches!(&r.source, SpawnSource::Depot(_))));
    }

    #[test]
    fn zero_length_route_yields_no_spawns() {
        let config = Config::default();
        let route = Route::new(
            "degenerate".into(),
            "degenerate".into(),
            vec![Location::new(13.0, -59.0), Location::new(13.0, -59.0)],
            1.0,
        );
        let mut rng = StdRng::seed_from_u64(1);
        let mut spawner = PoissonSpawner::new(&config.spawner, &mut rng);
        let requests = spawner.generate_for_route(Utc::now(), 1.0, &route, &ZoneCache::new(5.0));
        assert!(requests.is_empty());
    }
}
