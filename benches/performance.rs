//! Performance benchmarks for transit_sim_core using Criterion.rs.

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use transit_sim_core::config::SpawnerConfig;
use transit_sim_core::domain::{Depot, Direction, Location, Poi, PoiCategory, Rider, RiderHome, Route, Zone, ZoneType};
use transit_sim_core::geo_store::{GeoDataStore, StaticGeoDataStore};
use transit_sim_core::geometry;
use transit_sim_core::registry::RiderRegistry;
use transit_sim_core::reservoir::RouteReservoir;
use transit_sim_core::spawner::PoissonSpawner;
use transit_sim_core::zone_cache::ZoneCache;

fn sample_route(n_points: usize) -> Route {
    let points: Vec<Location> = (0..n_points)
        .map(|i| Location::new(13.10 + i as f64 * 0.001, -59.60 + i as f64 * 0.0008))
        .collect();
    Route::new("1A".into(), "1A".into(), points, 1.0)
}

fn sample_zone(id: &str, lat: f64, lon: f64) -> Zone {
    let ring = vec![
        Location::new(lat - 0.002, lon - 0.002),
        Location::new(lat - 0.002, lon + 0.002),
        Location::new(lat + 0.002, lon + 0.002),
        Location::new(lat + 0.002, lon - 0.002),
    ];
    Zone {
        id: id.into(),
        zone_type: ZoneType::Residential,
        ring,
        centroid: Location::new(lat, lon),
        bbox: (Location::new(lat - 0.002, lon - 0.002), Location::new(lat + 0.002, lon + 0.002)),
        base_weight: 1.0,
        time_multipliers: [1.0; 24],
    }
}

fn bench_geometry_snap(c: &mut Criterion) {
    let route = sample_route(500);
    let polyline: Vec<geometry::Location> = route.shape_points.iter().map(|&p| p.into()).collect();
    let probe = geometry::Location::from(Location::new(13.35, -59.55));

    c.bench_function("snap_to_polyline_500pt", |b| {
        b.iter(|| black_box(geometry::snap_to_polyline(black_box(probe), &polyline)));
    });
}

fn bench_spawner_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawner_generate");
    for n_routes in [1usize, 5, 20] {
        let routes: Vec<Route> = (0..n_routes)
            .map(|i| {
                let mut r = sample_route(50);
                r.id = format!("route-{i}");
                r
            })
            .collect();
        let depots: Vec<Depot> = vec![Depot::new(
            "depot-1".into(),
            "Speightstown".into(),
            Location::new(13.10, -59.60),
            1.0,
        )];
        let zone_cache = ZoneCache::new(5.0);
        let store = StaticGeoDataStore {
            routes: routes.clone(),
            depots: depots.clone(),
            pois: vec![Poi {
                id: "poi-1".into(),
                location: Location::new(13.15, -59.59),
                category: PoiCategory::Retail,
                attraction_factor: 1.0,
            }],
            zones: (0..10).map(|i| sample_zone(&format!("z{i}"), 13.10 + i as f64 * 0.01, -59.60)).collect(),
        };
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(zone_cache.reload(&routes, &store as &dyn GeoDataStore));

        let config = SpawnerConfig::default();
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 17, 0, 0).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(n_routes), &n_routes, |b, _| {
            let mut rng = StdRng::seed_from_u64(42);
            b.iter(|| {
                let mut spawner = PoissonSpawner::new(&config, &mut rng);
                black_box(spawner.generate(now, 30, &routes, &depots, &zone_cache));
            });
        });
    }
    group.finish();
}

fn bench_route_reservoir_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_reservoir_query_for_vehicle");
    for n_riders in [100usize, 1_000, 5_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n_riders), &n_riders, |b, &n_riders| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let registry = RiderRegistry::new_shared();
            let reservoir = RouteReservoir::new(registry.clone(), 0.01);
            let now = Utc::now();
            rt.block_on(async {
                for i in 0..n_riders {
                    let lat = 13.10 + (i % 50) as f64 * 0.001;
                    let lon = -59.60 + (i % 50) as f64 * 0.0008;
                    let rider = Rider::new(
                        Location::new(lat, lon),
                        Location::new(lat + 0.01, lon + 0.01),
                        "1A".into(),
                        Direction::Outbound,
                        RiderHome::Route {
                            grid_cell: (0, 0),
                            route_id: "1A".into(),
                            direction: Direction::Outbound,
                        },
                        now,
                        150.0,
                        1800,
                    );
                    reservoir.add_rider(rider).await.unwrap();
                }
            });
            let vehicle_loc = Location::new(13.12, -59.598);
            b.iter(|| {
                rt.block_on(async {
                    black_box(
                        reservoir
                            .query_for_vehicle("1A", vehicle_loc, Direction::Outbound, 1000.0, 40)
                            .await,
                    )
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_geometry_snap, bench_spawner_generate, bench_route_reservoir_query);
criterion_main!(benches);
