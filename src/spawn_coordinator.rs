//! Spawn coordinator: the periodic tick that turns Poisson
//! draws into `Rider`s and files them into the reservoir their `source`
//! names, then announces them on the event bus.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;

use crate::bus::{BusEvent, EventBus};
use crate::config::Config;
use crate::domain::{derive_connectivity, Depot, Rider, RiderHome, Route, SpawnRequest, SpawnSource};
use crate::geometry;
use crate::reservoir::{DepotReservoir, RouteReservoir};
use crate::spawner::PoissonSpawner;
use crate::zone_cache::ZoneCache;

pub struct SpawnCoordinator {
    config: Config,
    routes: Vec<Route>,
    depots: Vec<Depot>,
    zone_cache: Arc<ZoneCache>,
    depot_reservoir: Arc<DepotReservoir>,
    route_reservoir: Arc<RouteReservoir>,
    bus: Arc<EventBus>,
    rng: StdMutex<StdRng>,
}

impl SpawnCoordinator {
    /// Derives depot<->route connectivity from the live snapshot before
    /// storing it (spawner.rs gates every depot-anchored spawn on
    /// `route.connected_depot_ids` being non-empty, so this must happen once
    /// per load rather than being left to callers to wire up by hand).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        mut routes: Vec<Route>,
        mut depots: Vec<Depot>,
        zone_cache: Arc<ZoneCache>,
        depot_reservoir: Arc<DepotReservoir>,
        route_reservoir: Arc<RouteReservoir>,
        bus: Arc<EventBus>,
        seed: u64,
    ) -> Self {
        derive_connectivity(&mut routes, &mut depots, config.spawner.depot_connectivity_m);
        Self {
            config,
            routes,
            depots,
            zone_cache,
            depot_reservoir,
            route_reservoir,
            bus,
            rng: StdMutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Run until `shutdown` fires, ticking every `spawner.window_seconds`.
    /// An in-flight tick finishes before the loop exits.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.spawner.window_seconds,
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("spawn coordinator shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub async fn tick(&self) {
        let now = Utc::now();
        let requests = {
            let mut rng = self.rng.lock().expect("spawner rng poisoned");
            let mut spawner = PoissonSpawner::new(&self.config.spawner, &mut *rng);
            spawner.generate(
                now,
                self.config.spawner.window_seconds,
                &self.routes,
                &self.depots,
                &self.zone_cache,
            )
        };
        log::debug!("spawn tick drew {} request(s)", requests.len());
        for request in requests {
            self.dispatch(request, now).await;
        }
    }

    async fn dispatch(&self, request: SpawnRequest, now: DateTime<Utc>) {
        let home = match &request.source {
            SpawnSource::Depot(depot_id) => RiderHome::Depot { depot_id: depot_id.clone() },
            SpawnSource::Route { .. } => RiderHome::Route {
                grid_cell: geometry::grid_cell_of(
                    request.origin.into(),
                    self.config.reservoir.grid_cell_degrees,
                ),
                route_id: request.route_id.clone(),
                direction: request.direction,
            },
        };

        let rider = Rider::new(
            request.origin,
            request.destination,
            request.route_id.clone(),
            request.direction,
            home,
            now,
            self.config.rider.default_walking_distance_m,
            self.config.rider.default_ttl_seconds,
        );
        let id = rider.id;

        let result = match &request.source {
            SpawnSource::Depot(_) => self.depot_reservoir.add_rider(rider).await,
            SpawnSource::Route { .. } => self.route_reservoir.add_rider(rider).await,
        };
        if let Err(err) = result {
            log::warn!("failed to file spawned rider {id}: {err}");
            return;
        }

        self.bus.publish(BusEvent::RiderSpawned {
            id,
            route_id: request.route_id,
            direction: request.direction,
            origin: request.origin,
            destination: request.destination,
        });
    }
}
