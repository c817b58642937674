//! Conductor/driver coupling: per-vehicle state carried as `bevy_ecs`
//! components on a one-entity `World`, a natural idiom for many
//! independent, similarly-shaped state machines (`ecs.rs`'s `Driver`/`Trip`
//! components with a plain `state` enum field, generalized here to
//! conductor/driver states).
//!
//! Unlike a discrete-event replay clock, which advances `Schedule::run` in
//! zero wall-clock time by popping pre-scheduled events, the conductor and
//! driver each run as a genuine per-vehicle `tokio` task — so `World` here
//! is driven by hand from two cooperating async loops rather than a
//! `Schedule`, because the reservoir and bus calls a tick makes are real
//! suspension points a synchronous bevy system can't await on.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use bevy_ecs::prelude::{Component, Entity, World};
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::bus::{BusEvent, EventBus};
use crate::config::ConductorConfig;
use crate::domain::{Direction, Location, Rider, Route};
use crate::error::{SimError, SimResult};
use crate::geometry;
use crate::registry::SharedRegistry;
use crate::reservoir::{DepotReservoir, RouteReservoir};

/// Fixed detection radius for "is the vehicle at a connected depot right
/// now" — distinct from the configurable query radii used once that's
/// decided.
const NEAR_DEPOT_DETECTION_M: f64 = 100.0;
const BOARDING_SECONDS_PER_RIDER: u64 = 3;
const ALIGHTING_SECONDS_PER_RIDER: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConductorState {
    Idle,
    Monitoring,
    Boarding,
    EnRoute,
    ApproachingStop,
    Stopped,
    FullExpress,
    Cleanup,
}

#[derive(Component, Debug, Clone)]
pub struct Conductor {
    pub state: ConductorState,
    pub vehicle_id: String,
    pub route_id: String,
    pub capacity: u32,
    pub standing_capacity: u32,
    pub onboard: Vec<Uuid>,
    pub consecutive_failures: u32,
}

impl Conductor {
    fn effective_capacity(&self) -> u32 {
        self.capacity + self.standing_capacity
    }

    fn seats_available(&self) -> u32 {
        self.effective_capacity().saturating_sub(self.onboard.len() as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Disembarked,
    Boarding,
    Waiting,
    Onboard,
    Disembarking,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    On,
    Off,
}

#[derive(Component, Debug, Clone, Copy)]
pub struct Driver {
    pub state: DriverState,
    pub engine: EngineState,
    pub location: Location,
    pub direction: Direction,
    pub distance_along_m: f64,
    pub heading_deg: f64,
    pub speed_mps: f64,
    pub boarding_started_at: Option<DateTime<Utc>>,
}

/// The vehicle's physical engine. Out of scope as a real collaborator;
/// this trait is the seam a hardware-in-the-loop adapter would implement.
/// `AlwaysOnEngineControl` always succeeds.
pub trait EngineControl: Send + Sync {
    fn start(&self) -> SimResult<()>;
}

pub struct AlwaysOnEngineControl;

impl EngineControl for AlwaysOnEngineControl {
    fn start(&self) -> SimResult<()> {
        Ok(())
    }
}

/// Shared per-vehicle state: one entity holding a `Conductor` and a `Driver`
/// component, behind a plain mutex since every access is brief and
/// non-blocking (no reservoir/bus call happens while the lock is held).
pub struct VehicleHandle {
    world: AsyncMutex<World>,
    entity: Entity,
    route: Arc<Route>,
    depot_reservoir: Arc<DepotReservoir>,
    route_reservoir: Arc<RouteReservoir>,
    registry: SharedRegistry,
    bus: Arc<EventBus>,
    engine: Arc<dyn EngineControl>,
    config: ConductorConfig,
    request_timeout: StdDuration,
}

impl VehicleHandle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vehicle_id: String,
        route: Arc<Route>,
        direction: Direction,
        depot_reservoir: Arc<DepotReservoir>,
        route_reservoir: Arc<RouteReservoir>,
        registry: SharedRegistry,
        bus: Arc<EventBus>,
        engine: Arc<dyn EngineControl>,
        config: ConductorConfig,
        request_timeout: StdDuration,
    ) -> Arc<Self> {
        let start_location = route.first_endpoint().unwrap_or(Location::new(0.0, 0.0));
        let mut world = World::new();
        let entity = world
            .spawn((
                Conductor {
                    state: ConductorState::Idle,
                    vehicle_id: vehicle_id.clone(),
                    route_id: route.id.clone(),
                    capacity: config.capacity,
                    standing_capacity: config.standing_capacity,
                    onboard: Vec::new(),
                    consecutive_failures: 0,
                },
                Driver {
                    state: DriverState::Disembarked,
                    engine: EngineState::Off,
                    location: start_location,
                    direction,
                    distance_along_m: 0.0,
                    heading_deg: 0.0,
                    speed_mps: 8.0,
                    boarding_started_at: None,
                },
            ))
            .id();

        Arc::new(Self {
            world: AsyncMutex::new(world),
            entity,
            route,
            depot_reservoir,
            route_reservoir,
            registry,
            bus,
            engine,
            config,
            request_timeout,
        })
    }

    /// Drives the driver state machine: boarding delay, `WAITING <-> ONBOARD`
    /// location advancement, and continuous GPS broadcasting once the driver
    /// is on the vehicle.
    pub async fn run_driver(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(StdDuration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.driver_tick(1.0).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn driver_tick(&self, dt_secs: f64) {
        let mut world = self.world.lock().await;
        let mut driver = *world.get::<Driver>(self.entity).expect("driver component present");

        if driver.state == DriverState::Disembarked {
            driver.state = DriverState::Boarding;
            driver.boarding_started_at = Some(Utc::now());
        } else if driver.state == DriverState::Boarding {
            let started = driver.boarding_started_at.unwrap_or_else(Utc::now);
            if (Utc::now() - started).num_seconds() >= 3 {
                driver.state = DriverState::Waiting;
            }
        }

        if driver.state == DriverState::Onboard && driver.engine == EngineState::On {
            let route_length = self.route.length_m();
            let step = driver.speed_mps * dt_secs;
            let mut next = driver.distance_along_m
                + if driver.direction == Direction::Outbound { step } else { -step };
            if next >= route_length {
                next = route_length;
                driver.direction = driver.direction.opposite();
            } else if next <= 0.0 {
                next = 0.0;
                driver.direction = driver.direction.opposite();
            }
            let geom_points: Vec<geometry::Location> =
                self.route.shape_points.iter().map(|&p| p.into()).collect();
            if let Some(point) = geometry::point_at_distance_along(&geom_points, next) {
                let prev: geometry::Location = driver.location.into();
                driver.heading_deg = geometry::bearing_degrees(prev, point);
                driver.location = point.into();
            }
            driver.distance_along_m = next;
        }

        let gps_eligible = !matches!(driver.state, DriverState::Disembarked);
        *world.get_mut::<Driver>(self.entity).expect("driver component present") = driver;
        drop(world);

        if gps_eligible {
            let vehicle_id = {
                let world = self.world.lock().await;
                world.get::<Conductor>(self.entity).expect("conductor component present").vehicle_id.clone()
            };
            self.bus.publish(BusEvent::DriverLocation {
                vehicle_id,
                lat: driver.location.lat,
                lon: driver.location.lon,
                speed: if driver.engine == EngineState::On { driver.speed_mps } else { 0.0 },
                heading: driver.heading_deg,
                timestamp: Utc::now(),
            });
        }
    }

    /// Drives the conductor state machine: alight check, pickup query,
    /// boarding decision, stop/depart signaling.
    pub async fn run_conductor(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(StdDuration::from_secs(self.config.tick_seconds.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.conductor_tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        log::info!("conductor shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn conductor_tick(&self) {
        let (mut conductor, driver) = {
            let world = self.world.lock().await;
            (
                world.get::<Conductor>(self.entity).expect("conductor component present").clone(),
                *world.get::<Driver>(self.entity).expect("driver component present"),
            )
        };

        if driver.state != DriverState::Waiting && driver.state != DriverState::Onboard {
            // Driver hasn't finished its own boarding sequence yet; nothing
            // for the conductor to coordinate this tick.
            return;
        }

        let now = Utc::now();
        let alight_ids = self.decide_alighting(&conductor, driver.location, now).await;

        conductor.state = if conductor.seats_available() == 0 {
            ConductorState::FullExpress
        } else {
            ConductorState::Monitoring
        };

        let (board_ids, board_from_depot) = if conductor.state == ConductorState::FullExpress {
            (Vec::new(), false)
        } else {
            self.decide_boarding(&conductor, &driver).await
        };

        if alight_ids.is_empty() && board_ids.is_empty() {
            conductor.state = ConductorState::EnRoute;
            self.write_conductor(conductor).await;
            return;
        }

        conductor.state = ConductorState::ApproachingStop;
        let stop_duration = BOARDING_SECONDS_PER_RIDER * board_ids.len() as u64
            + ALIGHTING_SECONDS_PER_RIDER * alight_ids.len() as u64;
        self.bus.publish(BusEvent::VehicleStopRequest {
            vehicle_id: conductor.vehicle_id.clone(),
            duration_s: stop_duration,
        });
        self.set_driver_state(DriverState::Waiting, EngineState::Off).await;

        self.execute_alighting(&alight_ids, &conductor.vehicle_id, now).await;
        self.execute_boarding(&mut conductor, &board_ids, board_from_depot, now).await;
        conductor.onboard.retain(|id| !alight_ids.contains(id));
        conductor.state = ConductorState::Stopped;
        self.write_conductor(conductor.clone()).await;

        if !self.start_engine_with_retry(&mut conductor).await {
            self.write_conductor(conductor).await;
            return;
        }

        self.bus.publish(BusEvent::VehicleDepart {
            vehicle_id: conductor.vehicle_id.clone(),
            passenger_count: conductor.onboard.len() as u32,
        });
        self.set_driver_state(DriverState::Onboard, EngineState::On).await;
        conductor.state = ConductorState::EnRoute;
        self.write_conductor(conductor).await;
    }

    async fn decide_alighting(&self, conductor: &Conductor, vehicle_loc: Location, now: DateTime<Utc>) -> Vec<Uuid> {
        let registry = self.registry.lock().await;
        let mut ids = Vec::new();
        for id in &conductor.onboard {
            let Some(handle) = registry.get(*id) else { continue };
            let rider = handle.lock().await;
            if geometry::distance_meters(rider.destination.into(), vehicle_loc.into())
                <= self.config.alight_trigger_m
            {
                ids.push(*id);
            }
        }
        let _ = now;
        ids
    }

    /// Issues `vehicle:query_passengers` as a request/response and waits for
    /// the matching `vehicle:passengers_found` (answered by a
    /// `PassengerQueryResponder` subscribed to the bus). Only on
    /// `BusTimeout` — the bus degradation path, not the everyday one — does
    /// this fall back to querying the reservoir directly in-process.
    async fn decide_boarding(&self, conductor: &Conductor, driver: &Driver) -> (Vec<Uuid>, bool) {
        let near_depot = self.nearest_connected_depot(driver.location);
        let from_depot = near_depot.is_some();
        let seats = conductor.seats_available() as usize;
        if seats == 0 {
            return (Vec::new(), from_depot);
        }

        let radius_m = if from_depot {
            self.config.depot_query_radius_m
        } else {
            self.config.route_query_radius_m
        };
        let query = BusEvent::VehicleQueryPassengers {
            correlation_id: Uuid::new_v4(),
            route_id: conductor.route_id.clone(),
            depot_id: near_depot.clone(),
            vehicle_loc: driver.location,
            direction: driver.direction,
            radius_m,
            seats_available: seats as u32,
        };

        let candidates = match self.bus.request(query, self.request_timeout).await {
            Ok(BusEvent::VehiclePassengersFound { rider_ids, .. }) => {
                self.riders_by_id(&rider_ids).await
            }
            Ok(other) => {
                log::warn!("unexpected response to vehicle:query_passengers: {other:?}");
                self.query_reservoir_directly(&near_depot, &conductor.route_id, driver, radius_m, seats).await
            }
            Err(SimError::BusTimeout(timeout)) => {
                log::warn!(
                    "vehicle:query_passengers timed out after {timeout:?}, falling back to direct reservoir query"
                );
                self.query_reservoir_directly(&near_depot, &conductor.route_id, driver, radius_m, seats).await
            }
            Err(err) => {
                log::warn!("vehicle:query_passengers failed ({err}), falling back to direct reservoir query");
                self.query_reservoir_directly(&near_depot, &conductor.route_id, driver, radius_m, seats).await
            }
        };

        let mut sorted = candidates;
        sorted.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.spawned_at.cmp(&b.spawned_at))
                .then_with(|| {
                    let da = geometry::distance_meters(a.origin.into(), driver.location.into());
                    let db = geometry::distance_meters(b.origin.into(), driver.location.into());
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        let excess = sorted.len().saturating_sub(seats) as u64;
        if excess > 0 {
            if from_depot {
                self.depot_reservoir.record_rejected(excess);
            } else {
                self.route_reservoir.record_rejected(excess);
            }
        }
        (sorted.into_iter().take(seats).map(|r| r.id).collect(), from_depot)
    }

    /// Resolves a `vehicle:passengers_found` response's bare ids back to
    /// full riders via the shared registry — the wire event only carries
    /// ids, but boarding priority/wait-time/origin ranking needs the rest.
    async fn riders_by_id(&self, ids: &[Uuid]) -> Vec<Rider> {
        let registry = self.registry.lock().await;
        let mut riders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(handle) = registry.get(*id) {
                riders.push(handle.lock().await.clone());
            }
        }
        riders
    }

    async fn query_reservoir_directly(
        &self,
        near_depot: &Option<String>,
        route_id: &str,
        driver: &Driver,
        radius_m: f64,
        seats: usize,
    ) -> Vec<Rider> {
        if let Some(depot_id) = near_depot {
            self.depot_reservoir
                .query_for_vehicle(depot_id, route_id, driver.location, radius_m, seats * 4)
                .await
        } else {
            self.route_reservoir
                .query_for_vehicle(route_id, driver.location, driver.direction, radius_m, seats * 4)
                .await
        }
    }

    fn nearest_connected_depot(&self, vehicle_loc: Location) -> Option<String> {
        // Depot locations aren't modeled on `Route` directly (only ids);
        // detection here is approximated by the route's own endpoints, which
        // is where depots live in this topology.
        let at_start = self
            .route
            .first_endpoint()
            .map(|p| geometry::distance_meters(p.into(), vehicle_loc.into()) <= NEAR_DEPOT_DETECTION_M)
            .unwrap_or(false);
        let at_end = self
            .route
            .last_endpoint()
            .map(|p| geometry::distance_meters(p.into(), vehicle_loc.into()) <= NEAR_DEPOT_DETECTION_M)
            .unwrap_or(false);
        if !(at_start || at_end) {
            return None;
        }
        self.route.connected_depot_ids.first().cloned()
    }

    async fn execute_alighting(&self, ids: &[Uuid], vehicle_id: &str, at: DateTime<Utc>) {
        let registry = self.registry.lock().await;
        for id in ids {
            let Some(handle) = registry.get(*id) else { continue };
            let mut rider = handle.lock().await;
            if rider.alight(at).is_ok() {
                self.bus.publish(BusEvent::RiderAlighted { rider_id: *id, vehicle_id: vehicle_id.into(), timestamp: at });
            }
        }
    }

    async fn execute_boarding(
        &self,
        conductor: &mut Conductor,
        ids: &[Uuid],
        from_depot: bool,
        at: DateTime<Utc>,
    ) {
        if ids.is_empty() {
            return;
        }
        let boarded = if from_depot {
            self.depot_reservoir
                .mark_boarded(ids, &conductor.vehicle_id, at)
                .await
                .unwrap_or_default()
        } else {
            self.route_reservoir
                .mark_boarded(ids, &conductor.vehicle_id, at)
                .await
                .unwrap_or_default()
        };
        for id in &boarded {
            conductor.onboard.push(*id);
            self.bus.publish(BusEvent::RiderBoarded { rider_id: *id, vehicle_id: conductor.vehicle_id.clone(), timestamp: at });
        }
    }

    async fn start_engine_with_retry(&self, conductor: &mut Conductor) -> bool {
        for attempt in 1..=3u32 {
            match self.engine.start() {
                Ok(()) => return true,
                Err(err) => {
                    log::warn!(
                        "vehicle {} engine start attempt {attempt} failed: {err}",
                        conductor.vehicle_id
                    );
                    conductor.consecutive_failures += 1;
                    if attempt < 3 {
                        tokio::time::sleep(StdDuration::from_secs(2)).await;
                    }
                }
            }
        }
        conductor.state = ConductorState::Cleanup;
        self.bus.publish(BusEvent::SystemDegraded {
            component: conductor.vehicle_id.clone(),
            reason: "engine start failed after 3 attempts".into(),
        });
        false
    }

    async fn set_driver_state(&self, state: DriverState, engine: EngineState) {
        let mut world = self.world.lock().await;
        if let Some(mut driver) = world.get_mut::<Driver>(self.entity) {
            driver.state = state;
            driver.engine = engine;
        }
    }

    async fn write_conductor(&self, conductor: Conductor) {
        let mut world = self.world.lock().await;
        if let Some(mut slot) = world.get_mut::<Conductor>(self.entity) {
            *slot = conductor;
        }
    }

    pub async fn conductor_snapshot(&self) -> Conductor {
        let world = self.world.lock().await;
        world.get::<Conductor>(self.entity).expect("conductor component present").clone()
    }

    pub async fn driver_snapshot(&self) -> Driver {
        let world = self.world.lock().await;
        *world.get::<Driver>(self.entity).expect("driver component present")
    }
}
