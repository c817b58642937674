//! # Transit Simulation Core
//!
//! A city-scale public-transit simulation engine: a Poisson spawner turns
//! geographic inputs (zones, POIs, depots, routes) into rider spawn requests,
//! two complementary reservoirs hold waiting riders, and a per-vehicle
//! conductor/driver pair board, carry, and alight them over an event bus.
//!
//! ## Modules
//!
//! - [`domain`] — the `Rider`, `Location`, `Route`, `Depot`, `Zone`, `Poi` and
//!   `SpawnRequest` value types and entities.
//! - [`geometry`] — haversine distance, bearing, polyline snapping,
//!   point-in-polygon, grid-cell hashing.
//! - [`geo_store`] — the read-only REST client for the external geographic
//!   data store (routes, depots, POIs, landuse zones, countries).
//! - [`zone_cache`] — an RCU-style snapshot of zones/POIs near the active
//!   route set.
//! - [`spawner`] — the Poisson process that emits `SpawnRequest`s.
//! - [`spawn_coordinator`] — owns the spawner's cadence and dispatches
//!   requests into the reservoirs.
//! - [`reservoir`] — the depot FIFO reservoir and the route grid-indexed
//!   reservoir, plus shared statistics.
//! - [`expiration`] — the background sweeper that expires stale riders.
//! - [`registry`] — the central rider id → handle map shared by both
//!   reservoirs and vehicles.
//! - [`vehicle`] — the per-vehicle conductor and driver state machines.
//! - [`query_responder`] — answers a vehicle's `vehicle:query_passengers`
//!   request from the matching reservoir.
//! - [`bus`] — the event bus adapter (publish/subscribe, request/response).
//! - [`config`] — the hierarchical configuration, every knob enumerated.
//! - [`error`] — the crate's error taxonomy.
//!
//! ## Determinism
//!
//! Given a fixed PRNG seed, fixed clock, and a frozen zone/route snapshot,
//! the spawner is deterministic.

pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod expiration;
pub mod geo_store;
pub mod geometry;
pub mod query_responder;
pub mod registry;
pub mod reservoir;
pub mod spawn_coordinator;
pub mod spawner;
pub mod vehicle;
pub mod zone_cache;

pub use config::Config;
pub use error::{SimError, SimResult};
