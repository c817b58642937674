//! `SpawnRequest` — the output of a single Poisson draw, before it becomes a `Rider`.

use super::location::Location;
use super::rider::Direction;

#[derive(Debug, Clone, PartialEq)]
pub enum SpawnSource {
    Depot(String),
    Route { zone_id: Option<String>, poi_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub origin: Location,
    pub destination: Location,
    pub route_id: String,
    pub direction: Direction,
    pub source: SpawnSource,
}
