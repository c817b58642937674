//! `Depot` — a terminus or hub.

use serde::{Deserialize, Serialize};

use super::location::Location;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Depot {
    pub id: String,
    pub name: String,
    pub location: Location,
    pub activity_level: f64,
    pub connected_route_ids: Vec<String>,
}

impl Depot {
    pub fn new(id: String, name: String, location: Location, activity_level: f64) -> Self {
        Self {
            id,
            name,
            location,
            activity_level: activity_level.clamp(0.5, 2.0),
            connected_route_ids: Vec::new(),
        }
    }
}
