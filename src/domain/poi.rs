//! `POI` — a point of interest used to modulate local demand.

use serde::{Deserialize, Serialize};

use super::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoiCategory {
    Transport,
    Retail,
    Food,
    Health,
    Education,
    Civic,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub location: Location,
    pub category: PoiCategory,
    pub attraction_factor: f64,
}
