//! `Zone` — a landuse polygon with type, weight, and hourly multipliers.

use serde::{Deserialize, Serialize};

use super::location::Location;
use crate::geometry::{self, BoundingBox};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneType {
    Residential,
    Commercial,
    Industrial,
    Farmland,
    Grass,
    Educational,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub zone_type: ZoneType,
    pub ring: Vec<Location>,
    pub centroid: Location,
    pub bbox: (Location, Location),
    pub base_weight: f64,
    /// Hourly multipliers, `[0..23]`.
    pub time_multipliers: [f64; 24],
}

impl Zone {
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            min: self.bbox.0.into(),
            max: self.bbox.1.into(),
        }
    }

    pub fn contains(&self, p: Location) -> bool {
        geometry::point_in_polygon(p.into(), &self.ring.iter().map(|&l| l.into()).collect::<Vec<_>>())
    }

    pub fn time_multiplier(&self, hour_of_day: usize) -> f64 {
        self.time_multipliers.get(hour_of_day % 24).copied().unwrap_or(1.0)
    }

    /// Is this a degenerate polygon (fewer than 3 vertices)? Such zones are
    /// skipped entirely by the spawner rather than causing an error.
    pub fn is_degenerate(&self) -> bool {
        self.ring.len() < 3
    }
}
