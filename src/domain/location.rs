//! `Location` — the single internal value type for a geographic point.
//!
//! External callers (the data store, the event bus) send locations in three
//! different shapes. `RawLocation` accepts all three at deserialization time;
//! everywhere else in the crate only ever sees `Location`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl From<Location> for crate::geometry::Location {
    fn from(loc: Location) -> Self {
        crate::geometry::Location::new(loc.lat, loc.lon)
    }
}

impl From<crate::geometry::Location> for Location {
    fn from(loc: crate::geometry::Location) -> Self {
        Location::new(loc.lat, loc.lon)
    }
}

/// Wire shapes accepted at the data-store and bus boundary. Untagged so that
/// any of the three shapes parses without a discriminator field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawLocation {
    Tuple((f64, f64)),
    LatLon { lat: f64, lon: f64 },
    LatitudeLongitude { latitude: f64, longitude: f64 },
}

impl From<RawLocation> for Location {
    fn from(raw: RawLocation) -> Self {
        match raw {
            RawLocation::Tuple((lat, lon)) => Location::new(lat, lon),
            RawLocation::LatLon { lat, lon } => Location::new(lat, lon),
            RawLocation::LatitudeLongitude { latitude, longitude } => {
                Location::new(latitude, longitude)
            }
        }
    }
}
