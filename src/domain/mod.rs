//! Data model: the plain value types and entities shared across the crate.

pub mod depot;
pub mod location;
pub mod poi;
pub mod rider;
pub mod route;
pub mod spawn_request;
pub mod zone;

pub use depot::Depot;
pub use location::{Location, RawLocation};
pub use poi::{Poi, PoiCategory};
pub use rider::{Direction, Rider, RiderHome, RiderState};
pub use route::{derive_connectivity, Route};
pub use spawn_request::{SpawnRequest, SpawnSource};
pub use zone::{Zone, ZoneType};
