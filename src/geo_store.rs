//! Client for the external geographic data store.
//!
//! The store itself — a headless CMS exposing POIs, landuse zones, routes and
//! depots — is an external collaborator; this module only owns the read path
//! the core depends on: a typed, paginated HTTP client in the thin
//! client-struct-plus-typed-error shape common to HTTP clients in this
//! ecosystem (`From<reqwest::Error>` included), but async rather than
//! blocking, since a reload is a genuine suspension point in a running
//! service rather than a one-shot setup step.

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{Depot, Poi, RawLocation, Route, Zone, ZoneType};
use crate::error::{SimError, SimResult};

/// Server-enforced maximum page size.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
    #[serde(default)]
    page_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    id: String,
    code: String,
    /// Ordered `[lon, lat]` pairs.
    shape_points: Vec<(f64, f64)>,
    #[serde(default = "default_activity_level")]
    activity_level: f64,
}

#[derive(Debug, Deserialize)]
struct RawDepot {
    id: String,
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default = "default_activity_level")]
    activity_level: f64,
}

#[derive(Debug, Deserialize)]
struct RawPoi {
    id: String,
    latitude: f64,
    longitude: f64,
    amenity_type: String,
    #[serde(default = "default_spawn_weight")]
    spawn_weight: f64,
}

#[derive(Debug, Deserialize)]
struct RawZone {
    id: String,
    zone_type: String,
    /// GeoJSON-style ring: a single list of `[lon, lat]` vertices.
    ring: Vec<(f64, f64)>,
    centroid_lat: f64,
    centroid_lon: f64,
    #[serde(default = "default_base_weight")]
    base_weight: f64,
}

fn default_activity_level() -> f64 {
    1.0
}

fn default_spawn_weight() -> f64 {
    1.0
}

fn default_base_weight() -> f64 {
    1.0
}

fn parse_amenity(raw: &str) -> crate::domain::PoiCategory {
    use crate::domain::PoiCategory::*;
    match raw.to_ascii_lowercase().as_str() {
        "transport" => Transport,
        "retail" => Retail,
        "food" => Food,
        "health" => Health,
        "education" => Education,
        "civic" => Civic,
        _ => Other,
    }
}

fn parse_zone_type(raw: &str) -> ZoneType {
    match raw.to_ascii_lowercase().as_str() {
        "residential" => ZoneType::Residential,
        "commercial" => ZoneType::Commercial,
        "industrial" => ZoneType::Industrial,
        "farmland" => ZoneType::Farmland,
        "grass" => ZoneType::Grass,
        "educational" => ZoneType::Educational,
        _ => ZoneType::Other,
    }
}

fn ring_to_locations(ring: &[(f64, f64)]) -> Vec<crate::domain::Location> {
    ring.iter()
        .map(|&(lon, lat)| crate::domain::Location::from(RawLocation::LatLon { lat, lon }))
        .collect()
}

/// Read path into the geographic data store. Implemented by `HttpGeoDataStore`
/// against the real service and by `StaticGeoDataStore` in tests.
#[async_trait]
pub trait GeoDataStore: Send + Sync {
    async fn fetch_routes(&self) -> SimResult<Vec<Route>>;
    async fn fetch_depots(&self) -> SimResult<Vec<Depot>>;
    async fn fetch_pois(&self) -> SimResult<Vec<Poi>>;
    async fn fetch_zones(&self) -> SimResult<Vec<Zone>>;
}

/// Thin reqwest client. Pagination is mandatory: loops `page=1..` until an
/// empty page or `page > page_count`, with `page_size` bounded at
/// `MAX_PAGE_SIZE`.
#[derive(Debug, Clone)]
pub struct HttpGeoDataStore {
    base_url: String,
    client: reqwest::Client,
    page_size: usize,
}

impl HttpGeoDataStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    async fn fetch_all_pages<T: for<'de> Deserialize<'de>>(
        &self,
        collection: &str,
    ) -> SimResult<Vec<T>> {
        let mut out = Vec::new();
        let mut page = 1usize;
        loop {
            let url = format!(
                "{}/{}?page={}&pageSize={}",
                self.base_url.trim_end_matches('/'),
                collection,
                page,
                self.page_size
            );
            let response = self.client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(SimError::data_store(format!(
                    "{collection}: unexpected status {}",
                    response.status()
                )));
            }
            let parsed: Page<T> = response.json().await?;
            let got = parsed.data.len();
            out.extend(parsed.data);
            if got == 0 {
                break;
            }
            if let Some(page_count) = parsed.page_count {
                if page >= page_count {
                    break;
                }
            }
            page += 1;
        }
        Ok(out)
    }
}

#[async_trait]
impl GeoDataStore for HttpGeoDataStore {
    async fn fetch_routes(&self) -> SimResult<Vec<Route>> {
        let raw: Vec<RawRoute> = self.fetch_all_pages("routes").await?;
        Ok(raw
            .into_iter()
            .map(|r| {
                let shape_points = r
                    .shape_points
                    .iter()
                    .map(|&(lon, lat)| crate::domain::Location::new(lat, lon))
                    .collect();
                Route::new(r.id, r.code, shape_points, r.activity_level)
            })
            .collect())
    }

    async fn fetch_depots(&self) -> SimResult<Vec<Depot>> {
        let raw: Vec<RawDepot> = self.fetch_all_pages("depots").await?;
        Ok(raw
            .into_iter()
            .map(|d| {
                Depot::new(
                    d.id,
                    d.name,
                    crate::domain::Location::new(d.latitude, d.longitude),
                    d.activity_level,
                )
            })
            .collect())
    }

    async fn fetch_pois(&self) -> SimResult<Vec<Poi>> {
        let raw: Vec<RawPoi> = self.fetch_all_pages("pois").await?;
        Ok(raw
            .into_iter()
            .map(|p| Poi {
                id: p.id,
                location: crate::domain::Location::new(p.latitude, p.longitude),
                category: parse_amenity(&p.amenity_type),
                attraction_factor: p.spawn_weight,
            })
            .collect())
    }

    async fn fetch_zones(&self) -> SimResult<Vec<Zone>> {
        let raw: Vec<RawZone> = self.fetch_all_pages("landuse_zones").await?;
        Ok(raw
            .into_iter()
            .map(|z| {
                let ring = ring_to_locations(&z.ring);
                let lats = ring.iter().map(|l| l.lat);
                let lons = ring.iter().map(|l| l.lon);
                let min = crate::domain::Location::new(
                    lats.clone().fold(f64::INFINITY, f64::min),
                    lons.clone().fold(f64::INFINITY, f64::min),
                );
                let max = crate::domain::Location::new(
                    lats.fold(f64::NEG_INFINITY, f64::max),
                    lons.fold(f64::NEG_INFINITY, f64::max),
                );
                Zone {
                    id: z.id,
                    zone_type: parse_zone_type(&z.zone_type),
                    ring,
                    centroid: crate::domain::Location::new(z.centroid_lat, z.centroid_lon),
                    bbox: (min, max),
                    base_weight: z.base_weight,
                    time_multipliers: [1.0; 24],
                }
            })
            .collect())
    }
}

/// An in-memory fixed snapshot, used by tests and by anything that wants to
/// drive the spawner without a live HTTP dependency.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoDataStore {
    pub routes: Vec<Route>,
    pub depots: Vec<Depot>,
    pub pois: Vec<Poi>,
    pub zones: Vec<Zone>,
}

#[async_trait]
impl GeoDataStore for StaticGeoDataStore {
    async fn fetch_routes(&self) -> SimResult<Vec<Route>> {
        Ok(self.routes.clone())
    }

    async fn fetch_depots(&self) -> SimResult<Vec<Depot>> {
        Ok(self.depots.clone())
    }

    async fn fetch_pois(&self) -> SimResult<Vec<Poi>> {
        Ok(self.pois.clone())
    }

    async fn fetch_zones(&self) -> SimResult<Vec<Zone>> {
        Ok(self.zones.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Location;

    #[tokio::test]
    async fn static_store_round_trips_fixtures() {
        let store = StaticGeoDataStore {
            routes: vec![Route::new(
                "1A".into(),
                "1A".into(),
                vec![Location::new(13.3194, -59.6369), Location::new(13.2943, -59.6430)],
                1.0,
            )],
            ..Default::default()
        };
        let routes = store.fetch_routes().await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].id, "1A");
    }
}
