//! Zone cache: an in-memory snapshot of zones and POIs within
//! `buffer_km` of the active route set, refreshed on demand.
//!
//! RCU-style: readers take a cheap `Arc` clone of the current snapshot under
//! a `RwLock` and never block a writer; the writer builds a whole new
//! snapshot off to the side and swaps it in atomically. A plain
//! `RwLock<Arc<T>>` is enough here, without reaching for an extra
//! `arc_swap` dependency, because reloads are infrequent relative to reads.

use std::sync::{Arc, RwLock};

use crate::domain::{Location, Poi, Route, Zone};
use crate::error::SimResult;
use crate::geo_store::GeoDataStore;
use crate::geometry;

#[derive(Debug, Clone, Default)]
pub struct ZoneSnapshot {
    pub zones: Vec<Zone>,
    pub pois: Vec<Poi>,
}

/// Inflated bounding box (in degrees) around a set of routes, used as the
/// cheap prefilter before the precise distance test.
fn inflated_bbox(routes: &[Route], buffer_km: f64) -> Option<(Location, Location)> {
    let mut min: Option<Location> = None;
    let mut max: Option<Location> = None;
    for route in routes {
        for p in &route.shape_points {
            min = Some(match min {
                None => *p,
                Some(m) => Location::new(m.lat.min(p.lat), m.lon.min(p.lon)),
            });
            max = Some(match max {
                None => *p,
                Some(m) => Location::new(m.lat.max(p.lat), m.lon.max(p.lon)),
            });
        }
    }
    let (min, max) = (min?, max?);
    // ~1 degree of latitude is ~111.2 km; inflate both axes by buffer_km.
    let pad_lat = buffer_km / 111.2;
    let mean_lat = (min.lat + max.lat) / 2.0;
    let pad_lon = buffer_km / (111.2 * mean_lat.to_radians().cos().abs().max(1e-6));
    Some((
        Location::new(min.lat - pad_lat, min.lon - pad_lon),
        Location::new(max.lat + pad_lat, max.lon + pad_lon),
    ))
}

fn within_buffer_of_routes(p: Location, routes: &[Route], buffer_m: f64) -> bool {
    routes.iter().any(|route| {
        route
            .shape_points
            .iter()
            .any(|&shape_point| geometry::distance_meters(p.into(), shape_point.into()) <= buffer_m)
    })
}

/// Holds the current filtered snapshot and knows how to refresh it.
pub struct ZoneCache {
    buffer_km: f64,
    snapshot: RwLock<Arc<ZoneSnapshot>>,
}

impl ZoneCache {
    pub fn new(buffer_km: f64) -> Self {
        Self {
            buffer_km,
            snapshot: RwLock::new(Arc::new(ZoneSnapshot::default())),
        }
    }

    /// Fetch from the data store, filter by bbox then by precise
    /// route-proximity, and atomically swap the snapshot in. On any failure
    /// the previous snapshot is retained and a warning is logged — the
    /// spawner must never block on a reload.
    pub async fn reload(&self, active_routes: &[Route], store: &dyn GeoDataStore) {
        match self.try_reload(active_routes, store).await {
            Ok(snapshot) => {
                *self.snapshot.write().expect("zone cache lock poisoned") = Arc::new(snapshot);
                log::debug!(
                    "zone cache reloaded: {} zones, {} pois near {} routes",
                    self.current().zones.len(),
                    self.current().pois.len(),
                    active_routes.len()
                );
            }
            Err(err) => {
                log::warn!("zone cache reload failed, retaining previous snapshot: {err}");
            }
        }
    }

    async fn try_reload(
        &self,
        active_routes: &[Route],
        store: &dyn GeoDataStore,
    ) -> SimResult<ZoneSnapshot> {
        let buffer_m = self.buffer_km * 1000.0;
        let bbox = inflated_bbox(active_routes, self.buffer_km);

        let (all_zones, all_pois) = (store.fetch_zones().await?, store.fetch_pois().await?);

        let Some((bbox_min, bbox_max)) = bbox else {
            return Ok(ZoneSnapshot::default());
        };
        let bbox = geometry::BoundingBox {
            min: bbox_min.into(),
            max: bbox_max.into(),
        };

        let zones = all_zones
            .into_iter()
            .filter(|z| !z.is_degenerate())
            .filter(|z| geometry::bbox_contains(bbox, z.centroid.into()))
            .filter(|z| within_buffer_of_routes(z.centroid, active_routes, buffer_m))
            .collect();

        let pois = all_pois
            .into_iter()
            .filter(|p| geometry::bbox_contains(bbox, p.location.into()))
            .filter(|p| within_buffer_of_routes(p.location, active_routes, buffer_m))
            .collect();

        Ok(ZoneSnapshot { zones, pois })
    }

    /// Cheap `Arc` clone of the current snapshot.
    pub fn current(&self) -> Arc<ZoneSnapshot> {
        self.snapshot.read().expect("zone cache lock poisoned").clone()
    }

    /// Zones within `radius_m` of `point`, bbox-prefiltered then precise.
    pub fn zones_near(&self, point: Location, radius_m: f64) -> Vec<Zone> {
        let snapshot = self.current();
        snapshot
            .zones
            .iter()
            .filter(|z| geometry::distance_meters(point.into(), z.centroid.into()) <= radius_m)
            .cloned()
            .collect()
    }

    pub fn pois_near(&self, point: Location, radius_m: f64) -> Vec<Poi> {
        let snapshot = self.current();
        snapshot
            .pois
            .iter()
            .filter(|p| geometry::distance_meters(point.into(), p.location.into()) <= radius_m)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_store::StaticGeoDataStore;
    use crate::domain::ZoneType;

    fn route_1a() -> Route {
        Route::new(
            "1A".into(),
            "1A".into(),
            vec![Location::new(13.3194, -59.6369), Location::new(13.2943, -59.6430)],
            1.0,
        )
    }

    fn zone_near_route(id: &str, lat: f64, lon: f64) -> Zone {
        Zone {
            id: id.into(),
            zone_type: ZoneType::Residential,
            ring: vec![
                Location::new(lat - 0.001, lon - 0.001),
                Location::new(lat - 0.001, lon + 0.001),
                Location::new(lat + 0.001, lon + 0.001),
                Location::new(lat + 0.001, lon - 0.001),
            ],
            centroid: Location::new(lat, lon),
            bbox: (Location::new(lat - 0.001, lon - 0.001), Location::new(lat + 0.001, lon + 0.001)),
            base_weight: 1.0,
            time_multipliers: [1.0; 24],
        }
    }

    #[tokio::test]
    async fn reload_keeps_zones_near_active_routes_only() {
        let cache = ZoneCache::new(5.0);
        let route = route_1a();
        let store = StaticGeoDataStore {
            routes: vec![route.clone()],
            zones: vec![
                zone_near_route("near", 13.31, -59.637),
                zone_near_route("far", 0.0, 0.0),
            ],
            ..Default::default()
        };
        cache.reload(&[route], &store).await;
        let snapshot = cache.current();
        assert_eq!(snapshot.zones.len(), 1);
        assert_eq!(snapshot.zones[0].id, "near");
    }

    #[tokio::test]
    async fn reload_skips_degenerate_zones() {
        let cache = ZoneCache::new(5.0);
        let route = route_1a();
        let mut degenerate = zone_near_route("degenerate", 13.31, -59.637);
        degenerate.ring = vec![Location::new(13.31, -59.637)];
        let store = StaticGeoDataStore {
            routes: vec![route.clone()],
            zones: vec![degenerate],
            ..Default::default()
        };
        cache.reload(&[route], &store).await;
        assert!(cache.current().zones.is_empty());
    }

    #[tokio::test]
    async fn reload_failure_retains_previous_snapshot() {
        struct FailingStore;
        #[async_trait::async_trait]
        impl GeoDataStore for FailingStore {
            async fn fetch_routes(&self) -> SimResult<Vec<Route>> {
                Ok(vec![])
            }
            async fn fetch_depots(&self) -> SimResult<Vec<crate::domain::Depot>> {
                Ok(vec![])
            }
            async fn fetch_pois(&self) -> SimResult<Vec<Poi>> {
                Err(crate::error::SimError::data_store("boom"))
            }
            async fn fetch_zones(&self) -> SimResult<Vec<Zone>> {
                Ok(vec![])
            }
        }

        let cache = ZoneCache::new(5.0);
        let route = route_1a();
        let good_store = StaticGeoDataStore {
            routes: vec![route.clone()],
            zones: vec![zone_near_route("near", 13.31, -59.637)],
            ..Default::default()
        };
        cache.reload(&[route.clone()], &good_store).await;
        assert_eq!(cache.current().zones.len(), 1);

        cache.reload(&[route], &FailingStore).await;
        assert_eq!(cache.current().zones.len(), 1, "previous snapshot retained");
    }
}
