//! `Route` — an ordered polyline with a single forward ("outbound") direction.

use serde::{Deserialize, Serialize};

use super::depot::Depot;
use super::location::Location;
use crate::geometry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub code: String,
    pub shape_points: Vec<Location>,
    pub activity_level: f64,
    /// Depot ids connected to this route (endpoint within `depot_connectivity_m`).
    pub connected_depot_ids: Vec<String>,
}

impl Route {
    pub fn new(id: String, code: String, shape_points: Vec<Location>, activity_level: f64) -> Self {
        Self {
            id,
            code,
            shape_points,
            activity_level: activity_level.clamp(0.5, 2.0),
            connected_depot_ids: Vec::new(),
        }
    }

    /// Total polyline length in meters.
    pub fn length_m(&self) -> f64 {
        self.shape_points
            .windows(2)
            .map(|pair| {
                geometry::distance_meters(
                    geometry::Location::from(pair[0]),
                    geometry::Location::from(pair[1]),
                )
            })
            .sum()
    }

    pub fn first_endpoint(&self) -> Option<Location> {
        self.shape_points.first().copied()
    }

    pub fn last_endpoint(&self) -> Option<Location> {
        self.shape_points.last().copied()
    }

    /// Recompute `connected_depot_ids` from scratch: a depot is connected iff
    /// one of the route's two endpoints lies within `connectivity_m` of it.
    pub fn recompute_connected_depots(
        &mut self,
        depots: &[(String, Location)],
        connectivity_m: f64,
    ) {
        let endpoints = [self.first_endpoint(), self.last_endpoint()];
        self.connected_depot_ids = depots
            .iter()
            .filter(|(_, loc)| {
                endpoints.iter().flatten().any(|endpoint| {
                    geometry::distance_meters((*endpoint).into(), (*loc).into()) <= connectivity_m
                })
            })
            .map(|(id, _)| id.clone())
            .collect();
    }
}

/// Derive depot<->route connectivity both ways from the 500 m endpoint test,
/// once per loaded snapshot. Populates every route's `connected_depot_ids`
/// and, symmetrically, every depot's `connected_route_ids`.
pub fn derive_connectivity(routes: &mut [Route], depots: &mut [Depot], connectivity_m: f64) {
    let depot_locations: Vec<(String, Location)> =
        depots.iter().map(|d| (d.id.clone(), d.location)).collect();
    for route in routes.iter_mut() {
        route.recompute_connected_depots(&depot_locations, connectivity_m);
    }
    for depot in depots.iter_mut() {
        depot.connected_route_ids = routes
            .iter()
            .filter(|route| route.connected_depot_ids.iter().any(|id| id == &depot.id))
            .map(|route| route.id.clone())
            .collect();
    }
}
