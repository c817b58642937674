//! Geometry utilities: pure functions, deterministic, no I/O.
//!
//! Distances are in meters, lat/lon in degrees (WGS84). Haversine uses the
//! mean Earth radius (6 371 000 m). Polyline snapping projects onto the
//! local equirectangular tangent plane at the segment midpoint latitude,
//! which is accurate to well under a meter for segments up to ~50 km.

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Haversine distance between two points, in meters.
pub fn distance_meters(a: Location, b: Location) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` to `b`, in degrees `[0, 360)`.
pub fn bearing_degrees(a: Location, b: Location) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let theta = y.atan2(x).to_degrees();
    (theta + 360.0) % 360.0
}

/// Result of projecting a point onto a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    pub point: Location,
    pub segment_index: usize,
    /// Fraction along the segment, `[0, 1]`.
    pub t: f64,
    /// Cumulative distance along the whole polyline to the snapped point, meters.
    pub distance_along_m: f64,
}

/// Project `p` onto the local equirectangular tangent plane at `ref_lat`,
/// returning `(x, y)` in meters relative to `origin`.
fn to_local_xy(p: Location, origin: Location, ref_lat: f64) -> (f64, f64) {
    let lat_rad = ref_lat.to_radians();
    let x = (p.lon - origin.lon).to_radians() * lat_rad.cos() * EARTH_RADIUS_M;
    let y = (p.lat - origin.lat).to_radians() * EARTH_RADIUS_M;
    (x, y)
}

/// Nearest perpendicular foot of `p` onto `polyline`. Ties (equal distance
/// between two segments) are broken by lower segment index.
///
/// Returns `None` for a polyline with fewer than 2 points.
pub fn snap_to_polyline(p: Location, polyline: &[Location]) -> Option<SnapResult> {
    if polyline.len() < 2 {
        return None;
    }

    let mut cumulative_m = vec![0.0; polyline.len()];
    for i in 1..polyline.len() {
        cumulative_m[i] = cumulative_m[i - 1] + distance_meters(polyline[i - 1], polyline[i]);
    }

    let mut best: Option<(f64, usize, f64, Location)> = None;

    for i in 0..polyline.len() - 1 {
        let a = polyline[i];
        let b = polyline[i + 1];
        let ref_lat = (a.lat + b.lat) / 2.0;

        let (ax, ay) = to_local_xy(a, a, ref_lat);
        let (bx, by) = to_local_xy(b, a, ref_lat);
        let (px, py) = to_local_xy(p, a, ref_lat);

        let dx = bx - ax;
        let dy = by - ay;
        let seg_len_sq = dx * dx + dy * dy;

        let t = if seg_len_sq <= f64::EPSILON {
            0.0
        } else {
            (((px - ax) * dx) + ((py - ay) * dy)) / seg_len_sq
        }
        .clamp(0.0, 1.0);

        let foot_x = ax + t * dx;
        let foot_y = ay + t * dy;
        let dist_sq = (px - foot_x).powi(2) + (py - foot_y).powi(2);

        // Convert the local-plane foot back to lat/lon via linear interpolation
        // along the original segment (equivalent for short segments).
        let foot = Location::new(a.lat + t * (b.lat - a.lat), a.lon + t * (b.lon - a.lon));

        let better = match best {
            None => true,
            Some((best_dist_sq, _, _, _)) => dist_sq < best_dist_sq - 1e-9,
        };
        if better {
            best = Some((dist_sq, i, t, foot));
        }
    }

    best.map(|(_, segment_index, t, point)| {
        let seg_len = distance_meters(polyline[segment_index], polyline[segment_index + 1]);
        SnapResult {
            point,
            segment_index,
            t,
            distance_along_m: cumulative_m[segment_index] + t * seg_len,
        }
    })
}

/// Ray-casting point-in-polygon test. The boundary counts as inside.
pub fn point_in_polygon(p: Location, ring: &[Location]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];

        // Boundary check (inclusive of edges).
        if on_segment(p, a, b) {
            return true;
        }

        if (a.lat > p.lat) != (b.lat > p.lat) {
            let x_at_lat = a.lon + (p.lat - a.lat) / (b.lat - a.lat) * (b.lon - a.lon);
            if p.lon < x_at_lat {
                inside = !inside;
            }
        }
    }
    inside
}

fn on_segment(p: Location, a: Location, b: Location) -> bool {
    let cross = (b.lat - a.lat) * (p.lon - a.lon) - (b.lon - a.lon) * (p.lat - a.lat);
    if cross.abs() > 1e-9 {
        return false;
    }
    let within_lat = p.lat >= a.lat.min(b.lat) - 1e-12 && p.lat <= a.lat.max(b.lat) + 1e-12;
    let within_lon = p.lon >= a.lon.min(b.lon) - 1e-12 && p.lon <= a.lon.max(b.lon) + 1e-12;
    within_lat && within_lon
}

/// `(floor(lat/c), floor(lon/c))` cell index.
pub type GridCell = (i64, i64);

/// Degree-aligned grid cell `(floor(lat/c), floor(lon/c))`. Ties at cell
/// boundaries resolve to the lower-indexed cell because `floor` is used
/// directly rather than rounding.
pub fn grid_cell_of(p: Location, cell_size_degrees: f64) -> GridCell {
    (
        (p.lat / cell_size_degrees).floor() as i64,
        (p.lon / cell_size_degrees).floor() as i64,
    )
}

/// Point at `distance_m` along `polyline` from its start, clamped to the
/// polyline's own length. `None` for a polyline with fewer than 2 points.
pub fn point_at_distance_along(polyline: &[Location], distance_m: f64) -> Option<Location> {
    if polyline.len() < 2 {
        return None;
    }
    let mut remaining = distance_m.max(0.0);
    for pair in polyline.windows(2) {
        let seg_len = distance_meters(pair[0], pair[1]);
        if seg_len <= 0.0 {
            continue;
        }
        if remaining <= seg_len {
            let t = (remaining / seg_len).clamp(0.0, 1.0);
            return Some(Location::new(
                pair[0].lat + t * (pair[1].lat - pair[0].lat),
                pair[0].lon + t * (pair[1].lon - pair[0].lon),
            ));
        }
        remaining -= seg_len;
    }
    polyline.last().copied()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Location,
    pub max: Location,
}

/// Inclusive bounding-box containment test.
pub fn bbox_contains(bbox: BoundingBox, p: Location) -> bool {
    p.lat >= bbox.min.lat && p.lat <= bbox.max.lat && p.lon >= bbox.min.lon && p.lon <= bbox.max.lon
}
