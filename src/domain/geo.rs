//! Geometry primitives
//!
//! Points are WGS-84 latitude/longitude in degrees. Distances use a
//! spherical earth (haversine). Polygon containment treats longitude as x
//! and latitude as y, which is fine at city scale but wrong near the poles
//! and across the antimeridian.

use crate::domain::error::{GeofenceError, Result};
use serde::{Deserialize, Serialize};

/// Mean earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Absolute tolerance on the edge cross product for the on-edge check
///
/// The cross product scales with edge length, so the perpendicular distance
/// treated as "on the edge" is about `1e-12 / edge_length` degrees.
const BOUNDARY_EPSILON: f64 = 1e-12;

/// A validated geographic point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint")]
pub struct Point {
    lat: f64,
    lng: f64,
}

/// Unvalidated wire shape of a point
#[derive(Debug, Clone, Copy, Deserialize)]
struct RawPoint {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawPoint> for Point {
    type Error = GeofenceError;

    fn try_from(raw: RawPoint) -> Result<Self> {
        Point::new(raw.lat, raw.lng)
    }
}

impl Point {
    /// Create a point, rejecting non-finite or out-of-range coordinates
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        let lat_ok = lat.is_finite() && (-90.0..=90.0).contains(&lat);
        let lng_ok = lng.is_finite() && (-180.0..=180.0).contains(&lng);
        if lat_ok && lng_ok {
            Ok(Self { lat, lng })
        } else {
            Err(GeofenceError::InvalidPoint { lat, lng })
        }
    }

    #[inline]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    #[inline]
    pub fn lng(&self) -> f64 {
        self.lng
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.5}, {:.5})", self.lat, self.lng)
    }
}

/// Axis-aligned lat/lng box
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingRegion {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingRegion {
    pub fn contains(&self, p: Point) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lng >= self.min_lng
            && p.lng <= self.max_lng
    }
}

/// Great-circle distance between two points (haversine)
pub fn distance_meters(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Clamp guards asin against rounding just above 1.0 for antipodal points
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Even-odd ray casting test
///
/// Boundary rule: a point exactly on an edge (vertices included) is
/// outside. The on-edge check runs first so the answer does not depend on
/// vertex orientation or on which edge the ray happens to graze.
pub fn point_in_polygon(p: Point, vertices: &[Point]) -> Result<bool> {
    if vertices.len() < 3 {
        return Err(GeofenceError::InvalidGeometry(format!(
            "point_in_polygon needs at least 3 vertices, got {}",
            vertices.len()
        )));
    }

    let (x, y) = (p.lng, p.lat);
    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].lng, vertices[i].lat);
        let (xj, yj) = (vertices[j].lng, vertices[j].lat);

        if on_segment(x, y, xi, yi, xj, yj) {
            return Ok(false);
        }

        if (yi > y) != (yj > y) {
            let x_cross = (xj - xi) * (y - yi) / (yj - yi) + xi;
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    Ok(inside)
}

/// True when (x, y) lies on the closed segment (x1, y1)-(x2, y2)
fn on_segment(x: f64, y: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
    let cross = (x2 - x1) * (y - y1) - (y2 - y1) * (x - x1);
    if cross.abs() > BOUNDARY_EPSILON {
        return false;
    }
    x >= x1.min(x2) && x <= x1.max(x2) && y >= y1.min(y2) && y <= y1.max(y2)
}
