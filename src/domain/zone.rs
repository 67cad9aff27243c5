//! Zone model - circle or polygon geofence
//!
//! A `Zone` is an immutable, validated value. Edits produce a new `Zone`.
//! The serde representation is the persisted record format:
//!
//! ```json
//! {"kind":"circle","center":{"lat":4.711,"lng":-74.0721},"radiusMeters":500.0}
//! {"kind":"polygon","vertices":[{"lat":0.0,"lng":0.0}, ...]}
//! ```
//!
//! Deserialization runs the same validation as the constructors, so a
//! record that parses is a valid zone.

use crate::domain::error::{GeofenceError, Result};
use crate::domain::geo::{distance_meters, point_in_polygon, BoundingRegion, Point, EARTH_RADIUS_M};
use serde::{Deserialize, Serialize};

/// Minimum number of polygon vertices
pub const MIN_POLYGON_VERTICES: usize = 3;

/// Circular zone
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    center: Point,
    radius_meters: f64,
}

impl Circle {
    pub fn center(&self) -> Point {
        self.center
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }
}

/// Polygonal zone (may be self-intersecting)
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }
}

/// A geofence zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ZoneRecord", into = "ZoneRecord")]
pub enum Zone {
    Circle(Circle),
    Polygon(Polygon),
}

impl Zone {
    /// Build a circle zone; fails with `InvalidRadius` when radius <= 0
    pub fn circle(center: Point, radius_meters: f64) -> Result<Self> {
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(GeofenceError::InvalidRadius(radius_meters));
        }
        Ok(Zone::Circle(Circle { center, radius_meters }))
    }

    /// Build a circle zone from raw coordinates
    pub fn circle_at(lat: f64, lng: f64, radius_meters: f64) -> Result<Self> {
        Self::circle(Point::new(lat, lng)?, radius_meters)
    }

    /// Build a polygon zone; vertices are kept in insertion order
    pub fn polygon(vertices: Vec<Point>) -> Result<Self> {
        if vertices.len() < MIN_POLYGON_VERTICES {
            return Err(GeofenceError::InsufficientVertices(vertices.len()));
        }
        Ok(Zone::Polygon(Polygon { vertices }))
    }

    /// Build a polygon zone from raw `(lat, lng)` pairs
    pub fn polygon_from_coords(coords: &[(f64, f64)]) -> Result<Self> {
        let vertices =
            coords.iter().map(|&(lat, lng)| Point::new(lat, lng)).collect::<Result<Vec<_>>>()?;
        Self::polygon(vertices)
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Zone::Circle(_) => "circle",
            Zone::Polygon(_) => "polygon",
        }
    }

    /// Containment test
    ///
    /// Circles include their boundary; polygons exclude it (see
    /// `point_in_polygon`).
    pub fn contains(&self, p: Point) -> bool {
        match self {
            Zone::Circle(c) => distance_meters(c.center, p) <= c.radius_meters,
            // Vertex count is guaranteed by construction, so this cannot fail
            Zone::Polygon(poly) => point_in_polygon(p, &poly.vertices).unwrap_or(false),
        }
    }

    /// Smallest lat/lng box enclosing the zone
    pub fn bounding_region(&self) -> BoundingRegion {
        match self {
            Zone::Circle(c) => circle_bounds(c),
            Zone::Polygon(poly) => {
                let first = poly.vertices[0];
                let init = BoundingRegion {
                    min_lat: first.lat(),
                    max_lat: first.lat(),
                    min_lng: first.lng(),
                    max_lng: first.lng(),
                };
                poly.vertices.iter().skip(1).fold(init, |mut b, v| {
                    b.min_lat = b.min_lat.min(v.lat());
                    b.max_lat = b.max_lat.max(v.lat());
                    b.min_lng = b.min_lng.min(v.lng());
                    b.max_lng = b.max_lng.max(v.lng());
                    b
                })
            }
        }
    }
}

/// Center +/- angular radius, longitude widened by 1/cos(lat)
fn circle_bounds(c: &Circle) -> BoundingRegion {
    let angular = c.radius_meters / EARTH_RADIUS_M;
    let dlat = angular.to_degrees();
    let lat = c.center.lat();
    let lng = c.center.lng();

    let min_lat = (lat - dlat).max(-90.0);
    let max_lat = (lat + dlat).min(90.0);

    // Circle reaches a pole: every meridian passes through it
    if min_lat <= -90.0 || max_lat >= 90.0 {
        return BoundingRegion { min_lat, max_lat, min_lng: -180.0, max_lng: 180.0 };
    }

    let dlng = (angular.sin() / lat.to_radians().cos()).min(1.0).asin().to_degrees();
    BoundingRegion {
        min_lat,
        max_lat,
        min_lng: (lng - dlng).max(-180.0),
        max_lng: (lng + dlng).min(180.0),
    }
}

/// Unit for radius input from forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadiusUnit {
    #[default]
    Meters,
    Kilometers,
}

impl RadiusUnit {
    pub fn to_meters(&self, value: f64) -> f64 {
        match self {
            RadiusUnit::Meters => value,
            RadiusUnit::Kilometers => value * 1000.0,
        }
    }
}

impl std::str::FromStr for RadiusUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "m" | "meters" | "metres" => Ok(RadiusUnit::Meters),
            "km" | "kilometers" | "kilometres" => Ok(RadiusUnit::Kilometers),
            other => Err(format!("unknown radius unit {other:?} (expected m or km)")),
        }
    }
}

/// Parse a free-text radius field in the given unit
pub fn parse_radius(input: &str, unit: RadiusUnit) -> Result<f64> {
    let value: f64 = input.trim().parse().map_err(|_| GeofenceError::InvalidRadius(f64::NAN))?;
    let meters = unit.to_meters(value);
    if !meters.is_finite() || meters <= 0.0 {
        return Err(GeofenceError::InvalidRadius(meters));
    }
    Ok(meters)
}

/// Vertex accumulator for click-to-add polygon drawing
#[derive(Debug, Clone, Default)]
pub struct PolygonDraft {
    vertices: Vec<Point>,
}

impl PolygonDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, vertex: Point) {
        self.vertices.push(vertex);
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Enough vertices to close the ring
    pub fn can_close(&self) -> bool {
        self.vertices.len() >= MIN_POLYGON_VERTICES
    }

    /// Close the draft into a zone, leaving the draft empty on success
    pub fn finish(&mut self) -> Result<Zone> {
        if !self.can_close() {
            return Err(GeofenceError::InsufficientVertices(self.vertices.len()));
        }
        Zone::polygon(std::mem::take(&mut self.vertices))
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
    }
}

/// Persisted record shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum TaggedRecord {
    Circle {
        center: Point,
        #[serde(rename = "radiusMeters")]
        radius_meters: f64,
    },
    Polygon {
        vertices: Vec<Point>,
    },
}

/// Untagged circle written by earlier versions of the zone editor
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyCircleRecord {
    center: Point,
    radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ZoneRecord {
    Tagged(TaggedRecord),
    #[serde(skip_serializing)]
    LegacyCircle(LegacyCircleRecord),
}

impl TryFrom<ZoneRecord> for Zone {
    type Error = GeofenceError;

    fn try_from(record: ZoneRecord) -> Result<Self> {
        match record {
            ZoneRecord::Tagged(TaggedRecord::Circle { center, radius_meters }) => {
                Zone::circle(center, radius_meters)
            }
            ZoneRecord::Tagged(TaggedRecord::Polygon { vertices }) => Zone::polygon(vertices),
            ZoneRecord::LegacyCircle(LegacyCircleRecord { center, radius }) => {
                Zone::circle(center, radius)
            }
        }
    }
}

impl From<Zone> for ZoneRecord {
    fn from(zone: Zone) -> Self {
        match zone {
            Zone::Circle(c) => ZoneRecord::Tagged(TaggedRecord::Circle {
                center: c.center,
                radius_meters: c.radius_meters,
            }),
            Zone::Polygon(p) => ZoneRecord::Tagged(TaggedRecord::Polygon { vertices: p.vertices }),
        }
    }
}
