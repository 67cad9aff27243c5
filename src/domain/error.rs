//! Error taxonomy for zone construction, lookup and position sources

use thiserror::Error;

/// Errors surfaced by the geofence core
///
/// Construction failures are always returned to the caller. Malformed
/// persisted zones and malformed position samples never reach this type:
/// they are recovered from silently (absence / dropped sample).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeofenceError {
    #[error("invalid point: lat={lat}, lng={lng}")]
    InvalidPoint { lat: f64, lng: f64 },

    #[error("invalid radius: {0} (must be a finite value > 0 meters)")]
    InvalidRadius(f64),

    #[error("polygon needs at least 3 vertices, got {0}")]
    InsufficientVertices(usize),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("address not found: {0:?}")]
    AddressNotFound(String),

    #[error("position source unavailable: {0}")]
    PositionSourceUnavailable(String),

    /// Transport or decoding failure talking to the geocoding service
    #[error("geocoding failed: {0}")]
    Geocoding(String),
}

pub type Result<T> = std::result::Result<T, GeofenceError>;
