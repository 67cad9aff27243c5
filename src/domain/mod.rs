//! Domain models - geometry, zones and containment types
//!
//! - `geo` - points, great-circle distance, point-in-polygon
//! - `zone` - circle/polygon zone model, validation, persisted record format
//! - `types` - position samples, containment state, transition events
//! - `error` - error taxonomy

pub mod error;
pub mod geo;
pub mod types;
pub mod zone;

// Re-export commonly used types at module level
pub use error::GeofenceError;
pub use geo::{distance_meters, point_in_polygon, BoundingRegion, Point};
pub use types::{
    ContainmentState, PositionEvent, PositionSample, TrackedPosition, TransitionCause,
    TransitionEvent,
};
pub use zone::{PolygonDraft, RadiusUnit, Zone};
