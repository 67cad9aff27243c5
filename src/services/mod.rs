//! Services - containment logic and zone lifecycle
//!
//! This module contains the core services:
//! - `tracker` - Containment state machine and transition egress
//! - `zone_session` - Create, edit, save and delete the active zone
//! - `zone_watcher` - Follows the persisted zone and feeds the tracker

pub mod tracker;
pub mod zone_session;
pub mod zone_watcher;

// Re-export commonly used types
pub use tracker::{Tracker, TrackerSnapshot};
pub use zone_session::ZoneSession;
pub use zone_watcher::ZoneWatcher;
