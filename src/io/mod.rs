//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `store` - Durable single-slot zone persistence
//! - `position_source` - Position message parsing and the line source (stdin/file)
//! - `mqtt` - MQTT client for receiving position messages
//! - `geocoder` - Address to coordinates lookup
//! - `egress` - Transition output to file (JSONL format)
//! - `egress_channel` - Typed channel for MQTT egress messages
//! - `mqtt_egress` - MQTT publisher for egress events

pub mod egress;
pub mod egress_channel;
pub mod geocoder;
pub mod mqtt;
pub mod mqtt_egress;
pub mod position_source;
pub mod store;

// Re-export commonly used types
pub use egress::Egress;
pub use egress_channel::{create_egress_channel, EgressSender};
pub use geocoder::{Geocoder, NominatimGeocoder, StaticGeocoder};
pub use mqtt_egress::MqttPublisher;
pub use store::ZoneStore;
