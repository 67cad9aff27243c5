//! Shared types for position tracking and containment state

use crate::domain::geo::Point;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Get current epoch time in milliseconds
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Containment of the tracked subject relative to the active zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainmentState {
    Inside,
    Outside,
    #[default]
    Unknown,
}

impl ContainmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainmentState::Inside => "inside",
            ContainmentState::Outside => "outside",
            ContainmentState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ContainmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transition happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// A position sample was evaluated against the zone
    Sample,
    /// The active zone was replaced
    ZoneChanged,
    /// The active zone was removed
    ZoneCleared,
    /// A sample arrived while no zone was active
    NoZone,
}

/// Emitted exactly when `ContainmentState` changes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionEvent {
    pub from: ContainmentState,
    pub to: ContainmentState,
    /// Epoch ms: sample timestamp, or wall clock for zone changes
    pub at: u64,
    pub cause: TransitionCause,
}

/// Last known location of the subject
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackedPosition {
    pub point: Point,
    pub timestamp: u64,
}

/// Timestamp that can be either RFC 3339 string or epoch milliseconds
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TimestampValue {
    #[default]
    None,
    IsoString(String),
    EpochMs(u64),
}

impl TimestampValue {
    /// Epoch milliseconds, `None` when absent or unparsable
    pub fn to_epoch_ms(&self) -> Option<u64> {
        match self {
            TimestampValue::EpochMs(ms) => Some(*ms),
            TimestampValue::IsoString(s) => parse_iso_time(s),
            TimestampValue::None => None,
        }
    }
}

/// Parse RFC 3339 timestamp to epoch milliseconds
pub fn parse_iso_time(time_str: &str) -> Option<u64> {
    OffsetDateTime::parse(time_str, &Rfc3339)
        .ok()
        .and_then(|dt| u64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<TimestampValue, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = TimestampValue;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer timestamp")
        }

        fn visit_str<E>(self, value: &str) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::EpochMs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            // Negative epochs are not meaningful for live samples
            Ok(u64::try_from(value).map(TimestampValue::EpochMs).unwrap_or_default())
        }

        fn visit_f64<E>(self, value: f64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            // Browser geolocation reports DOMTimeStamp as a float of ms
            if value.is_finite() && value >= 0.0 {
                Ok(TimestampValue::EpochMs(value as u64))
            } else {
                Ok(TimestampValue::None)
            }
        }

        fn visit_unit<E>(self) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::None)
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

/// Raw sample from the position source, before validation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PositionSample {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: TimestampValue,
}

impl PositionSample {
    pub fn new(lat: f64, lng: f64, timestamp: u64) -> Self {
        Self { lat: Some(lat), lng: Some(lng), timestamp: TimestampValue::EpochMs(timestamp) }
    }

    /// Validate into a tracked position
    ///
    /// `None` for missing or non-finite coordinates, coordinates outside
    /// the valid range, or a missing/unparsable timestamp.
    pub fn to_tracked(&self) -> Option<TrackedPosition> {
        let point = Point::new(self.lat?, self.lng?).ok()?;
        let timestamp = self.timestamp.to_epoch_ms()?;
        Some(TrackedPosition { point, timestamp })
    }
}

/// Input to the tracker from a position source
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Sample(PositionSample),
    /// Source is down (permission denied, no fix, connection lost)
    SourceUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_to_tracked() {
        let sample = PositionSample::new(4.711, -74.0721, 1767617600000);
        let tracked = sample.to_tracked().unwrap();
        assert_eq!(tracked.point, Point::new(4.711, -74.0721).unwrap());
        assert_eq!(tracked.timestamp, 1767617600000);
    }

    #[test]
    fn test_malformed_samples_rejected() {
        let nan = PositionSample::new(f64::NAN, -74.07, 1);
        assert!(nan.to_tracked().is_none());

        let missing = PositionSample { lat: None, ..PositionSample::new(0.0, 0.0, 1) };
        assert!(missing.to_tracked().is_none());

        let out_of_range = PositionSample::new(4.7, -190.0, 1);
        assert!(out_of_range.to_tracked().is_none());

        let no_time = PositionSample { timestamp: TimestampValue::None, ..PositionSample::new(0.0, 0.0, 1) };
        assert!(no_time.to_tracked().is_none());
    }

    #[test]
    fn test_sample_deserialize_epoch() {
        let s: PositionSample =
            serde_json::from_str(r#"{"lat": 4.7, "lng": -74.0, "timestamp": 1767617600000}"#).unwrap();
        assert_eq!(s.timestamp, TimestampValue::EpochMs(1767617600000));
        assert!(s.to_tracked().is_some());
    }

    #[test]
    fn test_sample_deserialize_iso() {
        let s: PositionSample = serde_json::from_str(
            r#"{"lat": 4.7, "lng": -74.0, "timestamp": "2026-01-05T16:41:30.048+00:00"}"#,
        )
        .unwrap();
        let ms = s.to_tracked().unwrap().timestamp;
        assert_eq!(ms % 1000, 48);
        assert!(ms > 1767000000000 && ms < 1800000000000);
    }

    #[test]
    fn test_sample_deserialize_float_timestamp() {
        let s: PositionSample =
            serde_json::from_str(r#"{"lat": 4.7, "lng": -74.0, "timestamp": 1767617600123.4}"#).unwrap();
        assert_eq!(s.timestamp, TimestampValue::EpochMs(1767617600123));
    }

    #[test]
    fn test_sample_deserialize_nulls() {
        let s: PositionSample =
            serde_json::from_str(r#"{"lat": null, "lng": -74.0, "timestamp": null}"#).unwrap();
        assert_eq!(s.lat, None);
        assert_eq!(s.timestamp, TimestampValue::None);
        assert!(s.to_tracked().is_none());
    }

    #[test]
    fn test_parse_iso_time() {
        assert!(parse_iso_time("2026-01-05T16:41:30.048+00:00").is_some());
        assert!(parse_iso_time("not a timestamp").is_none());
        assert!(parse_iso_time("").is_none());
    }

    #[test]
    fn test_containment_state_display() {
        assert_eq!(ContainmentState::default(), ContainmentState::Unknown);
        assert_eq!(ContainmentState::Inside.to_string(), "inside");
        assert_eq!(serde_json::to_string(&ContainmentState::Outside).unwrap(), "\"outside\"");
    }
}
