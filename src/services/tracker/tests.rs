//! Tests for the Tracker module

use super::*;
use crate::domain::error::GeofenceError;
use crate::domain::types::{PositionSample, TimestampValue, TransitionCause};
use crate::io::create_egress_channel;
use crate::io::egress_channel::EgressMessage;
use std::fs;
use tempfile::tempdir;
use tokio::time::{timeout, Duration};

fn create_test_tracker() -> Tracker {
    let config = Config::default().with_egress_file("");
    Tracker::new(&config, Arc::new(Metrics::new()), None)
}

/// Circle of 500 m around central Bogotá
fn bogota_circle() -> Zone {
    Zone::circle_at(4.7110, -74.0721, 500.0).unwrap()
}

fn unit_square() -> Zone {
    Zone::polygon_from_coords(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]).unwrap()
}

fn sample(lat: f64, lng: f64, ts: u64) -> PositionEvent {
    PositionEvent::Sample(PositionSample::new(lat, lng, ts))
}

fn inside_bogota(ts: u64) -> PositionEvent {
    sample(4.7110, -74.0721, ts)
}

/// About 1 km north of the center
fn outside_bogota(ts: u64) -> PositionEvent {
    sample(4.7200, -74.0721, ts)
}

#[test]
fn test_initial_state() {
    let tracker = create_test_tracker();
    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.state, ContainmentState::Unknown);
    assert_eq!(snapshot.zone, None);
    assert_eq!(snapshot.last_position, None);
    assert_eq!(snapshot.bounding_region, None);
    assert!(snapshot.source_available);
}

#[test]
fn test_circle_scenario() {
    let mut tracker = create_test_tracker();
    assert_eq!(tracker.set_zone(Some(bogota_circle())), None);

    let event = tracker.process_event(inside_bogota(1000)).unwrap().unwrap();
    assert_eq!(event.from, ContainmentState::Unknown);
    assert_eq!(event.to, ContainmentState::Inside);
    assert_eq!(event.at, 1000);
    assert_eq!(event.cause, TransitionCause::Sample);

    let event = tracker.process_event(outside_bogota(2000)).unwrap().unwrap();
    assert_eq!(event.from, ContainmentState::Inside);
    assert_eq!(event.to, ContainmentState::Outside);
    assert_eq!(event.at, 2000);

    // Same state again: no event
    assert_eq!(tracker.process_event(outside_bogota(3000)).unwrap(), None);
    assert_eq!(tracker.state(), ContainmentState::Outside);

    let event = tracker.set_zone(None).unwrap();
    assert_eq!(event.from, ContainmentState::Outside);
    assert_eq!(event.to, ContainmentState::Unknown);
    assert_eq!(event.cause, TransitionCause::ZoneCleared);
    assert_eq!(tracker.state(), ContainmentState::Unknown);
}

#[test]
fn test_no_events_without_state_change() {
    let mut tracker = create_test_tracker();
    tracker.set_zone(Some(bogota_circle()));

    let events: Vec<_> = (0..10)
        .filter_map(|i| tracker.process_event(inside_bogota(i)).unwrap())
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(tracker.metrics.transitions_total(), 1);
}

#[test]
fn test_sample_without_zone() {
    let mut tracker = create_test_tracker();

    // Already Unknown: nothing to emit
    assert_eq!(tracker.process_event(inside_bogota(1)).unwrap(), None);
    assert_eq!(tracker.state(), ContainmentState::Unknown);
    assert!(tracker.snapshot().last_position.is_some());
}

#[test]
fn test_malformed_sample_dropped() {
    let mut tracker = create_test_tracker();
    tracker.set_zone(Some(bogota_circle()));
    tracker.process_event(inside_bogota(1000)).unwrap();
    let before = tracker.snapshot();

    let malformed = [
        PositionSample { lat: Some(f64::NAN), lng: Some(-74.0721), timestamp: TimestampValue::EpochMs(2000) },
        PositionSample { lat: None, lng: Some(-74.0721), timestamp: TimestampValue::EpochMs(2000) },
        PositionSample { lat: Some(91.0), lng: Some(0.0), timestamp: TimestampValue::EpochMs(2000) },
        PositionSample { lat: Some(4.72), lng: Some(f64::INFINITY), timestamp: TimestampValue::EpochMs(2000) },
        PositionSample { lat: Some(4.72), lng: Some(-74.0721), timestamp: TimestampValue::None },
        PositionSample {
            lat: Some(4.72),
            lng: Some(-74.0721),
            timestamp: TimestampValue::IsoString("yesterday".into()),
        },
    ];
    for s in malformed {
        assert_eq!(tracker.process_event(PositionEvent::Sample(s)).unwrap(), None);
    }

    assert_eq!(tracker.snapshot(), before);
    let summary = tracker.metrics.report();
    assert_eq!(summary.samples_dropped, 6);
    assert_eq!(summary.samples_evaluated, 1);
}

#[test]
fn test_zone_change_resets_to_unknown() {
    let mut tracker = create_test_tracker();
    tracker.set_zone(Some(bogota_circle()));
    tracker.process_event(inside_bogota(1000)).unwrap();

    let event = tracker.set_zone(Some(unit_square())).unwrap();
    assert_eq!(event.from, ContainmentState::Inside);
    assert_eq!(event.to, ContainmentState::Unknown);
    assert_eq!(event.cause, TransitionCause::ZoneChanged);

    // Next sample is evaluated against the new zone
    let event = tracker.process_event(sample(0.5, 0.5, 2000)).unwrap().unwrap();
    assert_eq!(event.from, ContainmentState::Unknown);
    assert_eq!(event.to, ContainmentState::Inside);
}

#[test]
fn test_zone_change_while_unknown_is_silent() {
    let mut tracker = create_test_tracker();
    assert_eq!(tracker.set_zone(Some(bogota_circle())), None);
    assert_eq!(tracker.set_zone(Some(unit_square())), None);
    assert_eq!(tracker.metrics.report().zone_changes, 2);
}

#[test]
fn test_same_zone_is_not_a_change() {
    let mut tracker = create_test_tracker();
    tracker.set_zone(Some(bogota_circle()));
    tracker.process_event(inside_bogota(1000)).unwrap();

    assert_eq!(tracker.set_zone(Some(bogota_circle())), None);
    assert_eq!(tracker.state(), ContainmentState::Inside);
}

#[test]
fn test_source_unavailable_keeps_state() {
    let mut tracker = create_test_tracker();
    tracker.set_zone(Some(bogota_circle()));
    tracker.process_event(inside_bogota(1000)).unwrap();

    let err = tracker
        .process_event(PositionEvent::SourceUnavailable("permission_denied".into()))
        .unwrap_err();
    assert_eq!(err, GeofenceError::PositionSourceUnavailable("permission_denied".into()));
    assert_eq!(tracker.state(), ContainmentState::Inside);
    assert!(!tracker.snapshot().source_available);

    // Next valid sample restores availability
    assert_eq!(tracker.process_event(inside_bogota(2000)).unwrap(), None);
    assert!(tracker.snapshot().source_available);
}

#[test]
fn test_polygon_boundary_is_outside() {
    let mut tracker = create_test_tracker();
    tracker.set_zone(Some(unit_square()));

    let event = tracker.process_event(sample(0.0, 0.5, 1)).unwrap().unwrap();
    assert_eq!(event.to, ContainmentState::Outside);
    let event = tracker.process_event(sample(0.25, 0.75, 2)).unwrap().unwrap();
    assert_eq!(event.to, ContainmentState::Inside);
    let event = tracker.process_event(sample(1.0, 1.0, 3)).unwrap().unwrap();
    assert_eq!(event.to, ContainmentState::Outside);
}

#[test]
fn test_snapshot_bounding_region() {
    let mut tracker = create_test_tracker();
    tracker.set_zone(Some(unit_square()));

    let region = tracker.snapshot().bounding_region.unwrap();
    assert_eq!(region.min_lat, 0.0);
    assert_eq!(region.max_lat, 1.0);
    assert_eq!(region.min_lng, 0.0);
    assert_eq!(region.max_lng, 1.0);
}

#[test]
fn test_transitions_written_to_egress_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transitions.jsonl");
    let config = Config::default().with_egress_file(path.to_str().unwrap());
    let mut tracker = Tracker::new(&config, Arc::new(Metrics::new()), None);

    tracker.set_zone(Some(bogota_circle()));
    tracker.process_event(inside_bogota(1000)).unwrap();
    tracker.process_event(outside_bogota(2000)).unwrap();
    tracker.process_event(outside_bogota(3000)).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> =
        content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["to"], "inside");
    assert_eq!(lines[1]["from"], "inside");
    assert_eq!(lines[1]["to"], "outside");
    assert_eq!(lines[1]["at"], 2000);
}

#[tokio::test]
async fn test_transitions_and_status_published() {
    let (sender, mut rx) = create_egress_channel(16, "test-site".to_string());
    let config = Config::default().with_egress_file("");
    let mut tracker = Tracker::new(&config, Arc::new(Metrics::new()), Some(sender));

    tracker.set_zone(Some(bogota_circle()));
    tracker.process_event(inside_bogota(1000)).unwrap();
    let _ = tracker.process_event(PositionEvent::SourceUnavailable("no_fix".into()));
    // Repeated error within the same outage is not republished
    let _ = tracker.process_event(PositionEvent::SourceUnavailable("no_fix".into()));

    let Some(EgressMessage::Transition(payload)) = rx.recv().await else {
        panic!("expected transition");
    };
    assert_eq!(payload.to, ContainmentState::Inside);
    assert_eq!(payload.zone, Some("circle"));
    assert_eq!(payload.site.as_deref(), Some("test-site"));

    let Some(EgressMessage::SourceStatus(status)) = rx.recv().await else {
        panic!("expected source status");
    };
    assert!(!status.available);
    assert_eq!(status.reason.as_deref(), Some("no_fix"));
    assert_eq!(status.state, ContainmentState::Inside);

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_run_drains_queue_at_end_of_stream() {
    let mut tracker = create_test_tracker();
    let (event_tx, event_rx) = mpsc::channel(8);
    let (_zone_tx, zone_rx) = watch::channel(Some(bogota_circle()));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    event_tx.send(inside_bogota(1000)).await.unwrap();
    event_tx.send(outside_bogota(2000)).await.unwrap();
    drop(event_tx);

    timeout(Duration::from_secs(1), tracker.run(event_rx, zone_rx, shutdown_rx))
        .await
        .expect("tracker should stop at end of stream");

    assert_eq!(tracker.state(), ContainmentState::Outside);
    assert_eq!(tracker.metrics.transitions_total(), 2);
}

#[tokio::test]
async fn test_run_exits_on_shutdown() {
    let mut tracker = create_test_tracker();
    let (_event_tx, event_rx) = mpsc::channel::<PositionEvent>(8);
    let (_zone_tx, zone_rx) = watch::channel(None);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(1), tracker.run(event_rx, zone_rx, shutdown_rx))
        .await
        .expect("tracker should stop on shutdown");
}

#[tokio::test]
async fn test_run_applies_zone_updates() {
    let mut tracker = create_test_tracker();
    let (event_tx, event_rx) = mpsc::channel(8);
    let (zone_tx, zone_rx) = watch::channel(None);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        tracker.run(event_rx, zone_rx, shutdown_rx).await;
        tracker
    });

    zone_tx.send(Some(bogota_circle())).unwrap();
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    event_tx.send(inside_bogota(1000)).await.unwrap();
    drop(event_tx);

    let tracker = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert_eq!(tracker.zone(), Some(&bogota_circle()));
    assert_eq!(tracker.state(), ContainmentState::Inside);
}
