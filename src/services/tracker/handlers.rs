//! Event handlers for the Tracker
//!
//! Every state change goes through `transition`, which emits the event to
//! the log, the JSONL file and MQTT.

use super::Tracker;
use crate::domain::error::GeofenceError;
use crate::domain::types::{
    epoch_ms, ContainmentState, PositionSample, TransitionCause, TransitionEvent,
};
use crate::domain::zone::Zone;
use crate::io::egress_channel::{SourceStatusPayload, TransitionPayload};
use std::time::Instant;
use tracing::{debug, info, warn};

impl Tracker {
    /// Evaluate a position sample against the active zone
    ///
    /// Malformed samples are dropped without touching state.
    pub(crate) fn handle_sample(
        &mut self,
        sample: &PositionSample,
        process_start: Instant,
    ) -> Option<TransitionEvent> {
        let Some(position) = sample.to_tracked() else {
            self.metrics.record_sample_dropped();
            debug!(lat = ?sample.lat, lng = ?sample.lng, timestamp = ?sample.timestamp, "sample_dropped");
            return None;
        };

        self.last_position = Some(position);
        if !self.source_available {
            self.source_available = true;
            info!("position_source_recovered");
            self.publish_source_status(None, position.timestamp);
        }

        let (to, cause) = match &self.zone {
            Some(zone) if zone.contains(position.point) => {
                (ContainmentState::Inside, TransitionCause::Sample)
            }
            Some(_) => (ContainmentState::Outside, TransitionCause::Sample),
            None => (ContainmentState::Unknown, TransitionCause::NoZone),
        };

        let transition = self.transition(to, position.timestamp, cause);

        // Record processing latency (lock-free)
        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_sample_evaluated(latency_us);

        debug!(point = %position.point, state = %self.state, "sample_evaluated");
        transition
    }

    /// Record a source failure; containment state is untouched
    pub(crate) fn handle_source_unavailable(&mut self, reason: String) -> GeofenceError {
        self.metrics.record_source_error();
        if self.source_available {
            self.source_available = false;
            self.publish_source_status(Some(reason.clone()), epoch_ms());
        }
        GeofenceError::PositionSourceUnavailable(reason)
    }

    /// Replace the active zone, resetting containment to `Unknown`
    ///
    /// Setting the zone that is already active is not a change.
    pub fn set_zone(&mut self, zone: Option<Zone>) -> Option<TransitionEvent> {
        if self.zone == zone {
            return None;
        }

        let cause = if zone.is_some() {
            TransitionCause::ZoneChanged
        } else {
            TransitionCause::ZoneCleared
        };
        self.metrics.record_zone_change();
        info!(
            kind = %zone.as_ref().map(Zone::kind).unwrap_or("none"),
            previous_state = %self.state,
            "zone_changed"
        );

        self.zone = zone;
        self.transition(ContainmentState::Unknown, epoch_ms(), cause)
    }

    /// The single transition function: emits only when the state changes
    pub(crate) fn transition(
        &mut self,
        to: ContainmentState,
        at: u64,
        cause: TransitionCause,
    ) -> Option<TransitionEvent> {
        if self.state == to {
            return None;
        }

        let event = TransitionEvent { from: self.state, to, at, cause };
        self.state = to;
        self.emit(&event);
        Some(event)
    }

    fn emit(&self, event: &TransitionEvent) {
        self.metrics.record_transition();
        info!(
            from = %event.from,
            to = %event.to,
            at = %event.at,
            cause = ?event.cause,
            "transition_emitted"
        );

        if let Some(ref egress) = self.egress {
            egress.write_transition(event);
        }

        if let Some(ref sender) = self.egress_sender {
            sender.send_transition(TransitionPayload::new(event, self.zone.as_ref().map(Zone::kind)));
        }
    }

    fn publish_source_status(&self, reason: Option<String>, ts: u64) {
        match reason {
            Some(ref reason) => warn!(reason = %reason, state = %self.state, "position_source_unavailable"),
            None => debug!(state = %self.state, "position_source_available"),
        }

        if let Some(ref sender) = self.egress_sender {
            sender.send_source_status(SourceStatusPayload {
                site: None,
                ts,
                available: reason.is_none(),
                reason,
                state: self.state,
            });
        }
    }
}
