//! Containment tracking and transition detection
//!
//! The Tracker is the single owner of containment state. It coordinates:
//! - Position samples (validated, evaluated against the active zone)
//! - Zone changes (reset to `Unknown` when the zone is replaced or cleared)
//! - Source availability (reported, never changes containment)
//! - Transition egress (log, JSONL file, MQTT)

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::error::Result;
use crate::domain::geo::BoundingRegion;
use crate::domain::types::{ContainmentState, PositionEvent, TrackedPosition, TransitionEvent};
use crate::domain::zone::Zone;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::egress::Egress;
use crate::io::EgressSender;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Presentation view of the tracker
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSnapshot {
    pub zone: Option<Zone>,
    pub state: ContainmentState,
    pub last_position: Option<TrackedPosition>,
    pub bounding_region: Option<BoundingRegion>,
    pub source_available: bool,
}

/// Central event processor for containment tracking
pub struct Tracker {
    /// Zone samples are evaluated against
    pub(crate) zone: Option<Zone>,
    /// Current containment state
    pub(crate) state: ContainmentState,
    /// Last valid sample
    pub(crate) last_position: Option<TrackedPosition>,
    /// False after the source reported an error, until the next valid sample
    pub(crate) source_available: bool,
    /// Writes transitions to file (disabled when no file is configured)
    pub(crate) egress: Option<Egress>,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
    /// MQTT egress sender (optional)
    pub(crate) egress_sender: Option<EgressSender>,
}

impl Tracker {
    /// Create a Tracker with no active zone
    pub fn new(config: &Config, metrics: Arc<Metrics>, egress_sender: Option<EgressSender>) -> Self {
        let egress = match config.egress_file() {
            "" => None,
            path => Some(Egress::new(path)),
        };
        Self {
            zone: None,
            state: ContainmentState::Unknown,
            last_position: None,
            source_available: true,
            egress,
            metrics,
            egress_sender,
        }
    }

    /// Run until shutdown or until the position stream ends
    ///
    /// Zone updates are applied before queued samples so a sample is never
    /// evaluated against a zone that has already been replaced. When the
    /// event channel closes, everything already queued has been processed.
    pub async fn run(
        &mut self,
        mut event_rx: mpsc::Receiver<PositionEvent>,
        mut zone_rx: watch::Receiver<Option<Zone>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let initial = zone_rx.borrow_and_update().clone();
        self.set_zone(initial);
        let mut zone_updates = true;

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(state = %self.state, "tracker_shutdown");
                        break;
                    }
                }
                changed = zone_rx.changed(), if zone_updates => {
                    match changed {
                        Ok(()) => {
                            let zone = zone_rx.borrow_and_update().clone();
                            self.set_zone(zone);
                        }
                        // Watcher gone; keep the last zone
                        Err(_) => zone_updates = false,
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Some(e) => {
                            if let Err(e) = self.process_event(e) {
                                debug!(error = %e, state = %self.state, "position_source_error");
                            }
                        }
                        None => {
                            info!(state = %self.state, "tracker_stream_ended");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Process a single position event to completion
    ///
    /// Source errors are returned after being recorded; containment state
    /// is left as it was.
    pub fn process_event(&mut self, event: PositionEvent) -> Result<Option<TransitionEvent>> {
        let process_start = Instant::now();

        match event {
            PositionEvent::Sample(sample) => {
                self.metrics.record_sample_received();
                Ok(self.handle_sample(&sample, process_start))
            }
            PositionEvent::SourceUnavailable(reason) => Err(self.handle_source_unavailable(reason)),
        }
    }

    /// Current containment state
    pub fn state(&self) -> ContainmentState {
        self.state
    }

    /// Active zone, if any
    pub fn zone(&self) -> Option<&Zone> {
        self.zone.as_ref()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            zone: self.zone.clone(),
            state: self.state,
            last_position: self.last_position,
            bounding_region: self.zone.as_ref().map(Zone::bounding_region),
            source_available: self.source_available,
        }
    }
}
