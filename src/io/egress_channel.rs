//! Typed channel for MQTT egress messages
//!
//! Provides a non-blocking way to send events to the MQTT publisher.
//! Uses bounded mpsc channels to prevent unbounded memory growth.

use crate::domain::types::{epoch_ms, ContainmentState, TransitionCause, TransitionEvent};
use crate::infra::metrics::MetricsSummary;
use serde::Serialize;
use tokio::sync::mpsc;

/// Messages that can be sent to the MQTT publisher
#[derive(Debug)]
pub enum EgressMessage {
    /// Containment transition
    Transition(TransitionPayload),
    /// Position source went down or came back
    SourceStatus(SourceStatusPayload),
    /// Periodic metrics snapshot
    Metrics(MetricsPayload),
}

/// Payload for containment transitions
#[derive(Debug, Clone, Serialize)]
pub struct TransitionPayload {
    /// Site identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub from: ContainmentState,
    pub to: ContainmentState,
    /// Transition time (epoch ms)
    pub at: u64,
    pub cause: TransitionCause,
    /// Zone kind at the time of the transition (absent when no zone)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<&'static str>,
}

impl TransitionPayload {
    pub fn new(event: &TransitionEvent, zone: Option<&'static str>) -> Self {
        Self { site: None, from: event.from, to: event.to, at: event.at, cause: event.cause, zone }
    }
}

/// Payload for position source status changes
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatusPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Timestamp (epoch ms)
    pub ts: u64,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Containment state, unchanged by the outage
    pub state: ContainmentState,
}

/// Payload for metrics snapshot
#[derive(Debug, Serialize)]
pub struct MetricsPayload {
    pub site: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    #[serde(flatten)]
    pub summary: MetricsSummary,
}

/// Sender handle for egress messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    site_id: String,
}

impl EgressSender {
    /// Create a new sender from an mpsc sender
    pub fn new(tx: mpsc::Sender<EgressMessage>, site_id: String) -> Self {
        Self { tx, site_id }
    }

    /// Send a transition event
    /// Injects site_id into the payload
    pub fn send_transition(&self, mut payload: TransitionPayload) {
        payload.site = Some(self.site_id.clone());
        // Use try_send to avoid blocking - drop if channel full
        let _ = self.tx.try_send(EgressMessage::Transition(payload));
    }

    /// Send a source status change
    /// Injects site_id into the payload
    pub fn send_source_status(&self, mut payload: SourceStatusPayload) {
        payload.site = Some(self.site_id.clone());
        let _ = self.tx.try_send(EgressMessage::SourceStatus(payload));
    }

    /// Send a metrics snapshot
    pub fn send_metrics(&self, summary: MetricsSummary) {
        let payload = MetricsPayload { site: self.site_id.clone(), ts: epoch_ms(), summary };
        let _ = self.tx.try_send(EgressMessage::Metrics(payload));
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
pub fn create_egress_channel(
    buffer_size: usize,
    site_id: String,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, site_id), rx)
}
