//! MQTT position source
//!
//! Subscribes to the configured topic and forwards each payload to the
//! tracker as a position event. Broker failures are reported once per
//! outage as `SourceUnavailable`; the tracker keeps its last state.

use crate::domain::types::PositionEvent;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::position_source::parse_position_message;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Start the MQTT client and send position events to the channel
///
/// Events are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped events are counted in metrics and logged (rate-limited).
pub async fn start_mqtt_source(
    config: &Config,
    event_tx: mpsc::Sender<PositionEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let client_id = format!("{}-source-{}", config.site_id(), std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.mqtt_topic(), QoS::AtMostOnce).await?;

    info!(
        topic = %config.mqtt_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "mqtt_source_subscribed"
    );

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);
    // Report an outage once, until the broker accepts us again
    let mut connected = true;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("mqtt_source_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                let event = match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match std::str::from_utf8(&publish.payload) {
                            Ok(json_str) => parse_position_message(json_str),
                            Err(e) => {
                                warn!(error = %e, "mqtt_payload_invalid_utf8");
                                continue;
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_source_connected");
                        connected = true;
                        continue;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        error!(error = %e, "mqtt_source_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        if !connected {
                            continue;
                        }
                        connected = false;
                        PositionEvent::SourceUnavailable(format!("mqtt: {e}"))
                    }
                };

                if let Err(e) = event_tx.try_send(event) {
                    match e {
                        TrySendError::Full(_) => {
                            metrics.record_sample_dropped();
                            if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                warn!("mqtt_event_dropped: channel full");
                                last_drop_warn = Instant::now();
                            }
                        }
                        TrySendError::Closed(_) => {
                            debug!("position_channel_closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
