//! JSON position messages and the line-oriented position source
//!
//! Wire format, one JSON object per message:
//! - `{"lat": 4.711, "lng": -74.07, "timestamp": 1767617600000}` (timestamp may
//!   also be an RFC 3339 string)
//! - `{"error": "permission_denied"}` when the device cannot produce a fix
//!
//! Anything that is not one of those is handed to the tracker as an empty
//! sample so it is counted and dropped there.

use crate::domain::types::{PositionEvent, PositionSample};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PositionMessage {
    Error { error: String },
    Sample(PositionSample),
}

/// Parse one position message
pub fn parse_position_message(json_str: &str) -> PositionEvent {
    match serde_json::from_str::<PositionMessage>(json_str) {
        Ok(PositionMessage::Error { error }) => PositionEvent::SourceUnavailable(error),
        Ok(PositionMessage::Sample(sample)) => PositionEvent::Sample(sample),
        Err(e) => {
            debug!(error = %e, "position_message_unparsable");
            PositionEvent::Sample(PositionSample::default())
        }
    }
}

/// Read JSON lines from `reader` and forward them as position events
///
/// Returns when the reader hits EOF, the channel closes or shutdown is
/// signalled. Dropping the sender on return ends the tracker loop once it
/// has drained what was already queued.
pub async fn run_line_source<R>(
    reader: R,
    event_tx: mpsc::Sender<PositionEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0u64;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(forwarded = %forwarded, "position_source_shutdown");
                    return Ok(forwarded);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!(forwarded = %forwarded, "position_source_eof");
                    return Ok(forwarded);
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Backpressure rather than drop: a line source is replayable input
                if event_tx.send(parse_position_message(line)).await.is_err() {
                    warn!("position_channel_closed");
                    return Ok(forwarded);
                }
                forwarded += 1;
            }
        }
    }
}
