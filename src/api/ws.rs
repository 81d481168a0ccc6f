// =============================================================================
// WebSocket Handler: Push-based signal updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive JSON frames tagged by `type`:
//   1. `snapshot`: the full StateSnapshot, sent immediately on connect and
//      again whenever the signal store version changes (checked every 500 ms).
//   2. `alert`: each high-confidence AlertEvent as soon as it is raised.
//
// The handler also:
//   - Responds to Ping frames with Pong frames.
//   - Tracks a per-connection sequence number that increments on every
//     outbound message.
//   - Reports dropped alerts when a slow client lags the broadcast channel.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::alert::AlertEvent;
use crate::app_state::{AppState, StateSnapshot};

/// Outbound frame.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    Snapshot { seq: u64, data: &'a StateSnapshot },
    Alert { seq: u64, data: &'a AlertEvent },
}

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

/// Axum handler for the WebSocket upgrade request.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("WebSocket connection accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

// =============================================================================
// Connection handler
// =============================================================================

/// Manages a single WebSocket connection lifecycle.
///
/// Runs three sources via `tokio::select!`:
///   1. **Push loop**: every 500 ms, send a new snapshot if the store
///      version changed.
///   2. **Alert feed**: forward broadcast alert events.
///   3. **Recv loop**: process incoming client messages (Ping/Pong, Close).
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut alerts = state.alert_feed.subscribe();

    let mut sequence: u64 = 0;

    let snapshot = state.build_snapshot();
    if let Err(e) = send_frame(&mut sender, &Outbound::Snapshot { seq: sequence, data: &snapshot }).await {
        warn!(error = %e, "Failed to send initial WebSocket snapshot");
        return;
    }
    let mut last_sent_version = snapshot.store_version;

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            // ── Push loop: check for store changes every 500 ms ─────────
            _ = push_interval.tick() => {
                let current_version = state.signal_store.version();
                if current_version != last_sent_version {
                    sequence += 1;
                    let snapshot = state.build_snapshot();
                    let frame = Outbound::Snapshot { seq: sequence, data: &snapshot };
                    if let Err(e) = send_frame(&mut sender, &frame).await {
                        debug!(error = %e, "WebSocket send failed, disconnecting");
                        break;
                    }
                    last_sent_version = snapshot.store_version;
                }
            }

            // ── Alert feed ──────────────────────────────────────────────
            event = alerts.recv() => {
                match event {
                    Ok(event) => {
                        sequence += 1;
                        if let Err(e) = send_frame(&mut sender, &Outbound::Alert { seq: sequence, data: &event }).await {
                            debug!(error = %e, "WebSocket alert send failed, disconnecting");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging, alerts dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("alert feed closed");
                        break;
                    }
                }
            }

            // ── Recv loop: process incoming messages ────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received, disconnecting");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Read-only feed: client text/binary frames are ignored.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error, disconnecting");
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    info!(sent = sequence + 1, "WebSocket connection closed");
}

// =============================================================================
// Helpers
// =============================================================================

/// Serialize and send one frame. Serialisation errors are logged and
/// swallowed; only transport errors end the connection.
async fn send_frame<S>(sender: &mut S, frame: &Outbound<'_>) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(frame) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket frame");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime_config::RuntimeConfig;

    #[test]
    fn frames_are_tagged_by_type() {
        let state = AppState::new(RuntimeConfig::default());
        let snapshot = state.build_snapshot();
        let json = serde_json::to_value(Outbound::Snapshot { seq: 3, data: &snapshot }).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["seq"], 3);
        assert!(json["data"]["signals"].is_array());
    }
}
