/// WebSocket connection handler
///
/// Runs one task per connected client with two concurrent flows multiplexed
/// in a single select loop: draining the hub queue to the wire, and decoding
/// inbound control messages. A third arm ticks once a second to drive
/// keepalive probes. Any read error, write error, missed keepalive, idle
/// timeout, hub drop, or shutdown signal ends the task, which always
/// unregisters the client on the way out.
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config;
use crate::logger::{self, LogTag};

use super::hub::{ClientId, Hub};
use super::keepalive::{KeepaliveConfig, KeepaliveTracker};
use super::message::{parse_categories, ClientMessage, Envelope};

/// Handle a WebSocket connection until it closes
pub async fn handle_connection(
    socket: WebSocket,
    hub: Arc<Hub>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (client_id, mut hub_rx) = hub.register().await;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let keepalive_config =
        config::with_config(|cfg| KeepaliveConfig::from_config(&cfg.websocket));
    let mut tracker = KeepaliveTracker::new(keepalive_config);

    logger::debug(
        LogTag::Webserver,
        &format!("Connection {} started", client_id),
    );

    loop {
        tokio::select! {
            biased;

            // Graceful shutdown: close the socket and exit
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    logger::debug(
                        LogTag::Webserver,
                        &format!("Connection {}: shutting down", client_id),
                    );
                    break;
                }
            }

            // Events from the hub, drained to the wire
            maybe_envelope = hub_rx.recv() => {
                match maybe_envelope {
                    Some(envelope) => {
                        if let Err(e) = send_envelope(&mut ws_tx, &envelope).await {
                            logger::warning(
                                LogTag::Webserver,
                                &format!("Connection {}: send failed: {}", client_id, e),
                            );
                            break;
                        }
                    }
                    // Queue closed: the hub dropped us (slow consumer or shutdown)
                    None => break,
                }
            }

            // Control messages from the client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracker.record_activity();
                        handle_client_message(&text, &hub, client_id, &mut ws_tx).await;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        tracker.record_activity();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        logger::debug(
                            LogTag::Webserver,
                            &format!("Connection {}: client closed", client_id),
                        );
                        break;
                    }
                    Some(Err(e)) => {
                        logger::warning(
                            LogTag::Webserver,
                            &format!("Connection {}: websocket error: {}", client_id, e),
                        );
                        break;
                    }
                    _ => {}
                }
            }

            // Keepalive checks
            _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {
                if tracker.is_idle() {
                    logger::warning(
                        LogTag::Webserver,
                        &format!(
                            "Connection {}: idle timeout ({}s without activity)",
                            client_id,
                            tracker.seconds_since_activity()
                        ),
                    );
                    break;
                }

                if tracker.is_overdue() {
                    logger::warning(
                        LogTag::Webserver,
                        &format!("Connection {}: keepalive pong overdue", client_id),
                    );
                    break;
                }

                if tracker.needs_ping() {
                    if send_envelope(&mut ws_tx, &Envelope::ping()).await.is_err() {
                        break;
                    }
                    tracker.record_ping();
                }
            }
        }
    }

    // Cleanup: a no-op when the hub already dropped this client
    hub.unregister(client_id).await;
    let _ = ws_tx.send(Message::Close(None)).await;

    logger::debug(
        LogTag::Webserver,
        &format!("Connection {} closed", client_id),
    );
}

/// Decode and act on one client control message.
/// Malformed input is reported back to the client; the connection stays up.
async fn handle_client_message(
    text: &str,
    hub: &Arc<Hub>,
    client_id: ClientId,
    ws_tx: &mut SplitSink<WebSocket, Message>,
) {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            logger::debug(
                LogTag::Webserver,
                &format!("Connection {}: invalid message: {}", client_id, e),
            );
            let envelope = Envelope::error("Invalid message", "INVALID_MESSAGE");
            let _ = send_envelope(ws_tx, &envelope).await;
            return;
        }
    };

    match client_msg {
        ClientMessage::Subscribe { data } => match parse_categories(&data) {
            Ok(categories) => {
                hub.subscribe(client_id, &categories).await;
            }
            Err(unknown) => {
                let envelope = Envelope::error(
                    &format!("Unknown category: {}", unknown),
                    "UNKNOWN_CATEGORY",
                );
                let _ = send_envelope(ws_tx, &envelope).await;
            }
        },

        ClientMessage::Unsubscribe { data } => match parse_categories(&data) {
            Ok(categories) => {
                hub.unsubscribe(client_id, &categories).await;
            }
            Err(unknown) => {
                let envelope = Envelope::error(
                    &format!("Unknown category: {}", unknown),
                    "UNKNOWN_CATEGORY",
                );
                let _ = send_envelope(ws_tx, &envelope).await;
            }
        },

        ClientMessage::Ping { data } => {
            let _ = send_envelope(ws_tx, &Envelope::pong(data)).await;
        }

        // Activity was already recorded; nothing else to do
        ClientMessage::Pong { .. } => {}
    }
}

/// Serialize an envelope and write it to the wire
async fn send_envelope(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    match envelope.to_json() {
        Ok(json) => ws_tx.send(Message::Text(json)).await,
        Err(e) => {
            logger::error(
                LogTag::Webserver,
                &format!("Failed to serialize envelope: {}", e),
            );
            // Don't kill the connection over one unserializable payload
            Ok(())
        }
    }
}
