//! WebSocket handler for real-time client communication.
//!
//! One socket serves every role: listeners, the broadcaster and the admin
//! console all speak the same `{"event": ..., "payload": ...}` envelope.
//! Each connection forwards three sources to its client:
//!
//! - station-wide events from the broadcast channel
//! - signaling messages relayed to it through its outbox
//! - direct replies to its own requests

use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;
use crate::services::BroadcastStatus;
use crate::types::{ConnectionId, PlaylistId};

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming WebSocket message envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "payload")]
enum WsIncoming {
    #[serde(rename = "listener.join")]
    ListenerJoin,
    #[serde(rename = "broadcaster.ready")]
    BroadcasterReady,
    #[serde(rename = "signaling.offer")]
    Offer(SdpPayload),
    #[serde(rename = "signaling.answer")]
    Answer(SdpPayload),
    #[serde(rename = "signaling.ice")]
    Ice(IcePayload),
    #[serde(rename = "listeners.list")]
    ListListeners,
    #[serde(rename = "admin.live.start")]
    StartLive,
    #[serde(rename = "admin.live.stop")]
    StopLive,
    #[serde(rename = "admin.autodj.start")]
    StartAutoDj(StartAutoDjPayload),
    #[serde(rename = "admin.autodj.stop")]
    StopAutoDj,
    #[serde(rename = "admin.autodj.skip")]
    Skip,
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

/// Offer/answer payload. The SDP is forwarded untouched.
#[derive(Debug, Deserialize)]
struct SdpPayload {
    target: ConnectionId,
    sdp: Value,
}

#[derive(Debug, Deserialize)]
struct IcePayload {
    target: ConnectionId,
    candidate: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartAutoDjPayload {
    playlist_id: PlaylistId,
}

/// Outgoing direct replies.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "payload")]
enum WsOutgoing {
    #[serde(rename = "heartbeat.ack")]
    HeartbeatAck,
    #[serde(rename = "status")]
    Status(StatusPayload),
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    connection_id: ConnectionId,
    #[serde(flatten)]
    status: BroadcastStatus,
}

fn to_message<T: Serialize>(value: &T) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(s) => Some(Message::Text(s.into())),
        Err(e) => {
            log::warn!("[WS] Failed to serialize outgoing message: {}", e);
            None
        }
    }
}

/// Sends `value`; returns `false` once the client is gone.
async fn send<T: Serialize>(sender: &mut SplitSink<WebSocket, Message>, value: &T) -> bool {
    match to_message(value) {
        Some(msg) => sender.send(msg).await.is_ok(),
        None => true,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn status_message(state: &AppState, id: &ConnectionId) -> WsOutgoing {
    WsOutgoing::Status(StatusPayload {
        connection_id: id.clone(),
        status: state.machine.status(),
    })
}

/// Applies one client message. Returns the direct reply, if any.
async fn dispatch(state: &AppState, id: &ConnectionId, incoming: WsIncoming) -> Option<WsOutgoing> {
    match incoming {
        WsIncoming::Heartbeat => return Some(WsOutgoing::HeartbeatAck),
        WsIncoming::ListenerJoin => {
            state.relay.listener_joined(id);
        }
        WsIncoming::BroadcasterReady => {
            state.relay.announce_broadcaster(id);
        }
        WsIncoming::Offer(p) => {
            state.relay.relay_offer(id, &p.target, p.sdp);
        }
        WsIncoming::Answer(p) => {
            state.relay.relay_answer(id, &p.target, p.sdp);
        }
        WsIncoming::Ice(p) => {
            state.relay.relay_ice(id, &p.target, p.candidate);
        }
        WsIncoming::ListListeners => {
            state.relay.current_listeners(id);
        }
        WsIncoming::StartLive => state.machine.start_live(),
        WsIncoming::StopLive => {
            state.machine.stop_live();
        }
        WsIncoming::StartAutoDj(p) => state.machine.start_autodj(p.playlist_id),
        WsIncoming::StopAutoDj => state.machine.stop_autodj(),
        WsIncoming::Skip => {
            if let Err(e) = state.machine.skip().await {
                return Some(WsOutgoing::Error {
                    message: e.to_string(),
                });
            }
        }
    }
    None
}

fn parse_incoming(text: &str) -> Result<WsIncoming, WsOutgoing> {
    serde_json::from_str::<WsIncoming>(text).map_err(|e| WsOutgoing::Error {
        message: format!("Invalid message: {}", e),
    })
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.event_bridge.subscribe();
    let mut last_activity = Instant::now();

    // Register connection for tracking, targeted delivery and force-close
    let (conn_guard, mut outbox) = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();
    let conn_id = conn_guard.id().clone();

    let (check_interval, timeout) = {
        let config = state.config.read();
        (
            Duration::from_secs(config.ws_heartbeat_check_interval_secs),
            Duration::from_secs(config.ws_heartbeat_timeout_secs),
        )
    };

    log::info!("[WS] New connection established: {}", conn_id);

    // Initial status lets the client learn its own id and the current mode
    if !send(&mut sender, &status_message(&state, &conn_id)).await {
        log::warn!("[WS] Failed to send initial status, client disconnected");
        return;
    }

    // Delay mode skips missed ticks rather than bursting to catch up.
    let mut heartbeat_interval = tokio::time::interval(check_interval);
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_id);
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match parse_incoming(&text) {
                            Ok(incoming) => dispatch(&state, &conn_id, incoming).await,
                            Err(err) => {
                                log::debug!("[WS] Rejected message from {}: {}", conn_id, text.as_str());
                                Some(err)
                            }
                        };
                        if let Some(reply) = reply {
                            if !send(&mut sender, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            // Signaling messages addressed to this connection
            Some(signal) = outbox.recv() => {
                if !send(&mut sender, &signal).await {
                    break;
                }
            }
            // Station-wide events (mode, track, listener count)
            event = broadcast_rx.recv() => match event {
                Ok(event) => {
                    if !send(&mut sender, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("[WS] {} lagged, skipped {} event(s)", conn_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > timeout {
                    log::warn!("[WS] Heartbeat timeout: {}", conn_id);
                    break;
                }
                // Clients that never send still answer with a Pong
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Registry leave and broadcaster notification; ConnectionGuard::drop unregisters
    state.relay.release(&conn_id);
}
