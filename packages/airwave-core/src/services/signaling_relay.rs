//! WebRTC signaling relay between the broadcaster and its listeners.
//!
//! The relay is a pass-through: offers, answers and ICE candidates are
//! forwarded verbatim to their target, tagged with the sender's connection
//! id. It keeps no per-pair negotiation state. What it does track:
//!
//! - which connection is the broadcaster
//! - the role of every connection that declared one
//! - whether a live broadcast is in progress
//!
//! A target that is neither a registered listener nor the broadcaster is a
//! normal drop condition (the peer likely disconnected mid-negotiation).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::services::listener_registry::ListenerRegistry;
use crate::types::ConnectionId;

/// Role a connection declared over the signaling channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionRole {
    Listener,
    Broadcaster,
}

/// Message delivered to a single connection by the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum RelayedSignal {
    #[serde(rename = "signaling.offer")]
    Offer { from: ConnectionId, sdp: Value },

    #[serde(rename = "signaling.answer")]
    Answer { from: ConnectionId, sdp: Value },

    #[serde(rename = "signaling.ice")]
    IceCandidate { from: ConnectionId, candidate: Value },

    /// Listeners must drop any peer connection and wait for a fresh offer.
    #[serde(rename = "broadcaster.ready")]
    BroadcasterReady,

    /// Sent to the broadcaster so it opens a peer connection to `id`.
    #[serde(rename = "listener.joined")]
    ListenerJoined { id: ConnectionId },

    /// Sent to the broadcaster so it releases the peer connection to `id`.
    #[serde(rename = "listener.left")]
    ListenerLeft { id: ConnectionId },

    /// Reply to a `listeners.list` request.
    #[serde(rename = "listeners.current")]
    ListenersCurrent { ids: Vec<ConnectionId> },
}

/// Point-to-point delivery channel used by the relay.
///
/// Implementations must preserve per-sender message order. Returns `false`
/// when `to` is not connected; that is never an error.
pub trait SignalingTransport: Send + Sync {
    fn deliver(&self, to: &ConnectionId, signal: RelayedSignal) -> bool;
}

/// Relays signaling traffic and broadcaster/listener lifecycle signals.
pub struct SignalingRelay {
    transport: Arc<dyn SignalingTransport>,
    registry: Arc<ListenerRegistry>,
    broadcaster: RwLock<Option<ConnectionId>>,
    roles: DashMap<ConnectionId, ConnectionRole>,
    live: AtomicBool,
}

impl SignalingRelay {
    pub fn new(transport: Arc<dyn SignalingTransport>, registry: Arc<ListenerRegistry>) -> Self {
        Self {
            transport,
            registry,
            broadcaster: RwLock::new(None),
            roles: DashMap::new(),
            live: AtomicBool::new(false),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Point-to-point forwarding
    // ─────────────────────────────────────────────────────────────────────

    /// Forwards an SDP offer. Returns whether it was delivered.
    pub fn relay_offer(&self, from: &ConnectionId, target: &ConnectionId, sdp: Value) -> bool {
        self.forward(
            target,
            RelayedSignal::Offer {
                from: from.clone(),
                sdp,
            },
        )
    }

    /// Forwards an SDP answer. Returns whether it was delivered.
    pub fn relay_answer(&self, from: &ConnectionId, target: &ConnectionId, sdp: Value) -> bool {
        self.forward(
            target,
            RelayedSignal::Answer {
                from: from.clone(),
                sdp,
            },
        )
    }

    /// Forwards an ICE candidate. Returns whether it was delivered.
    pub fn relay_ice(&self, from: &ConnectionId, target: &ConnectionId, candidate: Value) -> bool {
        self.forward(
            target,
            RelayedSignal::IceCandidate {
                from: from.clone(),
                candidate,
            },
        )
    }

    fn forward(&self, target: &ConnectionId, signal: RelayedSignal) -> bool {
        if !self.is_reachable(target) {
            log::debug!("[Relay] Dropping signal for unknown target {}", target);
            return false;
        }
        let delivered = self.transport.deliver(target, signal);
        if !delivered {
            log::debug!("[Relay] Target {} vanished before delivery", target);
        }
        delivered
    }

    fn is_reachable(&self, target: &ConnectionId) -> bool {
        self.registry.contains(target) || self.broadcaster.read().as_ref() == Some(target)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Broadcaster lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Returns the current broadcaster connection, if one announced itself.
    #[must_use]
    pub fn broadcaster(&self) -> Option<ConnectionId> {
        self.broadcaster.read().clone()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn role(&self, id: &ConnectionId) -> Option<ConnectionRole> {
        self.roles.get(id).map(|r| *r)
    }

    /// Records `id` as the broadcaster and tells every listener to reset.
    ///
    /// A connection that had joined as a listener stops being one.
    pub fn announce_broadcaster(&self, id: &ConnectionId) -> usize {
        let previous_role = self.roles.insert(id.clone(), ConnectionRole::Broadcaster);
        if previous_role == Some(ConnectionRole::Listener) {
            self.registry.leave(id);
        }
        let replaced = self.broadcaster.write().replace(id.clone());
        match replaced {
            Some(old) if &old != id => {
                log::info!("[Relay] Broadcaster {} replaced by {}", old, id);
                self.roles.remove(&old);
            }
            _ => log::info!("[Relay] Broadcaster ready: {}", id),
        }
        self.broadcaster_ready()
    }

    /// Marks the start of a live broadcast.
    pub fn begin_live(&self) {
        self.live.store(true, Ordering::Release);
    }

    /// Marks the end of a live broadcast and forgets the broadcaster.
    pub fn end_live(&self) {
        self.live.store(false, Ordering::Release);
        if let Some(old) = self.broadcaster.write().take() {
            self.roles.remove(&old);
            log::info!("[Relay] Live ended, released broadcaster {}", old);
        }
    }

    /// Sends `broadcaster.ready` to every registered listener.
    ///
    /// Returns how many listeners it reached; a failed delivery to one
    /// listener does not stop the fan-out.
    pub fn broadcaster_ready(&self) -> usize {
        let listeners = self.registry.listeners();
        let delivered = listeners
            .iter()
            .filter(|id| self.transport.deliver(id, RelayedSignal::BroadcasterReady))
            .count();
        log::debug!(
            "[Relay] broadcaster.ready reached {}/{} listeners",
            delivered,
            listeners.len()
        );
        delivered
    }

    // ─────────────────────────────────────────────────────────────────────
    // Listener lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Registers `id` as a listener and returns the new listener count.
    ///
    /// While live, the broadcaster is told about the newcomer so it can
    /// send an offer.
    pub fn listener_joined(&self, id: &ConnectionId) -> usize {
        if self.role(id) == Some(ConnectionRole::Broadcaster) {
            log::warn!("[Relay] Broadcaster {} tried to join as listener", id);
            return self.registry.count();
        }
        self.roles.insert(id.clone(), ConnectionRole::Listener);
        let count = self.registry.join(id);

        if self.is_live() {
            if let Some(broadcaster) = self.broadcaster() {
                self.transport
                    .deliver(&broadcaster, RelayedSignal::ListenerJoined { id: id.clone() });
            }
        }
        count
    }

    /// Releases everything tied to a closed connection.
    pub fn release(&self, id: &ConnectionId) {
        match self.roles.remove(id).map(|(_, role)| role) {
            Some(ConnectionRole::Listener) => {
                self.registry.leave(id);
                if let Some(broadcaster) = self.broadcaster() {
                    self.transport
                        .deliver(&broadcaster, RelayedSignal::ListenerLeft { id: id.clone() });
                }
            }
            Some(ConnectionRole::Broadcaster) => {
                let mut broadcaster = self.broadcaster.write();
                if broadcaster.as_ref() == Some(id) {
                    *broadcaster = None;
                    log::info!("[Relay] Broadcaster {} disconnected", id);
                }
            }
            None => {}
        }
    }

    /// Replies to `requester` with the ids of all registered listeners.
    pub fn current_listeners(&self, requester: &ConnectionId) -> bool {
        let ids = self.registry.listeners();
        self.transport
            .deliver(requester, RelayedSignal::ListenersCurrent { ids })
    }
}
