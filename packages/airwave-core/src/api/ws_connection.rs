//! WebSocket connection tracking and management.
//!
//! This module provides tracking of WebSocket connections with force-close
//! capability and targeted delivery:
//!
//! - `WsConnectionManager`: Tracks all active WebSocket connections and
//!   delivers relayed signaling messages to a single connection
//! - `ConnectionGuard`: RAII guard for automatic cleanup on disconnect

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol_constants::CONNECTION_ID_PREFIX;
use crate::services::{RelayedSignal, SignalingTransport};
use crate::types::ConnectionId;

/// Internal connection state.
struct ConnectionState {
    /// Per-connection outbox drained by the socket's send loop.
    ///
    /// Unbounded so a relay fan-out never waits on a slow socket; a single
    /// channel per connection keeps per-sender order.
    outbox: mpsc::UnboundedSender<RelayedSignal>,
}

/// Receiving end of a connection's outbox.
pub type Outbox = mpsc::UnboundedReceiver<RelayedSignal>;

/// Manages all active WebSocket connections.
///
/// Thread-safe and designed for concurrent access from multiple
/// WebSocket handlers. Uses hierarchical cancellation tokens for
/// efficient force-close of all connections.
pub struct WsConnectionManager {
    /// Active connections: connection_id -> ConnectionState
    connections: DashMap<ConnectionId, ConnectionState>,
    /// Counter for generating unique connection IDs.
    next_id: AtomicU64,
    /// Global cancellation token - when cancelled, all connections close.
    /// Wrapped in RwLock so it can be replaced after close_all().
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    /// Creates a new connection manager.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a new connection.
    ///
    /// Returns a guard that unregisters the connection when dropped, and the
    /// outbox the socket handler must drain.
    pub fn register(self: &Arc<Self>) -> (ConnectionGuard, Outbox) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conn_id = ConnectionId::new(format!("{}-{}", CONNECTION_ID_PREFIX, id));
        let cancel_token = self.global_cancel.read().child_token();
        let (outbox, rx) = mpsc::unbounded_channel();

        self.connections
            .insert(conn_id.clone(), ConnectionState { outbox });
        log::info!(
            "[WS] Connection registered: {} (total: {})",
            conn_id,
            self.connections.len()
        );

        let guard = ConnectionGuard {
            id: conn_id,
            manager: Arc::clone(self),
            cancel_token,
        };
        (guard, rx)
    }

    /// Unregisters a connection by ID.
    fn unregister(&self, id: &ConnectionId) {
        if self.connections.remove(id).is_some() {
            log::info!(
                "[WS] Connection unregistered: {} (remaining: {})",
                id,
                self.connections.len()
            );
        }
    }

    /// Returns the number of active connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns whether `id` is an active connection.
    #[must_use]
    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Force-closes all connections.
    ///
    /// This cancels the global token, which signals all connection handlers
    /// to terminate gracefully. After cancellation, a fresh token is created
    /// so new connections can still be accepted.
    ///
    /// Returns the number of connections that were signaled to close.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] Force-closing {} connection(s)", count);
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        } else {
            log::info!("[WS] close_all called but no connections to close");
        }
        count
    }
}

impl SignalingTransport for WsConnectionManager {
    fn deliver(&self, to: &ConnectionId, signal: RelayedSignal) -> bool {
        match self.connections.get(to) {
            Some(state) => state.outbox.send(signal).is_ok(),
            None => false,
        }
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that unregisters a connection when dropped.
///
/// This ensures connections are always cleaned up, even if the handler
/// panics or exits early.
pub struct ConnectionGuard {
    id: ConnectionId,
    manager: Arc<WsConnectionManager>,
    /// Token for this specific connection - cancelled on force-close.
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    /// Returns the connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Returns the cancellation token for this connection.
    ///
    /// Use this in `tokio::select!` to detect force-close requests:
    /// ```ignore
    /// tokio::select! {
    ///     _ = cancel_token.cancelled() => break,
    ///     // ... other branches
    /// }
    /// ```
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_prefixed() {
        let manager = Arc::new(WsConnectionManager::new());
        let (a, _rx_a) = manager.register();
        let (b, _rx_b) = manager.register();
        assert_eq!(a.id().as_str(), "ws-1");
        assert_eq!(b.id().as_str(), "ws-2");
        assert_eq!(manager.connection_count(), 2);
    }

    #[test]
    fn guard_drop_unregisters() {
        let manager = Arc::new(WsConnectionManager::new());
        let (guard, _rx) = manager.register();
        let id = guard.id().clone();
        assert!(manager.is_connected(&id));

        drop(guard);
        assert!(!manager.is_connected(&id));
        assert!(!manager.deliver(&id, RelayedSignal::BroadcasterReady));
    }

    #[tokio::test]
    async fn deliver_preserves_order() {
        let manager = Arc::new(WsConnectionManager::new());
        let (guard, mut rx) = manager.register();
        let from = ConnectionId::from("ws-9");

        for n in 0..3 {
            assert!(manager.deliver(
                guard.id(),
                RelayedSignal::IceCandidate {
                    from: from.clone(),
                    candidate: serde_json::json!(n),
                },
            ));
        }

        for n in 0..3 {
            match rx.recv().await {
                Some(RelayedSignal::IceCandidate { candidate, .. }) => {
                    assert_eq!(candidate, serde_json::json!(n))
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn deliver_to_closed_outbox_fails() {
        let manager = Arc::new(WsConnectionManager::new());
        let (guard, rx) = manager.register();
        drop(rx);
        assert!(!manager.deliver(guard.id(), RelayedSignal::BroadcasterReady));
    }

    #[test]
    fn close_all_cancels_existing_but_not_new_connections() {
        let manager = Arc::new(WsConnectionManager::new());
        let (old, _rx_old) = manager.register();

        assert_eq!(manager.close_all(), 1);
        assert!(old.cancel_token().is_cancelled());

        let (new, _rx_new) = manager.register();
        assert!(!new.cancel_token().is_cancelled());
    }
}
