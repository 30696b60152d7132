//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to services.
//! It provides the router construction and server startup functionality.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::events::BroadcastEventBridge;
use crate::protocol_constants::{DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START};
use crate::services::{BroadcastStateMachine, ListenerRegistry, SignalingRelay};
use crate::state::Config;
use crate::store::BroadcastStore;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Live/AutoDJ state machine.
    pub machine: Arc<BroadcastStateMachine>,
    /// WebRTC signaling relay.
    pub relay: Arc<SignalingRelay>,
    /// Connected listeners.
    pub registry: Arc<ListenerRegistry>,
    /// Track/playlist storage collaborator.
    pub store: Arc<dyn BroadcastStore>,
    /// Event bridge every WebSocket connection subscribes to.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
    /// Cancelled on shutdown; stops the HTTP server.
    pub shutdown: CancellationToken,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    machine: Option<Arc<BroadcastStateMachine>>,
    relay: Option<Arc<SignalingRelay>>,
    registry: Option<Arc<ListenerRegistry>>,
    store: Option<Arc<dyn BroadcastStore>>,
    event_bridge: Option<Arc<BroadcastEventBridge>>,
    ws_manager: Option<Arc<WsConnectionManager>>,
    config: Option<Arc<RwLock<Config>>>,
    shutdown: Option<CancellationToken>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state machine.
    pub fn machine(mut self, machine: Arc<BroadcastStateMachine>) -> Self {
        self.machine = Some(machine);
        self
    }

    /// Sets the signaling relay.
    pub fn relay(mut self, relay: Arc<SignalingRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Sets the listener registry.
    pub fn registry(mut self, registry: Arc<ListenerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the storage collaborator.
    pub fn store(mut self, store: Arc<dyn BroadcastStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the event bridge.
    pub fn event_bridge(mut self, bridge: Arc<BroadcastEventBridge>) -> Self {
        self.event_bridge = Some(bridge);
        self
    }

    /// Sets the WebSocket connection manager.
    pub fn ws_manager(mut self, manager: Arc<WsConnectionManager>) -> Self {
        self.ws_manager = Some(manager);
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Arc<RwLock<Config>>) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the shutdown token (a fresh one is created if unset).
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            machine: self.machine.expect("machine is required"),
            relay: self.relay.expect("relay is required"),
            registry: self.registry.expect("registry is required"),
            store: self.store.expect("store is required"),
            event_bridge: self.event_bridge.expect("event_bridge is required"),
            ws_manager: self.ws_manager.expect("ws_manager is required"),
            config: self.config.expect("config is required"),
            shutdown: self.shutdown.unwrap_or_default(),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Builds the API state from bootstrapped services.
    pub fn new(services: &BootstrappedServices, config: Arc<RwLock<Config>>) -> Self {
        Self::builder()
            .machine(Arc::clone(&services.machine))
            .relay(Arc::clone(&services.relay))
            .registry(Arc::clone(&services.registry))
            .store(Arc::clone(&services.store))
            .event_bridge(Arc::clone(&services.event_bridge))
            .ws_manager(Arc::clone(&services.ws_manager))
            .config(config)
            .shutdown(services.cancel_token.clone())
            .build()
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
///
/// Runs until the state's shutdown token is cancelled.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(DEFAULT_PORT_RANGE_START, DEFAULT_PORT_RANGE_END).await?
    };

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let shutdown = state.shutdown.clone();
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
