//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Embedders hand in the
//! storage collaborator; everything else is created here.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::WsConnectionManager;
use crate::error::{AirwaveError, AirwaveResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::runtime::TokioSpawner;
use crate::services::{
    AutoDjScheduler, BroadcastSession, BroadcastStateMachine, ListenerRegistry, SignalingRelay,
    SignalingTransport, StatusRecorder,
};
use crate::state::Config;
use crate::store::BroadcastStore;

/// Container for all bootstrapped services.
///
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Live/AutoDJ state machine; owns the broadcast session.
    pub machine: Arc<BroadcastStateMachine>,
    /// AutoDJ rotation driver.
    pub scheduler: Arc<AutoDjScheduler>,
    /// Point-to-point signaling relay.
    pub relay: Arc<SignalingRelay>,
    /// Connected listeners.
    pub registry: Arc<ListenerRegistry>,
    /// Track/playlist storage collaborator.
    pub store: Arc<dyn BroadcastStore>,
    /// Event bridge for emitting events to WebSocket and optional external consumers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services.
    ///
    /// Stops the AutoDJ timer and closes every WebSocket connection. The
    /// session itself is left as is; nothing is persisted on exit.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to the HTTP server and background tasks
        self.cancel_token.cancel();

        if self.scheduler.cancel() {
            log::info!("[Bootstrap] Cancelled pending AutoDJ advance");
        }

        let connections_closed = self.ws_manager.close_all();
        if connections_closed > 0 {
            log::info!(
                "[Bootstrap] Closed {} WebSocket connection(s)",
                connections_closed
            );
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all services on the current Tokio runtime.
///
/// # Errors
///
/// Returns [`AirwaveError::Configuration`] if `config` is invalid.
///
/// # Panics
///
/// Panics if called outside of a Tokio runtime context.
pub fn bootstrap_services(
    config: &Config,
    store: Arc<dyn BroadcastStore>,
) -> AirwaveResult<BootstrappedServices> {
    bootstrap_services_with_spawner(config, store, TokioSpawner::current())
}

/// Bootstraps all application services with their dependencies.
///
/// Services are created in dependency order:
///
/// 1. Shared infrastructure (event bridge and cancellation token)
/// 2. Listener registry and WebSocket manager
/// 3. Signaling relay (delivers through the WebSocket manager)
/// 4. Session, status recorder and AutoDJ scheduler
/// 5. State machine (depends on all of the above)
///
/// # Errors
///
/// Returns [`AirwaveError::Configuration`] if `config` is invalid.
pub fn bootstrap_services_with_spawner(
    config: &Config,
    store: Arc<dyn BroadcastStore>,
    spawner: TokioSpawner,
) -> AirwaveResult<BootstrappedServices> {
    config.validate().map_err(AirwaveError::Configuration)?;

    // Event bridge owning the broadcast channel every WebSocket client subscribes to
    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    let emitter = Arc::clone(&event_bridge) as Arc<dyn EventEmitter>;

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let registry = Arc::new(ListenerRegistry::new(Arc::clone(&emitter)));
    let ws_manager = Arc::new(WsConnectionManager::new());

    let relay = Arc::new(SignalingRelay::new(
        Arc::clone(&ws_manager) as Arc<dyn SignalingTransport>,
        Arc::clone(&registry),
    ));

    let session = BroadcastSession::shared();
    let recorder = StatusRecorder::new(Arc::clone(&store), spawner.clone());

    let scheduler = Arc::new(AutoDjScheduler::new(
        Arc::clone(&session),
        Arc::clone(&store),
        Arc::clone(&emitter),
        Arc::clone(&registry),
        recorder.clone(),
        spawner,
        config.fallback_track_duration(),
    ));

    let machine = Arc::new(BroadcastStateMachine::new(
        session,
        Arc::clone(&scheduler),
        Arc::clone(&relay),
        Arc::clone(&registry),
        Arc::clone(&store),
        recorder,
        emitter,
    ));

    Ok(BootstrappedServices {
        machine,
        scheduler,
        relay,
        registry,
        store,
        event_bridge,
        ws_manager,
        cancel_token,
    })
}
