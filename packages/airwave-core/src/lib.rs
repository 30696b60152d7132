//! Airwave Core - broadcast orchestration for a browser-based internet radio station.
//!
//! The crate owns the station's broadcast state (Live vs AutoDJ), rotates
//! the active playlist when no human is on air, tracks connected listeners
//! and relays WebRTC signaling between the broadcaster and its listeners.
//! Media never passes through the server.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`runtime`]: Task spawning and cancellable timers
//! - [`services`]: Session, state machine, AutoDJ scheduler, listener registry, signaling relay
//! - [`events`]: Station-wide events fanned out to every WebSocket client
//! - [`store`]: Contract to the track/playlist storage collaborator
//! - [`api`]: HTTP control surface and the `/ws` endpoint
//! - [`bootstrap`]: Composition root
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks and timers
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`BroadcastStore`](store::BroadcastStore): Tracks, playlists and status history
//! - [`SignalingTransport`](services::SignalingTransport): Point-to-point delivery

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types at the crate root
pub use error::{AirwaveError, AirwaveResult, ErrorCode};
pub use events::{BroadcastEvent, BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
pub use runtime::{TaskSpawner, TimerHandle, TokioSpawner};
pub use state::Config;
pub use store::{BroadcastStore, Catalog, MemoryStore, StoreError, StoreResult};
pub use types::{BroadcastMode, ConnectionId, Playlist, PlaylistId, StatusSnapshot, Track, TrackId};
pub use utils::now_millis;

// Re-export service types
pub use services::{
    BroadcastState, BroadcastStateMachine, BroadcastStatus, ModeRequest, SignalingRelay, SkipError,
};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_services_with_spawner, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, ServerError, WsConnectionManager};
