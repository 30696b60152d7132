//! Application services layer.
//!
//! This module contains the broadcast logic that sits between the API layer
//! and the storage collaborator: the session and its state machine, the
//! AutoDJ scheduler, listener presence and the signaling relay.

pub mod broadcast_machine;
pub mod listener_registry;
pub mod scheduler;
pub mod session;
pub mod signaling_relay;
pub mod status_recorder;

pub use broadcast_machine::{BroadcastStateMachine, BroadcastStatus, ModeRequest};
pub use listener_registry::ListenerRegistry;
pub use scheduler::{AutoDjScheduler, SkipError};
pub use session::{BroadcastSession, BroadcastState, SharedSession};
pub use signaling_relay::{ConnectionRole, RelayedSignal, SignalingRelay, SignalingTransport};
pub use status_recorder::StatusRecorder;
