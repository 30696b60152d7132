//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit station-wide events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for mode, track and listener-count changes
//!
//! Targeted signaling traffic (offers, answers, ICE) never goes through this
//! fan-out; see [`crate::services::signaling_relay`].

mod bridge;
pub(crate) mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::types::{BroadcastMode, Track};

/// Events broadcast to every connected client.
///
/// Serialized as `{"event": "<name>", "payload": {...}}` so the browser can
/// dispatch on the event name exactly as it does for signaling messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum BroadcastEvent {
    /// Emitted after every state-machine transition.
    #[serde(rename = "mode.changed")]
    ModeChanged(ModeEvent),

    /// Emitted on every scheduler advance (and manual current-track override).
    #[serde(rename = "track.changed")]
    TrackChanged(TrackEvent),

    /// Emitted on every listener join/leave.
    #[serde(rename = "listenerCount.changed")]
    ListenerCountChanged(ListenerCountEvent),
}

/// Payload of `mode.changed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeEvent {
    pub mode: BroadcastMode,
    pub is_live: bool,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// Payload of `track.changed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    pub track: Track,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// Payload of `listenerCount.changed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerCountEvent {
    pub count: usize,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

impl From<ModeEvent> for BroadcastEvent {
    fn from(event: ModeEvent) -> Self {
        BroadcastEvent::ModeChanged(event)
    }
}

impl From<TrackEvent> for BroadcastEvent {
    fn from(event: TrackEvent) -> Self {
        BroadcastEvent::TrackChanged(event)
    }
}

impl From<ListenerCountEvent> for BroadcastEvent {
    fn from(event: ListenerCountEvent) -> Self {
        BroadcastEvent::ListenerCountChanged(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_event_wire_format() {
        let event: BroadcastEvent = ModeEvent {
            mode: BroadcastMode::Live,
            is_live: true,
            timestamp: 5,
        }
        .into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "mode.changed");
        assert_eq!(json["payload"]["mode"], "live");
        assert_eq!(json["payload"]["isLive"], true);
    }

    #[test]
    fn listener_count_wire_format() {
        let event: BroadcastEvent = ListenerCountEvent {
            count: 4,
            timestamp: 0,
        }
        .into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "listenerCount.changed");
        assert_eq!(json["payload"]["count"], 4);
    }
}
