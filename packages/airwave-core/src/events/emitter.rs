//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{ListenerCountEvent, ModeEvent, TrackEvent};

/// Trait for emitting station-wide events without knowledge of transport.
///
/// The state machine, scheduler and listener registry use this trait; how
/// events reach clients (WebSocket fan-out, logs, tests) is up to the
/// implementation.
pub trait EventEmitter: Send + Sync {
    /// Emits a mode change (after every state-machine transition).
    fn emit_mode(&self, event: ModeEvent);

    /// Emits a track change (scheduler advance or manual override).
    fn emit_track(&self, event: TrackEvent);

    /// Emits a new listener count.
    fn emit_listener_count(&self, event: ListenerCountEvent);
}

/// No-op emitter for embedding or testing.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_mode(&self, _event: ModeEvent) {}

    fn emit_track(&self, _event: TrackEvent) {}

    fn emit_listener_count(&self, _event: ListenerCountEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level. The server attaches it to the bridge as
/// an external emitter when debug logging is enabled.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_mode(&self, event: ModeEvent) {
        tracing::debug!(?event, "mode_event");
    }

    fn emit_track(&self, event: TrackEvent) {
        tracing::debug!(track_id = %event.track.id, title = %event.track.title, "track_event");
    }

    fn emit_listener_count(&self, event: ListenerCountEvent) {
        tracing::debug!(count = event.count, "listener_count_event");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::Mutex;

    use super::*;
    use crate::events::BroadcastEvent;

    /// Emitter that records every event in order.
    #[derive(Default)]
    pub struct RecordingEmitter {
        events: Mutex<Vec<BroadcastEvent>>,
    }

    impl RecordingEmitter {
        pub fn events(&self) -> Vec<BroadcastEvent> {
            self.events.lock().clone()
        }

        pub fn track_ids(&self) -> Vec<i64> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    BroadcastEvent::TrackChanged(t) => Some(t.track.id.0),
                    _ => None,
                })
                .collect()
        }

        pub fn mode_changes(&self) -> Vec<ModeEvent> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    BroadcastEvent::ModeChanged(m) => Some(m),
                    _ => None,
                })
                .collect()
        }

        pub fn listener_counts(&self) -> Vec<usize> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    BroadcastEvent::ListenerCountChanged(c) => Some(c.count),
                    _ => None,
                })
                .collect()
        }
    }

    impl EventEmitter for RecordingEmitter {
        fn emit_mode(&self, event: ModeEvent) {
            self.events.lock().push(event.into());
        }

        fn emit_track(&self, event: TrackEvent) {
            self.events.lock().push(event.into());
        }

        fn emit_listener_count(&self, event: ListenerCountEvent) {
            self.events.lock().push(event.into());
        }
    }
}
