//! Listener presence and count tracking.
//!
//! The registry is the single source of truth for "who is listening". The
//! count it reports is always the cardinality of the presence set, so a
//! duplicate join cannot inflate it and a leave for an unknown connection
//! cannot push it below zero.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::events::{EventEmitter, ListenerCountEvent};
use crate::types::ConnectionId;
use crate::utils::now_millis;

/// Presence record for one listener connection.
#[derive(Debug, Clone, Copy)]
struct ListenerPresence {
    joined_at: Instant,
}

/// Tracks connected listeners and publishes count changes.
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<ConnectionId, ListenerPresence>>,
    emitter: Arc<dyn EventEmitter>,
}

impl ListenerRegistry {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            emitter,
        }
    }

    /// Records `id` as listening and returns the new count.
    ///
    /// Publishes `listenerCount.changed` even when `id` was already present.
    pub fn join(&self, id: &ConnectionId) -> usize {
        let count = {
            let mut listeners = self.listeners.lock();
            if listeners.contains_key(id) {
                log::debug!("[Listeners] Duplicate join ignored: {}", id);
            } else {
                listeners.insert(
                    id.clone(),
                    ListenerPresence {
                        joined_at: Instant::now(),
                    },
                );
            }
            listeners.len()
        };
        log::info!("[Listeners] Listener joined: {} (total: {})", id, count);
        self.publish(count);
        count
    }

    /// Removes `id` and returns the new count.
    ///
    /// Publishes `listenerCount.changed` even when `id` was not present.
    pub fn leave(&self, id: &ConnectionId) -> usize {
        let (count, presence) = {
            let mut listeners = self.listeners.lock();
            let presence = listeners.remove(id);
            (listeners.len(), presence)
        };
        match presence {
            Some(p) => log::info!(
                "[Listeners] Listener left: {} after {:?} (total: {})",
                id,
                p.joined_at.elapsed(),
                count
            ),
            None => log::debug!("[Listeners] Leave for unknown listener: {}", id),
        }
        self.publish(count);
        count
    }

    /// Returns whether `id` is currently listening.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.listeners.lock().contains_key(id)
    }

    /// Returns the number of connected listeners.
    #[must_use]
    pub fn count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Returns the ids of all connected listeners, sorted.
    #[must_use]
    pub fn listeners(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.listeners.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn publish(&self, count: usize) {
        self.emitter.emit_listener_count(ListenerCountEvent {
            count,
            timestamp: now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::test_support::RecordingEmitter;

    fn registry() -> (ListenerRegistry, Arc<RecordingEmitter>) {
        let emitter = Arc::new(RecordingEmitter::default());
        (ListenerRegistry::new(emitter.clone()), emitter)
    }

    fn id(n: usize) -> ConnectionId {
        ConnectionId::new(format!("ws-{}", n))
    }

    #[test]
    fn joins_minus_leaves() {
        let (registry, _) = registry();
        for n in 0..5 {
            registry.join(&id(n));
        }
        for n in 0..3 {
            registry.leave(&id(n));
        }
        assert_eq!(registry.count(), 2);
        assert!(registry.contains(&id(4)));
        assert!(!registry.contains(&id(0)));
    }

    #[test]
    fn leaves_without_joins_clamp_at_zero() {
        let (registry, emitter) = registry();
        for n in 0..4 {
            assert_eq!(registry.leave(&id(n)), 0);
        }
        assert_eq!(registry.count(), 0);
        assert_eq!(emitter.listener_counts(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn duplicate_join_does_not_inflate_count() {
        let (registry, _) = registry();
        assert_eq!(registry.join(&id(1)), 1);
        assert_eq!(registry.join(&id(1)), 1);
        assert_eq!(registry.leave(&id(1)), 0);
    }

    #[test]
    fn every_call_publishes_new_count() {
        let (registry, emitter) = registry();
        registry.join(&id(1));
        registry.join(&id(2));
        registry.leave(&id(1));
        assert_eq!(emitter.listener_counts(), vec![1, 2, 1]);
    }

    #[test]
    fn listeners_are_sorted() {
        let (registry, _) = registry();
        registry.join(&id(3));
        registry.join(&id(1));
        registry.join(&id(2));
        assert_eq!(registry.listeners(), vec![id(1), id(2), id(3)]);
    }
}
