//! Fire-and-forget persistence of status snapshots.
//!
//! Transitions never wait on storage. The snapshot is captured while the
//! session lock is held and written from a spawned task; a failed write is
//! logged and otherwise ignored.

use std::sync::Arc;

use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::store::BroadcastStore;
use crate::types::{PlaylistId, StatusSnapshot};

/// Writes snapshots and active-playlist flags in the background.
#[derive(Clone)]
pub struct StatusRecorder {
    store: Arc<dyn BroadcastStore>,
    spawner: TokioSpawner,
}

impl StatusRecorder {
    pub fn new(store: Arc<dyn BroadcastStore>, spawner: TokioSpawner) -> Self {
        Self { store, spawner }
    }

    /// Appends `snapshot` to the history without blocking the caller.
    pub fn record(&self, snapshot: StatusSnapshot) {
        let store = Arc::clone(&self.store);
        self.spawner.spawn(async move {
            if let Err(e) = store.append_snapshot(snapshot).await {
                log::warn!("[StatusRecorder] Failed to append snapshot: {}", e);
            }
        });
    }

    /// Marks `playlist_id` active, then appends `snapshot`.
    ///
    /// The snapshot is still appended when the flag update fails.
    pub fn record_activation(&self, playlist_id: PlaylistId, snapshot: StatusSnapshot) {
        let store = Arc::clone(&self.store);
        self.spawner.spawn(async move {
            if let Err(e) = store.set_active_playlist(playlist_id).await {
                log::warn!(
                    "[StatusRecorder] Failed to mark playlist {} active: {}",
                    playlist_id,
                    e
                );
            }
            if let Err(e) = store.append_snapshot(snapshot).await {
                log::warn!("[StatusRecorder] Failed to append snapshot: {}", e);
            }
        });
    }
}
