//! Contract to the track/playlist storage collaborator.
//!
//! Durable storage of tracks and playlists lives outside the core. The
//! scheduler and state machine only depend on the [`BroadcastStore`] trait:
//! ordered tracks for a playlist, snapshot append, and the exclusive
//! active-playlist flag. [`MemoryStore`] is the implementation shipped with
//! the standalone server.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{PlaylistId, StatusSnapshot, Track, TrackId};

mod memory;

pub use memory::{Catalog, MemoryStore};

#[cfg(test)]
pub(crate) use memory::test_support;

/// Errors reported by the storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or refusing requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Filesystem failure while persisting or loading.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be encoded or decoded.
    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenient Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operations the broadcast core depends on.
///
/// Implementations must be safe to call concurrently. The core never caches
/// results: every scheduler advance re-reads the playlist so concurrent
/// playlist edits are picked up at the next track boundary.
#[async_trait]
pub trait BroadcastStore: Send + Sync {
    /// Returns the tracks of a playlist ordered by position.
    ///
    /// An unknown playlist yields an empty list, not an error.
    async fn playlist_tracks(&self, playlist_id: PlaylistId) -> StoreResult<Vec<Track>>;

    /// Appends a status snapshot to the history.
    async fn append_snapshot(&self, snapshot: StatusSnapshot) -> StoreResult<()>;

    /// Marks `playlist_id` active and every other playlist inactive.
    ///
    /// Clear-then-set: after this call at most one playlist is active.
    async fn set_active_playlist(&self, playlist_id: PlaylistId) -> StoreResult<()>;

    /// Returns the most recent snapshot, if any.
    async fn latest_snapshot(&self) -> StoreResult<Option<StatusSnapshot>>;

    /// Returns up to `limit` snapshots, newest first.
    async fn snapshot_history(&self, limit: usize) -> StoreResult<Vec<StatusSnapshot>>;

    /// Looks up a single track.
    async fn track(&self, track_id: TrackId) -> StoreResult<Option<Track>>;
}
