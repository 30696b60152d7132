//! In-memory implementation of [`BroadcastStore`].
//!
//! Tracks and playlists are seeded from a JSON catalog file. The snapshot
//! history can optionally be persisted to a data directory so the stats
//! endpoint survives restarts.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{BroadcastStore, StoreError, StoreResult};
use crate::protocol_constants::{STATUS_HISTORY_FILE, STATUS_HISTORY_RETENTION};
use crate::types::{Playlist, PlaylistId, StatusSnapshot, Track, TrackId};

/// Seed data for the in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub playlists: Vec<Playlist>,
}

impl Catalog {
    /// Loads a catalog from a JSON file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[derive(Default)]
struct Tables {
    tracks: HashMap<TrackId, Track>,
    playlists: BTreeMap<PlaylistId, Playlist>,
    /// Oldest first, at most `retention` rows.
    history: VecDeque<StatusSnapshot>,
}

/// Thread-safe in-memory store.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Directory for `status_history.json`; `None` keeps history in memory only.
    data_dir: Option<PathBuf>,
    /// Number of snapshots kept; older rows are dropped.
    retention: usize,
    /// Serializes history file writes so an older history never overwrites a newer one.
    persist_lock: Mutex<()>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            data_dir: None,
            retention: STATUS_HISTORY_RETENTION,
            persist_lock: Mutex::new(()),
        }
    }

    /// Creates a store seeded from a catalog.
    pub fn from_catalog(catalog: Catalog) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write();
            for track in catalog.tracks {
                tables.tracks.insert(track.id, track);
            }
            for playlist in catalog.playlists {
                tables.playlists.insert(playlist.id, playlist);
            }
        }
        store
    }

    /// Enables history persistence in `data_dir`, loading any existing history.
    ///
    /// A missing or unreadable history file starts an empty history.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let path = data_dir.join(STATUS_HISTORY_FILE);
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Vec<StatusSnapshot>>(&contents) {
                Ok(history) => {
                    log::info!(
                        "[Store] Loaded {} snapshot(s) from {}",
                        history.len(),
                        path.display()
                    );
                    let mut history = VecDeque::from(history);
                    truncate_oldest(&mut history, self.retention);
                    self.tables.write().history = history;
                }
                Err(e) => log::warn!("[Store] Ignoring corrupt {}: {}", path.display(), e),
            },
            Err(_) => log::debug!("[Store] No history at {}", path.display()),
        }
        self.data_dir = Some(data_dir);
        self
    }

    /// Keeps at most `retention` snapshots (at least one).
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        truncate_oldest(&mut self.tables.write().history, self.retention);
        self
    }

    /// Inserts or replaces a track.
    pub fn upsert_track(&self, track: Track) {
        self.tables.write().tracks.insert(track.id, track);
    }

    /// Inserts or replaces a playlist (including its track order).
    pub fn upsert_playlist(&self, playlist: Playlist) {
        self.tables.write().playlists.insert(playlist.id, playlist);
    }

    /// Returns ids of playlists currently flagged active.
    pub fn active_playlists(&self) -> Vec<PlaylistId> {
        self.tables
            .read()
            .playlists
            .values()
            .filter(|p| p.is_active)
            .map(|p| p.id)
            .collect()
    }

    /// Writes the retained history to disk off the async workers.
    async fn persist_history(&self, data_dir: &Path) -> StoreResult<()> {
        let _guard = self.persist_lock.lock().await;
        // Taken under the persist lock, so the newest history always lands last
        let contents = serde_json::to_vec_pretty(&self.tables.read().history)?;
        let data_dir = data_dir.to_path_buf();
        tokio::task::spawn_blocking(move || write_history(&data_dir, &contents))
            .await
            .map_err(|e| StoreError::Unavailable(format!("history writer failed: {}", e)))?
    }
}

/// Atomic write (temp file + rename).
fn write_history(data_dir: &Path, contents: &[u8]) -> StoreResult<()> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(STATUS_HISTORY_FILE);
    let temp_path = data_dir.join(format!("{}.tmp", STATUS_HISTORY_FILE));
    std::fs::write(&temp_path, contents)?;
    std::fs::rename(&temp_path, &path)?;
    Ok(())
}

fn truncate_oldest(history: &mut VecDeque<StatusSnapshot>, retention: usize) {
    while history.len() > retention {
        history.pop_front();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastStore for MemoryStore {
    async fn playlist_tracks(&self, playlist_id: PlaylistId) -> StoreResult<Vec<Track>> {
        let tables = self.tables.read();
        let Some(playlist) = tables.playlists.get(&playlist_id) else {
            return Ok(Vec::new());
        };
        let mut refs = playlist.tracks.clone();
        refs.sort_by_key(|r| r.position);
        Ok(refs
            .iter()
            .filter_map(|r| tables.tracks.get(&r.track_id).cloned())
            .collect())
    }

    async fn append_snapshot(&self, snapshot: StatusSnapshot) -> StoreResult<()> {
        {
            let mut tables = self.tables.write();
            tables.history.push_back(snapshot);
            truncate_oldest(&mut tables.history, self.retention);
        }
        if let Some(ref data_dir) = self.data_dir {
            self.persist_history(data_dir).await?;
        }
        Ok(())
    }

    async fn set_active_playlist(&self, playlist_id: PlaylistId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        for playlist in tables.playlists.values_mut() {
            playlist.is_active = false;
        }
        if let Some(playlist) = tables.playlists.get_mut(&playlist_id) {
            playlist.is_active = true;
        }
        Ok(())
    }

    async fn latest_snapshot(&self) -> StoreResult<Option<StatusSnapshot>> {
        Ok(self.tables.read().history.back().cloned())
    }

    async fn snapshot_history(&self, limit: usize) -> StoreResult<Vec<StatusSnapshot>> {
        Ok(self
            .tables
            .read()
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn track(&self, track_id: TrackId) -> StoreResult<Option<Track>> {
        Ok(self.tables.read().tracks.get(&track_id).cloned())
    }
}
