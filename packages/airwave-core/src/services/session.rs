//! The broadcast session: the single mutable state of the station.
//!
//! Fields are private; every mutation goes through a named transition so the
//! invariants below can be checked in one place:
//!
//! - at most one pending advance timer exists, and arming a new one cancels
//!   the previous
//! - `current_track_index` is only ever advanced modulo a freshly fetched
//!   track-list length
//! - every transition bumps `epoch`, so an advance that suspended on the
//!   store can tell whether the session moved underneath it

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::runtime::TimerHandle;
use crate::types::{BroadcastMode, PlaylistId, StatusSnapshot, Track};
use crate::utils::now_millis;

/// Session shared between the state machine and the scheduler.
///
/// Never held across an `.await`.
pub type SharedSession = Arc<Mutex<BroadcastSession>>;

/// Observable station state, derived from the session fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastState {
    /// No playlist and not live.
    Idle,
    /// Rotating through the active playlist.
    AutoDjRunning,
    /// Broadcaster is live.
    Live,
}

/// Process-lifetime broadcast session.
#[derive(Debug)]
pub struct BroadcastSession {
    mode: BroadcastMode,
    is_live: bool,
    active_playlist_id: Option<PlaylistId>,
    current_track_index: usize,
    current_track: Option<Track>,
    pending_timer: Option<TimerHandle>,
    epoch: u64,
}

impl BroadcastSession {
    pub fn new() -> Self {
        Self {
            mode: BroadcastMode::AutoDj,
            is_live: false,
            active_playlist_id: None,
            current_track_index: 0,
            current_track: None,
            pending_timer: None,
            epoch: 0,
        }
    }

    pub fn shared() -> SharedSession {
        Arc::new(Mutex::new(Self::new()))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> BroadcastState {
        if self.is_live {
            BroadcastState::Live
        } else if self.active_playlist_id.is_some() {
            BroadcastState::AutoDjRunning
        } else {
            BroadcastState::Idle
        }
    }

    pub fn mode(&self) -> BroadcastMode {
        self.mode
    }

    pub fn is_live(&self) -> bool {
        self.is_live
    }

    pub fn active_playlist_id(&self) -> Option<PlaylistId> {
        self.active_playlist_id
    }

    pub fn current_track_index(&self) -> usize {
        self.current_track_index
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.pending_timer.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Playlist the scheduler should advance, if AutoDJ is actually running.
    pub fn rotating_playlist(&self) -> Option<PlaylistId> {
        match self.state() {
            BroadcastState::AutoDjRunning => self.active_playlist_id,
            _ => None,
        }
    }

    /// Captures the session as a snapshot row.
    pub fn snapshot(&self, listener_count: usize) -> StatusSnapshot {
        StatusSnapshot {
            timestamp: now_millis(),
            is_live: self.is_live,
            mode: self.mode,
            current_track_id: self.current_track.as_ref().map(|t| t.id),
            listener_count,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Timer bookkeeping
    // ─────────────────────────────────────────────────────────────────────

    /// Stores `handle` as the pending timer, cancelling any previous one.
    pub(crate) fn arm_timer(&mut self, handle: TimerHandle) {
        if let Some(previous) = self.pending_timer.replace(handle) {
            previous.cancel();
        }
    }

    /// Cancels and forgets the pending timer. Returns whether one was pending.
    pub(crate) fn cancel_pending_timer(&mut self) -> bool {
        match self.pending_timer.take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Claims the pending timer for a firing task.
    ///
    /// Returns `false` when `timer_id` is no longer the pending timer (it was
    /// cancelled or replaced), in which case the firing task must do nothing.
    pub(crate) fn claim_timer(&mut self, timer_id: u64) -> bool {
        match self.pending_timer {
            Some(ref handle) if handle.id() == timer_id && !handle.is_cancelled() => {
                self.pending_timer = None;
                true
            }
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────

    fn bump_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Any state → Live. The track index is left where AutoDJ stopped, but
    /// no AutoDJ track is reported while a human is on air.
    pub(crate) fn enter_live(&mut self) {
        self.bump_epoch();
        self.cancel_pending_timer();
        self.mode = BroadcastMode::Live;
        self.is_live = true;
        self.current_track = None;
    }

    /// Live → AutoDjRunning or Idle. Returns whether AutoDJ should resume.
    pub(crate) fn leave_live(&mut self) -> bool {
        self.bump_epoch();
        self.cancel_pending_timer();
        self.is_live = false;
        self.mode = BroadcastMode::AutoDj;
        self.active_playlist_id.is_some()
    }

    /// Any state → AutoDjRunning on `playlist_id`, starting from the first track.
    pub(crate) fn enter_autodj(&mut self, playlist_id: PlaylistId) {
        self.bump_epoch();
        self.cancel_pending_timer();
        self.active_playlist_id = Some(playlist_id);
        self.mode = BroadcastMode::AutoDj;
        self.is_live = false;
        self.current_track_index = 0;
        self.current_track = None;
    }

    /// Forgets the playlist and rotation position.
    ///
    /// Mode and live flag are untouched so a live broadcast stays live.
    pub(crate) fn clear_autodj(&mut self) {
        self.bump_epoch();
        self.cancel_pending_timer();
        self.active_playlist_id = None;
        self.current_track_index = 0;
        if !self.is_live {
            self.mode = BroadcastMode::AutoDj;
            self.current_track = None;
        }
    }

    /// Begins an advance that is about to suspend on the store.
    ///
    /// Cancels any pending timer so a concurrent firing cannot advance too,
    /// and returns the epoch the advance must still observe when it resumes.
    pub(crate) fn begin_advance(&mut self) -> u64 {
        self.cancel_pending_timer();
        self.bump_epoch();
        self.epoch
    }

    /// Selects the next track from a freshly fetched list.
    ///
    /// Picks `tracks[index % len]` and moves the index to the following
    /// position. Returns `None` (index untouched) for an empty list.
    pub(crate) fn select_next(&mut self, tracks: &[Track]) -> Option<Track> {
        if tracks.is_empty() {
            return None;
        }
        let index = self.current_track_index % tracks.len();
        let track = tracks[index].clone();
        self.current_track_index = (index + 1) % tracks.len();
        self.current_track = Some(track.clone());
        Some(track)
    }

    /// Records a manually selected current track (rotation index untouched).
    pub(crate) fn override_current_track(&mut self, track: Track) {
        self.current_track = Some(track);
    }
}

impl Default for BroadcastSession {
    fn default() -> Self {
        Self::new()
    }
}
