//! Broadcast state machine: Live / AutoDJ / Idle transitions.
//!
//! Every transition is applied to the session synchronously under its lock,
//! before any await. The status snapshot is captured at that moment and
//! written in the background, then `mode.changed` goes out to every client
//! and the relay is told about live begin/end.
//!
//! ```text
//!            start_autodj(p)                 start_live()
//!   Idle ───────────────────▶ AutoDjRunning ─────────────▶ Live
//!    ▲                            │   ▲                     │
//!    │        stop_autodj()       │   │ stop_live()         │
//!    └────────────────────────────┘   └─────────────────────┤
//!    ▲                                  (playlist set)      │
//!    └──────────────────────────────────────────────────────┘
//!                    stop_live() (no playlist)
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{AirwaveError, AirwaveResult};
use crate::events::{EventEmitter, ModeEvent, TrackEvent};
use crate::services::listener_registry::ListenerRegistry;
use crate::services::scheduler::{AutoDjScheduler, SkipError};
use crate::services::session::{BroadcastState, SharedSession};
use crate::services::signaling_relay::SignalingRelay;
use crate::services::status_recorder::StatusRecorder;
use crate::store::BroadcastStore;
use crate::types::{BroadcastMode, PlaylistId, StatusSnapshot, Track, TrackId};
use crate::utils::now_millis;

/// Target mode requested through the idempotent mode endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeRequest {
    Live,
    /// AutoDJ on the given playlist, or on the current one when `None`.
    AutoDj(Option<PlaylistId>),
    Idle,
}

impl ModeRequest {
    /// Parses a wire mode name (`live`, `autodj`, `idle`).
    pub fn parse(mode: &str, playlist_id: Option<PlaylistId>) -> AirwaveResult<Self> {
        match mode {
            "live" => Ok(Self::Live),
            "autodj" => Ok(Self::AutoDj(playlist_id)),
            "idle" => Ok(Self::Idle),
            other => Err(AirwaveError::InvalidRequest(format!(
                "Invalid mode \"{}\". Must be \"live\", \"autodj\" or \"idle\"",
                other
            ))),
        }
    }
}

/// Point-in-time view of the station.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastStatus {
    pub state: BroadcastState,
    pub mode: BroadcastMode,
    pub is_live: bool,
    pub active_playlist_id: Option<PlaylistId>,
    pub current_track: Option<Track>,
    pub listener_count: usize,
}

/// Owns the broadcast session and applies mode transitions.
pub struct BroadcastStateMachine {
    session: SharedSession,
    scheduler: Arc<AutoDjScheduler>,
    relay: Arc<SignalingRelay>,
    registry: Arc<ListenerRegistry>,
    store: Arc<dyn BroadcastStore>,
    recorder: StatusRecorder,
    emitter: Arc<dyn EventEmitter>,
}

impl BroadcastStateMachine {
    pub fn new(
        session: SharedSession,
        scheduler: Arc<AutoDjScheduler>,
        relay: Arc<SignalingRelay>,
        registry: Arc<ListenerRegistry>,
        store: Arc<dyn BroadcastStore>,
        recorder: StatusRecorder,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            session,
            scheduler,
            relay,
            registry,
            store,
            recorder,
            emitter,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────

    /// Any state → Live.
    ///
    /// The pending advance is cancelled but the rotation index is kept, so
    /// a later [`stop_live`](Self::stop_live) resumes where AutoDJ stopped.
    /// Listeners are told to reset their peer connections.
    pub fn start_live(&self) {
        let listener_count = self.registry.count();
        let snapshot = {
            let mut session = self.session.lock();
            session.enter_live();
            session.snapshot(listener_count)
        };
        log::info!("[Machine] Live broadcast started");

        self.publish(snapshot);
        self.relay.begin_live();
        self.relay.broadcaster_ready();
    }

    /// Live → AutoDjRunning (playlist set) or Idle. No-op when not live.
    ///
    /// Returns the state the station ended up in.
    pub fn stop_live(&self) -> BroadcastState {
        let listener_count = self.registry.count();
        let (snapshot, state) = {
            let mut session = self.session.lock();
            if !session.is_live() {
                log::debug!("[Machine] stop_live ignored, not live");
                return session.state();
            }
            if session.leave_live() {
                self.scheduler.schedule_in(&mut session, Duration::ZERO);
            }
            (session.snapshot(listener_count), session.state())
        };
        log::info!("[Machine] Live broadcast stopped, now {:?}", state);

        self.relay.end_live();
        self.publish(snapshot);
        state
    }

    /// Any state → AutoDjRunning on `playlist_id`, starting from its first track.
    pub fn start_autodj(&self, playlist_id: PlaylistId) {
        let listener_count = self.registry.count();
        let (snapshot, was_live) = {
            let mut session = self.session.lock();
            let was_live = session.is_live();
            session.enter_autodj(playlist_id);
            self.scheduler.schedule_in(&mut session, Duration::ZERO);
            (session.snapshot(listener_count), was_live)
        };
        log::info!("[Machine] AutoDJ started on playlist {}", playlist_id);

        if was_live {
            self.relay.end_live();
        }
        self.recorder.record_activation(playlist_id, snapshot.clone());
        self.emit_mode(&snapshot);
    }

    /// Clears the AutoDJ playlist and cancels the pending advance.
    ///
    /// From AutoDjRunning or Idle this lands in Idle. While live the
    /// broadcast continues; only the playlist to resume is forgotten.
    pub fn stop_autodj(&self) {
        let listener_count = self.registry.count();
        let snapshot = {
            let mut session = self.session.lock();
            session.clear_autodj();
            session.snapshot(listener_count)
        };
        log::info!("[Machine] AutoDJ stopped");

        self.publish(snapshot);
    }

    /// Moves the station to the requested mode, doing nothing if it is
    /// already there.
    ///
    /// Returns whether a transition happened.
    pub fn apply_mode(&self, request: ModeRequest) -> AirwaveResult<bool> {
        let (state, active) = {
            let session = self.session.lock();
            (session.state(), session.active_playlist_id())
        };

        match request {
            ModeRequest::Live => {
                if state == BroadcastState::Live {
                    return Ok(false);
                }
                self.start_live();
            }
            ModeRequest::AutoDj(requested) => {
                let Some(playlist_id) = requested.or(active) else {
                    return Err(AirwaveError::InvalidRequest(
                        "playlistId is required to start AutoDJ".into(),
                    ));
                };
                match state {
                    BroadcastState::AutoDjRunning if active == Some(playlist_id) => {
                        return Ok(false)
                    }
                    BroadcastState::Live if active == Some(playlist_id) => {
                        self.stop_live();
                    }
                    _ => self.start_autodj(playlist_id),
                }
            }
            ModeRequest::Idle => match state {
                BroadcastState::Idle => return Ok(false),
                BroadcastState::AutoDjRunning => self.stop_autodj(),
                BroadcastState::Live => {
                    self.stop_autodj();
                    self.stop_live();
                }
            },
        }
        Ok(true)
    }

    /// Reacts to an edit of `playlist_id`.
    ///
    /// When AutoDJ runs that playlist but went idle (it was empty), an
    /// immediate advance is armed. Otherwise the edit is picked up at the
    /// next track boundary. Returns whether an advance was armed.
    pub fn playlist_changed(&self, playlist_id: PlaylistId) -> bool {
        let mut session = self.session.lock();
        if session.rotating_playlist() != Some(playlist_id) || session.has_pending_timer() {
            return false;
        }
        log::info!(
            "[Machine] Playlist {} changed while idle, resuming rotation",
            playlist_id
        );
        self.scheduler.schedule_in(&mut session, Duration::ZERO);
        true
    }

    /// Skips to the next AutoDJ track.
    pub async fn skip(&self) -> Result<Track, SkipError> {
        self.scheduler.skip().await
    }

    /// Overrides the current track with `track_id`.
    ///
    /// The rotation index is untouched, so AutoDJ continues from where it was
    /// at the next boundary.
    pub async fn set_current_track(&self, track_id: TrackId) -> AirwaveResult<Track> {
        let track = self
            .store
            .track(track_id)
            .await?
            .ok_or_else(|| AirwaveError::TrackNotFound(track_id.to_string()))?;

        let listener_count = self.registry.count();
        let snapshot = {
            let mut session = self.session.lock();
            session.override_current_track(track.clone());
            session.snapshot(listener_count)
        };
        log::info!("[Machine] Current track set to {} \"{}\"", track.id, track.title);

        self.recorder.record(snapshot);
        self.emitter.emit_track(TrackEvent {
            track: track.clone(),
            timestamp: now_millis(),
        });
        Ok(track)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    #[must_use]
    pub fn status(&self) -> BroadcastStatus {
        let listener_count = self.registry.count();
        let session = self.session.lock();
        BroadcastStatus {
            state: session.state(),
            mode: session.mode(),
            is_live: session.is_live(),
            active_playlist_id: session.active_playlist_id(),
            current_track: session.current_track().cloned(),
            listener_count,
        }
    }

    #[must_use]
    pub fn state(&self) -> BroadcastState {
        self.session.lock().state()
    }

    fn publish(&self, snapshot: StatusSnapshot) {
        self.emit_mode(&snapshot);
        self.recorder.record(snapshot);
    }

    fn emit_mode(&self, snapshot: &StatusSnapshot) {
        self.emitter.emit_mode(ModeEvent {
            mode: snapshot.mode,
            is_live: snapshot.is_live,
            timestamp: snapshot.timestamp,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scheduler::test_support::Harness;
    use crate::services::signaling_relay::test_support::RecordingTransport;
    use crate::services::signaling_relay::RelayedSignal;
    use crate::store::test_support::{store_with_playlist, track, ReadOnlyStore, SlowStore};
    use crate::store::MemoryStore;
    use tokio::time::sleep;

    struct Station {
        harness: Harness,
        transport: Arc<RecordingTransport>,
        relay: Arc<SignalingRelay>,
        machine: BroadcastStateMachine,
    }

    impl Station {
        fn new(store: MemoryStore) -> Self {
            Self::with_store(Arc::new(store))
        }

        fn with_store(store: Arc<dyn BroadcastStore>) -> Self {
            let harness = Harness::with_store(store);
            let transport = Arc::new(RecordingTransport::default());
            let relay = Arc::new(SignalingRelay::new(
                transport.clone(),
                Arc::clone(&harness.registry),
            ));
            let machine = BroadcastStateMachine::new(
                Arc::clone(&harness.session),
                Arc::clone(&harness.scheduler),
                Arc::clone(&relay),
                Arc::clone(&harness.registry),
                Arc::clone(&harness.store),
                harness.recorder.clone(),
                harness.emitter.clone(),
            );
            Self {
                harness,
                transport,
                relay,
                machine,
            }
        }

        fn tracks_played(&self) -> Vec<i64> {
            self.harness.emitter.track_ids()
        }

        async fn history_len(&self) -> usize {
            self.harness.store.snapshot_history(1000).await.unwrap().len()
        }
    }

    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    fn three_tracks() -> MemoryStore {
        store_with_playlist(vec![track(1, 30), track(2, 30), track(3, 30)])
    }

    #[tokio::test(start_paused = true)]
    async fn start_autodj_plays_first_track_immediately() {
        let station = Station::new(three_tracks());
        station.machine.start_autodj(PlaylistId(1));
        settle().await;

        assert_eq!(station.machine.state(), BroadcastState::AutoDjRunning);
        assert_eq!(station.tracks_played(), vec![1]);
        let modes = station.harness.emitter.mode_changes();
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].mode, BroadcastMode::AutoDj);
    }

    #[tokio::test(start_paused = true)]
    async fn live_cancels_pending_advance() {
        let station = Station::new(three_tracks());
        station.machine.start_autodj(PlaylistId(1));
        settle().await;

        station.machine.start_live();
        assert!(!station.harness.session.lock().has_pending_timer());

        sleep(Duration::from_secs(300)).await;
        assert_eq!(station.tracks_played(), vec![1]);
        assert_eq!(station.machine.state(), BroadcastState::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_live_then_stop_resumes_at_first_track() {
        let station = Station::new(three_tracks());
        station.machine.start_autodj(PlaylistId(1));
        // No yield: the first advance has not run yet
        station.machine.start_live();
        assert_eq!(station.machine.stop_live(), BroadcastState::AutoDjRunning);

        settle().await;
        assert_eq!(station.tracks_played(), vec![1]);
        assert_eq!(station.harness.session.lock().current_track_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_live_resumes_rotation_where_it_stopped() {
        let station = Station::new(three_tracks());
        station.machine.start_autodj(PlaylistId(1));
        settle().await;
        sleep(Duration::from_secs(31)).await;
        assert_eq!(station.tracks_played(), vec![1, 2]);

        station.machine.start_live();
        sleep(Duration::from_secs(600)).await;
        station.machine.stop_live();
        settle().await;

        assert_eq!(station.tracks_played(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_live_without_playlist_goes_idle() {
        let station = Station::new(MemoryStore::new());
        station.machine.start_live();

        assert_eq!(station.machine.stop_live(), BroadcastState::Idle);
        let status = station.machine.status();
        assert_eq!(status.state, BroadcastState::Idle);
        assert!(!status.is_live);
        assert_eq!(status.mode, BroadcastMode::AutoDj);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_live_when_not_live_is_a_noop() {
        let station = Station::new(three_tracks());
        assert_eq!(station.machine.stop_live(), BroadcastState::Idle);
        assert!(station.harness.emitter.mode_changes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_autodj_goes_idle_and_stays_quiet() {
        let station = Station::new(three_tracks());
        station.machine.start_autodj(PlaylistId(1));
        settle().await;

        station.machine.stop_autodj();
        assert_eq!(station.machine.state(), BroadcastState::Idle);
        assert_eq!(station.harness.session.lock().current_track_index(), 0);

        sleep(Duration::from_secs(300)).await;
        assert_eq!(station.tracks_played(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_autodj_while_live_keeps_broadcasting() {
        let station = Station::new(three_tracks());
        station.machine.start_autodj(PlaylistId(1));
        station.machine.start_live();
        station.machine.stop_autodj();

        assert_eq!(station.machine.state(), BroadcastState::Live);
        assert_eq!(station.machine.stop_live(), BroadcastState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn start_live_resets_listeners_and_notifies_relay() {
        let station = Station::new(MemoryStore::new());
        let listener = station.transport.connect("ws-2");
        station.relay.listener_joined(&listener);

        station.machine.start_live();

        assert!(station.relay.is_live());
        assert_eq!(
            station.transport.delivered_to(&listener),
            vec![RelayedSignal::BroadcasterReady]
        );

        station.machine.stop_live();
        assert!(!station.relay.is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn start_autodj_marks_playlist_active_and_snapshots() {
        let store = Arc::new(three_tracks());
        let station = Station::with_store(store.clone());
        station.machine.start_autodj(PlaylistId(1));
        settle().await;

        assert_eq!(store.active_playlists(), vec![PlaylistId(1)]);
        // Transition snapshot plus the first advance
        assert_eq!(station.history_len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_store_writes_do_not_block_transitions() {
        let station = Station::with_store(Arc::new(ReadOnlyStore {
            inner: three_tracks(),
        }));
        station.machine.start_autodj(PlaylistId(1));
        settle().await;
        assert_eq!(station.machine.state(), BroadcastState::AutoDjRunning);
        assert_eq!(station.tracks_played(), vec![1]);

        station.machine.start_live();
        assert_eq!(station.machine.state(), BroadcastState::Live);
        assert_eq!(station.history_len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn apply_mode_is_idempotent() {
        let station = Station::new(three_tracks());

        assert!(station
            .machine
            .apply_mode(ModeRequest::AutoDj(Some(PlaylistId(1))))
            .unwrap());
        settle().await;
        let history = station.history_len().await;
        let events = station.harness.emitter.events().len();

        for _ in 0..3 {
            assert!(!station
                .machine
                .apply_mode(ModeRequest::AutoDj(Some(PlaylistId(1))))
                .unwrap());
        }
        settle().await;
        assert_eq!(station.history_len().await, history);
        assert_eq!(station.harness.emitter.events().len(), events);

        assert!(station.machine.apply_mode(ModeRequest::Live).unwrap());
        assert!(!station.machine.apply_mode(ModeRequest::Live).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn apply_mode_idle_from_live_clears_everything() {
        let station = Station::new(three_tracks());
        station.machine.start_autodj(PlaylistId(1));
        station.machine.start_live();

        assert!(station.machine.apply_mode(ModeRequest::Idle).unwrap());
        assert_eq!(station.machine.state(), BroadcastState::Idle);
        assert!(!station.machine.apply_mode(ModeRequest::Idle).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn apply_mode_autodj_without_playlist_is_rejected() {
        let station = Station::new(three_tracks());
        let err = station
            .machine
            .apply_mode(ModeRequest::AutoDj(None))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(station.machine.state(), BroadcastState::Idle);
    }

    #[test]
    fn mode_request_parse_rejects_unknown_mode() {
        assert_eq!(ModeRequest::parse("idle", None).unwrap(), ModeRequest::Idle);
        assert_eq!(
            ModeRequest::parse("autodj", Some(PlaylistId(4))).unwrap(),
            ModeRequest::AutoDj(Some(PlaylistId(4)))
        );
        assert!(ModeRequest::parse("party", None).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn playlist_change_revives_idle_rotation() {
        let store = Arc::new(store_with_playlist(Vec::new()));
        let station = Station::with_store(store.clone());
        station.machine.start_autodj(PlaylistId(1));
        settle().await;
        assert!(station.tracks_played().is_empty());

        store.upsert_track(track(5, 30));
        store.upsert_playlist(crate::store::test_support::playlist(1, &[5]));
        assert!(station.machine.playlist_changed(PlaylistId(1)));
        settle().await;
        assert_eq!(station.tracks_played(), vec![5]);

        // A timer is pending now, so further edits wait for the boundary
        assert!(!station.machine.playlist_changed(PlaylistId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn set_current_track_overrides_and_announces() {
        let station = Station::new(three_tracks());
        let track = station.machine.set_current_track(TrackId(2)).await.unwrap();
        assert_eq!(track.id, TrackId(2));
        assert_eq!(station.tracks_played(), vec![2]);
        assert_eq!(
            station.machine.status().current_track.map(|t| t.id),
            Some(TrackId(2))
        );

        let err = station
            .machine
            .set_current_track(TrackId(99))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "track_not_found");
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_listener_count() {
        let station = Station::new(MemoryStore::new());
        station.relay.listener_joined(&"ws-1".into());
        station.relay.listener_joined(&"ws-2".into());
        assert_eq!(station.machine.status().listener_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn going_live_stops_reporting_the_autodj_track() {
        let station = Station::new(three_tracks());
        station.machine.start_autodj(PlaylistId(1));
        settle().await;
        assert!(station.machine.status().current_track.is_some());

        station.machine.start_live();
        settle().await;

        assert!(station.machine.status().current_track.is_none());
        let latest = station.harness.store.latest_snapshot().await.unwrap().unwrap();
        assert!(latest.is_live);
        assert_eq!(latest.current_track_id, None);

        // Back to AutoDJ, the rotation picks up at the next index
        station.machine.stop_live();
        settle().await;
        assert_eq!(station.tracks_played(), vec![1, 2]);
    }

    fn slow_station() -> Station {
        Station::with_store(Arc::new(SlowStore {
            inner: three_tracks(),
            delay: Duration::from_secs(5),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn live_round_trip_during_playlist_load_announces_once() {
        let station = slow_station();
        station.machine.start_autodj(PlaylistId(1));
        settle().await;
        // The first advance is still waiting on the store
        assert!(station.tracks_played().is_empty());

        station.machine.start_live();
        assert_eq!(station.machine.stop_live(), BroadcastState::AutoDjRunning);

        sleep(Duration::from_secs(6)).await;
        assert_eq!(station.tracks_played(), vec![1]);
        assert_eq!(station.harness.session.lock().current_track_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn playlist_edit_during_playlist_load_announces_once() {
        let station = slow_station();
        station.machine.start_autodj(PlaylistId(1));
        settle().await;

        // The in-flight advance already claimed its timer, so this re-arms
        assert!(station.machine.playlist_changed(PlaylistId(1)));

        sleep(Duration::from_secs(6)).await;
        assert_eq!(station.tracks_played(), vec![1]);
        assert_eq!(station.harness.session.lock().current_track_index(), 1);
    }
}
