//! AutoDJ scheduler: self-rescheduling playlist rotation.
//!
//! Each advance re-reads the active playlist from the store, picks the track
//! at the current index (modulo the fresh length), announces it and arms the
//! next advance for when the track ends. The pending advance is stored on the
//! session as a [`TimerHandle`](crate::runtime::TimerHandle) so any mode
//! transition can cancel it.
//!
//! An advance suspends while it waits on the store. Two guards keep a stale
//! advance from committing after the session moved on:
//!
//! - a firing timer must claim itself from the session first; a cancelled or
//!   replaced timer finds nothing to claim and exits
//! - the advance records the session epoch before awaiting and aborts if the
//!   epoch changed by the time the store answers

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::events::{EventEmitter, TrackEvent};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::listener_registry::ListenerRegistry;
use crate::services::session::{BroadcastSession, SharedSession};
use crate::services::status_recorder::StatusRecorder;
use crate::store::{BroadcastStore, StoreError};
use crate::types::{PlaylistId, Track};
use crate::utils::now_millis;

/// Why an advance did not put a new track on air.
#[derive(Debug, Error)]
pub enum SkipError {
    #[error("AutoDJ is not running")]
    NotRunning,

    #[error("Playlist {0} is empty")]
    EmptyPlaylist(PlaylistId),

    /// The session changed (mode switch, new playlist, another skip) while
    /// the playlist was loading.
    #[error("Broadcast state changed during the skip")]
    Superseded,

    /// The store failed; the rotation retries after the fallback delay.
    #[error("Failed to load playlist: {0}")]
    Store(#[from] StoreError),
}

/// Drives the AutoDJ rotation.
pub struct AutoDjScheduler {
    session: SharedSession,
    store: Arc<dyn BroadcastStore>,
    emitter: Arc<dyn EventEmitter>,
    registry: Arc<ListenerRegistry>,
    recorder: StatusRecorder,
    spawner: TokioSpawner,
    /// Delay used for tracks whose duration is unknown (0).
    fallback: Duration,
}

impl AutoDjScheduler {
    pub fn new(
        session: SharedSession,
        store: Arc<dyn BroadcastStore>,
        emitter: Arc<dyn EventEmitter>,
        registry: Arc<ListenerRegistry>,
        recorder: StatusRecorder,
        spawner: TokioSpawner,
        fallback: Duration,
    ) -> Self {
        Self {
            session,
            store,
            emitter,
            registry,
            recorder,
            spawner,
            fallback,
        }
    }

    /// Returns how long `track` stays on air before the next advance.
    #[must_use]
    pub fn track_delay(&self, track: &Track) -> Duration {
        if track.duration_secs > 0 {
            Duration::from_secs(track.duration_secs)
        } else {
            self.fallback
        }
    }

    /// Arms an advance after `delay`, replacing any pending one.
    ///
    /// Takes the already-locked session so callers can arm as part of a
    /// transition without releasing the lock in between.
    pub(crate) fn schedule_in(self: &Arc<Self>, session: &mut BroadcastSession, delay: Duration) {
        let scheduler = Arc::clone(self);
        let handle = self
            .spawner
            .spawn_after(delay, move |timer_id| async move {
                scheduler.fire(timer_id).await;
            });
        log::debug!(
            "[Scheduler] Next advance in {:?} (timer {})",
            delay,
            handle.id()
        );
        session.arm_timer(handle);
    }

    /// Cancels the pending advance. Safe to call when none is pending.
    pub fn cancel(&self) -> bool {
        self.session.lock().cancel_pending_timer()
    }

    /// Skips to the next track now.
    ///
    /// Returns the newly selected track, or why none was selected.
    pub async fn skip(self: &Arc<Self>) -> Result<Track, SkipError> {
        let (playlist_id, epoch) = {
            let mut session = self.session.lock();
            let playlist_id = session.rotating_playlist().ok_or(SkipError::NotRunning)?;
            (playlist_id, session.begin_advance())
        };
        log::info!("[Scheduler] Skipping to next track on playlist {}", playlist_id);
        self.advance(playlist_id, epoch).await
    }

    async fn fire(self: Arc<Self>, timer_id: u64) {
        let (playlist_id, epoch) = {
            let mut session = self.session.lock();
            if !session.claim_timer(timer_id) {
                log::debug!("[Scheduler] Timer {} superseded, ignoring", timer_id);
                return;
            }
            let Some(playlist_id) = session.rotating_playlist() else {
                return;
            };
            (playlist_id, session.begin_advance())
        };
        // Failures are logged in advance; a timer has no caller to report to
        let _ = self.advance(playlist_id, epoch).await;
    }

    async fn advance(
        self: &Arc<Self>,
        playlist_id: PlaylistId,
        epoch: u64,
    ) -> Result<Track, SkipError> {
        let fetched = self.store.playlist_tracks(playlist_id).await;

        let listener_count = self.registry.count();
        let (track, snapshot) = {
            let mut session = self.session.lock();
            if session.epoch() != epoch || session.rotating_playlist() != Some(playlist_id) {
                log::debug!("[Scheduler] Session changed during advance, dropping it");
                return Err(SkipError::Superseded);
            }

            let tracks = match fetched {
                Ok(tracks) => tracks,
                Err(e) => {
                    log::warn!(
                        "[Scheduler] Failed to load playlist {}: {} (retrying in {:?})",
                        playlist_id,
                        e,
                        self.fallback
                    );
                    self.schedule_in(&mut session, self.fallback);
                    return Err(e.into());
                }
            };

            let Some(track) = session.select_next(&tracks) else {
                log::info!(
                    "[Scheduler] Playlist {} is empty, AutoDJ idle until it changes",
                    playlist_id
                );
                return Err(SkipError::EmptyPlaylist(playlist_id));
            };

            let delay = self.track_delay(&track);
            self.schedule_in(&mut session, delay);
            (track, session.snapshot(listener_count))
        };

        log::info!(
            "[Scheduler] Now playing {} \"{}\" by {}",
            track.id,
            track.title,
            track.artist
        );
        self.recorder.record(snapshot);
        self.emitter.emit_track(TrackEvent {
            track: track.clone(),
            timestamp: now_millis(),
        });
        Ok(track)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::Harness;
    use super::*;
    use crate::store::test_support::{playlist, store_with_playlist, track, OfflineStore, SlowStore};
    use crate::store::MemoryStore;
    use tokio::time::sleep;

    /// Lets ready tasks (and zero-delay timers) run.
    async fn settle() {
        sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_advance_is_immediate_then_follows_durations() {
        let harness = Harness::new(store_with_playlist(vec![track(1, 30), track(2, 0)]));
        harness.start();

        settle().await;
        assert_eq!(harness.emitter.track_ids(), vec![1]);

        // A lasts 30s
        sleep(Duration::from_secs(29)).await;
        assert_eq!(harness.emitter.track_ids(), vec![1]);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(harness.emitter.track_ids(), vec![1, 2]);

        // B has no duration, so the 180s fallback applies (next at 210s)
        sleep(Duration::from_secs(178)).await;
        assert_eq!(harness.emitter.track_ids(), vec![1, 2]);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(harness.emitter.track_ids(), vec![1, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_wraps_round_robin() {
        let harness = Harness::new(store_with_playlist(vec![
            track(1, 10),
            track(2, 10),
            track(3, 10),
        ]));
        harness.start();

        settle().await;
        sleep(Duration::from_secs(45)).await;
        assert_eq!(harness.emitter.track_ids(), vec![1, 2, 3, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_playlist_goes_idle() {
        let harness = Harness::new(store_with_playlist(Vec::new()));
        harness.start();

        settle().await;
        sleep(Duration::from_secs(600)).await;
        assert!(harness.emitter.track_ids().is_empty());
        assert!(!harness.session.lock().has_pending_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn shrunk_playlist_renormalizes_index() {
        let store = Arc::new(store_with_playlist(vec![
            track(1, 10),
            track(2, 10),
            track(3, 10),
            track(4, 10),
        ]));
        let harness = Harness::with_store(store.clone());
        harness.start();

        settle().await;
        sleep(Duration::from_secs(25)).await;
        assert_eq!(harness.emitter.track_ids(), vec![1, 2, 3]);
        assert_eq!(harness.session.lock().current_track_index(), 3);

        store.upsert_playlist(playlist(1, &[1, 2]));
        sleep(Duration::from_secs(10)).await;
        // 3 % 2 == 1 selects track 2
        assert_eq!(harness.emitter.track_ids(), vec![1, 2, 3, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_rotation_stays_quiet() {
        let harness = Harness::new(store_with_playlist(vec![track(1, 10), track(2, 10)]));
        harness.start();
        settle().await;

        assert!(harness.scheduler.cancel());
        // Idempotent
        assert!(!harness.scheduler.cancel());

        sleep(Duration::from_secs(60)).await;
        assert_eq!(harness.emitter.track_ids(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_advances_now_and_rearms() {
        let harness = Harness::new(store_with_playlist(vec![
            track(1, 100),
            track(2, 100),
            track(3, 100),
        ]));
        harness.start();
        settle().await;

        let skipped = harness.scheduler.skip().await.unwrap();
        assert_eq!(skipped.id.0, 2);
        assert_eq!(harness.emitter.track_ids(), vec![1, 2]);

        // The old 100s timer for track 1 was replaced
        sleep(Duration::from_secs(99)).await;
        assert_eq!(harness.emitter.track_ids(), vec![1, 2]);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(harness.emitter.track_ids(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn skip_without_autodj_does_nothing() {
        let harness = Harness::new(MemoryStore::new());
        assert!(matches!(
            harness.scheduler.skip().await,
            Err(SkipError::NotRunning)
        ));
        assert!(harness.emitter.track_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_on_empty_playlist_names_the_playlist() {
        let harness = Harness::new(store_with_playlist(Vec::new()));
        harness.start();
        settle().await;

        assert!(matches!(
            harness.scheduler.skip().await,
            Err(SkipError::EmptyPlaylist(PlaylistId(1)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn skip_overtaken_by_mode_change_is_superseded() {
        let store = SlowStore {
            inner: store_with_playlist(vec![track(1, 100), track(2, 100)]),
            delay: Duration::from_secs(5),
        };
        let harness = Harness::with_store(Arc::new(store));
        {
            let mut session = harness.session.lock();
            session.enter_autodj(PlaylistId(1));
        }

        let scheduler = Arc::clone(&harness.scheduler);
        let pending = tokio::spawn(async move { scheduler.skip().await });
        settle().await;
        // Someone goes live while the playlist is still loading
        harness.session.lock().enter_live();

        assert!(matches!(
            pending.await.unwrap(),
            Err(SkipError::Superseded)
        ));
        assert!(harness.emitter.track_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn skip_reports_store_failure() {
        let harness = Harness::with_store(Arc::new(OfflineStore));
        harness.session.lock().enter_autodj(PlaylistId(1));

        assert!(matches!(
            harness.scheduler.skip().await,
            Err(SkipError::Store(_))
        ));
        // The rotation retries after the fallback delay
        assert!(harness.session.lock().has_pending_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn advance_records_snapshot_with_current_track() {
        let harness = Harness::new(store_with_playlist(vec![track(7, 30)]));
        harness.registry.join(&"ws-1".into());
        harness.start();
        settle().await;

        let latest = harness.store.latest_snapshot().await.unwrap().unwrap();
        assert_eq!(latest.current_track_id.map(|t| t.0), Some(7));
        assert_eq!(latest.listener_count, 1);
        assert!(!latest.is_live);
    }

    #[tokio::test]
    async fn zero_duration_uses_fallback() {
        let harness = Harness::new(MemoryStore::new());
        assert_eq!(
            harness.scheduler.track_delay(&track(1, 0)),
            Duration::from_secs(180)
        );
        assert_eq!(
            harness.scheduler.track_delay(&track(1, 45)),
            Duration::from_secs(45)
        );
    }
}
