//! Task spawning and cancellable timers.
//!
//! This module provides a [`TaskSpawner`] trait that lets services spawn
//! background work without being tied to a specific runtime handle, plus
//! the [`TimerHandle`] used to arm and cancel delayed work such as the
//! AutoDJ track-advance timer.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Source of unique timer identifiers.
static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a pending delayed task.
///
/// Cancelling is idempotent: cancelling a timer that already fired or was
/// already cancelled is a no-op. The `id` lets the owner of a timer check
/// whether a firing timer is still the one it armed.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: u64,
    token: CancellationToken,
}

impl TimerHandle {
    fn new() -> Self {
        Self {
            id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        }
    }

    /// Returns the unique timer id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the timer. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns whether the timer was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Abstraction for spawning background tasks.
///
/// Allows core services to spawn asynchronous work without knowing the
/// underlying runtime.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    ///
    /// The task runs independently of the caller. The spawner does not
    /// provide a way to join the spawned task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Runs `task` after `delay`, unless the returned handle is cancelled first.
    ///
    /// `task` receives the timer id so it can check it is still the timer its
    /// owner expects. Once the delay has elapsed the task runs to completion;
    /// cancellation only prevents it from starting.
    fn spawn_after<F, Fut>(&self, delay: Duration, task: F) -> TimerHandle
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = TimerHandle::new();
        let token = handle.token.clone();
        let id = handle.id;
        self.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => task(id).await,
            }
        });
        handle
    }
}

/// Tokio-based spawner.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }
}
