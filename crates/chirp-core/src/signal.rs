//! Wait/wake monitor with a shutdown flag
//!
//! Consumers polling a non-blocking queue need somewhere to sleep when
//! it runs dry. `WakeSignal` is that place: a `Mutex` + `Condvar` pair
//! whose protected state holds pending wake tokens and the shutdown flag.
//! Keeping the flag under the same mutex as the wait means a consumer can
//! never miss shutdown between checking it and going to sleep.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Why [`WakeSignal::park`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// A wake token was consumed; re-check for work
    Signaled,
    /// Shutdown has been raised
    Shutdown,
}

#[derive(Debug, Default)]
struct SignalState {
    /// Wakes delivered while nobody was parked
    pending: usize,

    /// Set once, never cleared
    shutdown: bool,
}

/// Condvar-based parking spot shared by a producer and its consumers
#[derive(Debug, Default)]
pub struct WakeSignal {
    state: Mutex<SignalState>,
    cond: Condvar,

    /// Count of parked threads (hint, may be stale)
    parked: AtomicUsize,
}

impl WakeSignal {
    /// Create a signal with no pending wakes and shutdown not raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Park the calling thread until woken or until shutdown is raised
    ///
    /// A wake issued before the caller parks is not lost: it is stored as
    /// a token and consumed here without sleeping.
    pub fn park(&self) -> Wakeup {
        let mut state = self.state();
        if !state.shutdown && state.pending == 0 {
            self.parked.fetch_add(1, Ordering::SeqCst);
            state = self.cond
                .wait_while(state, |s| !s.shutdown && s.pending == 0)
                .unwrap_or_else(PoisonError::into_inner);
            self.parked.fetch_sub(1, Ordering::SeqCst);
        }

        if state.shutdown {
            return Wakeup::Shutdown;
        }
        state.pending -= 1;
        Wakeup::Signaled
    }

    /// Wake one parked thread, or leave a token for the next one to park
    pub fn wake_one(&self) {
        self.state().pending += 1;
        self.cond.notify_one();
    }

    /// Wake every parked thread
    pub fn wake_all(&self) {
        {
            let mut state = self.state();
            state.pending = state.pending.max(self.parked_count());
        }
        self.cond.notify_all();
    }

    /// Raise the shutdown flag without waking anyone
    ///
    /// Pair with [`wake_all`](Self::wake_all) once any final work has
    /// been published.
    pub fn raise_shutdown(&self) {
        self.state().shutdown = true;
    }

    /// Raise the shutdown flag and wake every parked thread
    pub fn shutdown(&self) {
        self.raise_shutdown();
        self.cond.notify_all();
    }

    /// Check whether shutdown has been raised
    pub fn is_shutdown(&self) -> bool {
        self.state().shutdown
    }

    /// Number of currently parked threads (hint, may be stale)
    #[inline]
    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }

    #[inline]
    fn state(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
