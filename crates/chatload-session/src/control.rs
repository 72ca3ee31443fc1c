//! Session tuning and the cross-task control handle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chatload_core::{EventRecorder, SessionState, SessionStats, SessionUpdate};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

/// Timing and retry knobs for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Re-check period while paused.
    pub pause_poll: Duration,
    /// Connect attempts per reconnect cycle before giving up.
    pub reconnect_attempts: u32,
    /// Wait between two reconnect attempts.
    pub reconnect_delay: Duration,
    /// Bound on draining buffered inbound events after close.
    pub drain_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pause_poll: Duration::from_secs(1),
            reconnect_attempts: 2,
            reconnect_delay: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(2),
        }
    }
}

/// Cloneable handle for controlling and observing a session.
#[derive(Clone)]
pub struct SessionHandle {
    recorder: Arc<EventRecorder>,
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub(crate) const fn new(
        recorder: Arc<EventRecorder>,
        cancel: CancellationToken,
        paused: Arc<AtomicBool>,
        state: watch::Receiver<SessionState>,
    ) -> Self {
        Self {
            recorder,
            cancel,
            paused,
            state,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Flip the pause flag.
    ///
    /// Only takes effect while the session is `Running`; returns the
    /// resulting flag.
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.is_paused();
        self.set_paused(paused)
    }

    /// Set the pause flag. Only takes effect while `Running`.
    pub fn set_paused(&self, paused: bool) -> bool {
        if self.state() != SessionState::Running {
            return self.is_paused();
        }
        if self.paused.swap(paused, Ordering::SeqCst) != paused {
            tracing::info!(paused, "Pause toggled");
            self.recorder.publish(SessionUpdate::PauseChanged(paused));
        }
        paused
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Request graceful shutdown. No effect once stopped.
    pub fn cancel(&self) {
        if self.state().is_terminal() || self.cancel.is_cancelled() {
            return;
        }
        tracing::info!("Cancellation requested");
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.recorder.stats()
    }

    /// Live progress updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.recorder.subscribe()
    }

    /// Shared recorder, for history replay.
    #[must_use]
    pub fn recorder(&self) -> Arc<EventRecorder> {
        Arc::clone(&self.recorder)
    }

    /// Wait until the session reaches `Stopped`.
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| s.is_terminal()).await;
    }
}
