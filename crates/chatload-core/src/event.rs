//! Ledger entries and live session notifications.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A prompt dispatched to the endpoint.
    Prompt,
    /// A response decoded from the endpoint.
    Response,
}

/// One observed occurrence, immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: String,
    /// Session sequence number of the connection the event belongs to.
    pub session: u32,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Running,
    Reconnecting,
    Stopping,
    Stopped,
}

impl SessionState {
    /// Whether the session can no longer be driven.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Running => "running",
            Self::Reconnecting => "reconnecting",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Running counters and timestamps for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub messages_sent: u32,
    pub responses_received: u32,
    pub error_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionStats {
    /// Elapsed time between start and end (or `now` while running).
    #[must_use]
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        match self.started_at {
            Some(start) => self.ended_at.unwrap_or(now) - start,
            None => chrono::Duration::zero(),
        }
    }
}

/// Live notification for progress display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// A prompt event was appended.
    PromptSent { event: Event, stats: SessionStats },
    /// A response event was appended.
    ResponseReceived { event: Event, stats: SessionStats },
    /// An error was counted.
    Error { message: String, stats: SessionStats },
    /// The session moved to a new lifecycle state.
    StateChanged(SessionState),
    /// The pause flag flipped.
    PauseChanged(bool),
}

impl SessionUpdate {
    /// Rough size, used to bound retained history.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 64;
        match self {
            Self::PromptSent { event, .. } | Self::ResponseReceived { event, .. } => {
                OVERHEAD + event.content.len()
            }
            Self::Error { message, .. } => OVERHEAD + message.len(),
            Self::StateChanged(_) | Self::PauseChanged(_) => OVERHEAD,
        }
    }
}
