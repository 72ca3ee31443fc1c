//! Core traits for the transport and log persistence collaborators.

use std::{fmt, path::PathBuf, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{Configuration, Event, SessionStats};

/// Event delivered by an open transport channel, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// The channel finished its handshake.
    Open,
    /// A text payload from the endpoint.
    Message(String),
    /// A transport-level fault; usually followed by `Close`.
    Error(String),
    /// The channel closed; nothing follows.
    Close,
}

/// Receiver half handed out by [`Transport::connect`].
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundEvent>;

/// Transport error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("Connection refused: {0}")]
    ConnectRefused(String),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Connection closed unexpectedly")]
    UnexpectedClose,
}

impl TransportError {
    /// Whether this error came out of a connect attempt.
    #[must_use]
    pub const fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout(_) | Self::ConnectRefused(_) | Self::Connect(_)
        )
    }
}

/// One persistent bidirectional message channel.
///
/// Implementations hold at most one open channel. The orchestrator bounds
/// `connect` with its own timeout.
#[async_trait]
pub trait Transport: Send {
    /// Open a channel to `address`.
    ///
    /// Returns the receiver of inbound events for this channel only.
    async fn connect(&mut self, address: &str) -> Result<InboundReceiver, TransportError>;

    /// Send one text frame.
    ///
    /// Fails with `NotConnected` when no channel is open.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the channel. Idempotent; never fails.
    async fn close(&mut self);

    /// Whether a channel is currently open.
    fn is_open(&self) -> bool;
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The message ceiling was reached.
    Completed,
    /// Cancellation was requested.
    Cancelled,
    /// Reconnection failed.
    Unrecoverable,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Unrecoverable => "unrecoverable error",
        };
        f.write_str(s)
    }
}

/// Final statistics as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStats {
    #[serde(flatten)]
    pub counters: SessionStats,
    pub duration_secs: f64,
}

/// Persisted record of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub run_id: Uuid,
    pub status: SessionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub config: Configuration,
    pub stats: LogStats,
    pub events: Vec<Event>,
}

/// Persist error.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to serialize log: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Persist error: {0}")]
    Internal(String),
}

/// Trait for session log destinations.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Write a finished session log.
    ///
    /// Returns where the log was written, if it has a location.
    async fn persist(&self, log: &SessionLog) -> Result<Option<PathBuf>, PersistError>;
}

#[async_trait]
impl<T: LogStore + ?Sized> LogStore for std::sync::Arc<T> {
    async fn persist(&self, log: &SessionLog) -> Result<Option<PathBuf>, PersistError> {
        (**self).persist(log).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failure_classification() {
        assert!(TransportError::ConnectTimeout(Duration::from_secs(10)).is_connect_failure());
        assert!(TransportError::ConnectRefused("x".into()).is_connect_failure());
        assert!(!TransportError::Send("x".into()).is_connect_failure());
        assert!(!TransportError::UnexpectedClose.is_connect_failure());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&SessionOutcome::Unrecoverable).unwrap();
        assert_eq!(json, "\"unrecoverable\"");
    }
}
