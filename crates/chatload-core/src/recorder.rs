//! Append-only event ledger with live broadcast.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::BroadcastStream;

use crate::event::{Event, EventKind, SessionStats, SessionUpdate};

/// Retained update history for late subscribers (1 MB).
const HISTORY_BYTES: usize = 1024 * 1024;

struct StoredUpdate {
    update: SessionUpdate,
    bytes: usize,
}

struct Inner {
    events: Vec<Event>,
    stats: SessionStats,
    last_timestamp: Option<DateTime<Utc>>,
    history: VecDeque<StoredUpdate>,
    history_bytes: usize,
}

impl Inner {
    /// Capture time, never earlier than the previous entry.
    fn stamp(&mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        let at = self.last_timestamp.map_or(at, |last| at.max(last));
        self.last_timestamp = Some(at);
        at
    }

    fn remember(&mut self, update: SessionUpdate) {
        let bytes = update.approx_bytes();
        while self.history_bytes.saturating_add(bytes) > HISTORY_BYTES {
            if let Some(front) = self.history.pop_front() {
                self.history_bytes = self.history_bytes.saturating_sub(front.bytes);
            } else {
                break;
            }
        }
        self.history.push_back(StoredUpdate { update, bytes });
        self.history_bytes = self.history_bytes.saturating_add(bytes);
    }
}

/// Ledger of prompt and response events plus the session counters.
///
/// Counters and ledger share one lock, so an append and its counter
/// increment are observed together. Every change is also broadcast as a
/// [`SessionUpdate`] for progress display.
pub struct EventRecorder {
    inner: RwLock<Inner>,
    sender: broadcast::Sender<SessionUpdate>,
    /// Serializes a send with the append of its prompt event, so that a
    /// response arriving mid-send is recorded after the prompt.
    dispatch: Mutex<()>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: RwLock::new(Inner {
                events: Vec::with_capacity(64),
                stats: SessionStats::default(),
                last_timestamp: None,
                history: VecDeque::with_capacity(64),
                history_bytes: 0,
            }),
            sender,
            dispatch: Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn broadcast(&self, inner: &mut Inner, update: SessionUpdate) {
        let _ = self.sender.send(update.clone()); // live listeners
        inner.remember(update);
    }

    /// Append an event as-is (timestamp clamped to keep ledger order).
    pub fn append(&self, mut event: Event) {
        let mut inner = self.write();
        event.timestamp = inner.stamp(event.timestamp);
        inner.events.push(event);
    }

    /// Count a sent prompt, then append its event.
    pub fn record_prompt(&self, content: impl Into<String>, session: u32) -> Event {
        let mut inner = self.write();
        inner.stats.messages_sent += 1;
        let event = Event {
            timestamp: inner.stamp(Utc::now()),
            kind: EventKind::Prompt,
            content: content.into(),
            session,
        };
        inner.events.push(event.clone());
        let stats = inner.stats.clone();
        self.broadcast(
            &mut inner,
            SessionUpdate::PromptSent {
                event: event.clone(),
                stats,
            },
        );
        event
    }

    /// Append a response event, then count it.
    pub fn record_response(&self, content: impl Into<String>, session: u32) -> Event {
        let mut inner = self.write();
        let event = Event {
            timestamp: inner.stamp(Utc::now()),
            kind: EventKind::Response,
            content: content.into(),
            session,
        };
        inner.events.push(event.clone());
        inner.stats.responses_received += 1;
        let stats = inner.stats.clone();
        self.broadcast(
            &mut inner,
            SessionUpdate::ResponseReceived {
                event: event.clone(),
                stats,
            },
        );
        event
    }

    /// Count an error and surface it to listeners.
    pub fn record_error(&self, message: impl Into<String>) {
        let mut inner = self.write();
        inner.stats.error_count += 1;
        let stats = inner.stats.clone();
        self.broadcast(
            &mut inner,
            SessionUpdate::Error {
                message: message.into(),
                stats,
            },
        );
    }

    /// Run a send and record its prompt on success.
    ///
    /// Inbound responses recorded through [`EventRecorder::record_inbound`]
    /// wait for this to finish.
    ///
    /// # Errors
    /// Returns the send's error; nothing is recorded in that case.
    pub async fn dispatch<F, E>(&self, content: &str, session: u32, send: F) -> Result<Event, E>
    where
        F: Future<Output = Result<(), E>>,
    {
        let _gate = self.dispatch.lock().await;
        send.await?;
        Ok(self.record_prompt(content, session))
    }

    /// Record a response, ordered after any in-flight dispatch.
    pub async fn record_inbound(&self, content: impl Into<String>, session: u32) -> Event {
        let _gate = self.dispatch.lock().await;
        self.record_response(content, session)
    }

    /// Publish a notification that does not touch the ledger.
    pub fn publish(&self, update: SessionUpdate) {
        let mut inner = self.write();
        self.broadcast(&mut inner, update);
    }

    /// Set the start timestamp if not already set.
    pub fn mark_started(&self, at: DateTime<Utc>) {
        let mut inner = self.write();
        inner.stats.started_at.get_or_insert(at);
    }

    /// Set the end timestamp.
    pub fn mark_ended(&self, at: DateTime<Utc>) {
        self.write().stats.ended_at = Some(at);
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.read().stats.clone()
    }

    /// Full ordered ledger.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.read().events.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().events.is_empty()
    }

    /// Receiver for live updates.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.sender.subscribe()
    }

    /// Stream that yields history first, then live updates.
    ///
    /// Updates dropped by a lagging receiver are skipped.
    #[must_use]
    pub fn updates(&self) -> futures::stream::BoxStream<'static, SessionUpdate> {
        let (history, rx) = {
            let inner = self.read();
            let history: Vec<SessionUpdate> =
                inner.history.iter().map(|s| s.update.clone()).collect();
            (history, self.sender.subscribe())
        };

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}
