//! Session orchestrator: connection state machine and paced message pump.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chatload_core::{
    Configuration, EventRecorder, InboundEvent, InboundReceiver, LogStats, LogStore,
    PacingEngine, SessionLog, SessionOutcome, SessionState, SessionUpdate, Transport,
    TransportError,
};
use chatload_transport::{ClientMessage, extract_response_text};
use chrono::Utc;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{SessionHandle, SessionOptions, summary::RunSummary};

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Session already started")]
    AlreadyStarted,
    #[error("Session is stopped")]
    Stopped,
    #[error("Cancelled before the session started")]
    Cancelled,
}

/// State of the transport channel as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Result of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub summary: RunSummary,
    pub log: SessionLog,
    /// Where the log was written, if the store has locations.
    pub log_path: Option<PathBuf>,
    /// Set when the log could not be persisted.
    pub persist_error: Option<String>,
}

/// Why the pump stopped.
#[derive(Debug)]
struct Ending {
    outcome: SessionOutcome,
    failure: Option<String>,
}

impl Ending {
    const fn completed() -> Self {
        Self {
            outcome: SessionOutcome::Completed,
            failure: None,
        }
    }

    const fn cancelled() -> Self {
        Self {
            outcome: SessionOutcome::Cancelled,
            failure: None,
        }
    }
}

enum ReconnectError {
    Cancelled,
    Exhausted(String),
}

/// One open channel and the task consuming its inbound events.
struct Link {
    /// Cancelled by the inbound task when the channel ends.
    lost: CancellationToken,
    /// Whoever claims this first accounts for the link's failure.
    fault: Arc<AtomicBool>,
    inbound: JoinHandle<()>,
}

fn claim_fault(fault: &AtomicBool) -> bool {
    fault
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Consume inbound events for one channel until it closes.
async fn consume_inbound(
    mut inbound: InboundReceiver,
    recorder: Arc<EventRecorder>,
    session: u32,
    lost: CancellationToken,
    fault: Arc<AtomicBool>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            InboundEvent::Open => tracing::debug!(session, "Channel open"),
            InboundEvent::Message(payload) => {
                let text = extract_response_text(&payload).into_text();
                recorder.record_inbound(text, session).await;
            }
            InboundEvent::Error(e) => {
                tracing::warn!(session, error = %e, "Transport error");
                if claim_fault(&fault) {
                    recorder.record_error(format!("Transport error: {e}"));
                }
            }
            InboundEvent::Close => break,
        }
    }
    if claim_fault(&fault) {
        tracing::warn!(session, "Connection closed unexpectedly");
        recorder.record_error(TransportError::UnexpectedClose.to_string());
    }
    lost.cancel();
}

/// Drives one session: connects, paces prompts, records traffic, reconnects
/// once on transport faults and persists the log on the way out.
///
/// Lifecycle: `Idle -> Connecting -> Running -> (Reconnecting <-> Running)
/// -> Stopping -> Stopped`. A stopped orchestrator cannot be restarted.
pub struct Orchestrator<T, S>
where
    T: Transport,
    S: LogStore,
{
    config: Arc<Configuration>,
    options: SessionOptions,
    transport: T,
    store: S,
    pacing: PacingEngine,
    recorder: Arc<EventRecorder>,
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    state: watch::Sender<SessionState>,
    connection: ConnectionState,
    sequence: u32,
    run_id: Uuid,
    link: Option<Link>,
}

impl<T, S> Orchestrator<T, S>
where
    T: Transport,
    S: LogStore,
{
    /// Create an idle session.
    #[must_use]
    pub fn new(config: Configuration, transport: T, store: S, options: SessionOptions) -> Self {
        let pacing = PacingEngine::new(config.prompts());
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            config: Arc::new(config),
            options,
            transport,
            store,
            pacing,
            recorder: Arc::new(EventRecorder::new()),
            cancel: CancellationToken::new(),
            paused: Arc::new(AtomicBool::new(false)),
            state,
            connection: ConnectionState::Disconnected,
            sequence: 0,
            run_id: Uuid::new_v4(),
            link: None,
        }
    }

    /// Handle for pause, cancellation and progress from other tasks.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(
            Arc::clone(&self.recorder),
            self.cancel.clone(),
            Arc::clone(&self.paused),
            self.state.subscribe(),
        )
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    #[must_use]
    pub fn recorder(&self) -> &Arc<EventRecorder> {
        &self.recorder
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "Session state changed");
            self.recorder.publish(SessionUpdate::StateChanged(next));
        }
    }

    /// Open the initial connection and enter `Running`.
    ///
    /// # Errors
    /// Returns the connect failure; the session is then `Stopped` and
    /// nothing is persisted.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Idle => {}
            SessionState::Stopped => return Err(SessionError::Stopped),
            _ => return Err(SessionError::AlreadyStarted),
        }

        self.set_state(SessionState::Connecting);
        let cancel = self.cancel.clone();
        let result = tokio::select! {
            () = cancel.cancelled() => Err(SessionError::Cancelled),
            r = self.connect() => r,
        };

        match result {
            Ok(()) => {
                self.recorder.mark_started(Utc::now());
                tracing::info!(
                    endpoint = %self.config.endpoint,
                    session = self.sequence,
                    "Session started"
                );
                self.set_state(SessionState::Running);
                Ok(())
            }
            Err(e) => {
                tracing::error!(endpoint = %self.config.endpoint, error = %e, "Initial connect failed");
                self.transport.close().await;
                self.connection = ConnectionState::Disconnected;
                self.set_state(SessionState::Stopped);
                Err(e)
            }
        }
    }

    /// Run the session to the end: start if idle, pump messages until the
    /// ceiling, cancellation or an unrecoverable fault, then shut down.
    ///
    /// # Errors
    /// Returns error if the initial connect fails or the session already
    /// stopped.
    pub async fn run(&mut self) -> Result<SessionReport, SessionError> {
        match self.state() {
            SessionState::Idle => self.start().await?,
            SessionState::Running => {}
            SessionState::Stopped => return Err(SessionError::Stopped),
            _ => return Err(SessionError::AlreadyStarted),
        }

        let ending = self.pump().await;
        Ok(self.shutdown(ending).await)
    }

    /// Shut the session down early.
    ///
    /// Idle sessions stop without a log; running ones persist as cancelled.
    /// Returns `None` once already stopped.
    pub async fn close(&mut self) -> Option<SessionReport> {
        match self.state() {
            SessionState::Stopped => None,
            SessionState::Idle => {
                self.set_state(SessionState::Stopped);
                None
            }
            _ => Some(self.shutdown(Ending::cancelled()).await),
        }
    }

    /// Open a channel and start consuming its inbound events.
    ///
    /// Calling this while `Connecting` or `Open` fails with
    /// `AlreadyConnected` and changes nothing.
    async fn connect(&mut self) -> Result<(), SessionError> {
        if matches!(
            self.connection,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return Err(SessionError::AlreadyConnected);
        }

        self.connection = ConnectionState::Connecting;
        let timeout = self.options.connect_timeout;
        let inbound = match tokio::time::timeout(
            timeout,
            self.transport.connect(&self.config.endpoint),
        )
        .await
        {
            Ok(Ok(inbound)) => inbound,
            Ok(Err(e)) => {
                self.connection = ConnectionState::Disconnected;
                return Err(e.into());
            }
            Err(_) => {
                self.connection = ConnectionState::Disconnected;
                return Err(TransportError::ConnectTimeout(timeout).into());
            }
        };

        self.sequence += 1;
        self.connection = ConnectionState::Open;

        let lost = CancellationToken::new();
        let fault = Arc::new(AtomicBool::new(false));
        let inbound = tokio::spawn(consume_inbound(
            inbound,
            Arc::clone(&self.recorder),
            self.sequence,
            lost.clone(),
            Arc::clone(&fault),
        ));
        self.link = Some(Link {
            lost,
            fault,
            inbound,
        });
        Ok(())
    }

    /// Close the channel and wait (bounded) for buffered inbound events.
    async fn teardown_link(&mut self) {
        let Some(link) = self.link.take() else {
            self.transport.close().await;
            self.connection = ConnectionState::Disconnected;
            return;
        };

        // Our own close is not a fault.
        claim_fault(&link.fault);
        self.connection = ConnectionState::Closing;
        self.transport.close().await;

        let mut inbound = link.inbound;
        if tokio::time::timeout(self.options.drain_timeout, &mut inbound)
            .await
            .is_err()
        {
            tracing::warn!("Inbound events still pending after close, dropping them");
            inbound.abort();
        }
        self.connection = ConnectionState::Disconnected;
    }

    /// Whether the current channel is gone.
    ///
    /// A transport that reports itself closed before its inbound task ended
    /// is counted here; the fault flag keeps it to one error either way.
    fn link_lost(&self) -> bool {
        let Some(link) = &self.link else {
            return true;
        };
        if link.lost.is_cancelled() {
            return true;
        }
        if self.transport.is_open() {
            return false;
        }
        if claim_fault(&link.fault) {
            tracing::warn!(session = self.sequence, "Transport reports the channel closed");
            self.recorder
                .record_error(TransportError::UnexpectedClose.to_string());
        }
        true
    }

    async fn pump(&mut self) -> Ending {
        let max = self.config.max_messages;
        let cancel = self.cancel.clone();

        loop {
            if self.recorder.stats().messages_sent >= max {
                return Ending::completed();
            }
            if cancel.is_cancelled() {
                return Ending::cancelled();
            }

            if self.link_lost() {
                if let Err(ending) = self.recover().await {
                    return ending;
                }
                continue;
            }

            if self.paused.load(Ordering::SeqCst) {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(self.options.pause_poll) => {}
                }
                continue;
            }

            let prompt = self.pacing.next().to_string();
            match self.send_prompt(&prompt).await {
                Ok(()) => {
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(self.config.interval) => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(session = self.sequence, error = %e, "Send failed");
                    let first = self
                        .link
                        .as_ref()
                        .is_none_or(|l| claim_fault(&l.fault));
                    if first {
                        self.recorder.record_error(e.to_string());
                    }
                    if let Err(ending) = self.recover().await {
                        return ending;
                    }
                }
            }
        }
    }

    async fn send_prompt(&mut self, prompt: &str) -> Result<(), TransportError> {
        let payload = ClientMessage::chat(prompt, self.sequence)
            .to_json()
            .map_err(|e| TransportError::Send(e.to_string()))?;

        let recorder = Arc::clone(&self.recorder);
        let event = recorder
            .dispatch(prompt, self.sequence, self.transport.send(payload))
            .await?;
        tracing::debug!(session = event.session, "Prompt sent");
        Ok(())
    }

    /// `Reconnecting` then back to `Running`, or the ending to shut down with.
    async fn recover(&mut self) -> Result<(), Ending> {
        self.set_state(SessionState::Reconnecting);
        match self.reconnect().await {
            Ok(()) => {
                self.set_state(SessionState::Running);
                Ok(())
            }
            Err(ReconnectError::Cancelled) => Err(Ending::cancelled()),
            Err(ReconnectError::Exhausted(reason)) => {
                tracing::error!(reason = %reason, "Giving up on reconnecting");
                Err(Ending {
                    outcome: SessionOutcome::Unrecoverable,
                    failure: Some(reason),
                })
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), ReconnectError> {
        self.teardown_link().await;
        let cancel = self.cancel.clone();
        let attempts = self.options.reconnect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::select! {
                    () = cancel.cancelled() => return Err(ReconnectError::Cancelled),
                    () = tokio::time::sleep(self.options.reconnect_delay) => {}
                }
            }

            let result = tokio::select! {
                () = cancel.cancelled() => return Err(ReconnectError::Cancelled),
                r = self.connect() => r,
            };
            match result {
                Ok(()) => {
                    tracing::info!(session = self.sequence, attempt, "Reconnected");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                    self.recorder
                        .record_error(format!("Reconnect attempt {attempt} failed: {e}"));
                    last_error = e.to_string();
                }
            }
        }

        Err(ReconnectError::Exhausted(format!(
            "reconnect failed after {attempts} attempts: {last_error}"
        )))
    }

    async fn shutdown(&mut self, ending: Ending) -> SessionReport {
        self.set_state(SessionState::Stopping);
        self.teardown_link().await;

        let ended = Utc::now();
        self.recorder.mark_ended(ended);
        let counters = self.recorder.stats();
        #[allow(clippy::cast_precision_loss)]
        let duration_secs = counters.duration(ended).num_milliseconds() as f64 / 1000.0;

        let log = SessionLog {
            run_id: self.run_id,
            status: ending.outcome,
            failure: ending.failure,
            config: (*self.config).clone(),
            stats: LogStats {
                counters,
                duration_secs,
            },
            events: self.recorder.snapshot(),
        };

        let (log_path, persist_error) = match self.store.persist(&log).await {
            Ok(path) => {
                if let Some(path) = &path {
                    tracing::info!(path = %path.display(), "Session log saved");
                }
                (path, None)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to persist session log");
                (None, Some(e.to_string()))
            }
        };

        let summary = RunSummary::new(&log, log_path.clone(), persist_error.clone());
        tracing::info!(
            outcome = %log.status,
            sent = log.stats.counters.messages_sent,
            received = log.stats.counters.responses_received,
            errors = log.stats.counters.error_count,
            "Session finished"
        );
        self.set_state(SessionState::Stopped);

        SessionReport {
            summary,
            log,
            log_path,
            persist_error,
        }
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use std::time::Duration;

    use chatload_core::{EventKind, PromptCategory, prompts};

    use super::*;
    use crate::{storage::MemoryLogStore, testing::MockTransport};

    fn fast_options() -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_millis(200),
            pause_poll: Duration::from_millis(5),
            reconnect_attempts: 2,
            reconnect_delay: Duration::from_millis(1),
            drain_timeout: Duration::from_millis(500),
        }
    }

    fn config(category: PromptCategory, max: u32, interval: Duration) -> Configuration {
        Configuration::builder("ws://mock")
            .category(category)
            .max_messages(max)
            .interval(interval)
            .log_path("unused.json")
            .build()
            .unwrap()
    }

    fn prompt_contents(log: &SessionLog) -> Vec<String> {
        log.events
            .iter()
            .filter(|e| e.kind == EventKind::Prompt)
            .map(|e| e.content.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_completes_at_ceiling() {
        let store = Arc::new(MemoryLogStore::new());
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 7, Duration::ZERO),
            MockTransport::new(),
            Arc::clone(&store),
            fast_options(),
        );

        let report = session.run().await.unwrap();
        assert_eq!(report.log.status, SessionOutcome::Completed);
        assert_eq!(report.log.stats.counters.messages_sent, 7);
        assert_eq!(prompt_contents(&report.log).len(), 7);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert_eq!(store.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_echo_scenario_interleaves_prompts_and_responses() {
        let mut session = Orchestrator::new(
            config(PromptCategory::Qa, 3, Duration::ZERO),
            MockTransport::new().echo(),
            MemoryLogStore::new(),
            fast_options(),
        );

        let report = session.run().await.unwrap();
        let events = &report.log.events;
        assert_eq!(events.len(), 6);

        // Each prompt precedes its own echo; pairs may interleave.
        let qa = prompts::builtin(PromptCategory::Qa);
        for text in &qa[..3] {
            let sent = events
                .iter()
                .position(|e| e.kind == EventKind::Prompt && e.content == *text)
                .unwrap();
            let echoed = events
                .iter()
                .position(|e| e.kind == EventKind::Response && e.content == *text)
                .unwrap();
            assert!(sent < echoed, "echo of {text:?} recorded before its prompt");
        }
        let stats = &report.log.stats.counters;
        assert_eq!(stats.messages_sent, 3);
        assert_eq!(stats.responses_received, 3);
        assert_eq!(stats.error_count, 0);
        assert!(
            report
                .log
                .events
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp)
        );
    }

    #[tokio::test]
    async fn test_send_failure_reconnects_without_resend() {
        let transport = MockTransport::new().fail_send(2);
        let probe = transport.probe();
        let mut session = Orchestrator::new(
            config(PromptCategory::Creative, 4, Duration::ZERO),
            transport,
            MemoryLogStore::new(),
            fast_options(),
        );

        let report = session.run().await.unwrap();
        assert_eq!(report.log.status, SessionOutcome::Completed);
        assert_eq!(report.log.stats.counters.messages_sent, 4);
        assert_eq!(report.log.stats.counters.error_count, 1);
        assert_eq!(probe.connects(), 2);

        // The prompt consumed by the failed send is skipped, not resent.
        let creative = prompts::builtin(PromptCategory::Creative);
        assert_eq!(
            prompt_contents(&report.log),
            [creative[0], creative[2], creative[3], creative[4]]
        );
        let sessions: Vec<u32> = report.log.events.iter().map(|e| e.session).collect();
        assert_eq!(sessions, [1, 2, 2, 2]);
        assert_eq!(probe.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_two_reconnect_failures_are_unrecoverable() {
        let refused = TransportError::ConnectRefused("no listener".to_string());
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 5, Duration::ZERO),
            MockTransport::new()
                .fail_send(2)
                .fail_connect(2, refused.clone())
                .fail_connect(3, refused),
            MemoryLogStore::new(),
            fast_options(),
        );

        let report = session.run().await.unwrap();
        assert_eq!(report.log.status, SessionOutcome::Unrecoverable);
        assert!(report.log.failure.is_some());
        assert_eq!(session.state(), SessionState::Stopped);
        let stats = &report.log.stats.counters;
        assert_eq!(stats.messages_sent, 1);
        assert!(stats.messages_sent < 5);
        assert_eq!(stats.error_count, 3);
    }

    #[tokio::test]
    async fn test_single_reconnect_failure_recovers_on_second_attempt() {
        let transport = MockTransport::new()
            .fail_send(1)
            .fail_connect(2, TransportError::Connect("flaky".to_string()));
        let probe = transport.probe();
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 2, Duration::ZERO),
            transport,
            MemoryLogStore::new(),
            fast_options(),
        );

        let report = session.run().await.unwrap();
        assert_eq!(report.log.status, SessionOutcome::Completed);
        assert_eq!(report.log.stats.counters.error_count, 2);
        assert_eq!(probe.connects(), 3);
    }

    #[tokio::test]
    async fn test_unexpected_close_reconnects() {
        let transport = MockTransport::new().drop_link_after(2);
        let probe = transport.probe();
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 4, Duration::from_millis(10)),
            transport,
            MemoryLogStore::new(),
            fast_options(),
        );

        let report = session.run().await.unwrap();
        assert_eq!(report.log.status, SessionOutcome::Completed);
        assert_eq!(report.log.stats.counters.messages_sent, 4);
        assert_eq!(report.log.stats.counters.error_count, 1);
        assert_eq!(probe.connects(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_then_close_counts_once() {
        let transport = MockTransport::new().echo().error_after(2);
        let probe = transport.probe();
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 4, Duration::from_millis(10)),
            transport,
            MemoryLogStore::new(),
            fast_options(),
        );

        let report = session.run().await.unwrap();
        assert_eq!(report.log.status, SessionOutcome::Completed);
        let stats = &report.log.stats.counters;
        assert_eq!(stats.messages_sent, 4);
        assert_eq!(stats.error_count, 1);
        assert_eq!(probe.connects(), 2);
        assert_eq!(probe.sent().len(), 4);

        let prompt_sessions: Vec<u32> = report
            .log
            .events
            .iter()
            .filter(|e| e.kind == EventKind::Prompt)
            .map(|e| e.session)
            .collect();
        assert_eq!(prompt_sessions, [1, 1, 2, 2]);
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_surfaced() {
        let store = Arc::new(MemoryLogStore::new());
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 3, Duration::ZERO),
            MockTransport::new().fail_connect(1, TransportError::ConnectRefused("nope".into())),
            Arc::clone(&store),
            fast_options(),
        );

        let err = tokio_test::assert_err!(session.run().await);
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::ConnectRefused(_))
        ));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(store.logs().is_empty());
        assert!(matches!(session.run().await, Err(SessionError::Stopped)));
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 3, Duration::ZERO),
            MockTransport::new().hang_connect(1),
            MemoryLogStore::new(),
            SessionOptions {
                connect_timeout: Duration::from_millis(20),
                ..fast_options()
            },
        );

        let err = tokio_test::assert_err!(session.start().await);
        assert!(matches!(
            err,
            SessionError::Transport(TransportError::ConnectTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_while_open_is_rejected() {
        let transport = MockTransport::new();
        let probe = transport.probe();
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 3, Duration::ZERO),
            transport,
            MemoryLogStore::new(),
            fast_options(),
        );

        tokio_test::assert_ok!(session.start().await);
        assert!(matches!(
            session.connect().await,
            Err(SessionError::AlreadyConnected)
        ));
        assert_eq!(probe.connects(), 1);
        assert_eq!(session.connection_state(), ConnectionState::Open);
        assert!(matches!(
            session.start().await,
            Err(SessionError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_interval_wait() {
        let store = Arc::new(MemoryLogStore::new());
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 10, Duration::from_secs(60)),
            MockTransport::new(),
            Arc::clone(&store),
            fast_options(),
        );
        let handle = session.handle();
        let mut updates = handle.subscribe();

        let task = tokio::spawn(async move { session.run().await });
        loop {
            if let SessionUpdate::PromptSent { .. } = updates.recv().await.unwrap() {
                break;
            }
        }
        handle.cancel();

        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("cancellation not observed")
            .unwrap()
            .unwrap();
        assert_eq!(report.log.status, SessionOutcome::Cancelled);
        assert_eq!(report.log.stats.counters.messages_sent, 1);
        assert_eq!(store.logs()[0].status, SessionOutcome::Cancelled);
        assert_eq!(handle.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_cancel_observed_while_paused() {
        let store = Arc::new(MemoryLogStore::new());
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 10, Duration::ZERO),
            MockTransport::new(),
            Arc::clone(&store),
            SessionOptions {
                pause_poll: Duration::from_secs(60),
                ..fast_options()
            },
        );
        tokio_test::assert_ok!(session.start().await);
        let handle = session.handle();
        assert!(handle.set_paused(true));

        let task = tokio::spawn(async move { session.run().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let report = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("cancellation not observed while paused")
            .unwrap()
            .unwrap();
        assert_eq!(report.log.status, SessionOutcome::Cancelled);
        assert_eq!(report.log.stats.counters.messages_sent, 0);
        assert_eq!(store.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_initial_connect_stops_without_log() {
        let store = Arc::new(MemoryLogStore::new());
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 3, Duration::ZERO),
            MockTransport::new().hang_connect(1),
            Arc::clone(&store),
            SessionOptions {
                connect_timeout: Duration::from_secs(60),
                ..fast_options()
            },
        );
        let handle = session.handle();

        let task = tokio::spawn(async move {
            let result = session.start().await;
            (session, result)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.state(), SessionState::Connecting);
        handle.cancel();

        let (session, result) = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("cancellation not observed while connecting")
            .unwrap();
        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(store.logs().is_empty());
    }

    #[tokio::test]
    async fn test_pause_holds_and_resume_continues_in_order() {
        let mut session = Orchestrator::new(
            config(PromptCategory::Technical, 5, Duration::from_millis(20)),
            MockTransport::new(),
            MemoryLogStore::new(),
            fast_options(),
        );
        tokio_test::assert_ok!(session.start().await);
        let handle = session.handle();
        assert!(handle.toggle_pause());

        let task = tokio::spawn(async move { session.run().await });
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(handle.stats().messages_sent, 0);

        assert!(!handle.toggle_pause());
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.set_paused(true);
        tokio::time::sleep(Duration::from_millis(40)).await;
        let held = handle.stats().messages_sent;
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(handle.stats().messages_sent, held);

        handle.set_paused(false);
        let report = task.await.unwrap().unwrap();
        let technical = prompts::builtin(PromptCategory::Technical);
        assert_eq!(prompt_contents(&report.log), technical[..5]);
    }

    #[tokio::test]
    async fn test_close_and_cancel_after_stop_change_nothing() {
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 2, Duration::ZERO),
            MockTransport::new().echo(),
            MemoryLogStore::new(),
            fast_options(),
        );
        let handle = session.handle();
        let report = session.run().await.unwrap();

        handle.cancel();
        assert!(session.close().await.is_none());
        assert!(!handle.is_cancelled());
        assert_eq!(handle.stats(), report.log.stats.counters);
        assert_eq!(session.recorder().snapshot(), report.log.events);
        assert!(matches!(session.run().await, Err(SessionError::Stopped)));
    }

    #[tokio::test]
    async fn test_close_running_session_persists_cancelled() {
        let store = Arc::new(MemoryLogStore::new());
        let transport = MockTransport::new();
        let probe = transport.probe();
        let mut session = Orchestrator::new(
            config(PromptCategory::General, 2, Duration::ZERO),
            transport,
            Arc::clone(&store),
            fast_options(),
        );
        tokio_test::assert_ok!(session.start().await);

        let report = session.close().await.unwrap();
        assert_eq!(report.log.status, SessionOutcome::Cancelled);
        assert_eq!(probe.closes(), 1);
        assert_eq!(store.logs().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_without_prompts_uses_default_set() {
        let config = Configuration::builder("ws://mock")
            .category(PromptCategory::Custom)
            .max_messages(2)
            .interval(Duration::ZERO)
            .log_path("unused.json")
            .build()
            .unwrap();
        let mut session = Orchestrator::new(
            config,
            MockTransport::new(),
            MemoryLogStore::new(),
            fast_options(),
        );

        let report = session.run().await.unwrap();
        let general = prompts::builtin(PromptCategory::General);
        assert_eq!(prompt_contents(&report.log), general[..2]);
        assert!(report.log.config.fallback_to_default);
    }

    #[tokio::test]
    async fn test_short_custom_list_wraps() {
        let config = Configuration::builder("ws://mock")
            .category(PromptCategory::Custom)
            .custom_prompts(["a", "b"])
            .max_messages(5)
            .interval(Duration::ZERO)
            .log_path("unused.json")
            .build()
            .unwrap();
        let mut session = Orchestrator::new(
            config,
            MockTransport::new(),
            MemoryLogStore::new(),
            fast_options(),
        );

        let report = session.run().await.unwrap();
        assert_eq!(prompt_contents(&report.log), ["a", "b", "a", "b", "a"]);
    }

    #[tokio::test]
    async fn test_persist_failure_still_reports() {
        struct BrokenStore;

        #[async_trait::async_trait]
        impl LogStore for BrokenStore {
            async fn persist(
                &self,
                _log: &SessionLog,
            ) -> Result<Option<PathBuf>, chatload_core::PersistError> {
                Err(chatload_core::PersistError::Internal("disk full".to_string()))
            }
        }

        let mut session = Orchestrator::new(
            config(PromptCategory::General, 1, Duration::ZERO),
            MockTransport::new(),
            BrokenStore,
            fast_options(),
        );

        let report = session.run().await.unwrap();
        assert_eq!(report.log_path, None);
        assert!(report.persist_error.unwrap().contains("disk full"));
        assert_eq!(report.summary.messages_sent, 1);
    }
}
