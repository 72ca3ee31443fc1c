//! Scripted in-memory transport for exercising the orchestrator.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chatload_core::{InboundEvent, InboundReceiver, Transport, TransportError};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
enum ConnectPlan {
    Fail(TransportError),
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    connect_plans: HashMap<u32, ConnectPlan>,
    send_failures: HashSet<u32>,
    drop_after_sends: HashSet<u32>,
    error_after_sends: HashSet<u32>,
    echo: bool,
    connects: u32,
    send_attempts: u32,
    sent: Vec<String>,
    closes: u32,
}

/// Transport whose connects, sends and link drops follow a script.
///
/// Attempt numbers are 1-based and count across the whole session.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
    tx: Option<mpsc::UnboundedSender<InboundEvent>>,
}

/// Inspection side of a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockProbe {
    script: Arc<Mutex<Script>>,
}

fn lock(script: &Mutex<Script>) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every sent payload with `{"message": <prompt>}`.
    #[must_use]
    pub fn echo(self) -> Self {
        lock(&self.script).echo = true;
        self
    }

    /// Fail the given connect attempt.
    #[must_use]
    pub fn fail_connect(self, attempt: u32, err: TransportError) -> Self {
        lock(&self.script)
            .connect_plans
            .insert(attempt, ConnectPlan::Fail(err));
        self
    }

    /// Never complete the given connect attempt.
    #[must_use]
    pub fn hang_connect(self, attempt: u32) -> Self {
        lock(&self.script)
            .connect_plans
            .insert(attempt, ConnectPlan::Hang);
        self
    }

    /// Fail the given send attempt.
    #[must_use]
    pub fn fail_send(self, attempt: u32) -> Self {
        lock(&self.script).send_failures.insert(attempt);
        self
    }

    /// Close the link from the remote side right after the given send attempt.
    #[must_use]
    pub fn drop_link_after(self, attempt: u32) -> Self {
        lock(&self.script).drop_after_sends.insert(attempt);
        self
    }

    /// Report a transport error, then close, right after the given send attempt.
    #[must_use]
    pub fn error_after(self, attempt: u32) -> Self {
        lock(&self.script).error_after_sends.insert(attempt);
        self
    }

    #[must_use]
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            script: Arc::clone(&self.script),
        }
    }
}

impl MockProbe {
    /// Payloads that were sent successfully.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        lock(&self.script).sent.clone()
    }

    #[must_use]
    pub fn connects(&self) -> u32 {
        lock(&self.script).connects
    }

    #[must_use]
    pub fn closes(&self) -> u32 {
        lock(&self.script).closes
    }
}

fn echo_payload(sent: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(sent)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| sent.to_string());
    serde_json::json!({ "message": message }).to_string()
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, _address: &str) -> Result<InboundReceiver, TransportError> {
        let plan = {
            let mut script = lock(&self.script);
            script.connects += 1;
            let attempt = script.connects;
            script.connect_plans.get(&attempt).cloned()
        };
        match plan {
            Some(ConnectPlan::Fail(err)) => return Err(err),
            Some(ConnectPlan::Hang) => std::future::pending::<()>().await,
            None => {}
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(InboundEvent::Open);
        self.tx = Some(tx);
        Ok(rx)
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::NotConnected)?;
        let mut script = lock(&self.script);
        script.send_attempts += 1;
        let attempt = script.send_attempts;

        if script.send_failures.contains(&attempt) {
            return Err(TransportError::Send(format!("scripted failure on send {attempt}")));
        }
        if script.echo {
            let _ = tx.send(InboundEvent::Message(echo_payload(&text)));
        }
        script.sent.push(text);

        let errored = script.error_after_sends.contains(&attempt);
        if errored {
            let _ = tx.send(InboundEvent::Error("connection reset by peer".to_string()));
        }
        if errored || script.drop_after_sends.contains(&attempt) {
            let _ = tx.send(InboundEvent::Close);
            drop(script);
            self.tx = None;
        }
        Ok(())
    }

    async fn close(&mut self) {
        if self.tx.take().is_some() {
            lock(&self.script).closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}
