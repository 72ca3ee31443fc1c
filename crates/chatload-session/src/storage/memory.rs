//! In-memory log store.

use std::{
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use async_trait::async_trait;
use chatload_core::{LogStore, PersistError, SessionLog};

/// Keeps session logs in memory.
///
/// Useful for tests and for embedding the orchestrator in another
/// process. Data is lost on exit.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    logs: RwLock<Vec<SessionLog>>,
}

impl MemoryLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs persisted so far, oldest first.
    #[must_use]
    pub fn logs(&self) -> Vec<SessionLog> {
        self.logs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn persist(&self, log: &SessionLog) -> Result<Option<PathBuf>, PersistError> {
        self.logs
            .write()
            .map_err(|e| PersistError::Internal(e.to_string()))?
            .push(log.clone());
        Ok(None)
    }
}
