//! JSON file log store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chatload_core::{LogStore, PersistError, SessionLog};

/// Writes each session log as pretty-printed JSON.
///
/// The destination is the log's configured `log_path` unless an explicit
/// path was given. Missing parent directories are created.
#[derive(Debug, Clone, Default)]
pub struct JsonFileStore {
    path: Option<PathBuf>,
}

impl JsonFileStore {
    /// Store that follows each log's configured path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that always writes to `path`.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    fn destination<'a>(&'a self, log: &'a SessionLog) -> &'a Path {
        self.path.as_deref().unwrap_or(&log.config.log_path)
    }
}

#[async_trait]
impl LogStore for JsonFileStore {
    async fn persist(&self, log: &SessionLog) -> Result<Option<PathBuf>, PersistError> {
        let path = self.destination(log).to_path_buf();
        let json = serde_json::to_vec_pretty(log)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&path, json)
            .await
            .map_err(|source| PersistError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), events = log.events.len(), "Wrote session log");
        Ok(Some(path))
    }
}
