//! Session orchestration and log storage for chat load sessions.
//!
//! Provides:
//! - `Orchestrator` - Connection state machine and paced message pump
//! - `SessionHandle` - Pause/resume, cancellation and progress from other tasks
//! - Log stores (memory, JSON file) and the run summary

pub mod control;
pub mod orchestrator;
pub mod storage;
pub mod summary;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use control::{SessionHandle, SessionOptions};
pub use orchestrator::{ConnectionState, Orchestrator, SessionError, SessionReport};
pub use summary::RunSummary;
