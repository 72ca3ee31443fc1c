//! Core building blocks for chat load sessions.
//!
//! This crate provides:
//! - `Configuration` - Resolved, validated run settings
//! - `Event` / `SessionUpdate` - Ledger entries and live progress notifications
//! - `EventRecorder` - Append-only ledger + broadcast for progress display
//! - `PacingEngine` - Cyclic prompt cursor
//! - `Transport` and `LogStore` traits for the external collaborators

pub mod config;
pub mod event;
pub mod pacing;
pub mod prompts;
pub mod recorder;
pub mod traits;

pub use config::{ConfigError, Configuration, ConfigurationBuilder, PromptCategory};
pub use event::{Event, EventKind, SessionState, SessionStats, SessionUpdate};
pub use pacing::PacingEngine;
pub use recorder::EventRecorder;
pub use traits::{
    InboundEvent, InboundReceiver, LogStats, LogStore, PersistError, SessionLog, SessionOutcome,
    Transport, TransportError,
};
