//! Transport layer for chat load sessions.
//!
//! Provides:
//! - Wire protocol (JSON chat messages, best-effort response text extraction)
//! - WebSocket client transport (feature: websocket)
//! - Terminal key controls (feature: tui)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tui")]
pub mod tui;

pub use protocol::{ClientMessage, ResponseText, extract_response_text};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
