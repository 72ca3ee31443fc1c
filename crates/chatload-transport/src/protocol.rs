//! Wire protocol for endpoint communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields checked, in order, for the text of an inbound payload.
pub const RESPONSE_TEXT_FIELDS: &[&str] = &["message", "content", "text"];

/// Text logged for a structured payload without a recognized field.
pub const RESPONSE_PLACEHOLDER: &str = "[response received]";

/// Message from the load generator to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A chat prompt.
    Chat {
        message: String,
        timestamp: DateTime<Utc>,
        session: u32,
    },
}

impl ClientMessage {
    /// Create a chat message stamped with the current time.
    #[must_use]
    pub fn chat(message: impl Into<String>, session: u32) -> Self {
        Self::Chat {
            message: message.into(),
            timestamp: Utc::now(),
            session,
        }
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Text extracted from an inbound payload.
///
/// Extraction is best-effort: the endpoint's payload has no fixed schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseText {
    /// Found in one of [`RESPONSE_TEXT_FIELDS`].
    Field(String),
    /// Structured, but no recognized field held a string.
    Placeholder,
    /// Not JSON; the whole payload is the text.
    Raw(String),
}

impl ResponseText {
    /// Whether the payload decoded as JSON.
    #[must_use]
    pub const fn is_structured(&self) -> bool {
        !matches!(self, Self::Raw(_))
    }

    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Field(s) | Self::Raw(s) => s,
            Self::Placeholder => RESPONSE_PLACEHOLDER.to_string(),
        }
    }
}

/// Pull display/log text out of an inbound payload.
#[must_use]
pub fn extract_response_text(payload: &str) -> ResponseText {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Inbound payload is not JSON, using raw text: {e}");
            return ResponseText::Raw(payload.to_string());
        }
    };

    match value {
        Value::Object(map) => RESPONSE_TEXT_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map_or(ResponseText::Placeholder, |s| ResponseText::Field(s.to_string())),
        Value::String(s) => ResponseText::Field(s),
        _ => ResponseText::Placeholder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_wire_shape() {
        let msg = ClientMessage::chat("What is 2+2?", 3);
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["message"], "What is 2+2?");
        assert_eq!(json["session"], 3);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_field_precedence() {
        let text = extract_response_text(r#"{"text":"c","content":"b","message":"a"}"#);
        assert_eq!(text, ResponseText::Field("a".to_string()));

        let text = extract_response_text(r#"{"text":"c","content":"b"}"#);
        assert_eq!(text, ResponseText::Field("b".to_string()));

        let text = extract_response_text(r#"{"text":"c"}"#);
        assert_eq!(text, ResponseText::Field("c".to_string()));
    }

    #[test]
    fn test_non_string_field_is_skipped() {
        let text = extract_response_text(r#"{"message":42,"content":"fallback"}"#);
        assert_eq!(text, ResponseText::Field("fallback".to_string()));
    }

    #[test]
    fn test_structured_without_fields_uses_placeholder() {
        let text = extract_response_text(r#"{"status":"ok"}"#);
        assert_eq!(text, ResponseText::Placeholder);
        assert_eq!(text.into_text(), RESPONSE_PLACEHOLDER);
    }

    #[test]
    fn test_plain_text_is_raw() {
        let text = extract_response_text("just words");
        assert!(!text.is_structured());
        assert_eq!(text.into_text(), "just words");
    }
}
