use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// Literal reply some servers send to a ping.
pub const PONG: &str = "pong";

/// Envelope kind. Only plain messages are delivered today.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    Message,
}

/// Inbound payload. Text that parses as JSON is delivered structured; anything else is
/// passed through untouched.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// Best-effort parse. Never fails.
    #[must_use]
    pub fn parse(raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw),
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

/// A message handed to the [`MessageInterceptor`](super::MessageInterceptor).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub payload: Payload,
    /// Milliseconds since the Unix epoch at which the frame was processed
    pub received_at_millis: i64,
}

impl InboundMessage {
    #[must_use]
    pub fn new(raw: String) -> Self {
        Self {
            kind: MessageKind::Message,
            payload: Payload::parse(raw),
            received_at_millis: Utc::now().timestamp_millis(),
        }
    }
}

/// Whether `frame` is heartbeat traffic that must not reach the message interceptor.
#[must_use]
pub fn is_heartbeat(frame: &str, ping: Option<&str>) -> bool {
    frame == PONG || ping.is_some_and(|ping| frame == ping)
}
