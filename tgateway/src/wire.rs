//! Outbound event vocabulary and its `data: ...\n\n` wire framing.
//!
//! ```rust
//! use tgateway::OutboundEvent;
//!
//! let frame = OutboundEvent::TextDelta("Hello".to_string()).encode();
//! assert_eq!(frame.bytes, b"data: Hello\n\n");
//! assert_eq!(frame.status_class, 200);
//! ```

use serde::Serialize;
use serde_json::{Value, json};
use tprovider::TokenUsage;

pub const STATUS_OK: u16 = 200;

/// Terminal error for a turn; once emitted the stream ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    pub status_class: u16,
    pub user_message: String,
    pub error_code: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TurnSummary {
    pub usage: TokenUsage,
    pub hops: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    TextDelta(String),
    /// Resolved annotations, emitted once after all text of the turn.
    Citations(Value),
    TurnComplete(TurnSummary),
    Error(ErrorEnvelope),
}

/// One encoded unit: `("data: " + payload + "\n\n", status_class)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub bytes: Vec<u8>,
    pub status_class: u16,
}

impl WireFrame {
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

impl OutboundEvent {
    pub fn status_class(&self) -> u16 {
        match self {
            Self::Error(envelope) => envelope.status_class,
            _ => STATUS_OK,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TurnComplete(_) | Self::Error(_))
    }

    /// Structured `{status, message, data}` body; text deltas have none.
    pub fn structured(&self) -> Option<Value> {
        let (message, data) = match self {
            Self::TextDelta(_) => return None,
            Self::Citations(citations) => ("citations", citations.clone()),
            Self::TurnComplete(summary) => ("turn_complete", json!(summary)),
            Self::Error(envelope) => (envelope.user_message.as_str(), envelope.payload.clone()),
        };

        Some(json!({
            "status": self.status_class(),
            "message": message,
            "data": data,
        }))
    }

    pub fn encode(&self) -> WireFrame {
        let payload = match (self, self.structured()) {
            (Self::TextDelta(text), _) => text.clone(),
            (_, Some(structured)) => structured.to_string(),
            (_, None) => String::new(),
        };

        let mut bytes = Vec::with_capacity(payload.len() + 8);
        bytes.extend_from_slice(b"data: ");
        bytes.extend_from_slice(payload.as_bytes());
        bytes.extend_from_slice(b"\n\n");

        WireFrame {
            bytes,
            status_class: self.status_class(),
        }
    }
}
