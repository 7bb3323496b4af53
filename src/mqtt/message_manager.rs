//! Inbound broker messages and their decoding into hub events.

use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fmt;

/// A publish received from the broker.
#[derive(Clone, PartialEq, Eq)]
pub struct MQTTMessage {
    pub topic: String,
    pub payload: Bytes,
    pub timestamp: NaiveDateTime,
}

impl fmt::Display for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let content = String::from_utf8_lossy(&self.payload);
        let preview: String = content.chars().take(64).collect();
        write!(f, "{} - {}: {}", self.timestamp, self.topic, preview)
    }
}

impl fmt::Debug for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl MQTTMessage {
    pub fn from_topic(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        MQTTMessage {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: chrono::Local::now().naive_local(),
        }
    }

    /// Decodes the payload into a [`HubEvent`].
    pub fn decode(&self) -> Result<HubEvent, DecodeError> {
        HubEvent::decode(&self.payload)
    }
}

/// Start or end of a transmission on the monitored channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    KeyDown { call: String, nick: String },
    KeyUp { call: String, nick: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload is not UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("Payload is not a valid event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownType(String),
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    call: String,
    nick: String,
}

impl HubEvent {
    /// Decodes `{"type": "key"|"unkey", "call": .., "nick": ..}`.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        let wire: WireEvent = serde_json::from_str(text)?;
        match wire.kind.as_str() {
            "key" => Ok(HubEvent::KeyDown {
                call: wire.call,
                nick: wire.nick,
            }),
            "unkey" => Ok(HubEvent::KeyUp {
                call: wire.call,
                nick: wire.nick,
            }),
            _ => Err(DecodeError::UnknownType(wire.kind)),
        }
    }
}
