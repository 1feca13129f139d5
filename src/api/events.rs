use serde::{Deserialize, Serialize};

use crate::api::models::{Message, ReadReceipt};

/// Events carried over the live channel, one JSON text frame each:
/// `{"event": "newMessage", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ChannelEvent {
    /// Registers the socket under a user id so the relay can route to it.
    Join(String),
    NewMessage(Message),
    MessageRead(ReadReceipt),
}

impl ChannelEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::Join(_) => "join",
            ChannelEvent::NewMessage(_) => "newMessage",
            ChannelEvent::MessageRead(_) => "messageRead",
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_frame(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// What the transport hands to the session owner.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ChannelEvent),
    Disconnected(String),
}
