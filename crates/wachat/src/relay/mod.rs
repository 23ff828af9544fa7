//! Fire-and-forget fan-out of store changes to connected listeners.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{MessageRecord, MessageStatus};

pub const DEFAULT_RELAY_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub message_id: String,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RelayEvent {
    NewMessage(Box<MessageRecord>),
    StatusUpdate(StatusChange),
}

impl RelayEvent {
    #[must_use]
    pub fn new_message(record: &MessageRecord) -> Self {
        Self::NewMessage(Box::new(record.clone()))
    }

    #[must_use]
    pub fn status_update(message_id: &str, status: MessageStatus) -> Self {
        Self::StatusUpdate(StatusChange {
            message_id: message_id.to_string(),
            status,
        })
    }

    /// Text frame sent to socket listeners.
    #[must_use]
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|error| {
            tracing::warn!(%error, "failed to encode relay event");
            String::from("{}")
        })
    }
}

#[derive(Debug, Clone)]
pub struct Relay {
    sender: broadcast::Sender<RelayEvent>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_CAPACITY)
    }
}

impl Relay {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Delivers `event` to every current listener. Returns how many listeners
    /// received it; having none is not an error.
    pub fn publish(&self, event: RelayEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => 0,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
