use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const RECORD_SCHEMA_VERSION: &str = "wachat.message-record.v1";

/// Delivery progress, ordered `sent < delivered < read`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown message status `{0}` (expected sent, delivered or read)")]
pub struct UnknownStatus(pub String);

impl MessageStatus {
    pub const ALL: [Self; 3] = [Self::Sent, Self::Delivered, Self::Read];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl Display for MessageStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransition {
    pub status: MessageStatus,
    #[serde(rename = "timestamp")]
    pub timestamp_utc: String,
    pub timestamp_unix_ms: u64,
    #[serde(rename = "updatedAt")]
    pub applied_at_utc: String,
}

/// One stored message, serialized in the shape the web client consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub message_id: String,

    /// Secondary identifier some payload sources use to reference the same message.
    #[serde(rename = "meta_msg_id", skip_serializing_if = "Option::is_none")]
    pub meta_msg_id: Option<String>,

    pub wa_id: String,
    pub user_name: String,
    pub message_body: String,

    #[serde(rename = "timestamp")]
    pub timestamp_utc: String,
    pub timestamp_unix_ms: u64,

    pub status: MessageStatus,

    #[serde(rename = "type")]
    pub message_type: String,

    pub from: String,
    pub conversation_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_phone_number: Option<String>,

    #[serde(default)]
    pub status_history: Vec<StatusTransition>,

    #[serde(rename = "createdAt")]
    pub created_at_utc: String,

    #[serde(rename = "updatedAt")]
    pub updated_at_utc: String,
}

/// A status change waiting to be applied; not persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub message_id: String,
    pub status: MessageStatus,
    pub timestamp_unix_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(rename = "id")]
    pub conversation_id: String,
    pub message_count: usize,
    pub participants: Vec<String>,
    #[serde(rename = "lastMessage")]
    pub last_message_utc: String,
    pub last_message_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSummary {
    pub total_messages: usize,
    pub messages_by_status: BTreeMap<String, usize>,
    pub conversations: Vec<ConversationSummary>,
}

#[must_use]
pub fn record_json_schema() -> Value {
    let schema = schemars::schema_for!(MessageRecord);
    match serde_json::to_value(schema) {
        Ok(value) => value,
        Err(error) => {
            panic!("failed to serialize generated message record schema: {error}");
        }
    }
}
