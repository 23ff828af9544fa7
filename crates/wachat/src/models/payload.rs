//! Serde shapes for WhatsApp Business webhook envelopes.
//!
//! Only the fields the ingestors read are modelled; everything else in the
//! envelope is ignored. Collections default to empty so structural checks can
//! report *why* a payload is unusable instead of failing deserialization.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "_id")]
    pub id: Option<String>,

    pub payload_type: Option<String>,

    #[serde(rename = "metaData")]
    pub meta_data: Option<WebhookMetaData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookMetaData {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookEntry {
    pub id: Option<String>,

    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookChange {
    pub field: Option<String>,
    pub value: Option<WebhookValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookValue {
    pub messaging_product: Option<String>,
    pub metadata: Option<WebhookMetadata>,

    #[serde(default)]
    pub contacts: Vec<WebhookContact>,

    #[serde(default)]
    pub messages: Vec<WebhookMessage>,

    #[serde(default)]
    pub statuses: Vec<WebhookStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookMetadata {
    pub display_phone_number: Option<String>,
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookContact {
    pub wa_id: String,
    pub profile: Option<WebhookProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookProfile {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookMessage {
    pub id: String,
    pub from: String,
    pub timestamp: EpochSeconds,

    #[serde(rename = "type")]
    pub message_type: Option<String>,

    pub text: Option<WebhookText>,
    pub body: Option<String>,
    pub meta_msg_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookText {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookStatus {
    pub id: String,
    pub status: String,
    pub timestamp: EpochSeconds,
    pub recipient_id: Option<String>,
}

/// Epoch seconds as found on the wire: a decimal string or a bare integer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EpochSeconds {
    Text(String),
    Integer(i64),
}

impl EpochSeconds {
    #[must_use]
    pub fn as_decimal(&self) -> String {
        match self {
            Self::Text(raw) => raw.clone(),
            Self::Integer(value) => value.to_string(),
        }
    }
}

pub const MEDIA_MESSAGE_PLACEHOLDER: &str = "Media message";

/// Message body source, resolved once from the raw webhook message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadContent {
    Text { body: String },
    Body { body: String },
    Media { media_type: String },
}

impl PayloadContent {
    #[must_use]
    pub fn resolve(message: &WebhookMessage) -> Self {
        if let Some(text) = &message.text {
            return Self::Text {
                body: text.body.clone(),
            };
        }
        if let Some(body) = message.body.as_ref().filter(|body| !body.is_empty()) {
            return Self::Body { body: body.clone() };
        }
        Self::Media {
            media_type: message
                .message_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }

    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Text { body } | Self::Body { body } => body,
            Self::Media { .. } => MEDIA_MESSAGE_PLACEHOLDER,
        }
    }
}
