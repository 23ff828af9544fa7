//! Read and update operations behind the HTTP routes and the `query`,
//! `status` and `send` commands.

use std::collections::BTreeMap;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ingest::status::apply_status_event;
use crate::models::{MessageRecord, MessageStatus, ProcessingSummary, StatusEvent};
use crate::relay::{Relay, RelayEvent};
use crate::sqlite::{InsertOutcome, MessageStore};
use crate::summary::build_processing_summary;
use crate::utils::hash::generated_message_id;
use crate::utils::time::{format_unix_ms, now_utc_rfc3339, unix_timestamp_millis};

pub const DEFAULT_PAGE_LIMIT: usize = 50;
pub const MAX_PAGE_LIMIT: usize = 500;
pub const DEFAULT_BUSINESS_USER_NAME: &str = "Business";
pub const DEFAULT_BUSINESS_PHONE: &str = "918329446654";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid status `{0}`; must be one of: sent, delivered, read")]
    InvalidStatus(String),

    #[error("updates must be an array of {{messageId, status}} objects")]
    InvalidBulkPayload,

    #[error("bulk update item {index} is invalid: {reason}")]
    InvalidBulkItem { index: usize, reason: String },

    #[error("request body is not valid JSON: {0}")]
    InvalidRequestBody(String),

    #[error("message body must not be empty")]
    EmptyMessageBody,

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("contact not found: {0}")]
    ContactNotFound(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl QueryError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidStatus(_) => "invalid_status",
            Self::InvalidBulkPayload => "invalid_bulk_payload",
            Self::InvalidBulkItem { .. } => "invalid_bulk_item",
            Self::InvalidRequestBody(_) => "invalid_json",
            Self::EmptyMessageBody => "empty_message_body",
            Self::MessageNotFound(_) => "message_not_found",
            Self::ContactNotFound(_) => "contact_not_found",
            Self::Store(_) => "store_failure",
        }
    }

    /// True for errors caused by the caller's input rather than the store.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// One row of the chat list: the latest message per party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationOverview {
    #[serde(rename = "_id")]
    pub wa_id: String,
    pub user_name: String,
    pub last_message: String,
    pub last_message_time: String,
    pub message_count: usize,
    #[serde(skip)]
    last_message_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactCard {
    pub name: String,
    pub phone_number: String,
    pub is_online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl PageRequest {
    /// Page defaults to 1, limit to 50 (zero also means default), capped at 500.
    #[must_use]
    pub fn normalized(self) -> (usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = match self.limit {
            None | Some(0) => DEFAULT_PAGE_LIMIT,
            Some(limit) => limit.min(MAX_PAGE_LIMIT),
        };
        (page, limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagePage {
    pub data: Vec<MessageRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub message_body: Option<String>,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResult {
    pub message_id: Option<String>,
    pub status: Option<String>,
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn list_conversations(store: &MessageStore) -> QueryResult<Vec<ConversationOverview>> {
    let mut by_party: BTreeMap<String, ConversationOverview> = BTreeMap::new();
    for record in store.all_messages()? {
        let overview = by_party
            .entry(record.wa_id.clone())
            .or_insert_with(|| ConversationOverview {
                wa_id: record.wa_id.clone(),
                user_name: String::new(),
                last_message: String::new(),
                last_message_time: String::new(),
                message_count: 0,
                last_message_unix_ms: 0,
            });
        overview.message_count += 1;
        if record.timestamp_unix_ms >= overview.last_message_unix_ms {
            overview.user_name = record.user_name;
            overview.last_message = record.message_body;
            overview.last_message_time = record.timestamp_utc;
            overview.last_message_unix_ms = record.timestamp_unix_ms;
        }
    }

    let mut conversations: Vec<_> = by_party.into_values().collect();
    conversations.sort_by(|left, right| {
        right
            .last_message_unix_ms
            .cmp(&left.last_message_unix_ms)
            .then_with(|| left.wa_id.cmp(&right.wa_id))
    });
    Ok(conversations)
}

/// Every stored message, oldest first, unpaged.
pub fn all_messages(store: &MessageStore) -> QueryResult<Vec<MessageRecord>> {
    Ok(store.all_messages()?)
}

pub fn messages_for_party(store: &MessageStore, wa_id: &str) -> QueryResult<Vec<MessageRecord>> {
    Ok(store.messages_for_wa_id(wa_id)?)
}

pub fn conversation_log(
    store: &MessageStore,
    conversation_id: &str,
) -> QueryResult<Vec<MessageRecord>> {
    Ok(store.messages_for_conversation(conversation_id)?)
}

pub fn processed_log(store: &MessageStore, request: PageRequest) -> QueryResult<MessagePage> {
    let (page, limit) = request.normalized();
    let total = store.count_messages()?;
    let offset = (page - 1).saturating_mul(limit);
    let data = store.message_page(offset, limit)?;
    Ok(MessagePage {
        data,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        },
    })
}

pub fn processing_summary(store: &MessageStore) -> QueryResult<ProcessingSummary> {
    Ok(build_processing_summary(store)?)
}

pub fn contact(store: &MessageStore, wa_id: &str) -> QueryResult<ContactCard> {
    let record = store
        .messages_for_wa_id(wa_id)?
        .into_iter()
        .next()
        .ok_or_else(|| QueryError::ContactNotFound(wa_id.to_string()))?;
    Ok(ContactCard {
        name: record.user_name,
        phone_number: record.wa_id,
        is_online: false,
    })
}

/// Stores a business-authored message in the party's conversation and
/// announces it to listeners.
pub fn append_message(
    store: &mut MessageStore,
    relay: &Relay,
    wa_id: &str,
    request: NewMessage,
    business_phone: &str,
) -> QueryResult<MessageRecord> {
    let body = request
        .message_body
        .filter(|body| !body.trim().is_empty())
        .ok_or(QueryError::EmptyMessageBody)?;
    let user_name = request
        .user_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BUSINESS_USER_NAME.to_string());

    let now_ms = unix_timestamp_millis();
    let now_utc = now_utc_rfc3339()?;
    let message_id = generated_message_id(now_ms, wa_id);
    let record = MessageRecord {
        message_id: message_id.clone(),
        meta_msg_id: None,
        wa_id: wa_id.to_string(),
        user_name,
        message_body: body,
        timestamp_utc: format_unix_ms(now_ms),
        timestamp_unix_ms: now_ms,
        status: MessageStatus::Sent,
        message_type: "text".to_string(),
        from: business_phone.to_string(),
        conversation_id: format!("conv_{wa_id}"),
        payload_id: None,
        phone_number_id: None,
        display_phone_number: None,
        status_history: Vec::new(),
        created_at_utc: now_utc.clone(),
        updated_at_utc: now_utc,
    };

    match store.insert_if_absent(&record)? {
        InsertOutcome::Inserted => {
            tracing::info!(%message_id, %wa_id, "appended business message");
            relay.publish(RelayEvent::new_message(&record));
            Ok(record)
        }
        InsertOutcome::AlreadyPresent(_) => Err(QueryError::Store(anyhow!(
            "generated message id already exists: {message_id}"
        ))),
    }
}

/// Validates `raw_status` before touching the store; matches by primary id,
/// then by `meta_msg_id`.
pub fn update_message_status(
    store: &mut MessageStore,
    relay: &Relay,
    message_id: &str,
    raw_status: &str,
) -> QueryResult<MessageRecord> {
    let status = raw_status
        .parse::<MessageStatus>()
        .map_err(|_| QueryError::InvalidStatus(raw_status.to_string()))?;
    let event = StatusEvent {
        message_id: message_id.to_string(),
        status,
        timestamp_unix_ms: unix_timestamp_millis(),
        recipient_id: None,
        source_file: None,
    };
    apply_status_event(store, relay, &event, &now_utc_rfc3339()?)?
        .ok_or_else(|| QueryError::MessageNotFound(message_id.to_string()))
}

/// Applies each `{messageId, status}` item independently; a failing item,
/// including a store failure, is reported in its result and the rest still
/// run. Only a body without an `updates` array is rejected as a whole.
pub fn bulk_update_statuses(
    store: &mut MessageStore,
    relay: &Relay,
    body: &Value,
) -> QueryResult<Vec<BulkUpdateResult>> {
    let updates = body
        .get("updates")
        .and_then(Value::as_array)
        .ok_or(QueryError::InvalidBulkPayload)?;

    let mut results = Vec::with_capacity(updates.len());
    for (index, item) in updates.iter().enumerate() {
        let message_id = item
            .get("messageId")
            .and_then(Value::as_str)
            .map(str::to_string);
        let status = item.get("status").and_then(Value::as_str).map(str::to_string);

        let outcome = match (&message_id, &status) {
            (Some(message_id), Some(status)) => {
                update_message_status(store, relay, message_id, status).map(|_| ())
            }
            (None, _) => Err(QueryError::InvalidBulkItem {
                index,
                reason: "messageId must be a string".to_string(),
            }),
            (_, None) => Err(QueryError::InvalidBulkItem {
                index,
                reason: "status must be a string".to_string(),
            }),
        };

        let error = match outcome {
            Ok(()) => None,
            Err(QueryError::Store(error)) => {
                tracing::warn!(
                    index,
                    error = %format!("{error:#}"),
                    "bulk status update item failed"
                );
                Some(format!("{error:#}"))
            }
            Err(error) => Some(error.to_string()),
        };
        results.push(BulkUpdateResult {
            message_id,
            status,
            success: error.is_none(),
            error,
        });
    }
    Ok(results)
}
