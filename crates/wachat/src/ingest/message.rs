use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

use crate::discovery::PayloadFile;
use crate::models::{
    MessageRecord, MessageStatus, PayloadContent, WebhookPayload, WebhookValue,
};
use crate::relay::{Relay, RelayEvent};
use crate::sqlite::{InsertOutcome, MessageStore};
use crate::utils::time::{epoch_seconds_to_unix_ms, format_unix_ms};

/// Records already resolved during the current run, keyed by message id.
pub type SeenMessages = BTreeMap<String, MessageRecord>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageIngestOutcome {
    Inserted(MessageRecord),
    Duplicate(MessageRecord),
    Skipped { reason: String },
}

impl MessageIngestOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

/// Conversation key for a party: `conv_<n>_<wa_id>` when the file name carries
/// a `conversation_<n>` sequence, otherwise `conv_<wa_id>`.
#[must_use]
pub fn derive_conversation_id(file_name: &str, wa_id: &str) -> String {
    match conversation_sequence_regex()
        .captures(file_name)
        .and_then(|captures| captures.get(1))
    {
        Some(sequence) => format!("conv_{}_{wa_id}", sequence.as_str()),
        None => format!("conv_{wa_id}"),
    }
}

fn conversation_sequence_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"conversation_(\d+)").expect("conversation sequence regex should compile")
    })
}

/// Returns the `value` object of the first change of the first entry.
pub(crate) fn first_change_value(payload: &WebhookPayload) -> Option<&WebhookValue> {
    payload
        .meta_data
        .as_ref()?
        .entry
        .first()?
        .changes
        .first()?
        .value
        .as_ref()
}

/// Maps a parsed message payload to its canonical record. Only the first
/// message and first contact are consulted.
pub fn build_message_record(
    payload: &WebhookPayload,
    file_name: &str,
    now_utc: &str,
) -> std::result::Result<MessageRecord, String> {
    let value = first_change_value(payload)
        .ok_or_else(|| "missing metaData.entry[0].changes[0].value".to_string())?;
    let message = value
        .messages
        .first()
        .ok_or_else(|| "messages array is empty".to_string())?;
    let contact = value
        .contacts
        .first()
        .ok_or_else(|| "contacts array is empty".to_string())?;
    let user_name = contact
        .profile
        .as_ref()
        .and_then(|profile| profile.name.clone())
        .ok_or_else(|| format!("contact {} has no profile name", contact.wa_id))?;

    let timestamp_unix_ms = epoch_seconds_to_unix_ms(&message.timestamp.as_decimal())
        .map_err(|error| format!("invalid message timestamp: {error}"))?;
    let content = PayloadContent::resolve(message);
    let metadata = value.metadata.as_ref();

    Ok(MessageRecord {
        message_id: message.id.clone(),
        meta_msg_id: Some(message.meta_msg_id.clone().unwrap_or_else(|| message.id.clone())),
        wa_id: contact.wa_id.clone(),
        user_name,
        message_body: content.body().to_string(),
        timestamp_utc: format_unix_ms(timestamp_unix_ms),
        timestamp_unix_ms,
        status: MessageStatus::Sent,
        message_type: message
            .message_type
            .clone()
            .unwrap_or_else(|| "text".to_string()),
        from: message.from.clone(),
        conversation_id: derive_conversation_id(file_name, &contact.wa_id),
        payload_id: payload.id.clone(),
        phone_number_id: metadata.and_then(|metadata| metadata.phone_number_id.clone()),
        display_phone_number: metadata.and_then(|metadata| metadata.display_phone_number.clone()),
        status_history: Vec::new(),
        created_at_utc: now_utc.to_string(),
        updated_at_utc: now_utc.to_string(),
    })
}

/// Ingests one message payload file. Structural problems yield
/// [`MessageIngestOutcome::Skipped`]; only store failures are errors.
pub fn ingest_message_payload(
    store: &mut MessageStore,
    relay: &Relay,
    seen: &mut SeenMessages,
    payload_file: &PayloadFile,
    now_utc: &str,
) -> Result<MessageIngestOutcome> {
    let payload = match serde_json::from_value::<WebhookPayload>(payload_file.document.clone()) {
        Ok(payload) => payload,
        Err(error) => {
            return Ok(MessageIngestOutcome::skipped(format!(
                "payload does not match the webhook envelope ({error})"
            )));
        }
    };

    let record = match build_message_record(&payload, &payload_file.file_name, now_utc) {
        Ok(record) => record,
        Err(reason) => return Ok(MessageIngestOutcome::skipped(reason)),
    };

    if let Some(existing) = seen.get(&record.message_id) {
        tracing::debug!(message_id = %record.message_id, "message already seen in this run");
        return Ok(MessageIngestOutcome::Duplicate(existing.clone()));
    }

    match store.insert_if_absent(&record)? {
        InsertOutcome::Inserted => {
            tracing::debug!(
                message_id = %record.message_id,
                conversation_id = %record.conversation_id,
                "stored new message"
            );
            relay.publish(RelayEvent::new_message(&record));
            seen.insert(record.message_id.clone(), record.clone());
            Ok(MessageIngestOutcome::Inserted(record))
        }
        InsertOutcome::AlreadyPresent(existing) => {
            tracing::debug!(message_id = %existing.message_id, "message already stored");
            seen.insert(existing.message_id.clone(), existing.clone());
            Ok(MessageIngestOutcome::Duplicate(existing))
        }
    }
}
