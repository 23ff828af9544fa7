use std::collections::VecDeque;

use anyhow::Result;

use crate::discovery::PayloadFile;
use crate::ingest::message::first_change_value;
use crate::models::{MessageRecord, MessageStatus, StatusEvent, StatusTransition, WebhookPayload};
use crate::relay::{Relay, RelayEvent};
use crate::sqlite::MessageStore;
use crate::utils::time::{epoch_seconds_to_unix_ms, format_unix_ms};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    Applied(MessageRecord),
    Deferred(StatusEvent),
    Skipped { reason: String },
}

/// FIFO of status events whose target message was not found. Lives for one
/// ingestion run only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingStatusQueue {
    entries: VecDeque<StatusEvent>,
}

impl PendingStatusQueue {
    pub fn push(&mut self, event: StatusEvent) {
        self.entries.push_back(event);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatusEvent> {
        self.entries.iter()
    }
}

impl IntoIterator for PendingStatusQueue {
    type Item = StatusEvent;
    type IntoIter = std::collections::vec_deque::IntoIter<StatusEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub resolved: Vec<MessageRecord>,
    pub unresolved: Vec<StatusEvent>,
}

/// Reads the first status entry of a parsed status payload.
pub fn build_status_event(
    payload: &WebhookPayload,
    file_name: &str,
) -> std::result::Result<StatusEvent, String> {
    let value = first_change_value(payload)
        .ok_or_else(|| "missing metaData.entry[0].changes[0].value".to_string())?;
    let entry = value
        .statuses
        .first()
        .ok_or_else(|| "statuses array is empty".to_string())?;
    let status = entry
        .status
        .parse::<MessageStatus>()
        .map_err(|error| error.to_string())?;
    let timestamp_unix_ms = epoch_seconds_to_unix_ms(&entry.timestamp.as_decimal())
        .map_err(|error| format!("invalid status timestamp: {error}"))?;

    Ok(StatusEvent {
        message_id: entry.id.clone(),
        status,
        timestamp_unix_ms,
        recipient_id: entry.recipient_id.clone(),
        source_file: Some(file_name.to_string()),
    })
}

/// Applies `event` to the message it references (primary id, then
/// `meta_msg_id`). Returns `None` when nothing matches.
pub fn apply_status_event(
    store: &mut MessageStore,
    relay: &Relay,
    event: &StatusEvent,
    applied_at_utc: &str,
) -> Result<Option<MessageRecord>> {
    let transition = StatusTransition {
        status: event.status,
        timestamp_utc: format_unix_ms(event.timestamp_unix_ms),
        timestamp_unix_ms: event.timestamp_unix_ms,
        applied_at_utc: applied_at_utc.to_string(),
    };

    let Some(updated) = store.apply_status(&event.message_id, &transition)? else {
        return Ok(None);
    };
    tracing::debug!(
        message_id = %updated.message_id,
        status = %event.status,
        "applied status transition"
    );
    relay.publish(RelayEvent::status_update(&updated.message_id, event.status));
    Ok(Some(updated))
}

pub fn reconcile_status_payload(
    store: &mut MessageStore,
    relay: &Relay,
    pending: &mut PendingStatusQueue,
    payload_file: &PayloadFile,
    applied_at_utc: &str,
) -> Result<StatusOutcome> {
    let payload = match serde_json::from_value::<WebhookPayload>(payload_file.document.clone()) {
        Ok(payload) => payload,
        Err(error) => {
            return Ok(StatusOutcome::Skipped {
                reason: format!("payload does not match the webhook envelope ({error})"),
            });
        }
    };
    let event = match build_status_event(&payload, &payload_file.file_name) {
        Ok(event) => event,
        Err(reason) => return Ok(StatusOutcome::Skipped { reason }),
    };

    match apply_status_event(store, relay, &event, applied_at_utc)? {
        Some(updated) => Ok(StatusOutcome::Applied(updated)),
        None => {
            tracing::debug!(
                message_id = %event.message_id,
                status = %event.status,
                "no matching message yet; deferring status"
            );
            pending.push(event.clone());
            Ok(StatusOutcome::Deferred(event))
        }
    }
}

/// Retries every queued event once, in queue order.
pub fn replay_pending(
    store: &mut MessageStore,
    relay: &Relay,
    pending: PendingStatusQueue,
    applied_at_utc: &str,
) -> Result<ReplayOutcome> {
    let mut outcome = ReplayOutcome::default();
    for event in pending {
        match apply_status_event(store, relay, &event, applied_at_utc)? {
            Some(updated) => outcome.resolved.push(updated),
            None => outcome.unresolved.push(event),
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::{PendingStatusQueue, build_status_event};
    use crate::models::{MessageStatus, StatusEvent, WebhookPayload};

    fn status_payload(status: &str) -> WebhookPayload {
        serde_json::from_str(&format!(
            r#"{{"metaData": {{"entry": [{{"changes": [{{"value": {{"statuses": [
                {{"id": "wamid.1", "status": "{status}", "timestamp": "1754400010",
                  "recipient_id": "929967673820"}}
            ]}}}}]}}]}}}}"#
        ))
        .expect("fixture should deserialize")
    }

    #[test]
    fn builds_event_from_first_status_entry() {
        let event = build_status_event(&status_payload("delivered"), "conversation_1_status_1.json")
            .expect("event should build");
        assert_eq!(event.message_id, "wamid.1");
        assert_eq!(event.status, MessageStatus::Delivered);
        assert_eq!(event.timestamp_unix_ms, 1_754_400_010_000);
        assert_eq!(event.recipient_id.as_deref(), Some("929967673820"));
    }

    #[test]
    fn unknown_status_value_is_a_skip_reason() {
        let reason = build_status_event(&status_payload("failed"), "x_status.json")
            .expect_err("unknown status should skip");
        assert!(reason.contains("`failed`"));
    }

    #[test]
    fn pending_queue_preserves_arrival_order() {
        let mut queue = PendingStatusQueue::default();
        for id in ["a", "b", "c"] {
            queue.push(StatusEvent {
                message_id: id.to_string(),
                status: MessageStatus::Read,
                timestamp_unix_ms: 0,
                recipient_id: None,
                source_file: None,
            });
        }
        assert_eq!(queue.len(), 3);
        let order: Vec<_> = queue.into_iter().map(|event| event.message_id).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
