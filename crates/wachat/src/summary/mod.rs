use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use anyhow::Result;

use crate::models::{ConversationSummary, MessageRecord, MessageStatus, ProcessingSummary};
use crate::sqlite::MessageStore;
use crate::utils::time::format_unix_ms;

/// Re-scans the store; nothing is cached between calls.
pub fn build_processing_summary(store: &MessageStore) -> Result<ProcessingSummary> {
    let total_messages = store.count_messages()?;
    let counts = store.status_counts()?;
    let messages_by_status = MessageStatus::ALL
        .iter()
        .map(|status| {
            (
                status.as_str().to_string(),
                counts.get(status).copied().unwrap_or(0),
            )
        })
        .collect();
    let conversations = summarize_conversations(&store.all_messages()?);

    Ok(ProcessingSummary {
        total_messages,
        messages_by_status,
        conversations,
    })
}

#[derive(Default)]
struct ConversationRollup {
    message_count: usize,
    participants: BTreeSet<String>,
    last_message_unix_ms: u64,
}

/// Groups records by conversation id, most recent conversation first. Ties
/// fall back to conversation id order.
#[must_use]
pub fn summarize_conversations(records: &[MessageRecord]) -> Vec<ConversationSummary> {
    let mut rollups: BTreeMap<&str, ConversationRollup> = BTreeMap::new();
    for record in records {
        let rollup = rollups.entry(record.conversation_id.as_str()).or_default();
        rollup.message_count += 1;
        rollup.participants.insert(record.user_name.clone());
        rollup.last_message_unix_ms = rollup.last_message_unix_ms.max(record.timestamp_unix_ms);
    }

    let mut summaries: Vec<ConversationSummary> = rollups
        .into_iter()
        .map(|(conversation_id, rollup)| ConversationSummary {
            conversation_id: conversation_id.to_string(),
            message_count: rollup.message_count,
            participants: rollup.participants.into_iter().collect(),
            last_message_utc: format_unix_ms(rollup.last_message_unix_ms),
            last_message_unix_ms: rollup.last_message_unix_ms,
        })
        .collect();
    summaries.sort_by(|left, right| {
        right
            .last_message_unix_ms
            .cmp(&left.last_message_unix_ms)
            .then_with(|| left.conversation_id.cmp(&right.conversation_id))
    });
    summaries
}

#[must_use]
pub fn render_summary_text(summary: &ProcessingSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Processing Summary");
    let _ = writeln!(out, "Total messages in database: {}", summary.total_messages);
    let _ = writeln!(out, "Messages by status:");
    for status in MessageStatus::ALL {
        let count = summary
            .messages_by_status
            .get(status.as_str())
            .copied()
            .unwrap_or(0);
        let _ = writeln!(out, "  {status}: {count}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Conversations found: {}", summary.conversations.len());
    for (index, conversation) in summary.conversations.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} - {} messages - Participants: {}",
            index + 1,
            conversation.conversation_id,
            conversation.message_count,
            conversation.participants.join(", ")
        );
    }
    out
}
