pub mod message;
pub mod payload;
pub mod query_envelope;

pub use message::{
    ConversationSummary, MessageRecord, MessageStatus, ProcessingSummary,
    RECORD_SCHEMA_VERSION, StatusEvent, StatusTransition, UnknownStatus, record_json_schema,
};
pub use payload::{
    EpochSeconds, MEDIA_MESSAGE_PLACEHOLDER, PayloadContent, WebhookMessage, WebhookPayload,
    WebhookStatus, WebhookValue,
};
pub use query_envelope::{
    CommandFailureKind, QUERY_ENVELOPE_SCHEMA_VERSION, QueryEnvelope,
    QueryEnvelopeCommandFailure,
};
