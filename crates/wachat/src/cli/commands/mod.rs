use anyhow::{Error, Result};
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::RuntimePaths;
use crate::models::{QueryEnvelope, QueryEnvelopeCommandFailure};
use crate::query::QueryError;
use crate::sqlite::MessageStore;

pub mod ingest;
pub mod query;
pub mod send;
pub mod serve;
pub mod status;

pub(crate) fn open_store(command: &str, runtime_paths: &RuntimePaths) -> Result<MessageStore> {
    MessageStore::open(&runtime_paths.database_path).map_err(|error| {
        Error::new(QueryEnvelopeCommandFailure::runtime(
            QueryEnvelope::error(command, "store_unavailable", "unable to open message store")
                .with_meta(
                    "database_path",
                    json!(runtime_paths.database_path.display().to_string()),
                )
                .with_error_details(json!({ "cause": format!("{error:#}") })),
        ))
    })
}

/// Validation failures exit with the validation code; store faults are
/// runtime failures.
pub(crate) fn query_failure(command: &str, error: QueryError) -> Error {
    let envelope = QueryEnvelope::error(command, error.code(), error.to_string());
    if error.is_client_error() {
        Error::new(QueryEnvelopeCommandFailure::validation(envelope))
    } else {
        Error::new(QueryEnvelopeCommandFailure::runtime(
            envelope.with_error_details(json!({ "cause": format!("{error:#}") })),
        ))
    }
}

pub(crate) fn encode_data<T: Serialize>(command: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|error| {
        Error::new(QueryEnvelopeCommandFailure::runtime(
            QueryEnvelope::error(command, "response_encode_failed", "failed to encode response")
                .with_error_details(json!({ "cause": error.to_string() })),
        ))
    })
}

pub(crate) fn emit(envelope: &QueryEnvelope) {
    println!("{}", envelope.to_line());
}
