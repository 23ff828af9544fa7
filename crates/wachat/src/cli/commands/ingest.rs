use std::path::PathBuf;

use anyhow::{Error, Result};
use clap::Args;
use serde_json::json;

use super::{emit, encode_data, open_store};
use crate::config::RuntimePaths;
use crate::ingest::{
    IngestPlan, ingest_report_artifact_path, run_ingest, write_ingest_report_artifact,
};
use crate::models::{QueryEnvelope, QueryEnvelopeCommandFailure};
use crate::relay::Relay;

const COMMAND: &str = "ingest";

#[derive(Debug, Clone, Args)]
pub struct IngestArgs {
    /// Directory holding `*message*.json` and `*status*.json` payloads.
    #[arg(long, value_name = "PATH")]
    pub payload_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub no_report: bool,
}

pub fn run(args: &IngestArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let plan = IngestPlan {
        payload_dir: runtime_paths.payload_dir(args.payload_dir.as_deref())?,
    };
    let mut store = open_store(COMMAND, runtime_paths)?;
    let relay = Relay::default();

    let report = run_ingest(&mut store, &relay, &plan).map_err(|error| {
        let envelope = QueryEnvelope::error(
            COMMAND,
            classify_ingest_error_code(&error),
            "ingestion run failed",
        )
        .with_meta(
            "payload_dir",
            json!(plan.payload_dir.display().to_string()),
        )
        .with_meta(
            "database_path",
            json!(runtime_paths.database_path.display().to_string()),
        )
        .with_error_details(json!({ "cause": format!("{error:#}") }));
        Error::new(QueryEnvelopeCommandFailure::runtime(envelope))
    })?;

    let artifact_path = ingest_report_artifact_path(&runtime_paths.data_dir);
    if !args.no_report {
        write_ingest_report_artifact(&artifact_path, &report).map_err(|error| {
            let envelope = QueryEnvelope::error(
                COMMAND,
                "ingest_report_artifact_write_failed",
                "failed to write ingest report artifact",
            )
            .with_meta("artifact_path", json!(artifact_path.display().to_string()))
            .with_error_details(json!({ "cause": format!("{error:#}") }));
            Error::new(QueryEnvelopeCommandFailure::runtime(envelope))
        })?;
    }

    let warnings = report.warnings.clone();
    let unresolved = report.unresolved_message_ids();
    let envelope = QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &report)?)
        .with_meta(
            "database_path",
            json!(runtime_paths.database_path.display().to_string()),
        )
        .with_meta(
            "artifact_path",
            if args.no_report {
                json!(null)
            } else {
                json!(artifact_path.display().to_string())
            },
        )
        .with_warnings("payload_skipped", warnings)
        .with_warnings(
            "status_unresolved",
            unresolved
                .into_iter()
                .map(|message_id| format!("no message matched status target {message_id}")),
        );
    emit(&envelope);
    Ok(())
}

fn classify_ingest_error_code(error: &anyhow::Error) -> &'static str {
    let message = format!("{error:#}");
    if message.contains("failed to list payload directory") {
        "ingest_payload_dir_unavailable"
    } else if message.contains("sqlite") {
        "ingest_store_failure"
    } else {
        "ingest_failed"
    }
}
