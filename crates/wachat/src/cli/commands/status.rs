use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error, Result};
use clap::{Args, Subcommand};
use serde_json::{Value, json};

use super::{emit, encode_data, open_store, query_failure};
use crate::config::RuntimePaths;
use crate::models::{QueryEnvelope, QueryEnvelopeCommandFailure};
use crate::query;
use crate::relay::Relay;

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    #[command(subcommand)]
    pub command: StatusCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum StatusCommand {
    /// Set one message's status (matched by message id, then meta_msg_id).
    Set(StatusSetArgs),
    /// Apply `{"updates": [{"messageId", "status"}, ...]}` from a file or stdin.
    Bulk(StatusBulkArgs),
}

#[derive(Debug, Clone, Args)]
pub struct StatusSetArgs {
    #[arg(value_name = "MESSAGE_ID")]
    pub message_id: String,

    #[arg(value_name = "STATUS")]
    pub status: String,
}

#[derive(Debug, Clone, Args)]
pub struct StatusBulkArgs {
    /// JSON file, or `-` for stdin.
    #[arg(value_name = "FILE")]
    pub input: PathBuf,
}

pub fn run(args: &StatusArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    match &args.command {
        StatusCommand::Set(set_args) => run_set(set_args, runtime_paths),
        StatusCommand::Bulk(bulk_args) => run_bulk(bulk_args, runtime_paths),
    }
}

fn run_set(args: &StatusSetArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    const COMMAND: &str = "status.set";
    let mut store = open_store(COMMAND, runtime_paths)?;
    let relay = Relay::default();
    let record = query::update_message_status(&mut store, &relay, &args.message_id, &args.status)
        .map_err(|error| query_failure(COMMAND, error))?;
    emit(&QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &record)?));
    Ok(())
}

fn run_bulk(args: &StatusBulkArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    const COMMAND: &str = "status.bulk";
    let body = read_bulk_input(&args.input).map_err(|error| {
        Error::new(QueryEnvelopeCommandFailure::validation(
            QueryEnvelope::error(COMMAND, "bulk_input_invalid", "unable to read bulk input")
                .with_meta("input", json!(args.input.display().to_string()))
                .with_error_details(json!({ "cause": format!("{error:#}") })),
        ))
    })?;

    let mut store = open_store(COMMAND, runtime_paths)?;
    let relay = Relay::default();
    let results = query::bulk_update_statuses(&mut store, &relay, &body)
        .map_err(|error| query_failure(COMMAND, error))?;

    let failed = results.iter().filter(|result| !result.success).count();
    emit(
        &QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &results)?)
            .with_meta("applied", json!(results.len() - failed))
            .with_meta("failed", json!(failed)),
    );
    Ok(())
}

fn read_bulk_input(input: &Path) -> Result<Value> {
    let raw = if input == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read bulk updates from stdin")?;
        raw
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("failed to read bulk updates file: {}", input.display()))?
    };
    serde_json::from_str(&raw).context("bulk updates are not valid JSON")
}
