use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;

use super::{emit, encode_data, open_store, query_failure};
use crate::config::RuntimePaths;
use crate::models::{QueryEnvelope, RECORD_SCHEMA_VERSION, record_json_schema};
use crate::query::{self, PageRequest};
use crate::summary::render_summary_text;

#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    #[command(subcommand)]
    pub command: QueryCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum QueryCommand {
    /// Totals, per-status counts and conversation rollups.
    Summary(QuerySummaryArgs),
    /// One row per party, most recent first.
    Conversations,
    /// Every stored message, oldest first.
    Messages,
    /// Messages exchanged with one party, oldest first.
    Thread(QueryThreadArgs),
    /// Paginated processed-message log, newest first.
    Log(QueryLogArgs),
    /// Processed messages of one conversation id, oldest first.
    Conversation(QueryConversationArgs),
    Contact(QueryThreadArgs),
    /// JSON Schema of the stored message record.
    Schema,
}

#[derive(Debug, Clone, Args)]
pub struct QuerySummaryArgs {
    /// Print the human-readable summary instead of a JSON envelope.
    #[arg(long, default_value_t = false)]
    pub text: bool,
}

#[derive(Debug, Clone, Args)]
pub struct QueryThreadArgs {
    #[arg(value_name = "WA_ID")]
    pub wa_id: String,
}

#[derive(Debug, Clone, Args)]
pub struct QueryLogArgs {
    #[arg(long)]
    pub page: Option<usize>,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct QueryConversationArgs {
    #[arg(value_name = "CONVERSATION_ID")]
    pub conversation_id: String,
}

pub fn run(args: &QueryArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    match &args.command {
        QueryCommand::Summary(summary_args) => run_summary(summary_args, runtime_paths),
        QueryCommand::Conversations => run_conversations(runtime_paths),
        QueryCommand::Messages => run_messages(runtime_paths),
        QueryCommand::Thread(thread_args) => run_thread(thread_args, runtime_paths),
        QueryCommand::Log(log_args) => run_log(log_args, runtime_paths),
        QueryCommand::Conversation(conversation_args) => {
            run_conversation(conversation_args, runtime_paths)
        }
        QueryCommand::Contact(contact_args) => run_contact(contact_args, runtime_paths),
        QueryCommand::Schema => run_schema(),
    }
}

fn run_summary(args: &QuerySummaryArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    const COMMAND: &str = "query.summary";
    let store = open_store(COMMAND, runtime_paths)?;
    let summary =
        query::processing_summary(&store).map_err(|error| query_failure(COMMAND, error))?;

    if args.text {
        print!("{}", render_summary_text(&summary));
        return Ok(());
    }
    emit(&QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &summary)?));
    Ok(())
}

fn run_conversations(runtime_paths: &RuntimePaths) -> Result<()> {
    const COMMAND: &str = "query.conversations";
    let store = open_store(COMMAND, runtime_paths)?;
    let conversations =
        query::list_conversations(&store).map_err(|error| query_failure(COMMAND, error))?;
    let count = conversations.len();
    emit(
        &QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &conversations)?)
            .with_meta("row_count", json!(count)),
    );
    Ok(())
}

fn run_messages(runtime_paths: &RuntimePaths) -> Result<()> {
    const COMMAND: &str = "query.messages";
    let store = open_store(COMMAND, runtime_paths)?;
    let messages = query::all_messages(&store).map_err(|error| query_failure(COMMAND, error))?;
    let count = messages.len();
    emit(
        &QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &messages)?)
            .with_meta("row_count", json!(count)),
    );
    Ok(())
}

fn run_thread(args: &QueryThreadArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    const COMMAND: &str = "query.thread";
    let store = open_store(COMMAND, runtime_paths)?;
    let messages = query::messages_for_party(&store, &args.wa_id)
        .map_err(|error| query_failure(COMMAND, error))?;
    let count = messages.len();
    emit(
        &QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &messages)?)
            .with_meta("wa_id", json!(args.wa_id))
            .with_meta("row_count", json!(count)),
    );
    Ok(())
}

fn run_log(args: &QueryLogArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    const COMMAND: &str = "query.log";
    let store = open_store(COMMAND, runtime_paths)?;
    let page = query::processed_log(
        &store,
        PageRequest {
            page: args.page,
            limit: args.limit,
        },
    )
    .map_err(|error| query_failure(COMMAND, error))?;
    emit(
        &QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &page.data)?)
            .with_meta("pagination", encode_data(COMMAND, &page.pagination)?),
    );
    Ok(())
}

fn run_conversation(args: &QueryConversationArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    const COMMAND: &str = "query.conversation";
    let store = open_store(COMMAND, runtime_paths)?;
    let messages = query::conversation_log(&store, &args.conversation_id)
        .map_err(|error| query_failure(COMMAND, error))?;
    let count = messages.len();
    emit(
        &QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &messages)?)
            .with_meta("conversation_id", json!(args.conversation_id))
            .with_meta("row_count", json!(count)),
    );
    Ok(())
}

fn run_contact(args: &QueryThreadArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    const COMMAND: &str = "query.contact";
    let store = open_store(COMMAND, runtime_paths)?;
    let contact =
        query::contact(&store, &args.wa_id).map_err(|error| query_failure(COMMAND, error))?;
    emit(&QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &contact)?));
    Ok(())
}

fn run_schema() -> Result<()> {
    const COMMAND: &str = "query.schema";
    emit(
        &QueryEnvelope::ok(COMMAND, record_json_schema())
            .with_meta("record_schema_version", json!(RECORD_SCHEMA_VERSION)),
    );
    Ok(())
}
