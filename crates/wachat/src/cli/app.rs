use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::commands::{
    ingest::IngestArgs, query::QueryArgs, send::SendArgs, serve::ServeArgs, status::StatusArgs,
};

#[derive(Debug, Parser)]
#[command(
    name = "wachat",
    version,
    about = "WhatsApp webhook payload ingestion, status reconciliation and chat relay"
)]
pub struct Cli {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    #[arg(long, global = true, value_name = "PATH")]
    pub home_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH", env = "WACHAT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH", env = "WACHAT_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process every payload file in a directory.
    Ingest(IngestArgs),
    Query(QueryArgs),
    Status(StatusArgs),
    /// Append a business-authored message to a party's conversation.
    Send(SendArgs),
    /// Serve the HTTP API and socket relay.
    Serve(ServeArgs),
}
