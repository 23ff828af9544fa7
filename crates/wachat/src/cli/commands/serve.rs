use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::open_store;
use crate::config::RuntimePaths;
use crate::query::DEFAULT_BUSINESS_PHONE;
use crate::relay::Relay;
use crate::server::{AppState, DEFAULT_HOST, DEFAULT_PORT, ServerConfig, start_server};

const COMMAND: &str = "serve";

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory `POST /api/payloads/process` reads from.
    #[arg(long, value_name = "PATH")]
    pub payload_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub ingest_on_start: bool,

    /// Allowed browser origin; repeat for several. Any origin when omitted.
    #[arg(long = "cors-origin", value_name = "ORIGIN")]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "WACHAT_BUSINESS_PHONE", default_value = DEFAULT_BUSINESS_PHONE)]
    pub business_phone: String,
}

pub fn run(args: &ServeArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let store = open_store(COMMAND, runtime_paths)?;
    let payload_dir = runtime_paths.payload_dir(args.payload_dir.as_deref())?;
    let state = AppState::new(store, Relay::default(), payload_dir, &args.business_phone);
    let config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        cors_origins: args.cors_origins.clone(),
        ingest_on_start: args.ingest_on_start,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(start_server(&config, state))
}
