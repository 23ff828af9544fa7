use anyhow::Result;
use clap::Args;

use super::{emit, encode_data, open_store, query_failure};
use crate::config::RuntimePaths;
use crate::models::QueryEnvelope;
use crate::query::{self, DEFAULT_BUSINESS_PHONE, NewMessage};
use crate::relay::Relay;

const COMMAND: &str = "send";

#[derive(Debug, Clone, Args)]
pub struct SendArgs {
    #[arg(value_name = "WA_ID")]
    pub wa_id: String,

    #[arg(value_name = "BODY")]
    pub body: String,

    /// Display name stored on the message; defaults to `Business`.
    #[arg(long, value_name = "NAME")]
    pub user_name: Option<String>,

    #[arg(long, env = "WACHAT_BUSINESS_PHONE", default_value = DEFAULT_BUSINESS_PHONE)]
    pub business_phone: String,
}

pub fn run(args: &SendArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let mut store = open_store(COMMAND, runtime_paths)?;
    let relay = Relay::default();
    let record = query::append_message(
        &mut store,
        &relay,
        &args.wa_id,
        NewMessage {
            message_body: Some(args.body.clone()),
            user_name: args.user_name.clone(),
        },
        &args.business_phone,
    )
    .map_err(|error| query_failure(COMMAND, error))?;
    emit(&QueryEnvelope::ok(COMMAND, encode_data(COMMAND, &record)?));
    Ok(())
}
