#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod discovery;
pub mod ingest;
pub mod models;
pub mod query;
pub mod relay;
pub mod server;
pub mod sqlite;
pub mod summary;
pub mod utils;

pub use cli::app::{Cli, Command};
