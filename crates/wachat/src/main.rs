#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use clap::error::ErrorKind;
use wachat::cli::app::{Cli, Command, RuntimeArgs};
use wachat::cli::commands;
use wachat::config::RuntimePaths;
use wachat::models::{CommandFailureKind, QueryEnvelopeCommandFailure};

const EXIT_SUCCESS: i32 = 0;
const EXIT_RUNTIME_FAILURE: i32 = 1;
const EXIT_VALIDATION_FAILURE: i32 = 2;
const EXIT_USAGE_ERROR: i32 = 64;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => return exit_code_for_parse_error(error),
    };
    init_tracing(cli.runtime.verbose);

    let command_name = command_name(&cli.command);
    tracing::debug!(command = command_name, "starting command");

    match execute(cli) {
        Ok(()) => EXIT_SUCCESS,
        Err(error) => {
            let exit_code = classify_runtime_error(&error);
            match error.downcast_ref::<QueryEnvelopeCommandFailure>() {
                Some(failure) => println!("{}", failure.envelope().to_line()),
                None => eprintln!("wachat: `{command_name}` failed: {error:#}"),
            }
            tracing::debug!(command = command_name, exit_code, "command failed");
            exit_code
        }
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("wachat={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn execute(cli: Cli) -> Result<()> {
    let runtime_paths = resolve_runtime_paths(&cli.runtime)?;
    match cli.command {
        Command::Ingest(args) => commands::ingest::run(&args, &runtime_paths),
        Command::Query(args) => commands::query::run(&args, &runtime_paths),
        Command::Status(args) => commands::status::run(&args, &runtime_paths),
        Command::Send(args) => commands::send::run(&args, &runtime_paths),
        Command::Serve(args) => commands::serve::run(&args, &runtime_paths),
    }
}

fn classify_runtime_error(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<QueryEnvelopeCommandFailure>() {
        Some(failure) if failure.kind() == CommandFailureKind::Validation => {
            EXIT_VALIDATION_FAILURE
        }
        _ => EXIT_RUNTIME_FAILURE,
    }
}

fn exit_code_for_parse_error(error: clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            EXIT_SUCCESS
        }
        _ => {
            let _ = error.print();
            EXIT_USAGE_ERROR
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Ingest(_) => "ingest",
        Command::Query(_) => "query",
        Command::Status(_) => "status",
        Command::Send(_) => "send",
        Command::Serve(_) => "serve",
    }
}

fn resolve_runtime_paths(args: &RuntimeArgs) -> Result<RuntimePaths> {
    let home_dir = match &args.home_dir {
        Some(path) => path.clone(),
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("HOME is not set; pass --home-dir"))?,
    };

    let cwd = match &args.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    wachat::config::resolve_runtime_paths(
        &home_dir,
        &cwd,
        args.data_dir.as_deref(),
        args.db_path.as_deref(),
    )
}
