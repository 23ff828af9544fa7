use std::path::Path;

use clap::Parser;
use wachat::cli::app::{Cli, Command};
use wachat::cli::commands::query::QueryCommand;
use wachat::cli::commands::status::StatusCommand;
use wachat::query::DEFAULT_BUSINESS_PHONE;
use wachat::server::DEFAULT_HOST;

#[test]
fn parses_global_runtime_flags_for_ingest() {
    let cli = Cli::parse_from([
        "wachat",
        "--home-dir",
        "/home/tester",
        "--cwd",
        "/work/repo",
        "--db-path",
        "/tmp/wachat.sqlite",
        "ingest",
        "--payload-dir",
        "payloads",
        "--no-report",
    ]);

    assert_eq!(
        cli.runtime.home_dir.as_deref(),
        Some(Path::new("/home/tester"))
    );
    assert_eq!(cli.runtime.cwd.as_deref(), Some(Path::new("/work/repo")));
    assert_eq!(
        cli.runtime.db_path.as_deref(),
        Some(Path::new("/tmp/wachat.sqlite"))
    );

    match cli.command {
        Command::Ingest(args) => {
            assert_eq!(args.payload_dir.as_deref(), Some(Path::new("payloads")));
            assert!(args.no_report);
        }
        other => panic!("expected ingest command, got {other:?}"),
    }
}

#[test]
fn parses_query_log_paging() {
    let cli = Cli::parse_from(["wachat", "query", "log", "--page", "3", "--limit", "25"]);

    match cli.command {
        Command::Query(args) => match args.command {
            QueryCommand::Log(log) => {
                assert_eq!(log.page, Some(3));
                assert_eq!(log.limit, Some(25));
            }
            other => panic!("expected query log, got {other:?}"),
        },
        other => panic!("expected query command, got {other:?}"),
    }
}

#[test]
fn parses_query_summary_text_flag() {
    let cli = Cli::parse_from(["wachat", "query", "summary", "--text"]);

    match cli.command {
        Command::Query(args) => match args.command {
            QueryCommand::Summary(summary) => assert!(summary.text),
            other => panic!("expected query summary, got {other:?}"),
        },
        other => panic!("expected query command, got {other:?}"),
    }
}

#[test]
fn parses_query_messages_without_paging() {
    let cli = Cli::parse_from(["wachat", "query", "messages"]);
    assert!(matches!(
        cli.command,
        Command::Query(ref args) if matches!(args.command, QueryCommand::Messages)
    ));

    let err = Cli::try_parse_from(["wachat", "query", "messages", "--page", "2"])
        .expect_err("messages takes no paging flags");
    assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
}

#[test]
fn parses_status_set_positionals() {
    let cli = Cli::parse_from(["wachat", "status", "set", "wamid.abc", "read"]);

    match cli.command {
        Command::Status(args) => match args.command {
            StatusCommand::Set(set) => {
                assert_eq!(set.message_id, "wamid.abc");
                assert_eq!(set.status, "read");
            }
            other => panic!("expected status set, got {other:?}"),
        },
        other => panic!("expected status command, got {other:?}"),
    }
}

#[test]
fn parses_send_with_defaults() {
    let cli = Cli::parse_from(["wachat", "send", "919937320320", "hello there"]);

    match cli.command {
        Command::Send(args) => {
            assert_eq!(args.wa_id, "919937320320");
            assert_eq!(args.body, "hello there");
            assert!(args.user_name.is_none());
            assert_eq!(args.business_phone, DEFAULT_BUSINESS_PHONE);
        }
        other => panic!("expected send command, got {other:?}"),
    }
}

#[test]
fn parses_serve_origins_and_defaults() {
    let cli = Cli::parse_from([
        "wachat",
        "serve",
        "--cors-origin",
        "http://localhost:3000",
        "--cors-origin",
        "https://chat.example.com",
        "--ingest-on-start",
    ]);

    match cli.command {
        Command::Serve(args) => {
            assert_eq!(args.host, DEFAULT_HOST);
            assert!(args.ingest_on_start);
            assert_eq!(
                args.cors_origins,
                vec![
                    "http://localhost:3000".to_string(),
                    "https://chat.example.com".to_string()
                ]
            );
        }
        other => panic!("expected serve command, got {other:?}"),
    }
}

#[test]
fn rejects_unknown_subcommand() {
    let err = Cli::try_parse_from(["wachat", "snapshot"]).expect_err("unknown command");
    assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
}
