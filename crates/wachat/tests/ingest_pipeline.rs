use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use wachat::ingest::{
    INGEST_REPORT_SCHEMA_VERSION, IngestPlan, IngestRunStatus, ingest_report_artifact_path,
    run_ingest, write_ingest_report_artifact,
};
use wachat::models::MessageStatus;
use wachat::relay::{Relay, RelayEvent};
use wachat::sqlite::MessageStore;

const RAVI_REPLY_ID: &str =
    "wamid.HBgMOTE5OTM3MzIwMzIwFQIAEhggNDc4NzZBQ0YxMjdCQ0VFOTk2NzA3MTI4RkZCNjYyMjc=";
const NEHA_MESSAGE_ID: &str =
    "wamid.HBgMOTI5OTY3NjczODIwFQIAEhggQ0FBQkNERUYwMDFGRjEyMzQ1NkZGQTk5RTJCM0I2NzY=";

const FIXTURES: &[(&str, &str)] = &[
    (
        "conversation_1_message_1.json",
        include_str!("../../../fixtures/payloads/conversation_1_message_1.json"),
    ),
    (
        "conversation_1_message_2.json",
        include_str!("../../../fixtures/payloads/conversation_1_message_2.json"),
    ),
    (
        "conversation_1_status_1.json",
        include_str!("../../../fixtures/payloads/conversation_1_status_1.json"),
    ),
    (
        "conversation_2_message_1.json",
        include_str!("../../../fixtures/payloads/conversation_2_message_1.json"),
    ),
    (
        "conversation_2_message_2.json",
        include_str!("../../../fixtures/payloads/conversation_2_message_2.json"),
    ),
    (
        "conversation_2_status_read.json",
        include_str!("../../../fixtures/payloads/conversation_2_status_read.json"),
    ),
    (
        "conversation_3_status_orphan.json",
        include_str!("../../../fixtures/payloads/conversation_3_status_orphan.json"),
    ),
    (
        "conversation_4_message_1.json",
        include_str!("../../../fixtures/payloads/conversation_4_message_1.json"),
    ),
];

fn unique_temp_dir(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    let base = std::env::temp_dir().join(format!("wachat-{label}-{nanos}"));
    std::fs::create_dir_all(base.join("payloads")).expect("payload dir should be creatable");
    base
}

fn seed_payloads(dir: &Path, names: &[&str]) {
    for (name, body) in FIXTURES {
        if names.is_empty() || names.contains(name) {
            std::fs::write(dir.join(name), body).expect("fixture should be writable");
        }
    }
}

fn plan_for(base: &Path) -> IngestPlan {
    IngestPlan {
        payload_dir: base.join("payloads"),
    }
}

#[test]
fn full_fixture_directory_ingests_and_reconciles() {
    let base = unique_temp_dir("ingest-full");
    seed_payloads(&base.join("payloads"), &[]);
    let mut store = MessageStore::open(&base.join("wachat.sqlite")).expect("store should open");
    let relay = Relay::default();

    let report = run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");

    assert_eq!(report.status, IngestRunStatus::Success);
    assert_eq!(report.counts.message_files, 5);
    assert_eq!(report.counts.status_files, 3);
    assert_eq!(report.counts.messages_inserted, 3);
    assert_eq!(report.counts.statuses_applied, 2);
    assert_eq!(report.counts.statuses_deferred, 1);
    assert_eq!(report.counts.pending_resolved, 0);
    assert_eq!(report.counts.pending_unresolved, 1);
    assert_eq!(report.counts.files_skipped, 2);
    assert_eq!(report.warnings.len(), 2);
    assert_eq!(
        report.unresolved_message_ids(),
        vec!["wamid.never-ingested".to_string()]
    );

    assert_eq!(report.summary.total_messages, 3);
    assert_eq!(report.summary.messages_by_status.get("sent"), Some(&1));
    assert_eq!(report.summary.messages_by_status.get("delivered"), Some(&1));
    assert_eq!(report.summary.messages_by_status.get("read"), Some(&1));

    let reply = store
        .find_by_message_id(RAVI_REPLY_ID)
        .expect("lookup should succeed")
        .expect("reply should be stored");
    assert_eq!(reply.status, MessageStatus::Delivered);
    assert_eq!(reply.conversation_id, "conv_1_919937320320");
    assert_eq!(reply.from, "918329446654");
    assert_eq!(reply.status_history.len(), 1);
}

#[test]
fn status_matches_through_secondary_identifier() {
    let base = unique_temp_dir("ingest-meta-id");
    seed_payloads(
        &base.join("payloads"),
        &[
            "conversation_2_message_1.json",
            "conversation_2_status_read.json",
        ],
    );
    let mut store = MessageStore::open_in_memory().expect("store should open");
    let relay = Relay::default();

    let report = run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");
    assert_eq!(report.counts.statuses_applied, 1);
    assert!(report.unresolved.is_empty());

    let record = store
        .find_by_message_id(NEHA_MESSAGE_ID)
        .expect("lookup should succeed")
        .expect("message should be stored");
    assert_eq!(record.meta_msg_id.as_deref(), Some("wamid.conv2-outbound-ref"));
    assert_eq!(record.status, MessageStatus::Read);
    assert_eq!(record.status_history[0].status, MessageStatus::Read);
}

#[test]
fn second_run_over_same_directory_is_idempotent() {
    let base = unique_temp_dir("ingest-idempotent");
    seed_payloads(&base.join("payloads"), &[]);
    let mut store = MessageStore::open(&base.join("wachat.sqlite")).expect("store should open");
    let relay = Relay::default();

    run_ingest(&mut store, &relay, &plan_for(&base)).expect("first ingest should succeed");
    let second =
        run_ingest(&mut store, &relay, &plan_for(&base)).expect("second ingest should succeed");

    assert_eq!(second.counts.messages_inserted, 0);
    assert_eq!(second.counts.messages_duplicate, 3);
    assert_eq!(store.count_messages().expect("count should succeed"), 3);

    // Status payloads re-apply, so history grows while the status holds.
    let reply = store
        .find_by_message_id(RAVI_REPLY_ID)
        .expect("lookup should succeed")
        .expect("reply should be stored");
    assert_eq!(reply.status, MessageStatus::Delivered);
    assert_eq!(reply.status_history.len(), 2);
}

#[test]
fn deferred_status_applies_once_its_message_arrives() {
    let base = unique_temp_dir("ingest-deferred");
    let payload_dir = base.join("payloads");
    seed_payloads(&payload_dir, &["conversation_1_status_1.json"]);
    let mut store = MessageStore::open_in_memory().expect("store should open");
    let relay = Relay::default();

    let first = run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");
    assert_eq!(first.counts.statuses_deferred, 1);
    assert_eq!(first.unresolved_message_ids(), vec![RAVI_REPLY_ID.to_string()]);
    assert_eq!(store.count_messages().expect("count should succeed"), 0);

    seed_payloads(&payload_dir, &["conversation_1_message_2.json"]);
    let second = run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");
    assert_eq!(second.counts.messages_inserted, 1);
    assert_eq!(second.counts.statuses_applied, 1);
    assert!(second.unresolved.is_empty());
}

#[test]
fn later_status_file_wins_even_when_it_regresses() {
    let base = unique_temp_dir("ingest-last-wins");
    let payload_dir = base.join("payloads");
    seed_payloads(
        &payload_dir,
        &["conversation_1_message_2.json", "conversation_1_status_1.json"],
    );
    let regressed = include_str!("../../../fixtures/payloads/conversation_1_status_1.json")
        .replace("\"delivered\"", "\"sent\"");
    std::fs::write(payload_dir.join("conversation_1_status_2.json"), regressed)
        .expect("status fixture should be writable");
    let mut store = MessageStore::open_in_memory().expect("store should open");
    let relay = Relay::default();

    run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");

    let reply = store
        .find_by_message_id(RAVI_REPLY_ID)
        .expect("lookup should succeed")
        .expect("reply should be stored");
    assert_eq!(reply.status, MessageStatus::Sent);
    let history: Vec<_> = reply
        .status_history
        .iter()
        .map(|transition| transition.status)
        .collect();
    assert_eq!(history, vec![MessageStatus::Delivered, MessageStatus::Sent]);
}

#[test]
fn unusable_payloads_become_warnings_without_aborting() {
    let base = unique_temp_dir("ingest-resilient");
    seed_payloads(
        &base.join("payloads"),
        &[
            "conversation_2_message_1.json",
            "conversation_2_message_2.json",
            "conversation_4_message_1.json",
        ],
    );
    let mut store = MessageStore::open_in_memory().expect("store should open");
    let relay = Relay::default();

    let report = run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");

    assert_eq!(report.counts.messages_inserted, 1);
    assert_eq!(report.counts.files_skipped, 2);
    assert!(
        report
            .warnings
            .iter()
            .any(|warning| warning.contains("conversation_2_message_2.json")
                && warning.contains("messages array is empty"))
    );
    assert!(
        report
            .warnings
            .iter()
            .any(|warning| warning.contains("conversation_4_message_1.json")
                && warning.contains("invalid JSON"))
    );
}

#[test]
fn far_future_timestamps_skip_only_their_own_file() {
    let base = unique_temp_dir("ingest-far-future");
    let payloads = base.join("payloads");
    seed_payloads(&payloads, &["conversation_1_message_1.json"]);
    let far_future = FIXTURES[0].1.replace("\"1754400000\"", "\"9223372036854776\"");
    assert!(far_future.contains("9223372036854776"));
    std::fs::write(payloads.join("conversation_0_message_1.json"), far_future)
        .expect("payload should be writable");
    let far_status = FIXTURES[2].1.replace("\"1754400030\"", "\"300000000000\"");
    assert!(far_status.contains("300000000000"));
    std::fs::write(payloads.join("conversation_0_status_1.json"), far_status)
        .expect("payload should be writable");
    let mut store = MessageStore::open_in_memory().expect("store should open");
    let relay = Relay::default();

    let report = run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");

    assert_eq!(report.status, IngestRunStatus::Success);
    assert_eq!(report.counts.messages_inserted, 1);
    assert_eq!(report.counts.statuses_applied, 0);
    assert_eq!(report.counts.files_skipped, 2);
    assert!(
        report
            .warnings
            .iter()
            .any(|warning| warning.contains("conversation_0_message_1.json")
                && warning.contains("past the year 9999"))
    );
    assert!(
        report
            .warnings
            .iter()
            .any(|warning| warning.contains("conversation_0_status_1.json")
                && warning.contains("past the year 9999"))
    );
    assert_eq!(store.count_messages().expect("count should succeed"), 1);
}

#[test]
fn missing_payload_directory_fails_and_records_failed_run() {
    let base = unique_temp_dir("ingest-missing-dir");
    let mut store = MessageStore::open_in_memory().expect("store should open");
    let relay = Relay::default();
    let plan = IngestPlan {
        payload_dir: base.join("does-not-exist"),
    };

    let err = run_ingest(&mut store, &relay, &plan).expect_err("missing dir should fail");
    assert!(format!("{err:#}").contains("failed to list payload directory"));

    let status: String = store
        .connection()
        .query_row("SELECT status FROM ingest_runs", [], |row| row.get(0))
        .expect("failed run row should exist");
    assert_eq!(status, "failed");
}

#[test]
fn ingest_run_row_records_final_totals() {
    let base = unique_temp_dir("ingest-run-row");
    seed_payloads(&base.join("payloads"), &[]);
    let mut store = MessageStore::open_in_memory().expect("store should open");
    let relay = Relay::default();

    let report = run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");

    let (status, files_read, inserted, applied, unresolved, warnings): (
        String,
        i64,
        i64,
        i64,
        i64,
        i64,
    ) = store
        .connection()
        .query_row(
            "SELECT status, files_read, messages_inserted, statuses_applied,
                    statuses_unresolved, warnings_count
             FROM ingest_runs WHERE ingest_run_id = ?1",
            [&report.ingest_run_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .expect("run row should exist");

    assert_eq!(status, "success");
    assert_eq!(files_read, 8);
    assert_eq!(inserted, 3);
    assert_eq!(applied, 2);
    assert_eq!(unresolved, 1);
    assert_eq!(warnings, 2);
}

#[test]
fn report_artifact_lands_under_data_dir() {
    let base = unique_temp_dir("ingest-artifact");
    seed_payloads(&base.join("payloads"), &[]);
    let mut store = MessageStore::open_in_memory().expect("store should open");
    let relay = Relay::default();
    let report = run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");

    let artifact_path = ingest_report_artifact_path(&base.join("data"));
    assert_eq!(artifact_path, base.join("data").join("ingest").join("report.json"));
    write_ingest_report_artifact(&artifact_path, &report).expect("artifact should be written");

    let artifact: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(&artifact_path).expect("artifact should be readable"),
    )
    .expect("artifact should be JSON");
    assert_eq!(
        artifact["schema_version"],
        serde_json::json!(INGEST_REPORT_SCHEMA_VERSION)
    );
    assert_eq!(artifact["ingest_run_id"], serde_json::json!(report.ingest_run_id));
    assert_eq!(artifact["counts"]["messages_inserted"], serde_json::json!(3));
    assert_eq!(
        artifact["unresolved_message_ids"],
        serde_json::json!(["wamid.never-ingested"])
    );
}

#[test]
fn ingest_announces_inserts_and_status_changes() {
    let base = unique_temp_dir("ingest-relay");
    seed_payloads(
        &base.join("payloads"),
        &["conversation_1_message_2.json", "conversation_1_status_1.json"],
    );
    let mut store = MessageStore::open_in_memory().expect("store should open");
    let relay = Relay::default();
    let mut listener = relay.subscribe();

    run_ingest(&mut store, &relay, &plan_for(&base)).expect("ingest should succeed");

    match listener.try_recv().expect("new message event should be queued") {
        RelayEvent::NewMessage(record) => assert_eq!(record.message_id, RAVI_REPLY_ID),
        other => panic!("expected newMessage, got {other:?}"),
    }
    match listener.try_recv().expect("status event should be queued") {
        RelayEvent::StatusUpdate(change) => {
            assert_eq!(change.message_id, RAVI_REPLY_ID);
            assert_eq!(change.status, MessageStatus::Delivered);
        }
        other => panic!("expected statusUpdate, got {other:?}"),
    }
    assert!(listener.try_recv().is_err());
}
