use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use wachat::discovery::{
    PayloadFileKind, classifier::classify_file_name, discover_payload_files, read_payload_batch,
};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{nanos}"));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

#[test]
fn file_names_route_by_status_before_message() {
    assert_eq!(
        classify_file_name("conversation_1_message_1.json"),
        Some(PayloadFileKind::Message)
    );
    assert_eq!(
        classify_file_name("conversation_1_status_1.json"),
        Some(PayloadFileKind::Status)
    );
    assert_eq!(
        classify_file_name("message_status_7.JSON"),
        Some(PayloadFileKind::Status)
    );
    assert_eq!(classify_file_name("notes.json"), None);
    assert_eq!(classify_file_name("conversation_1_message_1.txt"), None);
}

#[test]
fn discovery_sorts_candidates_and_counts_ignored_entries() {
    let dir = unique_temp_dir("wachat-discovery");
    for name in [
        "conversation_2_message_1.json",
        "conversation_1_status_1.json",
        "conversation_1_message_1.json",
        "README.md",
    ] {
        std::fs::write(dir.join(name), "{}").expect("file should be writable");
    }

    let (candidates, ignored) = discover_payload_files(&dir).expect("directory should list");
    let names: Vec<_> = candidates
        .iter()
        .map(|candidate| candidate.file_name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "conversation_1_message_1.json",
            "conversation_1_status_1.json",
            "conversation_2_message_1.json",
        ]
    );
    assert_eq!(ignored, 1);
}

#[test]
fn batch_keeps_readable_files_and_reports_the_rest() {
    let dir = unique_temp_dir("wachat-batch");
    std::fs::write(
        dir.join("conversation_1_message_1.json"),
        include_str!("../../../fixtures/payloads/conversation_1_message_1.json"),
    )
    .expect("fixture should be writable");
    std::fs::write(
        dir.join("conversation_1_status_1.json"),
        include_str!("../../../fixtures/payloads/conversation_1_status_1.json"),
    )
    .expect("fixture should be writable");
    std::fs::write(
        dir.join("conversation_4_message_1.json"),
        include_str!("../../../fixtures/payloads/conversation_4_message_1.json"),
    )
    .expect("fixture should be writable");
    std::fs::create_dir_all(dir.join("archive_message.json")).expect("dir should be creatable");

    let batch = read_payload_batch(&dir).expect("batch should read");

    assert_eq!(batch.message_payloads.len(), 1);
    assert_eq!(batch.status_payloads.len(), 1);
    assert_eq!(batch.message_file_count(), 3);
    assert_eq!(batch.status_file_count(), 1);
    assert_eq!(batch.failures.len(), 2);

    let reasons: Vec<_> = batch
        .failures
        .iter()
        .map(|failure| (failure.file_name.as_str(), failure.reason.as_str()))
        .collect();
    assert_eq!(reasons[0], ("archive_message.json", "not a regular file"));
    assert_eq!(reasons[1].0, "conversation_4_message_1.json");
    assert!(reasons[1].1.starts_with("invalid JSON"));
    assert!(
        batch.failures[1]
            .warning()
            .starts_with("skipped message payload `conversation_4_message_1.json`")
    );
}

#[test]
fn unreadable_directory_is_an_error() {
    let dir = unique_temp_dir("wachat-missing").join("nope");
    let err = read_payload_batch(&dir).expect_err("missing directory should fail");
    assert!(err.to_string().contains("failed to list payload directory"));
}
