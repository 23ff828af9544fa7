use std::path::Path;

use super::PayloadFileKind;

const PAYLOAD_EXTENSION: &str = "json";
const STATUS_MARKER: &str = "status";
const MESSAGE_MARKER: &str = "message";

/// `*status*.json` is a status payload, any other `*message*.json` a message
/// payload; everything else is ignored.
#[must_use]
pub fn classify_file_name(file_name: &str) -> Option<PayloadFileKind> {
    let path = Path::new(file_name);
    let is_json = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .is_some_and(|extension| extension.eq_ignore_ascii_case(PAYLOAD_EXTENSION));
    if !is_json {
        return None;
    }

    let stem = path
        .file_stem()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or_default()
        .to_ascii_lowercase();
    if stem.contains(STATUS_MARKER) {
        Some(PayloadFileKind::Status)
    } else if stem.contains(MESSAGE_MARKER) {
        Some(PayloadFileKind::Message)
    } else {
        None
    }
}
