use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

pub mod classifier;

pub use classifier::classify_file_name;

const MAX_PAYLOAD_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFileKind {
    Message,
    Status,
}

impl PayloadFileKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadCandidate {
    pub file_name: String,
    pub path: PathBuf,
    pub kind: PayloadFileKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadFile {
    pub file_name: String,
    pub path: PathBuf,
    pub kind: PayloadFileKind,
    pub document: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadReadFailure {
    pub file_name: String,
    pub kind: PayloadFileKind,
    pub reason: String,
}

impl PayloadReadFailure {
    #[must_use]
    pub fn warning(&self) -> String {
        format!(
            "skipped {} payload `{}`: {}",
            self.kind.as_str(),
            self.file_name,
            self.reason
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PayloadBatch {
    pub message_payloads: Vec<PayloadFile>,
    pub status_payloads: Vec<PayloadFile>,
    pub failures: Vec<PayloadReadFailure>,
    pub ignored_entries: usize,
}

impl PayloadBatch {
    #[must_use]
    pub fn message_file_count(&self) -> usize {
        self.message_payloads.len() + self.failed_count(PayloadFileKind::Message)
    }

    #[must_use]
    pub fn status_file_count(&self) -> usize {
        self.status_payloads.len() + self.failed_count(PayloadFileKind::Status)
    }

    fn failed_count(&self, kind: PayloadFileKind) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.kind == kind)
            .count()
    }
}

/// Lists payload files directly inside `dir`, sorted by file name.
///
/// Only the directory itself being unreadable is an error; individual entries
/// that cannot be inspected are skipped.
pub fn discover_payload_files(dir: &Path) -> Result<(Vec<PayloadCandidate>, usize)> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list payload directory: {}", dir.display()))?;

    let mut candidates = Vec::new();
    let mut ignored = 0usize;
    for entry in entries {
        let Ok(entry) = entry else {
            ignored += 1;
            continue;
        };
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(kind) = classify_file_name(&file_name) else {
            ignored += 1;
            continue;
        };
        candidates.push(PayloadCandidate {
            file_name,
            path: entry.path(),
            kind,
        });
    }

    candidates.sort_by(|left, right| left.file_name.cmp(&right.file_name));
    Ok((candidates, ignored))
}

pub fn read_payload_file(
    candidate: &PayloadCandidate,
) -> std::result::Result<PayloadFile, PayloadReadFailure> {
    let failure = |reason: String| PayloadReadFailure {
        file_name: candidate.file_name.clone(),
        kind: candidate.kind,
        reason,
    };

    let metadata = std::fs::metadata(&candidate.path)
        .map_err(|error| failure(format!("file is missing or unreadable ({error})")))?;
    if !metadata.is_file() {
        return Err(failure("not a regular file".to_string()));
    }
    if metadata.len() > MAX_PAYLOAD_BYTES {
        return Err(failure(format!(
            "file exceeds {MAX_PAYLOAD_BYTES} byte payload limit"
        )));
    }

    let content = std::fs::read_to_string(&candidate.path)
        .map_err(|error| failure(format!("failed to read file ({error})")))?;
    let document = serde_json::from_str::<Value>(&content)
        .map_err(|error| failure(format!("invalid JSON ({error})")))?;

    Ok(PayloadFile {
        file_name: candidate.file_name.clone(),
        path: candidate.path.clone(),
        kind: candidate.kind,
        document,
    })
}

/// Reads every payload in `dir`, split into message and status sequences.
pub fn read_payload_batch(dir: &Path) -> Result<PayloadBatch> {
    let (candidates, ignored_entries) = discover_payload_files(dir)?;
    let mut batch = PayloadBatch {
        ignored_entries,
        ..PayloadBatch::default()
    };

    for candidate in &candidates {
        match read_payload_file(candidate) {
            Ok(payload) => match payload.kind {
                PayloadFileKind::Message => batch.message_payloads.push(payload),
                PayloadFileKind::Status => batch.status_payloads.push(payload),
            },
            Err(failure) => {
                tracing::warn!(
                    file = %failure.file_name,
                    reason = %failure.reason,
                    "skipping unreadable payload file"
                );
                batch.failures.push(failure);
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        message_files = batch.message_file_count(),
        status_files = batch.status_file_count(),
        "discovered payload files"
    );
    Ok(batch)
}
