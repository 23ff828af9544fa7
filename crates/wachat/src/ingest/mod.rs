use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::json;

use crate::discovery::read_payload_batch;
use crate::models::{ProcessingSummary, StatusEvent};
use crate::relay::Relay;
use crate::sqlite::{IngestRunState, IngestRunTotals, MessageStore};
use crate::summary::build_processing_summary;
use crate::utils::time::now_utc_rfc3339;

pub mod message;
pub mod status;

pub use message::{MessageIngestOutcome, SeenMessages, ingest_message_payload};
pub use status::{PendingStatusQueue, ReplayOutcome, StatusOutcome, reconcile_status_payload};

pub const INGEST_REPORT_SCHEMA_VERSION: &str = "wachat.ingest-report.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPhase {
    Idle,
    ReadingMessages,
    ReadingStatuses,
    ReplayingPending,
    Summarizing,
    Done,
}

impl IngestPhase {
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::ReadingMessages),
            Self::ReadingMessages => Some(Self::ReadingStatuses),
            Self::ReadingStatuses => Some(Self::ReplayingPending),
            Self::ReplayingPending => Some(Self::Summarizing),
            Self::Summarizing => Some(Self::Done),
            Self::Done => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ReadingMessages => "reading-messages",
            Self::ReadingStatuses => "reading-statuses",
            Self::ReplayingPending => "replaying-pending",
            Self::Summarizing => "summarizing",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestRunStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestPlan {
    pub payload_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IngestCounts {
    pub message_files: usize,
    pub status_files: usize,
    pub files_skipped: usize,
    pub messages_inserted: usize,
    pub messages_duplicate: usize,
    pub statuses_applied: usize,
    pub statuses_deferred: usize,
    pub pending_resolved: usize,
    pub pending_unresolved: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestRunReport {
    pub ingest_run_id: String,
    pub payload_dir: String,
    pub status: IngestRunStatus,
    pub started_at_utc: String,
    pub finished_at_utc: String,
    pub duration_ms: u64,
    pub counts: IngestCounts,
    pub unresolved: Vec<StatusEvent>,
    pub warnings: Vec<String>,
    pub summary: ProcessingSummary,
}

impl IngestRunReport {
    #[must_use]
    pub fn unresolved_message_ids(&self) -> Vec<String> {
        self.unresolved
            .iter()
            .map(|event| event.message_id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReportArtifact {
    pub schema_version: String,
    pub ingest_run_id: String,
    pub payload_dir: String,
    pub status: IngestRunStatus,
    pub started_at_utc: String,
    pub finished_at_utc: String,
    pub duration_ms: u64,
    pub counts: IngestCounts,
    pub unresolved_message_ids: Vec<String>,
    pub warnings: Vec<String>,
}

struct RunOutcome {
    counts: IngestCounts,
    unresolved: Vec<StatusEvent>,
    warnings: Vec<String>,
    summary: ProcessingSummary,
}

/// One ingestion run over one payload directory. Phases advance strictly in
/// order and a finished orchestrator cannot be restarted.
pub struct IngestOrchestrator<'a> {
    store: &'a mut MessageStore,
    relay: &'a Relay,
    phase: IngestPhase,
    seen: SeenMessages,
    pending: PendingStatusQueue,
}

impl<'a> IngestOrchestrator<'a> {
    pub fn new(store: &'a mut MessageStore, relay: &'a Relay) -> Self {
        Self {
            store,
            relay,
            phase: IngestPhase::Idle,
            seen: SeenMessages::new(),
            pending: PendingStatusQueue::default(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> IngestPhase {
        self.phase
    }

    fn enter(&mut self, next: IngestPhase) -> Result<()> {
        if self.phase.next() != Some(next) {
            bail!(
                "invalid ingest phase transition: {} -> {}",
                self.phase.as_str(),
                next.as_str()
            );
        }
        tracing::info!(phase = next.as_str(), "ingest phase");
        self.phase = next;
        Ok(())
    }

    fn execute(&mut self, plan: &IngestPlan) -> Result<RunOutcome> {
        let mut counts = IngestCounts::default();
        let mut warnings = Vec::new();

        self.enter(IngestPhase::ReadingMessages)?;
        let batch = read_payload_batch(&plan.payload_dir)?;
        counts.message_files = batch.message_file_count();
        counts.status_files = batch.status_file_count();
        counts.files_skipped = batch.failures.len();
        warnings.extend(batch.failures.iter().map(|failure| failure.warning()));

        for payload_file in &batch.message_payloads {
            let now_utc = now_utc_rfc3339()?;
            match ingest_message_payload(
                self.store,
                self.relay,
                &mut self.seen,
                payload_file,
                &now_utc,
            )? {
                MessageIngestOutcome::Inserted(_) => counts.messages_inserted += 1,
                MessageIngestOutcome::Duplicate(_) => counts.messages_duplicate += 1,
                MessageIngestOutcome::Skipped { reason } => {
                    tracing::warn!(
                        file = %payload_file.file_name,
                        %reason,
                        "skipping message payload"
                    );
                    counts.files_skipped += 1;
                    warnings.push(format!(
                        "skipped message payload `{}`: {reason}",
                        payload_file.file_name
                    ));
                }
            }
        }

        self.enter(IngestPhase::ReadingStatuses)?;
        for payload_file in &batch.status_payloads {
            let now_utc = now_utc_rfc3339()?;
            match reconcile_status_payload(
                self.store,
                self.relay,
                &mut self.pending,
                payload_file,
                &now_utc,
            )? {
                StatusOutcome::Applied(_) => counts.statuses_applied += 1,
                StatusOutcome::Deferred(_) => counts.statuses_deferred += 1,
                StatusOutcome::Skipped { reason } => {
                    tracing::warn!(
                        file = %payload_file.file_name,
                        %reason,
                        "skipping status payload"
                    );
                    counts.files_skipped += 1;
                    warnings.push(format!(
                        "skipped status payload `{}`: {reason}",
                        payload_file.file_name
                    ));
                }
            }
        }

        self.enter(IngestPhase::ReplayingPending)?;
        let pending = std::mem::take(&mut self.pending);
        tracing::info!(pending = pending.len(), "replaying deferred statuses");
        let replay = status::replay_pending(self.store, self.relay, pending, &now_utc_rfc3339()?)?;
        counts.pending_resolved = replay.resolved.len();
        counts.pending_unresolved = replay.unresolved.len();
        for event in &replay.unresolved {
            tracing::warn!(
                message_id = %event.message_id,
                status = %event.status,
                file = event.source_file.as_deref().unwrap_or("-"),
                "status target still missing after replay"
            );
        }

        self.enter(IngestPhase::Summarizing)?;
        let summary = build_processing_summary(self.store)?;

        self.enter(IngestPhase::Done)?;
        Ok(RunOutcome {
            counts,
            unresolved: replay.unresolved,
            warnings,
            summary,
        })
    }
}

/// Runs messages, then statuses, then the deferred-status replay, and records
/// the run in `ingest_runs`. Per-file problems become warnings; store
/// failures abort the run.
pub fn run_ingest(
    store: &mut MessageStore,
    relay: &Relay,
    plan: &IngestPlan,
) -> Result<IngestRunReport> {
    let started_at_utc = now_utc_rfc3339()?;
    let started_at = std::time::Instant::now();
    let ingest_run_id = build_ingest_run_id();
    let payload_dir = plan.payload_dir.to_string_lossy().to_string();

    store.begin_ingest_run(&ingest_run_id, &started_at_utc, &payload_dir)?;

    let outcome = IngestOrchestrator::new(store, relay).execute(plan);
    let finished_at_utc = now_utc_rfc3339()?;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(error) => {
            let error_summary = json!({ "message": format!("{error:#}") }).to_string();
            let _ = store.finalize_ingest_run(
                &ingest_run_id,
                IngestRunState::Failed,
                &finished_at_utc,
                IngestRunTotals::default(),
                &error_summary,
            );
            return Err(error).context("ingestion run failed");
        }
    };

    store.finalize_ingest_run(
        &ingest_run_id,
        IngestRunState::Success,
        &finished_at_utc,
        IngestRunTotals {
            files_read: outcome.counts.message_files + outcome.counts.status_files,
            messages_inserted: outcome.counts.messages_inserted,
            statuses_applied: outcome.counts.statuses_applied + outcome.counts.pending_resolved,
            statuses_unresolved: outcome.counts.pending_unresolved,
            warnings_count: outcome.warnings.len(),
        },
        "{}",
    )?;

    tracing::info!(
        ingest_run_id = %ingest_run_id,
        inserted = outcome.counts.messages_inserted,
        applied = outcome.counts.statuses_applied,
        unresolved = outcome.counts.pending_unresolved,
        "ingestion run finished"
    );

    Ok(IngestRunReport {
        ingest_run_id,
        payload_dir,
        status: IngestRunStatus::Success,
        started_at_utc,
        finished_at_utc,
        duration_ms: started_at.elapsed().as_millis() as u64,
        counts: outcome.counts,
        unresolved: outcome.unresolved,
        warnings: outcome.warnings,
        summary: outcome.summary,
    })
}

fn build_ingest_run_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos() as u64);
    format!("ingest-{nanos:016x}")
}

#[must_use]
pub fn ingest_report_artifact_path(data_dir: &Path) -> PathBuf {
    data_dir.join("ingest").join("report.json")
}

#[must_use]
pub fn build_ingest_report_artifact(report: &IngestRunReport) -> IngestReportArtifact {
    IngestReportArtifact {
        schema_version: INGEST_REPORT_SCHEMA_VERSION.to_string(),
        ingest_run_id: report.ingest_run_id.clone(),
        payload_dir: report.payload_dir.clone(),
        status: report.status,
        started_at_utc: report.started_at_utc.clone(),
        finished_at_utc: report.finished_at_utc.clone(),
        duration_ms: report.duration_ms,
        counts: report.counts,
        unresolved_message_ids: report.unresolved_message_ids(),
        warnings: report.warnings.clone(),
    }
}

pub fn write_ingest_report_artifact(path: &Path, report: &IngestRunReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create ingest report artifact directory: {}",
                parent.display()
            )
        })?;
    }
    let artifact = build_ingest_report_artifact(report);
    let encoded =
        serde_json::to_vec_pretty(&artifact).context("failed to encode ingest report artifact")?;
    std::fs::write(path, encoded)
        .with_context(|| format!("failed to write ingest report artifact: {}", path.display()))
}
