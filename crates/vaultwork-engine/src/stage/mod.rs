//! Stage loops: timer-driven scan-and-act cycles over vault folders.
//!
//! Every stage implements [`Stage`]. Stages that act on existing records
//! implement the narrower [`RecordStage`] and run inside a [`RecordLoop`],
//! which owns the shared per-record protocol: read, re-check, claim, handle,
//! then write the result back.

pub mod ingest;
pub mod plan;
pub mod send;
pub mod triage;
pub mod worker;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vaultwork_core::{Folder, RecordKind, Status};

use crate::error::{StageError, StoreError};
use crate::record::Record;
use crate::retry::{RetryDecision, RetryPolicy, RetryTracker};
use crate::state_machine::{apply, Actor, Transition};
use crate::store::{RecordHandle, VaultStore};
use crate::types::{Outcome, TickReport};

pub use ingest::{ExternalEvent, IngestSource, IngestStage};
pub use plan::PlanStage;
pub use send::SendStage;
pub use triage::TriageStage;
pub use worker::WorkerStage;

/// A unit of periodic work driven by a [`crate::runner::StageRunner`].
#[async_trait]
pub trait Stage: Send {
    fn name(&self) -> &str;

    /// One scan-and-act pass. Per-record problems are counted in the report;
    /// an `Err` means the pass could not run at all.
    async fn tick(&mut self) -> Result<TickReport, StageError>;

    /// Flush state before the loop exits.
    async fn shutdown(&mut self) -> Result<(), StageError> {
        Ok(())
    }
}

/// Which records a stage looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub folder: Folder,
    /// File name glob (`*`, `?`).
    pub pattern: String,
    /// Accepted kinds; empty accepts any kind.
    pub kinds: Vec<RecordKind>,
    /// Trigger statuses.
    pub statuses: Vec<Status>,
}

impl Selector {
    pub fn new(folder: Folder, pattern: impl Into<String>) -> Self {
        Self {
            folder,
            pattern: pattern.into(),
            kinds: Vec::new(),
            statuses: Vec::new(),
        }
    }

    pub fn kinds(mut self, kinds: &[RecordKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn statuses(mut self, statuses: &[Status]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&record.kind))
            && self.statuses.contains(&record.status)
    }
}

/// Stage-specific behaviour plugged into a [`RecordLoop`].
#[async_trait]
pub trait RecordStage: Send + Sync {
    fn name(&self) -> &str;

    /// Actor used for every transition this stage applies.
    fn actor(&self) -> Actor;

    fn selector(&self) -> &Selector;

    /// Status written before the handler runs, to mark the record as taken.
    fn claim_status(&self) -> Option<Status> {
        None
    }

    async fn handle(&self, store: &VaultStore, record: &Record) -> Outcome;

    /// Runs after a successful result was written (and relocated).
    async fn after_success(
        &self,
        _store: &VaultStore,
        _record: &Record,
        _handle: &RecordHandle,
    ) -> Result<(), StageError> {
        Ok(())
    }

    /// Dashboard line for a finished record. `None` logs nothing.
    fn dashboard_line(&self, record: &Record, outcome: &Outcome) -> Option<String> {
        Some(format!("[{}] {}: {}", self.name(), record.file_name(), outcome))
    }
}

enum ReadFailure {
    /// Moved or deleted since listing.
    Gone,
    Corrupt(StoreError),
    Io(StoreError),
}

enum Disposition {
    Succeeded,
    Retried,
    Failed,
    Skipped,
    Deferred,
}

/// Drives a [`RecordStage`] over its selector, one record at a time.
pub struct RecordLoop<S> {
    stage: S,
    store: VaultStore,
    policy: RetryPolicy,
    retries: RetryTracker,
}

impl<S: RecordStage> RecordLoop<S> {
    pub fn new(stage: S, store: VaultStore, policy: RetryPolicy) -> Self {
        Self {
            stage,
            store,
            policy,
            retries: RetryTracker::new(),
        }
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn store(&self) -> &VaultStore {
        &self.store
    }

    /// Process a single record, as one tick would.
    pub async fn process(&mut self, handle: &RecordHandle) -> TickReport {
        let mut report = TickReport {
            scanned: 1,
            ..Default::default()
        };
        match self.process_one(handle).await {
            Disposition::Succeeded => report.succeeded += 1,
            Disposition::Retried => report.retried += 1,
            Disposition::Failed => report.failed += 1,
            Disposition::Skipped => report.skipped += 1,
            Disposition::Deferred => report.deferred += 1,
        }
        report
    }

    async fn read_with_retries(&self, handle: &RecordHandle) -> Result<Record, ReadFailure> {
        let attempts = self.policy.io_read_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.read_record(handle) {
                Ok(record) => return Ok(record),
                Err(e) if e.is_not_found() => return Err(ReadFailure::Gone),
                Err(e @ StoreError::Corrupt { .. }) => return Err(ReadFailure::Corrupt(e)),
                Err(e) if attempt >= attempts => return Err(ReadFailure::Io(e)),
                Err(e) => {
                    tracing::debug!(
                        stage = %self.stage.name(),
                        record = %handle.file_name,
                        attempt,
                        error = %e,
                        "Read failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.policy.io_retry_delay).await;
                }
            }
        }
    }

    /// A claim left behind by a run that never finished.
    fn is_stale_claim(&self, record: &Record) -> bool {
        let Some(claim) = self.stage.claim_status() else {
            return false;
        };
        if record.status != claim {
            return false;
        }
        let selector = self.stage.selector();
        if !selector.kinds.is_empty() && !selector.kinds.contains(&record.kind) {
            return false;
        }
        let claimed_at = record
            .field("claimed_at")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc));
        match claimed_at {
            Some(at) => {
                let age = Utc::now().signed_duration_since(at);
                age.to_std().unwrap_or(Duration::ZERO) >= self.policy.claim_timeout
            }
            None => true,
        }
    }

    async fn process_one(&mut self, handle: &RecordHandle) -> Disposition {
        let stage_name = self.stage.name().to_string();

        let original = match self.read_with_retries(handle).await {
            Ok(record) => record,
            Err(ReadFailure::Gone) => {
                tracing::debug!(stage = %stage_name, record = %handle.file_name, "Record vanished");
                return Disposition::Skipped;
            }
            Err(ReadFailure::Corrupt(e)) => {
                tracing::warn!(stage = %stage_name, record = %handle.file_name, error = %e, "Skipping corrupt record");
                return Disposition::Skipped;
            }
            Err(ReadFailure::Io(e)) => {
                tracing::warn!(stage = %stage_name, record = %handle.file_name, error = %e, "Record unreadable, deferring");
                return Disposition::Deferred;
            }
        };

        let stale_claim = self.is_stale_claim(&original);
        if !self.stage.selector().matches(&original) && !stale_claim {
            return Disposition::Skipped;
        }
        if !self.retries.is_due(&handle.file_name) {
            return Disposition::Deferred;
        }
        if stale_claim {
            tracing::warn!(stage = %stage_name, record = %handle.file_name, "Reclaiming stale claim");
        }

        let actor = self.stage.actor();
        let mut claimed = false;
        let working = match self.stage.claim_status() {
            Some(claim) => {
                let transition =
                    Transition::new(claim, actor).with_field("claimed_at", Utc::now().to_rfc3339());
                let record = match apply(&original, &transition) {
                    Ok(record) => record,
                    Err(rejected) => {
                        tracing::debug!(stage = %stage_name, record = %handle.file_name, reason = %rejected, "Not claimable");
                        return Disposition::Skipped;
                    }
                };
                if let Err(e) = self.store.write_record(handle, &record) {
                    tracing::warn!(stage = %stage_name, record = %handle.file_name, error = %e, "Could not write claim");
                    return Disposition::Deferred;
                }
                claimed = true;
                record
            }
            None => original.clone(),
        };

        let outcome = self.stage.handle(&self.store, &working).await;

        match outcome {
            Outcome::Success {
                status,
                relocate_to,
                fields,
            } => {
                let transition = Transition {
                    to: status,
                    actor,
                    fields: fields.clone(),
                };
                let updated = match apply(&working, &transition) {
                    Ok(updated) => updated,
                    Err(rejected) => {
                        tracing::warn!(stage = %stage_name, record = %handle.file_name, reason = %rejected, "Handler result rejected");
                        return self.fail(handle, &working, rejected.to_string());
                    }
                };
                if let Err(e) = self.store.write_record(handle, &updated) {
                    tracing::error!(stage = %stage_name, record = %handle.file_name, error = %e, "Could not write result");
                    if claimed {
                        self.restore(handle, &original);
                    }
                    return Disposition::Deferred;
                }

                let mut final_handle = handle.clone();
                if let Some(folder) = relocate_to {
                    match self.store.relocate(handle, folder) {
                        Ok(moved) => final_handle = moved,
                        Err(e) => {
                            tracing::error!(stage = %stage_name, record = %handle.file_name, to = %folder, error = %e, "Could not relocate");
                        }
                    }
                }

                if let Err(e) = self.stage.after_success(&self.store, &updated, &final_handle).await {
                    tracing::warn!(stage = %stage_name, record = %handle.file_name, error = %e, "After-success step failed");
                }

                self.retries.clear(&handle.file_name);
                let outcome = Outcome::Success {
                    status,
                    relocate_to,
                    fields,
                };
                tracing::info!(stage = %stage_name, record = %handle.file_name, outcome = %outcome, "Record processed");
                self.log_dashboard(&updated, &outcome);
                Disposition::Succeeded
            }
            Outcome::Retry { reason } => match self.retries.record_retry(&handle.file_name, &self.policy) {
                RetryDecision::Wait { attempts, delay } => {
                    if claimed {
                        self.restore(handle, &original);
                    }
                    tracing::info!(
                        stage = %stage_name,
                        record = %handle.file_name,
                        attempts,
                        delay_secs = delay.as_secs(),
                        reason = %reason,
                        "Will retry"
                    );
                    Disposition::Retried
                }
                RetryDecision::GiveUp { attempts } => self.fail(
                    handle,
                    &working,
                    format!("retry limit exceeded after {attempts} attempts: {reason}"),
                ),
            },
            Outcome::Fail { reason } => self.fail(handle, &working, reason),
        }
    }

    /// Put back the record as it was before the claim.
    fn restore(&self, handle: &RecordHandle, original: &Record) {
        if let Err(e) = self.store.write_record(handle, original) {
            tracing::error!(stage = %self.stage.name(), record = %handle.file_name, error = %e, "Could not release claim");
        }
    }

    fn fail(&mut self, handle: &RecordHandle, record: &Record, reason: String) -> Disposition {
        self.retries.clear(&handle.file_name);
        let transition = Transition::new(Status::Failed, self.stage.actor())
            .with_field("error", reason.replace('\n', " "))
            .with_field("failed_at", Utc::now().to_rfc3339());
        let failed = match apply(record, &transition) {
            Ok(failed) => failed,
            Err(rejected) => {
                tracing::warn!(stage = %self.stage.name(), record = %handle.file_name, reason = %rejected, "Cannot mark failed");
                return Disposition::Skipped;
            }
        };
        if let Err(e) = self.store.write_record(handle, &failed) {
            tracing::error!(stage = %self.stage.name(), record = %handle.file_name, error = %e, "Could not write failure");
            return Disposition::Deferred;
        }
        tracing::warn!(stage = %self.stage.name(), record = %handle.file_name, reason = %reason, "Record failed");
        self.log_dashboard(&failed, &Outcome::Fail { reason });
        Disposition::Failed
    }

    fn log_dashboard(&self, record: &Record, outcome: &Outcome) {
        if let Some(line) = self.stage.dashboard_line(record, outcome) {
            if let Err(e) = self.store.append_log(&line) {
                tracing::warn!(stage = %self.stage.name(), error = %e, "Could not append to dashboard");
            }
        }
    }
}

#[async_trait]
impl<S: RecordStage> Stage for RecordLoop<S> {
    fn name(&self) -> &str {
        self.stage.name()
    }

    async fn tick(&mut self) -> Result<TickReport, StageError> {
        let (folder, pattern) = {
            let selector = self.stage.selector();
            (selector.folder, selector.pattern.clone())
        };
        let handles = self.store.list(folder, &pattern)?;
        let mut report = TickReport::default();
        for handle in &handles {
            report.merge(&self.process(handle).await);
        }
        self.retries
            .retain_listed(handles.iter().map(|handle| handle.file_name.as_str()));
        if report.processed() > 0 {
            tracing::info!(stage = %self.stage.name(), %report, "Tick complete");
        } else {
            tracing::debug!(stage = %self.stage.name(), %report, "Tick complete");
        }
        Ok(report)
    }
}
