//! The batch processor. Drives one resumable run over an input file.
//!
//! # Per record
//! ```text
//! Pending ─┬─ invalid fields ────────────────▶ Invalid  (failed outcome, no request)
//!          ├─ prior success in result file ──▶ Skipped  (no new outcome)
//!          ├─ token issued / dry run ────────▶ Success
//!          └─ no usable token ───────────────▶ Failed
//! ```
//!
//! Every `flush_batch_size` processed records the outcomes gathered since
//! the last flush are merged into the result file and dropped from memory.
//! A failed incremental flush is logged and its outcomes kept for the next
//! one; the final flush must succeed.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::{ProcessorConfig, DRY_RUN_TOKEN};
use crate::error::{ConfigError, IssueError, ProcessError};
use crate::input::load_input;
use crate::issuer::{ShareTokenRequest, TokenIssuer, SHARE_TOKEN_PATH};
use crate::progress::{Counts, ProgressSnapshot, ProgressTracker};
use crate::record::{InputRecord, OutcomeRecord};
use crate::shutdown::Shutdown;
use crate::store::ResultStore;

/// Error message recorded when no usable token could be obtained.
pub const TOKEN_GENERATION_FAILED: &str = "Token generation failed";

/// Where tokens come from.
#[derive(Clone)]
pub enum Mode {
    /// Call the remote service.
    Live(Arc<dyn TokenIssuer>),
    /// Make no calls; every valid record succeeds with the sentinel token.
    DryRun,
}

impl std::fmt::Debug for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live(_) => write!(f, "Live"),
            Self::DryRun => write!(f, "DryRun"),
        }
    }
}

/// Terminal classification of one input record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Skipped,
    Invalid,
    Succeeded,
    Failed,
}

/// Observability events emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Progress(ProgressSnapshot),
    /// Result file rewritten with `rows` rows after `processed` records.
    Flushed { processed: usize, rows: usize },
    FlushFailed { processed: usize, reason: String },
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub counts: Counts,
    pub total: usize,
    pub elapsed: Duration,
    /// Rows in the result file after the last successful write.
    pub rows_written: usize,
    /// Shutdown stopped the run before every record was processed.
    pub interrupted: bool,
}

impl RunSummary {
    /// `(succeeded, failed)`; invalid records count as failed, skipped as neither.
    pub fn totals(&self) -> (usize, usize) {
        (self.counts.succeeded, self.counts.failed)
    }

    pub fn is_clean(&self) -> bool {
        self.counts.failed == 0 && !self.interrupted
    }
}

/// Drives a run. Holds only immutable configuration; all per-run state
/// lives on the stack of [`BatchProcessor::process`].
pub struct BatchProcessor {
    config: ProcessorConfig,
    mode: Mode,
    shutdown: Shutdown,
    events: Option<UnboundedSender<ProcessEvent>>,
}

impl BatchProcessor {
    pub fn new(config: ProcessorConfig, mode: Mode) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            mode,
            shutdown: Shutdown::never(),
            events: None,
        })
    }

    /// Stop between records once shutdown is requested.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Receive progress and flush events.
    pub fn with_events(mut self, events: UnboundedSender<ProcessEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.mode, Mode::DryRun)
    }

    /// Process `input`, resuming from and writing to `output`.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<RunSummary, ProcessError> {
        let records = load_input(input)?;
        let store = ResultStore::load(output);
        self.process(records, store).await
    }

    /// Process already-loaded records against `store`.
    pub async fn process(
        &self,
        records: Vec<InputRecord>,
        mut store: ResultStore,
    ) -> Result<RunSummary, ProcessError> {
        let total = records.len();
        let mut counts = Counts::default();
        let mut pending: Vec<OutcomeRecord> = Vec::new();
        let mut since_flush = 0usize;
        let mut rows_written = store.rows().len();
        let mut interrupted = false;
        let mut progress = ProgressTracker::new(total, self.config.progress_interval);

        tracing::info!(
            total,
            flush_every = self.config.flush_batch_size,
            dry_run = self.is_dry_run(),
            output = %store.path().display(),
            "starting batch"
        );

        for record in &records {
            if self.shutdown.is_triggered() {
                interrupted = true;
                break;
            }

            let Some((status, outcome)) = self.resolve(record, &store).await else {
                interrupted = true;
                break;
            };

            match status {
                RecordStatus::Skipped => counts.skipped += 1,
                RecordStatus::Invalid => {
                    counts.invalid += 1;
                    counts.failed += 1;
                }
                RecordStatus::Succeeded => counts.succeeded += 1,
                RecordStatus::Failed => counts.failed += 1,
            }
            counts.processed += 1;
            pending.extend(outcome);

            if let Some(snapshot) = progress.tick(counts) {
                tracing::info!("progress: {snapshot}");
                self.emit(ProcessEvent::Progress(snapshot));
            }

            since_flush += 1;
            if since_flush >= self.config.flush_batch_size {
                since_flush = 0;
                if let Some(rows) = self.incremental_flush(&mut store, &mut pending, counts.processed) {
                    rows_written = rows;
                }
            }
        }

        if interrupted {
            tracing::warn!(
                processed = counts.processed,
                total,
                "shutdown requested, stopping after last completed record"
            );
        }

        if pending.is_empty() {
            tracing::info!("all outcomes already written by incremental flushes");
        } else {
            tracing::info!(
                path = %store.path().display(),
                new_rows = pending.len(),
                "writing final output"
            );
            rows_written = store.flush(&pending).map_err(ProcessError::FinalWrite)?;
            self.emit(ProcessEvent::Flushed {
                processed: counts.processed,
                rows: rows_written,
            });
        }

        let elapsed = progress.elapsed();
        self.emit(ProcessEvent::Progress(progress.snapshot_at(tokio::time::Instant::now(), counts)));
        tracing::info!(
            succeeded = counts.succeeded,
            failed = counts.failed,
            skipped = counts.skipped,
            invalid = counts.invalid,
            elapsed_ms = elapsed.as_millis() as u64,
            "processing complete"
        );

        Ok(RunSummary {
            counts,
            total,
            elapsed,
            rows_written,
            interrupted,
        })
    }

    /// Classify one record. `None` means shutdown interrupted it and it
    /// produced no outcome.
    async fn resolve(
        &self,
        record: &InputRecord,
        store: &ResultStore,
    ) -> Option<(RecordStatus, Option<OutcomeRecord>)> {
        if let Err(message) = record.validate() {
            tracing::warn!(
                correlation_id = %record.correlation_id,
                reason = %message,
                "invalid record"
            );
            let outcome = OutcomeRecord::failure(record, &self.config.client_id, message);
            return Some((RecordStatus::Invalid, Some(outcome)));
        }

        if store.should_skip(&record.correlation_id) {
            tracing::debug!(correlation_id = %record.correlation_id, "already issued, skipping");
            return Some((RecordStatus::Skipped, None));
        }

        let issuer = match &self.mode {
            Mode::DryRun => {
                self.log_dry_run(record);
                let outcome = OutcomeRecord::success(record, DRY_RUN_TOKEN, &self.config.client_id);
                return Some((RecordStatus::Succeeded, Some(outcome)));
            }
            Mode::Live(issuer) => issuer,
        };

        match issuer.issue(&record.subject_id).await {
            Ok(grant) => {
                tracing::debug!(correlation_id = %record.correlation_id, "token issued");
                let client_id = grant
                    .client_id
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| self.config.client_id.clone());
                let outcome = OutcomeRecord::success(record, grant.token, client_id);
                Some((RecordStatus::Succeeded, Some(outcome)))
            }
            Err(IssueError::Cancelled) => None,
            Err(e) => {
                tracing::error!(
                    correlation_id = %record.correlation_id,
                    subject_id = %record.subject_id,
                    error = %e,
                    "token generation failed"
                );
                let outcome =
                    OutcomeRecord::failure(record, &self.config.client_id, TOKEN_GENERATION_FAILED);
                Some((RecordStatus::Failed, Some(outcome)))
            }
        }
    }

    /// Merge and persist `pending`; on success clear it and return the row count.
    fn incremental_flush(
        &self,
        store: &mut ResultStore,
        pending: &mut Vec<OutcomeRecord>,
        processed: usize,
    ) -> Option<usize> {
        if pending.is_empty() {
            return None;
        }
        tracing::info!(processed, new_rows = pending.len(), "incremental flush");
        match store.flush(pending) {
            Ok(rows) => {
                pending.clear();
                self.emit(ProcessEvent::Flushed { processed, rows });
                Some(rows)
            }
            Err(e) => {
                tracing::error!(
                    processed,
                    error = %e,
                    "incremental flush failed, outcomes kept for the next flush"
                );
                self.emit(ProcessEvent::FlushFailed {
                    processed,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    fn log_dry_run(&self, record: &InputRecord) {
        let payload = ShareTokenRequest {
            subject_id: &record.subject_id,
            client_id: &self.config.client_id,
            ttl_secs: self.config.ttl_secs,
        };
        match payload.to_body() {
            Ok(body) => tracing::info!(
                "[DRY-RUN] POST {SHARE_TOKEN_PATH} payload={}",
                String::from_utf8_lossy(&body)
            ),
            Err(e) => tracing::warn!(error = %e, "[DRY-RUN] could not render payload"),
        }
    }

    fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
