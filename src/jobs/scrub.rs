//! Scrub job for removing blobs and metadata of deleted document versions.
//!
//! A run:
//! 1. Pages through `status = 'deleted'` rows in id order
//! 2. Splits each page into batches and scrubs the units of a batch concurrently
//! 3. For each unit, skips it if content-identical live versions still need
//!    the blobs, otherwise deletes every blob under its path and then purges
//!    the deleted rows
//!
//! Blobs are always deleted before rows are purged. A crash between the two
//! leaves rows marked deleted with no blobs behind them, which the next run
//! finishes off with an empty listing and a purge.
//!
//! Objects written under a unit's path after it was listed survive the run.
//! The write path must not write under a hash whose versions are all deleted.
//!
//! Runs are safe to repeat: per-unit failures leave rows in place for the next
//! run, and dry run mode logs what would be removed without touching anything.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::dedup::{DedupGuard, DedupKey};
use crate::{
    config::ScrubConfig,
    db::{DataSourceRepo, DbError, DbPool, DocumentVersionRepo},
    models::{DocumentVersion, ScrubUnit},
    observability::metrics,
    services::{BlobObject, BlobStorageError, BlobStore, listing_prefix, resolve_blob_path},
};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrubPhase {
    Fetching,
    Batching,
    Processing,
    Reporting,
    Done,
}

/// How a single unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Blobs deleted and rows purged (or would have been, in dry run).
    Scrubbed,
    /// Another candidate of the same run already handled this unit.
    SkippedDuplicate,
    /// A live version still references the content.
    SkippedLive,
    /// Left in place for a later run.
    Failed,
}

impl UnitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOutcome::Scrubbed => "scrubbed",
            UnitOutcome::SkippedDuplicate => "skipped_duplicate",
            UnitOutcome::SkippedLive => "skipped_live",
            UnitOutcome::Failed => "failed",
        }
    }
}

/// Result of scrubbing one unit successfully or skipping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitReport {
    pub outcome: UnitOutcome,
    pub blobs_deleted: u64,
    pub rows_purged: u64,
}

impl UnitReport {
    fn skipped(outcome: UnitOutcome) -> Self {
        Self {
            outcome,
            blobs_deleted: 0,
            rows_purged: 0,
        }
    }
}

/// Summary of a run, handed to the [`RunReporter`] and printed by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrubReport {
    pub units_scrubbed: u64,
    pub units_skipped_duplicate: u64,
    pub units_skipped_live: u64,
    pub units_failed: u64,
    /// Deleted rows examined.
    pub candidates: u64,
    /// Blobs removed, or that would have been removed in dry run.
    pub blobs_deleted: u64,
    pub rows_purged: u64,
    pub dry_run: bool,
    /// False when the run stopped early on cancellation, `max_duration_secs`,
    /// or a failed page fetch.
    pub completed: bool,
    pub duration_ms: u64,
}

impl ScrubReport {
    fn record(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Scrubbed => self.units_scrubbed += 1,
            UnitOutcome::SkippedDuplicate => self.units_skipped_duplicate += 1,
            UnitOutcome::SkippedLive => self.units_skipped_live += 1,
            UnitOutcome::Failed => self.units_failed += 1,
        }
        metrics::record_scrub_unit(outcome.as_str());
    }

    pub fn has_work(&self) -> bool {
        self.units_scrubbed > 0 || self.units_failed > 0
    }
}

/// Scrub errors.
///
/// `Fetch` aborts the run when the first page cannot be read; a later page
/// failing ends the run early with a report instead. Every other variant is
/// scoped to one unit, which is counted as failed while the run carries on.
#[derive(Debug, Error)]
pub enum ScrubError {
    #[error("Failed to fetch deleted versions: {0}")]
    Fetch(#[source] DbError),

    #[error("Data source {data_source_id} referenced by {unit} does not exist")]
    MissingDataSource { data_source_id: i64, unit: ScrubUnit },

    #[error("Failed to look up data source {data_source_id}: {source}")]
    DataSourceLookup {
        data_source_id: i64,
        #[source]
        source: DbError,
    },

    #[error("Liveness check failed for {unit}: {source}")]
    Liveness {
        unit: ScrubUnit,
        #[source]
        source: DbError,
    },

    #[error("Failed to list blobs under {prefix}: {source}")]
    List {
        prefix: String,
        #[source]
        source: BlobStorageError,
    },

    #[error("Failed to delete {failed} blob(s) under {prefix} ({deleted} deleted)")]
    Delete {
        prefix: String,
        failed: u64,
        deleted: u64,
    },

    #[error("Failed to purge rows for {unit}: {source}")]
    Purge {
        unit: ScrubUnit,
        #[source]
        source: DbError,
    },
}

impl ScrubError {
    /// Label for the `scrub_errors_total` metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrubError::Fetch(_) => "fetch",
            ScrubError::MissingDataSource { .. } => "missing_data_source",
            ScrubError::DataSourceLookup { .. } => "data_source_lookup",
            ScrubError::Liveness { .. } => "liveness",
            ScrubError::List { .. } => "list",
            ScrubError::Delete { .. } => "delete",
            ScrubError::Purge { .. } => "purge",
        }
    }

    /// Whether the error points at corrupt metadata rather than a flaky dependency.
    pub fn is_integrity(&self) -> bool {
        matches!(self, ScrubError::MissingDataSource { .. })
    }
}

/// Receives run progress and the final summary.
#[async_trait]
pub trait RunReporter: Send + Sync {
    fn phase_changed(&self, _phase: ScrubPhase) {}

    async fn report(&self, report: &ScrubReport);
}

/// Reporter that writes the summary to the log.
#[derive(Debug, Default)]
pub struct LogReporter;

#[async_trait]
impl RunReporter for LogReporter {
    fn phase_changed(&self, phase: ScrubPhase) {
        tracing::trace!(?phase, "Scrub phase");
    }

    async fn report(&self, report: &ScrubReport) {
        let dry_run_msg = if report.dry_run { " (DRY RUN)" } else { "" };
        if report.has_work() {
            tracing::info!(
                units_scrubbed = report.units_scrubbed,
                units_skipped_duplicate = report.units_skipped_duplicate,
                units_skipped_live = report.units_skipped_live,
                units_failed = report.units_failed,
                blobs_deleted = report.blobs_deleted,
                rows_purged = report.rows_purged,
                completed = report.completed,
                duration_ms = report.duration_ms,
                "Scrub run complete{}",
                dry_run_msg
            );
        } else {
            tracing::debug!(
                candidates = report.candidates,
                "Scrub run complete, nothing to scrub{}",
                dry_run_msg
            );
        }
    }
}

/// Garbage collector for deleted document versions.
pub struct Scrubber {
    versions: Arc<dyn DocumentVersionRepo>,
    sources: Arc<dyn DataSourceRepo>,
    blobs: Arc<dyn BlobStore>,
    config: ScrubConfig,
    reporter: Arc<dyn RunReporter>,
}

impl Scrubber {
    pub fn new(
        versions: Arc<dyn DocumentVersionRepo>,
        sources: Arc<dyn DataSourceRepo>,
        blobs: Arc<dyn BlobStore>,
        config: ScrubConfig,
    ) -> Self {
        Self {
            versions,
            sources,
            blobs,
            config,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn from_pool(db: &DbPool, blobs: Arc<dyn BlobStore>, config: ScrubConfig) -> Self {
        Self::new(db.document_versions(), db.data_sources(), blobs, config)
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &ScrubConfig {
        &self.config
    }

    /// Run a single scrub pass.
    ///
    /// `cancel` and `max_duration_secs` are checked between batches; a batch
    /// that has started always runs to completion.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ScrubReport, ScrubError> {
        let start = Instant::now();
        let max_duration = self.config.max_duration();
        let guard = DedupGuard::new();
        let mut report = ScrubReport {
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        let batch_size = self.config.batch_size.max(1);
        let page_size = self.config.page_size.max(batch_size);
        let mut after_id = None;
        let mut stopped_early = false;

        'pages: loop {
            self.reporter.phase_changed(ScrubPhase::Fetching);
            let page = match self
                .versions
                .list_deleted_versions(after_id, page_size as i64)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    metrics::record_scrub_error("fetch");
                    // Nothing done yet, so there is nothing worth reporting
                    if after_id.is_none() {
                        return Err(ScrubError::Fetch(e));
                    }
                    tracing::error!(
                        error = %e,
                        after_id = ?after_id,
                        units_scrubbed = report.units_scrubbed,
                        "Failed to fetch deleted versions, stopping early"
                    );
                    stopped_early = true;
                    break;
                }
            };

            let Some(last) = page.last() else {
                break;
            };
            after_id = Some(last.id);
            report.candidates += page.len() as u64;
            tracing::debug!(count = page.len(), after_id = last.id, "Fetched deleted versions");

            self.reporter.phase_changed(ScrubPhase::Batching);
            for batch in page.chunks(batch_size) {
                if cancel.is_cancelled() {
                    tracing::info!(
                        units_scrubbed = report.units_scrubbed,
                        "Scrub cancelled, stopping before next batch"
                    );
                    stopped_early = true;
                    break 'pages;
                }
                if let Some(max) = max_duration
                    && start.elapsed() > max
                {
                    tracing::info!(
                        units_scrubbed = report.units_scrubbed,
                        "Max scrub duration exceeded, stopping early"
                    );
                    stopped_early = true;
                    break 'pages;
                }

                self.reporter.phase_changed(ScrubPhase::Processing);
                let results = join_all(batch.iter().map(|v| self.scrub_unit(v, &guard))).await;

                for (version, result) in batch.iter().zip(results) {
                    match result {
                        Ok(unit) => {
                            report.blobs_deleted += unit.blobs_deleted;
                            report.rows_purged += unit.rows_purged;
                            report.record(unit.outcome);
                        }
                        Err(e) => {
                            if let ScrubError::Delete { deleted, .. } = &e {
                                report.blobs_deleted += deleted;
                            }
                            log_unit_failure(version, &e);
                            metrics::record_scrub_error(e.kind());
                            report.record(UnitOutcome::Failed);
                        }
                    }
                }
            }

            if page.len() < page_size {
                break;
            }
        }

        self.reporter.phase_changed(ScrubPhase::Reporting);
        report.completed = !stopped_early;
        report.duration_ms = start.elapsed().as_millis() as u64;
        if !report.dry_run && report.blobs_deleted > 0 {
            metrics::record_blobs_deleted(report.blobs_deleted);
        }
        metrics::record_scrub_run(start.elapsed().as_secs_f64(), report.dry_run);
        self.reporter.report(&report).await;

        self.reporter.phase_changed(ScrubPhase::Done);
        Ok(report)
    }

    /// Creation-time bound for the liveness check of a unit.
    ///
    /// Purging removes every deleted row of the triple, so the bound comes
    /// from the oldest of them rather than from the row that claimed the unit.
    async fn liveness_bound(
        &self,
        unit: &ScrubUnit,
        created_at: i64,
    ) -> Result<Option<i64>, DbError> {
        let Some(own) = self.config.liveness.not_before(created_at) else {
            return Ok(None);
        };
        let earliest = self
            .versions
            .earliest_deleted_created_at(unit.data_source_id, &unit.document_id, &unit.hash)
            .await?;
        Ok(Some(earliest.map_or(own, |e| e.min(own))))
    }

    /// Scrub the unit a deleted version belongs to.
    ///
    /// The unit key is claimed before anything else, so when several rows of
    /// the same triple are in flight only the first does any work.
    pub async fn scrub_unit(
        &self,
        version: &DocumentVersion,
        guard: &DedupGuard,
    ) -> Result<UnitReport, ScrubError> {
        let unit = version.scrub_unit();

        if !guard.claim(DedupKey::Unit(unit.clone())) {
            tracing::debug!(unit = %unit, version_id = version.id, "Unit already handled this run");
            return Ok(UnitReport::skipped(UnitOutcome::SkippedDuplicate));
        }

        let not_before = self
            .liveness_bound(&unit, version.created_at)
            .await
            .map_err(|source| ScrubError::Liveness {
                unit: unit.clone(),
                source,
            })?;
        let live = self
            .versions
            .has_live_version_with_hash(
                unit.data_source_id,
                &unit.document_id,
                &unit.hash,
                not_before,
            )
            .await
            .map_err(|source| ScrubError::Liveness {
                unit: unit.clone(),
                source,
            })?;
        if live {
            tracing::debug!(unit = %unit, "Live version shares content, keeping blobs");
            return Ok(UnitReport::skipped(UnitOutcome::SkippedLive));
        }

        let source = match self.sources.get_data_source(unit.data_source_id).await {
            Ok(source) => source,
            Err(DbError::NotFound) => {
                return Err(ScrubError::MissingDataSource {
                    data_source_id: unit.data_source_id,
                    unit,
                });
            }
            Err(source) => {
                return Err(ScrubError::DataSourceLookup {
                    data_source_id: unit.data_source_id,
                    source,
                });
            }
        };

        let path = resolve_blob_path(
            source.project_id,
            &source.internal_id,
            &unit.document_id,
            &unit.hash,
        );
        let prefix = listing_prefix(&path);
        let objects = self
            .blobs
            .list_objects(&prefix)
            .await
            .map_err(|source| ScrubError::List {
                prefix: prefix.clone(),
                source,
            })?;

        let claimed: Vec<&BlobObject> = objects
            .iter()
            .filter(|o| guard.claim(DedupKey::BlobPath(o.name.clone())))
            .collect();

        if self.config.dry_run {
            for object in &claimed {
                tracing::info!(
                    unit = %unit,
                    blob = %object.name,
                    "DRY RUN: Would delete blob"
                );
            }
            tracing::info!(unit = %unit, "DRY RUN: Would purge deleted rows");
            return Ok(UnitReport {
                outcome: UnitOutcome::Scrubbed,
                blobs_deleted: claimed.len() as u64,
                rows_purged: 0,
            });
        }

        let results = join_all(claimed.iter().map(|o| self.blobs.delete_object(o))).await;
        let mut deleted = 0u64;
        let mut failed = 0u64;
        for (object, result) in claimed.iter().zip(results) {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(
                        unit = %unit,
                        blob = %object.name,
                        error = %e,
                        "Failed to delete blob"
                    );
                    guard.release(&DedupKey::BlobPath(object.name.clone()));
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(ScrubError::Delete {
                prefix,
                failed,
                deleted,
            });
        }

        let rows_purged = self
            .versions
            .purge_deleted_versions(unit.data_source_id, &unit.document_id, &unit.hash)
            .await
            .map_err(|source| ScrubError::Purge {
                unit: unit.clone(),
                source,
            })?;

        tracing::debug!(
            unit = %unit,
            blobs_deleted = deleted,
            rows_purged,
            "Unit scrubbed"
        );

        Ok(UnitReport {
            outcome: UnitOutcome::Scrubbed,
            blobs_deleted: deleted,
            rows_purged,
        })
    }
}

fn log_unit_failure(version: &DocumentVersion, error: &ScrubError) {
    if error.is_integrity() {
        tracing::error!(
            version_id = version.id,
            data_source_id = version.data_source_id,
            error = %error,
            "Integrity error while scrubbing unit"
        );
    } else {
        tracing::warn!(
            version_id = version.id,
            error = %error,
            "Failed to scrub unit, leaving it for the next run"
        );
    }
}

/// Runs scrub passes every `interval_secs` until `cancel` fires.
///
/// Cancellation interrupts the sleep immediately and the running pass at its
/// next batch boundary.
pub async fn start_scrub_worker(scrubber: Arc<Scrubber>, cancel: CancellationToken) {
    let config = scrubber.config();
    let dry_run_msg = if config.dry_run { " (DRY RUN)" } else { "" };

    tracing::info!(
        interval_secs = config.interval_secs,
        batch_size = config.batch_size,
        page_size = config.page_size,
        max_duration_secs = config.max_duration_secs,
        liveness = ?config.liveness,
        dry_run = config.dry_run,
        "Starting scrub worker{}",
        dry_run_msg
    );

    let interval = config.interval();

    loop {
        if let Err(e) = scrubber.run(&cancel).await {
            tracing::error!(error = %e, "Error running scrub");
        }

        if !sleep_or_cancel(interval, &cancel).await {
            tracing::info!("Scrub worker stopped");
            return;
        }
    }
}

/// Returns `false` if cancelled before the interval elapsed.
async fn sleep_or_cancel(interval: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}
