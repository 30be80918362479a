//! Migration orchestrator - main workflow coordinator.
//!
//! Drives extract, transform, load and reconcile over one or more category
//! partitions. Partitions run concurrently under a semaphore; each one
//! walks its slice of the source page by page, checkpointing state at
//! batch boundaries so a killed run can resume by offset.

use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::extract::PaginatedExtractor;
use crate::load::{BatchLoader, BatchOutcome};
use crate::purge::{BulkPurge, PurgeReport};
use crate::reconcile::{LedgerTotals, ReconcileReport, Reconciler};
use crate::record::{KeySynthesizer, RecordFilter, Rejection, Transformer};
use crate::state::RunState;
use crate::store::{AggregateStats, DestinationWriter, SourceReader};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cap on failure reasons and rejection samples carried in the report.
const MAX_REPORTED_SAMPLES: usize = 20;

/// Partition key used when no category partitioning is configured.
const UNPARTITIONED: &str = "*";

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    reader: Arc<dyn SourceReader>,
    writer: Arc<dyn DestinationWriter>,
    state_file: Option<PathBuf>,
    state: Option<RunState>,
    dry_run: bool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state_file", &self.state_file)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed", "failed" or "cancelled".
    pub status: String,

    /// Whether this was a dry run (nothing written).
    pub dry_run: bool,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// Partitions processed.
    pub partitions_total: usize,
    pub partitions_failed: usize,
    pub failed_partitions: Vec<String>,

    /// Merged record counters across all partitions.
    pub totals: LedgerTotals,

    /// Batches whose load failed wholesale after retries.
    pub failed_batches: u64,

    /// First few destination failure reasons, for triage.
    pub failure_reasons: Vec<String>,

    /// First few transform rejections, for triage.
    pub rejections: Vec<Rejection>,

    /// Average throughput (records/second).
    pub records_per_second: i64,

    /// Aggregate cross-check, absent for dry runs and failed runs.
    pub reconcile: Option<ReconcileReport>,
}

impl MigrationReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// What one partition task hands back to the collector.
struct PartitionOutcome {
    totals: LedgerTotals,
    failed_batches: u64,
    failure_reasons: Vec<String>,
    rejections: Vec<Rejection>,
    inserted_stats: AggregateStats,
}

/// Shared run state, saved under a lock at batch boundaries.
#[derive(Clone)]
struct StateHandle {
    inner: Arc<Mutex<RunState>>,
    path: Option<PathBuf>,
    enabled: bool,
}

impl StateHandle {
    fn new(state: RunState, path: Option<PathBuf>, enabled: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            path,
            enabled,
        }
    }

    fn save_locked(&self, state: &mut RunState) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(ref path) = self.path {
            state.save(path)?;
        }
        Ok(())
    }

    fn with<R>(&self, f: impl FnOnce(&mut RunState) -> R) -> Result<R> {
        let mut state = self.inner.lock().expect("state mutex poisoned");
        let out = f(&mut state);
        self.save_locked(&mut state)?;
        Ok(out)
    }

}

impl Orchestrator {
    /// Create a new orchestrator over the given source and destination.
    pub fn new(
        config: Config,
        reader: Arc<dyn SourceReader>,
        writer: Arc<dyn DestinationWriter>,
    ) -> Self {
        Self {
            config,
            reader,
            writer,
            state_file: None,
            state: None,
            dry_run: false,
        }
    }

    /// Set the state file path for resume capability.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    /// Transform and classify without writing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Load existing state for resume. Fails if the configuration has
    /// changed since the state was written.
    pub fn resume(mut self) -> Result<Self> {
        if let Some(ref path) = self.state_file {
            if path.exists() {
                let state = RunState::load(path)?;
                state.validate_config(&self.config.hash())?;
                info!(path = %path.display(), run_id = %state.run_id, "resuming from state file");
                self.state = Some(state);
            }
        }
        Ok(self)
    }

    /// The partition plan: one filter per configured category, or a single
    /// unpartitioned pass over the whole filtered source.
    fn partitions(&self) -> Vec<(String, RecordFilter)> {
        let base = self.config.migration.base_filter();
        if self.config.migration.categories.is_empty() {
            vec![(UNPARTITIONED.to_string(), base)]
        } else {
            self.config
                .migration
                .categories
                .iter()
                .map(|c| (c.clone(), base.clone().with_category(c.clone())))
                .collect()
        }
    }

    /// Run the migration.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let run_id = self
            .state
            .as_ref()
            .map(|s| s.run_id.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        info!(run_id = %run_id, dry_run = self.dry_run, "starting migration run");

        let state = self
            .state
            .take()
            .unwrap_or_else(|| RunState::new(run_id.clone(), self.config.hash()));
        // Dry runs never touch the state file.
        let state = StateHandle::new(state, self.state_file.clone(), !self.dry_run);

        // Destination contents before this run, for the aggregate check.
        let baseline = if self.dry_run {
            AggregateStats::default()
        } else {
            self.writer.aggregate_stats().await?
        };

        let partitions = self.partitions();
        let pending: Vec<_> = state.with(|s| {
            partitions
                .iter()
                .filter(|(key, _)| !s.is_partition_completed(key))
                .cloned()
                .collect::<Vec<_>>()
        })?;

        info!(
            partitions = pending.len(),
            workers = self.config.migration.workers,
            "transferring partitions"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.migration.workers.max(1)));
        let mut handles = Vec::new();

        for (key, filter) in pending {
            if cancel.is_cancelled() {
                info!("cancellation requested, not starting further partitions");
                break;
            }

            let resume = state.with(|s| {
                let p = s.get_or_create_partition(&key);
                p.mark_in_progress();
                (p.offset, p.totals)
            })?;

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| MigrateError::Cancelled)?;

            let job = PartitionJob {
                key: key.clone(),
                filter,
                resume_offset: resume.0,
                resume_totals: resume.1,
                reader: Arc::clone(&self.reader),
                writer: Arc::clone(&self.writer),
                config: self.config.clone(),
                state: state.clone(),
                cancel: cancel.clone(),
                dry_run: self.dry_run,
            };

            let handle = tokio::spawn(async move {
                let result = job.execute().await;
                drop(permit);
                result
            });
            handles.push((key, handle));
        }

        // Collect partition outcomes.
        let mut totals = LedgerTotals::default();
        let mut failed_batches = 0u64;
        let mut failure_reasons = Vec::new();
        let mut rejections = Vec::new();
        let mut inserted_stats = AggregateStats::default();
        let mut failed_partitions = Vec::new();
        let mut first_error: Option<MigrateError> = None;

        for (key, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => {
                    state.with(|s| s.get_or_create_partition(&key).mark_completed())?;
                    totals.extracted += outcome.totals.extracted;
                    totals.inserted += outcome.totals.inserted;
                    totals.duplicates += outcome.totals.duplicates;
                    totals.failed += outcome.totals.failed;
                    totals.rejected += outcome.totals.rejected;
                    failed_batches += outcome.failed_batches;
                    failure_reasons.extend(outcome.failure_reasons);
                    rejections.extend(outcome.rejections);
                    inserted_stats.merge(outcome.inserted_stats);
                }
                Ok(Err(e)) => {
                    error!(partition = %key, error = %e, "partition failed");
                    state.with(|s| {
                        s.get_or_create_partition(&key).mark_failed(&e.to_string())
                    })?;
                    failed_partitions.push(key);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(partition = %key, error = %e, "partition task panicked");
                    state.with(|s| {
                        s.get_or_create_partition(&key)
                            .mark_failed(&format!("task panicked: {e}"))
                    })?;
                    failed_partitions.push(key);
                    first_error.get_or_insert(MigrateError::Source(format!(
                        "partition task panicked: {e}"
                    )));
                }
            }
        }

        failure_reasons.truncate(MAX_REPORTED_SAMPLES);
        rejections.truncate(MAX_REPORTED_SAMPLES);

        let clean = failed_partitions.is_empty() && first_error.is_none();

        // The ledger identity is only meaningful when every partition ran
        // to completion.
        if clean {
            Reconciler::check_ledger(&totals)?;
        }

        // Aggregate cross-check against the destination.
        let reconcile = if clean && !self.dry_run {
            let mut expected = baseline;
            expected.merge(inserted_stats);
            let reconciler =
                Reconciler::new(Arc::clone(&self.writer), self.config.migration.value_tolerance);
            Some(reconciler.verify_aggregates(expected).await?)
        } else {
            None
        };

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let records_per_second = if duration > 0.0 {
            (totals.extracted as f64 / duration) as i64
        } else {
            0
        };

        let status = if !clean {
            "failed"
        } else if cancel.is_cancelled() {
            "cancelled"
        } else {
            "completed"
        };

        state.with(|s| match status {
            "completed" => s.mark_completed(),
            "cancelled" => s.mark_cancelled(),
            _ => s.mark_failed(),
        })?;

        let report = MigrationReport {
            run_id,
            status: status.to_string(),
            dry_run: self.dry_run,
            duration_seconds: duration,
            started_at,
            completed_at,
            partitions_total: partitions.len(),
            partitions_failed: failed_partitions.len(),
            failed_partitions,
            totals,
            failed_batches,
            failure_reasons,
            rejections,
            records_per_second,
            reconcile,
        };

        info!(
            status = %report.status,
            extracted = report.totals.extracted,
            inserted = report.totals.inserted,
            duplicates = report.totals.duplicates,
            failed = report.totals.failed,
            rejected = report.totals.rejected,
            duration_s = report.duration_seconds,
            "migration finished"
        );

        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(report)
    }

    /// Delete every destination record in the given category (or all
    /// records when no category is given).
    pub async fn purge(
        &self,
        category: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PurgeReport> {
        let mut filter = RecordFilter::default();
        if let Some(category) = category {
            filter = filter.with_category(category);
        }
        let purge = BulkPurge::new(
            Arc::clone(&self.writer),
            self.config.migration.retry_policy(),
            self.config.migration.page_size,
        );
        purge.purge(&filter, cancel).await
    }

    /// Current destination aggregates.
    pub async fn stats(&self) -> Result<AggregateStats> {
        self.writer.aggregate_stats().await
    }
}

/// Everything one partition task needs, owned so it can be spawned.
struct PartitionJob {
    key: String,
    filter: RecordFilter,
    resume_offset: u64,
    resume_totals: LedgerTotals,
    reader: Arc<dyn SourceReader>,
    writer: Arc<dyn DestinationWriter>,
    config: Config,
    state: StateHandle,
    cancel: CancellationToken,
    dry_run: bool,
}

impl PartitionJob {
    async fn execute(self) -> Result<PartitionOutcome> {
        let m = &self.config.migration;
        let retry = m.retry_policy();
        let transformer = Transformer::new(
            KeySynthesizer::new(m.key_policy, m.sku_prefix_len),
            m.fallback_category.clone(),
        );
        let loader = BatchLoader::new(Arc::clone(&self.writer), retry.clone());
        let mut extractor = PaginatedExtractor::new(
            Arc::clone(&self.reader),
            self.filter.clone(),
            m.page_size,
            retry,
        )
        .starting_at(self.resume_offset);

        let mut totals = self.resume_totals;
        let mut failed_batches = 0u64;
        let mut failure_reasons = Vec::new();
        let mut rejections = Vec::new();
        let mut inserted_stats = AggregateStats::default();
        let pause = Duration::from_millis(m.pause_between_batches_ms);

        while let Some(page) = extractor.next_page().await? {
            if self.cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            totals.extracted += page.rows.len() as u64;

            let mut records = Vec::with_capacity(page.rows.len());
            for row in &page.rows {
                match transformer.transform(row) {
                    Ok(record) => records.push(record),
                    Err(rejection) => {
                        totals.rejected += 1;
                        if rejections.len() < MAX_REPORTED_SAMPLES {
                            rejections.push(rejection);
                        }
                    }
                }
            }

            for batch in records.chunks(m.batch_size.max(1)) {
                let outcome = if self.dry_run {
                    // Classification without a destination: everything that
                    // transformed would be sent.
                    let mut stats = AggregateStats::default();
                    for record in batch {
                        stats.accumulate(record);
                    }
                    BatchOutcome {
                        inserted: batch.len() as u64,
                        inserted_stats: stats,
                        ..BatchOutcome::default()
                    }
                } else {
                    loader.load_batch(batch).await?
                };

                if outcome.failed == batch.len() as u64 && !batch.is_empty() {
                    failed_batches += 1;
                }
                totals.inserted += outcome.inserted;
                totals.duplicates += outcome.duplicates;
                totals.failed += outcome.failed;
                inserted_stats.merge(outcome.inserted_stats);
                for reason in outcome.failure_reasons {
                    if failure_reasons.len() < MAX_REPORTED_SAMPLES {
                        failure_reasons.push(reason);
                    }
                }

                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }

            // Batch boundary: checkpoint the fully-consumed offset.
            let offset = extractor.offset();
            self.state.with(|s| {
                s.get_or_create_partition(&self.key).checkpoint(offset, totals)
            })?;
        }

        if self.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }

        info!(
            partition = %self.key,
            extracted = totals.extracted,
            inserted = totals.inserted,
            duplicates = totals.duplicates,
            failed = totals.failed,
            rejected = totals.rejected,
            "partition finished"
        );

        Ok(PartitionOutcome {
            totals,
            failed_batches,
            failure_reasons,
            rejections,
            inserted_stats,
        })
    }
}
