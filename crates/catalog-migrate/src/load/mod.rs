//! Idempotent batch loading into the destination.
//!
//! Batches are sent through [`DestinationWriter::insert_batch`] and every
//! record is classified individually: inserted, skipped as a duplicate key,
//! or failed. Duplicates are never overwritten, which makes re-running a
//! batch (after a crash or a retried partial write) safe.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::record::CanonicalRecord;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{AggregateStats, DestinationWriter, InsertOutcome};

/// Per-record accounting for one loaded batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub duplicates: u64,
    pub failed: u64,
    /// One reason per failed record, in batch order.
    pub failure_reasons: Vec<String>,
    /// Aggregate over the records that were actually inserted, feeding the
    /// post-run reconciliation expectation.
    pub inserted_stats: AggregateStats,
}

impl BatchOutcome {
    /// Records this outcome accounts for, across all three buckets.
    pub fn accounted(&self) -> u64 {
        self.inserted + self.duplicates + self.failed
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
        self.failure_reasons.extend(other.failure_reasons);
        self.inserted_stats.merge(other.inserted_stats);
    }
}

/// Sends record batches to the destination with retry and per-record
/// classification.
pub struct BatchLoader {
    writer: Arc<dyn DestinationWriter>,
    retry: RetryPolicy,
}

impl BatchLoader {
    pub fn new(writer: Arc<dyn DestinationWriter>, retry: RetryPolicy) -> Self {
        Self { writer, retry }
    }

    /// Load one batch. A batch-level failure that survives the retry policy
    /// marks every record in the batch as failed with that reason; the run
    /// carries on with the next batch.
    pub async fn load_batch(&self, records: &[CanonicalRecord]) -> Result<BatchOutcome> {
        if records.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let writer = Arc::clone(&self.writer);
        let attempt = with_retry(&self.retry, "load batch", || {
            let writer = Arc::clone(&writer);
            async move { writer.insert_batch(records).await }
        })
        .await;

        let outcomes = match attempt {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(
                    batch_size = records.len(),
                    error = %e,
                    "batch load failed after retries, counting batch as failed"
                );
                let reason = e.to_string();
                return Ok(BatchOutcome {
                    failed: records.len() as u64,
                    failure_reasons: vec![reason; records.len()],
                    ..BatchOutcome::default()
                });
            }
        };

        let mut outcome = BatchOutcome::default();
        for (record, result) in records.iter().zip(&outcomes) {
            match result {
                InsertOutcome::Inserted => {
                    outcome.inserted += 1;
                    outcome.inserted_stats.accumulate(record);
                }
                InsertOutcome::Duplicate => {
                    debug!(sku = %record.sku, "duplicate key, skipping");
                    outcome.duplicates += 1;
                }
                InsertOutcome::Failed(reason) => {
                    warn!(sku = %record.sku, reason = %reason, "record rejected by destination");
                    outcome.failed += 1;
                    outcome.failure_reasons.push(reason.clone());
                }
            }
        }

        // A writer that answers for fewer records than it was sent leaves
        // the remainder unaccounted; treat them as failed.
        if outcomes.len() < records.len() {
            let missing = (records.len() - outcomes.len()) as u64;
            outcome.failed += missing;
            outcome
                .failure_reasons
                .extend(std::iter::repeat("no outcome reported".to_string()).take(missing as usize));
        }

        Ok(outcome)
    }
}
