//! Best-effort bulk deletion at the destination.
//!
//! Pages through the destination's matching ids and deletes them one by
//! one. Individual delete failures are counted and left behind rather than
//! aborting the sweep, so a partially-broken destination still gets cleaned
//! as far as it can be.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::record::RecordFilter;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::DestinationWriter;

/// Accounting for one purge sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Matching records reported by the destination before deleting.
    pub targeted: u64,
    pub removed: u64,
    pub failed: u64,
}

pub struct BulkPurge {
    writer: Arc<dyn DestinationWriter>,
    retry: RetryPolicy,
    page_size: usize,
}

impl BulkPurge {
    pub fn new(writer: Arc<dyn DestinationWriter>, retry: RetryPolicy, page_size: usize) -> Self {
        Self {
            writer,
            retry,
            page_size: page_size.max(1),
        }
    }

    /// Delete every record matching the filter.
    ///
    /// Deletions shrink the matching set underneath the pagination, so the
    /// sweep keeps re-reading the first page; it only advances past a page
    /// once everything on it has already failed to delete.
    pub async fn purge(
        &self,
        filter: &RecordFilter,
        cancel: &CancellationToken,
    ) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();
        let mut undeletable: HashSet<String> = HashSet::new();
        let mut page: u64 = 1;
        let mut first_page = true;

        loop {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            let ids = self
                .writer
                .list_matching(filter, self.page_size, page)
                .await?;
            if first_page {
                report.targeted = ids.total_count;
                info!(targeted = ids.total_count, "purge started");
                first_page = false;
            }
            if ids.ids.is_empty() {
                break;
            }

            let mut progressed = false;
            for id in &ids.ids {
                if undeletable.contains(id) {
                    continue;
                }
                let writer = Arc::clone(&self.writer);
                let attempt = with_retry(&self.retry, "delete record", || {
                    let writer = Arc::clone(&writer);
                    let id = id.clone();
                    async move { writer.delete_record(&id).await }
                })
                .await;

                match attempt {
                    Ok(()) => {
                        report.removed += 1;
                        progressed = true;
                    }
                    Err(e) => {
                        warn!(id = %id, error = %e, "delete failed, leaving record in place");
                        report.failed += 1;
                        undeletable.insert(id.clone());
                    }
                }
            }

            if !progressed {
                // Everything on this page is stuck; move past it.
                page += 1;
            }
        }

        info!(
            targeted = report.targeted,
            removed = report.removed,
            failed = report.failed,
            "purge finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CanonicalRecord, RecordStatus};
    use crate::store::{IdPage, InsertOutcome, MemoryStore, RecordId};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            jitter: 0.0,
        }
    }

    fn record(sku: &str, category: &str) -> CanonicalRecord {
        CanonicalRecord {
            name: format!("item {sku}"),
            company_name: String::new(),
            price: Decimal::ONE,
            stock: 1,
            sku: sku.into(),
            category: category.into(),
            description: String::new(),
            status: RecordStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_purge_removes_only_matching_category() {
        let store = Arc::new(MemoryStore::new());
        store.seed([
            record("C-1", "connector"),
            record("K-1", "keeper"),
            record("C-2", "connector"),
            record("C-3", "connector"),
            record("K-2", "keeper"),
        ]);

        let purge = BulkPurge::new(store.clone(), fast_retry(), 2);
        let report = purge
            .purge(
                &RecordFilter::default().with_category("connector"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report.targeted, 3);
        assert_eq!(report.removed, 3);
        assert_eq!(report.failed, 0);

        let remaining: Vec<String> = store.snapshot().into_iter().map(|r| r.sku).collect();
        assert_eq!(remaining, vec!["K-1".to_string(), "K-2".to_string()]);
    }

    #[tokio::test]
    async fn test_purge_with_no_matches_is_empty_report() {
        let store = Arc::new(MemoryStore::new());
        store.seed([record("K-1", "keeper")]);

        let purge = BulkPurge::new(store, fast_retry(), 10);
        let report = purge
            .purge(
                &RecordFilter::default().with_category("ghost"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(report, PurgeReport::default());
    }

    /// Writer that refuses to delete a specific id.
    struct StubbornWriter {
        inner: Arc<MemoryStore>,
        stuck: RecordId,
    }

    #[async_trait]
    impl DestinationWriter for StubbornWriter {
        async fn insert_batch(
            &self,
            records: &[CanonicalRecord],
        ) -> Result<Vec<InsertOutcome>> {
            self.inner.insert_batch(records).await
        }

        async fn list_matching(
            &self,
            filter: &RecordFilter,
            limit: usize,
            page: u64,
        ) -> Result<IdPage> {
            self.inner.list_matching(filter, limit, page).await
        }

        async fn delete_record(&self, id: &RecordId) -> Result<()> {
            if *id == self.stuck {
                return Err(MigrateError::Source("record is locked".into()));
            }
            self.inner.delete_record(id).await
        }

        async fn aggregate_stats(&self) -> Result<crate::store::AggregateStats> {
            self.inner.aggregate_stats().await
        }
    }

    #[tokio::test]
    async fn test_stuck_record_counted_failed_and_sweep_continues() {
        let store = Arc::new(MemoryStore::new());
        store.seed([
            record("C-1", "connector"),
            record("C-2", "connector"),
            record("C-3", "connector"),
        ]);
        let stuck_id = store
            .list_matching(&RecordFilter::default(), 10, 1)
            .await
            .unwrap()
            .ids[1]
            .clone();

        let writer = Arc::new(StubbornWriter {
            inner: store.clone(),
            stuck: stuck_id,
        });
        let purge = BulkPurge::new(writer, fast_retry(), 2);
        let report = purge
            .purge(&RecordFilter::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.targeted, 3);
        assert_eq!(report.removed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_sweep() {
        let store = Arc::new(MemoryStore::new());
        store.seed([record("C-1", "connector")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let purge = BulkPurge::new(store, fast_retry(), 10);
        let err = purge
            .purge(&RecordFilter::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
    }
}
