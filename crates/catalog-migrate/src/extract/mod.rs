//! Paginated source extraction.
//!
//! Walks the source in fixed-size windows under one filter, yielding pages
//! until exhaustion. Restartable by offset: the same offset and filter over
//! an unchanged source yield the same page, so a transient read failure can
//! be retried without loss or duplication.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{MigrateError, Result};
use crate::record::{RawRow, RecordFilter};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::SourceReader;

/// One extraction window, tagged with the offset it was read at.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    /// Starting offset of this page within the filtered source set.
    pub offset: u64,
    pub rows: Vec<RawRow>,
}

/// Lazy, finite, offset-restartable sequence of source pages.
pub struct PaginatedExtractor {
    reader: Arc<dyn SourceReader>,
    filter: RecordFilter,
    page_size: usize,
    retry: RetryPolicy,
    offset: u64,
    total_count: Option<u64>,
    done: bool,
}

impl PaginatedExtractor {
    pub fn new(
        reader: Arc<dyn SourceReader>,
        filter: RecordFilter,
        page_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            reader,
            filter,
            page_size: page_size.max(1),
            retry,
            offset: 0,
            total_count: None,
            done: false,
        }
    }

    /// Resume extraction from a checkpointed offset.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Offset of the next unread page, for checkpointing.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total matching records, once the source has reported it.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    /// Fetch the next window, or `None` once the source is exhausted.
    ///
    /// A page read is retried under the policy; exhausting retries aborts
    /// the run with [`MigrateError::ExtractionFailed`], since skipping an
    /// unread page would silently drop records.
    pub async fn next_page(&mut self) -> Result<Option<ExtractedPage>> {
        if self.done {
            return Ok(None);
        }

        let offset = self.offset;
        let reader = Arc::clone(&self.reader);
        let filter = self.filter.clone();
        let limit = self.page_size;

        let page = with_retry(&self.retry, "extract page", || {
            let reader = Arc::clone(&reader);
            let filter = filter.clone();
            async move { reader.list_records(&filter, limit, offset).await }
        })
        .await
        .map_err(|e| MigrateError::extraction(offset, e.to_string()))?;

        if self.total_count.is_none() {
            self.total_count = Some(page.total_count);
            info!(
                total = page.total_count,
                pages = page.total_pages,
                page_size = self.page_size,
                "extraction started"
            );
        }

        // Zero matching records: an empty sequence, not an error.
        if page.rows.is_empty() {
            self.done = true;
            return Ok(None);
        }

        let short_page = page.rows.len() < self.page_size;
        self.offset += page.rows.len() as u64;

        // Exhaustion is signaled by a short page or by the reported total,
        // whichever fires first; a stale total must not trail empty pages.
        if short_page || self.offset >= page.total_count {
            self.done = true;
        }

        debug!(
            offset,
            rows = page.rows.len(),
            done = self.done,
            "extracted page"
        );

        Ok(Some(ExtractedPage {
            offset,
            rows: page.rows,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CanonicalRecord, RecordStatus};
    use crate::store::{MemoryStore, RecordPage};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
            jitter: 0.0,
        }
    }

    fn seeded_store(n: usize) -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.seed((0..n).map(|i| CanonicalRecord {
            name: format!("item {i:04}"),
            company_name: String::new(),
            price: Decimal::ONE,
            stock: 1,
            sku: format!("SKU-{i:04}"),
            category: "misc".into(),
            description: String::new(),
            status: RecordStatus::Active,
        }));
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_pagination_completeness_237_records() {
        let store = seeded_store(237);
        let mut extractor = PaginatedExtractor::new(
            store,
            RecordFilter::default(),
            50,
            fast_retry(1),
        );

        let mut pages = Vec::new();
        while let Some(page) = extractor.next_page().await.unwrap() {
            pages.push(page);
        }

        assert_eq!(pages.len(), 5);
        assert_eq!(pages.last().unwrap().rows.len(), 37);
        assert_eq!(extractor.total_count(), Some(237));

        // No duplicates, no gaps.
        let skus: Vec<String> = pages
            .iter()
            .flat_map(|p| p.rows.iter())
            .map(|r| r.get("sku").unwrap().to_string())
            .collect();
        assert_eq!(skus.len(), 237);
        let expected: Vec<String> = (0..237).map(|i| format!("SKU-{i:04}")).collect();
        assert_eq!(skus, expected);
    }

    #[tokio::test]
    async fn test_exact_multiple_stops_without_extra_page() {
        let store = seeded_store(100);
        let mut extractor =
            PaginatedExtractor::new(store, RecordFilter::default(), 50, fast_retry(1));

        assert!(extractor.next_page().await.unwrap().is_some());
        assert!(extractor.next_page().await.unwrap().is_some());
        // Total count says we are done; no third (empty) read is surfaced.
        assert!(extractor.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_source_yields_empty_sequence() {
        let store = seeded_store(0);
        let mut extractor =
            PaginatedExtractor::new(store, RecordFilter::default(), 50, fast_retry(1));
        assert!(extractor.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_starting_at_resumes_mid_stream() {
        let store = seeded_store(10);
        let mut extractor =
            PaginatedExtractor::new(store, RecordFilter::default(), 4, fast_retry(1))
                .starting_at(8);

        let page = extractor.next_page().await.unwrap().unwrap();
        assert_eq!(page.offset, 8);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0].get("sku"), Some("SKU-0008"));
        assert!(extractor.next_page().await.unwrap().is_none());
    }

    /// Reader that fails a fixed number of times before delegating.
    struct FlakyReader {
        inner: Arc<MemoryStore>,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl SourceReader for FlakyReader {
        async fn list_records(
            &self,
            filter: &RecordFilter,
            limit: usize,
            offset: u64,
        ) -> Result<RecordPage> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(MigrateError::Source("flaky read".into()));
            }
            self.inner.list_records(filter, limit, offset).await
        }
    }

    #[tokio::test]
    async fn test_transient_read_failure_retried() {
        let reader = Arc::new(FlakyReader {
            inner: seeded_store(3),
            failures_left: AtomicU32::new(2),
        });
        let mut extractor =
            PaginatedExtractor::new(reader, RecordFilter::default(), 10, fast_retry(3));

        let page = extractor.next_page().await.unwrap().unwrap();
        assert_eq!(page.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_with_extraction_failed() {
        let reader = Arc::new(FlakyReader {
            inner: seeded_store(3),
            failures_left: AtomicU32::new(10),
        });
        let mut extractor =
            PaginatedExtractor::new(reader, RecordFilter::default(), 10, fast_retry(2));

        let err = extractor.next_page().await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::ExtractionFailed { offset: 0, .. }
        ));
    }
}
