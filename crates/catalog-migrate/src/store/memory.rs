//! In-memory store honoring the destination contract.
//!
//! Enforces `sku` uniqueness and classifies violations as duplicates, making
//! it a faithful stand-in destination for tests, dry runs and the end-to-end
//! scenario. It also serves as a [`SourceReader`] by rendering its records
//! back into raw rows.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{MigrateError, Result};
use crate::record::{CanonicalRecord, RawRow, RecordFilter};
use crate::store::{
    AggregateStats, DestinationWriter, IdPage, InsertOutcome, RecordId, RecordPage, SourceReader,
};

#[derive(Debug)]
struct Stored {
    id: u64,
    record: CanonicalRecord,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<Stored>,
    skus: HashSet<String>,
    next_id: u64,
}

/// Thread-safe in-memory record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload records, bypassing outcome classification. Panics on a seed
    /// with a duplicate sku; seeds are test fixtures and must be coherent.
    pub fn seed(&self, records: impl IntoIterator<Item = CanonicalRecord>) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        for record in records {
            assert!(
                inner.skus.insert(record.sku.clone()),
                "seed contains duplicate sku {}",
                record.sku
            );
            let id = inner.next_id;
            inner.next_id += 1;
            inner.records.push(Stored { id, record });
        }
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("store mutex poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of stored records in insertion order.
    pub fn snapshot(&self) -> Vec<CanonicalRecord> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.records.iter().map(|s| s.record.clone()).collect()
    }

    /// Overwrite the stock of one record, used to inject aggregate drift when
    /// exercising the reconciler.
    pub fn set_stock(&self, sku: &str, stock: i64) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        if let Some(stored) = inner.records.iter_mut().find(|s| s.record.sku == sku) {
            stored.record.stock = stock;
        }
    }

    fn render_row(record: &CanonicalRecord, index: u64) -> RawRow {
        RawRow::new(index)
            .with("name", record.name.clone())
            .with("company_name", record.company_name.clone())
            .with("price", record.price.to_string())
            .with("stock", record.stock.to_string())
            .with("sku", record.sku.clone())
            .with("category", record.category.clone())
            .with("description", record.description.clone())
            .with("status", record.status.to_string())
    }
}

#[async_trait]
impl SourceReader for MemoryStore {
    async fn list_records(
        &self,
        filter: &RecordFilter,
        limit: usize,
        offset: u64,
    ) -> Result<RecordPage> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let matching: Vec<&Stored> = inner
            .records
            .iter()
            .filter(|s| filter.matches(&s.record))
            .collect();

        let total_count = matching.len() as u64;
        let total_pages = if limit == 0 {
            0
        } else {
            total_count.div_ceil(limit as u64)
        };

        let rows = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit)
            .enumerate()
            .map(|(i, s)| Self::render_row(&s.record, offset + i as u64))
            .collect();

        Ok(RecordPage {
            rows,
            total_count,
            total_pages,
        })
    }
}

#[async_trait]
impl DestinationWriter for MemoryStore {
    async fn insert_batch(&self, records: &[CanonicalRecord]) -> Result<Vec<InsertOutcome>> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let mut outcomes = Vec::with_capacity(records.len());

        for record in records {
            if inner.skus.contains(&record.sku) {
                outcomes.push(InsertOutcome::Duplicate);
                continue;
            }
            inner.skus.insert(record.sku.clone());
            let id = inner.next_id;
            inner.next_id += 1;
            inner.records.push(Stored {
                id,
                record: record.clone(),
            });
            outcomes.push(InsertOutcome::Inserted);
        }

        Ok(outcomes)
    }

    async fn list_matching(
        &self,
        filter: &RecordFilter,
        limit: usize,
        page: u64,
    ) -> Result<IdPage> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let matching: Vec<&Stored> = inner
            .records
            .iter()
            .filter(|s| filter.matches(&s.record))
            .collect();

        let total_count = matching.len() as u64;
        let total_pages = if limit == 0 {
            0
        } else {
            total_count.div_ceil(limit as u64)
        };

        // Pages are 1-based, matching paged store conventions.
        let skip = page.saturating_sub(1) as usize * limit;
        let ids = matching
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|s| s.id.to_string())
            .collect();

        Ok(IdPage {
            ids,
            total_count,
            total_pages,
        })
    }

    async fn delete_record(&self, id: &RecordId) -> Result<()> {
        let numeric: u64 = id
            .parse()
            .map_err(|_| MigrateError::Source(format!("malformed record id: {id}")))?;

        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let position = inner.records.iter().position(|s| s.id == numeric);
        match position {
            Some(pos) => {
                let removed = inner.records.remove(pos);
                inner.skus.remove(&removed.record.sku);
                Ok(())
            }
            None => Err(MigrateError::Source(format!("no record with id {id}"))),
        }
    }

    async fn aggregate_stats(&self) -> Result<AggregateStats> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let mut stats = AggregateStats::default();
        for stored in &inner.records {
            stats.accumulate(&stored.record);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordStatus;
    use rust_decimal::Decimal;

    fn record(sku: &str, category: &str, price_cents: i64, stock: i64) -> CanonicalRecord {
        CanonicalRecord {
            name: format!("item {sku}"),
            company_name: "acme".into(),
            price: Decimal::new(price_cents, 2),
            stock,
            sku: sku.into(),
            category: category.into(),
            description: String::new(),
            status: RecordStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_insert_classifies_duplicates() {
        let store = MemoryStore::new();
        let batch = vec![record("A", "misc", 100, 1), record("B", "misc", 100, 1)];

        let first = store.insert_batch(&batch).await.unwrap();
        assert_eq!(first, vec![InsertOutcome::Inserted, InsertOutcome::Inserted]);

        let second = store.insert_batch(&batch).await.unwrap();
        assert_eq!(
            second,
            vec![InsertOutcome::Duplicate, InsertOutcome::Duplicate]
        );
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_within_one_batch() {
        let store = MemoryStore::new();
        let batch = vec![record("A", "misc", 100, 1), record("A", "misc", 200, 2)];
        let outcomes = store.insert_batch(&batch).await.unwrap();
        assert_eq!(
            outcomes,
            vec![InsertOutcome::Inserted, InsertOutcome::Duplicate]
        );
    }

    #[tokio::test]
    async fn test_delete_frees_sku() {
        let store = MemoryStore::new();
        store.insert_batch(&[record("A", "misc", 100, 1)]).await.unwrap();

        let page = store
            .list_matching(&RecordFilter::default(), 10, 1)
            .await
            .unwrap();
        store.delete_record(&page.ids[0]).await.unwrap();
        assert!(store.is_empty());

        let outcomes = store.insert_batch(&[record("A", "misc", 100, 1)]).await.unwrap();
        assert_eq!(outcomes, vec![InsertOutcome::Inserted]);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_errors() {
        let store = MemoryStore::new();
        assert!(store.delete_record(&"999".to_string()).await.is_err());
        assert!(store.delete_record(&"not-a-number".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_aggregate_stats() {
        let store = MemoryStore::new();
        store
            .insert_batch(&[record("A", "misc", 150, 10), record("B", "misc", 200, 5)])
            .await
            .unwrap();

        let stats = store.aggregate_stats().await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_stock, 15);
        // 1.50 * 10 + 2.00 * 5 = 25.00
        assert_eq!(stats.total_value, Decimal::new(2500, 2));
    }

    #[tokio::test]
    async fn test_source_reader_round_trip() {
        let store = MemoryStore::new();
        store.seed([record("A", "connector", 100, 1), record("B", "resistor", 100, 1)]);

        let filter = RecordFilter::default().with_category("connector");
        let page = store.list_records(&filter, 10, 0).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.rows[0].get("sku"), Some("A"));
        assert_eq!(page.rows[0].get("status"), Some("active"));
    }

    #[tokio::test]
    async fn test_id_paging_is_one_based() {
        let store = MemoryStore::new();
        store.seed((0..5).map(|i| record(&format!("S{i}"), "misc", 100, 1)));

        let page1 = store
            .list_matching(&RecordFilter::default(), 2, 1)
            .await
            .unwrap();
        let page3 = store
            .list_matching(&RecordFilter::default(), 2, 3)
            .await
            .unwrap();
        assert_eq!(page1.ids.len(), 2);
        assert_eq!(page1.total_pages, 3);
        assert_eq!(page3.ids.len(), 1);
    }
}
