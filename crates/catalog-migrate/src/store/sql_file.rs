//! Generated-SQL sink adapter.
//!
//! Serializes each loaded record into an `INSERT` statement so a migration
//! can produce an importable artifact instead of writing to a live store.
//! SKU uniqueness is tracked in-process, keeping re-runs over the same input
//! idempotent at the artifact level. The artifact is write-only: purge and
//! listing are not supported and say so.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::record::{CanonicalRecord, RecordFilter};
use crate::store::{AggregateStats, DestinationWriter, IdPage, InsertOutcome, RecordId};

struct Inner {
    writer: BufWriter<File>,
    skus: std::collections::HashSet<String>,
    stats: AggregateStats,
}

/// [`DestinationWriter`] that emits `INSERT` statements to a file.
pub struct SqlFileSink {
    path: PathBuf,
    table: String,
    inner: Mutex<Inner>,
}

impl SqlFileSink {
    /// Create the artifact file, truncating any previous one.
    pub fn create<P: AsRef<Path>>(path: P, table: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            table: table.into(),
            inner: Mutex::new(Inner {
                writer: BufWriter::new(file),
                skus: std::collections::HashSet::new(),
                stats: AggregateStats::default(),
            }),
        })
    }

    /// Flush buffered statements to disk. Call once the migration run ends.
    pub fn finish(&self) -> Result<()> {
        let mut inner = self.inner.lock().expect("sink mutex poisoned");
        inner.writer.flush()?;
        debug!(path = %self.path.display(), "flushed SQL artifact");
        Ok(())
    }

    fn statement(&self, record: &CanonicalRecord) -> String {
        format!(
            "INSERT INTO {} (name, company_name, price, stock, description, category, sku, status) \
             VALUES ({}, {}, {}, {}, {}, {}, {}, {});\n",
            self.table,
            quote(&record.name),
            quote(&record.company_name),
            record.price,
            record.stock,
            quote(&record.description),
            quote(&record.category),
            quote(&record.sku),
            quote(&record.status.to_string()),
        )
    }
}

/// Single-quote a string literal, doubling embedded quotes.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[async_trait]
impl DestinationWriter for SqlFileSink {
    async fn insert_batch(&self, records: &[CanonicalRecord]) -> Result<Vec<InsertOutcome>> {
        let mut inner = self.inner.lock().expect("sink mutex poisoned");
        let mut outcomes = Vec::with_capacity(records.len());

        for record in records {
            if inner.skus.contains(&record.sku) {
                outcomes.push(InsertOutcome::Duplicate);
                continue;
            }
            let statement = self.statement(record);
            if let Err(e) = inner.writer.write_all(statement.as_bytes()) {
                // A failed write poisons the whole batch from this record on;
                // report it per record rather than dropping outcomes.
                let reason = format!("artifact write failed: {e}");
                while outcomes.len() < records.len() {
                    outcomes.push(InsertOutcome::Failed(reason.clone()));
                }
                return Ok(outcomes);
            }
            inner.skus.insert(record.sku.clone());
            inner.stats.accumulate(record);
            outcomes.push(InsertOutcome::Inserted);
        }

        Ok(outcomes)
    }

    async fn list_matching(
        &self,
        _filter: &RecordFilter,
        _limit: usize,
        _page: u64,
    ) -> Result<IdPage> {
        Err(MigrateError::Config(
            "SQL artifact sink is write-only: it cannot list records".into(),
        ))
    }

    async fn delete_record(&self, _id: &RecordId) -> Result<()> {
        Err(MigrateError::Config(
            "SQL artifact sink is write-only: it cannot delete records".into(),
        ))
    }

    async fn aggregate_stats(&self) -> Result<AggregateStats> {
        Ok(self.inner.lock().expect("sink mutex poisoned").stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordStatus;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn record(sku: &str, name: &str) -> CanonicalRecord {
        CanonicalRecord {
            name: name.into(),
            company_name: "O'Brien Components".into(),
            price: Decimal::new(999, 2),
            stock: 3,
            sku: sku.into(),
            category: "connector".into(),
            description: "it's small".into(),
            status: RecordStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_emits_escaped_insert_statements() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.sql");
        let sink = SqlFileSink::create(&path, "products").unwrap();

        let outcomes = sink.insert_batch(&[record("SKU-1", "3mm 'D' plug")]).await.unwrap();
        assert_eq!(outcomes, vec![InsertOutcome::Inserted]);
        sink.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("INSERT INTO products "));
        assert!(content.contains("'3mm ''D'' plug'"));
        assert!(content.contains("'O''Brien Components'"));
        assert!(content.contains("9.99"));
    }

    #[tokio::test]
    async fn test_duplicate_sku_not_rewritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.sql");
        let sink = SqlFileSink::create(&path, "products").unwrap();

        sink.insert_batch(&[record("SKU-1", "a")]).await.unwrap();
        let second = sink.insert_batch(&[record("SKU-1", "a")]).await.unwrap();
        assert_eq!(second, vec![InsertOutcome::Duplicate]);
        sink.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_stats_track_inserted_only() {
        let dir = tempdir().unwrap();
        let sink = SqlFileSink::create(dir.path().join("out.sql"), "products").unwrap();

        sink.insert_batch(&[record("A", "a"), record("A", "a"), record("B", "b")])
            .await
            .unwrap();

        let stats = sink.aggregate_stats().await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_stock, 6);
    }

    #[tokio::test]
    async fn test_purge_surface_unsupported() {
        let dir = tempdir().unwrap();
        let sink = SqlFileSink::create(dir.path().join("out.sql"), "products").unwrap();

        assert!(sink
            .list_matching(&RecordFilter::default(), 10, 1)
            .await
            .is_err());
        assert!(sink.delete_record(&"1".to_string()).await.is_err());
    }
}
