//! Store boundary: the traits the engine consumes, plus their typed results.
//!
//! The engine never talks to a transport directly. Sources implement
//! [`SourceReader`], destinations implement [`DestinationWriter`], and every
//! response is a typed page or outcome list rather than text to be scraped.
//! Adapters in this module's submodules cover the file surfaces (delimited
//! text in, generated SQL out) and an in-memory store for tests and dry runs.

pub mod csv_file;
pub mod memory;
pub mod sql_file;

pub use csv_file::CsvFileSource;
pub use memory::MemoryStore;
pub use sql_file::SqlFileSink;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::record::{CanonicalRecord, RawRow, RecordFilter};

/// Destination-assigned record identifier.
pub type RecordId = String;

/// One page of raw rows from a source, with exhaustion signals.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    /// Rows in stable source order.
    pub rows: Vec<RawRow>,

    /// Total records matching the filter across all pages.
    pub total_count: u64,

    /// Total pages at the requested limit.
    pub total_pages: u64,
}

/// One page of record identifiers, used by the bulk purge.
#[derive(Debug, Clone, Default)]
pub struct IdPage {
    pub ids: Vec<RecordId>,
    pub total_count: u64,
    pub total_pages: u64,
}

/// Per-record outcome of a batch insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum InsertOutcome {
    /// Record written for the first time.
    Inserted,

    /// Key already present at the destination. A classified outcome, not an
    /// error; the record is skipped, never overwritten.
    Duplicate,

    /// Destination rejected the record (validation or transport), with the
    /// reason it gave.
    Failed(String),
}

/// Aggregate destination statistics for reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Number of records at the destination.
    pub count: u64,

    /// Sum of stock across all records.
    pub total_stock: i64,

    /// Sum of price x stock across all records.
    pub total_value: Decimal,
}

impl AggregateStats {
    /// Fold one record into the running totals.
    pub fn accumulate(&mut self, record: &CanonicalRecord) {
        self.count += 1;
        self.total_stock += record.stock;
        self.total_value += record.value();
    }

    /// Fold another set of totals into this one.
    pub fn merge(&mut self, other: AggregateStats) {
        self.count += other.count;
        self.total_stock += other.total_stock;
        self.total_value += other.total_value;
    }
}

/// Reads raw rows from a source in stable-ordered, offset-addressed pages.
///
/// Repeated calls with the same filter, limit and offset against an unchanged
/// source must return the same page; the extractor relies on this for safe
/// retry and resume.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Fetch one page of rows matching the filter.
    ///
    /// A source with zero matching records returns an empty page with
    /// `total_count == 0`, not an error.
    async fn list_records(
        &self,
        filter: &RecordFilter,
        limit: usize,
        offset: u64,
    ) -> Result<RecordPage>;
}

/// Writes canonical records to a destination and answers purge and
/// reconciliation queries.
///
/// The destination enforces `sku` uniqueness; implementations classify a
/// unique-key violation as [`InsertOutcome::Duplicate`] rather than failing.
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    /// Submit one batch as a single logical write.
    ///
    /// Returns exactly one outcome per input record, in input order. If the
    /// destination rejects the batch as a whole, every record carries the
    /// same `Failed` reason; per-record splitting is the caller's retry
    /// strategy, not the writer's.
    async fn insert_batch(&self, records: &[CanonicalRecord]) -> Result<Vec<InsertOutcome>>;

    /// Fetch one page of identifiers matching the filter (purge support).
    /// Pages are addressed by 1-based page number, mirroring how paged stores
    /// report `total_pages`.
    async fn list_matching(
        &self,
        filter: &RecordFilter,
        limit: usize,
        page: u64,
    ) -> Result<IdPage>;

    /// Delete one record by identifier.
    async fn delete_record(&self, id: &RecordId) -> Result<()>;

    /// Aggregate statistics over the whole destination.
    async fn aggregate_stats(&self) -> Result<AggregateStats>;
}
