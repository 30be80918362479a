//! # catalog-migrate
//!
//! Batch migration and reconciliation engine for product catalog records.
//!
//! This library moves catalog rows from a legacy source into a destination
//! store in resumable, verifiable batches:
//!
//! - **Paginated extraction** with offset-based resume
//! - **Canonical transformation** with per-row rejection tracking and
//!   deterministic SKU synthesis for rows without a key
//! - **Idempotent loading** that skips duplicate keys instead of
//!   overwriting them
//! - **Post-run reconciliation** of record counts and value aggregates
//! - **Bulk purge** of stale destination records by category
//! - **Resume capability** via signed JSON state files
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use catalog_migrate::{Config, CsvFileSource, Orchestrator, SqlFileSink};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> catalog_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let source = Arc::new(CsvFileSource::open(&config.source.path)?);
//!     let sink = Arc::new(SqlFileSink::create(&config.target.path, &config.target.table)?);
//!     let orchestrator = Orchestrator::new(config, source, sink.clone());
//!     let report = orchestrator.run(CancellationToken::new()).await?;
//!     sink.finish()?;
//!     println!("Loaded {} records", report.totals.inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod orchestrator;
pub mod purge;
pub mod reconcile;
pub mod record;
pub mod retry;
pub mod state;
pub mod store;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result};
pub use extract::{ExtractedPage, PaginatedExtractor};
pub use load::{BatchLoader, BatchOutcome};
pub use orchestrator::{MigrationReport, Orchestrator};
pub use purge::{BulkPurge, PurgeReport};
pub use reconcile::{LedgerTotals, ReconcileReport, Reconciler};
pub use record::{
    CanonicalRecord, KeyPolicy, KeySynthesizer, RawRow, RecordFilter, RecordStatus, Rejection,
    Transformer,
};
pub use retry::RetryPolicy;
pub use state::RunState;
pub use store::{
    AggregateStats, CsvFileSource, DestinationWriter, InsertOutcome, MemoryStore, SourceReader,
    SqlFileSink,
};
