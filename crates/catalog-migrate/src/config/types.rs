//! Configuration type definitions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::record::{KeyPolicy, RecordStatus};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source catalog configuration.
    pub source: SourceConfig,

    /// Destination configuration.
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source kind: "csv" or "memory".
    #[serde(default = "default_csv")]
    pub r#type: String,

    /// Path to the source file (required for csv sources).
    #[serde(default)]
    pub path: String,

    /// CSV field delimiter (default: ",").
    #[serde(default = "default_comma")]
    pub delimiter: String,
}

/// Destination configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Destination kind: "sql" (SQL script artifact) or "memory".
    #[serde(default = "default_sql")]
    pub r#type: String,

    /// Path to the destination artifact (required for sql targets).
    #[serde(default)]
    pub path: String,

    /// Destination table name (default: "products").
    #[serde(default = "default_table")]
    pub table: String,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows fetched per source page (default: 100).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Records sent per destination batch, 50..=500 (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retry attempts for transient source/destination failures (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds (default: 500).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Pause between batches in milliseconds, for rate-limited
    /// destinations (default: 0).
    #[serde(default)]
    pub pause_between_batches_ms: u64,

    /// Parallel category partitions (default: 4). Ignored when
    /// `categories` is empty.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Categories to migrate as independent partitions. Empty means one
    /// unpartitioned run over the whole filtered source.
    #[serde(default)]
    pub categories: Vec<String>,

    /// Record status filter (default: active only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_filter: Option<RecordStatus>,

    /// Key synthesis policy for rows without a key.
    #[serde(default)]
    pub key_policy: KeyPolicy,

    /// Name characters used for the synthesized key prefix (default: 4).
    #[serde(default = "default_sku_prefix_len")]
    pub sku_prefix_len: usize,

    /// Category assigned to rows with none (default: "general").
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,

    /// Absolute tolerance on the reconciled value aggregate
    /// (default: 0.01).
    #[serde(default = "default_value_tolerance")]
    pub value_tolerance: Decimal,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            pause_between_batches_ms: 0,
            workers: default_workers(),
            categories: Vec::new(),
            status_filter: None,
            key_policy: KeyPolicy::default(),
            sku_prefix_len: default_sku_prefix_len(),
            fallback_category: default_fallback_category(),
            value_tolerance: default_value_tolerance(),
        }
    }
}

// Default value functions for serde

fn default_csv() -> String {
    "csv".to_string()
}

fn default_sql() -> String {
    "sql".to_string()
}

fn default_comma() -> String {
    ",".to_string()
}

fn default_table() -> String {
    "products".to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_batch_size() -> usize {
    100
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_workers() -> usize {
    4
}

fn default_sku_prefix_len() -> usize {
    4
}

fn default_fallback_category() -> String {
    "general".to_string()
}

fn default_value_tolerance() -> Decimal {
    Decimal::new(1, 2)
}
