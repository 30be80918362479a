//! Canonical record model and transformation.
//!
//! Everything the pipeline moves is a [`CanonicalRecord`]: the normalized,
//! validated shape used internally regardless of whether a row came from a
//! delimited file or a store query. Raw input arrives as a [`RawRow`]
//! (field-name to text mapping) and is either transformed or rejected.

pub mod sku;
pub mod transform;

pub use sku::{KeyPolicy, KeySynthesizer};
pub use transform::Transformer;

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Record lifecycle status at the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
}

impl RecordStatus {
    /// Parse a status string, defaulting to Active for anything unrecognized.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "inactive" => RecordStatus::Inactive,
            _ => RecordStatus::Active,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Active => write!(f, "active"),
            RecordStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// The unit moved by the pipeline. Immutable once handed to the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Non-empty display name.
    pub name: String,

    /// Supplier company name, may be empty.
    pub company_name: String,

    /// Non-negative unit price, two-decimal precision.
    pub price: Decimal,

    /// Non-negative stock count.
    pub stock: i64,

    /// Globally unique key at the destination; sourced or synthesized.
    pub sku: String,

    /// Partition key for filtered extraction and purge.
    pub category: String,

    /// Free text; synthesized from category and name when absent.
    pub description: String,

    /// Lifecycle status, defaults to active.
    pub status: RecordStatus,
}

impl CanonicalRecord {
    /// Stock valued at unit price. Summed across the destination this is the
    /// `total_value` aggregate the reconciler cross-checks.
    pub fn value(&self) -> Decimal {
        self.price * Decimal::from(self.stock)
    }
}

/// One raw source row: an origin-agnostic mapping of field name to text.
///
/// Rows carry their ordinal position in the source so rejections can point
/// back at the offending input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// Ordinal position of the row in its source (0-based).
    pub index: u64,
    fields: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new(index: u64) -> Self {
        Self {
            index,
            fields: BTreeMap::new(),
        }
    }

    /// Set a field value. Returns self for builder-style construction.
    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Get a field value, treating a missing field and an absent field the
    /// same way.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Trimmed field value, with empty strings collapsed to None.
    pub fn get_trimmed(&self, field: &str) -> Option<&str> {
        self.get(field).map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Filter predicate for extraction and purge. Batches returned under one
/// filter form a total partition of the matching source set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Match only records with this status (None = any).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,

    /// Match only records in this category (None = any).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl RecordFilter {
    /// Filter for active records, the default migration predicate.
    pub fn active() -> Self {
        Self {
            status: Some(RecordStatus::Active),
            ..Self::default()
        }
    }

    /// Restrict the filter to one category partition.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn matches(&self, record: &CanonicalRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(ref category) = self.category {
            if &record.category != category {
                return false;
            }
        }
        true
    }
}

/// Why a raw row was rejected by the transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// `price` or `stock` failed numeric parsing or was negative.
    InvalidNumericField,
    /// A required text field was empty after trimming.
    MissingRequiredField,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidNumericField => write!(f, "invalid_numeric_field"),
            RejectReason::MissingRequiredField => write!(f, "missing_required_field"),
        }
    }
}

/// A per-row rejection, accumulated rather than thrown so one bad row never
/// aborts a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Ordinal position of the rejected row in its source.
    pub row_index: u64,

    /// The field that triggered the rejection.
    pub field: String,

    pub reason: RejectReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {} ({})", self.row_index, self.reason, self.field)
    }
}
