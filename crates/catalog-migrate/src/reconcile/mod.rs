//! Post-run reconciliation.
//!
//! Two independent checks run after loading finishes. The ledger check is
//! an exact identity over the run's own counters: every extracted record
//! must be accounted for as inserted, duplicate, failed, or rejected, and a
//! shortfall aborts with a fatal consistency error. The aggregate check
//! compares destination-side totals against what the run expected to leave
//! behind; mismatches there are reported as findings, not failures, since
//! the destination may legitimately hold records from earlier runs.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::store::{AggregateStats, DestinationWriter};

/// The run-side ledger: counters accumulated while extracting and loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub extracted: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub failed: u64,
    pub rejected: u64,
}

impl LedgerTotals {
    pub fn accounted(&self) -> u64 {
        self.inserted + self.duplicates + self.failed + self.rejected
    }
}

/// One aggregate discrepancy between the run's expectation and the
/// destination's reported totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

/// Outcome of the aggregate cross-check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub expected: AggregateStats,
    pub destination: AggregateStats,
    pub findings: Vec<Finding>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

pub struct Reconciler {
    writer: Arc<dyn DestinationWriter>,
    /// Absolute tolerance on the monetary value aggregate.
    value_tolerance: Decimal,
}

impl Reconciler {
    pub fn new(writer: Arc<dyn DestinationWriter>, value_tolerance: Decimal) -> Self {
        Self {
            writer,
            value_tolerance,
        }
    }

    /// Enforce the record-count identity. A shortfall means records were
    /// extracted and then silently lost, which no report should paper over.
    pub fn check_ledger(totals: &LedgerTotals) -> Result<()> {
        let accounted = totals.accounted();
        if accounted != totals.extracted {
            return Err(MigrateError::Consistency {
                extracted: totals.extracted,
                accounted,
            });
        }
        info!(
            extracted = totals.extracted,
            inserted = totals.inserted,
            duplicates = totals.duplicates,
            failed = totals.failed,
            rejected = totals.rejected,
            "ledger reconciled"
        );
        Ok(())
    }

    /// Compare destination aggregates against the expected totals. Count
    /// and stock must match exactly; value is allowed to drift within the
    /// configured tolerance to absorb rounding at the destination.
    pub async fn verify_aggregates(&self, expected: AggregateStats) -> Result<ReconcileReport> {
        let destination = self.writer.aggregate_stats().await?;
        let mut findings = Vec::new();

        if destination.count != expected.count {
            findings.push(Finding {
                field: "count".into(),
                expected: expected.count.to_string(),
                actual: destination.count.to_string(),
            });
        }
        if destination.total_stock != expected.total_stock {
            findings.push(Finding {
                field: "total_stock".into(),
                expected: expected.total_stock.to_string(),
                actual: destination.total_stock.to_string(),
            });
        }
        let value_drift = (destination.total_value - expected.total_value).abs();
        if value_drift > self.value_tolerance {
            findings.push(Finding {
                field: "total_value".into(),
                expected: expected.total_value.to_string(),
                actual: destination.total_value.to_string(),
            });
        }

        for finding in &findings {
            warn!(
                field = %finding.field,
                expected = %finding.expected,
                actual = %finding.actual,
                "reconciliation mismatch"
            );
        }

        Ok(ReconcileReport {
            expected,
            destination,
            findings,
        })
    }
}
