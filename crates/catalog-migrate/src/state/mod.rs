//! File-based run state for resume capability.

use crate::error::{MigrateError, Result};
use crate::reconcile::LedgerTotals;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Persisted run state, written at batch boundaries.
///
/// Offsets are only checkpointed between batches, so a resume may replay
/// the batch that was in flight when the run died; the loader's
/// duplicate-skip makes that replay harmless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Unique run identifier.
    pub run_id: String,

    /// SHA256 hash of the configuration.
    pub config_hash: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// Current run status.
    pub status: RunStatus,

    /// Per-partition progress, keyed by category (or "*" for an
    /// unpartitioned run).
    pub partitions: HashMap<String, PartitionState>,

    /// When the run completed (if finished).
    pub completed_at: Option<DateTime<Utc>>,

    /// HMAC-SHA256 signature for integrity validation.
    /// Computed over serialized state (excluding this field) using
    /// config_hash as key. Optional for older state files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Per-partition progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionState {
    pub status: TaskStatus,

    /// Source offset of the next unread page.
    pub offset: u64,

    /// Counters accumulated so far in this partition.
    #[serde(default)]
    pub totals: LedgerTotals,

    /// When the partition finished.
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message if failed.
    pub error: Option<String>,
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RunState {
    pub fn new(run_id: String, config_hash: String) -> Self {
        Self {
            run_id,
            config_hash,
            started_at: Utc::now(),
            status: RunStatus::Running,
            partitions: HashMap::new(),
            completed_at: None,
            hmac: None, // computed on first save
        }
    }

    /// Compute HMAC-SHA256 over the state, keyed by the config hash.
    /// Tampering with the file requires knowing the config hash too.
    fn compute_hmac(&self) -> Result<String> {
        let mut state_for_signing = self.clone();
        state_for_signing.hmac = None;

        let content = serde_json::to_string(&state_for_signing)
            .map_err(|e| MigrateError::State(format!("failed to serialize state for HMAC: {e}")))?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MigrateError::State(format!("failed to create HMAC: {e}")))?;

        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Load state from a file, validating the HMAC signature if present.
    /// Files without a signature are accepted but flagged, and are upgraded
    /// on the next save.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)?;

        if let Some(stored_hmac) = &state.hmac {
            let expected_hmac = state.compute_hmac()?;
            if stored_hmac != &expected_hmac {
                return Err(MigrateError::State(
                    "state file integrity check failed: HMAC mismatch (possible tampering)"
                        .to_string(),
                ));
            }
        } else {
            tracing::warn!(
                "state file has no HMAC signature (older format), integrity cannot be verified"
            );
        }

        Ok(state)
    }

    /// Save state atomically: write to a temp file, then rename over the
    /// target, with a fresh HMAC.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        self.hmac = Some(self.compute_hmac()?);

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| MigrateError::State(format!("failed to serialize state: {e}")))?;

        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Refuse to resume under a different configuration.
    pub fn validate_config(&self, config_hash: &str) -> Result<()> {
        if self.config_hash != config_hash {
            return Err(MigrateError::ConfigChanged);
        }
        Ok(())
    }

    pub fn get_or_create_partition(&mut self, key: &str) -> &mut PartitionState {
        self.partitions
            .entry(key.to_string())
            .or_insert_with(PartitionState::new)
    }

    pub fn is_partition_completed(&self, key: &str) -> bool {
        self.partitions
            .get(key)
            .map(|p| p.status == TaskStatus::Completed)
            .unwrap_or(false)
    }

    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = RunStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

impl PartitionState {
    pub fn new() -> Self {
        Self {
            status: TaskStatus::Pending,
            offset: 0,
            totals: LedgerTotals::default(),
            completed_at: None,
            error: None,
        }
    }

    pub fn mark_in_progress(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    pub fn mark_completed(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.to_string());
    }

    /// Record progress at a batch boundary.
    pub fn checkpoint(&mut self, offset: u64, totals: LedgerTotals) {
        self.offset = offset;
        self.totals = totals;
    }
}

impl Default for PartitionState {
    fn default() -> Self {
        Self::new()
    }
}
