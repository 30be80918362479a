//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, unsupported adapter).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source page read failed after all retries were exhausted.
    ///
    /// Fatal for the run: skipping unread pages would silently drop records.
    #[error("Extraction failed at offset {offset}: {message}")]
    ExtractionFailed { offset: u64, message: String },

    /// The destination rejected or dropped the connection after all retries.
    #[error("Destination unreachable: {0}")]
    DestinationUnreachable(String),

    /// Source adapter error (unreadable file, malformed page, bad header).
    #[error("Source error: {0}")]
    Source(String),

    /// Cumulative counters do not account for every extracted record.
    ///
    /// A shortfall means records were silently dropped between extraction and
    /// loading, which is a fatal consistency error rather than a warning.
    #[error(
        "Consistency violation: extracted {extracted} but accounted for {accounted} \
         (loaded + duplicates + failed + rejected)"
    )]
    Consistency { extracted: u64, accounted: u64 },

    /// State file error (corrupt checkpoint, failed signature).
    #[error("State file error: {0}")]
    State(String),

    /// Config hash mismatch on resume.
    #[error("Config has changed since last run - cannot resume. Delete the state file to start fresh.")]
    ConfigChanged,

    /// Migration was cancelled (SIGINT, etc.).
    #[error("Migration cancelled")]
    Cancelled,

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse error from the file source adapter.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create an ExtractionFailed error.
    pub fn extraction(offset: u64, message: impl Into<String>) -> Self {
        MigrateError::ExtractionFailed {
            offset,
            message: message.into(),
        }
    }

    /// Whether the error is worth retrying at the transport layer.
    ///
    /// Consistency violations, config problems and cancellation are
    /// structural: retrying them cannot help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MigrateError::DestinationUnreachable(_)
                | MigrateError::Source(_)
                | MigrateError::Io(_)
        )
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::ConfigChanged => 2,
            MigrateError::Cancelled => 130,
            MigrateError::Consistency { .. } => 3,
            _ => 1,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
