//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use crate::record::RecordFilter;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration for resume validation.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl MigrationConfig {
    /// Base extraction filter, before any per-category partitioning.
    pub fn base_filter(&self) -> RecordFilter {
        RecordFilter {
            status: self.status_filter,
            category: None,
        }
    }

    /// Retry policy derived from the configured attempt count and delay.
    pub fn retry_policy(&self) -> crate::retry::RetryPolicy {
        crate::retry::RetryPolicy::new(
            self.max_retries,
            std::time::Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordStatus;

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let config = Config::from_yaml(
            "source:\n  path: catalog.csv\ntarget:\n  path: import.sql\n",
        )
        .unwrap();

        assert_eq!(config.source.r#type, "csv");
        assert_eq!(config.target.r#type, "sql");
        assert_eq!(config.target.table, "products");
        assert_eq!(config.migration.page_size, 100);
        assert_eq!(config.migration.batch_size, 100);
        assert_eq!(config.migration.max_retries, 3);
        assert_eq!(config.migration.fallback_category, "general");
    }

    #[test]
    fn test_full_yaml_round_trip() {
        let yaml = r#"
source:
  type: csv
  path: catalog.csv
  delimiter: ";"
target:
  type: memory
migration:
  page_size: 50
  batch_size: 200
  status_filter: active
  key_policy: timestamp_salted
  categories: [connector, resistor]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.delimiter, ";");
        assert_eq!(config.migration.batch_size, 200);
        assert_eq!(
            config.migration.status_filter,
            Some(RecordStatus::Active)
        );
        assert_eq!(
            config.migration.categories,
            vec!["connector".to_string(), "resistor".to_string()]
        );
    }

    #[test]
    fn test_invalid_yaml_rejected_on_parse() {
        assert!(Config::from_yaml("source: [not, a, mapping]").is_err());
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = Config::from_yaml("source:\n  path: a.csv\ntarget:\n  path: out.sql\n").unwrap();
        let b = Config::from_yaml("source:\n  path: a.csv\ntarget:\n  path: out.sql\n").unwrap();
        let c = Config::from_yaml("source:\n  path: b.csv\ntarget:\n  path: out.sql\n").unwrap();

        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }
}
