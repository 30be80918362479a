//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    match config.source.r#type.as_str() {
        "csv" => {
            if config.source.path.is_empty() {
                return Err(MigrateError::Config(
                    "source.path is required for csv sources".into(),
                ));
            }
        }
        "memory" => {}
        other => {
            return Err(MigrateError::Config(format!(
                "source.type must be 'csv' or 'memory', got '{other}'"
            )));
        }
    }
    if config.source.delimiter.chars().count() != 1 {
        return Err(MigrateError::Config(
            "source.delimiter must be a single character".into(),
        ));
    }

    // Target validation
    match config.target.r#type.as_str() {
        "sql" => {
            if config.target.path.is_empty() {
                return Err(MigrateError::Config(
                    "target.path is required for sql targets".into(),
                ));
            }
        }
        "memory" => {}
        other => {
            return Err(MigrateError::Config(format!(
                "target.type must be 'sql' or 'memory', got '{other}'"
            )));
        }
    }
    if config.target.table.is_empty() {
        return Err(MigrateError::Config("target.table is required".into()));
    }

    // Cannot read and write the same file
    if !config.source.path.is_empty() && config.source.path == config.target.path {
        return Err(MigrateError::Config(
            "source and target cannot be the same file".into(),
        ));
    }

    // Migration config validation
    let m = &config.migration;
    if m.page_size == 0 {
        return Err(MigrateError::Config(
            "migration.page_size must be at least 1".into(),
        ));
    }
    if !(50..=500).contains(&m.batch_size) {
        return Err(MigrateError::Config(format!(
            "migration.batch_size must be between 50 and 500, got {}",
            m.batch_size
        )));
    }
    if m.workers == 0 {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }
    if m.sku_prefix_len == 0 {
        return Err(MigrateError::Config(
            "migration.sku_prefix_len must be at least 1".into(),
        ));
    }
    if m.fallback_category.trim().is_empty() {
        return Err(MigrateError::Config(
            "migration.fallback_category must not be blank".into(),
        ));
    }
    if m.value_tolerance.is_sign_negative() {
        return Err(MigrateError::Config(
            "migration.value_tolerance must not be negative".into(),
        ));
    }
    if m.categories.iter().any(|c| c.trim().is_empty()) {
        return Err(MigrateError::Config(
            "migration.categories must not contain blank entries".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: "csv".to_string(),
                path: "catalog.csv".to_string(),
                delimiter: ",".to_string(),
            },
            target: TargetConfig {
                r#type: "sql".to_string(),
                path: "import.sql".to_string(),
                table: "products".to_string(),
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_csv_source_requires_path() {
        let mut config = valid_config();
        config.source.path = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_source_type() {
        let mut config = valid_config();
        config.source.r#type = "postgres".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_memory_source_needs_no_path() {
        let mut config = valid_config();
        config.source.r#type = "memory".to_string();
        config.source.path = "".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_same_file_rejected() {
        let mut config = valid_config();
        config.target.path = config.source.path.clone();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = valid_config();
        config.migration.batch_size = 49;
        assert!(validate(&config).is_err());
        config.migration.batch_size = 50;
        assert!(validate(&config).is_ok());
        config.migration.batch_size = 500;
        assert!(validate(&config).is_ok());
        config.migration.batch_size = 501;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_multi_char_delimiter_rejected() {
        let mut config = valid_config();
        config.source.delimiter = ";;".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.migration.workers = 0;
        assert!(validate(&config).is_err());
    }
}
