//! Partitioned index configuration

use crate::error::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest writer arena tantivy accepts per indexing thread
pub const MIN_HEAP_PER_THREAD: usize = 15_000_000;

/// How `PartitionedIndex::backup` packages the staged partitions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackupFormat {
    /// One zip archive file
    #[default]
    Zip,
    /// An expanded directory tree with one folder per partition
    Directory,
}

/// Partitioned index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Root directory holding one folder per partition (None = temporary root)
    #[serde(default)]
    pub root_path: Option<PathBuf>,

    /// Index writer heap size in bytes (default: 50MB)
    #[serde(default = "default_writer_heap_size")]
    pub writer_heap_size: usize,

    /// Number of indexing threads per partition writer
    #[serde(default = "default_indexing_threads")]
    pub indexing_threads: usize,

    /// Fold field values to lowercase at index time for new partitions
    #[serde(default)]
    pub case_insensitive: bool,

    /// Backup packaging
    #[serde(default)]
    pub backup_format: BackupFormat,

    /// Attempts at pinning a commit point before giving up on a backup
    #[serde(default = "default_snapshot_attempts")]
    pub snapshot_attempts: usize,

    /// Maximum documents returned by a single top-N search
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_writer_heap_size() -> usize {
    50_000_000
}

fn default_indexing_threads() -> usize {
    1
}

fn default_snapshot_attempts() -> usize {
    3
}

fn default_max_results() -> usize {
    1000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root_path: None,
            writer_heap_size: default_writer_heap_size(),
            indexing_threads: default_indexing_threads(),
            case_insensitive: false,
            backup_format: BackupFormat::default(),
            snapshot_attempts: default_snapshot_attempts(),
            max_results: default_max_results(),
        }
    }
}

impl IndexConfig {
    /// Load configuration from file and environment
    pub fn load() -> IndexResult<Self> {
        let config_path = std::env::var("PARTITIONED_INDEX_CONFIG")
            .unwrap_or_else(|_| "config/partitioned-index.toml".to_string());

        let config: IndexConfig = config::Config::builder()
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: PARTITIONED_INDEX__)
            .add_source(
                config::Environment::with_prefix("PARTITIONED_INDEX")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine would refuse at activation time
    pub fn validate(&self) -> IndexResult<()> {
        if self.indexing_threads == 0 {
            return Err(IndexError::Configuration(
                "indexing_threads must be at least 1".to_string(),
            ));
        }
        if self.writer_heap_size / self.indexing_threads < MIN_HEAP_PER_THREAD {
            return Err(IndexError::Configuration(format!(
                "writer_heap_size {} is below {} bytes per indexing thread",
                self.writer_heap_size, MIN_HEAP_PER_THREAD
            )));
        }
        if self.snapshot_attempts == 0 {
            return Err(IndexError::Configuration(
                "snapshot_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for IndexConfig
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexConfig::default(),
        }
    }

    pub fn root_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_path = Some(path.into());
        self
    }

    pub fn writer_heap_size(mut self, size: usize) -> Self {
        self.config.writer_heap_size = size;
        self
    }

    pub fn indexing_threads(mut self, threads: usize) -> Self {
        self.config.indexing_threads = threads;
        self
    }

    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.config.case_insensitive = enabled;
        self
    }

    pub fn backup_format(mut self, format: BackupFormat) -> Self {
        self.config.backup_format = format;
        self
    }

    pub fn snapshot_attempts(mut self, attempts: usize) -> Self {
        self.config.snapshot_attempts = attempts;
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = max;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}

impl Default for IndexConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IndexConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backup_format, BackupFormat::Zip);
        assert!(!config.case_insensitive);
    }

    #[test]
    fn test_heap_below_thread_minimum_rejected() {
        let config = IndexConfigBuilder::new()
            .writer_heap_size(20_000_000)
            .indexing_threads(2)
            .build();
        assert!(matches!(
            config.validate(),
            Err(IndexError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_snapshot_attempts_rejected() {
        let config = IndexConfigBuilder::new().snapshot_attempts(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_toml() {
        let config: IndexConfig = toml::from_str(
            r#"
            case_insensitive = true
            backup_format = "directory"
            "#,
        )
        .unwrap();
        assert!(config.case_insensitive);
        assert_eq!(config.backup_format, BackupFormat::Directory);
        assert_eq!(config.writer_heap_size, 50_000_000);
    }
}
