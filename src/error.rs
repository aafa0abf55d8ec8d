//! Error types for partition, registry and query operations

use thiserror::Error;

/// Result type for index operations
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while managing partitions or rewriting queries
#[derive(Error, Debug)]
pub enum IndexError {
    /// Storage could not be opened, or another writer holds its lock
    #[error("Activation failed: {0}")]
    Activation(String),

    /// Integrity check found corruption that was not (or could not be) repaired
    #[error("Index consistency error: {0}")]
    Consistency(String),

    /// A query tree contains a node kind the rewriter does not know
    #[error("Unsupported query node: {0}")]
    UnsupportedQueryNode(String),

    /// A known node kind carries values the engine cannot execute
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Read, write or copy on the storage medium failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot handle could not be acquired or released
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Any other failure reported by the embedded engine
    #[error("Engine error: {0}")]
    Engine(String),

    /// Backup archive could not be written or unpacked
    #[error("Archive error: {0}")]
    Archive(String),

    /// Stored document or commit metadata could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Partition name cannot be used as a storage folder
    #[error("Invalid partition name: {0:?}")]
    InvalidPartitionName(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl IndexError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            IndexError::Activation(_) => "ACTIVATION_ERROR",
            IndexError::Consistency(_) => "CONSISTENCY_ERROR",
            IndexError::UnsupportedQueryNode(_) => "UNSUPPORTED_QUERY_NODE",
            IndexError::InvalidQuery(_) => "INVALID_QUERY",
            IndexError::Io(_) => "IO_ERROR",
            IndexError::Snapshot(_) => "SNAPSHOT_ERROR",
            IndexError::Engine(_) => "ENGINE_ERROR",
            IndexError::Archive(_) => "ARCHIVE_ERROR",
            IndexError::Serialization(_) => "SERIALIZATION_ERROR",
            IndexError::InvalidPartitionName(_) => "INVALID_PARTITION_NAME",
            IndexError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

impl From<tantivy::TantivyError> for IndexError {
    fn from(err: tantivy::TantivyError) -> Self {
        use tantivy::TantivyError;

        match err {
            TantivyError::LockFailure(lock_error, detail) => IndexError::Activation(match detail {
                Some(detail) => format!("{lock_error}: {detail}"),
                None => lock_error.to_string(),
            }),
            TantivyError::OpenDirectoryError(e) => IndexError::Activation(e.to_string()),
            TantivyError::IoError(e) => {
                IndexError::Io(std::io::Error::new(e.kind(), e.to_string()))
            }
            TantivyError::DataCorruption(e) => IndexError::Consistency(format!("{:?}", e)),
            other => IndexError::Engine(other.to_string()),
        }
    }
}

impl From<tantivy::directory::error::OpenDirectoryError> for IndexError {
    fn from(err: tantivy::directory::error::OpenDirectoryError) -> Self {
        IndexError::Activation(err.to_string())
    }
}

impl From<tantivy::directory::error::OpenReadError> for IndexError {
    fn from(err: tantivy::directory::error::OpenReadError) -> Self {
        IndexError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            err.to_string(),
        ))
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

/// Conversion from zip::result::ZipError
impl From<zip::result::ZipError> for IndexError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => IndexError::Io(e),
            other => IndexError::Archive(other.to_string()),
        }
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for IndexError {
    fn from(err: config::ConfigError) -> Self {
        IndexError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            IndexError::UnsupportedQueryNode("span".to_string()).error_code(),
            "UNSUPPORTED_QUERY_NODE"
        );
        assert_eq!(
            IndexError::Snapshot("gone".to_string()).error_code(),
            "SNAPSHOT_ERROR"
        );
    }

    #[test]
    fn test_lock_failure_maps_to_activation() {
        let err = tantivy::TantivyError::LockFailure(
            tantivy::directory::error::LockError::LockBusy,
            None,
        );
        assert!(matches!(IndexError::from(err), IndexError::Activation(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "segment missing");
        let err: IndexError = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert!(err.to_string().contains("segment missing"));
    }
}
