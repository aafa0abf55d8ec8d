//! Partitioned full-text index
//!
//! A [`PartitionedIndex`] manages a set of independent, durable partitions,
//! each a standalone tantivy index with its own folder, its own writer and
//! point-in-time backup and restore. Queries are handed in as already-parsed
//! [`QueryNode`] trees and can be normalized with a [`QueryRewriter`] before
//! searching.

pub mod analysis;
pub mod archive;
pub mod config;
pub mod document;
pub mod error;
pub mod partition;
pub mod query;
pub mod registry;
pub mod teardown;

pub use analysis::CaseInsensitive;
pub use config::{BackupFormat, IndexConfig, IndexConfigBuilder};
pub use document::{Document, RECORD_KEY};
pub use error::{IndexError, IndexResult};
pub use partition::{IntegrityStatus, Partition, PartitionSearcher, PartitionState};
pub use query::{
    IdentityPreprocessor, LowerCasingPreprocessor, Occur, QueryNode, QueryPreprocessor,
    QueryRewriter,
};
pub use registry::PartitionedIndex;
