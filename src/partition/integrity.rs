//! Integrity check and repair of a partition's storage

use crate::error::IndexResult;
use crate::partition::storage::{Storage, META_FILE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tantivy::directory::error::OpenReadError;
use tantivy::{Index, IndexMeta, SegmentMeta};
use tracing::{info, warn};

/// Outcome of an integrity check
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityStatus {
    /// No damaged or missing files
    pub clean: bool,

    /// Segments referenced by the last commit
    pub segments: usize,

    /// Live documents in those segments
    pub documents: u64,

    /// Files whose checksum does not match their footer
    pub corrupted_files: Vec<PathBuf>,

    /// Files referenced by the commit but absent from storage
    pub missing_files: Vec<PathBuf>,
}

impl IntegrityStatus {
    fn damaged(&self) -> HashSet<&Path> {
        self.corrupted_files
            .iter()
            .chain(self.missing_files.iter())
            .map(PathBuf::as_path)
            .collect()
    }
}

fn segment_files(segment: &SegmentMeta) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = segment
        .list_files()
        .into_iter()
        .filter(|path| match path.extension().and_then(|ext| ext.to_str()) {
            Some("temp") => false,
            Some("del") => segment.has_deletes(),
            _ => true,
        })
        .collect();
    files.sort();
    files
}

/// Read-only diagnostic over the storage folder
pub fn check(storage: &Storage) -> IndexResult<IntegrityStatus> {
    if !storage.has_index() {
        return Ok(IntegrityStatus {
            clean: true,
            ..Default::default()
        });
    }

    let index = Index::open(storage.directory()?)?;
    let metas = index.load_metas()?;
    let mut status = IntegrityStatus {
        segments: metas.segments.len(),
        ..Default::default()
    };

    for segment in &metas.segments {
        status.documents += u64::from(segment.num_docs());
        for path in segment_files(segment) {
            match index.directory().validate_checksum(&path) {
                Ok(true) => {}
                Ok(false) => status.corrupted_files.push(path),
                Err(OpenReadError::FileDoesNotExist(_)) => status.missing_files.push(path),
                Err(other) => {
                    warn!(path = ?path, error = %other, "Unreadable segment file");
                    status.corrupted_files.push(path);
                }
            }
        }
    }

    status.clean = status.corrupted_files.is_empty() && status.missing_files.is_empty();
    Ok(status)
}

/// Drop every segment touching a damaged file from the commit point.
///
/// The caller must hold the partition's instance lock and have closed the
/// writer. Documents in dropped segments are lost.
pub fn repair(storage: &Storage, status: &IntegrityStatus) -> IndexResult<usize> {
    if status.clean {
        return Ok(0);
    }

    let index = Index::open(storage.directory()?)?;
    let mut metas: IndexMeta = index.load_metas()?;
    let damaged = status.damaged();

    let before = metas.segments.len();
    metas.segments.retain(|segment| {
        !segment_files(segment)
            .iter()
            .any(|path| damaged.contains(path.as_path()))
    });
    let dropped = before - metas.segments.len();

    storage.atomic_write(META_FILE, &serde_json::to_vec_pretty(&metas)?)?;
    info!(
        storage = %storage.path().display(),
        dropped_segments = dropped,
        "Rewrote commit point without damaged segments"
    );
    Ok(dropped)
}
