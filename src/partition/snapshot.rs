//! Point-in-time snapshots of a partition's last commit

use crate::error::{IndexError, IndexResult};
use crate::partition::storage::{Storage, META_FILE};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tantivy::directory::error::OpenReadError;
use tantivy::directory::{FileSlice, MmapDirectory};
use tantivy::{Directory, Index, IndexMeta, IndexWriter};
use tracing::debug;

/// Handle on the file set of one commit.
///
/// Every file is opened when the snapshot is taken, so a later commit or
/// merge deleting those files does not affect what gets copied. Files are
/// read through a plain directory over the storage folder: the index's
/// managed directory strips checksum footers on read. The handle is consumed
/// by [`Snapshot::release`].
pub struct Snapshot {
    metas: IndexMeta,
    files: Vec<(PathBuf, FileSlice)>,
}

impl Snapshot {
    /// Pin the last commit.
    ///
    /// Holds the writer's shared lock so no commit can land while the commit
    /// metadata and its files are being opened. Background merges may still
    /// remove a file in between; that case retries up to `attempts` times.
    pub fn acquire(
        index: &Index,
        storage: &Storage,
        writer: &RwLock<IndexWriter>,
        attempts: usize,
    ) -> IndexResult<Self> {
        let raw = storage.directory()?;
        let _no_commit = writer.read();
        let mut last_missing = None;

        for attempt in 1..=attempts.max(1) {
            let metas = index.load_metas()?;
            match Self::open_files(&raw, &metas) {
                Ok(files) => {
                    debug!(
                        attempt,
                        opstamp = metas.opstamp,
                        files = files.len(),
                        "Snapshot acquired"
                    );
                    return Ok(Self { metas, files });
                }
                Err(OpenReadError::FileDoesNotExist(path)) => {
                    debug!(attempt, path = ?path, "Snapshot file vanished, retrying");
                    last_missing = Some(path);
                }
                Err(other) => return Err(IndexError::Snapshot(other.to_string())),
            }
        }

        Err(IndexError::Snapshot(format!(
            "commit files kept changing after {} attempts (last missing: {:?})",
            attempts, last_missing
        )))
    }

    fn open_files(
        raw: &MmapDirectory,
        metas: &IndexMeta,
    ) -> Result<Vec<(PathBuf, FileSlice)>, OpenReadError> {
        let mut files = Vec::new();
        for segment in &metas.segments {
            let mut paths: Vec<PathBuf> = segment
                .list_files()
                .into_iter()
                .filter(|path| is_committed_component(path, segment.has_deletes()))
                .collect();
            paths.sort();
            for path in paths {
                let slice = raw.open_read(&path)?;
                files.push((path, slice));
            }
        }
        Ok(files)
    }

    /// Opstamp of the pinned commit
    pub fn opstamp(&self) -> u64 {
        self.metas.opstamp
    }

    /// Exactly the files referenced by the pinned commit
    pub fn file_names(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(Path::new(META_FILE)).chain(self.files.iter().map(|(path, _)| path.as_path()))
    }

    /// Copy the pinned commit into another storage folder
    pub fn copy_to(&self, target: &Storage) -> IndexResult<usize> {
        for (path, slice) in &self.files {
            let bytes = slice.read_bytes()?;
            let name = path.to_string_lossy();
            target.write_file(&name, bytes.as_slice())?;
        }
        // Commit point last, so a half-copied target never looks complete
        let meta = serde_json::to_vec_pretty(&self.metas)?;
        target.atomic_write(META_FILE, &meta)?;
        Ok(self.files.len() + 1)
    }

    /// Drop the pinned files and let the writer collect what is now unused
    pub fn release(self, writer: &RwLock<IndexWriter>) -> IndexResult<()> {
        let opstamp = self.metas.opstamp;
        drop(self);

        let writer = writer.read();
        match writer.garbage_collect_files().wait() {
            Ok(result) => {
                debug!(
                    opstamp,
                    deleted = result.deleted_files.len(),
                    "Snapshot released"
                );
                Ok(())
            }
            Err(e) => Err(IndexError::Snapshot(format!(
                "unused file cleanup after releasing commit {} failed: {}",
                opstamp, e
            ))),
        }
    }
}

/// Temp doc stores never belong to a commit; delete files only when the
/// segment records deletions.
fn is_committed_component(path: &Path, has_deletes: bool) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("temp") => false,
        Some("del") => has_deletes,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_committed_components() {
        assert!(is_committed_component(Path::new("abc.idx"), false));
        assert!(!is_committed_component(Path::new("abc.store.temp"), false));
        assert!(!is_committed_component(Path::new("abc.12.del"), false));
        assert!(is_committed_component(Path::new("abc.12.del"), true));
    }
}
