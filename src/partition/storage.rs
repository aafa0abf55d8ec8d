//! Storage medium: one folder of segment files per partition

use crate::error::{IndexError, IndexResult};
use std::fs;
use std::path::{Path, PathBuf};
use tantivy::directory::error::LockError;
use tantivy::directory::{Lock, MmapDirectory};
use tantivy::Directory;

/// Commit point written by the engine
pub const META_FILE: &str = "meta.json";

/// Engine-maintained list of the files it may garbage collect
pub const MANAGED_FILE: &str = ".managed.json";

/// Lock file held by the single writer of a storage folder
pub const WRITER_LOCK_FILE: &str = ".tantivy-writer.lock";

/// A named folder holding one partition's segment files
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Open or create the folder
    pub fn open(path: impl Into<PathBuf>) -> IndexResult<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| {
            IndexError::Activation(format!(
                "Failed to create storage directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { path })
    }

    /// Open a folder that must already exist (restore sources)
    pub fn existing(path: impl Into<PathBuf>) -> IndexResult<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("storage directory {} does not exist", path.display()),
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether a commit point exists
    pub fn has_index(&self) -> bool {
        self.path.join(META_FILE).is_file()
    }

    /// Engine directory over this folder
    pub fn directory(&self) -> IndexResult<MmapDirectory> {
        Ok(MmapDirectory::open(&self.path)?)
    }

    /// Names of the regular files in the folder, sorted
    pub fn list_files(&self) -> IndexResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Copy one file into another storage folder under the same name
    pub fn copy_file(&self, name: &str, destination: &Storage) -> IndexResult<u64> {
        Ok(fs::copy(self.path.join(name), destination.path.join(name))?)
    }

    pub fn delete_file(&self, name: &str) -> IndexResult<()> {
        match fs::remove_file(self.path.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Physically delete every file in the folder
    pub fn delete_all_files(&self) -> IndexResult<usize> {
        let files = self.list_files()?;
        for name in &files {
            self.delete_file(name)?;
        }
        Ok(files.len())
    }

    /// Write a file so readers see either the old or the new content
    pub fn atomic_write(&self, name: &str, bytes: &[u8]) -> IndexResult<()> {
        let staged = self.path.join(format!("{}.partial", name));
        fs::write(&staged, bytes)?;
        fs::rename(&staged, self.path.join(name))?;
        Ok(())
    }

    /// Replace the engine's managed file list with `names`
    pub fn write_managed_list(&self, names: &[String]) -> IndexResult<()> {
        let mut bytes = serde_json::to_vec(names)?;
        bytes.push(b'\n');
        self.atomic_write(MANAGED_FILE, &bytes)
    }

    pub fn write_file(&self, name: &str, bytes: &[u8]) -> IndexResult<()> {
        Ok(fs::write(self.path.join(name), bytes)?)
    }

    /// Whether a live writer currently holds this folder
    pub fn is_locked(&self) -> IndexResult<bool> {
        if !self.path.join(WRITER_LOCK_FILE).exists() {
            return Ok(false);
        }
        let directory = self.directory()?;
        let probe = Lock {
            filepath: PathBuf::from(WRITER_LOCK_FILE),
            is_blocking: false,
        };
        match directory.acquire_lock(&probe) {
            Ok(_released_on_drop) => Ok(false),
            Err(LockError::LockBusy) => Ok(true),
            Err(other) => Err(IndexError::Activation(other.to_string())),
        }
    }

    /// Remove a stale writer lock. Fails if a live writer still holds it.
    pub fn unlock(&self) -> IndexResult<()> {
        if self.is_locked()? {
            return Err(IndexError::Activation(format!(
                "storage {} is still held by a writer",
                self.path.display()
            )));
        }
        self.delete_file(WRITER_LOCK_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_copy_delete() {
        let temp_dir = TempDir::new().unwrap();
        let source = Storage::open(temp_dir.path().join("a")).unwrap();
        let target = Storage::open(temp_dir.path().join("b")).unwrap();

        source.write_file("seg1.idx", b"one").unwrap();
        source.write_file("seg1.store", b"two").unwrap();
        assert_eq!(source.list_files().unwrap(), vec!["seg1.idx", "seg1.store"]);

        source.copy_file("seg1.idx", &target).unwrap();
        assert_eq!(target.list_files().unwrap(), vec!["seg1.idx"]);

        assert_eq!(source.delete_all_files().unwrap(), 2);
        assert!(source.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        storage.atomic_write(META_FILE, b"{}").unwrap();
        storage.atomic_write(META_FILE, b"{\"segments\":[]}").unwrap();

        assert!(storage.has_index());
        assert_eq!(storage.list_files().unwrap(), vec![META_FILE]);
    }

    #[test]
    fn test_fresh_storage_is_unlocked() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        assert!(!storage.is_locked().unwrap());
        assert!(storage.unlock().is_ok());
    }

    #[test]
    fn test_managed_list_is_a_json_array() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        storage
            .write_managed_list(&["a.idx".to_string(), "a.store".to_string()])
            .unwrap();

        let bytes = fs::read(temp_dir.path().join(MANAGED_FILE)).unwrap();
        let names: Vec<String> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(names, vec!["a.idx", "a.store"]);
        assert_eq!(storage.list_files().unwrap(), vec![MANAGED_FILE]);
    }

    #[test]
    fn test_missing_restore_source() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Storage::existing(temp_dir.path().join("nope")).is_err());
    }
}
