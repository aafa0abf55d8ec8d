//! Registry of named partitions sharing one root folder

use crate::archive;
use crate::config::{BackupFormat, IndexConfig};
use crate::error::{IndexError, IndexResult};
use crate::partition::{Partition, Storage};
use crate::teardown::Teardown;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// A set of independent partitions, one subfolder of the root each.
///
/// Partitions are created on first request and at most one instance exists
/// per name for the lifetime of the registry.
pub struct PartitionedIndex {
    root: PathBuf,
    config: Arc<IndexConfig>,
    partitions: DashMap<String, Arc<Partition>>,
    /// Backing folder of a temporary registry, removed after the partitions close
    _scratch: Option<TempDir>,
}

impl PartitionedIndex {
    /// Open a registry rooted at a folder, picking up partitions already there
    pub fn open(root: impl Into<PathBuf>) -> IndexResult<Self> {
        Self::with_config(IndexConfig {
            root_path: Some(root.into()),
            ..IndexConfig::default()
        })
    }

    /// A throwaway registry whose storage disappears when it is dropped
    pub fn in_memory() -> IndexResult<Self> {
        Self::with_config(IndexConfig::default())
    }

    pub fn with_config(config: IndexConfig) -> IndexResult<Self> {
        config.validate()?;

        let (root, scratch) = match &config.root_path {
            Some(root) => (root.clone(), None),
            None => {
                let scratch = tempfile::Builder::new()
                    .prefix("partitioned-index-")
                    .tempdir()?;
                (scratch.path().to_path_buf(), Some(scratch))
            }
        };
        fs::create_dir_all(&root)?;

        let registry = Self {
            root,
            config: Arc::new(config),
            partitions: DashMap::new(),
            _scratch: scratch,
        };
        registry.discover()?;

        info!(
            root = %registry.root.display(),
            partitions = registry.partitions.len(),
            "Partitioned index opened"
        );
        Ok(registry)
    }

    /// Register every existing partition folder under the root, unopened
    fn discover(&self) -> IndexResult<()> {
        for name in child_directories(&self.root)? {
            if validate_name(&name).is_ok() {
                self.partition(&name)?;
            } else {
                debug!(folder = %name, "Skipping folder that is not a partition name");
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Get the partition with this name, creating it on first use.
    ///
    /// Concurrent callers for the same name all receive the same instance.
    pub fn partition(&self, name: &str) -> IndexResult<Arc<Partition>> {
        if let Some(partition) = self.partitions.get(name) {
            return Ok(partition.value().clone());
        }
        validate_name(name)?;

        match self.partitions.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let storage = Storage::open(self.root.join(name))?;
                let partition = Arc::new(Partition::new(name, storage, self.config.clone()));
                entry.insert(partition.clone());
                debug!(partition = %name, "Partition registered");
                Ok(partition)
            }
        }
    }

    /// Look up a registered partition without creating it
    pub fn get(&self, name: &str) -> Option<Arc<Partition>> {
        self.partitions.get(name).map(|entry| entry.value().clone())
    }

    /// Point-in-time view of the registered partitions, ordered by name
    pub fn partitions(&self) -> BTreeMap<String, Arc<Partition>> {
        self.partitions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Close every partition and forget them.
    ///
    /// Every partition gets closed even if another one failed to; the first
    /// failure is returned.
    pub fn close(&self) -> IndexResult<()> {
        let partitions = self.partitions();
        let mut teardown = Teardown::new("registry close");
        for (name, partition) in &partitions {
            teardown = teardown.step(name, || partition.close());
        }
        self.partitions.clear();

        info!(partitions = partitions.len(), "Partitioned index closed");
        teardown.finish()
    }

    /// Empty every partition, close them and remove their folders
    pub fn delete_all(&self) -> IndexResult<()> {
        let partitions = self.partitions();
        for partition in partitions.values() {
            partition.delete_all()?;
        }
        self.close()?;

        for partition in partitions.values() {
            match fs::remove_dir_all(partition.storage().path()) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!(partitions = partitions.len(), "All partitions deleted");
        Ok(())
    }

    /// Back up every partition into `destination`.
    ///
    /// Each partition is copied from its own snapshot into a staging folder
    /// which is then packaged according to the configured [`BackupFormat`].
    /// The staging folder is removed even when packaging fails.
    pub fn backup(&self, destination: &Path) -> IndexResult<usize> {
        let staging = tempfile::Builder::new()
            .prefix("partitioned-index-backup-")
            .tempdir()?;

        let packaged = self.stage_and_package(staging.path(), destination);
        let cleanup = Teardown::new("registry backup")
            .step("remove staging", || Ok(staging.close()?))
            .finish();

        let count = packaged?;
        cleanup?;
        info!(
            destination = %destination.display(),
            format = ?self.config.backup_format,
            partitions = count,
            "Partitioned index backed up"
        );
        Ok(count)
    }

    fn stage_and_package(&self, staging: &Path, destination: &Path) -> IndexResult<usize> {
        let partitions = self.partitions();
        for (name, partition) in &partitions {
            partition.backup(&staging.join(name))?;
        }

        match self.config.backup_format {
            BackupFormat::Zip => {
                archive::zip_directory(staging, destination)?;
            }
            BackupFormat::Directory => copy_tree(staging, destination)?,
        }
        Ok(partitions.len())
    }

    /// Replace every partition with the content of a backup.
    ///
    /// `source` is either a zip archive or an expanded backup folder. Every
    /// existing partition is deleted first; partitions absent from the
    /// backup are gone afterwards.
    pub fn restore(&self, source: &Path) -> IndexResult<usize> {
        let unpacked = if source.is_file() {
            let unpacked = tempfile::Builder::new()
                .prefix("partitioned-index-restore-")
                .tempdir()?;
            archive::unzip(source, unpacked.path())?;
            Some(unpacked)
        } else if source.is_dir() {
            None
        } else {
            return Err(IndexError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("backup {} does not exist", source.display()),
            )));
        };
        let root = unpacked
            .as_ref()
            .map_or_else(|| source.to_path_buf(), |dir| dir.path().to_path_buf());

        self.delete_all()?;

        let names = child_directories(&root)?;
        for name in &names {
            self.partition(name)?.restore(&root.join(name))?;
        }

        info!(
            source = %source.display(),
            partitions = names.len(),
            "Partitioned index restored"
        );
        Ok(names.len())
    }
}

/// A partition name must map onto exactly one folder under the root
fn validate_name(name: &str) -> IndexResult<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if name.is_empty() || !single_normal || name.contains(['/', '\\']) {
        return Err(IndexError::InvalidPartitionName(name.to_string()));
    }
    Ok(())
}

fn child_directories(root: &Path) -> IndexResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Copy a staged backup tree, replacing whatever was at `destination`
fn copy_tree(staging: &Path, destination: &Path) -> IndexResult<()> {
    if destination.exists() {
        fs::remove_dir_all(destination)?;
    }
    fs::create_dir_all(destination)?;

    for name in child_directories(staging)? {
        let source = Storage::existing(staging.join(&name))?;
        let target = Storage::open(destination.join(&name))?;
        for file in source.list_files()? {
            source.copy_file(&file, &target)?;
        }
    }
    Ok(())
}
