//! Partition lifecycle
//!
//! A [`Partition`] is one standalone index with its own storage folder and a
//! single long-lived writer. It is activated lazily on first access, can be
//! closed and transparently reopened, and supports point-in-time backup and
//! restore of its committed files.
//!
//! Activation, [`Partition::fix`], [`Partition::restore`] and
//! [`Partition::delete_all`] are serialized by one instance lock. Adds,
//! deletes and flushes go straight to the writer, which serializes them
//! itself; searches never wait on the instance lock.

mod integrity;
mod pool;
mod searcher;
mod snapshot;
mod storage;

pub use integrity::IntegrityStatus;
pub use pool::ReaderPool;
pub use searcher::PartitionSearcher;
pub use snapshot::Snapshot;
pub use storage::{Storage, MANAGED_FILE, META_FILE, WRITER_LOCK_FILE};

use crate::analysis::register_tokenizers;
use crate::config::IndexConfig;
use crate::document::{build_schema, Document, SchemaFields, FIELDS_FIELD};
use crate::error::{IndexError, IndexResult};
use crate::query::{QueryNode, QueryTranslator};
use crate::teardown::Teardown;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tantivy::indexer::UserOperation;
use tantivy::{Index, IndexSettings, IndexWriter};
use tracing::{debug, info, warn};

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartitionState {
    Uninitialized,
    Open,
    Closed,
}

enum Lifecycle {
    Uninitialized,
    Open(Arc<OpenIndex>),
    Closed,
}

/// Everything that lives exactly as long as one writer activation
struct OpenIndex {
    index: Index,
    fields: SchemaFields,
    writer: RwLock<IndexWriter>,
    pool: ReaderPool,
    translator: QueryTranslator,
}

impl OpenIndex {
    fn searcher(&self, max_results: usize) -> IndexResult<PartitionSearcher<'_>> {
        Ok(PartitionSearcher::new(
            self.pool.searcher()?,
            self.fields,
            &self.translator,
            max_results,
        ))
    }

    fn commit(&self) -> IndexResult<u64> {
        let mut writer = self.writer.write();
        let opstamp = writer.commit()?;
        self.pool.mark_as_dirty();
        Ok(opstamp)
    }
}

/// One independent document index
pub struct Partition {
    name: String,
    storage: Storage,
    config: Arc<IndexConfig>,
    instance_lock: Mutex<()>,
    state: RwLock<Lifecycle>,
    generation: AtomicU64,
}

impl Partition {
    /// Bind a partition to its storage folder. Nothing is opened until first use.
    pub fn new(name: impl Into<String>, storage: Storage, config: Arc<IndexConfig>) -> Self {
        Self {
            name: name.into(),
            storage,
            config,
            instance_lock: Mutex::new(()),
            state: RwLock::new(Lifecycle::Uninitialized),
            generation: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn state(&self) -> PartitionState {
        match &*self.state.read() {
            Lifecycle::Uninitialized => PartitionState::Uninitialized,
            Lifecycle::Open(_) => PartitionState::Open,
            Lifecycle::Closed => PartitionState::Closed,
        }
    }

    /// Number of writer activations so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn current(&self) -> Option<Arc<OpenIndex>> {
        match &*self.state.read() {
            Lifecycle::Open(open) => Some(open.clone()),
            _ => None,
        }
    }

    fn open_index(&self) -> IndexResult<Arc<OpenIndex>> {
        if let Some(open) = self.current() {
            return Ok(open);
        }
        let _guard = self.instance_lock.lock();
        self.open_index_locked()
    }

    /// Caller holds the instance lock
    fn open_index_locked(&self) -> IndexResult<Arc<OpenIndex>> {
        if let Some(open) = self.current() {
            return Ok(open);
        }
        let open = Arc::new(self.activate()?);
        *self.state.write() = Lifecycle::Open(open.clone());
        Ok(open)
    }

    fn activate(&self) -> IndexResult<OpenIndex> {
        let directory = self.storage.directory()?;
        let index = if self.storage.has_index() {
            Index::open(directory)?
        } else {
            Index::create(
                directory,
                build_schema(self.config.case_insensitive),
                IndexSettings::default(),
            )?
        };
        register_tokenizers(&index);

        let fields = SchemaFields::resolve(&index.schema())?;
        let writer: IndexWriter =
            index.writer_with_num_threads(self.config.indexing_threads, self.config.writer_heap_size)?;
        let pool = ReaderPool::open(&index)?;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(
            partition = %self.name,
            storage = %self.storage.path().display(),
            generation,
            "Partition activated"
        );

        Ok(OpenIndex {
            index,
            fields,
            writer: RwLock::new(writer),
            pool,
            translator: QueryTranslator::new(fields.fields, FIELDS_FIELD),
        })
    }

    /// Append a batch of documents as one unit.
    ///
    /// The batch becomes searchable after the next [`Partition::flush`].
    pub fn add(&self, documents: &[Document]) -> IndexResult<usize> {
        let open = self.open_index()?;
        let operations = documents
            .iter()
            .map(|document| Ok(UserOperation::Add(open.fields.to_tantivy_doc(document)?)))
            .collect::<IndexResult<Vec<_>>>()?;

        open.writer.read().run(operations)?;
        debug!(partition = %self.name, count = documents.len(), "Documents added");
        Ok(documents.len())
    }

    /// Delete the matches of a query and return how many there were.
    ///
    /// The count is taken against the last commit, before the delete is queued.
    pub fn delete(&self, query: &QueryNode) -> IndexResult<usize> {
        let open = self.open_index()?;
        let count = open.searcher(self.config.max_results)?.count(query)?;
        Self::queue_delete(&open, query)?;
        debug!(partition = %self.name, count, "Documents deleted");
        Ok(count)
    }

    pub fn delete_no_count(&self, query: &QueryNode) -> IndexResult<()> {
        let open = self.open_index()?;
        Self::queue_delete(&open, query)
    }

    fn queue_delete(open: &OpenIndex, query: &QueryNode) -> IndexResult<()> {
        let query = open.translator.translate(query)?;
        open.writer.read().delete_query(query)?;
        Ok(())
    }

    /// Commit pending changes and expose them to subsequent searches
    pub fn flush(&self) -> IndexResult<()> {
        let open = self.open_index()?;
        let opstamp = open.commit()?;
        debug!(partition = %self.name, opstamp, "Partition flushed");
        Ok(())
    }

    /// Run a function against a pooled searcher.
    ///
    /// The searcher goes back to the pool when the function returns, whether
    /// it succeeded or not.
    pub fn search<F, R>(&self, f: F) -> IndexResult<R>
    where
        F: FnOnce(&PartitionSearcher<'_>) -> IndexResult<R>,
    {
        let open = self.open_index()?;
        let searcher = open.searcher(self.config.max_results)?;
        f(&searcher)
    }

    pub fn count(&self, query: &QueryNode) -> IndexResult<usize> {
        self.search(|searcher| searcher.count(query))
    }

    pub fn documents(&self, query: &QueryNode) -> IndexResult<Vec<Document>> {
        self.search(|searcher| searcher.documents(query))
    }

    /// Read-only integrity diagnostic over the committed files
    pub fn check(&self) -> IndexResult<IntegrityStatus> {
        integrity::check(&self.storage)
    }

    /// Repair the storage by dropping damaged segments from the commit point.
    ///
    /// The writer is closed first; the next access reopens it on the repaired
    /// commit. Fails with a consistency error when damage remains.
    pub fn fix(&self) -> IndexResult<IntegrityStatus> {
        let _guard = self.instance_lock.lock();

        let status = integrity::check(&self.storage)?;
        if status.clean {
            return Ok(status);
        }

        self.close()?;
        let dropped = integrity::repair(&self.storage, &status)?;
        info!(partition = %self.name, dropped_segments = dropped, "Partition fixed");

        let after = integrity::check(&self.storage)?;
        if !after.clean {
            return Err(IndexError::Consistency(format!(
                "partition {} still has {} corrupted and {} missing files after fix",
                self.name,
                after.corrupted_files.len(),
                after.missing_files.len()
            )));
        }
        Ok(after)
    }

    /// Copy the files of the last commit into `target`.
    ///
    /// Concurrent adds and flushes keep running; the copied file set is the
    /// commit pinned when the snapshot was taken.
    pub fn backup(&self, target: &Path) -> IndexResult<usize> {
        let open = self.open_index()?;
        if target.exists() {
            fs::remove_dir_all(target)?;
        }
        let target = Storage::open(target)?;

        let snapshot = Snapshot::acquire(
            &open.index,
            &self.storage,
            &open.writer,
            self.config.snapshot_attempts,
        )?;
        let opstamp = snapshot.opstamp();
        let copied = snapshot.copy_to(&target);

        // Release runs even when the copy failed; cleanup errors never fail the backup
        if let Err(e) = snapshot.release(&open.writer) {
            warn!(partition = %self.name, opstamp, error = %e, "Snapshot release failed");
        }

        let copied = copied?;
        info!(
            partition = %self.name,
            target = %target.path().display(),
            opstamp,
            files = copied,
            "Partition backed up"
        );
        Ok(copied)
    }

    /// Replace the whole content of this partition with the files in `source`
    pub fn restore(&self, source: &Path) -> IndexResult<usize> {
        let _guard = self.instance_lock.lock();
        let source = Storage::existing(source)?;

        self.open_index_locked()?;
        self.delete_all_locked()?;

        let mut restored = Vec::new();
        for name in source.list_files()? {
            if name == META_FILE || name.starts_with('.') {
                continue;
            }
            source.copy_file(&name, &self.storage)?;
            restored.push(name);
        }
        // Segment files the engine does not list as managed are never collected
        self.storage.write_managed_list(&restored)?;
        let mut copied = restored.len();
        if source.has_index() {
            source.copy_file(META_FILE, &self.storage)?;
            copied += 1;
        }

        self.close()?;
        info!(
            partition = %self.name,
            source = %source.path().display(),
            files = copied,
            "Partition restored"
        );
        Ok(copied)
    }

    /// Remove every document and every storage file.
    ///
    /// An open partition is emptied, committed and closed before its files
    /// go, so the writer never refers to deleted storage. A partition without
    /// a writer only loses its files. Calling it again is harmless.
    pub fn delete_all(&self) -> IndexResult<()> {
        let _guard = self.instance_lock.lock();
        self.delete_all_locked()
    }

    fn delete_all_locked(&self) -> IndexResult<()> {
        if let Some(open) = self.current() {
            open.writer.read().delete_all_documents()?;
            open.commit()?;
            drop(open);
            self.close()?;
        }

        let removed = self.storage.delete_all_files()?;
        if removed > 0 {
            info!(partition = %self.name, files = removed, "Partition emptied");
        }
        Ok(())
    }

    /// Release the writer and unlock the storage.
    ///
    /// Both steps always run. The partition reopens on next access.
    pub fn close(&self) -> IndexResult<()> {
        let open = {
            let mut state = self.state.write();
            match std::mem::replace(&mut *state, Lifecycle::Closed) {
                Lifecycle::Open(open) => open,
                previous => {
                    *state = previous;
                    return Ok(());
                }
            }
        };

        let result = Teardown::new(&self.name)
            .step("release writer", || release_writer(open))
            .step("unlock storage", || self.storage.unlock())
            .finish();

        info!(partition = %self.name, ok = result.is_ok(), "Partition closed");
        result
    }
}

fn release_writer(open: Arc<OpenIndex>) -> IndexResult<()> {
    match Arc::try_unwrap(open) {
        Ok(open) => {
            let OpenIndex { writer, .. } = open;
            writer.into_inner().wait_merging_threads()?;
            Ok(())
        }
        Err(shared) => {
            debug!(
                users = Arc::strong_count(&shared) - 1,
                "Writer still referenced by in-flight calls, dropping last handle later"
            );
            Ok(())
        }
    }
}

impl Drop for Partition {
    fn drop(&mut self) {
        if matches!(*self.state.get_mut(), Lifecycle::Open(_)) {
            let _ = self.close();
        }
    }
}
