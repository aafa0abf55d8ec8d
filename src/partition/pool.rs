//! Reader pool handing out point-in-time searchers

use crate::error::IndexResult;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tantivy::{Index, IndexReader, ReloadPolicy, Searcher};

/// Supplies pooled, point-in-time searchers.
///
/// Searchers are cheap clones of the reader's current generation; dropping
/// one returns it to the pool. After a commit the owner calls
/// [`ReaderPool::mark_as_dirty`] and every [`ReaderPool::searcher`] call
/// that starts afterwards sees the new commit.
pub struct ReaderPool {
    reader: IndexReader,
    /// Bumped on every commit
    requested: AtomicU64,
    /// Highest `requested` value a finished reload covers
    loaded: AtomicU64,
    reload_lock: Mutex<()>,
}

impl ReaderPool {
    pub fn open(index: &Index) -> IndexResult<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            reader,
            requested: AtomicU64::new(0),
            loaded: AtomicU64::new(0),
            reload_lock: Mutex::new(()),
        })
    }

    pub fn searcher(&self) -> IndexResult<Searcher> {
        let wanted = self.requested.load(Ordering::Acquire);
        if self.loaded.load(Ordering::Acquire) < wanted {
            // Callers arriving mid-reload wait for it instead of taking the old generation
            let _reloading = self.reload_lock.lock();
            if self.loaded.load(Ordering::Acquire) < wanted {
                self.reader.reload()?;
                self.loaded.fetch_max(wanted, Ordering::AcqRel);
            }
        }
        Ok(self.reader.searcher())
    }

    pub fn mark_as_dirty(&self) {
        self.requested.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_dirty(&self) -> bool {
        self.loaded.load(Ordering::Acquire) < self.requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::register_tokenizers;
    use crate::document::{build_schema, Document, SchemaFields};
    use tantivy::IndexWriter;

    #[test]
    fn test_dirty_pool_sees_new_commit() {
        let index = Index::create_in_ram(build_schema(false));
        register_tokenizers(&index);
        let fields = SchemaFields::resolve(&index.schema()).unwrap();
        let pool = ReaderPool::open(&index).unwrap();
        let mut writer: IndexWriter = index.writer_with_num_threads(1, 15_000_000).unwrap();

        writer
            .add_document(fields.to_tantivy_doc(&Document::of_type("t")).unwrap())
            .unwrap();
        writer.commit().unwrap();

        assert_eq!(pool.searcher().unwrap().num_docs(), 0);
        pool.mark_as_dirty();
        assert!(pool.is_dirty());
        assert_eq!(pool.searcher().unwrap().num_docs(), 1);
        assert!(!pool.is_dirty());
    }

    #[test]
    fn test_concurrent_searchers_after_commit_see_it() {
        let index = Index::create_in_ram(build_schema(false));
        register_tokenizers(&index);
        let fields = SchemaFields::resolve(&index.schema()).unwrap();
        let pool = ReaderPool::open(&index).unwrap();
        let mut writer: IndexWriter = index.writer_with_num_threads(1, 15_000_000).unwrap();

        for round in 1..=5u64 {
            writer
                .add_document(fields.to_tantivy_doc(&Document::of_type("t")).unwrap())
                .unwrap();
            writer.commit().unwrap();
            pool.mark_as_dirty();

            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8)
                    .map(|_| scope.spawn(|| pool.searcher().unwrap().num_docs()))
                    .collect();
                for handle in handles {
                    assert_eq!(handle.join().unwrap(), round);
                }
            });
            assert!(!pool.is_dirty());
        }
    }
}
