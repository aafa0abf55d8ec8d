use crate::document::{Document, SchemaFields};
use crate::error::IndexResult;
use crate::query::{QueryNode, QueryTranslator};
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::{DocAddress, Searcher, TantivyDocument};

/// A pooled, point-in-time view of one partition.
///
/// Every call sees the commit that was current when the searcher was
/// handed out, regardless of flushes happening meanwhile.
pub struct PartitionSearcher<'a> {
    searcher: Searcher,
    fields: SchemaFields,
    translator: &'a QueryTranslator,
    max_results: usize,
}

impl<'a> PartitionSearcher<'a> {
    pub(crate) fn new(
        searcher: Searcher,
        fields: SchemaFields,
        translator: &'a QueryTranslator,
        max_results: usize,
    ) -> Self {
        Self {
            searcher,
            fields,
            translator,
            max_results,
        }
    }

    /// Number of documents matching the query
    pub fn count(&self, query: &QueryNode) -> IndexResult<usize> {
        let query = self.translator.translate(query)?;
        Ok(self.searcher.search(&*query, &Count)?)
    }

    /// Best scoring matches, capped at the configured result limit
    pub fn top(&self, query: &QueryNode, limit: usize) -> IndexResult<Vec<Document>> {
        let limit = limit.min(self.max_results);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query = self.translator.translate(query)?;
        let hits = self.searcher.search(&*query, &TopDocs::with_limit(limit))?;
        hits.into_iter()
            .map(|(_score, address)| self.load(address))
            .collect()
    }

    /// Every match, in no particular order
    pub fn documents(&self, query: &QueryNode) -> IndexResult<Vec<Document>> {
        let query = self.translator.translate(query)?;
        let mut addresses: Vec<DocAddress> = self
            .searcher
            .search(&*query, &DocSetCollector)?
            .into_iter()
            .collect();
        addresses.sort();
        addresses.into_iter().map(|address| self.load(address)).collect()
    }

    /// Live documents in the pinned commit
    pub fn num_docs(&self) -> u64 {
        self.searcher.num_docs()
    }

    fn load(&self, address: DocAddress) -> IndexResult<Document> {
        let doc: TantivyDocument = self.searcher.doc(address)?;
        self.fields.from_tantivy_doc(&doc)
    }
}
