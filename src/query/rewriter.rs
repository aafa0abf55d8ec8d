//! Recursive query rewriting

use crate::error::{IndexError, IndexResult};
use crate::query::node::{
    BooleanClause, BooleanQuery, ConstantScoreQuery, DisjunctionMaxQuery, QueryNode,
};
use crate::query::preprocessor::{IdentityPreprocessor, QueryPreprocessor};
use std::sync::Arc;

/// Walks a query tree, rebuilding composites and delegating leaves.
///
/// Composite nodes keep their kind, arity, child order, occurrences and
/// tie-break multiplier. Only the preprocessor decides what happens to a
/// leaf. `Foreign` nodes fail with `UnsupportedQueryNode`.
#[derive(Clone)]
pub struct QueryRewriter {
    preprocessor: Arc<dyn QueryPreprocessor>,
}

impl QueryRewriter {
    pub fn new(preprocessor: impl QueryPreprocessor + 'static) -> Self {
        Self {
            preprocessor: Arc::new(preprocessor),
        }
    }

    /// Rewriter that returns every tree unchanged (still validating it)
    pub fn identity() -> Self {
        Self::new(IdentityPreprocessor)
    }

    pub fn rewrite(&self, query: &QueryNode) -> IndexResult<QueryNode> {
        self.visit(query.clone())
    }

    fn visit(&self, query: QueryNode) -> IndexResult<QueryNode> {
        let preprocessor = self.preprocessor.as_ref();

        match query {
            QueryNode::Boolean(boolean) => {
                let clauses = boolean
                    .clauses
                    .into_iter()
                    .map(|clause| {
                        Ok(BooleanClause {
                            query: self.visit(clause.query)?,
                            occur: clause.occur,
                        })
                    })
                    .collect::<IndexResult<Vec<_>>>()?;
                Ok(QueryNode::Boolean(BooleanQuery { clauses }))
            }
            QueryNode::ConstantScore(constant) => match constant.inner {
                Some(inner) => Ok(QueryNode::ConstantScore(ConstantScoreQuery {
                    inner: Some(Box::new(self.visit(*inner)?)),
                })),
                None => Err(IndexError::UnsupportedQueryNode(
                    "constant_score without an inner query".to_string(),
                )),
            },
            QueryNode::DisjunctionMax(dismax) => {
                let subqueries = dismax
                    .subqueries
                    .into_iter()
                    .map(|subquery| self.visit(subquery))
                    .collect::<IndexResult<Vec<_>>>()?;
                Ok(QueryNode::DisjunctionMax(DisjunctionMaxQuery {
                    subqueries,
                    tie_break: dismax.tie_break,
                }))
            }
            QueryNode::Term(leaf) => Ok(preprocessor.process_term(leaf)),
            QueryNode::Wildcard(leaf) => Ok(preprocessor.process_wildcard(leaf)),
            QueryNode::Phrase(leaf) => Ok(preprocessor.process_phrase(leaf)),
            QueryNode::Prefix(leaf) => Ok(preprocessor.process_prefix(leaf)),
            QueryNode::MultiPhrase(leaf) => Ok(preprocessor.process_multi_phrase(leaf)),
            QueryNode::Fuzzy(leaf) => Ok(preprocessor.process_fuzzy(leaf)),
            QueryNode::Regexp(leaf) => Ok(preprocessor.process_regexp(leaf)),
            QueryNode::TermRange(leaf) => Ok(preprocessor.process_term_range(leaf)),
            QueryNode::MatchAllDocs => Ok(preprocessor.process_match_all()),
            QueryNode::Foreign(foreign) => Err(IndexError::UnsupportedQueryNode(foreign.name)),
        }
    }
}

impl Default for QueryRewriter {
    fn default() -> Self {
        Self::identity()
    }
}
