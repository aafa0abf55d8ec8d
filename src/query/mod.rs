//! Query trees, rewriting and engine translation
//!
//! Callers hand in already-parsed trees built from a fixed set of eleven
//! node kinds. [`QueryRewriter`] normalizes a tree (for instance lowercasing
//! every literal for case-insensitive matching) without touching its shape;
//! [`QueryTranslator`] turns the result into a tantivy query.
//!
//! ```no_run
//! use partitioned_index::query::{LowerCasingPreprocessor, Occur, QueryNode, QueryRewriter};
//!
//! let rewriter = QueryRewriter::new(LowerCasingPreprocessor);
//! let query = QueryNode::boolean(vec![
//!     (QueryNode::term("Name", "Bob"), Occur::Must),
//!     (QueryNode::prefix("City", "Lon"), Occur::Should),
//! ]);
//! let normalized = rewriter.rewrite(&query).unwrap();
//! ```

mod node;
mod preprocessor;
mod rewriter;
mod translate;

pub use node::{
    BooleanClause, BooleanQuery, ConstantScoreQuery, DisjunctionMaxQuery, ForeignQuery,
    FuzzyQuery, MultiPhraseQuery, Occur, PhraseAlternatives, PhraseQuery, PhraseTerm,
    PrefixQuery, QueryNode, RegexpQuery, TermQuery, TermRangeQuery, WildcardQuery,
};
pub use preprocessor::{IdentityPreprocessor, LowerCasingPreprocessor, QueryPreprocessor};
pub use rewriter::QueryRewriter;
pub use translate::{wildcard_to_regex, QueryTranslator, MAX_FUZZY_EDITS, MAX_PHRASE_EXPANSIONS};
