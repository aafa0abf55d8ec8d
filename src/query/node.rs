//! Query tree consumed by the rewriter and the engine binding

use crate::document::RECORD_KEY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Clause requirement inside a boolean query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BooleanClause {
    pub query: QueryNode,
    pub occur: Occur,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BooleanQuery {
    pub clauses: Vec<BooleanClause>,
}

/// Wraps one query and scores every match identically.
///
/// `inner` is optional because upstream parsers may hand over a
/// filter-backed constant score query with no query inside; such a node
/// cannot be rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstantScoreQuery {
    pub inner: Option<Box<QueryNode>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisjunctionMaxQuery {
    pub subqueries: Vec<QueryNode>,
    pub tie_break: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermQuery {
    pub field: String,
    pub text: String,
}

/// `*` matches any run of characters, `?` exactly one, `\` escapes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WildcardQuery {
    pub field: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhraseTerm {
    pub text: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhraseQuery {
    pub field: String,
    pub terms: Vec<PhraseTerm>,
    pub slop: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrefixQuery {
    pub field: String,
    pub text: String,
}

/// One phrase slot that accepts any of several terms
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhraseAlternatives {
    pub alternatives: BTreeSet<String>,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MultiPhraseQuery {
    pub field: String,
    pub positions: Vec<PhraseAlternatives>,
    pub slop: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FuzzyQuery {
    pub field: String,
    pub text: String,
    pub max_edits: u32,
    pub prefix_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegexpQuery {
    pub field: String,
    pub text: String,
}

/// Range over the terms of one field; a `None` bound is open
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TermRangeQuery {
    pub field: String,
    pub lower: Option<String>,
    pub upper: Option<String>,
    pub include_lower: bool,
    pub include_upper: bool,
}

/// A node produced upstream whose kind has no counterpart here
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignQuery {
    pub name: String,
}

/// A node of the query tree.
///
/// The first eleven variants are the closed set the rewriter and the engine
/// binding understand. `Foreign` carries anything else a caller managed to
/// build; both the rewriter and the engine reject it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryNode {
    Boolean(BooleanQuery),
    ConstantScore(ConstantScoreQuery),
    DisjunctionMax(DisjunctionMaxQuery),
    Term(TermQuery),
    Wildcard(WildcardQuery),
    Phrase(PhraseQuery),
    Prefix(PrefixQuery),
    MultiPhrase(MultiPhraseQuery),
    Fuzzy(FuzzyQuery),
    Regexp(RegexpQuery),
    TermRange(TermRangeQuery),
    MatchAllDocs,
    Foreign(ForeignQuery),
}

impl QueryNode {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        QueryNode::Term(TermQuery {
            field: field.into(),
            text: text.into(),
        })
    }

    pub fn wildcard(field: impl Into<String>, text: impl Into<String>) -> Self {
        QueryNode::Wildcard(WildcardQuery {
            field: field.into(),
            text: text.into(),
        })
    }

    pub fn prefix(field: impl Into<String>, text: impl Into<String>) -> Self {
        QueryNode::Prefix(PrefixQuery {
            field: field.into(),
            text: text.into(),
        })
    }

    pub fn regexp(field: impl Into<String>, text: impl Into<String>) -> Self {
        QueryNode::Regexp(RegexpQuery {
            field: field.into(),
            text: text.into(),
        })
    }

    pub fn fuzzy(
        field: impl Into<String>,
        text: impl Into<String>,
        max_edits: u32,
        prefix_length: usize,
    ) -> Self {
        QueryNode::Fuzzy(FuzzyQuery {
            field: field.into(),
            text: text.into(),
            max_edits,
            prefix_length,
        })
    }

    /// Phrase with consecutive positions starting at 0
    pub fn phrase<I, S>(field: impl Into<String>, words: I, slop: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryNode::Phrase(PhraseQuery {
            field: field.into(),
            terms: words
                .into_iter()
                .enumerate()
                .map(|(position, text)| PhraseTerm {
                    text: text.into(),
                    position,
                })
                .collect(),
            slop,
        })
    }

    pub fn term_range(
        field: impl Into<String>,
        lower: Option<&str>,
        upper: Option<&str>,
        include_lower: bool,
        include_upper: bool,
    ) -> Self {
        QueryNode::TermRange(TermRangeQuery {
            field: field.into(),
            lower: lower.map(str::to_string),
            upper: upper.map(str::to_string),
            include_lower,
            include_upper,
        })
    }

    pub fn constant_score(inner: QueryNode) -> Self {
        QueryNode::ConstantScore(ConstantScoreQuery {
            inner: Some(Box::new(inner)),
        })
    }

    pub fn disjunction_max(subqueries: Vec<QueryNode>, tie_break: f32) -> Self {
        QueryNode::DisjunctionMax(DisjunctionMaxQuery {
            subqueries,
            tie_break,
        })
    }

    pub fn boolean(clauses: Vec<(QueryNode, Occur)>) -> Self {
        QueryNode::Boolean(BooleanQuery {
            clauses: clauses
                .into_iter()
                .map(|(query, occur)| BooleanClause { query, occur })
                .collect(),
        })
    }

    /// Scope a search to documents of one record type
    pub fn record_type(name: impl Into<String>) -> Self {
        QueryNode::term(RECORD_KEY, name)
    }

    /// Human-readable kind, used in error messages and logs
    pub fn kind(&self) -> &str {
        match self {
            QueryNode::Boolean(_) => "boolean",
            QueryNode::ConstantScore(_) => "constant_score",
            QueryNode::DisjunctionMax(_) => "disjunction_max",
            QueryNode::Term(_) => "term",
            QueryNode::Wildcard(_) => "wildcard",
            QueryNode::Phrase(_) => "phrase",
            QueryNode::Prefix(_) => "prefix",
            QueryNode::MultiPhrase(_) => "multi_phrase",
            QueryNode::Fuzzy(_) => "fuzzy",
            QueryNode::Regexp(_) => "regexp",
            QueryNode::TermRange(_) => "term_range",
            QueryNode::MatchAllDocs => "match_all_docs",
            QueryNode::Foreign(foreign) => &foreign.name,
        }
    }
}
