//! Leaf transformations applied by the query rewriter

use crate::query::node::{
    FuzzyQuery, MultiPhraseQuery, PhraseAlternatives, PhraseQuery, PhraseTerm, PrefixQuery,
    QueryNode, RegexpQuery, TermQuery, TermRangeQuery, WildcardQuery,
};

/// One transformation per leaf kind.
///
/// Every method defaults to handing the leaf back unchanged, so an
/// implementation only overrides the kinds it cares about.
pub trait QueryPreprocessor: Send + Sync {
    fn process_term(&self, query: TermQuery) -> QueryNode {
        QueryNode::Term(query)
    }

    fn process_wildcard(&self, query: WildcardQuery) -> QueryNode {
        QueryNode::Wildcard(query)
    }

    fn process_phrase(&self, query: PhraseQuery) -> QueryNode {
        QueryNode::Phrase(query)
    }

    fn process_prefix(&self, query: PrefixQuery) -> QueryNode {
        QueryNode::Prefix(query)
    }

    fn process_multi_phrase(&self, query: MultiPhraseQuery) -> QueryNode {
        QueryNode::MultiPhrase(query)
    }

    fn process_fuzzy(&self, query: FuzzyQuery) -> QueryNode {
        QueryNode::Fuzzy(query)
    }

    fn process_regexp(&self, query: RegexpQuery) -> QueryNode {
        QueryNode::Regexp(query)
    }

    fn process_term_range(&self, query: TermRangeQuery) -> QueryNode {
        QueryNode::TermRange(query)
    }

    fn process_match_all(&self) -> QueryNode {
        QueryNode::MatchAllDocs
    }
}

/// Leaves every leaf as it is
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPreprocessor;

impl QueryPreprocessor for IdentityPreprocessor {}

/// Lowercases literal text, keeping every structural field.
///
/// Regular expressions stay untouched: their pattern decides case handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowerCasingPreprocessor;

impl QueryPreprocessor for LowerCasingPreprocessor {
    fn process_term(&self, query: TermQuery) -> QueryNode {
        QueryNode::Term(TermQuery {
            field: query.field,
            text: query.text.to_lowercase(),
        })
    }

    fn process_wildcard(&self, query: WildcardQuery) -> QueryNode {
        QueryNode::Wildcard(WildcardQuery {
            field: query.field,
            text: query.text.to_lowercase(),
        })
    }

    fn process_phrase(&self, query: PhraseQuery) -> QueryNode {
        QueryNode::Phrase(PhraseQuery {
            field: query.field,
            terms: query
                .terms
                .into_iter()
                .map(|term| PhraseTerm {
                    text: term.text.to_lowercase(),
                    position: term.position,
                })
                .collect(),
            slop: query.slop,
        })
    }

    fn process_prefix(&self, query: PrefixQuery) -> QueryNode {
        QueryNode::Prefix(PrefixQuery {
            field: query.field,
            text: query.text.to_lowercase(),
        })
    }

    fn process_multi_phrase(&self, query: MultiPhraseQuery) -> QueryNode {
        QueryNode::MultiPhrase(MultiPhraseQuery {
            field: query.field,
            positions: query
                .positions
                .into_iter()
                .map(|slot| PhraseAlternatives {
                    alternatives: slot
                        .alternatives
                        .iter()
                        .map(|text| text.to_lowercase())
                        .collect(),
                    position: slot.position,
                })
                .collect(),
            slop: query.slop,
        })
    }

    fn process_fuzzy(&self, query: FuzzyQuery) -> QueryNode {
        QueryNode::Fuzzy(FuzzyQuery {
            field: query.field,
            text: query.text.to_lowercase(),
            max_edits: query.max_edits,
            prefix_length: query.prefix_length,
        })
    }

    fn process_term_range(&self, query: TermRangeQuery) -> QueryNode {
        QueryNode::TermRange(TermRangeQuery {
            field: query.field,
            lower: query.lower.map(|bound| bound.to_lowercase()),
            upper: query.upper.map(|bound| bound.to_lowercase()),
            include_lower: query.include_lower,
            include_upper: query.include_upper,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_identity_returns_leaf_unchanged() {
        let leaf = TermQuery {
            field: "Name".to_string(),
            text: "Bob".to_string(),
        };
        assert_eq!(
            IdentityPreprocessor.process_term(leaf.clone()),
            QueryNode::Term(leaf)
        );
    }

    #[test]
    fn test_lowercasing_keeps_fuzzy_parameters() {
        let node = LowerCasingPreprocessor.process_fuzzy(FuzzyQuery {
            field: "Surname".to_string(),
            text: "SMITH".to_string(),
            max_edits: 2,
            prefix_length: 1,
        });
        assert_eq!(node, QueryNode::fuzzy("Surname", "smith", 2, 1));
    }

    #[test]
    fn test_lowercasing_multi_phrase_keeps_positions() {
        let node = LowerCasingPreprocessor.process_multi_phrase(MultiPhraseQuery {
            field: "body".to_string(),
            positions: vec![
                PhraseAlternatives {
                    alternatives: BTreeSet::from(["Quick".to_string(), "FAST".to_string()]),
                    position: 0,
                },
                PhraseAlternatives {
                    alternatives: BTreeSet::from(["Fox".to_string()]),
                    position: 2,
                },
            ],
            slop: 3,
        });

        match node {
            QueryNode::MultiPhrase(query) => {
                assert_eq!(query.slop, 3);
                assert_eq!(query.positions[0].position, 0);
                assert_eq!(query.positions[1].position, 2);
                assert_eq!(
                    query.positions[0].alternatives,
                    BTreeSet::from(["quick".to_string(), "fast".to_string()])
                );
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_lowercasing_range_keeps_open_bounds() {
        let node = LowerCasingPreprocessor.process_term_range(TermRangeQuery {
            field: "Name".to_string(),
            lower: None,
            upper: Some("M".to_string()),
            include_lower: false,
            include_upper: true,
        });
        assert_eq!(
            node,
            QueryNode::term_range("Name", None, Some("m"), false, true)
        );
    }

    #[test]
    fn test_lowercasing_leaves_regexp_alone() {
        let leaf = RegexpQuery {
            field: "code".to_string(),
            text: "[A-Z]+".to_string(),
        };
        assert_eq!(
            LowerCasingPreprocessor.process_regexp(leaf.clone()),
            QueryNode::Regexp(leaf)
        );
    }
}
