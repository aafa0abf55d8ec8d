//! Translation of query trees into tantivy queries

use crate::document::{encode_term, FIELD_SEPARATOR};
use crate::error::{IndexError, IndexResult};
use crate::query::node::{
    FuzzyQuery, MultiPhraseQuery, Occur, PhraseQuery, QueryNode, TermRangeQuery, WildcardQuery,
};
use std::ops::Bound;
use tantivy::query::{
    AllQuery, BooleanQuery, ConstScoreQuery, DisjunctionMaxQuery, EmptyQuery, FuzzyTermQuery,
    PhraseQuery as EnginePhraseQuery, Query, RangeQuery, RegexQuery, TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;

/// Largest phrase expansion a multi-phrase query may produce
pub const MAX_PHRASE_EXPANSIONS: usize = 1024;

/// Largest edit distance the engine builds automata for
pub const MAX_FUZZY_EDITS: u32 = 2;

/// Builds tantivy queries against the encoded `_fields` field
pub struct QueryTranslator {
    field: Field,
    field_name: String,
}

impl QueryTranslator {
    pub fn new(field: Field, field_name: impl Into<String>) -> Self {
        Self {
            field,
            field_name: field_name.into(),
        }
    }

    pub fn translate(&self, query: &QueryNode) -> IndexResult<Box<dyn Query>> {
        match query {
            QueryNode::Boolean(boolean) => {
                let clauses = boolean
                    .clauses
                    .iter()
                    .map(|clause| Ok((engine_occur(clause.occur), self.translate(&clause.query)?)))
                    .collect::<IndexResult<Vec<_>>>()?;
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
            QueryNode::ConstantScore(constant) => match &constant.inner {
                Some(inner) => Ok(Box::new(ConstScoreQuery::new(
                    self.translate(inner)?,
                    1.0,
                ))),
                None => Err(IndexError::InvalidQuery(
                    "constant_score without an inner query".to_string(),
                )),
            },
            QueryNode::DisjunctionMax(dismax) => {
                let disjuncts = dismax
                    .subqueries
                    .iter()
                    .map(|subquery| self.translate(subquery))
                    .collect::<IndexResult<Vec<_>>>()?;
                Ok(Box::new(DisjunctionMaxQuery::with_tie_breaker(
                    disjuncts,
                    dismax.tie_break,
                )))
            }
            QueryNode::Term(term) => Ok(self.term_query(&term.field, &term.text)),
            QueryNode::Wildcard(wildcard) => self.wildcard_query(wildcard),
            QueryNode::Phrase(phrase) => Ok(self.phrase_query(phrase)),
            QueryNode::Prefix(prefix) => self.regex_query(
                &prefix.field,
                &format!("{}.*", regex::escape(&prefix.text)),
            ),
            QueryNode::MultiPhrase(multi) => self.multi_phrase_query(multi),
            QueryNode::Fuzzy(fuzzy) => self.fuzzy_query(fuzzy),
            QueryNode::Regexp(regexp) => self.regex_query(&regexp.field, &regexp.text),
            QueryNode::TermRange(range) => Ok(self.range_query(range)),
            QueryNode::MatchAllDocs => Ok(Box::new(AllQuery)),
            QueryNode::Foreign(foreign) => {
                Err(IndexError::UnsupportedQueryNode(foreign.name.clone()))
            }
        }
    }

    fn term(&self, field: &str, text: &str) -> Term {
        Term::from_field_text(self.field, &encode_term(field, text))
    }

    fn term_query(&self, field: &str, text: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            self.term(field, text),
            IndexRecordOption::Basic,
        ))
    }

    /// Anchor a value pattern to one logical field
    fn regex_query(&self, field: &str, value_pattern: &str) -> IndexResult<Box<dyn Query>> {
        let pattern = format!(
            "(?s){}\\x{{{:x}}}(?:{})",
            regex::escape(field),
            FIELD_SEPARATOR as u32,
            value_pattern
        );
        let query = RegexQuery::from_pattern(&pattern, self.field)
            .map_err(|e| IndexError::InvalidQuery(format!("{}: {}", pattern, e)))?;
        Ok(Box::new(query))
    }

    fn wildcard_query(&self, wildcard: &WildcardQuery) -> IndexResult<Box<dyn Query>> {
        self.regex_query(&wildcard.field, &wildcard_to_regex(&wildcard.text))
    }

    fn phrase_query(&self, phrase: &PhraseQuery) -> Box<dyn Query> {
        let terms: Vec<(usize, Term)> = phrase
            .terms
            .iter()
            .map(|term| (term.position, self.term(&phrase.field, &term.text)))
            .collect();
        self.positioned_phrase(terms, phrase.slop)
    }

    fn positioned_phrase(&self, mut terms: Vec<(usize, Term)>, slop: u32) -> Box<dyn Query> {
        match terms.len() {
            0 => Box::new(EmptyQuery),
            1 => {
                let (_, term) = terms.remove(0);
                Box::new(TermQuery::new(term, IndexRecordOption::Basic))
            }
            _ => {
                let base = terms.iter().map(|(position, _)| *position).min().unwrap_or(0);
                let rebased = terms
                    .into_iter()
                    .map(|(position, term)| (position - base, term))
                    .collect();
                Box::new(EnginePhraseQuery::new_with_offset_and_slop(rebased, slop))
            }
        }
    }

    fn multi_phrase_query(&self, multi: &MultiPhraseQuery) -> IndexResult<Box<dyn Query>> {
        if multi.positions.iter().any(|slot| slot.alternatives.is_empty()) {
            return Ok(Box::new(EmptyQuery));
        }

        let expansions = multi
            .positions
            .iter()
            .try_fold(1usize, |acc, slot| acc.checked_mul(slot.alternatives.len()))
            .filter(|count| *count <= MAX_PHRASE_EXPANSIONS)
            .ok_or_else(|| {
                IndexError::InvalidQuery(format!(
                    "multi-phrase on {} expands beyond {} phrases",
                    multi.field, MAX_PHRASE_EXPANSIONS
                ))
            })?;

        let mut phrases: Vec<Vec<(usize, Term)>> = vec![Vec::new()];
        for slot in &multi.positions {
            let mut next = Vec::with_capacity(phrases.len() * slot.alternatives.len());
            for prefix in &phrases {
                for text in &slot.alternatives {
                    let mut phrase = prefix.clone();
                    phrase.push((slot.position, self.term(&multi.field, text)));
                    next.push(phrase);
                }
            }
            phrases = next;
        }
        debug_assert_eq!(phrases.len(), expansions);

        let clauses = phrases
            .into_iter()
            .map(|terms| (tantivy::query::Occur::Should, self.positioned_phrase(terms, multi.slop)))
            .collect();
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn fuzzy_query(&self, fuzzy: &FuzzyQuery) -> IndexResult<Box<dyn Query>> {
        if fuzzy.max_edits > MAX_FUZZY_EDITS {
            return Err(IndexError::InvalidQuery(format!(
                "fuzzy max_edits {} exceeds {}",
                fuzzy.max_edits, MAX_FUZZY_EDITS
            )));
        }

        let fuzzy_query: Box<dyn Query> = Box::new(FuzzyTermQuery::new(
            self.term(&fuzzy.field, &fuzzy.text),
            fuzzy.max_edits as u8,
            true,
        ));
        // Edit distance alone could reach into a similarly named field
        let prefix: String = fuzzy.text.chars().take(fuzzy.prefix_length).collect();
        let prefix_query = self.regex_query(&fuzzy.field, &format!("{}.*", regex::escape(&prefix)))?;
        Ok(Box::new(BooleanQuery::new(vec![
            (tantivy::query::Occur::Must, fuzzy_query),
            (tantivy::query::Occur::Must, prefix_query),
        ])))
    }

    fn range_query(&self, range: &TermRangeQuery) -> Box<dyn Query> {
        // Open bounds stop at the edges of the field's own term block
        let field_floor = encode_term(&range.field, "");
        let field_ceiling = format!("{}{}", range.field, (FIELD_SEPARATOR as u8 + 1) as char);

        let lower_text = range
            .lower
            .as_ref()
            .map(|lower| encode_term(&range.field, lower));
        let upper_text = range
            .upper
            .as_ref()
            .map(|upper| encode_term(&range.field, upper));

        let lower = match &lower_text {
            Some(text) if range.include_lower => Bound::Included(text.as_str()),
            Some(text) => Bound::Excluded(text.as_str()),
            None => Bound::Included(field_floor.as_str()),
        };
        let upper = match &upper_text {
            Some(text) if range.include_upper => Bound::Included(text.as_str()),
            Some(text) => Bound::Excluded(text.as_str()),
            None => Bound::Excluded(field_ceiling.as_str()),
        };

        Box::new(RangeQuery::new_str_bounds(
            self.field_name.clone(),
            lower,
            upper,
        ))
    }
}

fn engine_occur(occur: Occur) -> tantivy::query::Occur {
    match occur {
        Occur::Must => tantivy::query::Occur::Must,
        Occur::Should => tantivy::query::Occur::Should,
        Occur::MustNot => tantivy::query::Occur::MustNot,
    }
}

/// Convert a wildcard pattern into an anchored-by-caller regex
pub fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(&regex::escape("\\")),
            },
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_to_regex() {
        assert_eq!(wildcard_to_regex("ab*"), "ab.*");
        assert_eq!(wildcard_to_regex("a?c"), "a.c");
        assert_eq!(wildcard_to_regex("a.b"), "a\\.b");
        assert_eq!(wildcard_to_regex("a\\*"), "a\\*");
    }

    fn translator() -> QueryTranslator {
        let schema = crate::document::build_schema(false);
        let field = schema.get_field(crate::document::FIELDS_FIELD).unwrap();
        QueryTranslator::new(field, crate::document::FIELDS_FIELD)
    }

    #[test]
    fn test_foreign_node_is_unsupported() {
        let node = QueryNode::Foreign(crate::query::ForeignQuery {
            name: "span_or".to_string(),
        });
        assert!(matches!(
            translator().translate(&node),
            Err(IndexError::UnsupportedQueryNode(_))
        ));
    }

    #[test]
    fn test_fuzzy_edit_limit() {
        let node = QueryNode::fuzzy("Name", "robert", 3, 0);
        assert!(matches!(
            translator().translate(&node),
            Err(IndexError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let node = QueryNode::regexp("Name", "(unclosed");
        assert!(matches!(
            translator().translate(&node),
            Err(IndexError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_multi_phrase_expansion_limit() {
        use crate::query::{MultiPhraseQuery, PhraseAlternatives};
        let slot = |position| PhraseAlternatives {
            alternatives: (0..64).map(|i| format!("w{}", i)).collect(),
            position,
        };
        let node = QueryNode::MultiPhrase(MultiPhraseQuery {
            field: "body".to_string(),
            positions: vec![slot(0), slot(1)],
            slop: 0,
        });
        assert!(matches!(
            translator().translate(&node),
            Err(IndexError::InvalidQuery(_))
        ));
    }
}
