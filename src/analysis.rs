//! Index-time analyzers.
//!
//! Documents arrive already tokenized: each (field, value) pair becomes a
//! single keyword token `field\u{1f}value`, produced by [`KeywordTokenizer`]
//! when the document is converted. The folded variant trims and lowercases
//! the value half so stored terms compare equal to queries rewritten by
//! [`LowerCasingPreprocessor`].

use crate::document::FIELD_SEPARATOR;
use crate::query::{LowerCasingPreprocessor, QueryRewriter};
use tantivy::tokenizer::{TextAnalyzer, Token, TokenStream, Tokenizer};
use tantivy::Index;

/// Verbatim keyword analyzer
pub const KEYWORD_TOKENIZER: &str = "keyword";

/// Trimmed, lowercased keyword analyzer
pub const FOLDED_KEYWORD_TOKENIZER: &str = "keyword_folded";

/// Emits the whole input as exactly one token
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordTokenizer {
    fold_case: bool,
}

impl KeywordTokenizer {
    pub fn verbatim() -> Self {
        Self { fold_case: false }
    }

    pub fn folded() -> Self {
        Self { fold_case: true }
    }

    fn normalize(&self, text: &str) -> String {
        if !self.fold_case {
            return text.to_string();
        }
        match text.split_once(FIELD_SEPARATOR) {
            Some((field, value)) => {
                let mut token = String::with_capacity(text.len());
                token.push_str(field);
                token.push(FIELD_SEPARATOR);
                token.push_str(&value.trim().to_lowercase());
                token
            }
            None => text.trim().to_lowercase(),
        }
    }
}

impl Tokenizer for KeywordTokenizer {
    type TokenStream<'a> = KeywordTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        KeywordTokenStream {
            token: Token {
                offset_from: 0,
                offset_to: text.len(),
                position: 0,
                text: self.normalize(text),
                position_length: 1,
            },
            emitted: false,
        }
    }
}

pub struct KeywordTokenStream {
    token: Token,
    emitted: bool,
}

impl TokenStream for KeywordTokenStream {
    fn advance(&mut self) -> bool {
        if self.emitted {
            return false;
        }
        self.emitted = true;
        true
    }

    fn token(&self) -> &Token {
        &self.token
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.token
    }
}

/// Register both keyword analyzers on a freshly opened index
pub fn register_tokenizers(index: &Index) {
    let tokenizers = index.tokenizers();
    tokenizers.register(
        KEYWORD_TOKENIZER,
        TextAnalyzer::from(KeywordTokenizer::verbatim()),
    );
    tokenizers.register(
        FOLDED_KEYWORD_TOKENIZER,
        TextAnalyzer::from(KeywordTokenizer::folded()),
    );
}

/// The matching pair for case-insensitive search: fold at index time
/// with [`FOLDED_KEYWORD_TOKENIZER`], rewrite queries with this rewriter.
pub struct CaseInsensitive;

impl CaseInsensitive {
    pub fn analyzer_name() -> &'static str {
        FOLDED_KEYWORD_TOKENIZER
    }

    pub fn query_rewriter() -> QueryRewriter {
        QueryRewriter::new(LowerCasingPreprocessor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(tokenizer: &mut KeywordTokenizer, text: &str) -> Vec<String> {
        let mut stream = tokenizer.token_stream(text);
        let mut out = Vec::new();
        while stream.advance() {
            out.push(stream.token().text.clone());
        }
        out
    }

    #[test]
    fn test_verbatim_emits_single_token() {
        let mut tokenizer = KeywordTokenizer::verbatim();
        assert_eq!(
            tokens(&mut tokenizer, "Name\u{1f}Bob Smith"),
            vec!["Name\u{1f}Bob Smith".to_string()]
        );
    }

    #[test]
    fn test_folded_lowercases_value_only() {
        let mut tokenizer = KeywordTokenizer::folded();
        assert_eq!(
            tokens(&mut tokenizer, "Name\u{1f}  Bob Smith "),
            vec!["Name\u{1f}bob smith".to_string()]
        );
    }

    #[test]
    fn test_registered_analyzer_is_usable() {
        let index = Index::create_in_ram(crate::document::build_schema(true));
        register_tokenizers(&index);
        let mut analyzer = index.tokenizers().get(FOLDED_KEYWORD_TOKENIZER).unwrap();
        let mut stream = analyzer.token_stream("City\u{1f}LONDON");
        assert!(stream.advance());
        assert_eq!(stream.token().text, "City\u{1f}london");
        assert!(!stream.advance());
    }
}
