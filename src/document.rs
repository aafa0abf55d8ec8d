//! Documents and their tantivy representation

use crate::analysis::{KeywordTokenizer, FOLDED_KEYWORD_TOKENIZER, KEYWORD_TOKENIZER};
use crate::error::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use tantivy::schema::{
    Field, FieldType, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED,
};
use tantivy::tokenizer::{PreTokenizedString, TokenStream, Tokenizer};
use tantivy::TantivyDocument;

/// Reserved field holding the record type name of a document
pub const RECORD_KEY: &str = "_type";

/// Indexed field carrying every (name, value) pair as one token
pub const FIELDS_FIELD: &str = "_fields";

/// Stored-only field carrying the ordered pairs as JSON
pub const SOURCE_FIELD: &str = "_source";

/// Separates the field name from the value inside an indexed token
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// An ordered list of (field, value) pairs indexed as one unit
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Document {
    fields: Vec<(String, String)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a document of the given record type
    pub fn of_type(record_type: impl Into<String>) -> Self {
        Self::new().with(RECORD_KEY, record_type)
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(field, value);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.push((field.into(), value.into()));
    }

    /// First value of a field
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn record_type(&self) -> Option<&str> {
        self.get(RECORD_KEY)
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// Token text for a (field, value) pair
pub fn encode_term(field: &str, text: &str) -> String {
    let mut encoded = String::with_capacity(field.len() + text.len() + 1);
    encoded.push_str(field);
    encoded.push(FIELD_SEPARATOR);
    encoded.push_str(text);
    encoded
}

/// Build the fixed partition schema
pub fn build_schema(case_insensitive: bool) -> Schema {
    let mut schema_builder = Schema::builder();

    let tokenizer = if case_insensitive {
        FOLDED_KEYWORD_TOKENIZER
    } else {
        KEYWORD_TOKENIZER
    };
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(tokenizer)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    schema_builder.add_text_field(
        FIELDS_FIELD,
        TextOptions::default().set_indexing_options(indexing),
    );

    schema_builder.add_text_field(SOURCE_FIELD, STORED);

    schema_builder.build()
}

/// Field handles resolved from a partition schema
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub fields: Field,
    pub source: Field,
    analyzer: KeywordTokenizer,
}

impl SchemaFields {
    pub fn resolve(schema: &Schema) -> IndexResult<Self> {
        let fields = schema.get_field(FIELDS_FIELD)?;
        let folded = match schema.get_field_entry(fields).field_type() {
            FieldType::Str(options) => options
                .get_indexing_options()
                .map(|indexing| indexing.tokenizer() == FOLDED_KEYWORD_TOKENIZER)
                .unwrap_or(false),
            _ => false,
        };

        Ok(Self {
            fields,
            source: schema.get_field(SOURCE_FIELD)?,
            analyzer: if folded {
                KeywordTokenizer::folded()
            } else {
                KeywordTokenizer::verbatim()
            },
        })
    }

    /// Convert to Tantivy document.
    ///
    /// All pairs go into one pre-tokenized value, so the n-th pair sits at
    /// position n and phrases can span consecutive pairs.
    pub fn to_tantivy_doc(&self, document: &Document) -> IndexResult<TantivyDocument> {
        let mut analyzer = self.analyzer;
        let mut text = String::new();
        let mut tokens = Vec::with_capacity(document.len());

        for (position, (name, value)) in document.fields().iter().enumerate() {
            if position > 0 {
                text.push('\n');
            }
            let offset = text.len();
            let encoded = encode_term(name, value);

            let mut stream = analyzer.token_stream(&encoded);
            while stream.advance() {
                let mut token = stream.token().clone();
                token.position = position;
                token.offset_from += offset;
                token.offset_to += offset;
                tokens.push(token);
            }
            text.push_str(&encoded);
        }

        let mut doc = TantivyDocument::new();
        doc.add_pre_tokenized_text(self.fields, PreTokenizedString { text, tokens });
        doc.add_text(self.source, serde_json::to_string(&document.fields)?);
        Ok(doc)
    }

    /// Convert a stored Tantivy document back
    pub fn from_tantivy_doc(&self, doc: &TantivyDocument) -> IndexResult<Document> {
        let source = doc
            .get_first(self.source)
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                IndexError::Serialization(format!("stored document lacks {}", SOURCE_FIELD))
            })?;
        let fields: Vec<(String, String)> = serde_json::from_str(source)?;
        Ok(Document { fields })
    }
}
