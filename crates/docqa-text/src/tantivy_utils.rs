use std::str::CharIndices;

use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED};
use tantivy::tokenizer::{TextAnalyzer, Token, TokenStream, Tokenizer};
use tantivy::Index;

/// Tokenizer name: raw whitespace split, case preserved, no stop words.
pub const WHITESPACE_TOKENIZER: &str = "whitespace_raw";

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    let _chunk_field = schema_builder.add_u64_field("chunk", STORED);
    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer(WHITESPACE_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqs);
    let _text_field = schema_builder.add_text_field(
        "text",
        TextOptions::default().set_indexing_options(text_field_indexing),
    );
    schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
    let tokenizer = TextAnalyzer::builder(UnicodeWhitespaceTokenizer::default()).build();
    index.tokenizers().register(WHITESPACE_TOKENIZER, tokenizer);
}

/// Query-side counterpart of the indexing tokenizer.
pub fn whitespace_tokens(text: &str) -> Vec<&str> {
    text.split(char::is_whitespace)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Splits on every Unicode whitespace character (PDF text carries no-break and
/// thin spaces that an ASCII split would glue into one token).
#[derive(Clone, Default)]
pub struct UnicodeWhitespaceTokenizer {
    token: Token,
}

pub struct UnicodeWhitespaceTokenStream<'a> {
    text: &'a str,
    chars: CharIndices<'a>,
    token: &'a mut Token,
}

impl Tokenizer for UnicodeWhitespaceTokenizer {
    type TokenStream<'a> = UnicodeWhitespaceTokenStream<'a>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        self.token.reset();
        UnicodeWhitespaceTokenStream {
            text,
            chars: text.char_indices(),
            token: &mut self.token,
        }
    }
}

impl UnicodeWhitespaceTokenStream<'_> {
    fn token_end(&mut self) -> usize {
        (&mut self.chars)
            .find(|(_, c)| c.is_whitespace())
            .map_or(self.text.len(), |(offset, _)| offset)
    }
}

impl TokenStream for UnicodeWhitespaceTokenStream<'_> {
    fn advance(&mut self) -> bool {
        self.token.text.clear();
        self.token.position = self.token.position.wrapping_add(1);
        while let Some((offset_from, c)) = self.chars.next() {
            if c.is_whitespace() {
                continue;
            }
            let offset_to = self.token_end();
            self.token.offset_from = offset_from;
            self.token.offset_to = offset_to;
            self.token.text.push_str(&self.text[offset_from..offset_to]);
            return true;
        }
        false
    }

    fn token(&self) -> &Token {
        self.token
    }

    fn token_mut(&mut self) -> &mut Token {
        self.token
    }
}
