use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    Term,
    collector::TopDocs,
    doc,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::{
        Field,
        IndexRecordOption,
        STORED,
        Schema,
        TextFieldIndexing,
        TextOptions,
        Value,
    },
    tokenizer::{LowerCaser, TextAnalyzer, TokenStream, WhitespaceTokenizer},
};

use crate::error::Result;

/// Field names used in the schema.
pub mod fields {
    pub const POSITION: &str = "position";
    pub const BODY: &str = "body";
}

const TOKENIZER: &str = "whitespace_lower";

/// Smallest per-thread budget tantivy accepts.
const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// A throwaway in-memory BM25 index over one corpus snapshot.
///
/// Documents are identified by their insertion position, which the caller
/// maps back to its own records.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
    len: usize,
}

#[derive(Clone, Copy)]
struct SchemaFields {
    position: Field,
    body: Field,
}

/// A scored match from [`LexicalIndex::search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    pub position: usize,
    pub score: f32,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let position = builder.add_u64_field(fields::POSITION, STORED);
    let body_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let body = builder.add_text_field(fields::BODY, body_opts);

    (builder.build(), SchemaFields { position, body })
}

// No length filter: unspaced scripts and URLs arrive as one long token.
fn register_tokenizers(index: &Index) {
    let whitespace = TextAnalyzer::builder(WhitespaceTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TOKENIZER, whitespace);
}

impl LexicalIndex {
    /// Index `texts` in order. Position `i` refers to the `i`-th text.
    pub fn build<'a, I>(texts: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizers(&index);

        // A single indexing thread keeps every document in one segment.
        let mut writer: IndexWriter =
            index.writer_with_num_threads(1, WRITER_MEMORY_BUDGET)?;
        let mut len = 0;
        for (position, text) in texts.into_iter().enumerate() {
            writer.add_document(doc!(
                fields.position => position as u64,
                fields.body => text,
            ))?;
            len += 1;
        }
        writer.commit()?;

        let reader = index.reader()?;
        reader.reload()?;

        Ok(Self {
            index,
            reader,
            fields,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Split a query with the same analyzer the body field was indexed with.
    pub fn query_terms(&self, query: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(self.fields.body)?;
        let mut stream = analyzer.token_stream(query);
        let mut terms = Vec::new();
        while stream.advance() {
            terms.push(stream.token().text.clone());
        }
        Ok(terms)
    }

    /// BM25-score every document against the query terms.
    ///
    /// Each query term (repeats included) contributes an OR'd clause.
    /// Returns at most `limit` hits by descending score; equal scores keep
    /// insertion order. Documents matching no term are not returned.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        if limit == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let terms = self.query_terms(query)?;
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|text| {
                let term = Term::from_field_text(self.fields.body, text);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        // Rank the whole snapshot so ties at the cut are resolved by position
        // rather than by collector internals.
        let top_docs = searcher.search(&query, &TopDocs::with_limit(self.len))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            hits.push(LexicalHit {
                position: extract_u64(&doc, self.fields.position) as usize,
                score,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.position.cmp(&b.position))
        });
        hits.truncate(limit);

        Ok(hits)
    }
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
