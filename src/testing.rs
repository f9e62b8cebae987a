//! Deterministic stand-ins for the external capabilities, shared by the
//! unit tests.

use std::{
    collections::{
        VecDeque,
        hash_map::DefaultHasher,
    },
    hash::{Hash, Hasher},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{
    capability::{
        Corpus,
        Embedder,
        Embedding,
        Generator,
        IndexHit,
        Message,
        RelevanceScorer,
        VectorIndex,
    },
    chunk::{Chunk, Document, SOURCE_KEY},
    error::{Error, Result},
};

const DIMENSION: usize = 64;

pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

pub fn chunk(id: &str, text: &str) -> Chunk {
    Chunk::new(Document::new(id, text), 0.0)
}

pub fn sourced(id: &str, source: &str, text: &str) -> Document {
    Document::new(id, text).with_meta(SOURCE_KEY, source)
}

/// Small support corpus with one document answering "reset password".
pub fn faq_corpus() -> Vec<Document> {
    vec![
        sourced(
            "faq.md:0",
            "faq.md",
            "# FAQ\n## Reset password\nTo reset your password, click Forgot \
             Password on the login page and follow the email link.",
        ),
        sourced(
            "billing.md:0",
            "billing.md",
            "Invoices are emailed on the first day of each month.",
        ),
        sourced(
            "shipping.md:0",
            "shipping.md",
            "Orders ship within two business days from our warehouse.",
        ),
        sourced(
            "account.md:0",
            "account.md",
            "You can change your account email from the profile page.",
        ),
    ]
}

/// Hashed bag-of-words embedder: texts sharing words point the same way.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Embedding {
        let mut vector = vec![0.0; DIMENSION];
        for word in words(text) {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() % DIMENSION as u64) as usize] += 1.0;
        }
        vector
    }
}

impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Scores a text by how many query words it contains.
#[derive(Default)]
pub struct OverlapScorer {
    calls: AtomicUsize,
}

impl OverlapScorer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RelevanceScorer for OverlapScorer {
    async fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query_words: Vec<String> = words(query).collect();
        Ok(texts
            .iter()
            .map(|text| {
                let text_words: Vec<String> = words(text).collect();
                query_words.iter().filter(|w| text_words.contains(w)).count()
                    as f32
            })
            .collect())
    }
}

/// Returns fixed scores regardless of input.
pub struct FixedScorer(pub Vec<f32>);

impl RelevanceScorer for FixedScorer {
    async fn score(&self, _query: &str, _texts: &[&str]) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// Replays canned completions in order and records every request.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<(Vec<Message>, u32)>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(Vec<Message>, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Generator for ScriptedGenerator {
    async fn complete(
        &self,
        messages: &[Message],
        max_output_tokens: u32,
    ) -> Result<String> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), max_output_tokens));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::GenerationFailed("script exhausted".into()))
    }
}

/// Every call fails with the capability's own failure variant.
pub struct Unreachable;

impl Embedder for Unreachable {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
        Err(Error::EmbeddingUnavailable("connection refused".into()))
    }
}

impl VectorIndex for Unreachable {
    async fn query(&self, _vector: &[f32], _k: usize) -> Result<Vec<IndexHit>> {
        Err(Error::IndexUnavailable("connection refused".into()))
    }
}

impl Corpus for Unreachable {
    async fn get_all(&self) -> Result<Vec<Document>> {
        Err(Error::IndexUnavailable("connection refused".into()))
    }
}

impl RelevanceScorer for Unreachable {
    async fn score(&self, _query: &str, _texts: &[&str]) -> Result<Vec<f32>> {
        Err(Error::ScorerUnavailable("connection refused".into()))
    }
}

impl Generator for Unreachable {
    async fn complete(&self, _: &[Message], _: u32) -> Result<String> {
        Err(Error::GenerationFailed("rate limited".into()))
    }
}

/// A vector index that returns preset hits, ignoring the query vector.
pub struct StaticIndex(pub Vec<IndexHit>);

impl VectorIndex for StaticIndex {
    async fn query(&self, _vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        Ok(self.0.iter().take(k).cloned().collect())
    }
}

/// A corpus that returns preset documents in the given order.
pub struct StaticCorpus(pub Vec<Document>);

impl Corpus for StaticCorpus {
    async fn get_all(&self) -> Result<Vec<Document>> {
        Ok(self.0.clone())
    }
}
