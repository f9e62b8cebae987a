//! External capabilities the pipelines consume.
//!
//! Each trait is one boundary the core suspends on: embedding, vector-index
//! query, full-corpus fetch, pairwise relevance scoring, and text
//! generation. Implementations are long-lived, shared read-only behind an
//! `Arc`, and must be safe to call concurrently.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    chunk::Document,
    error::{Error, Result},
};

pub type Embedding = Vec<f32>;

/// One hit from a vector-index query. Lower distance means more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub document: Document,
    pub distance: f32,
}

/// Turns texts into vectors. Output has the same length and order as input.
///
/// Fails with [`Error::EmbeddingUnavailable`].
pub trait Embedder: Send + Sync {
    fn embed(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Embedding>>> + Send;
}

/// Top-k similarity search over stored vectors, ranked by ascending distance.
///
/// Fails with [`Error::IndexUnavailable`].
pub trait VectorIndex: Send + Sync {
    fn query(
        &self,
        vector: &[f32],
        k: usize,
    ) -> impl Future<Output = Result<Vec<IndexHit>>> + Send;
}

/// Enumerates every document in the corpus snapshot.
///
/// Fails with [`Error::IndexUnavailable`].
pub trait Corpus: Send + Sync {
    fn get_all(&self) -> impl Future<Output = Result<Vec<Document>>> + Send;
}

/// Scores (query, text) pairs. Output has the same length and order as
/// `texts`; higher means more relevant.
///
/// Fails with [`Error::ScorerUnavailable`].
pub trait RelevanceScorer: Send + Sync {
    fn score(
        &self,
        query: &str,
        texts: &[&str],
    ) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

/// Completes a chat transcript.
///
/// Fails with [`Error::GenerationFailed`], which also covers timeouts, rate
/// limits and malformed responses.
pub trait Generator: Send + Sync {
    fn complete(
        &self,
        messages: &[Message],
        max_output_tokens: u32,
    ) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Bounds every call on the wrapped capability by a fixed deadline.
///
/// An elapsed deadline becomes the capability's own failure variant, so a
/// hung dependency fails the pipeline instead of stalling it.
#[derive(Debug, Clone)]
pub struct Deadline<C> {
    inner: C,
    limit: Duration,
}

impl<C> Deadline<C> {
    pub fn new(inner: C, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    fn elapsed(&self, what: &str) -> String {
        format!("{what} timed out after {:?}", self.limit)
    }
}

impl<C: Embedder> Embedder for Deadline<C> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        tokio::time::timeout(self.limit, self.inner.embed(texts))
            .await
            .map_err(|_| Error::EmbeddingUnavailable(self.elapsed("embedding")))?
    }
}

impl<C: VectorIndex> VectorIndex for Deadline<C> {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        tokio::time::timeout(self.limit, self.inner.query(vector, k))
            .await
            .map_err(|_| Error::IndexUnavailable(self.elapsed("index query")))?
    }
}

impl<C: Corpus> Corpus for Deadline<C> {
    async fn get_all(&self) -> Result<Vec<Document>> {
        tokio::time::timeout(self.limit, self.inner.get_all())
            .await
            .map_err(|_| Error::IndexUnavailable(self.elapsed("corpus fetch")))?
    }
}

impl<C: RelevanceScorer> RelevanceScorer for Deadline<C> {
    async fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        tokio::time::timeout(self.limit, self.inner.score(query, texts))
            .await
            .map_err(|_| Error::ScorerUnavailable(self.elapsed("scoring")))?
    }
}

impl<C: Generator> Generator for Deadline<C> {
    async fn complete(
        &self,
        messages: &[Message],
        max_output_tokens: u32,
    ) -> Result<String> {
        tokio::time::timeout(
            self.limit,
            self.inner.complete(messages, max_output_tokens),
        )
        .await
        .map_err(|_| Error::GenerationFailed(self.elapsed("generation")))?
    }
}
