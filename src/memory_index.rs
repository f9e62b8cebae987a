use std::{collections::HashMap, sync::Arc};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    capability::{Corpus, Embedder, Embedding, IndexHit, VectorIndex},
    chunk::Document,
    error::{Error, Result},
};

/// Texts per embedding request when building an index from a corpus.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Brute-force cosine index over an in-memory corpus snapshot.
///
/// Serves both the dense retriever (as a [`VectorIndex`]) and the sparse
/// retriever (as a [`Corpus`]). Filled once at startup, then shared
/// read-only. Queries scan on the blocking pool, off the async workers.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: Arc<Vec<(Document, Embedding)>>,
    positions: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Add or replace a document.
    ///
    /// Every embedding must have the dimension of the first one inserted.
    pub fn insert(&mut self, document: Document, embedding: Embedding) -> Result<()> {
        if embedding.is_empty() {
            return Err(Error::InvalidInput(format!(
                "empty embedding for document {}",
                document.id
            )));
        }
        match self.dimension {
            Some(dim) if dim != embedding.len() => {
                return Err(Error::IndexUnavailable(format!(
                    "embedding for {} has dimension {}, index has {dim}",
                    document.id,
                    embedding.len()
                )));
            }
            _ => self.dimension = Some(embedding.len()),
        }

        let entries = Arc::make_mut(&mut self.entries);
        match self.positions.get(&document.id) {
            Some(&i) => entries[i] = (document, embedding),
            None => {
                self.positions.insert(document.id.clone(), entries.len());
                entries.push((document, embedding));
            }
        }
        Ok(())
    }

    /// Embed `documents` through `embedder`, `batch_size` texts per call.
    pub async fn embed_corpus<E: Embedder>(
        embedder: &E,
        documents: Vec<Document>,
        batch_size: usize,
    ) -> Result<Self> {
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            let embedded = embedder.embed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(Error::EmbeddingUnavailable(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
            debug!(embedded = vectors.len(), total = texts.len(), "embedding corpus");
        }

        let mut index = Self::new();
        for (document, embedding) in documents.into_iter().zip(vectors) {
            index.insert(document, embedding)?;
        }

        info!(
            documents = index.len(),
            dimension = index.dimension.unwrap_or(0),
            "vector index built"
        );
        Ok(index)
    }
}

impl VectorIndex for MemoryIndex {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        match self.dimension {
            Some(dim) if dim != vector.len() => {
                return Err(Error::IndexUnavailable(format!(
                    "query vector has dimension {}, index has {dim}",
                    vector.len()
                )));
            }
            _ => {}
        }

        let entries = Arc::clone(&self.entries);
        let query = vector.to_vec();
        let scored = tokio::task::spawn_blocking(move || nearest(&entries, &query, k))
            .await?;

        Ok(scored
            .into_iter()
            .map(|(i, distance)| IndexHit {
                document: self.entries[i].0.clone(),
                distance,
            })
            .collect())
    }
}

/// Indices and distances of the `k` entries closest to `query`.
fn nearest(
    entries: &[(Document, Embedding)],
    query: &[f32],
    k: usize,
) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = entries
        .par_iter()
        .enumerate()
        .map(|(i, (_, embedding))| (i, cosine_distance(query, embedding)))
        .collect();

    scored.sort_by(|a, b| {
        a.1.total_cmp(&b.1)
            .then_with(|| entries[a.0].0.id.cmp(&entries[b.0].0.id))
    });
    scored.truncate(k);
    scored
}

impl Corpus for MemoryIndex {
    async fn get_all(&self) -> Result<Vec<Document>> {
        Ok(self.entries.iter().map(|(d, _)| d.clone()).collect())
    }
}

/// `1 - cos(a, b)`: 0 for the same direction, 2 for opposite ones.
///
/// A zero vector is treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}
