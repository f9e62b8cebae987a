use std::sync::Arc;

use tracing::debug;

use crate::{
    capability::{Embedder, VectorIndex},
    chunk::{Chunk, RankedList},
    error::{Error, Result},
};

/// Embedding-similarity retrieval against a vector index.
pub struct DenseRetriever<E, V> {
    embedder: Arc<E>,
    index: Arc<V>,
}

impl<E: Embedder, V: VectorIndex> DenseRetriever<E, V> {
    pub fn new(embedder: Arc<E>, index: Arc<V>) -> Self {
        Self { embedder, index }
    }

    /// Return up to `k` chunks in the order the index ranked them.
    ///
    /// The query is embedded with a single batch-of-one call. Capability
    /// failures surface as [`Error::RetrievalUnavailable`] without retrying.
    pub async fn search(&self, query: &str, k: usize) -> Result<RankedList> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .and_then(|vectors| {
                vectors.into_iter().next().ok_or_else(|| {
                    Error::EmbeddingUnavailable(
                        "embedder returned no vector for the query".into(),
                    )
                })
            })
            .map_err(Error::retrieval)?;

        let hits = self
            .index
            .query(&vector, k)
            .await
            .map_err(Error::retrieval)?;

        let chunks: RankedList = hits
            .into_iter()
            .take(k)
            .map(|hit| {
                Chunk::new(hit.document, similarity_from_distance(hit.distance))
            })
            .collect();

        debug!(hits = chunks.len(), k, "dense retrieval complete");
        Ok(chunks)
    }
}

/// Map an index distance to a similarity score (higher is more similar).
///
/// For cosine distance this is the cosine similarity. The map is strictly
/// decreasing, so the index's ordering is preserved.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance
}
