use std::sync::Arc;

use tracing::debug;

use crate::{
    capability::Corpus,
    chunk::{Chunk, Document, RankedList},
    error::{Error, Result},
    tantivy_index::LexicalIndex,
};

/// Lexical (BM25) retrieval over the full corpus snapshot.
///
/// Every call fetches the whole corpus and builds a fresh in-memory index,
/// so cost grows linearly with the corpus. Documents are indexed in `id`
/// order, and equal scores are broken by that order.
pub struct SparseRetriever<C> {
    corpus: Arc<C>,
}

impl<C: Corpus> SparseRetriever<C> {
    pub fn new(corpus: Arc<C>) -> Self {
        Self { corpus }
    }

    /// Return up to `k` chunks by descending BM25 score.
    pub async fn search(&self, query: &str, k: usize) -> Result<RankedList> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut documents =
            self.corpus.get_all().await.map_err(Error::retrieval)?;
        documents.sort_by(|a, b| a.id.cmp(&b.id));

        let query = query.to_string();
        let (documents, hits) = tokio::task::spawn_blocking(move || {
            let index =
                LexicalIndex::build(documents.iter().map(|d| d.text.as_str()))?;
            let hits = index.search(&query, k)?;
            Ok::<_, Error>((documents, hits))
        })
        .await??;

        let mut slots: Vec<Option<Document>> =
            documents.into_iter().map(Some).collect();
        let chunks: RankedList = hits
            .into_iter()
            .filter_map(|hit| {
                let document = slots.get_mut(hit.position)?.take()?;
                Some(Chunk::new(document, hit.score))
            })
            .collect();

        debug!(
            corpus = slots.len(),
            hits = chunks.len(),
            k,
            "sparse retrieval complete"
        );
        Ok(chunks)
    }
}
