use std::{cmp::Ordering, sync::Arc};

use tracing::debug;

use crate::{
    capability::RelevanceScorer,
    chunk::{Chunk, RankedList},
    error::{Error, Result},
};

/// Rescores fused candidates with a pairwise (query, text) relevance model.
pub struct Reranker<S> {
    scorer: Arc<S>,
}

impl<S: RelevanceScorer> Reranker<S> {
    pub fn new(scorer: Arc<S>) -> Self {
        Self { scorer }
    }

    /// Score every candidate against `query` and keep the best `top_n`.
    ///
    /// All pairs go to the scorer in one batched call. Candidates are sorted
    /// by `rerank_score` descending; equal scores keep their input order.
    /// Returns `min(top_n, candidates.len())` chunks, all drawn from the
    /// input, and only the `rerank_score` field is touched.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: RankedList,
        top_n: usize,
    ) -> Result<RankedList> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }

        let scores = {
            let texts: Vec<&str> =
                candidates.iter().map(|c| c.text.as_str()).collect();
            self.scorer.score(query, &texts).await?
        };

        if scores.len() != candidates.len() {
            return Err(Error::ScorerUnavailable(format!(
                "scorer returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            )));
        }

        let mut ranked: RankedList = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut chunk, score)| {
                chunk.rerank_score = Some(score);
                chunk
            })
            .collect();

        // Stable sort: ties keep their fused order.
        ranked.sort_by(|a, b| descending(a.rerank_score, b.rerank_score));
        ranked.truncate(top_n);

        debug!(kept = ranked.len(), top_n, "rerank complete");
        Ok(ranked)
    }
}

/// Descending comparison on scores, with NaN ranked last.
fn descending(a: Option<f32>, b: Option<f32>) -> Ordering {
    let key = |s: Option<f32>| match s {
        Some(v) if !v.is_nan() => v,
        _ => f32::NEG_INFINITY,
    };
    key(b).total_cmp(&key(a))
}
