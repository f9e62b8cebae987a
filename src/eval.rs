//! Offline retrieval quality metrics over labeled queries.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::Result, search::Retrieval};

/// A query and the chunk ids a good retriever should return for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledQuery {
    pub query: String,
    pub expected_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrievalMetrics {
    pub recall_at_k: f64,
    pub mrr_at_k: f64,
    pub queries: usize,
}

/// Share of `expected` present in `retrieved`.
///
/// An empty expectation set counts as a denominator of one.
pub fn recall(retrieved: &[&str], expected: &[String]) -> f64 {
    let hits = expected
        .iter()
        .filter(|id| retrieved.contains(&id.as_str()))
        .count();
    hits as f64 / expected.len().max(1) as f64
}

/// `1 / position` of the first expected id, 1-based; 0 when none appears.
pub fn reciprocal_rank(retrieved: &[&str], expected: &[String]) -> f64 {
    retrieved
        .iter()
        .position(|id| expected.iter().any(|e| e.as_str() == *id))
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

/// Mean recall@k and MRR@k of `retrieval` over `queries`.
pub async fn evaluate<R: Retrieval>(
    retrieval: &R,
    queries: &[LabeledQuery],
    k: usize,
) -> Result<RetrievalMetrics> {
    let mut recall_sum = 0.0;
    let mut rr_sum = 0.0;

    for labeled in queries {
        let results = retrieval.retrieve(&labeled.query, k).await?;
        let ids: Vec<&str> =
            results.chunks.iter().map(|c| c.id.as_str()).collect();

        let r = recall(&ids, &labeled.expected_ids);
        let rr = reciprocal_rank(&ids, &labeled.expected_ids);
        debug!(query = %labeled.query, recall = r, reciprocal_rank = rr, "evaluated");
        recall_sum += r;
        rr_sum += rr;
    }

    let n = queries.len();
    let mean = |sum: f64| if n == 0 { 0.0 } else { sum / n as f64 };
    Ok(RetrievalMetrics {
        recall_at_k: mean(recall_sum),
        mrr_at_k: mean(rr_sum),
        queries: n,
    })
}
