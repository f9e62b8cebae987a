//! Reciprocal Rank Fusion: score = Σ 1/(c + rank)
//!
//! Combines ranked lists from retrievers whose scores are not comparable
//! (cosine similarity, BM25) using rank positions only, so no score
//! normalization is needed.

use std::collections::HashMap;

use crate::chunk::{Chunk, RankedList};

pub const DEFAULT_RRF_CONSTANT: u32 = 60;

/// Merges two ranked lists into one.
///
/// The constant `c` damps the head of each list so that an item ranked
/// first by one retriever does not automatically beat an item both
/// retrievers agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankFuser {
    constant: u32,
}

impl Default for RankFuser {
    fn default() -> Self {
        Self::new(DEFAULT_RRF_CONSTANT)
    }
}

impl RankFuser {
    /// A zero constant is raised to 1 so the top rank stays finite.
    pub fn new(constant: u32) -> Self {
        Self {
            constant: constant.max(1),
        }
    }

    pub fn constant(&self) -> u32 {
        self.constant
    }

    /// Contribution of one list entry at 0-based `rank`.
    pub fn contribution(&self, rank: usize) -> f32 {
        1.0 / (self.constant as f32 + rank as f32)
    }

    /// Fuse `primary` and `secondary` and keep the best `k`.
    ///
    /// Ids are ordered by accumulated score, descending, with ties broken by
    /// id so the output is a total order. Each returned chunk carries the
    /// payload from `primary` when both lists hold the id, otherwise from
    /// `secondary`, and has `fused_score` set.
    pub fn fuse(
        &self,
        primary: &[Chunk],
        secondary: &[Chunk],
        k: usize,
    ) -> RankedList {
        let mut scores: HashMap<&str, f32> = HashMap::new();
        let mut payloads: HashMap<&str, &Chunk> = HashMap::new();

        for list in [primary, secondary] {
            for (rank, chunk) in list.iter().enumerate() {
                *scores.entry(chunk.id.as_str()).or_default() +=
                    self.contribution(rank);
                payloads.entry(chunk.id.as_str()).or_insert(chunk);
            }
        }

        let mut ranked: Vec<(&str, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(k);

        ranked
            .into_iter()
            .filter_map(|(id, score)| {
                let mut chunk = (*payloads.get(id)?).clone();
                chunk.fused_score = Some(score);
                Some(chunk)
            })
            .collect()
    }
}
