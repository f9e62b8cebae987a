use std::{collections::BTreeSet, fmt::Write, future::Future, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    capability::{Corpus, Embedder, RelevanceScorer, VectorIndex},
    chunk::{Chunk, RankedList},
    dense::DenseRetriever,
    error::Result,
    fusion::{DEFAULT_RRF_CONSTANT, RankFuser},
    reranker::Reranker,
    sparse::SparseRetriever,
};

/// Knobs for [`RetrievalPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// How many chunks each of the dense and sparse retrievers returns.
    pub candidates_per_retriever: usize,
    /// How many fused candidates are passed to the reranker.
    pub fusion_width: usize,
    /// How many reranked chunks [`RetrievalPipeline::search`] returns.
    pub final_count: usize,
    pub rrf_constant: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidates_per_retriever: 12,
            fusion_width: 50,
            final_count: 6,
            rrf_constant: DEFAULT_RRF_CONSTANT,
        }
    }
}

/// Final ranked chunks plus the distinct sources they came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub chunks: RankedList,
    pub citations: BTreeSet<String>,
}

impl SearchResults {
    pub fn new(chunks: RankedList) -> Self {
        let citations = citations(&chunks);
        Self { chunks, citations }
    }
}

/// Distinct `source` metadata values of `chunks`.
///
/// Chunks without a text `source` are skipped.
pub fn citations(chunks: &[Chunk]) -> BTreeSet<String> {
    let mut sources = BTreeSet::new();
    for chunk in chunks {
        match chunk.source() {
            Some(source) => {
                sources.insert(source.to_string());
            }
            None => warn!(id = %chunk.id, "chunk has no source to cite"),
        }
    }
    sources
}

/// Anything that can turn a query into reranked chunks.
///
/// [`RetrievalPipeline`] is the production implementation; the synthesis
/// and answer pipelines depend on this seam only.
pub trait Retrieval: Send + Sync {
    fn retrieve(
        &self,
        query: &str,
        count: usize,
    ) -> impl Future<Output = Result<SearchResults>> + Send;
}

/// Hybrid retrieval: dense and sparse search in parallel, fused with RRF,
/// then reranked.
///
/// Holds no state of its own between calls; the capabilities it wraps are
/// shared read-only.
pub struct RetrievalPipeline<E, V, C, S> {
    dense: DenseRetriever<E, V>,
    sparse: SparseRetriever<C>,
    fuser: RankFuser,
    reranker: Reranker<S>,
    config: RetrievalConfig,
}

impl<E, V, C, S> RetrievalPipeline<E, V, C, S>
where
    E: Embedder,
    V: VectorIndex,
    C: Corpus,
    S: RelevanceScorer,
{
    pub fn new(
        embedder: Arc<E>,
        index: Arc<V>,
        corpus: Arc<C>,
        scorer: Arc<S>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            dense: DenseRetriever::new(embedder, index),
            sparse: SparseRetriever::new(corpus),
            fuser: RankFuser::new(config.rrf_constant),
            reranker: Reranker::new(scorer),
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn dense(&self) -> &DenseRetriever<E, V> {
        &self.dense
    }

    pub fn sparse(&self) -> &SparseRetriever<C> {
        &self.sparse
    }

    pub fn fuser(&self) -> &RankFuser {
        &self.fuser
    }

    /// Run the full pipeline and keep the configured final count.
    pub async fn search(&self, query: &str) -> Result<SearchResults> {
        self.search_top(query, self.config.final_count).await
    }

    /// Run the full pipeline and keep the best `count` chunks.
    ///
    /// 1. Dense and sparse retrieval, concurrently (fan-out)
    /// 2. Join, then reciprocal rank fusion down to the fusion width
    /// 3. Cross-encoder rerank down to `count`
    ///
    /// Citations are the distinct sources of the reranked chunks.
    pub async fn search_top(
        &self,
        query: &str,
        count: usize,
    ) -> Result<SearchResults> {
        let fused = self.candidates(query).await?;
        let reranked = self.reranker.rerank(query, fused, count).await?;
        let results = SearchResults::new(reranked);

        debug!(
            chunks = results.chunks.len(),
            citations = results.citations.len(),
            "retrieval complete"
        );
        Ok(results)
    }

    /// Stages 1 and 2 only: fused candidates before reranking.
    ///
    /// A failure in either retriever cancels the other and is returned.
    pub async fn candidates(&self, query: &str) -> Result<RankedList> {
        let k = self.config.candidates_per_retriever;
        let (dense, sparse) = tokio::try_join!(
            self.dense.search(query, k),
            self.sparse.search(query, k),
        )?;

        let fused = self.fuser.fuse(&dense, &sparse, self.config.fusion_width);
        debug!(
            dense = dense.len(),
            sparse = sparse.len(),
            fused = fused.len(),
            "fusion complete"
        );
        Ok(fused)
    }
}

impl<E, V, C, S> Retrieval for RetrievalPipeline<E, V, C, S>
where
    E: Embedder,
    V: VectorIndex,
    C: Corpus,
    S: RelevanceScorer,
{
    async fn retrieve(&self, query: &str, count: usize) -> Result<SearchResults> {
        self.search_top(query, count).await
    }
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &SearchResults) -> String {
    if results.chunks.is_empty() {
        return "No results found.\n".to_string();
    }

    let mut out = String::new();
    for (i, chunk) in results.chunks.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. [{:.3}] {} ({})",
            i + 1,
            chunk.rerank_score.unwrap_or(chunk.retrieval_score),
            chunk.id,
            chunk.source().unwrap_or("unknown")
        );
        if let Some(line) = chunk.text.lines().find(|l| !l.trim().is_empty()) {
            let _ = writeln!(out, "     {}", preview(line.trim(), 96));
        }
    }

    let _ = writeln!(out, "\n{} result(s)", results.chunks.len());
    if !results.citations.is_empty() {
        let sources: Vec<&str> =
            results.citations.iter().map(String::as_str).collect();
        let _ = writeln!(out, "sources: {}", sources.join(", "));
    }
    out
}

/// Format results as a JSON document.
pub fn format_json(results: &SearchResults, query: &str) -> Result<String> {
    Ok(serde_json::to_string(&serde_json::json!({
        "query": query,
        "result_count": results.chunks.len(),
        "results": results.chunks,
        "citations": results.citations,
    }))?)
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use tokio::{sync::Barrier, time::timeout};

    use super::*;
    use crate::{
        capability::{Embedding, IndexHit},
        chunk::Document,
        error::Error,
        memory_index::MemoryIndex,
        testing::{
            KeywordEmbedder,
            OverlapScorer,
            StaticCorpus,
            StaticIndex,
            Unreachable,
            faq_corpus,
            sourced,
        },
    };

    async fn faq_pipeline(
        config: RetrievalConfig,
    ) -> RetrievalPipeline<KeywordEmbedder, MemoryIndex, MemoryIndex, OverlapScorer>
    {
        let embedder = Arc::new(KeywordEmbedder);
        let index = Arc::new(
            MemoryIndex::embed_corpus(embedder.as_ref(), faq_corpus(), 2)
                .await
                .unwrap(),
        );
        RetrievalPipeline::new(
            embedder,
            index.clone(),
            index,
            Arc::new(OverlapScorer::default()),
            config,
        )
    }

    #[tokio::test]
    async fn finds_faq_and_cites_it() {
        let pipeline = faq_pipeline(RetrievalConfig::default()).await;

        let results = pipeline.search("reset password").await.unwrap();

        assert_eq!(results.chunks[0].id, "faq.md:0");
        assert!(results.citations.contains("faq.md"));
        assert!(results.chunks.len() <= 6);
        assert!(results.chunks.iter().all(|c| c.rerank_score.is_some()));
        assert!(results.chunks.iter().all(|c| c.fused_score.is_some()));
    }

    #[tokio::test]
    async fn final_count_bounds_output() {
        let config = RetrievalConfig {
            final_count: 2,
            ..RetrievalConfig::default()
        };
        let pipeline = faq_pipeline(config).await;

        let results = pipeline.search("your page").await.unwrap();

        assert_eq!(results.chunks.len(), 2);
        assert_eq!(pipeline.search_top("your page", 1).await.unwrap().chunks.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_fan_out_matches_sequential_in_either_order() {
        let pipeline = faq_pipeline(RetrievalConfig::default()).await;
        let query = "reset your account password";
        let k = pipeline.config().candidates_per_retriever;
        let width = pipeline.config().fusion_width;

        let sparse_first = pipeline.sparse().search(query, k).await.unwrap();
        let dense_second = pipeline.dense().search(query, k).await.unwrap();
        let dense_first = pipeline.dense().search(query, k).await.unwrap();
        let sparse_second = pipeline.sparse().search(query, k).await.unwrap();

        let a = pipeline.fuser().fuse(&dense_second, &sparse_first, width);
        let b = pipeline.fuser().fuse(&dense_first, &sparse_second, width);
        let concurrent = pipeline.candidates(query).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a, concurrent);
    }

    /// Both retrievers must reach the barrier before either can finish.
    struct Rendezvous(Arc<Barrier>);

    impl Embedder for Rendezvous {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            self.0.wait().await;
            Ok(texts.iter().map(|t| KeywordEmbedder::vector(t)).collect())
        }
    }

    impl Corpus for Rendezvous {
        async fn get_all(&self) -> Result<Vec<Document>> {
            self.0.wait().await;
            Ok(faq_corpus())
        }
    }

    /// Takes a long time to list the corpus and records if it ever does.
    struct SlowCorpus {
        finished: Arc<AtomicBool>,
    }

    impl Corpus for SlowCorpus {
        async fn get_all(&self) -> Result<Vec<Document>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(faq_corpus())
        }
    }

    #[tokio::test]
    async fn dense_and_sparse_run_concurrently() {
        let barrier = Arc::new(Barrier::new(2));
        let hits = faq_corpus()
            .into_iter()
            .map(|document| IndexHit { document, distance: 0.5 })
            .collect();
        let pipeline = RetrievalPipeline::new(
            Arc::new(Rendezvous(barrier.clone())),
            Arc::new(StaticIndex(hits)),
            Arc::new(Rendezvous(barrier)),
            Arc::new(OverlapScorer::default()),
            RetrievalConfig::default(),
        );

        let fused = timeout(Duration::from_secs(5), pipeline.candidates("reset password"))
            .await
            .expect("retrievers did not overlap")
            .unwrap();

        assert!(fused.iter().any(|c| c.id == "faq.md:0"));
    }

    #[tokio::test]
    async fn first_failure_cancels_the_other_retriever() {
        let finished = Arc::new(AtomicBool::new(false));
        let pipeline = RetrievalPipeline::new(
            Arc::new(Unreachable),
            Arc::new(StaticIndex(vec![])),
            Arc::new(SlowCorpus { finished: finished.clone() }),
            Arc::new(OverlapScorer::default()),
            RetrievalConfig::default(),
        );

        let err = timeout(Duration::from_secs(5), pipeline.search("q"))
            .await
            .expect("search waited for the slow retriever")
            .unwrap_err();

        assert!(matches!(err, Error::RetrievalUnavailable { .. }), "{err:?}");
        assert!(matches!(err.root(), Error::EmbeddingUnavailable(_)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn citations_are_distinct_sources() {
        let hits = vec![
            IndexHit { document: sourced("a:0", "a.md", "alpha one"), distance: 0.1 },
            IndexHit { document: sourced("a:1", "a.md", "alpha two"), distance: 0.2 },
            IndexHit { document: Document::new("nosrc", "alpha three"), distance: 0.3 },
        ];
        let pipeline = RetrievalPipeline::new(
            Arc::new(KeywordEmbedder),
            Arc::new(StaticIndex(hits)),
            Arc::new(StaticCorpus(vec![])),
            Arc::new(OverlapScorer::default()),
            RetrievalConfig::default(),
        );

        let results = pipeline.search("alpha").await.unwrap();

        assert_eq!(results.chunks.len(), 3);
        assert_eq!(
            results.citations.into_iter().collect::<Vec<_>>(),
            vec!["a.md".to_string()]
        );
    }

    #[tokio::test]
    async fn retriever_failure_aborts_search() {
        let pipeline = RetrievalPipeline::new(
            Arc::new(KeywordEmbedder),
            Arc::new(StaticIndex(vec![])),
            Arc::new(Unreachable),
            Arc::new(OverlapScorer::default()),
            RetrievalConfig::default(),
        );

        let err = pipeline.search("q").await.unwrap_err();

        assert!(matches!(err, Error::RetrievalUnavailable { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn scorer_failure_aborts_search() {
        let embedder = Arc::new(KeywordEmbedder);
        let index = Arc::new(
            MemoryIndex::embed_corpus(embedder.as_ref(), faq_corpus(), 8)
                .await
                .unwrap(),
        );
        let pipeline = RetrievalPipeline::new(
            embedder,
            index.clone(),
            index,
            Arc::new(Unreachable),
            RetrievalConfig::default(),
        );

        let err = pipeline.search("reset password").await.unwrap_err();

        assert!(matches!(err, Error::ScorerUnavailable(_)), "{err:?}");
    }

    #[test]
    fn human_format_lists_ranks_and_sources() {
        let mut chunk = crate::chunk::Chunk::new(sourced("faq.md:0", "faq.md", "\nReset it."), 0.5);
        chunk.rerank_score = Some(2.0);
        let out = format_human(&SearchResults::new(vec![chunk]));

        assert!(out.contains("  1. [2.000] faq.md:0 (faq.md)"));
        assert!(out.contains("     Reset it."));
        assert!(out.contains("sources: faq.md"));
        assert_eq!(format_human(&SearchResults::new(vec![])), "No results found.\n");
    }

    #[test]
    fn json_format_is_parseable() {
        let chunk = crate::chunk::Chunk::new(sourced("x", "x.md", "text"), 0.5);
        let json = format_json(&SearchResults::new(vec![chunk]), "q").unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["query"], "q");
        assert_eq!(value["result_count"], 1);
        assert_eq!(value["results"][0]["id"], "x");
        assert_eq!(value["citations"][0], "x.md");
    }
}
