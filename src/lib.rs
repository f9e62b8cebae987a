//! ragbrief - hybrid retrieval and staged research briefs over a document
//! corpus.
//!
//! A query runs dense (embedding) and sparse (BM25, via
//! [Tantivy](https://github.com/quickwit-oss/tantivy)) retrieval
//! concurrently, merges the two ranked lists with reciprocal rank fusion and
//! reranks the survivors with a cross-encoder. On top of that sit a
//! single-shot cited [`Answerer`] and a four-stage [`SynthesisPipeline`]
//! (research, summarize, critique, write).
//!
//! Every external dependency is a trait in [`capability`]; the pipelines
//! hold them behind `Arc`s and never reach for globals.
//!
//! # Quick start
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use ragbrief::{
//!     ApiOverrides, ApiSettings, CrossEncoderClient, MemoryIndex,
//!     OpenAiClient, RetrievalConfig, RetrievalPipeline,
//! };
//!
//! # async fn demo() -> ragbrief::Result<()> {
//! let settings = ApiSettings::resolve(&ApiOverrides::default())?;
//! let models = Arc::new(OpenAiClient::new(&settings)?);
//! let scorer = Arc::new(CrossEncoderClient::new(&settings)?);
//!
//! let documents = ragbrief::corpus::read_documents(Path::new("docs.jsonl"))?;
//! let index =
//!     Arc::new(MemoryIndex::embed_corpus(models.as_ref(), documents, 64).await?);
//!
//! let pipeline = RetrievalPipeline::new(
//!     models,
//!     index.clone(),
//!     index,
//!     scorer,
//!     RetrievalConfig::default(),
//! );
//! let results = pipeline.search("how do I reset my password").await?;
//! for chunk in &results.chunks {
//!     println!("{} ({:?})", chunk.id, chunk.rerank_score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod answer;
pub mod budget;
pub mod capability;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod cross_encoder;
pub mod dense;
pub mod error;
pub mod eval;
pub mod fusion;
pub mod memory_index;
pub mod openai;
pub mod reranker;
pub mod search;
pub mod sparse;
pub mod synthesis;
pub mod tantivy_index;

#[cfg(test)]
mod testing;

pub use answer::{Answer, Answerer};
pub use budget::ContextBudgeter;
pub use chunk::{Chunk, Document, RankedList};
pub use config::{ApiOverrides, ApiSettings};
pub use cross_encoder::CrossEncoderClient;
pub use error::{Error, Result};
pub use fusion::RankFuser;
pub use memory_index::MemoryIndex;
pub use openai::OpenAiClient;
pub use reranker::Reranker;
pub use search::{Retrieval, RetrievalConfig, RetrievalPipeline, SearchResults};
pub use synthesis::{
    PipelineState,
    Stage,
    SynthesisConfig,
    SynthesisPipeline,
    SynthesisReport,
};
