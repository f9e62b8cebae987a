use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;
use tracing::debug;

use crate::{
    capability::{Generator, Message},
    chunk::Chunk,
    error::Result,
    search::Retrieval,
};

pub const ANSWER_INSTRUCTION: &str = "You are a support assistant. Answer \
using ONLY the provided context. Cite sources like [source:filename] when \
relevant.";

pub const ANSWER_MAX_TOKENS: u32 = 512;

const DEFAULT_ANSWER_COUNT: usize = 6;

/// A grounded reply and the sources it drew on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: BTreeSet<String>,
}

/// Single-shot question answering over retrieved context.
pub struct Answerer<R, G> {
    retrieval: Arc<R>,
    generator: Arc<G>,
    count: usize,
}

impl<R: Retrieval, G: Generator> Answerer<R, G> {
    pub fn new(retrieval: Arc<R>, generator: Arc<G>) -> Self {
        Self {
            retrieval,
            generator,
            count: DEFAULT_ANSWER_COUNT,
        }
    }

    /// Number of reranked chunks handed to the generator.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let results = self.retrieval.retrieve(question, self.count).await?;
        let context = render_cited_context(&results.chunks);

        let messages = [
            Message::system(ANSWER_INSTRUCTION),
            Message::user(format!("Question: {question}\n\nContext:\n{context}")),
        ];
        let text = self.generator.complete(&messages, ANSWER_MAX_TOKENS).await?;

        debug!(
            chunks = results.chunks.len(),
            citations = results.citations.len(),
            "answer generated"
        );
        Ok(Answer {
            text,
            citations: results.citations,
        })
    }
}

/// Render chunks as `[source:<name>]` headed blocks separated by blank lines.
pub fn render_cited_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("[source:{}]\n{}", c.source().unwrap_or("unknown"), c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
