use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    capability::RelevanceScorer,
    config::ApiSettings,
    error::{Error, Result},
};

/// Cross-encoder served over HTTP in the text-embeddings-inference style:
/// `POST {url}/rerank` with `{query, texts}`, answering `[{index, score}]`.
#[derive(Debug, Clone)]
pub struct CrossEncoderClient {
    client: Client,
    url: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [&'a str],
    raw_scores: bool,
}

#[derive(Debug, Deserialize)]
struct RerankScore {
    index: usize,
    score: f32,
}

impl CrossEncoderClient {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/rerank", settings.rerank_url),
        })
    }
}

impl RelevanceScorer for CrossEncoderClient {
    async fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = RerankRequest {
            query,
            texts,
            raw_scores: true,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::ScorerUnavailable(format!("request to {} failed: {e}", self.url))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ScorerUnavailable(format!(
                "{} returned {status}",
                self.url
            )));
        }
        let body = response.text().await.map_err(|e| {
            Error::ScorerUnavailable(format!("failed to read response: {e}"))
        })?;

        let scores = scores_in_order(&body, texts.len())?;
        debug!(pairs = scores.len(), "cross-encoder scored");
        Ok(scores)
    }
}

/// Decode `[{index, score}]` into one score per input text, in input order.
fn scores_in_order(body: &str, expected: usize) -> Result<Vec<f32>> {
    let items: Vec<RerankScore> = serde_json::from_str(body)
        .map_err(|e| Error::ScorerUnavailable(format!("malformed response: {e}")))?;

    let mut scores = vec![None; expected];
    for item in items {
        let slot = scores.get_mut(item.index).ok_or_else(|| {
            Error::ScorerUnavailable(format!("score index {} out of range", item.index))
        })?;
        *slot = Some(item.score);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            s.ok_or_else(|| Error::ScorerUnavailable(format!("no score for text {i}")))
        })
        .collect()
}
