//! Client for OpenAI-compatible `/embeddings` and `/chat/completions`
//! endpoints.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    capability::{Embedder, Embedding, Generator, Message},
    config::ApiSettings,
    error::{Error, Result},
};

/// One shared HTTP client for embedding and generation calls.
///
/// Build once at startup; `reqwest::Client` pools connections internally
/// and is safe to use from many tasks.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    embed_model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Embedding,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            chat_model: settings.chat_model.clone(),
            embed_model: settings.embed_model.clone(),
            temperature: settings.temperature,
        })
    }

    /// POST `body` to `{base_url}/{path}` and return the response text.
    ///
    /// Transport failures and non-2xx statuses come back as a plain message
    /// for the caller to wrap in its own error variant.
    async fn post<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> std::result::Result<String, String> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("request to {url} failed: {e}"))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("failed to read response from {url}: {e}"))?;

        if !status.is_success() {
            return Err(format!("{url} returned {status}: {}", truncate(&text, 200)));
        }
        Ok(text)
    }
}

impl Embedder for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.embed_model,
            input: texts,
        };
        let body = self
            .post("embeddings", &request)
            .await
            .map_err(Error::EmbeddingUnavailable)?;

        let vectors = parse_embeddings(&body, texts.len())?;
        debug!(count = vectors.len(), model = %self.embed_model, "embedded texts");
        Ok(vectors)
    }
}

impl Generator for OpenAiClient {
    async fn complete(
        &self,
        messages: &[Message],
        max_output_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            temperature: self.temperature,
            max_tokens: max_output_tokens,
        };
        let body = self
            .post("chat/completions", &request)
            .await
            .map_err(Error::GenerationFailed)?;

        let content = parse_completion(&body)?;
        debug!(
            chars = content.len(),
            max_output_tokens,
            model = %self.chat_model,
            "completion received"
        );
        Ok(content)
    }
}

/// Decode an embeddings response, restoring input order by `index`.
fn parse_embeddings(body: &str, expected: usize) -> Result<Vec<Embedding>> {
    let response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| Error::EmbeddingUnavailable(format!("malformed response: {e}")))?;

    if response.data.len() != expected {
        return Err(Error::EmbeddingUnavailable(format!(
            "expected {expected} embeddings, got {}",
            response.data.len()
        )));
    }

    let mut slots: Vec<Option<Embedding>> = vec![None; expected];
    for item in response.data {
        let slot = slots
            .get_mut(item.index)
            .filter(|slot| slot.is_none())
            .ok_or_else(|| {
                Error::EmbeddingUnavailable(format!(
                    "unexpected embedding index {}",
                    item.index
                ))
            })?;
        *slot = Some(item.embedding);
    }
    Ok(slots.into_iter().flatten().collect())
}

/// Extract the first choice's message text.
fn parse_completion(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::GenerationFailed(format!("malformed response: {e}")))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| Error::GenerationFailed("response has no message content".into()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
