use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Metadata key naming the file a chunk was cut from.
pub const SOURCE_KEY: &str = "source";

/// A scalar metadata value attached to a document at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(v) => write!(f, "{v}"),
            MetadataValue::Int(v) => write!(f, "{v}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// A corpus entry as produced by ingestion and returned by the index
/// capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style helper for attaching one metadata entry.
    pub fn with_meta(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str)
    }
}

/// A retrieved unit of text moving through the retrieval pipeline.
///
/// `retrieval_score` is only comparable within the retriever that produced
/// it. `fused_score` is set by [`RankFuser`](crate::fusion::RankFuser) and
/// `rerank_score` by [`Reranker`](crate::reranker::Reranker).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub retrieval_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl Chunk {
    pub fn new(document: Document, retrieval_score: f32) -> Self {
        let Document { id, text, metadata } = document;
        Self {
            id,
            text,
            metadata,
            retrieval_score,
            fused_score: None,
            rerank_score: None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str)
    }

    /// Length of the text in characters, the unit context budgets use.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Chunks in rank order; index 0 is the most relevant.
pub type RankedList = Vec<Chunk>;
