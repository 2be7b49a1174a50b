//! Embedding request and response types

use super::responses::Usage;
use serde::{Deserialize, Serialize};

/// Embedding request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Logical model id
    pub model: String,
    /// Input text or text list
    pub input: EmbeddingInput,
    /// End-user identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Project the request is billed against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Free-form tags copied onto usage records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Requested output dimensionality
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

impl EmbeddingRequest {
    /// Create a request for a single text
    pub fn new(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: EmbeddingInput::Text(input.into()),
            user: None,
            project_id: None,
            tags: Vec::new(),
            dimensions: None,
        }
    }

    /// Validate request shape: input must be non-empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.input.is_empty() {
            return Err("embedding input must not be empty".to_string());
        }
        Ok(())
    }
}

/// Embedding input type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    /// Single text
    Text(String),
    /// Text list
    Array(Vec<String>),
    /// Pre-tokenized input
    TokenIds(Vec<u32>),
}

impl EmbeddingInput {
    /// Convert to a text vector; token-id inputs yield an empty list.
    pub fn texts(&self) -> Vec<String> {
        match self {
            EmbeddingInput::Text(text) => vec![text.clone()],
            EmbeddingInput::Array(texts) => texts.clone(),
            EmbeddingInput::TokenIds(_) => Vec::new(),
        }
    }

    /// Whether the input carries no content
    pub fn is_empty(&self) -> bool {
        match self {
            EmbeddingInput::Text(text) => text.is_empty(),
            EmbeddingInput::Array(texts) => texts.is_empty(),
            EmbeddingInput::TokenIds(ids) => ids.is_empty(),
        }
    }
}

/// Embedding response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// Logical model id as requested by the client
    pub model: String,
    /// Provider that actually served the request
    pub provider: String,
    /// Embedding vectors, one per input
    pub data: Vec<EmbeddingData>,
    /// Usage statistics (`completion_tokens` is always zero)
    pub usage: Usage,
}

/// A single embedding vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingData {
    /// Position of the corresponding input
    pub index: u32,
    /// The embedding vector
    pub embedding: Vec<f32>,
}
