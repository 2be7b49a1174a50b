//! Response types
//!
//! Unified response structures for completions and streaming chunks.
//! `model` always carries the logical id the client requested; `provider`
//! names the back-end that actually served the request. The two diverge
//! when a fallback model handled the call.

use super::chat::ChatMessage;
use super::message::MessageRole;
use serde::{Deserialize, Serialize};

/// Completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Response id
    pub id: String,
    /// Object type, `"chat.completion"`
    pub object: String,
    /// Creation timestamp (unix seconds)
    pub created: i64,
    /// Logical model id as requested by the client
    pub model: String,
    /// Provider that actually served the request
    pub provider: String,
    /// Choice list
    pub choices: Vec<ChatChoice>,
    /// Usage statistics
    pub usage: Usage,
}

impl CompletionResponse {
    /// Convenience accessor for the first choice's text content.
    pub fn text(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|c| c.as_text())
    }
}

/// Chat choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Choice index
    pub index: u32,
    /// Response message
    pub message: ChatMessage,
    /// Completion reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Streaming response chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Response id, stable across the chunks of one stream
    pub id: String,
    /// Object type, `"chat.completion.chunk"`
    pub object: String,
    /// Creation timestamp (unix seconds)
    pub created: i64,
    /// Logical model id as requested by the client
    pub model: String,
    /// Provider that actually served the request
    pub provider: String,
    /// Choice list
    pub choices: Vec<ChatStreamChoice>,
    /// Usage (conventionally only on the final chunk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatChunk {
    /// Whether this is the terminal chunk of the stream.
    pub fn is_final(&self) -> bool {
        self.choices.iter().any(|c| c.finish_reason.is_some())
    }

    /// Concatenated delta content of all choices.
    pub fn delta_text(&self) -> String {
        self.choices
            .iter()
            .filter_map(|c| c.delta.content.as_deref())
            .collect()
    }
}

/// Streaming choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatStreamChoice {
    /// Choice index
    pub index: u32,
    /// Delta content
    pub delta: ChatDelta,
    /// Finish reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Streaming delta content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatDelta {
    /// Role (usually only appears in first chunk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Content delta
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop
    Stop,
    /// Length limit reached
    Length,
    /// Tool call
    ToolCalls,
    /// Content filter
    ContentFilter,
}

/// Usage statistics
///
/// For completions `total_tokens == prompt_tokens + completion_tokens`;
/// embeddings report `completion_tokens == 0` so the same invariant holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    /// Prompt token count
    pub prompt_tokens: u32,
    /// Completion token count
    pub completion_tokens: u32,
    /// Total token count
    pub total_tokens: u32,
}

impl Usage {
    /// Usage for a completion call
    pub fn completion(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Usage for an embedding call (no generated tokens)
    pub fn embedding(prompt_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens: 0,
            total_tokens: prompt_tokens,
        }
    }
}
