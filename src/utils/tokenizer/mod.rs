//! Token estimation
//!
//! Character-heuristic token counting with per-family tuning. A process
//! keeps one [`TokenCounter`]; tokenizers are constructed lazily per model
//! id, memoized, and safe for concurrent use. Counts are estimates —
//! whenever a provider reports authoritative usage, callers prefer it.

use crate::core::types::{ChatMessage, EmbeddingInput};
use dashmap::DashMap;
use std::sync::Arc;

/// Tokenizer family, dispatched on model-id substrings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerFamily {
    /// GPT-4 class models
    Gpt4,
    /// GPT-3.5 class models
    Gpt35,
    /// Claude models
    Claude,
    /// Llama models
    Llama,
    /// Mistral models
    Mistral,
    /// Gemini models
    Gemini,
    /// Everything else
    Default,
}

impl TokenizerFamily {
    /// Resolve the family for a model id
    pub fn for_model(model: &str) -> Self {
        // Strip provider prefix like "openai/gpt-4"
        let model = model.rsplit('/').next().unwrap_or(model);
        let model = model.to_ascii_lowercase();

        if model.contains("gpt-4") {
            Self::Gpt4
        } else if model.contains("gpt-3.5") {
            Self::Gpt35
        } else if model.contains("claude") {
            Self::Claude
        } else if model.contains("llama") {
            Self::Llama
        } else if model.contains("mistral") {
            Self::Mistral
        } else if model.contains("gemini") {
            Self::Gemini
        } else {
            Self::Default
        }
    }
}

/// A memoized tokenizer for one model family
#[derive(Debug)]
pub struct Tokenizer {
    family: TokenizerFamily,
    /// Average characters per token for the family
    chars_per_token: f64,
    /// Fixed overhead per request
    request_overhead: u32,
    /// Fixed overhead per message
    message_overhead: u32,
}

impl Tokenizer {
    fn for_family(family: TokenizerFamily) -> Self {
        let (chars_per_token, request_overhead, message_overhead) = match family {
            TokenizerFamily::Gpt4 => (4.0, 3, 4),
            TokenizerFamily::Gpt35 => (4.0, 3, 4),
            TokenizerFamily::Claude => (3.8, 3, 5),
            TokenizerFamily::Llama => (3.5, 2, 4),
            TokenizerFamily::Mistral => (3.6, 2, 4),
            TokenizerFamily::Gemini => (4.0, 2, 4),
            TokenizerFamily::Default => (4.0, 3, 4),
        };
        Self {
            family,
            chars_per_token,
            request_overhead,
            message_overhead,
        }
    }

    /// The family this tokenizer serves
    pub fn family(&self) -> TokenizerFamily {
        self.family
    }

    /// Estimate tokens for a plain text
    pub fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let chars = text.chars().count() as f64;
        (chars / self.chars_per_token).ceil() as u32
    }

    /// Estimate prompt tokens for a message list, including structure overhead
    pub fn count_messages(&self, messages: &[ChatMessage]) -> u32 {
        let mut total = self.request_overhead;
        for message in messages {
            total += self.message_overhead;
            if let Some(content) = &message.content {
                total += self.count_text(&content.as_text());
            }
            if let Some(name) = &message.name {
                total += self.count_text(name);
            }
            if let Some(calls) = &message.tool_calls {
                for call in calls {
                    total += self.count_text(&call.function.name);
                    total += self.count_text(&call.function.arguments);
                }
            }
        }
        total
    }
}

/// Process-wide token counter with per-model memoization
#[derive(Debug, Default)]
pub struct TokenCounter {
    tokenizers: DashMap<String, Arc<Tokenizer>>,
}

impl TokenCounter {
    /// Create an empty counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or lazily construct) the tokenizer for a model id
    pub fn tokenizer(&self, model: &str) -> Arc<Tokenizer> {
        if let Some(existing) = self.tokenizers.get(model) {
            return existing.clone();
        }
        let tokenizer = Arc::new(Tokenizer::for_family(TokenizerFamily::for_model(model)));
        self.tokenizers
            .entry(model.to_string())
            .or_insert(tokenizer)
            .clone()
    }

    /// Estimate tokens in plain text for a model
    pub fn count_text(&self, model: &str, text: &str) -> u32 {
        self.tokenizer(model).count_text(text)
    }

    /// Estimate prompt tokens for a message list
    pub fn count_messages(&self, model: &str, messages: &[ChatMessage]) -> u32 {
        self.tokenizer(model).count_messages(messages)
    }

    /// Estimate tokens for an embedding input
    pub fn count_embedding_input(&self, model: &str, input: &EmbeddingInput) -> u32 {
        let tokenizer = self.tokenizer(model);
        match input {
            EmbeddingInput::TokenIds(ids) => ids.len() as u32,
            other => other
                .texts()
                .iter()
                .map(|text| tokenizer.count_text(text))
                .sum(),
        }
    }
}
