//! Provider abstraction
//!
//! [`LlmProvider`] is the core port every model back-end implements. It is
//! capability-driven and object-safe: the pipeline holds providers as
//! `Arc<dyn LlmProvider>` and never sees provider-specific types. Concrete
//! providers are injected through the [`ProviderRegistry`], keyed by name.

pub mod fine_tuning;
pub mod mock;
pub mod registry;

pub use fine_tuning::{FineTuningJob, FineTuningJobStatus, FineTuningProvider};
pub use mock::{CompletionScript, MockProvider, StreamScript};
pub use registry::ProviderRegistry;

use crate::core::types::{
    ChatChunk, CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse,
    ProviderError, RequestContext,
};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::pin::Pin;

/// Stream of completion chunks produced by a provider
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, ProviderError>> + Send>>;

/// Provider capability flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderCapability {
    /// Unary chat completion
    Completion,
    /// Streaming chat completion
    Streaming,
    /// Text embeddings
    Embedding,
    /// Tool / function calling
    FunctionCalling,
    /// Mixed text+image inputs
    MultiModal,
    /// Image understanding
    Vision,
    /// Fine-tuning jobs
    FineTuning,
}

/// Model metadata reported by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Provider-side model id
    pub id: String,
    /// Human-readable name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Maximum context window in tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
}

/// Unified LLM provider interface
///
/// All I/O methods take a [`RequestContext`]; implementations must honor
/// its cancellation token and return promptly once it fires.
#[async_trait]
pub trait LlmProvider: Send + Sync + Debug {
    /// Provider name, unique across the process; used for routing and logging
    fn name(&self) -> &str;

    /// Capability list for routing and feature detection
    fn capabilities(&self) -> &[ProviderCapability];

    /// Check if unary completion is supported
    fn supports_completion(&self) -> bool {
        self.capabilities().contains(&ProviderCapability::Completion)
    }

    /// Check if streaming is supported
    fn supports_streaming(&self) -> bool {
        self.capabilities().contains(&ProviderCapability::Streaming)
    }

    /// Check if embeddings are supported
    fn supports_embedding(&self) -> bool {
        self.capabilities().contains(&ProviderCapability::Embedding)
    }

    /// Check if tool calling is supported
    fn supports_function_calling(&self) -> bool {
        self.capabilities()
            .contains(&ProviderCapability::FunctionCalling)
    }

    /// Check if multimodal input is supported
    fn supports_multimodal(&self) -> bool {
        self.capabilities().contains(&ProviderCapability::MultiModal)
    }

    /// Check if vision input is supported
    fn supports_vision(&self) -> bool {
        self.capabilities().contains(&ProviderCapability::Vision)
    }

    /// Check if fine-tuning is supported
    fn supports_fine_tuning(&self) -> bool {
        self.capabilities().contains(&ProviderCapability::FineTuning)
    }

    /// List models available from this provider
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    /// Look up a single model by provider-side id
    async fn get_model(&self, id: &str) -> Result<ModelInfo, ProviderError> {
        self.list_models()
            .await?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or_else(|| {
                ProviderError::unknown(self.name().to_string(), format!("model not found: {}", id))
            })
    }

    /// Execute a unary completion request
    async fn create_completion(
        &self,
        request: CompletionRequest,
        ctx: RequestContext,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Execute a streaming completion request
    ///
    /// Chunks must be emitted in generation order. Only called when
    /// `supports_streaming()` returns true.
    async fn create_completion_stream(
        &self,
        _request: CompletionRequest,
        _ctx: RequestContext,
    ) -> Result<ChunkStream, ProviderError> {
        Err(ProviderError::not_supported(
            self.name().to_string(),
            "streaming",
        ))
    }

    /// Generate text embeddings
    async fn create_embedding(
        &self,
        _request: EmbeddingRequest,
        _ctx: RequestContext,
    ) -> Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::not_supported(
            self.name().to_string(),
            "embeddings",
        ))
    }

    /// Execute a completion request with mixed text+image content
    ///
    /// Default delegates to [`create_completion`](Self::create_completion)
    /// when the provider declares multimodal support.
    async fn create_multimodal_completion(
        &self,
        request: CompletionRequest,
        ctx: RequestContext,
    ) -> Result<CompletionResponse, ProviderError> {
        if self.supports_multimodal() {
            self.create_completion(request, ctx).await
        } else {
            Err(ProviderError::not_supported(
                self.name().to_string(),
                "multimodal",
            ))
        }
    }

    /// Access the fine-tuning facet, when implemented
    fn as_fine_tuning(&self) -> Option<&dyn FineTuningProvider> {
        None
    }
}
