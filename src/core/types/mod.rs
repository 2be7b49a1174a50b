//! Unified type system for the gateway
//!
//! Wire types shared by providers, orchestrators, and ports.

pub mod chat;
pub mod context;
pub mod embedding;
pub mod error;
pub mod message;
pub mod responses;

pub use chat::{
    ChatMessage, CompletionRequest, FunctionCall, FunctionDefinition, Tool, ToolCall,
};
pub use context::RequestContext;
pub use embedding::{EmbeddingData, EmbeddingInput, EmbeddingRequest, EmbeddingResponse};
pub use error::{ErrorCode, ProviderError};
pub use message::{ContentPart, ImageUrl, MessageContent, MessageRole};
pub use responses::{
    ChatChoice, ChatChunk, ChatDelta, ChatStreamChoice, CompletionResponse, FinishReason, Usage,
};
