//! Error handling for the gateway
//!
//! [`GatewayError`] is the crate-level error type: everything a pipeline
//! stage can fail with, including wrapped provider errors. The wire shape
//! for surfacing errors to clients is [`ErrorResponse`].

use crate::core::templates::TemplateError;
use crate::core::types::error::{ErrorCode, ProviderError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request shape or constraint violation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested logical model id is unknown
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Provider name is not registered
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// Caller lacks access to the entity
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Router could not resolve the request
    #[error("Routing error: {0}")]
    Routing(String),

    /// Back-end failure, surfaced after fallback ran its course
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// All fallback attempts failed; wraps the last provider error
    #[error("Fallback exhausted after {attempts} attempts: {last_error}")]
    FallbackExhausted {
        /// Number of fallback attempts made
        attempts: u32,
        /// The error from the final attempt
        #[source]
        last_error: ProviderError,
    },

    /// Budget enforcement denied the request
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Prompt or completion blocked by the content filter
    #[error("Content filtered: {0}")]
    ContentFiltered(String),

    /// Cache errors
    #[error("Cache error: {0}")]
    Cache(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Prompt template rendering errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request cancelled by the client
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status an embedding server should map this error to
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::ModelNotFound(_) => 404,
            Self::ProviderNotFound(_) => 500,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Routing(_) => 400,
            Self::Provider(err) => err.http_status(),
            Self::FallbackExhausted { last_error, .. } => last_error.http_status(),
            Self::BudgetExceeded(_) => 402,
            Self::ContentFiltered(_) => 400,
            Self::Cache(_) => 500,
            Self::Config(_) => 500,
            Self::Template(_) => 400,
            Self::Serialization(_) => 500,
            Self::Yaml(_) => 500,
            Self::Io(_) => 500,
            Self::Cancelled(_) => 499,
            Self::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for the wire format
    pub fn wire_code(&self) -> String {
        match self {
            Self::Validation(_) => "validation_error".to_string(),
            Self::ModelNotFound(_) => "model_not_found".to_string(),
            Self::ProviderNotFound(_) => "provider_not_found".to_string(),
            Self::Forbidden(_) => "forbidden".to_string(),
            Self::NotFound(_) => "not_found".to_string(),
            Self::Routing(_) => "routing_error".to_string(),
            Self::Provider(err) => format!("provider_error:{}", err.code()),
            Self::FallbackExhausted { .. } => "fallback_exhausted".to_string(),
            Self::BudgetExceeded(_) => "budget_exceeded".to_string(),
            Self::ContentFiltered(_) => "content_filtered".to_string(),
            Self::Cache(_) => "cache_error".to_string(),
            Self::Config(_) => "config_error".to_string(),
            Self::Template(_) => "template_error".to_string(),
            Self::Serialization(_) | Self::Yaml(_) => "serialization_error".to_string(),
            Self::Io(_) => "io_error".to_string(),
            Self::Cancelled(_) => "cancelled".to_string(),
            Self::Internal(_) => "internal_error".to_string(),
        }
    }

    /// The provider error code, when one is attached
    pub fn provider_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Provider(err) => Some(err.code()),
            Self::FallbackExhausted { last_error, .. } => Some(last_error.code()),
            _ => None,
        }
    }

    /// Build the client-facing wire representation
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.wire_code(),
                message: self.to_string(),
                data: None,
            },
        }
    }
}

/// Client-facing error envelope: `{"error": {"code", "message", "data?"}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error payload
    pub error: ErrorDetail,
}

/// Error payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Optional structured detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
