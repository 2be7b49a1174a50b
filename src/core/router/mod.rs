//! Request router
//!
//! Resolves a request's logical model id to `{provider, provider model}`,
//! applying A/B experiment overrides first and checking that the mapped
//! model actually supports the requested operation. Also owns the
//! fallback route tables consulted by the orchestrators after provider
//! failures.

mod fallback;

pub use fallback::{FallbackPolicy, FallbackRoutes};

use crate::core::experiments::ExperimentEngine;
use crate::core::registry::{ModelMapping, ModelRegistry};
use crate::core::types::{CompletionRequest, EmbeddingRequest, ErrorCode};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a routing decision, ephemeral per request
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingResult {
    /// Whether routing succeeded
    pub success: bool,
    /// Provider that should serve the request
    pub provider: String,
    /// Model id to pass to the provider
    pub provider_model_id: String,
    /// Logical model id after A/B override
    pub effective_model_id: String,
    /// Failure detail when `success` is false
    pub error: Option<String>,
}

impl RoutingResult {
    fn ok(mapping: &ModelMapping, effective_model_id: String) -> Self {
        Self {
            success: true,
            provider: mapping.provider.clone(),
            provider_model_id: mapping.provider_model_id.clone(),
            effective_model_id,
            error: None,
        }
    }

    fn failed(effective_model_id: String, error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider: String::new(),
            provider_model_id: String::new(),
            effective_model_id,
            error: Some(error.into()),
        }
    }
}

/// The operation a routing decision must support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Chat completion (unary or streaming)
    Completion,
    /// Text embedding
    Embedding,
}

/// Model router
pub struct Router {
    registry: Arc<ModelRegistry>,
    experiments: Arc<ExperimentEngine>,
    fallbacks: FallbackRoutes,
}

impl Router {
    /// Create a router
    pub fn new(
        registry: Arc<ModelRegistry>,
        experiments: Arc<ExperimentEngine>,
        fallbacks: FallbackRoutes,
    ) -> Self {
        Self {
            registry,
            experiments,
            fallbacks,
        }
    }

    /// The model registry behind this router
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Route a completion request.
    ///
    /// The A/B engine may substitute the model; the effective id is
    /// recorded on the result either way.
    pub async fn route_completion(&self, request: &CompletionRequest) -> RoutingResult {
        let user = request.user.as_deref().unwrap_or("anonymous");
        let effective = self.experiments.model_for_user(&request.model, user).await;
        if effective != request.model {
            debug!(requested = %request.model, effective = %effective, "experiment override applied");
        }
        self.resolve(&effective, RouteKind::Completion).await
    }

    /// Route an embedding request
    pub async fn route_embedding(&self, request: &EmbeddingRequest) -> RoutingResult {
        let user = request.user.as_deref().unwrap_or("anonymous");
        let effective = self.experiments.model_for_user(&request.model, user).await;
        self.resolve(&effective, RouteKind::Embedding).await
    }

    /// Resolve a model id directly, without an A/B pass.
    ///
    /// Used for fallback attempts, where the effective model has already
    /// been decided.
    pub async fn resolve(&self, model_id: &str, kind: RouteKind) -> RoutingResult {
        let mapping = match self.registry.get_model(model_id).await {
            Ok(mapping) => mapping,
            Err(_) => {
                return RoutingResult::failed(
                    model_id.to_string(),
                    format!("unknown model: {}", model_id),
                );
            }
        };

        let supported = match kind {
            RouteKind::Completion => mapping.supports.completion,
            RouteKind::Embedding => mapping.supports.embedding,
        };
        if !supported {
            let operation = match kind {
                RouteKind::Completion => "completion",
                RouteKind::Embedding => "embedding",
            };
            return RoutingResult::failed(
                model_id.to_string(),
                format!("model {} does not support {}", model_id, operation),
            );
        }

        RoutingResult::ok(&mapping, model_id.to_string())
    }

    /// Configured fallback models for a failed (model, error code) pair
    pub fn fallback_models(&self, original_model_id: &str, code: ErrorCode) -> Vec<String> {
        self.fallbacks.resolve(original_model_id, code)
    }
}
