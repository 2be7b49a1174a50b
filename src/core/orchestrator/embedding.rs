//! Embedding lifecycle
//!
//! The unary pipeline in its simplest form: embeddings are always
//! cacheable and have no streaming variant. Cost uses the input-only
//! formula; fallback-served responses are not cached.

use super::{Attribution, Orchestrator};
use crate::core::router::{RouteKind, RoutingResult};
use crate::core::types::{
    EmbeddingRequest, EmbeddingResponse, ProviderError, RequestContext,
};
use crate::core::usage::UsageRecord;
use crate::utils::error::{GatewayError, Result};
use tracing::debug;

impl Orchestrator {
    /// Execute an embedding request end to end
    pub async fn embed(
        &self,
        request: EmbeddingRequest,
        ctx: RequestContext,
    ) -> Result<EmbeddingResponse> {
        request.validate().map_err(GatewayError::Validation)?;

        if let Some(cached) = self.cache.get_embedding(&request).await {
            debug!(request_id = %ctx.request_id, model = %request.model, "served from cache");
            return Ok(cached);
        }

        let route = self.router.route_embedding(&request).await;
        if !route.success {
            return Err(GatewayError::Routing(
                route.error.unwrap_or_else(|| "routing failed".to_string()),
            ));
        }

        let attribution =
            Attribution::resolve(request.user.as_deref(), request.project_id.as_deref(), &ctx);

        let input_tokens = self.tokens.count_embedding_input(&request.model, &request.input);
        let estimated = self
            .cost
            .embedding_cost(&route.provider, &route.effective_model_id, input_tokens)
            .await;
        if !self
            .cost
            .is_within_budget(
                &attribution.user_id,
                attribution.project_id.as_deref(),
                estimated,
            )
            .await
        {
            return Err(GatewayError::BudgetExceeded(format!(
                "estimated cost ${:.4} exceeds the remaining budget for {}",
                estimated, attribution.user_id
            )));
        }

        let original_model = request.model.clone();
        let (mut response, serving_provider, serving_model, used_fallback) =
            self.serve_embedding(&request, route, &ctx).await?;

        response.model = original_model;
        response.provider = serving_provider.clone();

        let cost_usd = self
            .cost
            .embedding_cost(&serving_provider, &serving_model, response.usage.prompt_tokens)
            .await;
        self.usage
            .track(UsageRecord::for_embedding(
                &ctx.request_id,
                &attribution.user_id,
                attribution.api_key_id.clone(),
                &serving_provider,
                &serving_model,
                response.usage.prompt_tokens,
                cost_usd,
                attribution.project_id.clone(),
                request.tags.clone(),
            ))
            .await;
        self.cost
            .record(
                &ctx.request_id,
                &attribution.user_id,
                attribution.project_id.clone(),
                &serving_provider,
                &serving_model,
                crate::core::usage::OperationType::Embedding,
                response.usage.total_tokens,
                cost_usd,
                request.tags.clone(),
            )
            .await;

        self.cache
            .store_embedding(&request, &response, used_fallback)
            .await;

        Ok(response)
    }

    async fn serve_embedding(
        &self,
        request: &EmbeddingRequest,
        route: RoutingResult,
        ctx: &RequestContext,
    ) -> Result<(EmbeddingResponse, String, String, bool)> {
        let first_error = match self.call_embedding(&route, request, ctx).await {
            Ok(response) => {
                return Ok((response, route.provider, route.effective_model_id, false));
            }
            Err(GatewayError::Provider(err)) if err.is_retryable() => {
                Self::note_provider_failure(&route, 0, &err);
                err
            }
            Err(other) => return Err(other),
        };

        let mut last_error: ProviderError = first_error;
        let mut last_failed_model = route.effective_model_id.clone();
        let mut attempt = 1u32;

        while attempt <= self.policy.max_attempts {
            if ctx.cancellation.is_cancelled() {
                return Err(GatewayError::Cancelled(
                    "cancelled during fallback".to_string(),
                ));
            }

            let Some(pick) = self.fallback_candidate(
                &request.model,
                last_error.code(),
                attempt,
                &last_failed_model,
            ) else {
                return Err(GatewayError::FallbackExhausted {
                    attempts: attempt - 1,
                    last_error,
                });
            };

            let reroute = self.router.resolve(&pick, RouteKind::Embedding).await;
            if !reroute.success {
                last_failed_model = pick;
                attempt += 1;
                continue;
            }

            self.backoff_or_cancel(attempt, ctx).await?;

            match self.call_embedding(&reroute, request, ctx).await {
                Ok(response) => {
                    debug!(model = %pick, attempt, "embedding fallback succeeded");
                    return Ok((response, reroute.provider, pick, true));
                }
                Err(GatewayError::Provider(err)) if err.is_retryable() => {
                    Self::note_provider_failure(&reroute, attempt, &err);
                    last_error = err;
                    last_failed_model = pick;
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }

        Err(GatewayError::FallbackExhausted {
            attempts: self.policy.max_attempts,
            last_error,
        })
    }

    async fn call_embedding(
        &self,
        route: &RoutingResult,
        request: &EmbeddingRequest,
        ctx: &RequestContext,
    ) -> Result<EmbeddingResponse> {
        let provider = self.provider_for(route)?;
        let mut provider_request = request.clone();
        provider_request.model = route.provider_model_id.clone();

        let call = provider.create_embedding(provider_request, ctx.clone());
        tokio::select! {
            outcome = tokio::time::timeout(ctx.timeout, call) => match outcome {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(err)) => Err(GatewayError::Provider(err)),
                Err(_) => Err(GatewayError::Provider(ProviderError::timeout(
                    route.provider.clone(),
                    format!("no response within {:?}", ctx.timeout),
                ))),
            },
            _ = ctx.cancellation.cancelled() => {
                Err(GatewayError::Cancelled("cancelled during provider call".to_string()))
            }
        }
    }
}
