//! Unary completion lifecycle
//!
//! Pipeline: validate → prompt filter → cache lookup → route → budget
//! gate → provider call → (fallback loop) → completion filter → track →
//! cache store. Tracking happens exactly once per successful completion,
//! and the cache is only written when no fallback was involved.

use super::{Attribution, Orchestrator};
use crate::core::router::{RouteKind, RoutingResult};
use crate::core::types::{
    CompletionRequest, CompletionResponse, ProviderError, RequestContext,
};
use crate::core::usage::UsageRecord;
use crate::utils::error::{GatewayError, Result};
use tracing::debug;

/// Result of the provider/fallback phase
pub(crate) struct ServedCompletion {
    pub response: CompletionResponse,
    pub serving_provider: String,
    /// Logical id of the model that actually answered; differs from the
    /// requested id when a fallback served. Billing keys on this.
    pub serving_model: String,
    pub used_fallback: bool,
}

impl Orchestrator {
    /// Execute a unary completion request end to end
    pub async fn complete(
        &self,
        request: CompletionRequest,
        ctx: RequestContext,
    ) -> Result<CompletionResponse> {
        request.validate().map_err(GatewayError::Validation)?;
        if request.stream {
            return Err(GatewayError::Validation(
                "streaming requests go through complete_stream".to_string(),
            ));
        }

        let verdict = self.filter.filter_prompt(&request).await;
        if !verdict.allowed {
            return Err(GatewayError::ContentFiltered(
                verdict.reason.unwrap_or_else(|| "prompt blocked".to_string()),
            ));
        }

        if let Some(cached) = self.cache.get_completion(&request).await {
            debug!(request_id = %ctx.request_id, model = %request.model, "served from cache");
            return Ok(cached);
        }

        let route = self.router.route_completion(&request).await;
        if !route.success {
            return Err(GatewayError::Routing(
                route.error.unwrap_or_else(|| "routing failed".to_string()),
            ));
        }

        let attribution =
            Attribution::resolve(request.user.as_deref(), request.project_id.as_deref(), &ctx);
        self.enforce_completion_budget(&request, &route, &attribution)
            .await?;

        let original_model = request.model.clone();
        let served = self
            .serve_completion(&request, route, &ctx)
            .await?;
        let mut response = served.response;

        if let Some(text) = response.text() {
            let verdict = self.filter.filter_completion(&text).await;
            if !verdict.allowed {
                return Err(GatewayError::ContentFiltered(
                    verdict
                        .reason
                        .unwrap_or_else(|| "completion blocked".to_string()),
                ));
            }
        }

        // The client always sees the logical id it asked for; the provider
        // field records who actually answered.
        response.model = original_model;
        response.provider = served.serving_provider.clone();

        let cost_usd = self
            .cost
            .completion_cost(
                &served.serving_provider,
                &served.serving_model,
                response.usage.prompt_tokens,
                response.usage.completion_tokens,
            )
            .await;
        self.usage
            .track(UsageRecord::for_completion(
                &ctx.request_id,
                &attribution.user_id,
                attribution.api_key_id.clone(),
                &served.serving_provider,
                &served.serving_model,
                response.usage,
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
                &served.serving_provider,
                &served.serving_model,
                crate::core::usage::OperationType::Completion,
                response.usage.total_tokens,
                cost_usd,
                request.tags.clone(),
            )
            .await;

        self.cache
            .store_completion(&request, &response, served.used_fallback)
            .await;

        Ok(response)
    }

    /// Budget gate for a completion about to be sent upstream
    async fn enforce_completion_budget(
        &self,
        request: &CompletionRequest,
        route: &RoutingResult,
        attribution: &Attribution,
    ) -> Result<()> {
        let prompt_tokens = self.tokens.count_messages(&request.model, &request.messages);
        let output_tokens = request.max_tokens.unwrap_or(256);
        let estimated = self
            .cost
            .completion_cost(
                &route.provider,
                &route.effective_model_id,
                prompt_tokens,
                output_tokens,
            )
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
        Ok(())
    }

    /// Call the routed provider, falling back across alternative models on
    /// retryable errors, up to the policy bound.
    pub(crate) async fn serve_completion(
        &self,
        request: &CompletionRequest,
        route: RoutingResult,
        ctx: &RequestContext,
    ) -> Result<ServedCompletion> {
        let first_error = match self.call_unary(&route, request, ctx).await {
            Ok(response) => {
                return Ok(ServedCompletion {
                    response,
                    serving_provider: route.provider,
                    serving_model: route.effective_model_id,
                    used_fallback: false,
                });
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

            let reroute = self.router.resolve(&pick, RouteKind::Completion).await;
            if !reroute.success {
                debug!(model = %pick, "fallback candidate failed to route");
                last_failed_model = pick;
                attempt += 1;
                continue;
            }

            self.backoff_or_cancel(attempt, ctx).await?;

            match self.call_unary(&reroute, request, ctx).await {
                Ok(response) => {
                    debug!(model = %pick, attempt, "fallback attempt succeeded");
                    return Ok(ServedCompletion {
                        response,
                        serving_provider: reroute.provider,
                        serving_model: pick,
                        used_fallback: true,
                    });
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

    /// One provider call with timeout and cancellation applied
    async fn call_unary(
        &self,
        route: &RoutingResult,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<CompletionResponse> {
        let provider = self.provider_for(route)?;
        let mut provider_request = request.clone();
        provider_request.model = route.provider_model_id.clone();

        let call = provider.create_completion(provider_request, ctx.clone());
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
