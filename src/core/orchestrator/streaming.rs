//! Streaming completion lifecycle
//!
//! Produces a lazy, finite, non-restartable chunk stream. Fallback is
//! only possible while no chunk has reached the consumer; the moment the
//! first chunk is handed over, the stream is committed and a later
//! provider failure surfaces as a partial-stream error. Silently
//! switching providers mid-stream would reorder delivered output, so it
//! never happens.
//!
//! Usage is tracked exactly once, on the final chunk (the one carrying a
//! finish reason), preferring provider-reported usage over estimation.
//! Consumer cancellation propagates to the provider by dropping its
//! stream and firing the request's cancellation token.

use super::{Attribution, Orchestrator};
use crate::core::providers::ChunkStream;
use crate::core::router::{RouteKind, RoutingResult};
use crate::core::types::{
    ChatChunk, CompletionRequest, ProviderError, RequestContext, Usage,
};
use crate::core::usage::UsageRecord;
use crate::utils::error::{GatewayError, Result};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tracing::{debug, warn};

/// Stream of chunks handed to the gateway's consumer
pub type GatewayStream = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// A provider stream whose first chunk has already been pulled
struct OpenedStream {
    route: RoutingResult,
    first_chunk: ChatChunk,
    rest: ChunkStream,
}

impl Orchestrator {
    /// Execute a streaming completion request.
    ///
    /// Returns once the first chunk is in hand, so routing errors and
    /// pre-delivery provider failures (after fallback) surface as plain
    /// errors rather than mid-stream ones.
    pub async fn complete_stream(
        &self,
        request: CompletionRequest,
        ctx: RequestContext,
    ) -> Result<GatewayStream> {
        request.validate().map_err(GatewayError::Validation)?;

        let verdict = self.filter.filter_prompt(&request).await;
        if !verdict.allowed {
            return Err(GatewayError::ContentFiltered(
                verdict.reason.unwrap_or_else(|| "prompt blocked".to_string()),
            ));
        }

        let route = self.router.route_completion(&request).await;
        if !route.success {
            return Err(GatewayError::Routing(
                route.error.unwrap_or_else(|| "routing failed".to_string()),
            ));
        }

        let attribution =
            Attribution::resolve(request.user.as_deref(), request.project_id.as_deref(), &ctx);
        self.enforce_stream_budget(&request, &route, &attribution).await?;

        let opened = self.open_stream_with_fallback(&request, route, &ctx).await?;
        Ok(self.bridge(request, ctx, attribution, opened))
    }

    async fn enforce_stream_budget(
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

    /// Open a provider stream and pull its first chunk, falling back while
    /// nothing has been delivered to the consumer yet.
    async fn open_stream_with_fallback(
        &self,
        request: &CompletionRequest,
        route: RoutingResult,
        ctx: &RequestContext,
    ) -> Result<OpenedStream> {
        let first_error = match self.try_open(&route, request, ctx).await {
            Ok(opened) => return Ok(opened),
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
                last_failed_model = pick;
                attempt += 1;
                continue;
            }

            self.backoff_or_cancel(attempt, ctx).await?;

            match self.try_open(&reroute, request, ctx).await {
                Ok(opened) => {
                    debug!(model = %pick, attempt, "stream fallback succeeded before delivery");
                    return Ok(opened);
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

    /// One attempt: open the stream and read its first chunk.
    ///
    /// An empty stream counts as an unavailable provider so the fallback
    /// loop treats it like any other transient failure.
    async fn try_open(
        &self,
        route: &RoutingResult,
        request: &CompletionRequest,
        ctx: &RequestContext,
    ) -> Result<OpenedStream> {
        let provider = self.provider_for(route)?;
        let mut provider_request = request.clone();
        provider_request.model = route.provider_model_id.clone();

        let open = provider.create_completion_stream(provider_request, ctx.clone());
        let mut stream = tokio::select! {
            outcome = tokio::time::timeout(ctx.timeout, open) => match outcome {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => return Err(GatewayError::Provider(err)),
                Err(_) => {
                    return Err(GatewayError::Provider(ProviderError::timeout(
                        route.provider.clone(),
                        format!("stream not opened within {:?}", ctx.timeout),
                    )));
                }
            },
            _ = ctx.cancellation.cancelled() => {
                return Err(GatewayError::Cancelled("cancelled while opening stream".to_string()));
            }
        };

        let first = tokio::select! {
            item = tokio::time::timeout(ctx.timeout, stream.next()) => match item {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(err))) => return Err(GatewayError::Provider(err)),
                Ok(None) => {
                    return Err(GatewayError::Provider(ProviderError::unavailable(
                        route.provider.clone(),
                        "stream ended before the first chunk",
                    )));
                }
                Err(_) => {
                    return Err(GatewayError::Provider(ProviderError::timeout(
                        route.provider.clone(),
                        format!("no chunk within {:?}", ctx.timeout),
                    )));
                }
            },
            _ = ctx.cancellation.cancelled() => {
                return Err(GatewayError::Cancelled("cancelled before first chunk".to_string()));
            }
        };

        Ok(OpenedStream {
            route: route.clone(),
            first_chunk: first,
            rest: stream,
        })
    }

    /// Wrap the committed provider stream into the consumer-facing stream:
    /// re-stamp identity on every chunk, preserve order, track usage on
    /// the final chunk, and surface mid-stream failures as partial errors.
    fn bridge(
        &self,
        request: CompletionRequest,
        ctx: RequestContext,
        attribution: Attribution,
        opened: OpenedStream,
    ) -> GatewayStream {
        let original_model = request.model.clone();
        let serving_provider = opened.route.provider.clone();
        let serving_model = opened.route.effective_model_id.clone();
        let prompt_estimate = self.tokens.count_messages(&request.model, &request.messages);
        let usage_tracker = self.usage.clone();
        let cost_engine = self.cost.clone();
        let token_counter = self.tokens.clone();
        let tags = request.tags.clone();

        let mut rest = opened.rest;
        let mut pending = Some(opened.first_chunk);

        let stream = async_stream::stream! {
            let mut accumulated = String::new();

            loop {
                let item = match pending.take() {
                    Some(chunk) => Some(Ok(chunk)),
                    None => tokio::select! {
                        item = rest.next() => item,
                        _ = ctx.cancellation.cancelled() => {
                            debug!(request_id = %ctx.request_id, "stream cancelled by consumer");
                            return;
                        }
                    },
                };

                let Some(item) = item else {
                    // Provider ended without a finish chunk; nothing to track.
                    warn!(request_id = %ctx.request_id, "stream ended without a final chunk");
                    return;
                };

                match item {
                    Ok(mut chunk) => {
                        chunk.model = original_model.clone();
                        chunk.provider = serving_provider.clone();
                        accumulated.push_str(&chunk.delta_text());

                        if chunk.is_final() {
                            let usage = chunk.usage.unwrap_or_else(|| {
                                Usage::completion(
                                    prompt_estimate,
                                    token_counter.count_text(&original_model, &accumulated),
                                )
                            });
                            chunk.usage = Some(usage);

                            let cost_usd = cost_engine
                                .completion_cost(
                                    &serving_provider,
                                    &serving_model,
                                    usage.prompt_tokens,
                                    usage.completion_tokens,
                                )
                                .await;
                            usage_tracker
                                .track(UsageRecord::for_completion(
                                    &ctx.request_id,
                                    &attribution.user_id,
                                    attribution.api_key_id.clone(),
                                    &serving_provider,
                                    &serving_model,
                                    usage,
                                    cost_usd,
                                    attribution.project_id.clone(),
                                    tags.clone(),
                                ))
                                .await;
                            cost_engine
                                .record(
                                    &ctx.request_id,
                                    &attribution.user_id,
                                    attribution.project_id.clone(),
                                    &serving_provider,
                                    &serving_model,
                                    crate::core::usage::OperationType::Completion,
                                    usage.total_tokens,
                                    cost_usd,
                                    tags.clone(),
                                )
                                .await;

                            yield Ok(chunk);
                            return;
                        }

                        yield Ok(chunk);
                    }
                    Err(err) => {
                        // The stream is committed: report the partial
                        // failure, never restart generation elsewhere.
                        warn!(request_id = %ctx.request_id, %err, "stream failed after delivery began");
                        yield Err(GatewayError::Provider(err));
                        return;
                    }
                }
            }
        };

        Box::pin(stream)
    }
}
