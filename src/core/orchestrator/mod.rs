//! Request orchestrators
//!
//! End-to-end lifecycles for unary completions, streaming completions,
//! and embeddings: content filtering, budget gating, cache lookup,
//! routing, the bounded fallback loop, and usage/cost tracking. The
//! per-operation implementations live in sibling files; this module owns
//! the shared state and the fallback plumbing.

mod completion;
mod embedding;
mod fine_tuning;
mod streaming;
#[cfg(test)]
mod tests;

pub use streaming::GatewayStream;

use crate::core::cache::ResponseCache;
use crate::core::cost::CostEngine;
use crate::core::filter::ContentFilter;
use crate::core::providers::{LlmProvider, ProviderRegistry};
use crate::core::router::{FallbackPolicy, Router, RoutingResult};
use crate::core::types::{ErrorCode, ProviderError, RequestContext};
use crate::core::usage::UsageTracker;
use crate::utils::error::{GatewayError, Result};
use crate::utils::tokenizer::TokenCounter;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared orchestrator over all request lifecycles
pub struct Orchestrator {
    pub(crate) router: Arc<Router>,
    pub(crate) providers: Arc<ProviderRegistry>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) filter: Arc<ContentFilter>,
    pub(crate) usage: Arc<UsageTracker>,
    pub(crate) cost: Arc<CostEngine>,
    pub(crate) tokens: Arc<TokenCounter>,
    pub(crate) policy: FallbackPolicy,
}

impl Orchestrator {
    /// Assemble an orchestrator from its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<Router>,
        providers: Arc<ProviderRegistry>,
        cache: Arc<ResponseCache>,
        filter: Arc<ContentFilter>,
        usage: Arc<UsageTracker>,
        cost: Arc<CostEngine>,
        tokens: Arc<TokenCounter>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            router,
            providers,
            cache,
            filter,
            usage,
            cost,
            tokens,
            policy,
        }
    }

    /// Health probe; bypasses the whole pipeline
    pub fn ping(&self) -> &'static str {
        "pong"
    }

    /// The usage tracker, for rollup queries
    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// The cost engine, for budget reports
    pub fn cost(&self) -> &Arc<CostEngine> {
        &self.cost
    }

    /// The router
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Resolve the provider instance behind a successful routing result
    pub(crate) fn provider_for(&self, route: &RoutingResult) -> Result<Arc<dyn LlmProvider>> {
        self.providers
            .get(&route.provider)
            .ok_or_else(|| GatewayError::ProviderNotFound(route.provider.clone()))
    }

    /// Pick the fallback candidate for the given attempt, applying the
    /// duplicate-skip rule. `None` means the chain is out of candidates.
    pub(crate) fn fallback_candidate(
        &self,
        original_model: &str,
        code: ErrorCode,
        attempt: u32,
        last_failed_model: &str,
    ) -> Option<String> {
        let fallbacks = self.router.fallback_models(original_model, code);
        if fallbacks.is_empty() {
            return None;
        }
        let index = ((attempt - 1) as usize).min(fallbacks.len() - 1);
        let pick = &fallbacks[index];
        if pick != last_failed_model {
            return Some(pick.clone());
        }
        // Re-picking the model that just failed is pointless; advance once.
        fallbacks.get(index + 1).cloned()
    }

    /// Sleep the backoff for an attempt, aborting early on cancellation
    pub(crate) async fn backoff_or_cancel(&self, attempt: u32, ctx: &RequestContext) -> Result<()> {
        let delay = self.policy.backoff(attempt);
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = ctx.cancellation.cancelled() => {
                Err(GatewayError::Cancelled("cancelled between fallback attempts".to_string()))
            }
        }
    }

    /// Log and classify a provider failure for the fallback loop
    pub(crate) fn note_provider_failure(
        route: &RoutingResult,
        attempt: u32,
        err: &ProviderError,
    ) {
        if err.is_retryable() {
            warn!(
                provider = %route.provider,
                model = %route.effective_model_id,
                attempt,
                code = %err.code(),
                "provider call failed, considering fallback"
            );
        } else {
            debug!(
                provider = %route.provider,
                model = %route.effective_model_id,
                code = %err.code(),
                "provider call failed terminally"
            );
        }
    }
}

/// Attribution resolved once per request
pub(crate) struct Attribution {
    pub user_id: String,
    pub api_key_id: Option<String>,
    pub project_id: Option<String>,
}

impl Attribution {
    /// Request fields win over context fields; an absent user becomes
    /// `anonymous`, matching the A/B engine's keying.
    pub fn resolve(
        request_user: Option<&str>,
        request_project: Option<&str>,
        ctx: &RequestContext,
    ) -> Self {
        Self {
            user_id: request_user
                .map(str::to_string)
                .or_else(|| ctx.user_id.clone())
                .unwrap_or_else(|| "anonymous".to_string()),
            api_key_id: ctx.api_key_id.clone(),
            project_id: request_project
                .map(str::to_string)
                .or_else(|| ctx.project_id.clone()),
        }
    }
}
