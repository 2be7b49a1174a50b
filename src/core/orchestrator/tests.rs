//! Orchestrator unit tests
//!
//! End-to-end pipeline behavior is covered by the integration suite;
//! these tests pin the small decision helpers.

use super::*;
use crate::core::cache::{InMemoryCache, ResponseCache, ResponseCacheConfig};
use crate::core::cost::{CostConfig, CostEngine, InMemoryCostRepo};
use crate::core::experiments::{ExperimentEngine, InMemoryAbRepo};
use crate::core::filter::{ContentFilter, FilterConfig};
use crate::core::providers::MockProvider;
use crate::core::registry::{ModelMapping, ModelRegistry, RegistryConfig};
use crate::core::router::FallbackRoutes;
use crate::core::usage::InMemoryUsageRepo;
use std::time::Duration;

fn harness(fallbacks: FallbackRoutes) -> Orchestrator {
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(MockProvider::new("mock-a")));
    providers.register(Arc::new(MockProvider::new("mock-b")));
    let providers = Arc::new(providers);

    let registry = Arc::new(ModelRegistry::new(
        vec![
            ModelMapping::chat("gpt-x", "mock-a", "gpt-x-up"),
            ModelMapping::chat("gpt-y", "mock-b", "gpt-y-up"),
        ],
        providers.clone(),
        Arc::new(InMemoryCache::new()),
        RegistryConfig::default(),
    ));

    let router = Arc::new(Router::new(
        registry.clone(),
        Arc::new(ExperimentEngine::new(Arc::new(InMemoryAbRepo::new()))),
        fallbacks,
    ));

    Orchestrator::new(
        router,
        providers,
        Arc::new(ResponseCache::new(
            Arc::new(InMemoryCache::new()),
            ResponseCacheConfig::default(),
        )),
        Arc::new(ContentFilter::with_defaults(FilterConfig::default()).unwrap()),
        Arc::new(crate::core::usage::UsageTracker::new(Arc::new(
            InMemoryUsageRepo::new(),
        ))),
        Arc::new(CostEngine::new(
            registry,
            Arc::new(InMemoryCostRepo::new()),
            CostConfig::default(),
        )),
        Arc::new(crate::utils::tokenizer::TokenCounter::new()),
        FallbackPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(4),
        },
    )
}

#[test]
fn ping_bypasses_pipeline() {
    let orchestrator = harness(FallbackRoutes::new());
    assert_eq!(orchestrator.ping(), "pong");
}

#[test]
fn fallback_candidate_walks_the_chain() {
    let orchestrator = harness(
        FallbackRoutes::new().add_general(
            "gpt-x",
            vec!["gpt-y".to_string(), "gpt-z".to_string()],
        ),
    );

    let pick = |attempt, last: &str| {
        orchestrator.fallback_candidate("gpt-x", ErrorCode::RateLimit, attempt, last)
    };

    assert_eq!(pick(1, "gpt-x").as_deref(), Some("gpt-y"));
    assert_eq!(pick(2, "gpt-y").as_deref(), Some("gpt-z"));
    // Past the end of the list, the last candidate is retried.
    assert_eq!(pick(3, "gpt-q").as_deref(), Some("gpt-z"));
}

#[test]
fn fallback_candidate_skips_repeat_of_last_failure() {
    let orchestrator = harness(
        FallbackRoutes::new().add_general(
            "gpt-x",
            vec!["gpt-y".to_string(), "gpt-z".to_string()],
        ),
    );

    // The attempt index points at the model that just failed; the
    // candidate advances instead of repeating it.
    let pick = orchestrator.fallback_candidate("gpt-x", ErrorCode::RateLimit, 1, "gpt-y");
    assert_eq!(pick.as_deref(), Some("gpt-z"));

    // Nothing after the duplicate means no candidate.
    let pick = orchestrator.fallback_candidate("gpt-x", ErrorCode::RateLimit, 2, "gpt-z");
    assert_eq!(pick, None);
}

#[test]
fn fallback_candidate_empty_chain_is_none() {
    let orchestrator = harness(FallbackRoutes::new());
    assert_eq!(
        orchestrator.fallback_candidate("gpt-x", ErrorCode::RateLimit, 1, "gpt-x"),
        None
    );
}

#[test]
fn attribution_prefers_request_fields() {
    let ctx = RequestContext::default()
        .with_user("ctx-user")
        .with_api_key("key-1")
        .with_project("ctx-project");

    let attribution = Attribution::resolve(Some("req-user"), Some("req-project"), &ctx);
    assert_eq!(attribution.user_id, "req-user");
    assert_eq!(attribution.project_id.as_deref(), Some("req-project"));
    assert_eq!(attribution.api_key_id.as_deref(), Some("key-1"));

    let attribution = Attribution::resolve(None, None, &ctx);
    assert_eq!(attribution.user_id, "ctx-user");
    assert_eq!(attribution.project_id.as_deref(), Some("ctx-project"));

    let attribution = Attribution::resolve(None, None, &RequestContext::default());
    assert_eq!(attribution.user_id, "anonymous");
}
