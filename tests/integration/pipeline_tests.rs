//! Unary pipeline scenarios: caching, fallback, budgets, filtering

use crate::common::{default_config, prior_spend, testbed};
use modelgate::core::cost::{Budget, CostRepo, ResetPeriod};
use modelgate::core::types::Usage;
use modelgate::core::usage::UsageRepo;
use modelgate::{
    CompletionRequest, EmbeddingRequest, GatewayError, ProviderError, RequestContext,
};
use chrono::{Duration as ChronoDuration, Utc};

fn deterministic_request() -> CompletionRequest {
    CompletionRequest::new("gpt-x")
        .add_user_message("hi")
        .with_temperature(0.0)
        .with_user("u1")
}

fn monthly_budget(user: &str, amount: f64) -> Budget {
    Budget {
        id: "b1".to_string(),
        owner_user_id: user.to_string(),
        project_id: None,
        amount_usd: amount,
        start_date: Utc::now() - ChronoDuration::days(60),
        end_date: None,
        reset_period: ResetPeriod::Monthly,
        alert_threshold_pct: 80.0,
        enforce: true,
        tags: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// S1: a cacheable request served twice invokes the provider once and
// yields byte-identical responses and exactly one usage record.
#[tokio::test]
async fn cache_hit_serves_identical_response_without_second_call() {
    let bed = testbed(default_config());
    let request = deterministic_request();

    let first = bed
        .gateway
        .completion(request.clone(), RequestContext::default())
        .await
        .expect("first call succeeds");
    let second = bed
        .gateway
        .completion(request, RequestContext::default())
        .await
        .expect("second call succeeds");

    assert_eq!(bed.alpha.completion_calls(), 1);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(bed.usage_repo.len(), 1);
}

// S2: RATE_LIMIT on the primary walks the chain; the response restores
// the requested model and reports the serving provider.
#[tokio::test]
async fn fallback_on_rate_limit_serves_from_chain() {
    let bed = testbed(default_config());
    bed.alpha.enqueue_error(ProviderError::rate_limit("alpha", None));
    bed.beta.enqueue_error(ProviderError::unavailable("beta", "down"));
    bed.gamma.enqueue_response("rescued", Usage::completion(10, 5));

    let response = bed
        .gateway
        .completion(deterministic_request(), RequestContext::default())
        .await
        .expect("fallback rescues the request");

    assert_eq!(response.model, "gpt-x");
    assert_eq!(response.provider, "gamma");
    assert_eq!(response.usage, Usage::completion(10, 5));

    assert_eq!(bed.alpha.completion_calls(), 1);
    assert_eq!(bed.beta.completion_calls(), 1);
    assert_eq!(bed.gamma.completion_calls(), 1);

    let records = bed
        .usage_repo
        .records_for_provider(
            "gamma",
            Utc::now() - ChronoDuration::hours(1),
            Utc::now() + ChronoDuration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(bed.usage_repo.len(), 1);
    assert_eq!(records[0].model_id, "gpt-z");
    assert_eq!(records[0].total_tokens, 15);
}

// S3: every fallback fails; the last error is wrapped, nothing is cached
// and nothing is tracked.
#[tokio::test]
async fn fallback_exhaustion_wraps_last_error() {
    let mut config = default_config();
    config.fallback.max_attempts = 2;
    let bed = testbed(config);

    bed.alpha.enqueue_error(ProviderError::rate_limit("alpha", None));
    bed.beta.enqueue_error(ProviderError::unavailable("beta", "down"));
    bed.gamma.enqueue_error(ProviderError::upstream("gamma", 502, "bad gateway"));

    let err = bed
        .gateway
        .completion(deterministic_request(), RequestContext::default())
        .await
        .expect_err("all attempts fail");

    match err {
        GatewayError::FallbackExhausted { attempts, last_error } => {
            assert_eq!(attempts, 2);
            assert_eq!(last_error.code(), modelgate::ErrorCode::Upstream5xx);
        }
        other => panic!("expected FallbackExhausted, got {other:?}"),
    }

    // Invariant 5: 1 primary + maxFallbackAttempts provider calls.
    assert_eq!(
        bed.alpha.completion_calls() + bed.beta.completion_calls() + bed.gamma.completion_calls(),
        3
    );
    assert_eq!(bed.usage_repo.len(), 0);

    // No cache write happened: a retry reaches the provider again.
    bed.alpha.enqueue_response("recovered", Usage::completion(1, 1));
    let response = bed
        .gateway
        .completion(deterministic_request(), RequestContext::default())
        .await
        .expect("primary recovered");
    assert_eq!(response.provider, "alpha");
    assert_eq!(bed.alpha.completion_calls(), 2);
}

// S4: an enforced budget with no headroom denies before any provider call.
#[tokio::test]
async fn budget_enforcement_blocks_before_provider_call() {
    let bed = testbed(default_config());
    bed.cost_repo.create_budget(monthly_budget("u1", 10.0)).await.unwrap();
    bed.cost_repo.create_cost_record(prior_spend("u1", 9.90)).await.unwrap();

    // Large max_tokens pushes the estimate well past the $0.10 headroom.
    let request = deterministic_request().with_max_tokens(4000);
    let err = bed
        .gateway
        .completion(request, RequestContext::default())
        .await
        .expect_err("budget denies");

    assert!(matches!(err, GatewayError::BudgetExceeded(_)));
    assert_eq!(bed.alpha.completion_calls(), 0);
    assert_eq!(bed.usage_repo.len(), 0);
}

// S4 complement: headroom admits the request and the spend is recorded.
#[tokio::test]
async fn budget_with_headroom_admits_and_accumulates() {
    let bed = testbed(default_config());
    bed.cost_repo.create_budget(monthly_budget("u1", 10.0)).await.unwrap();

    let response = bed
        .gateway
        .completion(deterministic_request().with_max_tokens(10), RequestContext::default())
        .await
        .expect("within budget");
    assert_eq!(response.model, "gpt-x");
    assert_eq!(bed.alpha.completion_calls(), 1);

    let (spend, _) = bed
        .cost_repo
        .total_cost(&modelgate::core::cost::CostFilter::for_user("u1"))
        .await
        .unwrap();
    assert!(spend > 0.0);
}

// S5: a blocked term denies the prompt before routing.
#[tokio::test]
async fn content_filter_blocks_prompt_before_provider() {
    let bed = testbed(default_config());
    let request = CompletionRequest::new("gpt-x")
        .add_user_message("please do the forbidden thing")
        .with_temperature(0.0);

    let err = bed
        .gateway
        .completion(request, RequestContext::default())
        .await
        .expect_err("prompt is blocked");

    match err {
        GatewayError::ContentFiltered(reason) => {
            assert_eq!(reason, "blocked_term:forbidden");
        }
        other => panic!("expected ContentFiltered, got {other:?}"),
    }
    assert_eq!(bed.alpha.completion_calls(), 0);
}

// Unknown models fail routing with a client error.
#[tokio::test]
async fn unknown_model_is_a_routing_error() {
    let bed = testbed(default_config());
    let err = bed
        .gateway
        .completion(
            CompletionRequest::new("no-such-model").add_user_message("hi"),
            RequestContext::default(),
        )
        .await
        .expect_err("unknown model");
    assert!(matches!(err, GatewayError::Routing(_)));
}

// Non-retryable provider errors surface immediately without fallback.
#[tokio::test]
async fn auth_errors_do_not_trigger_fallback() {
    let bed = testbed(default_config());
    bed.alpha.enqueue_error(ProviderError::auth("alpha", "bad key"));

    let err = bed
        .gateway
        .completion(deterministic_request(), RequestContext::default())
        .await
        .expect_err("auth error surfaces");

    match err {
        GatewayError::Provider(p) => assert_eq!(p.code(), modelgate::ErrorCode::Auth),
        other => panic!("expected Provider error, got {other:?}"),
    }
    assert_eq!(bed.beta.completion_calls(), 0);
    assert_eq!(bed.gamma.completion_calls(), 0);
}

// Embeddings cache unconditionally and record input-only usage.
#[tokio::test]
async fn embedding_pipeline_caches_and_tracks() {
    let bed = testbed(default_config());
    let request = EmbeddingRequest::new("embed-x", "some text to embed");

    let first = bed
        .gateway
        .embedding(request.clone(), RequestContext::default().with_user("u1"))
        .await
        .expect("embedding succeeds");
    let second = bed
        .gateway
        .embedding(request, RequestContext::default().with_user("u1"))
        .await
        .expect("embedding cached");

    assert_eq!(bed.alpha.embedding_calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first.model, "embed-x");
    assert_eq!(first.provider, "alpha");

    assert_eq!(bed.usage_repo.len(), 1);
    let records = bed
        .usage_repo
        .records_for_user(
            "u1",
            Utc::now() - ChronoDuration::hours(1),
            Utc::now() + ChronoDuration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(records[0].completion_tokens, 0);
    assert_eq!(records[0].total_tokens, records[0].prompt_tokens);
}

// A fallback-served completion must not pin itself into the cache.
#[tokio::test]
async fn fallback_responses_are_not_cached() {
    let bed = testbed(default_config());
    bed.alpha.enqueue_error(ProviderError::rate_limit("alpha", None));

    let first = bed
        .gateway
        .completion(deterministic_request(), RequestContext::default())
        .await
        .expect("fallback serves");
    assert_eq!(first.provider, "beta");

    // Primary is healthy again: the next identical request must reach it
    // instead of replaying the degraded answer.
    let second = bed
        .gateway
        .completion(deterministic_request(), RequestContext::default())
        .await
        .expect("primary serves");
    assert_eq!(second.provider, "alpha");
    assert_eq!(bed.alpha.completion_calls(), 2);
}

#[tokio::test]
async fn ping_bypasses_pipeline() {
    let bed = testbed(default_config());
    assert_eq!(bed.gateway.ping(), "pong");
    assert_eq!(bed.alpha.completion_calls(), 0);
}
