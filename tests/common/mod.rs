//! Shared test fixtures
//!
//! A three-provider gateway: `alpha` serves `gpt-x`, `beta` serves
//! `gpt-y`, `gamma` serves `gpt-z`. The fallback chain for `gpt-x` is
//! `[gpt-y, gpt-z]` and backoff is shortened so fallback tests run in
//! milliseconds.

use modelgate::core::cost::{CostRecord, InMemoryCostRepo};
use modelgate::core::experiments::InMemoryAbRepo;
use modelgate::core::providers::MockProvider;
use modelgate::core::registry::{ModelCapabilities, ModelMapping};
use modelgate::core::usage::InMemoryUsageRepo;
use modelgate::core::usage::OperationType;
use modelgate::{Gateway, GatewayConfig};
use std::sync::Arc;
use std::time::Duration;

pub struct TestBed {
    pub gateway: Gateway,
    pub alpha: Arc<MockProvider>,
    pub beta: Arc<MockProvider>,
    pub gamma: Arc<MockProvider>,
    pub usage_repo: Arc<InMemoryUsageRepo>,
    pub cost_repo: Arc<InMemoryCostRepo>,
    pub ab_repo: Arc<InMemoryAbRepo>,
}

pub fn default_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.cache.ttl = Duration::from_secs(60);
    config.fallback.backoff_base = Duration::from_millis(1);
    config.fallback.backoff_cap = Duration::from_millis(4);
    config
        .fallback_routes
        .general
        .insert("gpt-x".to_string(), vec!["gpt-y".to_string(), "gpt-z".to_string()]);
    config
        .filter
        .blocked_terms
        .push("forbidden".to_string());
    config.provider_timeout = Duration::from_secs(5);
    config
}

pub fn testbed(config: GatewayConfig) -> TestBed {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    let gamma = Arc::new(MockProvider::new("gamma"));
    let usage_repo = Arc::new(InMemoryUsageRepo::new());
    let cost_repo = Arc::new(InMemoryCostRepo::new());
    let ab_repo = Arc::new(InMemoryAbRepo::new());

    let gateway = Gateway::builder(config)
        .register_provider(alpha.clone())
        .register_provider(beta.clone())
        .register_provider(gamma.clone())
        .add_model(
            ModelMapping::chat("gpt-x", "alpha", "alpha-gpt-x").with_pricing(0.03, 0.06),
        )
        .add_model(
            ModelMapping::chat("gpt-y", "beta", "beta-gpt-y").with_pricing(0.02, 0.04),
        )
        .add_model(
            ModelMapping::chat("gpt-z", "gamma", "gamma-gpt-z").with_pricing(0.01, 0.02),
        )
        .add_model(
            ModelMapping::chat("embed-x", "alpha", "alpha-embed")
                .with_capabilities(ModelCapabilities {
                    embedding: true,
                    ..Default::default()
                })
                .with_pricing(0.0001, 0.0),
        )
        .with_usage_repo(usage_repo.clone())
        .with_cost_repo(cost_repo.clone())
        .with_ab_repo(ab_repo.clone())
        .build()
        .expect("testbed gateway builds");

    TestBed {
        gateway,
        alpha,
        beta,
        gamma,
        usage_repo,
        cost_repo,
        ab_repo,
    }
}

/// A cost record representing prior spend, for budget scenarios
pub fn prior_spend(user: &str, cost_usd: f64) -> CostRecord {
    CostRecord {
        id: uuid_like(),
        request_id: uuid_like(),
        user_id: user.to_string(),
        project_id: None,
        provider: "alpha".to_string(),
        model_id: "gpt-x".to_string(),
        operation: OperationType::Completion,
        timestamp: chrono::Utc::now(),
        total_tokens: 1000,
        cost_usd,
        tags: Vec::new(),
    }
}

fn uuid_like() -> String {
    uuid::Uuid::new_v4().to_string()
}
