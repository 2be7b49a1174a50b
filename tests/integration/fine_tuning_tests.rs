//! Fine-tuning lifecycle scenarios

use crate::common::{default_config, testbed};
use modelgate::core::cost::{Budget, CostRepo, ResetPeriod};
use modelgate::core::providers::FineTuningJobStatus;
use modelgate::core::usage::{OperationType, UsageRepo};
use modelgate::{GatewayError, RequestContext};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;

// 4000 bytes of training data estimate to 1000 tokens at the priced rate.
const TRAINING_DATA: [u8; 4000] = [b'x'; 4000];

fn config_with_fine_tuning_pricing() -> modelgate::GatewayConfig {
    let mut config = default_config();
    config.cost.fine_tuning_pricing.insert(
        "alpha".to_string(),
        HashMap::from([("gpt-x".to_string(), 0.008)]),
    );
    config
}

#[tokio::test]
async fn fine_tuning_job_runs_and_meters_training_tokens() {
    let bed = testbed(config_with_fine_tuning_pricing());

    let job = bed
        .gateway
        .fine_tuning(
            "alpha",
            "gpt-x",
            "train.jsonl",
            &TRAINING_DATA,
            RequestContext::default().with_user("u1"),
        )
        .await
        .expect("job completes");

    assert_eq!(job.status, FineTuningJobStatus::Succeeded);
    assert_eq!(job.trained_tokens, Some(1000));
    assert!(job.fine_tuned_model.as_deref().unwrap().starts_with("ft:gpt-x:"));

    let records = bed
        .usage_repo
        .records_for_user(
            "u1",
            Utc::now() - ChronoDuration::hours(1),
            Utc::now() + ChronoDuration::hours(1),
        )
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.operation, OperationType::FineTuning);
    assert_eq!(record.provider, "alpha");
    assert_eq!(record.model_id, "gpt-x");
    assert_eq!(record.prompt_tokens, 1000);
    assert_eq!(record.completion_tokens, 0);
    assert_eq!(record.total_tokens, record.prompt_tokens);
    // 1000 training tokens at $0.008 per 1k.
    assert!((record.estimated_cost_usd - 0.008).abs() < 1e-9);

    let (spend, tokens) = bed
        .cost_repo
        .total_cost(&modelgate::core::cost::CostFilter::for_user("u1"))
        .await
        .unwrap();
    assert!((spend - 0.008).abs() < 1e-9);
    assert_eq!(tokens, 1000);
}

#[tokio::test]
async fn fine_tuning_respects_the_budget_gate() {
    let bed = testbed(config_with_fine_tuning_pricing());
    bed.cost_repo
        .create_budget(Budget {
            id: "b1".to_string(),
            owner_user_id: "u1".to_string(),
            project_id: None,
            amount_usd: 0.001,
            start_date: Utc::now() - ChronoDuration::days(1),
            end_date: None,
            reset_period: ResetPeriod::Monthly,
            alert_threshold_pct: 80.0,
            enforce: true,
            tags: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let err = bed
        .gateway
        .fine_tuning(
            "alpha",
            "gpt-x",
            "train.jsonl",
            &TRAINING_DATA,
            RequestContext::default().with_user("u1"),
        )
        .await
        .expect_err("budget denies the job");

    assert!(matches!(err, GatewayError::BudgetExceeded(_)));
    assert_eq!(bed.usage_repo.len(), 0);
}

#[tokio::test]
async fn fine_tuning_on_unknown_provider_fails() {
    let bed = testbed(config_with_fine_tuning_pricing());
    let err = bed
        .gateway
        .fine_tuning(
            "nonexistent",
            "gpt-x",
            "train.jsonl",
            &TRAINING_DATA,
            RequestContext::default(),
        )
        .await
        .expect_err("provider is not registered");
    assert!(matches!(err, GatewayError::ProviderNotFound(_)));
}
