//! Experiment engine tests

use super::*;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

fn experiment(id: &str, control: &str, treatment: &str, pct: u8) -> Experiment {
    Experiment {
        id: id.to_string(),
        name: format!("experiment {}", id),
        active: true,
        start_date: Utc::now() - Duration::hours(1),
        end_date: None,
        traffic_allocation_pct: pct,
        control_model_id: control.to_string(),
        treatment_model_id: treatment.to_string(),
        user_segments: Vec::new(),
        metrics: vec!["latency_ms".to_string()],
        created_by: "tester".to_string(),
        created_at: Utc::now() - Duration::hours(1),
    }
}

async fn engine_with(experiments: Vec<Experiment>) -> ExperimentEngine {
    let repo = Arc::new(InMemoryAbRepo::new());
    for e in experiments {
        repo.create_experiment(e).await.unwrap();
    }
    ExperimentEngine::new(repo)
}

#[tokio::test]
async fn no_experiment_returns_requested_model() {
    let engine = engine_with(vec![]).await;
    assert_eq!(engine.model_for_user("gpt-x", "u1").await, "gpt-x");
}

#[tokio::test]
async fn full_allocation_routes_to_treatment() {
    let engine = engine_with(vec![experiment("e1", "gpt-x", "gpt-y", 100)]).await;
    assert_eq!(engine.model_for_user("gpt-x", "u1").await, "gpt-y");
}

#[tokio::test]
async fn zero_allocation_routes_to_control() {
    let engine = engine_with(vec![experiment("e1", "gpt-x", "gpt-y", 0)]).await;
    assert_eq!(engine.model_for_user("gpt-x", "u1").await, "gpt-x");
}

#[tokio::test]
async fn assignment_is_sticky_across_config_changes() {
    let repo = Arc::new(InMemoryAbRepo::new());
    repo.create_experiment(experiment("e1", "gpt-x", "gpt-y", 100))
        .await
        .unwrap();
    let engine = ExperimentEngine::new(repo.clone());

    assert_eq!(engine.model_for_user("gpt-x", "u1").await, "gpt-y");

    // Dropping the allocation to zero must not move already-assigned users.
    let mut updated = experiment("e1", "gpt-x", "gpt-y", 0);
    updated.created_at = repo.get_experiment("e1").await.unwrap().unwrap().created_at;
    repo.update_experiment(updated).await.unwrap();

    assert_eq!(engine.model_for_user("gpt-x", "u1").await, "gpt-y");
}

#[tokio::test]
async fn segment_outsiders_get_control() {
    let mut e = experiment("e1", "gpt-x", "gpt-y", 100);
    e.user_segments = vec!["u-special".to_string()];
    let engine = engine_with(vec![e]).await;

    assert_eq!(engine.model_for_user("gpt-x", "u-other").await, "gpt-x");
    assert_eq!(engine.model_for_user("gpt-x", "u-special").await, "gpt-y");
}

#[tokio::test]
async fn expired_experiments_are_ignored() {
    let mut e = experiment("e1", "gpt-x", "gpt-y", 100);
    e.end_date = Some(Utc::now() - Duration::minutes(5));
    let engine = engine_with(vec![e]).await;

    assert_eq!(engine.model_for_user("gpt-x", "u1").await, "gpt-x");
}

#[tokio::test]
async fn oldest_experiment_wins_tie() {
    let mut older = experiment("b-newer-id", "gpt-x", "gpt-old", 100);
    older.created_at = Utc::now() - Duration::hours(10);
    let newer = experiment("a-older-id", "gpt-x", "gpt-new", 100);

    let engine = engine_with(vec![newer, older]).await;
    assert_eq!(engine.model_for_user("gpt-x", "u1").await, "gpt-old");
}

#[tokio::test]
async fn assign_if_absent_is_first_writer_wins() {
    let repo = InMemoryAbRepo::new();
    let first = repo
        .assign_if_absent("e1", "u1", Variant::Treatment)
        .await
        .unwrap();
    let second = repo
        .assign_if_absent("e1", "u1", Variant::Control)
        .await
        .unwrap();
    assert_eq!(first, Variant::Treatment);
    assert_eq!(second, Variant::Treatment);
}

#[tokio::test]
async fn statistics_compare_variants() {
    let repo = Arc::new(InMemoryAbRepo::new());
    repo.create_experiment(experiment("e1", "gpt-x", "gpt-y", 50))
        .await
        .unwrap();
    let engine = ExperimentEngine::new(repo);

    for (i, (variant, value)) in [
        (Variant::Control, 100.0),
        (Variant::Control, 110.0),
        (Variant::Control, 105.0),
        (Variant::Treatment, 80.0),
        (Variant::Treatment, 85.0),
        (Variant::Treatment, 82.0),
    ]
    .into_iter()
    .enumerate()
    {
        engine
            .record_result(ExperimentResult {
                experiment_id: "e1".to_string(),
                user_id: format!("u{}", i),
                request_id: format!("req{}", i),
                variant,
                model_id: "gpt-x".to_string(),
                metrics: HashMap::from([("latency_ms".to_string(), value)]),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
    }

    let stats = engine.statistics("e1").await.unwrap();
    assert_eq!(stats.control_results, 3);
    assert_eq!(stats.treatment_results, 3);
    let latency = &stats.metrics[0];
    assert!(latency.treatment_mean < latency.control_mean);
    assert!(latency.pct_difference < 0.0);
    assert!(latency.p_value < 0.5);
}
