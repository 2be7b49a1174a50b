//! Usage ledger tests

use super::*;
use crate::core::types::Usage;
use chrono::Duration as ChronoDuration;

fn record(user: &str, model: &str, provider: &str, prompt: u32, completion: u32) -> UsageRecord {
    UsageRecord::for_completion(
        &format!("req-{}", Uuid::new_v4()),
        user,
        None,
        provider,
        model,
        Usage::completion(prompt, completion),
        0.01,
        None,
        Vec::new(),
    )
}

#[tokio::test]
async fn appended_records_satisfy_token_invariant() {
    let completion = record("u1", "gpt-x", "mock", 10, 5);
    assert_eq!(completion.total_tokens, 15);

    let embedding =
        UsageRecord::for_embedding("req-1", "u1", None, "mock", "embed-x", 7, 0.001, None, vec![]);
    assert_eq!(embedding.total_tokens, embedding.prompt_tokens);
    assert_eq!(embedding.completion_tokens, 0);
}

#[tokio::test]
async fn queries_filter_by_dimension() {
    let repo = Arc::new(InMemoryUsageRepo::new());
    repo.append(record("u1", "gpt-x", "mock-a", 10, 5)).await.unwrap();
    repo.append(record("u2", "gpt-x", "mock-b", 20, 10)).await.unwrap();
    repo.append(record("u1", "gpt-y", "mock-a", 5, 5)).await.unwrap();

    let start = Utc::now() - ChronoDuration::hours(1);
    let end = Utc::now() + ChronoDuration::hours(1);

    assert_eq!(repo.records_for_user("u1", start, end).await.unwrap().len(), 2);
    assert_eq!(repo.records_for_model("gpt-x", start, end).await.unwrap().len(), 2);
    assert_eq!(repo.records_for_provider("mock-b", start, end).await.unwrap().len(), 1);
    assert_eq!(repo.records_in_range(start, end).await.unwrap().len(), 3);
}

#[tokio::test]
async fn summary_rolls_up_by_dimension() {
    let repo = Arc::new(InMemoryUsageRepo::new());
    let tracker = UsageTracker::new(repo);
    tracker.track(record("u1", "gpt-x", "mock-a", 10, 5)).await;
    tracker.track(record("u1", "gpt-y", "mock-a", 20, 10)).await;
    tracker.track(record("u2", "gpt-x", "mock-b", 30, 15)).await;

    let start = Utc::now() - ChronoDuration::hours(1);
    let end = Utc::now() + ChronoDuration::hours(1);
    let summary = tracker.summary(start, end).await.unwrap();

    assert_eq!(summary.totals.requests, 3);
    assert_eq!(summary.totals.total_tokens, 90);
    assert_eq!(summary.by_model["gpt-x"].requests, 2);
    assert_eq!(summary.by_provider["mock-a"].requests, 2);
    assert_eq!(summary.by_user["u2"].total_tokens, 45);
    assert!((summary.totals.cost_usd - 0.03).abs() < 1e-9);
}

#[tokio::test]
async fn bucketing_by_model_sorts_keys() {
    let repo = Arc::new(InMemoryUsageRepo::new());
    let tracker = UsageTracker::new(repo);
    tracker.track(record("u1", "zeta", "mock", 1, 1)).await;
    tracker.track(record("u1", "alpha", "mock", 1, 1)).await;

    let start = Utc::now() - ChronoDuration::hours(1);
    let end = Utc::now() + ChronoDuration::hours(1);
    let buckets = tracker
        .bucketed(start, end, UsageBucketing::Model)
        .await
        .unwrap();

    let keys: Vec<&str> = buckets.iter().map(|b| b.key.as_str()).collect();
    assert_eq!(keys, vec!["alpha", "zeta"]);
}

#[tokio::test]
async fn purge_removes_only_expired_records() {
    let repo = InMemoryUsageRepo::new();
    let mut old = record("u1", "gpt-x", "mock", 1, 1);
    old.timestamp = Utc::now() - ChronoDuration::days(120);
    repo.append(old).await.unwrap();
    repo.append(record("u1", "gpt-x", "mock", 1, 1)).await.unwrap();

    let purged = repo
        .purge_older_than(Utc::now() - ChronoDuration::days(90))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert_eq!(repo.len(), 1);
}

#[tokio::test]
async fn concurrent_appends_are_all_recorded() {
    let repo = Arc::new(InMemoryUsageRepo::new());
    let mut handles = Vec::new();
    for i in 0..32 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            assert!(
                repo.append(record(&format!("u{}", i % 4), "gpt-x", "mock", 1, 1))
                    .await
                    .is_ok()
            );
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(repo.len(), 32);
}
