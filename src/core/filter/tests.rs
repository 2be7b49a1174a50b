//! Content filter tests

use super::*;
use crate::core::types::CompletionRequest;

fn filter_with(config: FilterConfig) -> ContentFilter {
    ContentFilter::with_defaults(config).expect("valid filter config")
}

#[tokio::test]
async fn blocked_term_denies_with_reason() {
    let filter = filter_with(FilterConfig {
        blocked_terms: vec!["forbidden".to_string()],
        ..Default::default()
    });

    let result = filter.evaluate("please do the FORBIDDEN thing").await;
    assert!(!result.allowed);
    assert_eq!(result.reason.as_deref(), Some("blocked_term:forbidden"));
}

#[tokio::test]
async fn blocked_pattern_denies() {
    let filter = filter_with(FilterConfig {
        blocked_patterns: vec![r"\b\d{3}-\d{2}-\d{4}\b".to_string()],
        ..Default::default()
    });

    let result = filter.evaluate("my ssn is 123-45-6789").await;
    assert!(!result.allowed);
    assert_eq!(result.reason.as_deref(), Some("blocked_pattern"));
}

#[tokio::test]
async fn category_threshold_denies_with_scores() {
    let mut config = FilterConfig::default();
    config.category_thresholds.insert(Category::Violence, 0.4);
    let filter = filter_with(config);

    let result = filter.evaluate("he will attack with a weapon and kill").await;
    assert!(!result.allowed);
    assert!(result.categories.contains(&Category::Violence));
    assert!(result.scores[&Category::Violence] >= 0.4);
}

#[tokio::test]
async fn benign_text_is_allowed() {
    let filter = filter_with(FilterConfig {
        blocked_terms: vec!["forbidden".to_string()],
        ..Default::default()
    });

    let result = filter.evaluate("what is the capital of France?").await;
    assert!(result.allowed);
    assert!(result.reason.is_none());
}

#[tokio::test]
async fn disabled_filter_allows_everything() {
    let filter = filter_with(FilterConfig {
        enabled: false,
        blocked_terms: vec!["forbidden".to_string()],
        ..Default::default()
    });

    assert!(filter.evaluate("forbidden").await.allowed);
}

#[tokio::test]
async fn prompt_filter_respects_flag() {
    let filter = filter_with(FilterConfig {
        filter_prompts: false,
        blocked_terms: vec!["forbidden".to_string()],
        ..Default::default()
    });

    let request = CompletionRequest::new("gpt-x").add_user_message("forbidden");
    assert!(filter.filter_prompt(&request).await.allowed);

    // The completion side is still active.
    assert!(!filter.filter_completion("forbidden").await.allowed);
}

#[tokio::test]
async fn filter_content_recurses_into_request_json() {
    let filter = filter_with(FilterConfig {
        blocked_terms: vec!["forbidden".to_string()],
        ..Default::default()
    });

    let request = CompletionRequest::new("gpt-x")
        .add_system_message("you are helpful")
        .add_user_message("please do the forbidden thing");
    let json = serde_json::to_string(&request).unwrap();

    let result = filter.filter_content(&json).await;
    assert!(!result.allowed);
    assert_eq!(result.reason.as_deref(), Some("blocked_term:forbidden"));

    // A plain string still goes through the normal path.
    let result = filter.filter_content("the forbidden word").await;
    assert!(!result.allowed);
}

#[test]
fn invalid_pattern_is_a_config_error() {
    let result = ContentFilter::with_defaults(FilterConfig {
        blocked_patterns: vec!["(unclosed".to_string()],
        ..Default::default()
    });
    assert!(result.is_err());
}
