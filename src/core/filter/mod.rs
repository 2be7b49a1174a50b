//! Content filter
//!
//! Three-stage moderation gate applied to prompts before routing and to
//! completions before they leave the gateway:
//!
//! 1. blocked terms — case-insensitive substring match
//! 2. blocked patterns — case-insensitive regex match
//! 3. classification — per-category scores against configured thresholds
//!
//! The filter denies on the first stage that trips; otherwise the content
//! is allowed.

mod classifier;
#[cfg(test)]
mod tests;

pub use classifier::{ContentClassifier, KeywordClassifier};

use crate::core::types::CompletionRequest;
use crate::utils::error::{GatewayError, Result};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Moderation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Hateful content
    Hate,
    /// Harassment
    Harassment,
    /// Self-harm
    SelfHarm,
    /// Sexual content
    Sexual,
    /// Violence
    Violence,
}

impl Category {
    /// Every category, in threshold-evaluation order
    pub const ALL: [Category; 5] = [
        Category::Hate,
        Category::Harassment,
        Category::SelfHarm,
        Category::Sexual,
        Category::Violence,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Hate => "hate",
            Category::Harassment => "harassment",
            Category::SelfHarm => "self_harm",
            Category::Sexual => "sexual",
            Category::Violence => "violence",
        };
        write!(f, "{}", s)
    }
}

/// Content filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Master switch
    pub enabled: bool,
    /// Run the filter over incoming prompts
    pub filter_prompts: bool,
    /// Run the filter over generated completions
    pub filter_completions: bool,
    /// Substrings that always deny
    pub blocked_terms: Vec<String>,
    /// Regex patterns that always deny
    pub blocked_patterns: Vec<String>,
    /// Per-category score thresholds in `[0, 1]`
    pub category_thresholds: HashMap<Category, f64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let mut category_thresholds = HashMap::new();
        for category in Category::ALL {
            category_thresholds.insert(category, 0.8);
        }
        Self {
            enabled: true,
            filter_prompts: true,
            filter_completions: true,
            blocked_terms: Vec::new(),
            blocked_patterns: Vec::new(),
            category_thresholds,
        }
    }
}

/// Outcome of a filter evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    /// Whether the content may pass
    pub allowed: bool,
    /// Denial reason, e.g. `blocked_term:forbidden`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Categories whose thresholds were crossed
    pub categories: Vec<Category>,
    /// Scores produced by the classifier
    pub scores: HashMap<Category, f64>,
}

impl FilterResult {
    fn allowed(scores: HashMap<Category, f64>) -> Self {
        Self {
            allowed: true,
            reason: None,
            categories: Vec::new(),
            scores,
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            categories: Vec::new(),
            scores: HashMap::new(),
        }
    }
}

/// Three-stage content filter
pub struct ContentFilter {
    config: FilterConfig,
    patterns: Vec<regex::Regex>,
    classifier: Arc<dyn ContentClassifier>,
}

impl ContentFilter {
    /// Build a filter, compiling the blocked patterns.
    ///
    /// Fails on an invalid regex; a misconfigured deny rule must not be
    /// silently skipped.
    pub fn new(config: FilterConfig, classifier: Arc<dyn ContentClassifier>) -> Result<Self> {
        let mut patterns = Vec::with_capacity(config.blocked_patterns.len());
        for pattern in &config.blocked_patterns {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|err| {
                    GatewayError::Config(format!("invalid blocked pattern '{}': {}", pattern, err))
                })?;
            patterns.push(compiled);
        }
        Ok(Self {
            config,
            patterns,
            classifier,
        })
    }

    /// Build a filter with the keyword baseline classifier
    pub fn with_defaults(config: FilterConfig) -> Result<Self> {
        Self::new(config, Arc::new(KeywordClassifier::new()))
    }

    /// The active configuration
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Evaluate a single string through all three stages
    pub async fn evaluate(&self, text: &str) -> FilterResult {
        if !self.config.enabled {
            return FilterResult::allowed(HashMap::new());
        }

        let lowered = text.to_lowercase();
        for term in &self.config.blocked_terms {
            if lowered.contains(&term.to_lowercase()) {
                debug!(term, "content denied by blocked term");
                return FilterResult::denied(format!("blocked_term:{}", term));
            }
        }

        for pattern in &self.patterns {
            if pattern.is_match(text) {
                debug!(pattern = pattern.as_str(), "content denied by blocked pattern");
                return FilterResult::denied("blocked_pattern".to_string());
            }
        }

        let scores = match self.classifier.classify(text).await {
            Ok(scores) => scores,
            Err(err) => {
                // Classifier trouble is not a reason to block traffic.
                warn!(%err, "content classifier failed, allowing");
                return FilterResult::allowed(HashMap::new());
            }
        };

        let mut crossed = Vec::new();
        for category in Category::ALL {
            let score = scores.get(&category).copied().unwrap_or(0.0);
            let threshold = self
                .config
                .category_thresholds
                .get(&category)
                .copied()
                .unwrap_or(1.0);
            if score >= threshold {
                crossed.push(category);
            }
        }

        if crossed.is_empty() {
            FilterResult::allowed(scores)
        } else {
            let detail: Vec<String> = crossed
                .iter()
                .map(|c| format!("{}={:.2}", c, scores.get(c).copied().unwrap_or(0.0)))
                .collect();
            FilterResult {
                allowed: false,
                reason: Some(format!("category_threshold:{}", detail.join(","))),
                categories: crossed,
                scores,
            }
        }
    }

    /// Evaluate arbitrary content.
    ///
    /// If the string parses as a completion request, each message content
    /// is filtered recursively, short-circuiting on the first denial.
    pub async fn filter_content(&self, content: &str) -> FilterResult {
        if let Ok(request) = serde_json::from_str::<CompletionRequest>(content) {
            for message in &request.messages {
                if let Some(message_content) = &message.content {
                    let result = self.evaluate(&message_content.as_text()).await;
                    if !result.allowed {
                        return result;
                    }
                }
            }
            return FilterResult::allowed(HashMap::new());
        }
        self.evaluate(content).await
    }

    /// Filter an incoming prompt, message by message.
    ///
    /// No-op unless `filter_prompts` is set.
    pub async fn filter_prompt(&self, request: &CompletionRequest) -> FilterResult {
        if !self.config.enabled || !self.config.filter_prompts {
            return FilterResult::allowed(HashMap::new());
        }
        for message in &request.messages {
            if let Some(content) = &message.content {
                let result = self.evaluate(&content.as_text()).await;
                if !result.allowed {
                    return result;
                }
            }
        }
        FilterResult::allowed(HashMap::new())
    }

    /// Filter a generated completion. No-op unless `filter_completions` is set.
    pub async fn filter_completion(&self, text: &str) -> FilterResult {
        if !self.config.enabled || !self.config.filter_completions {
            return FilterResult::allowed(HashMap::new());
        }
        self.evaluate(text).await
    }
}
