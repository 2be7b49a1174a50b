//! Token-usage ledger
//!
//! Append-only record of every billable operation, with rollups by user,
//! model, and provider, period-bucketed statistics, and a retention
//! sweep. Tracking is fire-and-forget from the orchestrators' point of
//! view: a ledger failure is logged and never fails the request.

mod repo;
#[cfg(test)]
mod tests;

pub use repo::{InMemoryUsageRepo, UsageRepo};

use crate::core::types::Usage;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// The billable operation a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    /// Chat completion, unary or streaming
    Completion,
    /// Text embedding
    Embedding,
    /// Fine-tuning job
    FineTuning,
}

/// One usage record
///
/// Invariant: for completions and fine-tuning,
/// `total_tokens == prompt_tokens + completion_tokens`; for embeddings,
/// `total_tokens == prompt_tokens`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Record id
    pub id: String,
    /// Request that produced the usage
    pub request_id: String,
    /// User attribution
    pub user_id: String,
    /// API key attribution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<String>,
    /// Provider that served the request
    pub provider: String,
    /// Logical model id
    pub model_id: String,
    /// Operation kind
    pub operation: OperationType,
    /// When the operation completed
    pub timestamp: DateTime<Utc>,
    /// Prompt tokens
    pub prompt_tokens: u32,
    /// Completion tokens
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
    /// Estimated cost in USD
    pub estimated_cost_usd: f64,
    /// Project attribution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl UsageRecord {
    /// Build a completion record from provider-reported usage
    #[allow(clippy::too_many_arguments)]
    pub fn for_completion(
        request_id: &str,
        user_id: &str,
        api_key_id: Option<String>,
        provider: &str,
        model_id: &str,
        usage: Usage,
        cost_usd: f64,
        project_id: Option<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            api_key_id,
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            operation: OperationType::Completion,
            timestamp: Utc::now(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.prompt_tokens + usage.completion_tokens,
            estimated_cost_usd: cost_usd,
            project_id,
            tags,
        }
    }

    /// Build a fine-tuning record over training tokens
    #[allow(clippy::too_many_arguments)]
    pub fn for_fine_tuning(
        request_id: &str,
        user_id: &str,
        api_key_id: Option<String>,
        provider: &str,
        model_id: &str,
        training_tokens: u32,
        cost_usd: f64,
        project_id: Option<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            api_key_id,
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            operation: OperationType::FineTuning,
            timestamp: Utc::now(),
            prompt_tokens: training_tokens,
            completion_tokens: 0,
            total_tokens: training_tokens,
            estimated_cost_usd: cost_usd,
            project_id,
            tags,
        }
    }

    /// Build an embedding record
    #[allow(clippy::too_many_arguments)]
    pub fn for_embedding(
        request_id: &str,
        user_id: &str,
        api_key_id: Option<String>,
        provider: &str,
        model_id: &str,
        prompt_tokens: u32,
        cost_usd: f64,
        project_id: Option<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            api_key_id,
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            operation: OperationType::Embedding,
            timestamp: Utc::now(),
            prompt_tokens,
            completion_tokens: 0,
            total_tokens: prompt_tokens,
            estimated_cost_usd: cost_usd,
            project_id,
            tags,
        }
    }
}

/// Aggregated counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct UsageTotals {
    /// Number of records
    pub requests: u64,
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
    /// Estimated cost in USD
    pub cost_usd: f64,
}

impl UsageTotals {
    fn add(&mut self, record: &UsageRecord) {
        self.requests += 1;
        self.prompt_tokens += u64::from(record.prompt_tokens);
        self.completion_tokens += u64::from(record.completion_tokens);
        self.total_tokens += u64::from(record.total_tokens);
        self.cost_usd += record.estimated_cost_usd;
    }
}

/// Time-ranged rollup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsageSummary {
    /// Grand totals
    pub totals: UsageTotals,
    /// Totals per logical model
    pub by_model: HashMap<String, UsageTotals>,
    /// Totals per provider
    pub by_provider: HashMap<String, UsageTotals>,
    /// Totals per user
    pub by_user: HashMap<String, UsageTotals>,
}

/// Grouping key for bucketed statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageBucketing {
    /// One bucket per UTC day
    Day,
    /// One bucket per UTC month
    Month,
    /// One bucket per logical model
    Model,
    /// One bucket per user
    User,
}

/// One bucket of a grouped rollup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageBucket {
    /// Bucket key: a date, month, model id, or user id
    pub key: String,
    /// Totals within the bucket
    pub totals: UsageTotals,
}

/// Ledger facade used by the orchestrators
pub struct UsageTracker {
    repo: Arc<dyn UsageRepo>,
}

impl UsageTracker {
    /// Create a tracker over the given repository
    pub fn new(repo: Arc<dyn UsageRepo>) -> Self {
        Self { repo }
    }

    /// The underlying repository
    pub fn repo(&self) -> &Arc<dyn UsageRepo> {
        &self.repo
    }

    /// Append a record. Failures are logged, never propagated.
    pub async fn track(&self, record: UsageRecord) {
        let request_id = record.request_id.clone();
        if let Err(err) = self.repo.append(record).await {
            error!(%err, request_id, "failed to append usage record");
        }
    }

    /// Aggregate all usage within `[start, end)`
    pub async fn summary(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> crate::utils::error::Result<UsageSummary> {
        let records = self.repo.records_in_range(start, end).await?;
        let mut summary = UsageSummary::default();
        for record in &records {
            summary.totals.add(record);
            summary
                .by_model
                .entry(record.model_id.clone())
                .or_default()
                .add(record);
            summary
                .by_provider
                .entry(record.provider.clone())
                .or_default()
                .add(record);
            summary
                .by_user
                .entry(record.user_id.clone())
                .or_default()
                .add(record);
        }
        Ok(summary)
    }

    /// Grouped rollup within `[start, end)`, buckets sorted by key
    pub async fn bucketed(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        bucketing: UsageBucketing,
    ) -> crate::utils::error::Result<Vec<UsageBucket>> {
        let records = self.repo.records_in_range(start, end).await?;
        let mut buckets: HashMap<String, UsageTotals> = HashMap::new();
        for record in &records {
            let key = match bucketing {
                UsageBucketing::Day => record.timestamp.format("%Y-%m-%d").to_string(),
                UsageBucketing::Month => {
                    format!("{:04}-{:02}", record.timestamp.year(), record.timestamp.month())
                }
                UsageBucketing::Model => record.model_id.clone(),
                UsageBucketing::User => record.user_id.clone(),
            };
            buckets.entry(key).or_default().add(record);
        }
        let mut out: Vec<UsageBucket> = buckets
            .into_iter()
            .map(|(key, totals)| UsageBucket { key, totals })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }
}

/// Spawn the retention sweep.
///
/// Purges records older than `retain` every `interval`; deployments run
/// this at least daily.
pub fn spawn_retention_sweep(
    repo: Arc<dyn UsageRepo>,
    retain: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let cutoff = Utc::now()
                - ChronoDuration::from_std(retain).unwrap_or_else(|_| ChronoDuration::days(90));
            match repo.purge_older_than(cutoff).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "purged expired usage records"),
                Err(err) => error!(%err, "usage retention sweep failed"),
            }
        }
    })
}
