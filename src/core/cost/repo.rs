//! Cost repository port and in-memory implementation

use super::budget::Budget;
use crate::core::usage::OperationType;
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single cost entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    /// Record id
    pub id: String,
    /// Request that incurred the cost
    pub request_id: String,
    /// User attribution
    pub user_id: String,
    /// Project attribution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Provider that served the request
    pub provider: String,
    /// Logical model id
    pub model_id: String,
    /// Operation kind
    pub operation: OperationType,
    /// When the cost was incurred
    pub timestamp: DateTime<Utc>,
    /// Tokens billed
    pub total_tokens: u32,
    /// Cost in USD
    pub cost_usd: f64,
    /// Free-form tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Filter over cost records; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct CostFilter {
    /// Restrict to one user
    pub user_id: Option<String>,
    /// Restrict to one project
    pub project_id: Option<String>,
    /// Restrict to one provider
    pub provider: Option<String>,
    /// Restrict to one logical model
    pub model_id: Option<String>,
    /// Inclusive lower time bound
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper time bound
    pub end: Option<DateTime<Utc>>,
}

impl CostFilter {
    /// Filter for one user's spend
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        }
    }

    fn matches(&self, record: &CostRecord) -> bool {
        self.user_id.as_deref().is_none_or(|u| record.user_id == u)
            && self
                .project_id
                .as_deref()
                .is_none_or(|p| record.project_id.as_deref() == Some(p))
            && self.provider.as_deref().is_none_or(|p| record.provider == p)
            && self.model_id.as_deref().is_none_or(|m| record.model_id == m)
            && self.start.is_none_or(|s| record.timestamp >= s)
            && self.end.is_none_or(|e| record.timestamp < e)
    }
}

/// Grouping key for cost summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostGroupBy {
    /// Per logical model
    Model,
    /// Per provider
    Provider,
    /// Per project
    Project,
    /// Per UTC day
    Day,
}

/// Aggregated cost per group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CostTotals {
    /// Cost in USD
    pub cost_usd: f64,
    /// Tokens billed
    pub total_tokens: u64,
    /// Number of records
    pub records: u64,
}

/// Storage port for cost records and budgets
#[async_trait]
pub trait CostRepo: Send + Sync {
    /// Append a cost record
    async fn create_cost_record(&self, record: CostRecord) -> Result<()>;

    /// Records matching a filter
    async fn cost_records(&self, filter: &CostFilter) -> Result<Vec<CostRecord>>;

    /// Grouped totals matching a filter
    async fn cost_summary(
        &self,
        filter: &CostFilter,
        group_by: CostGroupBy,
    ) -> Result<HashMap<String, CostTotals>>;

    /// Sum of cost and tokens matching a filter
    async fn total_cost(&self, filter: &CostFilter) -> Result<(f64, u64)>;

    /// Create a budget
    async fn create_budget(&self, budget: Budget) -> Result<()>;

    /// Update a budget
    async fn update_budget(&self, budget: Budget) -> Result<()>;

    /// Delete a budget; only its owner may do so
    async fn delete_budget(&self, id: &str, requester_user_id: &str) -> Result<()>;

    /// Fetch one budget
    async fn get_budget(&self, id: &str) -> Result<Option<Budget>>;

    /// Budgets applicable to a (user, project) pair: owned by the user
    /// and either unscoped or scoped to the given project
    async fn budgets_for_user_and_project(
        &self,
        user_id: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<Budget>>;
}

/// In-memory cost store
#[derive(Default)]
pub struct InMemoryCostRepo {
    records: RwLock<Vec<CostRecord>>,
    budgets: DashMap<String, Budget>,
}

impl InMemoryCostRepo {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CostRepo for InMemoryCostRepo {
    async fn create_cost_record(&self, record: CostRecord) -> Result<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn cost_records(&self, filter: &CostFilter) -> Result<Vec<CostRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn cost_summary(
        &self,
        filter: &CostFilter,
        group_by: CostGroupBy,
    ) -> Result<HashMap<String, CostTotals>> {
        let mut summary: HashMap<String, CostTotals> = HashMap::new();
        for record in self.records.read().iter().filter(|r| filter.matches(r)) {
            let key = match group_by {
                CostGroupBy::Model => record.model_id.clone(),
                CostGroupBy::Provider => record.provider.clone(),
                CostGroupBy::Project => record
                    .project_id
                    .clone()
                    .unwrap_or_else(|| "unassigned".to_string()),
                CostGroupBy::Day => record.timestamp.format("%Y-%m-%d").to_string(),
            };
            let entry = summary.entry(key).or_default();
            entry.cost_usd += record.cost_usd;
            entry.total_tokens += u64::from(record.total_tokens);
            entry.records += 1;
        }
        Ok(summary)
    }

    async fn total_cost(&self, filter: &CostFilter) -> Result<(f64, u64)> {
        let records = self.records.read();
        let mut cost = 0.0;
        let mut tokens = 0u64;
        for record in records.iter().filter(|r| filter.matches(r)) {
            cost += record.cost_usd;
            tokens += u64::from(record.total_tokens);
        }
        Ok((cost, tokens))
    }

    async fn create_budget(&self, budget: Budget) -> Result<()> {
        budget.validate().map_err(GatewayError::Validation)?;
        self.budgets.insert(budget.id.clone(), budget);
        Ok(())
    }

    async fn update_budget(&self, budget: Budget) -> Result<()> {
        budget.validate().map_err(GatewayError::Validation)?;
        if !self.budgets.contains_key(&budget.id) {
            return Err(GatewayError::NotFound(format!("budget {}", budget.id)));
        }
        self.budgets.insert(budget.id.clone(), budget);
        Ok(())
    }

    async fn delete_budget(&self, id: &str, requester_user_id: &str) -> Result<()> {
        let Some(budget) = self.budgets.get(id).map(|b| b.clone()) else {
            return Err(GatewayError::NotFound(format!("budget {}", id)));
        };
        if budget.owner_user_id != requester_user_id {
            return Err(GatewayError::Forbidden(format!(
                "budget {} is not owned by {}",
                id, requester_user_id
            )));
        }
        self.budgets.remove(id);
        Ok(())
    }

    async fn get_budget(&self, id: &str) -> Result<Option<Budget>> {
        Ok(self.budgets.get(id).map(|b| b.clone()))
    }

    async fn budgets_for_user_and_project(
        &self,
        user_id: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<Budget>> {
        Ok(self
            .budgets
            .iter()
            .filter(|b| {
                b.owner_user_id == user_id
                    && (b.project_id.is_none() || b.project_id.as_deref() == project_id)
            })
            .map(|b| b.clone())
            .collect())
    }
}
