//! Cost computation and budget enforcement

use super::budget::{Budget, WeekStart};
use super::repo::{CostFilter, CostRecord, CostRepo};
use crate::core::registry::ModelRegistry;
use crate::core::usage::OperationType;
use crate::utils::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Input/output prices in USD per 1,000 tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePair {
    /// Input price per 1,000 tokens
    pub input_per_1k: f64,
    /// Output price per 1,000 tokens
    pub output_per_1k: f64,
}

impl PricePair {
    /// Construct a price pair
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }
}

/// Cost engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Pricing defaults by provider then model, consulted when the model
    /// mapping carries no pricing
    #[serde(default)]
    pub default_pricing: HashMap<String, HashMap<String, PricePair>>,
    /// Fine-tuning price per 1,000 training tokens, by provider then model
    #[serde(default)]
    pub fine_tuning_pricing: HashMap<String, HashMap<String, f64>>,
    /// Last-resort price pair for models with no pricing anywhere
    pub fallback_pricing: PricePair,
    /// Deny requests when the budget check itself fails, instead of the
    /// default availability-biased allow
    #[serde(default)]
    pub fail_closed: bool,
    /// First day of the weekly budget window
    #[serde(default)]
    pub week_start: WeekStart,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            default_pricing: HashMap::new(),
            fine_tuning_pricing: HashMap::new(),
            fallback_pricing: PricePair::new(0.001, 0.002),
            fail_closed: false,
            week_start: WeekStart::Monday,
        }
    }
}

/// Usage-vs-budget report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetUsageReport {
    /// Budget id
    pub budget_id: String,
    /// Cap in USD
    pub amount_usd: f64,
    /// Spend within the current window
    pub used_usd: f64,
    /// Remaining headroom, floored at zero
    pub remaining_usd: f64,
    /// Usage as a percentage of the cap
    pub usage_pct: f64,
    /// Next window boundary, `None` for never-resetting or expired budgets
    pub next_reset_date: Option<DateTime<Utc>>,
    /// Whether spend has reached the cap
    pub is_budget_exceeded: bool,
    /// Whether spend has crossed the alert threshold
    pub is_alert_threshold_reached: bool,
}

/// Token-to-USD computation and budget gate
pub struct CostEngine {
    registry: Arc<ModelRegistry>,
    repo: Arc<dyn CostRepo>,
    config: CostConfig,
}

impl CostEngine {
    /// Create an engine
    pub fn new(registry: Arc<ModelRegistry>, repo: Arc<dyn CostRepo>, config: CostConfig) -> Self {
        Self {
            registry,
            repo,
            config,
        }
    }

    /// The budget/cost repository
    pub fn repo(&self) -> &Arc<dyn CostRepo> {
        &self.repo
    }

    /// The active configuration
    pub fn config(&self) -> &CostConfig {
        &self.config
    }

    /// Resolve pricing for a (provider, model) pair.
    ///
    /// Resolution order: model mapping, configured defaults, global
    /// fallback pair. A mapping priced at zero counts as unpriced so a
    /// freshly added model cannot bill at zero by accident.
    pub async fn model_pricing(&self, provider: &str, model_id: &str) -> PricePair {
        if let Ok(mapping) = self.registry.get_model(model_id).await {
            if mapping.input_price_per_1k_tokens > 0.0 || mapping.output_price_per_1k_tokens > 0.0 {
                return PricePair::new(
                    mapping.input_price_per_1k_tokens,
                    mapping.output_price_per_1k_tokens,
                );
            }
        }
        if let Some(pair) = self
            .config
            .default_pricing
            .get(provider)
            .and_then(|models| models.get(model_id))
        {
            return *pair;
        }
        self.config.fallback_pricing
    }

    /// Completion cost: both directions billed
    pub async fn completion_cost(
        &self,
        provider: &str,
        model_id: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> f64 {
        let pricing = self.model_pricing(provider, model_id).await;
        f64::from(input_tokens) * pricing.input_per_1k / 1000.0
            + f64::from(output_tokens) * pricing.output_per_1k / 1000.0
    }

    /// Embedding cost: input tokens only
    pub async fn embedding_cost(&self, provider: &str, model_id: &str, input_tokens: u32) -> f64 {
        let pricing = self.model_pricing(provider, model_id).await;
        f64::from(input_tokens) * pricing.input_per_1k / 1000.0
    }

    /// Fine-tuning cost over training tokens
    pub fn fine_tuning_cost(&self, provider: &str, model_id: &str, training_tokens: u64) -> f64 {
        let price = self
            .config
            .fine_tuning_pricing
            .get(provider)
            .and_then(|models| models.get(model_id))
            .copied()
            .unwrap_or(self.config.fallback_pricing.input_per_1k);
        training_tokens as f64 * price / 1000.0
    }

    /// Append a cost record. Failures are logged, never propagated.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        request_id: &str,
        user_id: &str,
        project_id: Option<String>,
        provider: &str,
        model_id: &str,
        operation: OperationType,
        total_tokens: u32,
        cost_usd: f64,
        tags: Vec<String>,
    ) {
        let record = CostRecord {
            id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
            project_id,
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            operation,
            timestamp: Utc::now(),
            total_tokens,
            cost_usd,
            tags,
        };
        if let Err(err) = self.repo.create_cost_record(record).await {
            error!(%err, request_id, "failed to append cost record");
        }
    }

    /// Check whether an estimated spend fits every enforced budget for the
    /// (user, project) pair.
    ///
    /// Lookup failures fail open unless `fail_closed` is configured; the
    /// availability bias is deliberate.
    pub async fn is_within_budget(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        estimated_cost: f64,
    ) -> bool {
        match self.check_budgets(user_id, project_id, estimated_cost).await {
            Ok(within) => within,
            Err(err) => {
                error!(%err, user = user_id, "budget check failed");
                !self.config.fail_closed
            }
        }
    }

    async fn check_budgets(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        estimated_cost: f64,
    ) -> Result<bool> {
        let now = Utc::now();
        let budgets = self
            .repo
            .budgets_for_user_and_project(user_id, project_id)
            .await?;

        for budget in budgets.iter().filter(|b| b.enforce && b.is_active(now)) {
            let spend = self.window_spend(budget, user_id, now).await?;
            if spend + estimated_cost > budget.amount_usd {
                debug!(
                    budget = %budget.id,
                    spend,
                    estimated_cost,
                    cap = budget.amount_usd,
                    "budget would be exceeded"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn window_spend(
        &self,
        budget: &Budget,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        let (start, end) = budget.period_window(now, self.config.week_start);
        let filter = CostFilter {
            user_id: Some(user_id.to_string()),
            project_id: budget.project_id.clone(),
            start: Some(start),
            end: end.map(|e| e.min(now)).or(Some(now)),
            ..Default::default()
        };
        let (spend, _tokens) = self.repo.total_cost(&filter).await?;
        Ok(spend)
    }

    /// Usage-vs-budget report for one budget
    pub async fn budget_report(&self, budget_id: &str) -> Result<BudgetUsageReport> {
        let budget = self
            .repo
            .get_budget(budget_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("budget {}", budget_id)))?;

        let now = Utc::now();
        let used = self.window_spend(&budget, &budget.owner_user_id, now).await?;
        let usage_pct = if budget.amount_usd > 0.0 {
            used / budget.amount_usd * 100.0
        } else {
            0.0
        };

        Ok(BudgetUsageReport {
            budget_id: budget.id.clone(),
            amount_usd: budget.amount_usd,
            used_usd: used,
            remaining_usd: (budget.amount_usd - used).max(0.0),
            usage_pct,
            next_reset_date: budget.next_reset_date(now, self.config.week_start),
            is_budget_exceeded: used >= budget.amount_usd,
            is_alert_threshold_reached: usage_pct >= budget.alert_threshold_pct,
        })
    }
}
