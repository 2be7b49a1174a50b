//! Fine-tuning lifecycle
//!
//! Upload, start, and poll a fine-tuning job on a provider that exposes
//! the facet. The budget gate runs up front against a size-based token
//! estimate; on success, training tokens are metered once through the
//! ledger and the cost engine with the fine-tuning formula.

use super::{Attribution, Orchestrator};
use crate::core::providers::{FineTuningJob, FineTuningJobStatus};
use crate::core::types::{ProviderError, RequestContext};
use crate::core::usage::{OperationType, UsageRecord};
use crate::utils::error::{GatewayError, Result};
use std::time::Duration;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn is_terminal(status: FineTuningJobStatus) -> bool {
    matches!(
        status,
        FineTuningJobStatus::Succeeded
            | FineTuningJobStatus::Failed
            | FineTuningJobStatus::Cancelled
    )
}

impl Orchestrator {
    /// Run a fine-tuning job end to end: upload the training data, start
    /// the job, and poll it to completion.
    pub async fn run_fine_tuning(
        &self,
        provider_name: &str,
        base_model: &str,
        file_name: &str,
        training_data: &[u8],
        ctx: RequestContext,
    ) -> Result<FineTuningJob> {
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| GatewayError::ProviderNotFound(provider_name.to_string()))?;
        let Some(facet) = provider.as_fine_tuning() else {
            return Err(GatewayError::Provider(ProviderError::not_supported(
                provider_name,
                "fine_tuning",
            )));
        };

        let attribution = Attribution::resolve(None, None, &ctx);

        // Training tokens are unknown until the provider reports them;
        // the gate works from a size heuristic.
        let estimated_tokens = (training_data.len() as u64 / 4).max(1);
        let estimated = self
            .cost
            .fine_tuning_cost(provider_name, base_model, estimated_tokens);
        if !self
            .cost
            .is_within_budget(
                &attribution.user_id,
                attribution.project_id.as_deref(),
                estimated,
            )
            .await
        {
            return Err(GatewayError::BudgetExceeded(format!(
                "estimated cost ${:.4} exceeds the remaining budget for {}",
                estimated, attribution.user_id
            )));
        }

        let file_id = facet.upload_file(file_name, training_data).await?;
        let mut job = facet.create_job(base_model, &file_id).await?;
        debug!(job = %job.id, file = %file_id, model = base_model, "fine-tuning job started");

        while !is_terminal(job.status) {
            job = facet.get_job(&job.id).await?;
            if is_terminal(job.status) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = ctx.cancellation.cancelled() => {
                    let cancelled = facet.cancel_job(&job.id).await?;
                    return Err(GatewayError::Cancelled(format!(
                        "fine-tuning job {} cancelled",
                        cancelled.id
                    )));
                }
            }
        }

        match job.status {
            FineTuningJobStatus::Succeeded => {
                let trained_tokens = job.trained_tokens.unwrap_or(estimated_tokens);
                let tokens = u32::try_from(trained_tokens).unwrap_or(u32::MAX);
                let cost_usd = self
                    .cost
                    .fine_tuning_cost(provider_name, base_model, trained_tokens);
                self.usage
                    .track(UsageRecord::for_fine_tuning(
                        &ctx.request_id,
                        &attribution.user_id,
                        attribution.api_key_id.clone(),
                        provider_name,
                        base_model,
                        tokens,
                        cost_usd,
                        attribution.project_id.clone(),
                        Vec::new(),
                    ))
                    .await;
                self.cost
                    .record(
                        &ctx.request_id,
                        &attribution.user_id,
                        attribution.project_id.clone(),
                        provider_name,
                        base_model,
                        OperationType::FineTuning,
                        tokens,
                        cost_usd,
                        Vec::new(),
                    )
                    .await;
                Ok(job)
            }
            FineTuningJobStatus::Cancelled => Err(GatewayError::Cancelled(format!(
                "fine-tuning job {} was cancelled by the provider",
                job.id
            ))),
            _ => Err(GatewayError::Provider(ProviderError::unknown(
                provider_name,
                format!("fine-tuning job {} failed", job.id),
            ))),
        }
    }
}
